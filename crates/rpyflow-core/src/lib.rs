//! # rpyflow Core
//!
//! Hydrodynamic interactions between spherical blobs through the
//! Rotne-Prager-Yamakawa (RPY) mobility. Given blob positions and the
//! forces applied to them, the solvers return the velocity of every blob.
//!
//! ## Architecture
//!
//! All solvers implement the [`solver::VelocitySolver`] trait. Two
//! implementations are provided:
//!
//! - [`solver::rpy::RpyEvaluator`]: the direct O(N²) sum for unbounded
//!   fluid.
//! - [`solver::ewald::EwaldSplitter`]: Ewald splitting for triply periodic,
//!   optionally sheared, cells.
//!
//! Geometry, pair search and nonuniform FFTs are passed in as services
//! ([`domain::Domain`], [`neighbors::SpatialIndex`],
//! [`spectral::SpectralTransform`]) so either side can be swapped.
//!
//! ## Modules
//!
//! - [`types`]: Particles, fluid parameters, velocity arrays.
//! - [`domain`]: Periodic and sheared cells, minimum imaging.
//! - [`neighbors`]: Cell list and brute-force pair search.
//! - [`spectral`]: Gaussian-gridding NUFFT and a direct reference.
//! - [`solver`]: Solver trait, free-space RPY and Ewald splitting.
//! - [`parsers`]: Blob file input.
//! - [`quadrature`], [`spline`]: Numerical helpers for the near-field kernel.

pub mod domain;
pub mod neighbors;
pub mod parsers;
pub mod quadrature;
pub mod solver;
pub mod spectral;
pub mod spline;
pub mod types;
