//! # rpyflow Compute
//!
//! Compute backend abstraction for rpyflow. This crate provides a
//! [`ComputeBackend`](backend::ComputeBackend) trait that isolates the
//! hydrodynamics code from how pairwise and per-point work is scheduled.
//!
//! ## Available backends
//!
//! | Backend | Status |
//! |---------|--------|
//! | CPU (Rayon) | Implemented |

pub mod backend;
pub mod cpu;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};
pub use cpu::CpuBackend;
