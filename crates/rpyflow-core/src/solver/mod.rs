//! Velocity solver abstraction and implementations.
//!
//! The [`VelocitySolver`] trait defines the interface shared by the direct
//! free-space RPY sum ([`rpy::RpyEvaluator`]) and the periodic Ewald
//! splitter ([`ewald::EwaldSplitter`]). The two differ in which domains they
//! accept: the free-space sum refuses any periodicity, the Ewald splitter
//! requires all three axes to be periodic.

pub mod ewald;
pub mod rpy;

use thiserror::Error;

use crate::domain::Domain;
use crate::neighbors::SpatialIndex;
use crate::types::{ParticleSet, Velocities};

/// Errors that can occur during a velocity evaluation.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Free-space RPY sum requested on a domain with periodic axes")]
    PeriodicDomainUnsupported,

    #[error("Ewald splitting is only implemented for triply periodic domains")]
    NotTriplyPeriodic,

    #[error(
        "Ewald parameter did not converge after {updates} increases \
         (xi = {xi:.4}, rcut = {rcut:.4}, half period limit = {limit:.4})"
    )]
    SplittingNotConverged {
        updates: usize,
        xi: f64,
        rcut: f64,
        limit: f64,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Compute backend error: {0}")]
    ComputeError(String),
}

/// The interface every hydrodynamic velocity solver implements.
///
/// `total_velocity` takes `&mut self` because the Ewald splitter may adapt
/// its splitting parameter to the current domain.
pub trait VelocitySolver {
    /// Velocity of every particle due to the forces on all particles.
    fn total_velocity(
        &mut self,
        particles: &ParticleSet,
        domain: &dyn Domain,
        spatial: &mut dyn SpatialIndex,
    ) -> Result<Velocities, SolverError>;

    /// Human-readable name of the solver method.
    fn method_name(&self) -> &str;
}
