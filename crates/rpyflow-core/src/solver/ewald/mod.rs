//! Ewald splitting of the RPY kernel for triply periodic cells.
//!
//! The periodic mobility is split with a Hasimoto-type screening function
//! into a spectral far field, which converges quickly in Fourier space, and a
//! near field that decays like $e^{-\xi^2 r^2}$ and is summed over pairs
//! closer than a cutoff $r_c$.
//!
//! # Choosing ξ and $r_c$
//!
//! For a given ξ the cutoff is the first multiple of `rcut_step` at which the
//! near kernel has dropped to `near_tolerance` of its self value. Pairs must
//! interact through a single image, so $r_c$ has to stay below half the
//! shortest period divided by the shear safety factor; ξ is raised in steps
//! of `xi_step` until it does. Larger ξ moves work to the far field and
//! grows the grid.
//!
//! # Submodules
//!
//! - [`far`]: grid sizing and the spectral solve.
//! - [`near`]: the real-space kernel, its spline table and the pair sum.

pub mod far;
pub mod near;

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use rpyflow_compute::ComputeBackend;

use self::far::FarFieldSolver;
use self::near::{EwaldNearKernel, NearFieldKernel, NearFieldTable};
use super::rpy::RpyEvaluator;
use super::{SolverError, VelocitySolver};
use crate::domain::Domain;
use crate::neighbors::SpatialIndex;
use crate::spectral::{GaussianNufft, SpectralTransform};
use crate::types::{FluidParams, ParticleSet, Velocities};

/// Tuning parameters of the Ewald splitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EwaldConfig {
    /// Relative size of the near kernel at the cutoff.
    pub near_tolerance: f64,
    /// Requested accuracy of the nonuniform FFTs.
    pub far_tolerance: f64,
    /// Increment of the cutoff search.
    pub rcut_step: f64,
    /// Increment applied to ξ when the cutoff is too long for the cell.
    pub xi_step: f64,
    /// Give up after this many ξ increments.
    pub max_xi_updates: usize,
    /// Longest cutoff search, in multiples of `rcut_step`.
    pub max_rcut_steps: usize,
    /// Grid points per Gaussian width $1/(2\xi)$.
    pub gaussian_resolution: f64,
    /// Knots in the near-field spline table.
    pub table_points: usize,
}

impl Default for EwaldConfig {
    fn default() -> Self {
        Self {
            near_tolerance: 1e-3,
            far_tolerance: 1e-3,
            rcut_step: 1e-2,
            xi_step: 0.1,
            max_xi_updates: 10_000,
            max_rcut_steps: 100_000,
            gaussian_resolution: 1.6,
            table_points: 2048,
        }
    }
}

impl EwaldConfig {
    /// Reject values the splitting cannot work with.
    pub fn validate(&self) -> Result<(), SolverError> {
        let positive = [
            ("near_tolerance", self.near_tolerance),
            ("far_tolerance", self.far_tolerance),
            ("rcut_step", self.rcut_step),
            ("xi_step", self.xi_step),
            ("gaussian_resolution", self.gaussian_resolution),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SolverError::InvalidInput(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.max_rcut_steps == 0 {
            return Err(SolverError::InvalidInput(
                "max_rcut_steps must be at least 1".into(),
            ));
        }
        if self.table_points < 4 {
            return Err(SolverError::InvalidInput(format!(
                "table_points must be at least 4, got {}",
                self.table_points
            )));
        }
        Ok(())
    }
}

/// Ewald-split RPY solver for triply periodic, possibly sheared cells.
pub struct EwaldSplitter {
    config: EwaldConfig,
    rpy: RpyEvaluator,
    exact: EwaldNearKernel,
    transform: Box<dyn SpectralTransform>,
    xi: f64,
    rcut: f64,
    far: FarFieldSolver,
    table: NearFieldTable,
}

impl EwaldSplitter {
    /// Calibrate a splitter for `domain`, starting from splitting parameter `xi`.
    ///
    /// ξ may be raised if the resulting cutoff does not fit in the cell.
    pub fn new(
        params: FluidParams,
        xi: f64,
        domain: &dyn Domain,
        config: EwaldConfig,
        backend: Arc<dyn ComputeBackend>,
    ) -> Result<Self, SolverError> {
        config.validate()?;
        if !(xi.is_finite() && xi > 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "splitting parameter must be positive, got {xi}"
            )));
        }
        let lengths = domain
            .triply_periodic_lengths()
            .ok_or(SolverError::NotTriplyPeriodic)?;

        let exact = EwaldNearKernel::new(params);
        let limit = rcut_limit(lengths, domain.safety_factor());
        let (xi, rcut, updates) = settle_splitting(&exact, &config, xi, None, limit)?;
        if updates > 0 {
            warn!(
                "Raised Ewald parameter {updates} times to xi = {xi:.4} so that rcut = {rcut:.4} fits the cell"
            );
        }

        let far = FarFieldSolver::new(params, xi, lengths, config.gaussian_resolution);
        let table = NearFieldTable::build(params, xi, rcut, config.table_points);
        let transform: Box<dyn SpectralTransform> =
            Box::new(GaussianNufft::new(config.far_tolerance, Arc::clone(&backend)));

        let grid = far.grid_dims();
        info!(
            "Ewald splitting: xi = {xi:.4}, rcut = {rcut:.4}, grid = {}x{}x{}",
            grid[0], grid[1], grid[2]
        );

        Ok(Self {
            config,
            rpy: RpyEvaluator::new(params, backend),
            exact,
            transform,
            xi,
            rcut,
            far,
            table,
        })
    }

    /// Replace the spectral transform used for the far field.
    pub fn with_transform(mut self, transform: Box<dyn SpectralTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn xi(&self) -> f64 {
        self.xi
    }

    pub fn rcut(&self) -> f64 {
        self.rcut
    }

    pub fn grid_dims(&self) -> [usize; 3] {
        self.far.grid_dims()
    }

    /// Grid wavenumbers per axis in FFT order.
    pub fn wavenumbers(&self) -> &[Vec<f64>; 3] {
        self.far.wavenumbers()
    }

    pub fn config(&self) -> &EwaldConfig {
        &self.config
    }

    /// The free-space evaluator this splitter is built on.
    pub fn rpy(&self) -> &RpyEvaluator {
        &self.rpy
    }

    /// Exact near kernel used for calibration.
    pub fn near_kernel(&self) -> &EwaldNearKernel {
        &self.exact
    }

    /// Cutoff at which the near kernel for `xi` falls below `near_tolerance`
    /// of its self value.
    ///
    /// The search is not bounded by the cell, only by `max_rcut_steps`; a
    /// capped result is logged and returned as is.
    pub fn calc_rcut(&self, xi: f64) -> f64 {
        search_rcut(&self.exact, &self.config, xi, f64::INFINITY)
    }

    /// Make ξ and the cutoff valid for `domain`, rebuilding grids and tables
    /// as needed.
    ///
    /// Returns whether ξ had to be raised.
    pub fn check_rcut(&mut self, domain: &dyn Domain) -> Result<bool, SolverError> {
        let lengths = domain
            .triply_periodic_lengths()
            .ok_or(SolverError::NotTriplyPeriodic)?;
        let limit = rcut_limit(lengths, domain.safety_factor());
        let (xi, rcut, updates) =
            settle_splitting(&self.exact, &self.config, self.xi, Some(self.rcut), limit)?;

        let params = *self.rpy.params();
        if updates > 0 {
            warn!(
                "rcut = {:.4} exceeds half the cell ({limit:.4}); raised xi from {:.4} to {xi:.4}",
                self.rcut, self.xi
            );
            self.xi = xi;
            self.rcut = rcut;
            self.table = NearFieldTable::build(params, xi, rcut, self.config.table_points);
        }
        if updates > 0 || self.far.lengths() != lengths {
            self.far = FarFieldSolver::new(params, xi, lengths, self.config.gaussian_resolution);
            let grid = self.far.grid_dims();
            info!(
                "Ewald grid rebuilt: xi = {xi:.4}, rcut = {rcut:.4}, grid = {}x{}x{}",
                grid[0], grid[1], grid[2]
            );
        }
        Ok(updates > 0)
    }

    /// Spectral part of the velocity.
    pub fn far_field_velocity(
        &self,
        particles: &ParticleSet,
        domain: &dyn Domain,
    ) -> Result<Velocities, SolverError> {
        self.far.velocity(particles, domain, self.transform.as_ref())
    }

    /// Real-space part of the velocity, including every blob's self term.
    pub fn near_field_velocity(
        &self,
        particles: &ParticleSet,
        domain: &dyn Domain,
        spatial: &mut dyn SpatialIndex,
    ) -> Result<Velocities, SolverError> {
        spatial.update(&particles.positions, domain);
        let pairs = spatial.self_neighbor_list(self.rcut);
        debug!("{} near-field pairs within rcut = {:.4}", pairs.len(), self.rcut);
        near::near_field_velocity(
            &self.table,
            self.xi,
            particles,
            &pairs,
            domain,
            self.rpy.backend().as_ref(),
        )
    }
}

impl VelocitySolver for EwaldSplitter {
    fn total_velocity(
        &mut self,
        particles: &ParticleSet,
        domain: &dyn Domain,
        spatial: &mut dyn SpatialIndex,
    ) -> Result<Velocities, SolverError> {
        if particles.positions.len() != particles.forces.len() {
            return Err(SolverError::InvalidInput(format!(
                "{} positions but {} forces",
                particles.positions.len(),
                particles.forces.len()
            )));
        }
        self.check_rcut(domain)?;
        if particles.is_empty() {
            return Ok(Velocities::zeros((0, 3)));
        }

        let start = Instant::now();
        let far = self.far_field_velocity(particles, domain)?;
        debug!("Far field: {:.3?}", start.elapsed());

        let start = Instant::now();
        let near = self.near_field_velocity(particles, domain, spatial)?;
        debug!("Near field: {:.3?}", start.elapsed());

        Ok(far + &near)
    }

    fn method_name(&self) -> &str {
        "Ewald-split RPY"
    }
}

/// Longest cutoff for which every pair interacts through one image.
fn rcut_limit(lengths: [f64; 3], safety_factor: f64) -> f64 {
    let shortest = lengths.iter().copied().fold(f64::INFINITY, f64::min);
    0.5 * shortest / safety_factor
}

/// Step the cutoff outwards until the near kernel is small enough,
/// giving up once it reaches `limit` or `max_rcut_steps`.
fn search_rcut(kernel: &EwaldNearKernel, config: &EwaldConfig, xi: f64, limit: f64) -> f64 {
    let reference = kernel.mobility(0.0, xi).longitudinal().min(1.0);
    for step in 0..config.max_rcut_steps {
        let r = step as f64 * config.rcut_step;
        if r >= limit || kernel.mobility(r, xi).longitudinal() <= config.near_tolerance * reference {
            return r;
        }
    }
    let r = config.max_rcut_steps as f64 * config.rcut_step;
    warn!(
        "Cutoff search for xi = {xi} stopped at r = {r:.3} after {} steps",
        config.max_rcut_steps
    );
    r
}

/// Raise ξ until the cutoff fits under `limit`.
///
/// Returns the final ξ, its cutoff, and how many increments were needed.
fn settle_splitting(
    kernel: &EwaldNearKernel,
    config: &EwaldConfig,
    mut xi: f64,
    rcut: Option<f64>,
    limit: f64,
) -> Result<(f64, f64, usize), SolverError> {
    let mut rcut = match rcut {
        Some(r) => r,
        None => search_rcut(kernel, config, xi, limit),
    };
    let mut updates = 0;
    while rcut >= limit {
        if updates == config.max_xi_updates {
            return Err(SolverError::SplittingNotConverged {
                updates,
                xi,
                rcut,
                limit,
            });
        }
        xi += config.xi_step;
        rcut = search_rcut(kernel, config, xi, limit);
        updates += 1;
    }
    Ok((xi, rcut, updates))
}
