//! Real-space (near-field) part of the Ewald-split RPY kernel.
//!
//! The far-field multiplier $\mathrm{sinc}^2(ka)\,H(k)/(\mu k^2)$ with the
//! Hasimoto screening
//!
//! $$ H(k) = \left(1 + \frac{k^2}{4\xi^2}\right) e^{-k^2/4\xi^2} $$
//!
//! corresponds in real space to an isotropic pair mobility
//! $F_\mathrm{far}(r)\,\mathbf I + G_\mathrm{far}(r)\,\hat{\mathbf r}\hat{\mathbf r}$
//! with
//!
//! $$ F_\mathrm{far} = \frac{1}{2\pi^2\mu}\int_0^\infty \mathrm{sinc}^2(ka)\,H(k)
//!    \left[j_0(kr) - \frac{j_1(kr)}{kr}\right] dk, \qquad
//!    G_\mathrm{far} = \frac{1}{2\pi^2\mu}\int_0^\infty \mathrm{sinc}^2(ka)\,H(k)\,j_2(kr)\,dk. $$
//!
//! The near kernel is the free-space RPY mobility minus this far part, and
//! decays like $e^{-\xi^2 r^2}$.

use std::f64::consts::{FRAC_PI_2, PI};

use rpyflow_compute::ComputeBackend;

use super::super::rpy::PairMobility;
use super::super::SolverError;
use crate::domain::Domain;
use crate::quadrature::GaussLegendre;
use crate::spline::CubicSpline;
use crate::types::{rows_to_array, FluidParams, ParticleSet, Velocities};

/// Screening integrands are negligible beyond this multiple of ξ.
const CUTOFF_WAVENUMBER: f64 = 14.0;
/// Gauss-Legendre points per quadrature panel.
const RULE_ORDER: usize = 8;
/// Extra spline knots past each end of a table.
const TABLE_PAD: usize = 8;

/// Short-range pair kernel of the Ewald splitting.
pub trait NearFieldKernel: Send + Sync {
    /// Near-field pair mobility at separation `r` for splitting parameter `xi`.
    fn mobility(&self, r: f64, xi: f64) -> PairMobility;

    /// Velocity across separation `rvec` due to `force`.
    fn evaluate(&self, rvec: &[f64; 3], force: &[f64; 3], xi: f64) -> [f64; 3] {
        let r = (rvec[0] * rvec[0] + rvec[1] * rvec[1] + rvec[2] * rvec[2]).sqrt();
        self.mobility(r, xi).apply(rvec, force)
    }
}

/// Near kernel evaluated by direct radial quadrature.
///
/// Accurate to near machine precision but costs a few hundred integrand
/// evaluations per call. Used to calibrate the cutoff and to fill tables.
#[derive(Debug, Clone)]
pub struct EwaldNearKernel {
    params: FluidParams,
    rule: GaussLegendre,
}

impl EwaldNearKernel {
    pub fn new(params: FluidParams) -> Self {
        Self {
            params,
            rule: GaussLegendre::new(RULE_ORDER),
        }
    }

    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    /// Free-space RPY mobility at separation `r`.
    pub fn rpy_mobility(&self, r: f64) -> PairMobility {
        PairMobility::rpy(r, &self.params)
    }

    /// Real-space image of the far-field multiplier at separation `r`.
    pub fn far_mobility(&self, r: f64, xi: f64) -> PairMobility {
        let a = self.params.radius;
        let k_max = CUTOFF_WAVENUMBER * xi;
        // Keep panels shorter than a quarter period of the fastest oscillation.
        let panels = ((k_max * (r + 2.0 * a) / FRAC_PI_2).ceil() as usize).max(16);
        let (f, g) = self.rule.integrate_composite_pair(0.0, k_max, panels, |k| {
            let weight = sinc(k * a).powi(2) * screening(k, xi);
            let (radial, dyadic) = angular_factors(k * r);
            (weight * radial, weight * dyadic)
        });
        let prefactor = 1.0 / (2.0 * PI * PI * self.params.viscosity);
        PairMobility {
            identity: prefactor * f,
            dyadic: prefactor * g,
        }
    }
}

impl NearFieldKernel for EwaldNearKernel {
    fn mobility(&self, r: f64, xi: f64) -> PairMobility {
        let full = self.rpy_mobility(r);
        let far = self.far_mobility(r, xi);
        PairMobility {
            identity: full.identity - far.identity,
            dyadic: full.dyadic - far.dyadic,
        }
    }
}

/// Near kernel with the far part tabulated on `[0, rcut]`.
///
/// The RPY part is still evaluated in closed form so the kink at contact
/// ($r = 2a$) is exact. Separations outside the table, or a different ξ,
/// fall back to quadrature.
#[derive(Debug, Clone)]
pub struct NearFieldTable {
    exact: EwaldNearKernel,
    xi: f64,
    rcut: f64,
    identity: CubicSpline,
    dyadic: CubicSpline,
}

impl NearFieldTable {
    /// Tabulate the far part for splitting parameter `xi` with `points`
    /// knots spanning `[0, rcut]`.
    pub fn build(params: FluidParams, xi: f64, rcut: f64, points: usize) -> Self {
        let exact = EwaldNearKernel::new(params);
        let points = points.max(4);
        let span = rcut.max(f64::EPSILON);
        let step = span / (points - 1) as f64;
        let lo = -(TABLE_PAD as f64) * step;
        let total = points + 2 * TABLE_PAD;

        let xs: Vec<f64> = (0..total).map(|i| lo + i as f64 * step).collect();
        // Both far coefficients are even in r, so the padding mirrors the table
        // and the spline has the right slope at the origin.
        let (fs, gs): (Vec<f64>, Vec<f64>) = xs
            .iter()
            .map(|&x| {
                let far = exact.far_mobility(x.abs(), xi);
                (far.identity, far.dyadic)
            })
            .unzip();

        Self {
            exact,
            xi,
            rcut,
            identity: CubicSpline::new(xs.clone(), fs),
            dyadic: CubicSpline::new(xs, gs),
        }
    }

    pub fn xi(&self) -> f64 {
        self.xi
    }

    pub fn rcut(&self) -> f64 {
        self.rcut
    }
}

impl NearFieldKernel for NearFieldTable {
    fn mobility(&self, r: f64, xi: f64) -> PairMobility {
        if xi != self.xi || r > self.rcut {
            return self.exact.mobility(r, xi);
        }
        let full = self.exact.rpy_mobility(r);
        PairMobility {
            identity: full.identity - self.identity.evaluate(r),
            dyadic: full.dyadic - self.dyadic.evaluate(r),
        }
    }
}

/// Sum the near kernel over all pairs plus every blob's own contribution.
///
/// `pairs` holds each interacting pair once; the sum is parallel over
/// targets, so the pair list is first regrouped per target.
pub fn near_field_velocity(
    kernel: &dyn NearFieldKernel,
    xi: f64,
    particles: &ParticleSet,
    pairs: &[(usize, usize)],
    domain: &dyn Domain,
    backend: &dyn ComputeBackend,
) -> Result<Velocities, SolverError> {
    let n = particles.len();
    let adjacency = Adjacency::from_pairs(n, pairs)?;
    let self_mobility = kernel.mobility(0.0, xi);
    let positions = &particles.positions;
    let forces = &particles.forces;

    let rows = backend
        .parallel_rows(n, &|i| {
            let mut u = self_mobility.apply(&[0.0; 3], &forces[i]);
            let xi_pos = positions[i];
            for &j in adjacency.neighbors(i) {
                let xj = positions[j];
                let rvec = domain.minimum_image(&[
                    xi_pos[0] - xj[0],
                    xi_pos[1] - xj[1],
                    xi_pos[2] - xj[2],
                ]);
                let du = kernel.evaluate(&rvec, &forces[j], xi);
                u[0] += du[0];
                u[1] += du[1];
                u[2] += du[2];
            }
            u
        })
        .map_err(|e| SolverError::ComputeError(e.to_string()))?;
    Ok(rows_to_array(rows))
}

/// Compressed per-target neighbour lists.
struct Adjacency {
    offsets: Vec<usize>,
    neighbors: Vec<usize>,
}

impl Adjacency {
    fn from_pairs(n: usize, pairs: &[(usize, usize)]) -> Result<Self, SolverError> {
        let mut counts = vec![0usize; n + 1];
        for &(i, j) in pairs {
            if i >= n || j >= n {
                return Err(SolverError::InvalidInput(format!(
                    "neighbour pair ({i}, {j}) out of range for {n} particles"
                )));
            }
            counts[i + 1] += 1;
            counts[j + 1] += 1;
        }
        for k in 0..n {
            counts[k + 1] += counts[k];
        }
        let offsets = counts;
        let mut fill = offsets.clone();
        let mut neighbors = vec![0usize; 2 * pairs.len()];
        for &(i, j) in pairs {
            neighbors[fill[i]] = j;
            fill[i] += 1;
            neighbors[fill[j]] = i;
            fill[j] += 1;
        }
        Ok(Self { offsets, neighbors })
    }

    fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[self.offsets[i]..self.offsets[i + 1]]
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-4 {
        1.0 - x * x / 6.0
    } else {
        x.sin() / x
    }
}

fn screening(k: f64, xi: f64) -> f64 {
    let s = k * k / (4.0 * xi * xi);
    (1.0 + s) * (-s).exp()
}

/// Angular averages of the transverse projector:
/// $(j_0(x) - j_1(x)/x,\ j_2(x))$.
fn angular_factors(x: f64) -> (f64, f64) {
    if x < 0.1 {
        let x2 = x * x;
        let j0 = 1.0 - x2 / 6.0 + x2 * x2 / 120.0;
        let j1_over_x = 1.0 / 3.0 - x2 / 30.0 + x2 * x2 / 840.0;
        let j2 = x2 / 15.0 - x2 * x2 / 210.0 + x2 * x2 * x2 / 7560.0;
        (j0 - j1_over_x, j2)
    } else {
        let (s, c) = x.sin_cos();
        let j0 = s / x;
        let j1 = s / (x * x) - c / x;
        let j2 = (3.0 / (x * x) - 1.0) * s / x - 3.0 * c / (x * x);
        (j0 - j1 / x, j2)
    }
}
