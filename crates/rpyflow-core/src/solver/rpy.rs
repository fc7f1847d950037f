//! Free-space Rotne-Prager-Yamakawa mobility.
//!
//! The velocity induced at $\mathbf x_t$ by a force $\mathbf F$ on a blob of
//! radius $a$ at $\mathbf x_s$ is
//!
//! $$
//! \mathbf u = \frac{1}{\mu}\left[ f(r)\,\mathbf F
//! + \big(g(r) - f(r)\big)(\hat{\mathbf r}\cdot\mathbf F)\,\hat{\mathbf r} \right]
//! $$
//!
//! with, for non-overlapping blobs ($r > 2a$),
//! $f = \frac{2a^2 + 3r^2}{24\pi r^3}$, $g = \frac{-2a^2 + 3r^2}{12\pi r^3}$,
//! and for overlapping blobs ($r \le 2a$)
//! $f = \frac{32a - 9r}{192\pi a^2}$, $g = \frac{16a - 3r}{96\pi a^2}$.

use std::f64::consts::PI;
use std::sync::Arc;

use rpyflow_compute::ComputeBackend;

use super::{SolverError, VelocitySolver};
use crate::domain::Domain;
use crate::neighbors::SpatialIndex;
use crate::types::{rows_to_array, FluidParams, ParticleSet, Velocities};

/// Scalar RPY functions $(f(r), g(r))$ at separation `r` for radius `a`.
pub fn rpy_scalars(r: f64, a: f64) -> (f64, f64) {
    if r > 2.0 * a {
        let r3 = r * r * r;
        let f = (2.0 * a * a + 3.0 * r * r) / (24.0 * PI * r3);
        let g = (-2.0 * a * a + 3.0 * r * r) / (12.0 * PI * r3);
        (f, g)
    } else {
        let f = (32.0 * a - 9.0 * r) / (192.0 * a * a * PI);
        let g = (16.0 * a - 3.0 * r) / (96.0 * a * a * PI);
        (f, g)
    }
}

/// An isotropic pair mobility $A(r)\,\mathbf I + B(r)\,\hat{\mathbf r}\hat{\mathbf r}$.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMobility {
    /// Coefficient of the identity.
    pub identity: f64,
    /// Coefficient of the dyad $\hat{\mathbf r}\hat{\mathbf r}$.
    pub dyadic: f64,
}

impl PairMobility {
    /// Free-space RPY mobility at separation `r`, including the $1/\mu$ factor.
    pub fn rpy(r: f64, params: &FluidParams) -> Self {
        let (f, g) = rpy_scalars(r, params.radius);
        let inv_mu = 1.0 / params.viscosity;
        Self {
            identity: f * inv_mu,
            dyadic: (g - f) * inv_mu,
        }
    }

    /// Apply to `force` for separation `rvec`.
    ///
    /// A zero separation has no direction; the dyadic part is dropped
    /// rather than producing NaN.
    pub fn apply(&self, rvec: &[f64; 3], force: &[f64; 3]) -> [f64; 3] {
        let r = (rvec[0] * rvec[0] + rvec[1] * rvec[1] + rvec[2] * rvec[2]).sqrt();
        let rhat = if r > 0.0 {
            [rvec[0] / r, rvec[1] / r, rvec[2] / r]
        } else {
            [0.0; 3]
        };
        let rdotf = rhat[0] * force[0] + rhat[1] * force[1] + rhat[2] * force[2];
        [
            self.identity * force[0] + self.dyadic * rdotf * rhat[0],
            self.identity * force[1] + self.dyadic * rdotf * rhat[1],
            self.identity * force[2] + self.dyadic * rdotf * rhat[2],
        ]
    }

    /// Largest absolute velocity component for a unit force along the
    /// separation, i.e. $|A + B|$.
    pub fn longitudinal(&self) -> f64 {
        (self.identity + self.dyadic).abs()
    }
}

/// Direct O(N²) summation of the free-space RPY kernel.
pub struct RpyEvaluator {
    params: FluidParams,
    backend: Arc<dyn ComputeBackend>,
}

impl RpyEvaluator {
    pub fn new(params: FluidParams, backend: Arc<dyn ComputeBackend>) -> Self {
        Self { params, backend }
    }

    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    pub fn backend(&self) -> &Arc<dyn ComputeBackend> {
        &self.backend
    }

    /// RPY scalars $(f/\mu, g/\mu)$ at separation `r`.
    pub fn pair_coefficients(&self, r: f64) -> (f64, f64) {
        let (f, g) = rpy_scalars(r, self.params.radius);
        (f / self.params.viscosity, g / self.params.viscosity)
    }

    /// Pair mobility at separation `r`, including the $1/\mu$ factor.
    pub fn pair_mobility(&self, r: f64) -> PairMobility {
        PairMobility::rpy(r, &self.params)
    }

    /// Velocity induced across separation `rvec` (target minus source).
    pub fn pair_velocity(&self, rvec: &[f64; 3], force: &[f64; 3]) -> [f64; 3] {
        let r = (rvec[0] * rvec[0] + rvec[1] * rvec[1] + rvec[2] * rvec[2]).sqrt();
        self.pair_mobility(r).apply(rvec, force)
    }

    /// Velocities at `targets` due to `forces` at `sources`.
    ///
    /// Coincident target and source points contribute the self mobility.
    pub fn evaluate(
        &self,
        targets: &[[f64; 3]],
        sources: &[[f64; 3]],
        forces: &[[f64; 3]],
    ) -> Result<Velocities, SolverError> {
        if sources.len() != forces.len() {
            return Err(SolverError::InvalidInput(format!(
                "{} sources but {} forces",
                sources.len(),
                forces.len()
            )));
        }
        let rows = self
            .backend
            .parallel_rows(targets.len(), &|t| {
                let xt = targets[t];
                let mut u = [0.0; 3];
                for (xs, f) in sources.iter().zip(forces) {
                    let rvec = [xt[0] - xs[0], xt[1] - xs[1], xt[2] - xs[2]];
                    let du = self.pair_velocity(&rvec, f);
                    u[0] += du[0];
                    u[1] += du[1];
                    u[2] += du[2];
                }
                u
            })
            .map_err(|e| SolverError::ComputeError(e.to_string()))?;
        Ok(rows_to_array(rows))
    }
}

impl VelocitySolver for RpyEvaluator {
    fn total_velocity(
        &mut self,
        particles: &ParticleSet,
        domain: &dyn Domain,
        _spatial: &mut dyn SpatialIndex,
    ) -> Result<Velocities, SolverError> {
        if domain.periodic_lengths().iter().any(Option::is_some) {
            return Err(SolverError::PeriodicDomainUnsupported);
        }
        self.evaluate(&particles.positions, &particles.positions, &particles.forces)
    }

    fn method_name(&self) -> &str {
        "Free-space RPY (direct sum)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PeriodicDomain;
    use crate::neighbors::AllPairs;
    use approx::assert_abs_diff_eq;
    use rpyflow_compute::CpuBackend;

    fn evaluator(a: f64, mu: f64) -> RpyEvaluator {
        RpyEvaluator::new(
            FluidParams::new(a, mu).unwrap(),
            Arc::new(CpuBackend::with_threads(2).unwrap()),
        )
    }

    #[test]
    fn test_far_regime_matches_closed_form() {
        let (a, mu) = (0.3, 2.0);
        let ev = evaluator(a, mu);
        let rvec = [1.0, -0.5, 0.7];
        let force = [0.2, 1.0, -0.4];
        let r: f64 = rvec.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!(r > 2.0 * a);

        let f = (2.0 * a * a + 3.0 * r * r) / (24.0 * PI * r.powi(3));
        let g = (-2.0 * a * a + 3.0 * r * r) / (12.0 * PI * r.powi(3));
        let rhat: Vec<f64> = rvec.iter().map(|x| x / r).collect();
        let rdotf: f64 = (0..3).map(|i| rhat[i] * force[i]).sum();

        let u = ev.pair_velocity(&rvec, &force);
        for i in 0..3 {
            let expected = (f * force[i] + (g - f) * rdotf * rhat[i]) / mu;
            assert_abs_diff_eq!(u[i], expected, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_overlap_regime_matches_closed_form() {
        let (a, mu) = (0.5, 1.5);
        let ev = evaluator(a, mu);
        let rvec = [0.3, 0.4, 0.0];
        let force = [1.0, 0.0, 0.0];
        let r = 0.5;
        let f = (32.0 * a - 9.0 * r) / (192.0 * a * a * PI);
        let g = (16.0 * a - 3.0 * r) / (96.0 * a * a * PI);
        let u = ev.pair_velocity(&rvec, &force);
        assert_abs_diff_eq!(u[0], (f + (g - f) * 0.6 * 0.6) / mu, epsilon = 1e-14);
        assert_abs_diff_eq!(u[1], (g - f) * 0.6 * 0.8 / mu, epsilon = 1e-14);
        assert_abs_diff_eq!(u[2], 0.0);
    }

    #[test]
    fn test_pair_coefficients_scale_with_viscosity() {
        let thin = evaluator(0.2, 1.0);
        let thick = evaluator(0.2, 4.0);
        for r in [0.0, 0.3, 0.4, 2.5] {
            let (f1, g1) = thin.pair_coefficients(r);
            let (f4, g4) = thick.pair_coefficients(r);
            assert_abs_diff_eq!(f1, 4.0 * f4, epsilon = 1e-14);
            assert_abs_diff_eq!(g1, 4.0 * g4, epsilon = 1e-14);
            let m = thin.pair_mobility(r);
            assert_abs_diff_eq!(m.identity, f1, epsilon = 1e-14);
            assert_abs_diff_eq!(m.dyadic, g1 - f1, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_regimes_are_continuous_at_contact() {
        let a = 0.25;
        let (f_in, g_in) = rpy_scalars(2.0 * a, a);
        let (f_out, g_out) = rpy_scalars(2.0 * a * (1.0 + 1e-12), a);
        assert_abs_diff_eq!(f_in, f_out, epsilon = 1e-9);
        assert_abs_diff_eq!(g_in, g_out, epsilon = 1e-9);
    }

    #[test]
    fn test_self_interaction_is_finite() {
        let (a, mu) = (0.1, 1.0);
        let ev = evaluator(a, mu);
        let u = ev.pair_velocity(&[0.0; 3], &[1.0, -2.0, 0.5]);
        for c in u {
            assert!(c.is_finite());
        }
        let m0 = 1.0 / (6.0 * PI * mu * a);
        assert_abs_diff_eq!(u[0], m0, epsilon = 1e-12);
        assert_abs_diff_eq!(u[1], -2.0 * m0, epsilon = 1e-12);
    }

    #[test]
    fn test_total_velocity_rejects_periodic_domain() {
        let mut ev = evaluator(0.1, 1.0);
        let particles = ParticleSet::new(vec![[0.0; 3]], vec![[1.0, 0.0, 0.0]]).unwrap();
        let domain = PeriodicDomain::new([Some(1.0), None, None]);
        let res = ev.total_velocity(&particles, &domain, &mut AllPairs::new());
        assert!(matches!(res, Err(SolverError::PeriodicDomainUnsupported)));
    }

    #[test]
    fn test_two_blob_mobility_is_symmetric() {
        let mut ev = evaluator(0.2, 1.0);
        let particles = ParticleSet::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.5, -0.3]],
            vec![[1.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
        )
        .unwrap();
        let u = ev
            .total_velocity(&particles, &PeriodicDomain::free_space(), &mut AllPairs::new())
            .unwrap();
        // Reciprocity: swapping which blob is forced gives the transposed response.
        let swapped = ParticleSet::new(
            particles.positions.clone(),
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
        )
        .unwrap();
        let v = ev
            .total_velocity(&swapped, &PeriodicDomain::free_space(), &mut AllPairs::new())
            .unwrap();
        assert_abs_diff_eq!(u[[1, 0]], v[[0, 0]], epsilon = 1e-14);
        assert_abs_diff_eq!(u[[0, 0]], v[[1, 0]], epsilon = 1e-14);
    }

    #[test]
    fn test_separate_targets_and_sources() {
        let ev = evaluator(0.1, 1.0);
        let u = ev
            .evaluate(&[[2.0, 0.0, 0.0], [0.0, 3.0, 0.0]], &[[0.0; 3]], &[[0.0, 0.0, 1.0]])
            .unwrap();
        assert_eq!(u.dim(), (2, 3));
        assert!(u[[0, 2]] > 0.0);
        assert!(u[[1, 2]] < u[[0, 2]]);
        assert!(ev.evaluate(&[[0.0; 3]], &[[0.0; 3]; 2], &[[0.0; 3]]).is_err());
    }
}
