//! Simulation domains: free space and (sheared) triply periodic boxes.
//!
//! Periodic boxes may carry a simple-shear strain $g$ in the $x$-$y$ plane.
//! The lattice is rectangular in *primed* coordinates
//!
//! $$ x' = x - g\,y, \quad y' = y, \quad z' = z, $$
//!
//! so wrapping, cell binning and the spectral grid all work on primed
//! coordinates, and only the final separations and wavevectors are mapped
//! back to the Cartesian frame.

use nalgebra::{Matrix3, Vector3};

/// The domain service consumed by the solvers and spatial indices.
pub trait Domain: Send + Sync {
    /// Period along each axis, `None` for non-periodic axes.
    fn periodic_lengths(&self) -> [Option<f64>; 3];

    /// Current shear strain $g$.
    fn strain(&self) -> f64;

    /// Volume of the periodic cell, infinite if any axis is unbounded.
    fn volume(&self) -> f64;

    /// Factor by which the minimum periodic length must be reduced so that a
    /// sphere of the resulting half-length is resolved by primed-coordinate
    /// minimum imaging.
    fn safety_factor(&self) -> f64;

    /// Cartesian point to primed (lattice) coordinates.
    fn prime_coords(&self, x: &[f64; 3]) -> [f64; 3];

    /// Wavevector on the primed grid to the physical wavevector.
    fn prime_wavenumbers(&self, k: &[f64; 3]) -> [f64; 3];

    /// Nearest periodic image of a separation vector.
    fn minimum_image(&self, r: &[f64; 3]) -> [f64; 3];

    /// All three periods, if the domain is triply periodic.
    fn triply_periodic_lengths(&self) -> Option<[f64; 3]> {
        match self.periodic_lengths() {
            [Some(lx), Some(ly), Some(lz)] => Some([lx, ly, lz]),
            _ => None,
        }
    }

    /// True if no axis is periodic.
    fn is_free_space(&self) -> bool {
        self.periodic_lengths().iter().all(Option::is_none)
    }
}

/// A box that is periodic along any subset of axes, with optional shear.
#[derive(Debug, Clone)]
pub struct PeriodicDomain {
    lengths: [Option<f64>; 3],
    strain: f64,
    /// Cartesian → primed map.
    shear: Matrix3<f64>,
    /// Primed → Cartesian map.
    shear_inv: Matrix3<f64>,
}

impl PeriodicDomain {
    /// Domain with the given per-axis periods (`None` = unbounded).
    pub fn new(lengths: [Option<f64>; 3]) -> Self {
        let mut domain = Self {
            lengths,
            strain: 0.0,
            shear: Matrix3::identity(),
            shear_inv: Matrix3::identity(),
        };
        domain.set_strain(0.0);
        domain
    }

    /// Unbounded fluid.
    pub fn free_space() -> Self {
        Self::new([None, None, None])
    }

    /// Triply periodic, unstrained box.
    pub fn triply_periodic(lengths: [f64; 3]) -> Self {
        Self::new([Some(lengths[0]), Some(lengths[1]), Some(lengths[2])])
    }

    /// Builder-style strain setter.
    pub fn with_strain(mut self, g: f64) -> Self {
        self.set_strain(g);
        self
    }

    /// Update the shear strain (e.g. as a shear flow advances).
    pub fn set_strain(&mut self, g: f64) {
        self.strain = g;
        self.shear = Matrix3::new(
            1.0, -g, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        );
        self.shear_inv = Matrix3::new(
            1.0, g, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        );
    }
}

impl Domain for PeriodicDomain {
    fn periodic_lengths(&self) -> [Option<f64>; 3] {
        self.lengths
    }

    fn strain(&self) -> f64 {
        self.strain
    }

    fn volume(&self) -> f64 {
        self.lengths
            .iter()
            .map(|l| l.unwrap_or(f64::INFINITY))
            .product()
    }

    fn safety_factor(&self) -> f64 {
        (1.0 + self.strain * self.strain).sqrt()
    }

    fn prime_coords(&self, x: &[f64; 3]) -> [f64; 3] {
        let p = self.shear * Vector3::new(x[0], x[1], x[2]);
        [p.x, p.y, p.z]
    }

    fn prime_wavenumbers(&self, k: &[f64; 3]) -> [f64; 3] {
        // k_grid · x' = (Sᵀ k_grid) · x
        let kp = self.shear.transpose() * Vector3::new(k[0], k[1], k[2]);
        [kp.x, kp.y, kp.z]
    }

    fn minimum_image(&self, r: &[f64; 3]) -> [f64; 3] {
        let mut s = self.shear * Vector3::new(r[0], r[1], r[2]);
        for d in 0..3 {
            if let Some(len) = self.lengths[d] {
                s[d] -= (s[d] / len).round() * len;
            }
        }
        let back = self.shear_inv * s;
        [back.x, back.y, back.z]
    }
}

/// Wrap a primed coordinate into `[0, len)`.
pub(crate) fn wrap_unit_cell(x: f64, len: f64) -> f64 {
    let w = x.rem_euclid(len);
    // rem_euclid can round up to `len` for tiny negative inputs.
    if w >= len {
        0.0
    } else {
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_free_space_properties() {
        let d = PeriodicDomain::free_space();
        assert!(d.is_free_space());
        assert!(d.triply_periodic_lengths().is_none());
        assert!(d.volume().is_infinite());
        let r = [10.0, -20.0, 30.0];
        assert_eq!(d.minimum_image(&r), r);
    }

    #[test]
    fn test_partially_periodic_is_neither() {
        let d = PeriodicDomain::new([Some(2.0), None, Some(2.0)]);
        assert!(!d.is_free_space());
        assert!(d.triply_periodic_lengths().is_none());
    }

    #[test]
    fn test_minimum_image_within_half_period() {
        let d = PeriodicDomain::triply_periodic([2.0, 3.0, 4.0]);
        let r = d.minimum_image(&[1.7, -2.9, 3.5]);
        assert_abs_diff_eq!(r[0], -0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(r[1], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(r[2], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sheared_minimum_image_is_a_lattice_translate() {
        let g = 0.3;
        let d = PeriodicDomain::triply_periodic([2.0, 2.0, 2.0]).with_strain(g);
        let r = [0.4, 1.8, 0.1];
        let m = d.minimum_image(&r);
        // Difference must be n1 (L,0,0) + n2 (gL, L, 0) + n3 (0,0,L).
        let n2 = (r[1] - m[1]) / 2.0;
        let n1 = (r[0] - m[0] - g * 2.0 * n2) / 2.0;
        assert_abs_diff_eq!(n2, n2.round(), epsilon = 1e-12);
        assert_abs_diff_eq!(n1, n1.round(), epsilon = 1e-12);
        // Primed components end up within half a period.
        let p = d.prime_coords(&m);
        for c in p {
            assert!(c.abs() <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn test_prime_wavenumbers_preserve_phase() {
        let g = -0.25;
        let d = PeriodicDomain::triply_periodic([1.0, 1.0, 1.0]).with_strain(g);
        let x = [0.3, 0.7, -0.2];
        let kg = [2.0, -3.0, 5.0];
        let xp = d.prime_coords(&x);
        let kp = d.prime_wavenumbers(&kg);
        let lhs: f64 = (0..3).map(|i| kg[i] * xp[i]).sum();
        let rhs: f64 = (0..3).map(|i| kp[i] * x[i]).sum();
        assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-12);
    }

    #[test]
    fn test_safety_factor_grows_with_strain() {
        let d0 = PeriodicDomain::triply_periodic([1.0; 3]);
        let d1 = PeriodicDomain::triply_periodic([1.0; 3]).with_strain(0.5);
        assert_abs_diff_eq!(d0.safety_factor(), 1.0);
        assert!(d1.safety_factor() > 1.0);
        assert_abs_diff_eq!(d1.volume(), 1.0);
    }

    #[test]
    fn test_wrap_unit_cell() {
        assert_abs_diff_eq!(wrap_unit_cell(-0.5, 2.0), 1.5);
        assert_abs_diff_eq!(wrap_unit_cell(4.5, 2.0), 0.5);
        assert!(wrap_unit_cell(-1e-18, 1.0) < 1.0);
    }
}
