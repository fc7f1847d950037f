//! Nonuniform spectral transforms between scattered points and Fourier modes.
//!
//! Points live in $[0, 2\pi)^3$ and mode arrays of shape $(n_x, n_y, n_z)$
//! use FFT ordering along every axis: index $i$ holds wavenumber $i$ for
//! $i < \lceil n/2 \rceil$ and $i - n$ otherwise.
//!
//! * Type 1 ([`SpectralTransform::spread`]):
//!   $\hat F_{\mathbf k} = \sum_j c_j \, e^{-i \mathbf k \cdot \mathbf x_j}$
//! * Type 2 ([`SpectralTransform::interpolate`]):
//!   $c_j = \mathrm{Re} \sum_{\mathbf k} \hat F_{\mathbf k} \, e^{+i \mathbf k \cdot \mathbf x_j}$
//!
//! Both operate on three components at once, which is what the far-field
//! velocity solve needs.

pub mod nufft;

use ndarray::Array3;
use num_complex::Complex64;

use crate::solver::SolverError;

pub use nufft::GaussianNufft;

/// Three complex mode grids, one per vector component.
pub type ModeGrids = [Array3<Complex64>; 3];

/// Nonuniform-to-grid and grid-to-nonuniform 3D transforms.
pub trait SpectralTransform: Send + Sync {
    /// Type-1 transform of the real vector values at `points` onto `modes`.
    fn spread(
        &self,
        points: &[[f64; 3]],
        values: &[[f64; 3]],
        modes: [usize; 3],
    ) -> Result<ModeGrids, SolverError>;

    /// Type-2 transform of `grids` evaluated at `points`, real part only.
    fn interpolate(&self, points: &[[f64; 3]], grids: &ModeGrids) -> Result<Vec<[f64; 3]>, SolverError>;

    /// Human-readable name of the transform.
    fn method_name(&self) -> &str;
}

/// Signed wavenumber stored at FFT-ordered index `i` of an axis of length `n`.
pub fn fft_wavenumber(i: usize, n: usize) -> isize {
    if i < (n + 1) / 2 {
        i as isize
    } else {
        i as isize - n as isize
    }
}

/// All signed wavenumbers of an axis of length `n`, in FFT order.
pub fn fft_wavenumbers(n: usize) -> Vec<isize> {
    (0..n).map(|i| fft_wavenumber(i, n)).collect()
}

/// Exact transforms by direct summation.
///
/// Costs $O(N \cdot n_x n_y n_z)$; intended as a reference and for small
/// systems.
#[derive(Debug, Clone, Default)]
pub struct DirectTransform;

impl SpectralTransform for DirectTransform {
    fn spread(
        &self,
        points: &[[f64; 3]],
        values: &[[f64; 3]],
        modes: [usize; 3],
    ) -> Result<ModeGrids, SolverError> {
        check_lengths(points.len(), values.len())?;
        let [nx, ny, nz] = modes;
        let (kx, ky, kz) = (fft_wavenumbers(nx), fft_wavenumbers(ny), fft_wavenumbers(nz));
        let mut grids: ModeGrids = std::array::from_fn(|_| Array3::zeros((nx, ny, nz)));

        for (x, c) in points.iter().zip(values) {
            for (i, &ki) in kx.iter().enumerate() {
                for (j, &kj) in ky.iter().enumerate() {
                    for (l, &kl) in kz.iter().enumerate() {
                        let phase = -(ki as f64 * x[0] + kj as f64 * x[1] + kl as f64 * x[2]);
                        let e = Complex64::from_polar(1.0, phase);
                        for (grid, &cd) in grids.iter_mut().zip(c) {
                            grid[[i, j, l]] += e * cd;
                        }
                    }
                }
            }
        }
        Ok(grids)
    }

    fn interpolate(&self, points: &[[f64; 3]], grids: &ModeGrids) -> Result<Vec<[f64; 3]>, SolverError> {
        let (nx, ny, nz) = grids[0].dim();
        let (kx, ky, kz) = (fft_wavenumbers(nx), fft_wavenumbers(ny), fft_wavenumbers(nz));
        let out = points
            .iter()
            .map(|x| {
                let mut acc = [0.0; 3];
                for (i, &ki) in kx.iter().enumerate() {
                    for (j, &kj) in ky.iter().enumerate() {
                        for (l, &kl) in kz.iter().enumerate() {
                            let phase = ki as f64 * x[0] + kj as f64 * x[1] + kl as f64 * x[2];
                            let e = Complex64::from_polar(1.0, phase);
                            for (a, grid) in acc.iter_mut().zip(grids) {
                                *a += (grid[[i, j, l]] * e).re;
                            }
                        }
                    }
                }
                acc
            })
            .collect();
        Ok(out)
    }

    fn method_name(&self) -> &str {
        "Direct nonuniform DFT"
    }
}

pub(crate) fn check_lengths(points: usize, values: usize) -> Result<(), SolverError> {
    if points != values {
        return Err(SolverError::InvalidInput(format!(
            "{} points but {} values",
            points, values
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_fft_ordering() {
        assert_eq!(fft_wavenumbers(4), vec![0, 1, -2, -1]);
        assert_eq!(fft_wavenumbers(1), vec![0]);
        assert_eq!(fft_wavenumbers(2), vec![0, -1]);
        assert_eq!(fft_wavenumbers(3), vec![0, 1, -1]);
        assert_eq!(fft_wavenumbers(5), vec![0, 1, 2, -2, -1]);
    }

    #[test]
    fn test_direct_single_point_at_origin_spreads_uniformly() {
        let grids = DirectTransform
            .spread(&[[0.0; 3]], &[[1.0, 2.0, 3.0]], [4, 4, 4])
            .unwrap();
        for v in grids[1].iter() {
            assert_abs_diff_eq!(v.re, 2.0, epsilon = 1e-14);
            assert_abs_diff_eq!(v.im, 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_direct_interpolate_single_mode() {
        let mut grids: ModeGrids = std::array::from_fn(|_| Array3::zeros((4, 4, 4)));
        // Mode k = (1, 0, 0) in component x.
        grids[0][[1, 0, 0]] = Complex64::new(1.0, 0.0);
        let x = [0.7, 1.1, 2.3];
        let vals = DirectTransform.interpolate(&[x], &grids).unwrap();
        assert_abs_diff_eq!(vals[0][0], x[0].cos(), epsilon = 1e-14);
        assert_abs_diff_eq!(vals[0][1], 0.0);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let res = DirectTransform.spread(&[[0.0; 3]; 2], &[[0.0; 3]], [2, 2, 2]);
        assert!(matches!(res, Err(SolverError::InvalidInput(_))));
    }
}
