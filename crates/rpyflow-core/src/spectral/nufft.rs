//! Gaussian-gridding nonuniform FFT.
//!
//! Follows the classic scheme of Dutt & Rokhlin as accelerated by Greengard &
//! Lee (*SIAM Review* **46**, 443, 2004): point values are convolved with a
//! periodic Gaussian onto a grid oversampled by a factor of two, the grid is
//! transformed with an ordinary FFT, and the Gaussian is divided back out
//! mode by mode. The type-2 transform runs the same steps in reverse.
//!
//! With spreading half-width $M_{sp}$ and oversampling $R$ the Gaussian
//! variance parameter is
//!
//! $$ \tau = \frac{\pi M_{sp}}{M^2 R (R - 1/2)} $$
//!
//! for $M$ modes, which gives roughly $10^{-M_{sp}}$ relative accuracy.

use std::sync::Arc;

use ndarray::{Array3, Axis};
use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};

use rpyflow_compute::ComputeBackend;

use super::{check_lengths, fft_wavenumber, ModeGrids, SpectralTransform};
use crate::solver::SolverError;

const OVERSAMPLING: usize = 2;
const TWO_PI: f64 = 2.0 * std::f64::consts::PI;

/// Gaussian-gridding NUFFT at a requested relative tolerance.
pub struct GaussianNufft {
    tolerance: f64,
    spread_width: usize,
    backend: Arc<dyn ComputeBackend>,
}

impl GaussianNufft {
    /// Create a transform accurate to roughly `tolerance`.
    ///
    /// Interpolation back to the points is parallelised on `backend`.
    pub fn new(tolerance: f64, backend: Arc<dyn ComputeBackend>) -> Self {
        let digits = if tolerance > 0.0 && tolerance < 1.0 {
            (-tolerance.log10()).ceil() as usize
        } else {
            1
        };
        Self {
            tolerance,
            spread_width: (digits + 1).clamp(2, 16),
            backend,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Half-width, in fine-grid points, of the spreading stencil.
    pub fn spread_width(&self) -> usize {
        self.spread_width
    }

    fn axes(&self, modes: [usize; 3]) -> [AxisGrid; 3] {
        std::array::from_fn(|d| AxisGrid::new(modes[d], self.spread_width))
    }

    /// Stencil of fine-grid indices and Gaussian weights around one point.
    fn stencil(&self, axis: &AxisGrid, theta: f64) -> Vec<(usize, f64)> {
        let theta = theta.rem_euclid(TWO_PI);
        let width = self.spread_width as isize;
        let i0 = (theta / axis.h).floor() as isize;
        (0..2 * width)
            .map(|l| {
                let m = i0 - width + 1 + l;
                let dist = theta - m as f64 * axis.h;
                let w = (-dist * dist / (4.0 * axis.tau)).exp();
                (m.rem_euclid(axis.fine as isize) as usize, w)
            })
            .collect()
    }
}

/// Per-axis gridding parameters.
#[derive(Debug, Clone)]
struct AxisGrid {
    modes: usize,
    fine: usize,
    h: f64,
    tau: f64,
    /// Fine-grid index of each FFT-ordered mode.
    fine_index: Vec<usize>,
    /// Inverse Gaussian Fourier coefficient of each mode.
    correction: Vec<f64>,
}

impl AxisGrid {
    fn new(modes: usize, spread_width: usize) -> Self {
        let modes = modes.max(1);
        let fine = (OVERSAMPLING * modes).max(2 * spread_width);
        let r = fine as f64 / modes as f64;
        let m = modes as f64;
        let tau = std::f64::consts::PI * spread_width as f64 / (m * m * r * (r - 0.5));
        let h = TWO_PI / fine as f64;

        let mut fine_index = Vec::with_capacity(modes);
        let mut correction = Vec::with_capacity(modes);
        for i in 0..modes {
            let k = fft_wavenumber(i, modes);
            fine_index.push(k.rem_euclid(fine as isize) as usize);
            let kf = k as f64;
            correction.push((std::f64::consts::PI / tau).sqrt() * (kf * kf * tau).exp());
        }
        Self {
            modes,
            fine,
            h,
            tau,
            fine_index,
            correction,
        }
    }
}

/// In-place 3D FFT as three passes of 1D transforms.
fn fft3(grid: &mut Array3<Complex64>, direction: FftDirection, planner: &mut FftPlanner<f64>) {
    for axis in 0..3 {
        let n = grid.len_of(Axis(axis));
        if n < 2 {
            continue;
        }
        let fft = planner.plan_fft(n, direction);
        let mut buffer = vec![Complex64::new(0.0, 0.0); n];
        let mut scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        for mut lane in grid.lanes_mut(Axis(axis)) {
            for (b, v) in buffer.iter_mut().zip(lane.iter()) {
                *b = *v;
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);
            for (v, b) in lane.iter_mut().zip(&buffer) {
                *v = *b;
            }
        }
    }
}

impl SpectralTransform for GaussianNufft {
    fn spread(
        &self,
        points: &[[f64; 3]],
        values: &[[f64; 3]],
        modes: [usize; 3],
    ) -> Result<ModeGrids, SolverError> {
        check_lengths(points.len(), values.len())?;
        let axes = self.axes(modes);
        let shape = (axes[0].fine, axes[1].fine, axes[2].fine);
        let mut fine: ModeGrids = std::array::from_fn(|_| Array3::zeros(shape));

        for (x, c) in points.iter().zip(values) {
            let sx = self.stencil(&axes[0], x[0]);
            let sy = self.stencil(&axes[1], x[1]);
            let sz = self.stencil(&axes[2], x[2]);
            for &(ix, wx) in &sx {
                for &(iy, wy) in &sy {
                    let wxy = wx * wy;
                    for &(iz, wz) in &sz {
                        let w = wxy * wz;
                        for (grid, &cd) in fine.iter_mut().zip(c) {
                            grid[[ix, iy, iz]] += Complex64::new(w * cd, 0.0);
                        }
                    }
                }
            }
        }

        let mut planner = FftPlanner::new();
        let scale = 1.0 / (axes[0].fine * axes[1].fine * axes[2].fine) as f64;
        let mut out: ModeGrids =
            std::array::from_fn(|_| Array3::zeros((axes[0].modes, axes[1].modes, axes[2].modes)));
        for (grid, target) in fine.iter_mut().zip(out.iter_mut()) {
            fft3(grid, FftDirection::Forward, &mut planner);
            for ((i, j, l), v) in target.indexed_iter_mut() {
                let fx = axes[0].fine_index[i];
                let fy = axes[1].fine_index[j];
                let fz = axes[2].fine_index[l];
                let corr = axes[0].correction[i] * axes[1].correction[j] * axes[2].correction[l];
                *v = grid[[fx, fy, fz]] * (corr * scale);
            }
        }
        Ok(out)
    }

    fn interpolate(&self, points: &[[f64; 3]], grids: &ModeGrids) -> Result<Vec<[f64; 3]>, SolverError> {
        let (nx, ny, nz) = grids[0].dim();
        let axes = self.axes([nx, ny, nz]);
        let shape = (axes[0].fine, axes[1].fine, axes[2].fine);

        let mut planner = FftPlanner::new();
        let mut fine: ModeGrids = std::array::from_fn(|_| Array3::zeros(shape));
        for (grid, source) in fine.iter_mut().zip(grids) {
            if source.dim() != (nx, ny, nz) {
                return Err(SolverError::InvalidInput(
                    "mode grids of different shapes".into(),
                ));
            }
            for ((i, j, l), v) in source.indexed_iter() {
                let corr = axes[0].correction[i] * axes[1].correction[j] * axes[2].correction[l];
                grid[[axes[0].fine_index[i], axes[1].fine_index[j], axes[2].fine_index[l]]] =
                    *v * corr;
            }
            fft3(grid, FftDirection::Inverse, &mut planner);
        }

        let scale = 1.0 / (axes[0].fine * axes[1].fine * axes[2].fine) as f64;
        let fine = &fine;
        let axes = &axes;
        self.backend
            .parallel_rows(points.len(), &|j| {
                let x = points[j];
                let sx = self.stencil(&axes[0], x[0]);
                let sy = self.stencil(&axes[1], x[1]);
                let sz = self.stencil(&axes[2], x[2]);
                let mut acc = [0.0; 3];
                for &(ix, wx) in &sx {
                    for &(iy, wy) in &sy {
                        let wxy = wx * wy;
                        for &(iz, wz) in &sz {
                            let w = wxy * wz;
                            for (a, grid) in acc.iter_mut().zip(fine) {
                                *a += w * grid[[ix, iy, iz]].re;
                            }
                        }
                    }
                }
                [acc[0] * scale, acc[1] * scale, acc[2] * scale]
            })
            .map_err(|e| SolverError::ComputeError(e.to_string()))
    }

    fn method_name(&self) -> &str {
        "Gaussian-gridding NUFFT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::DirectTransform;
    use rpyflow_compute::CpuBackend;

    fn scattered_points(n: usize) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
        let points = (0..n)
            .map(|i| {
                let t = i as f64 + 1.0;
                [
                    (t * 2.399_963).rem_euclid(TWO_PI),
                    (t * 1.618_034 + 0.3).rem_euclid(TWO_PI),
                    (t * 0.577_215 + 1.1).rem_euclid(TWO_PI),
                ]
            })
            .collect();
        let values = (0..n)
            .map(|i| {
                let t = i as f64;
                [t.sin(), (0.5 * t).cos(), 1.0 - 0.1 * t]
            })
            .collect();
        (points, values)
    }

    fn nufft(tol: f64) -> GaussianNufft {
        GaussianNufft::new(tol, Arc::new(CpuBackend::with_threads(2).unwrap()))
    }

    #[test]
    fn test_spread_width_tracks_tolerance() {
        assert_eq!(nufft(1e-3).spread_width(), 4);
        assert_eq!(nufft(1e-6).spread_width(), 7);
        assert!(nufft(1e-12).spread_width() >= 12);
    }

    #[test]
    fn test_type1_matches_direct_sum() {
        let (points, values) = scattered_points(17);
        let modes = [8, 6, 10];
        let exact = DirectTransform.spread(&points, &values, modes).unwrap();
        let approx = nufft(1e-9).spread(&points, &values, modes).unwrap();

        let scale = exact[0].iter().map(|v| v.norm()).fold(0.0, f64::max);
        for (e, a) in exact.iter().zip(&approx) {
            for (ve, va) in e.iter().zip(a.iter()) {
                assert!(
                    (ve - va).norm() < 1e-7 * scale,
                    "type-1 mismatch: {} vs {}",
                    ve,
                    va
                );
            }
        }
    }

    #[test]
    fn test_type2_matches_direct_sum() {
        let modes = (8, 8, 4);
        let grids: ModeGrids = std::array::from_fn(|c| {
            Array3::from_shape_fn(modes, |(i, j, l)| {
                let s = (i + 2 * j + 3 * l + c) as f64;
                Complex64::new((0.3 * s).sin(), (0.7 * s).cos()) / (1.0 + s)
            })
        });
        let (points, _) = scattered_points(11);
        let exact = DirectTransform.interpolate(&points, &grids).unwrap();
        let approx = nufft(1e-9).interpolate(&points, &grids).unwrap();

        for (e, a) in exact.iter().zip(&approx) {
            for d in 0..3 {
                assert!(
                    (e[d] - a[d]).abs() < 1e-6,
                    "type-2 mismatch: {} vs {}",
                    e[d],
                    a[d]
                );
            }
        }
    }

    #[test]
    fn test_loose_tolerance_is_still_close() {
        let (points, values) = scattered_points(9);
        let modes = [16, 16, 16];
        let exact = DirectTransform.spread(&points, &values, modes).unwrap();
        let approx = nufft(1e-3).spread(&points, &values, modes).unwrap();
        let scale: f64 = values.iter().map(|v| v[2].abs()).sum();
        for (ve, va) in exact[2].iter().zip(approx[2].iter()) {
            assert!((ve - va).norm() < 5e-3 * scale);
        }
    }
}
