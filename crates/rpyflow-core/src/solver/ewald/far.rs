//! Spectral (far-field) part of the Ewald-split RPY kernel.
//!
//! Forces are spread onto Fourier modes of the unit cell, multiplied by
//!
//! $$ \hat M(\mathbf k) = \frac{\mathrm{sinc}^2(ka)}{\mu k^2}
//!    \left(1 + \frac{k^2}{4\xi^2}\right) e^{-k^2/4\xi^2}
//!    \left(\mathbf I - \hat{\mathbf k}\hat{\mathbf k}\right), $$
//!
//! and interpolated back to the particles. The $\mathbf k = 0$ mode is
//! dropped, so the cell carries no mean flow.

use std::f64::consts::PI;

use ndarray::Zip;
use num_complex::Complex64;

use super::super::SolverError;
use crate::domain::{wrap_unit_cell, Domain};
use crate::spectral::{fft_wavenumber, SpectralTransform};
use crate::types::{rows_to_array, FluidParams, ParticleSet, Velocities};

const TWO_PI: f64 = 2.0 * PI;

/// Grid and wavenumbers of the far-field solve for one ξ and cell.
#[derive(Debug, Clone)]
pub struct FarFieldSolver {
    params: FluidParams,
    xi: f64,
    lengths: [f64; 3],
    grid: [usize; 3],
    wavenumbers: [Vec<f64>; 3],
}

impl FarFieldSolver {
    /// Size the grid for splitting parameter `xi` on a cell of `lengths`.
    ///
    /// `resolution` is the number of grid points per Gaussian width $1/(2\xi)$.
    pub fn new(params: FluidParams, xi: f64, lengths: [f64; 3], resolution: f64) -> Self {
        let grid = std::array::from_fn(|d| Self::grid_size(lengths[d], xi, resolution));
        let wavenumbers = std::array::from_fn(|d| {
            (0..grid[d])
                .map(|i| TWO_PI * fft_wavenumber(i, grid[d]) as f64 / lengths[d])
                .collect()
        });
        Self {
            params,
            xi,
            lengths,
            grid,
            wavenumbers,
        }
    }

    /// Smallest power of two giving spacing at most $1/(2\xi \cdot \text{resolution})$.
    pub fn grid_size(length: f64, xi: f64, resolution: f64) -> usize {
        let gaussian_width = 1.0 / (2.0 * xi);
        let spacing = gaussian_width / resolution;
        let points = (length / spacing).ceil().max(1.0) as usize;
        points.next_power_of_two().max(2)
    }

    pub fn xi(&self) -> f64 {
        self.xi
    }

    pub fn lengths(&self) -> [f64; 3] {
        self.lengths
    }

    pub fn grid_dims(&self) -> [usize; 3] {
        self.grid
    }

    /// Grid wavenumbers per axis in FFT order, in units of inverse length.
    pub fn wavenumbers(&self) -> &[Vec<f64>; 3] {
        &self.wavenumbers
    }

    /// Scalar part of the far-field multiplier at wavenumber magnitude `k`.
    pub fn multiplier(&self, k: f64) -> f64 {
        if k == 0.0 {
            return 0.0;
        }
        let ka = k * self.params.radius;
        let sinc = if ka.abs() < 1e-4 {
            1.0 - ka * ka / 6.0
        } else {
            ka.sin() / ka
        };
        let s = k * k / (4.0 * self.xi * self.xi);
        sinc * sinc * (1.0 + s) * (-s).exp() / (self.params.viscosity * k * k)
    }

    /// Far-field velocity of every particle.
    pub fn velocity(
        &self,
        particles: &ParticleSet,
        domain: &dyn Domain,
        transform: &dyn SpectralTransform,
    ) -> Result<Velocities, SolverError> {
        let points: Vec<[f64; 3]> = particles
            .positions
            .iter()
            .map(|x| {
                let p = domain.prime_coords(x);
                std::array::from_fn(|d| {
                    TWO_PI * wrap_unit_cell(p[d], self.lengths[d]) / self.lengths[d]
                })
            })
            .collect();

        let mut grids = transform.spread(&points, &particles.forces, self.grid)?;

        let [gx, gy, gz] = &mut grids;
        Zip::indexed(gx)
            .and(gy)
            .and(gz)
            .for_each(|(i, j, l), fx, fy, fz| {
                let k = domain.prime_wavenumbers(&[
                    self.wavenumbers[0][i],
                    self.wavenumbers[1][j],
                    self.wavenumbers[2][l],
                ]);
                let k2 = k[0] * k[0] + k[1] * k[1] + k[2] * k[2];
                let m = self.multiplier(k2.sqrt());
                if m == 0.0 {
                    *fx = Complex64::new(0.0, 0.0);
                    *fy = Complex64::new(0.0, 0.0);
                    *fz = Complex64::new(0.0, 0.0);
                    return;
                }
                let kdotf = (*fx * k[0] + *fy * k[1] + *fz * k[2]) / k2;
                *fx = (*fx - kdotf * k[0]) * m;
                *fy = (*fy - kdotf * k[1]) * m;
                *fz = (*fz - kdotf * k[2]) * m;
            });

        let inv_volume = 1.0 / domain.volume();
        let rows = transform
            .interpolate(&points, &grids)?
            .into_iter()
            .map(|u| [u[0] * inv_volume, u[1] * inv_volume, u[2] * inv_volume])
            .collect();
        Ok(rows_to_array(rows))
    }
}
