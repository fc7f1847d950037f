//! Core types shared across rpyflow.
//!
//! This module defines the data carried through a velocity evaluation:
//! particle positions and forces, the fluid parameters of the RPY kernel,
//! and the velocity container returned by every solver.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::solver::SolverError;

/// Velocities at N points, shape (N, 3).
pub type Velocities = Array2<f64>;

/// Positions and forces of N blobs.
///
/// Mutated by the caller between evaluations; the solvers only borrow it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticleSet {
    /// Blob centres.
    pub positions: Vec<[f64; 3]>,
    /// Force applied at each blob centre.
    pub forces: Vec<[f64; 3]>,
}

impl ParticleSet {
    /// Pair positions with forces, checking that the lengths agree.
    pub fn new(positions: Vec<[f64; 3]>, forces: Vec<[f64; 3]>) -> Result<Self, SolverError> {
        if positions.len() != forces.len() {
            return Err(SolverError::InvalidInput(format!(
                "{} positions but {} forces",
                positions.len(),
                forces.len()
            )));
        }
        Ok(Self { positions, forces })
    }

    /// Number of blobs.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sum of all forces.
    pub fn net_force(&self) -> [f64; 3] {
        self.forces.iter().fold([0.0; 3], |acc, f| {
            [acc[0] + f[0], acc[1] + f[1], acc[2] + f[2]]
        })
    }
}

/// Physical parameters of the RPY kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluidParams {
    /// Hydrodynamic radius of each blob.
    pub radius: f64,
    /// Dynamic viscosity of the fluid.
    pub viscosity: f64,
}

impl FluidParams {
    /// Build parameters, rejecting non-positive or non-finite values.
    pub fn new(radius: f64, viscosity: f64) -> Result<Self, SolverError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "blob radius must be positive, got {radius}"
            )));
        }
        if !(viscosity.is_finite() && viscosity > 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "viscosity must be positive, got {viscosity}"
            )));
        }
        Ok(Self { radius, viscosity })
    }

    /// Self-mobility of an isolated blob, $1/(6\pi\mu a)$.
    pub fn self_mobility(&self) -> f64 {
        1.0 / (6.0 * std::f64::consts::PI * self.viscosity * self.radius)
    }
}

/// Convert per-point 3-vectors into an (N, 3) array.
pub(crate) fn rows_to_array(rows: Vec<[f64; 3]>) -> Velocities {
    let n = rows.len();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    // Length is 3n by construction.
    Array2::from_shape_vec((n, 3), flat).unwrap_or_else(|_| Array2::zeros((n, 3)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_set_rejects_mismatched_lengths() {
        let err = ParticleSet::new(vec![[0.0; 3]; 2], vec![[0.0; 3]; 3]);
        assert!(err.is_err());
    }

    #[test]
    fn test_net_force() {
        let set = ParticleSet::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0]],
            vec![[1.0, 2.0, 3.0], [-1.0, 0.5, 0.0]],
        )
        .unwrap();
        assert_eq!(set.net_force(), [0.0, 2.5, 3.0]);
    }

    #[test]
    fn test_fluid_params_validation() {
        assert!(FluidParams::new(0.0, 1.0).is_err());
        assert!(FluidParams::new(1.0, -1.0).is_err());
        assert!(FluidParams::new(f64::NAN, 1.0).is_err());
        let p = FluidParams::new(0.5, 2.0).unwrap();
        let expected = 1.0 / (6.0 * std::f64::consts::PI);
        assert!((p.self_mobility() - expected).abs() < 1e-15);
    }

    #[test]
    fn test_rows_to_array_shape() {
        let v = rows_to_array(vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(v.dim(), (2, 3));
        assert_eq!(v[[1, 2]], 6.0);
    }
}
