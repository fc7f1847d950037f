//! Calibration of the splitting parameter and cutoff.

use std::sync::Arc;

use rpyflow_compute::CpuBackend;
use rpyflow_core::domain::PeriodicDomain;
use rpyflow_core::solver::ewald::near::NearFieldKernel;
use rpyflow_core::solver::ewald::{EwaldConfig, EwaldSplitter};
use rpyflow_core::solver::SolverError;
use rpyflow_core::types::FluidParams;

fn splitter(radius: f64, viscosity: f64, xi: f64, lengths: [f64; 3]) -> Result<EwaldSplitter, SolverError> {
    let params = FluidParams::new(radius, viscosity).unwrap();
    let domain = PeriodicDomain::triply_periodic(lengths);
    let config = EwaldConfig {
        table_points: 128,
        ..EwaldConfig::default()
    };
    EwaldSplitter::new(params, xi, &domain, config, Arc::new(CpuBackend::new()))
}

#[test]
fn test_rcut_criterion_across_xi() {
    let ewald = splitter(0.05, 0.7, 1.0, [30.0; 3]).unwrap();
    let kernel = ewald.near_kernel();
    let tol = ewald.config().near_tolerance;
    let step = ewald.config().rcut_step;

    eprintln!("{:>6} {:>8} {:>12}", "xi", "rcut", "ratio");
    let mut previous = f64::INFINITY;
    for &xi in &[0.5, 1.0, 2.0, 4.0, 8.0] {
        let rcut = ewald.calc_rcut(xi);
        let reference = kernel.mobility(0.0, xi).longitudinal().min(1.0);
        let ratio = kernel.mobility(rcut, xi).longitudinal() / reference;
        eprintln!("{xi:6.2} {rcut:8.3} {ratio:12.4e}");

        assert!(ratio <= tol);
        if rcut >= step {
            let before = kernel.mobility(rcut - step, xi).longitudinal() / reference;
            assert!(before > tol, "xi = {xi}: ratio {before:.3e} already below tolerance");
        }
        assert!(rcut <= previous, "rcut grew from {previous} to {rcut} at xi = {xi}");
        previous = rcut;
    }
}

#[test]
fn test_adaptive_loop_ends_with_a_fitting_cutoff() {
    for &l in &[3.0, 5.0, 8.0] {
        let ewald = splitter(0.1, 1.0, 0.3, [l, 1.5 * l, 2.0 * l]).unwrap();
        eprintln!("L = {l}: xi = {:.2}, rcut = {:.3}", ewald.xi(), ewald.rcut());
        assert!(ewald.rcut() < 0.5 * l);
        assert!((ewald.calc_rcut(ewald.xi()) - ewald.rcut()).abs() < 1e-12);
    }
}

#[test]
fn test_small_cell_needs_larger_xi() {
    let big = splitter(0.1, 1.0, 0.3, [12.0; 3]).unwrap();
    let small = splitter(0.1, 1.0, 0.3, [3.0; 3]).unwrap();
    assert!(small.xi() > big.xi());
    assert!(small.rcut() < big.rcut());
}

#[test]
fn test_rcut_does_not_depend_on_viscosity() {
    let a = splitter(0.1, 1.0, 1.0, [20.0; 3]).unwrap();
    let b = splitter(0.1, 5.0, 1.0, [20.0; 3]).unwrap();
    assert!((a.rcut() - b.rcut()).abs() < 1e-12);
}
