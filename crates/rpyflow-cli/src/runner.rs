//! Job runner: ties together particles, domain, and solver.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;

use rpyflow_compute::{ComputeBackend, CpuBackend};
use rpyflow_core::domain::PeriodicDomain;
use rpyflow_core::neighbors::CellList;
use rpyflow_core::parsers::load_blobs;
use rpyflow_core::solver::ewald::EwaldSplitter;
use rpyflow_core::solver::rpy::RpyEvaluator;
use rpyflow_core::solver::VelocitySolver;
use rpyflow_core::types::{ParticleSet, Velocities};

use crate::config::{JobConfig, Method, ParticlesConfig};

/// Ewald parameters after calibration against the job's cell.
#[derive(Debug, Clone, Serialize)]
pub struct EwaldSummary {
    pub xi: f64,
    pub rcut: f64,
    pub grid: [usize; 3],
}

impl EwaldSummary {
    fn from_splitter(ewald: &EwaldSplitter) -> Self {
        Self {
            xi: ewald.xi(),
            rcut: ewald.rcut(),
            grid: ewald.grid_dims(),
        }
    }
}

/// Results from a job run.
pub struct RunOutput {
    pub particles: ParticleSet,
    pub velocities: Velocities,
    pub method: String,
    pub elapsed: Duration,
    pub ewald: Option<EwaldSummary>,
}

/// One row of the JSON output.
#[derive(Serialize)]
struct VelocityRecord {
    position: [f64; 3],
    force: [f64; 3],
    velocity: [f64; 3],
}

/// Load particles inline or from the blob file, resolving relative paths
/// against `base_dir`.
pub fn load_particles(job: &JobConfig, base_dir: &Path) -> Result<ParticleSet> {
    match &job.particles {
        ParticlesConfig::Inline { positions, forces } => {
            ParticleSet::new(positions.clone(), forces.clone()).context("Invalid [particles] section")
        }
        ParticlesConfig::File { file } => {
            let path = base_dir.join(file);
            load_blobs(&path).with_context(|| format!("Failed to load blobs from {}", path.display()))
        }
    }
}

/// The cell described by `[domain]`.
pub fn build_domain(job: &JobConfig) -> PeriodicDomain {
    let domain = match job.domain.lengths {
        Some(lengths) => PeriodicDomain::triply_periodic(lengths),
        None => PeriodicDomain::free_space(),
    };
    domain.with_strain(job.domain.strain)
}

/// Create the CPU backend with the configured thread count.
pub fn create_backend(threads: Option<usize>) -> Result<Arc<dyn ComputeBackend>> {
    let backend = match threads {
        Some(n) => CpuBackend::with_threads(n).context("Failed to build thread pool")?,
        None => CpuBackend::new(),
    };
    info!("Backend: {} ({} threads)", backend.device_info().name, backend.num_threads());
    Ok(Arc::new(backend))
}

fn build_ewald(
    job: &JobConfig,
    domain: &PeriodicDomain,
    backend: Arc<dyn ComputeBackend>,
) -> Result<EwaldSplitter> {
    let xi = job.solver.xi.context("method = \"ewald\" needs solver.xi")?;
    EwaldSplitter::new(
        job.fluid_params()?,
        xi,
        domain,
        job.solver.ewald.clone(),
        backend,
    )
    .context("Failed to set up Ewald splitting")
}

/// Calibrate the Ewald splitting for the job without evaluating velocities.
pub fn calibrate(job: &JobConfig) -> Result<EwaldSummary> {
    job.validate()?;
    if job.method() != Method::Ewald {
        anyhow::bail!("calibrate needs an Ewald job with [domain] lengths");
    }
    let backend = create_backend(job.solver.threads)?;
    let ewald = build_ewald(job, &build_domain(job), backend)?;
    Ok(EwaldSummary::from_splitter(&ewald))
}

/// Run a full velocity evaluation from a parsed job configuration.
pub fn run_job(job: &JobConfig, base_dir: &Path) -> Result<RunOutput> {
    job.validate()?;
    let particles = load_particles(job, base_dir)?;
    println!("Particles: {}", particles.len());

    let net = particles.net_force();
    if job.method() == Method::Ewald && net.iter().any(|f| f.abs() > 1e-10) {
        warn!(
            "Net force {net:?} is nonzero; the periodic solution has no mean flow"
        );
    }

    let domain = build_domain(job);
    let backend = create_backend(job.solver.threads)?;
    let mut spatial = CellList::new();

    let (mut solver, ewald): (Box<dyn VelocitySolver>, Option<EwaldSummary>) = match job.method() {
        Method::FreeSpace => (
            Box::new(RpyEvaluator::new(job.fluid_params()?, backend)),
            None,
        ),
        Method::Ewald => {
            let splitter = build_ewald(job, &domain, backend)?;
            let summary = EwaldSummary::from_splitter(&splitter);
            println!(
                "Ewald: xi = {:.4}, rcut = {:.4}, grid = {}x{}x{}",
                summary.xi, summary.rcut, summary.grid[0], summary.grid[1], summary.grid[2]
            );
            (Box::new(splitter), Some(summary))
        }
    };

    let start = Instant::now();
    let velocities = solver
        .total_velocity(&particles, &domain, &mut spatial)
        .map_err(|e| anyhow::anyhow!("{} failed: {}", solver.method_name(), e))?;
    let elapsed = start.elapsed();
    println!("{}: {:.3?}", solver.method_name(), elapsed);

    Ok(RunOutput {
        particles,
        velocities,
        method: solver.method_name().to_string(),
        elapsed,
        ewald,
    })
}

/// Write velocities to a CSV file with a metadata header.
pub fn write_velocities_csv(output: &RunOutput, path: &Path, job: &JobConfig) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writeln!(file, "# rpyflow velocities")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# method: {} ({:.3?})", output.method, output.elapsed)?;
    writeln!(file, "# radius: {}, viscosity: {}", job.fluid.radius, job.fluid.viscosity)?;
    match job.domain.lengths {
        Some(l) => writeln!(
            file,
            "# domain: {} x {} x {}, strain: {}",
            l[0], l[1], l[2], job.domain.strain
        )?,
        None => writeln!(file, "# domain: free space")?,
    }
    if let Some(ew) = &output.ewald {
        writeln!(
            file,
            "# xi: {:.6}, rcut: {:.6}, grid: {}x{}x{}",
            ew.xi, ew.rcut, ew.grid[0], ew.grid[1], ew.grid[2]
        )?;
    }
    writeln!(file, "#")?;
    writeln!(file, "x,y,z,fx,fy,fz,ux,uy,uz")?;

    for (i, (x, f)) in output
        .particles
        .positions
        .iter()
        .zip(&output.particles.forces)
        .enumerate()
    {
        let u = output.velocities.row(i);
        writeln!(
            file,
            "{:.8e},{:.8e},{:.8e},{:.8e},{:.8e},{:.8e},{:.10e},{:.10e},{:.10e}",
            x[0], x[1], x[2], f[0], f[1], f[2], u[0], u[1], u[2]
        )?;
    }

    println!("Velocities written to: {}", path.display());
    Ok(())
}

/// Write velocities to a JSON file.
pub fn write_velocities_json(output: &RunOutput, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let records: Vec<VelocityRecord> = output
        .particles
        .positions
        .iter()
        .zip(&output.particles.forces)
        .zip(output.velocities.rows())
        .map(|((x, f), u)| VelocityRecord {
            position: *x,
            force: *f,
            velocity: [u[0], u[1], u[2]],
        })
        .collect();

    let json = serde_json::to_string_pretty(&records)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Velocities (JSON) written to: {}", path.display());
    Ok(())
}
