//! TOML configuration deserialisation for velocity jobs.

use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use rpyflow_core::solver::ewald::EwaldConfig;
use rpyflow_core::types::FluidParams;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub fluid: FluidConfig,
    #[serde(default)]
    pub domain: DomainConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    pub particles: ParticlesConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Blob and fluid properties.
#[derive(Debug, Deserialize)]
pub struct FluidConfig {
    pub radius: f64,
    #[serde(default = "default_viscosity")]
    pub viscosity: f64,
}

fn default_viscosity() -> f64 {
    1.0
}

/// Periodic cell. Omitting `lengths` means unbounded fluid.
#[derive(Debug, Default, Deserialize)]
pub struct DomainConfig {
    #[serde(default)]
    pub lengths: Option<[f64; 3]>,
    #[serde(default)]
    pub strain: f64,
}

/// Solver method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    FreeSpace,
    Ewald,
}

/// Solver selection and tuning.
#[derive(Debug, Default, Deserialize)]
pub struct SolverConfig {
    /// Defaults to Ewald when the domain is periodic, free space otherwise.
    #[serde(default)]
    pub method: Option<Method>,
    /// Ewald splitting parameter (required for Ewald).
    #[serde(default)]
    pub xi: Option<f64>,
    /// Worker threads; all cores when omitted.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub ewald: EwaldConfig,
}

/// Particle input: either inline arrays or a blob file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ParticlesConfig {
    Inline {
        positions: Vec<[f64; 3]>,
        forces: Vec<[f64; 3]>,
    },
    File {
        file: String,
    },
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save velocities as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_csv: bool,
    /// Whether to also save velocities as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_csv: true,
            save_json: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

impl JobConfig {
    /// The method to run, after applying the domain-based default.
    pub fn method(&self) -> Method {
        match (self.solver.method, self.domain.lengths) {
            (Some(m), _) => m,
            (None, Some(_)) => Method::Ewald,
            (None, None) => Method::FreeSpace,
        }
    }

    pub fn fluid_params(&self) -> anyhow::Result<FluidParams> {
        FluidParams::new(self.fluid.radius, self.fluid.viscosity).context("Invalid [fluid] section")
    }

    /// Check the combination of settings before any work is done.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.fluid_params()?;
        if let Some(lengths) = self.domain.lengths {
            if lengths.iter().any(|l| !(l.is_finite() && *l > 0.0)) {
                bail!("Domain lengths must be positive, got {lengths:?}");
            }
        }
        if !self.domain.strain.is_finite() {
            bail!("Domain strain must be finite");
        }
        if self.solver.threads == Some(0) {
            bail!("solver.threads must be at least 1");
        }
        match self.method() {
            Method::FreeSpace => {
                if self.domain.lengths.is_some() {
                    bail!("method = \"free_space\" cannot be used with a periodic domain");
                }
            }
            Method::Ewald => {
                if self.domain.lengths.is_none() {
                    bail!("method = \"ewald\" needs [domain] lengths");
                }
                let xi = self.solver.xi.context("method = \"ewald\" needs solver.xi")?;
                if !(xi.is_finite() && xi > 0.0) {
                    bail!("solver.xi must be positive, got {xi}");
                }
                self.solver
                    .ewald
                    .validate()
                    .context("Invalid [solver.ewald] section")?;
            }
        }
        if let ParticlesConfig::Inline { positions, forces } = &self.particles {
            if positions.len() != forces.len() {
                bail!(
                    "[particles] has {} positions but {} forces",
                    positions.len(),
                    forces.len()
                );
            }
        }
        Ok(())
    }
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: JobConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EWALD_JOB: &str = r#"
        [fluid]
        radius = 0.1
        viscosity = 2.0

        [domain]
        lengths = [10.0, 10.0, 12.0]
        strain = 0.25

        [solver]
        xi = 1.5
        threads = 2

        [solver.ewald]
        far_tolerance = 1e-6
        table_points = 512

        [particles]
        positions = [[1.0, 1.0, 1.0], [2.0, 1.0, 1.0]]
        forces = [[0.0, 0.0, 1.0], [0.0, 0.0, -1.0]]

        [output]
        directory = "results"
        save_json = true
    "#;

    #[test]
    fn test_parse_ewald_job() {
        let job: JobConfig = toml::from_str(EWALD_JOB).unwrap();
        assert_eq!(job.method(), Method::Ewald);
        assert_eq!(job.domain.lengths, Some([10.0, 10.0, 12.0]));
        assert_eq!(job.domain.strain, 0.25);
        assert_eq!(job.solver.xi, Some(1.5));
        assert_eq!(job.solver.threads, Some(2));
        assert_eq!(job.solver.ewald.far_tolerance, 1e-6);
        assert_eq!(job.solver.ewald.table_points, 512);
        // Unset tuning fields keep their defaults.
        assert_eq!(job.solver.ewald.xi_step, 0.1);
        assert!(job.output.save_csv);
        assert!(job.output.save_json);
        assert!(matches!(job.particles, ParticlesConfig::Inline { .. }));
        job.validate().unwrap();
    }

    #[test]
    fn test_minimal_free_space_job() {
        let job: JobConfig = toml::from_str(
            r#"
            [fluid]
            radius = 0.5

            [particles]
            file = "blobs.xyz"
            "#,
        )
        .unwrap();
        assert_eq!(job.method(), Method::FreeSpace);
        assert_eq!(job.fluid.viscosity, 1.0);
        assert_eq!(job.output.directory, "./output");
        match &job.particles {
            ParticlesConfig::File { file } => assert_eq!(file, "blobs.xyz"),
            other => panic!("unexpected particles {other:?}"),
        }
        job.validate().unwrap();
    }

    #[test]
    fn test_ewald_without_xi_is_invalid() {
        let job: JobConfig = toml::from_str(
            r#"
            [fluid]
            radius = 0.1
            [domain]
            lengths = [5.0, 5.0, 5.0]
            [particles]
            file = "blobs.xyz"
            "#,
        )
        .unwrap();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_free_space_method_on_periodic_domain_is_invalid() {
        let job: JobConfig = toml::from_str(
            r#"
            [fluid]
            radius = 0.1
            [domain]
            lengths = [5.0, 5.0, 5.0]
            [solver]
            method = "free_space"
            [particles]
            positions = [[0.0, 0.0, 0.0]]
            forces = [[1.0, 0.0, 0.0]]
            "#,
        )
        .unwrap();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_unknown_method_fails_to_parse() {
        let res: Result<JobConfig, _> = toml::from_str(
            r#"
            [fluid]
            radius = 0.1
            [solver]
            method = "multipole"
            [particles]
            file = "blobs.xyz"
            "#,
        );
        assert!(res.is_err());
    }
}
