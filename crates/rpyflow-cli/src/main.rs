//! rpyflow command-line interface.
//!
//! Evaluate blob velocities from TOML job files:
//! ```sh
//! rpyflow-cli run job.toml
//! rpyflow-cli validate job.toml
//! rpyflow-cli calibrate job.toml
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rpyflow-cli")]
#[command(about = "rpyflow: RPY hydrodynamics with Ewald splitting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute blob velocities from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without computing velocities.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Print the Ewald parameters a periodic job would use.
    Calibrate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
}

/// Directory that relative paths in a job file are resolved against.
fn base_dir(config: &Path) -> &Path {
    config.parent().unwrap_or_else(|| Path::new("."))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("rpyflow");
            println!("=======");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_job(&job, base_dir(&config))?;

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_csv {
                let csv_path = out_dir.join("velocities.csv");
                runner::write_velocities_csv(&result, &csv_path, &job)?;
            }

            if job.output.save_json {
                let json_path = out_dir.join("velocities.json");
                runner::write_velocities_json(&result, &json_path)?;
            }

            println!("Run complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            job.validate()?;
            let particles = runner::load_particles(&job, base_dir(&config))?;
            println!(
                "Configuration is valid: {} ({} particles)",
                config.display(),
                particles.len()
            );
            Ok(())
        }
        Commands::Calibrate { config } => {
            let job = config::load_config(&config)?;
            let summary = runner::calibrate(&job)?;
            println!("xi:   {:.6}", summary.xi);
            println!("rcut: {:.6}", summary.rcut);
            println!(
                "grid: {} x {} x {}",
                summary.grid[0], summary.grid[1], summary.grid[2]
            );
            Ok(())
        }
    }
}
