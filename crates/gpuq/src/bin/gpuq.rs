//! Command-line report of the GPUs on this machine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gpuq::prelude::*;
use gpuq::report::SystemReport;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Print the GPU runtimes and devices found on this machine.
///
/// Devices hidden by CUDA_VISIBLE_DEVICES or HIP_VISIBLE_DEVICES are listed
/// under "All devices" only.
#[derive(Parser, Debug)]
#[command(name = "gpuq", version)]
struct Cli {
    /// Extra directory to search for driver libraries (repeatable)
    #[arg(long = "hint", value_name = "DIR")]
    hints: Vec<PathBuf>,

    /// Do not search the built-in driver locations
    #[arg(long)]
    no_default_hints: bool,

    /// Print the loader diagnostics of runtimes that failed to load
    #[arg(long)]
    diagnostics: bool,

    /// Print the report as JSON
    #[cfg(feature = "serde")]
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut builder = LoaderConfigBuilder::new().hints(cli.hints.iter().cloned());
    if cli.no_default_hints {
        builder = builder.no_default_hints();
    }
    let mut config = builder.build().context("invalid library location")?;
    config
        .hints
        .extend_from_env()
        .with_context(|| format!("invalid {}", gpuq::config::LIBRARY_PATH_ENV))?;
    debug!(hints = ?config.hints.dirs(), "loader configured");

    let gpus = GenuineImplementation::new(&config);
    let report = SystemReport::collect(&gpus).context("querying devices")?;

    #[cfg(feature = "serde")]
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{report}");

    if cli.diagnostics {
        for (provider, present) in &report.providers {
            if *present {
                continue;
            }
            if let Some(text) = gpus.facade().diagnostics(*provider) {
                println!();
                println!("{provider} loader diagnostics:");
                println!("{text}");
            }
        }
    }
    Ok(())
}
