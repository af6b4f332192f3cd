//! Restaking rewards simulator.
//!
//! Sets up services, pools, operators, plans and delegations from a config
//! file, runs the rewards engine for a number of blocks and prints a JSON
//! report of what every delegator earned.

mod settings;
mod scenario;

use anyhow::Result;
use clap::Parser;
use settings::SimConfig;
use scenario::Simulation;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "restake-rewards-sim",
    about = "Simulate restaking rewards plans block by block"
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the number of blocks to run
    #[arg(long)]
    blocks: Option<u64>,

    /// Check every invariant each N blocks
    #[arg(long, value_name = "N")]
    invariants_every: Option<u64>,

    /// Withdraw every delegation's rewards after the last block
    #[arg(long)]
    withdraw: bool,

    /// Write the report here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn init_logging(config: &SimConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SimConfig::load(cli.config.as_deref())?;
    if let Some(blocks) = cli.blocks {
        config.blocks = blocks;
    }
    init_logging(&config)?;

    info!(
        blocks = config.blocks,
        block_time_secs = config.block_time_secs,
        plans = config.plans.len(),
        delegations = config.delegations.len(),
        "starting rewards simulation"
    );

    let mut simulation = Simulation::new(config);
    simulation.setup()?;
    simulation.run(cli.invariants_every)?;
    if cli.withdraw {
        simulation.withdraw_all()?;
    }

    let report = serde_json::to_string_pretty(&simulation.report()?)?;
    match cli.output {
        Some(path) => {
            std::fs::write(&path, report)?;
            info!(path = %path.display(), "wrote simulation report");
        }
        None => println!("{report}"),
    }
    Ok(())
}
