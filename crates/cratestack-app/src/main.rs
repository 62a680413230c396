//! Headless cratestack session: a host and a client peer in one process,
//! connected by an in-memory link.
//!
//! Run with: `cargo run -p cratestack-app -- --ticks 600 --fire-every 90`

mod driver;

use std::path::PathBuf;

use clap::Parser;
use cratestack_config::{CliArgs, Config};
use tracing::{error, info};

use driver::{Driver, RunOptions};

/// CLI arguments for the headless binary.
#[derive(Parser, Debug)]
#[command(name = "cratestack", about = "Headless two-peer cratestack session")]
struct AppArgs {
    #[command(flatten)]
    common: CliArgs,

    /// Number of fixed ticks to simulate.
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Host fires a crate every N ticks (0 never fires).
    #[arg(long, default_value_t = 0)]
    fire_every: u64,

    /// Restore the starting scene from this snapshot instead of the pyramid.
    #[arg(long)]
    snapshot_in: Option<PathBuf>,

    /// Write the host's final state to this snapshot file.
    #[arg(long)]
    snapshot_out: Option<PathBuf>,
}

fn main() {
    let args = AppArgs::parse();

    let config_dir = args.common.config_dir();
    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_dir.display());
            std::process::exit(1);
        }
    };
    config.apply_cli_overrides(&args.common);

    let log_dir = (!config.debug.log_dir.is_empty()).then(|| PathBuf::from(&config.debug.log_dir));
    cratestack_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    info!("cratestack headless session");
    info!(
        "seed={:#x} | timestep={}s | sync every {} ticks",
        config.session.seed, config.session.fixed_timestep_s, config.session.state_sync_interval
    );

    let options = RunOptions {
        ticks: args.ticks,
        fire_every: args.fire_every,
        snapshot_in: args.snapshot_in,
        snapshot_out: args.snapshot_out,
    };

    let result = Driver::new(config).and_then(|mut driver| driver.run(&options));
    match result {
        Ok(summary) => summary.log(),
        Err(e) => {
            error!("session failed: {e}");
            std::process::exit(1);
        }
    }
}
