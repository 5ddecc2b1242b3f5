//! Gossip membership simulator
//!
//! Runs a group of nodes over an emulated network, optionally crashing some of
//! them, and prints what every survivor believes about the group.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gossip_sim::{
    config::{DropWindow, FailureMode, SimulationConfig},
    logging::init_logging,
    simulation::Simulation,
};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "gossip-sim")]
#[command(about = "Simulate a gossip membership group with failures and message loss")]
#[command(version)]
struct Args {
    /// YAML simulation config; flags below override it
    #[arg(short, long, env = "GOSSIP_SIM_CONFIG")]
    config: Option<PathBuf>,

    /// Number of nodes in the group
    #[arg(long, env = "GOSSIP_SIM_NODES")]
    nodes: Option<u32>,

    /// Ticks to simulate
    #[arg(long, env = "GOSSIP_SIM_TICKS")]
    ticks: Option<u64>,

    /// Node i starts at tick floor(i * step_rate)
    #[arg(long)]
    step_rate: Option<f64>,

    #[arg(long, value_enum, env = "GOSSIP_SIM_FAILURE")]
    failure: Option<FailureMode>,

    #[arg(long)]
    failure_tick: Option<u64>,

    /// Enable message loss with this probability inside the drop window
    #[arg(long)]
    drop_probability: Option<f64>,

    /// Gossip to this many random peers instead of all of them
    #[arg(long)]
    fanout: Option<usize>,

    #[arg(long, env = "GOSSIP_SIM_SEED")]
    seed: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Enable JSON log format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(nodes) = self.nodes {
            config.nodes = nodes;
        }
        if let Some(ticks) = self.ticks {
            config.total_ticks = ticks;
        }
        if let Some(step_rate) = self.step_rate {
            config.step_rate = step_rate;
        }
        if let Some(failure) = self.failure {
            config.failure = failure;
        }
        if let Some(tick) = self.failure_tick {
            config.failure_tick = tick;
        }
        if let Some(probability) = self.drop_probability {
            config.drop.get_or_insert_with(DropWindow::default).probability = probability;
        }
        if let Some(fanout) = self.fanout {
            config.protocol.fanout = Some(fanout);
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level, args.log_json).context("Failed to initialize logging")?;
    gossip_mesh::metrics::describe();

    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    args.apply(&mut config);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting gossip-sim");
    let report = Simulation::new(config)
        .context("Invalid simulation config")?
        .run()
        .context("Simulation aborted")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
