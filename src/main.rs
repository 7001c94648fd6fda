// src/main.rs
// Entry point for the AGV control panel: loads configuration, starts the endpoints
// and keeps the process alive while clients are served on their own threads.

use agv_control::{AgvConfig, AgvSystem};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// AGV route planner and telemetry relay
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Map file, overrides the configuration
    #[arg(short, long)]
    map: Option<PathBuf>,

    /// Seconds between status log lines (0 disables)
    #[arg(long, default_value_t = 60)]
    status_interval: u64,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match AgvConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => AgvConfig::default(),
    };
    if args.map.is_some() {
        config.map.path = args.map.clone();
    }

    let mut system = match AgvSystem::new(config) {
        Ok(system) => system,
        Err(e) => {
            error!("Failed to initialize: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = system.start() {
        error!("Failed to start: {}", e);
        return ExitCode::FAILURE;
    }
    info!("Subscribers can connect on {}", system.broadcast_addr());

    let tick = Duration::from_secs(1);
    let mut elapsed = 0u64;
    while system.get_status().operational {
        std::thread::sleep(tick);
        elapsed += 1;
        if args.status_interval > 0 && elapsed % args.status_interval == 0 {
            let status = system.get_status();
            info!(
                "At {} (from {}), battery {}%, routes {}/{} ok, {} fallbacks, {} clients",
                status.agv.position,
                status.previous,
                status.agv.battery,
                status.routes_completed,
                status.routes_completed + status.routes_failed,
                status.fallbacks,
                status.clients
            );
        }
    }

    system.shutdown();
    ExitCode::SUCCESS
}
