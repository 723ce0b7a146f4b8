#![forbid(unsafe_code)]

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use whisper_lib::{load_from_path, ReplayProvider, Supervisor};

#[derive(Parser, Debug)]
#[command(author, version, about = "Whisper line-rate traffic anomaly detector")]
struct Cli {
    /// Path to the configuration JSON file
    #[arg(long, value_name = "FILE", default_value = "../configTemplate.json")]
    config: PathBuf,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, path = %cli.config.display(), "failed to load configuration");
            std::process::exit(1);
        }
    };

    let Some(trace) = cfg.runtime.replay_trace.clone() else {
        error!("no replay_trace configured; the CLI runs offline from a pcap trace");
        std::process::exit(1);
    };
    let mut provider = match ReplayProvider::from_trace(&trace) {
        Ok(provider) => provider,
        Err(err) => {
            error!(%err, trace = %trace.display(), "failed to open trace");
            std::process::exit(1);
        }
    };

    info!(
        ports = cfg.runtime.dpdk_port_vec.len(),
        parsers = cfg.runtime.core_use_for_parser,
        analyzers = cfg.runtime.core_use_for_analyze,
        trace = %trace.display(),
        "configuration loaded"
    );

    let supervisor = match Supervisor::new(cfg) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            error!(%err, "invalid topology");
            std::process::exit(1);
        }
    };
    if let Err(err) = supervisor.run(&mut provider) {
        error!(%err, "whisper exited with error");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
