//! Apollo devnet binary.
//!
//! Boot the default network and keep it running until Ctrl+C:
//! ```bash
//! cargo run --package apollo-node -- run
//! ```
//!
//! Show the start order without running anything:
//! ```bash
//! cargo run --package apollo-node -- plan --lights 4
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use apollo_core::tracing::setup_tracing;
use apollo_core::Orchestrator;
use apollo_node::{network_services, NetworkConfig};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "apollo")]
#[command(about = "Local devnet of consensus, bridge and light nodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot the network and run until interrupted
    Run(NetworkArgs),
    /// Print the start waves of the network
    Plan(NetworkArgs),
}

#[derive(Args, Debug)]
struct NetworkArgs {
    /// TOML file with network settings
    #[arg(short, long, env = "APOLLO_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding per-service state and genesis.json
    #[arg(long)]
    root_dir: Option<PathBuf>,

    /// Number of light nodes
    #[arg(long)]
    lights: Option<usize>,

    /// Number of bridge nodes
    #[arg(long)]
    bridges: Option<usize>,
}

impl NetworkArgs {
    fn load(self) -> Result<NetworkConfig> {
        let mut config = match &self.config {
            Some(path) => NetworkConfig::from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => NetworkConfig::default(),
        };
        if let Some(root_dir) = self.root_dir {
            config.root_dir = root_dir;
        }
        if let Some(lights) = self.lights {
            config.light_count = lights;
        }
        if let Some(bridges) = self.bridges {
            config.bridge_count = bridges;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(&cli.log_level);

    match cli.command {
        Command::Run(args) => run(args.load()?).await,
        Command::Plan(args) => plan(args.load()?),
    }
}

async fn run(config: NetworkConfig) -> Result<()> {
    let ctx = CancellationToken::new();
    tokio::spawn(cancel_on_signal(ctx.clone()));

    info!(
        chain_id = %config.chain_id,
        root_dir = %config.root_dir.display(),
        bridges = config.bridge_count,
        lights = config.light_count,
        "Starting devnet"
    );

    let mut orchestrator = Orchestrator::new(
        config.root_dir.clone(),
        config.genesis(),
        network_services(&config),
    )
    .with_options(config.to_run_options());

    if let Err(err) = orchestrator.run(ctx).await {
        error!(error = %err, "{}", err.summary());
        for failure in err.stop_failures() {
            warn!(service = %failure.service, error = %failure.failure, "Service did not stop cleanly");
        }
        return Err(err.into());
    }

    info!("Devnet stopped");
    Ok(())
}

fn plan(config: NetworkConfig) -> Result<()> {
    let orchestrator = Orchestrator::new(
        config.root_dir.clone(),
        config.genesis(),
        network_services(&config),
    )
    .with_options(config.to_run_options());

    for (number, wave) in orchestrator.plan()?.iter().enumerate() {
        println!("wave {}: {}", number + 1, wave.join(", "));
    }
    Ok(())
}

async fn cancel_on_signal(ctx: CancellationToken) {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }

    info!("Signal received, shutting down");
    ctx.cancel();
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}
