//! taskhost-daemon - Host Task Agent Daemon
//!
//! Entry point for the agent. Loads configuration, runs the bootstrap
//! state machine (checkpoint load, capability reconciliation, task engine
//! construction), and exits non-zero with a human-readable reason if any
//! stage refuses or fails. Running the constructed engine is the engine's
//! own concern and lies outside this startup path.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use taskhost_core::config::AgentConfig;
use taskhost_core::engine::TaskEngine;
use taskhost_core::state::CheckpointStore;
use taskhost_daemon::bootstrap::AgentBootstrap;
use taskhost_daemon::engine::LocalTaskEngineFactory;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// taskhost daemon - host task agent
#[derive(Parser, Debug)]
#[command(name = "taskhost-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to agent configuration file
    #[arg(short, long, default_value = "taskhost.toml")]
    config: PathBuf,

    /// Override the data directory from the configuration file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the checkpoint file path from the configuration file
    #[arg(long)]
    checkpoint_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to build runtime: {err}");
            std::process::exit(1);
        },
    };

    if let Err(err) = runtime.block_on(run(args)) {
        // A refusal or load failure lands here: surface the reason and
        // exit non-zero with no engine running.
        error!("agent failed to start: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = if args.config.exists() {
        AgentConfig::from_file(&args.config).context("failed to load configuration")?
    } else {
        info!(path = %args.config.display(), "no configuration file, using defaults");
        AgentConfig::default()
    };

    // CLI args override config file values.
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(checkpoint_file) = args.checkpoint_file {
        config.checkpoint_file = Some(checkpoint_file);
    }

    let store = CheckpointStore::new(config.checkpoint_path());
    let agent = AgentBootstrap::new(config, store, LocalTaskEngineFactory)
        .run()
        .await
        .context("agent bootstrap failed")?;

    info!(
        checkpoint = agent.capabilities.checkpoint,
        task_resource_limits = agent.capabilities.task_resource_limits,
        resumed_tasks = agent.engine.resumed_tasks().len(),
        "taskhost agent ready"
    );

    Ok(())
}
