//! fracscaled — the fracscale daemon.
//!
//! Runs one autoscaling experiment in a single process: queue engine,
//! worker pool (or an external scale command), load generator, and the
//! control loop.
//!
//! # Usage
//!
//! ```text
//! fracscaled standalone --config fracscale.toml --controller pid --controller-args k_p=1.5
//! fracscaled config --controller bangbang > fracscale.toml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fracscale_core::{ControllerConfig, FracscaleConfig};

const DEFAULT_FILTER: &str = "info,fracscale=debug";

#[derive(Parser)]
#[command(name = "fracscaled", about = "Adaptive worker-pool autoscaler")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an experiment with every component in one process.
    Standalone {
        /// Configuration file; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Controller kind, overriding the configuration file.
        #[arg(long)]
        controller: Option<String>,

        /// Controller parameters as `k=v,k=v`.
        #[arg(long, default_value = "")]
        controller_args: String,

        /// Inter-arrival deltas file (ms).
        #[arg(long)]
        load: Option<PathBuf>,

        /// Root directory for run artifacts.
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Scale command template with `{replicas}`; replaces the
        /// in-process worker pool.
        #[arg(long)]
        scale_command: Option<String>,
    },

    /// Print a default configuration as TOML.
    Config {
        #[arg(long, default_value = "bangbang")]
        controller: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Standalone {
            config,
            controller,
            controller_args,
            load,
            results_dir,
            scale_command,
        } => {
            let mut config = match config {
                Some(path) => FracscaleConfig::from_file(&path)?,
                None => FracscaleConfig::default(),
            };
            if let Some(kind) = controller {
                config.controller = ControllerConfig::from_args(&kind, &controller_args)?;
            }
            if load.is_some() {
                config.load.deltas_file = load;
            }
            if let Some(dir) = results_dir {
                config.runner.results_dir = dir;
            }
            if scale_command.is_some() {
                config.runner.scale_command = scale_command;
            }
            run(config).await
        }
        Command::Config { controller } => {
            let config = FracscaleConfig {
                controller: ControllerConfig::default_for(&controller)?,
                ..Default::default()
            };
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run(config: FracscaleConfig) -> anyhow::Result<()> {
    info!(controller = config.controller.kind(), "fracscale daemon starting");

    // ── Shutdown signal ────────────────────────────────────────

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                signal_cancel.cancel();
            }
            Err(e) => warn!(error = %e, "failed to install CTRL+C handler"),
        }
    });

    let summary = fracscale_runner::run_standalone(config, cancel)
        .await
        .context("experiment failed")?;

    info!(
        ticks = summary.ticks,
        received = summary.completed,
        total = ?summary.total,
        cancelled = summary.cancelled,
        "fracscale daemon stopped"
    );
    Ok(())
}
