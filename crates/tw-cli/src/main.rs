//! tunwright CLI
//!
//! Single binary for reconciling a tunnel-exposed service:
//! - `deploy` probes, plans, applies, settles and verifies
//! - `diagnose` and `plan` report without changing anything
//! - `verify`, `update-config` and `config` cover the individual steps

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tunwright::{commands, output};
use tw_core::config::load_deploy_config;
use tw_core::TunnelId;
use tw_reconcile::Engine;

#[derive(Parser)]
#[command(name = "tunwright")]
#[command(author, version, about = "Reconcile a tunnel-exposed service to its desired state")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "TUNWRIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe, plan and apply every action, then verify the endpoints
    Deploy,

    /// Report what is wrong and how to fix it, without changing anything
    Diagnose {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the actions deploy would take (dry run)
    Plan,

    /// Check every public endpoint once
    Verify {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Point the routing config at a tunnel
    UpdateConfig {
        /// Tunnel id to use (defaults to the active tunnel)
        #[arg(short, long)]
        tunnel_id: Option<TunnelId>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show the per-user config file path
    Path,
    /// Write a default tunwright.toml
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    output::set_quiet(cli.quiet);

    let config_path = cli.config.as_deref();

    let code = match cli.command {
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => commands::config_show(config_path)?,
                ConfigAction::Path => commands::config_path(),
                ConfigAction::Init { force } => commands::config_init(config_path, force)?,
            }
            0
        }

        Commands::Deploy => {
            let engine = build_engine(config_path)?;
            let cancel = CancellationToken::new();
            spawn_signal_handler(cancel.clone());
            commands::deploy_command(&engine, &cancel).await?
        }

        Commands::Diagnose { json } => {
            let engine = build_engine(config_path)?;
            commands::diagnose_command(&engine, json).await?
        }

        Commands::Plan => {
            let engine = build_engine(config_path)?;
            commands::plan_command(&engine).await?
        }

        Commands::Verify { json } => {
            let engine = build_engine(config_path)?;
            commands::verify_command(&engine, json).await?
        }

        Commands::UpdateConfig { tunnel_id } => {
            let engine = build_engine(config_path)?;
            commands::update_config_command(&engine, tunnel_id).await?;
            0
        }
    };

    Ok(exit_code(code))
}

fn build_engine(config_path: Option<&std::path::Path>) -> Result<Engine> {
    let config = load_deploy_config(config_path).context("Failed to load configuration")?;
    Engine::system(config).context("Failed to initialise HTTP client")
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, cancelling...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, cancelling...");
            }
        }

        cancel.cancel();
    });
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map(ExitCode::from).unwrap_or(ExitCode::FAILURE)
}
