//! Maintenance entry point for calls-core
//!
//! `sync` runs one maintenance pass (queued sweep, then stale sweep) and is
//! meant to be invoked from cron. `serve` runs the webhook endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use calls_core::api::{create_router, ApiState};
use calls_core::logging::setup_logging;
use calls_core::{init, CallsConfig, MemoryDirectory};

#[derive(Parser, Debug)]
#[command(name = "calls-maintenance", version, about = "Outbound call maintenance")]
struct Cli {
    /// TOML configuration file; `CALLS__*` environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll long-queued calls and fail stale ones
    Sync,
    /// Serve the provider webhook endpoint
    Serve {
        /// Overrides `api_bind_address`
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CallsConfig::load(cli.config.as_deref()).context("loading configuration")?;
    setup_logging(&config.logging)?;

    // neither subcommand creates calls, so no contact source is wired in
    let service = init(&config, Arc::new(MemoryDirectory::new()))
        .await
        .context("initializing call service")?;

    match cli.command {
        Command::Sync => {
            let report = service.run_maintenance().await?;
            println!(
                "Synced {}/{} queued call(s); marked {} stale call(s) as failed",
                report.synced, report.examined, report.failed
            );
        }
        Command::Serve { bind } => {
            let address = bind.unwrap_or_else(|| config.api_bind_address.clone());
            let state = ApiState::new(service.push_channel().clone(), config.webhook_secret());
            if state.webhook_secret.is_none() {
                warn!("No webhook secret configured - webhook authentication is disabled");
            }

            let listener = tokio::net::TcpListener::bind(&address)
                .await
                .with_context(|| format!("binding {}", address))?;
            info!("Webhook endpoint listening on {}", address);
            axum::serve(listener, create_router(state)).await?;
        }
    }

    Ok(())
}
