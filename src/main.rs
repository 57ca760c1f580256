use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use booking_notifier::airtable::AirtableClient;
use booking_notifier::config;
use booking_notifier::dispatch::{self, Dispatcher};
use booking_notifier::model::DispatchOutcome;
use booking_notifier::telegram::TelegramClient;
use booking_notifier::webhook;

#[derive(Debug, Parser)]
#[command(author, version, about = "Telegram notifications for newly assigned course bookings")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the bookings table on the configured interval (default)
    Poll,
    /// Run a single poll cycle and exit
    Once,
    /// Serve the inbound trigger endpoint
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config)).context("failed to load configuration")?;

    let store = Arc::new(AirtableClient::from_config(&cfg)?);
    let sender = Arc::new(TelegramClient::from_config(&cfg)?);
    let dispatcher = Dispatcher::new(store, sender, &cfg);

    match args.command.unwrap_or(Command::Poll) {
        Command::Poll => {
            info!(
                interval_secs = cfg.app.poll_interval_secs,
                table = %cfg.airtable.table,
                "starting booking notification poller"
            );
            dispatch::run_poll_loop(&dispatcher, cfg.poll_interval(), shutdown_signal()).await;
        }
        Command::Once => {
            let report = dispatcher.run_cycle().await?;
            let failed = report.count(DispatchOutcome::SendFailed)
                + report.count(DispatchOutcome::UpdateFailed);
            if failed > 0 {
                warn!(failed, "some notifications did not complete");
            }
        }
        Command::Serve => {
            let app = webhook::add_routes(Router::new(), Arc::new(dispatcher));
            let listener = tokio::net::TcpListener::bind(&cfg.app.bind)
                .await
                .with_context(|| format!("failed to bind {}", cfg.app.bind))?;
            info!(bind = %cfg.app.bind, "serving trigger endpoint");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    info!("booking notifier stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
