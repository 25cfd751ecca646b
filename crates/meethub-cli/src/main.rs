//! Meethub CLI - a command line client for the meethub meeting support platform.
//!
//! Logs in, keeps the session between runs and sends requests through the
//! same cached, self-refreshing pipeline the other frontends use.

mod cli;
mod commands;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use meethub_core::{ApiClient, ClientConfig, SessionEvent};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, and additionally to `log_file` when given. The returned
/// guard flushes the file writer and must be held until exit.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;
    info!("meethub starting");

    let mut config = ClientConfig::load().context("Failed to load config")?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    let client = ApiClient::from_config(&config).context("Failed to create API client")?;
    let mut events = client.events().subscribe();

    let result = match cli.command {
        Commands::Login(args) => commands::login(&client, args).await,
        Commands::Register(args) => commands::register(&client, args).await,
        Commands::Logout => {
            commands::logout(&client);
            Ok(())
        }
        Commands::Status => {
            commands::status(&client);
            Ok(())
        }
        Commands::Get(args) => commands::get(&client, args).await,
        Commands::Config => commands::app_config(&client).await,
        Commands::Guard(args) => {
            commands::guard(&client, &config.route_guard(), &args.path);
            Ok(())
        }
    };

    while let Ok(event) = events.try_recv() {
        if let SessionEvent::SessionExpired { reason } = event {
            eprintln!("Your session has expired ({}). Please log in again.", reason);
        }
    }

    result
}
