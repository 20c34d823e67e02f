//! tube-bff - backend-for-frontend for Google device login and YouTube reads

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use tube_bff::{
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            if let Some(ref level) = cli.log_level {
                config.logging.level = level.clone();
            }
            if let Some(ref format) = cli.log_format {
                config.logging.format = format.clone();
            }
            config
        }
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Setup tracing
    if let Err(e) = setup_tracing(
        &config.logging.level,
        Some(config.logging.format.as_str()),
        config.logging.error_file.as_deref(),
    ) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::CheckConfig) => check_config(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Validate and print the effective configuration
fn check_config(config: &Config) -> ExitCode {
    match serde_json::to_string_pretty(&config.redacted()) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!("Failed to render configuration: {e}");
            return ExitCode::FAILURE;
        }
    }

    match config.validate() {
        Ok(()) => {
            println!("Configuration OK");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        cache_ttl_secs = config.cache.ttl_in_seconds,
        "Starting tube-bff"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = gateway.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
