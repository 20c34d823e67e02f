//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Backend-for-frontend for Google device login and the YouTube Data API
#[derive(Parser, Debug)]
#[command(name = "tube-bff")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "TUBE_BFF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "TUBE_BFF_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "TUBE_BFF_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides `logging.level`
    #[arg(long, env = "TUBE_BFF_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json); overrides `logging.format`
    #[arg(long, env = "TUBE_BFF_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the server (default)
    Serve,

    /// Load and validate the configuration, then print it with secrets masked
    CheckConfig,
}
