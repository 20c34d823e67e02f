//! tube-bff library
//!
//! Backend-for-frontend that lets a device log a user in with the Google
//! OAuth device flow and then reads their YouTube data on their behalf.
//!
//! # Features
//!
//! - **Response cache**: identical requests within the TTL are answered from
//!   memory; error responses are never stored
//! - **Device flow poller**: waits for the user's approval, honouring
//!   `slow_down`, an overall budget and caller cancellation
//! - **YouTube Data API**: subscriptions, channels and playlist items
//! - **Website**: home page, privacy policy and terms of service

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod oauth;
pub mod website;
pub mod youtube;

pub use error::{Error, Result};

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Setup tracing/logging
///
/// `RUST_LOG` wins over `level` when set. With `error_file`, `ERROR` events
/// are also written to that file (see [`error_file_layer`]).
pub fn setup_tracing(level: &str, format: Option<&str>, error_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let error_layer = error_file.map(error_file_layer).transpose()?;

    let subscriber = tracing_subscriber::registry().with(filter).with(error_layer);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
    }
}

/// Layer writing `ERROR` events, without colours, to `path`.
///
/// The file rotates daily (the date is appended to its name) and one backup
/// is kept. Missing parent directories are created.
pub fn error_file_layer<S>(path: &Path) -> Result<impl Layer<S> + use<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Config(format!("Invalid error log file: {}", path.display())))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_name)
        .max_log_files(2)
        .build(dir)
        .map_err(|e| Error::Config(format!("Cannot open {}: {e}", path.display())))?;

    Ok(fmt::layer()
        .with_writer(appender)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR))
}
