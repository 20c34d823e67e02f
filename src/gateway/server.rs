//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::Client;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::oauth::GoogleOAuthClient;
use crate::youtube::YoutubeClient;
use crate::{Error, Result};

/// BFF server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Shared state handed to every handler
    state: Arc<AppState>,
}

impl Gateway {
    /// Build the upstream clients and the cache from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is incomplete or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.upstream_timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {e}")))?;

        let state = Arc::new(AppState {
            oauth: GoogleOAuthClient::new(http.clone(), config.google.clone()),
            youtube: YoutubeClient::new(http, &config.google),
            cache: Arc::new(ResponseCache::new(config.cache_ttl())),
            poll_timeout: config.request_timeout(),
            max_body_size: config.server.max_body_size,
        });

        Ok(Self { config, state })
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = create_router(self.state);
        let listener = TcpListener::bind(addr).await?;

        info!(
            addr = %addr,
            cache_ttl_secs = self.config.cache.ttl_in_seconds,
            poll_budget_secs = self.config.http.request_timeout,
            "tube-bff listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
