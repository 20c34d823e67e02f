//! Configuration management

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Flat variables understood for compatibility with existing deployments,
/// mapped onto their nested config keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("CACHE_TTL_IN_SECONDS", "cache.ttl_in_seconds"),
    ("HTTP_REQUEST_TIMEOUT", "http.request_timeout"),
    ("GOOGLE_CLIENT_ID", "google.client_id"),
    ("GOOGLE_CLIENT_SECRET", "google.client_secret"),
    ("GOOGLE_API_KEY", "google.api_key"),
];

/// Prefix for nested overrides, e.g. `TUBE_BFF_SERVER__PORT`
pub const ENV_PREFIX: &str = "TUBE_BFF_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before `${VAR}` expansion.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
    /// Outbound HTTP timeouts
    pub http: HttpConfig,
    /// Google OAuth and YouTube Data API settings
    pub google: GoogleConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum request body size (bytes) buffered for fingerprinting
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached response
    pub ttl_in_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_in_seconds: 60 }
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Overall budget (seconds) for one device login polling call
    pub request_timeout: u64,
    /// Timeout (seconds) for every single outbound call
    pub upstream_timeout: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: 120,
            upstream_timeout: 10,
        }
    }
}

/// Google OAuth and YouTube Data API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// YouTube Data API key
    pub api_key: String,
    /// Device authorization endpoint
    pub device_code_url: String,
    /// Token endpoint (device code and refresh token exchanges)
    pub token_url: String,
    /// YouTube Data API base URL
    pub youtube_api_url: String,
    /// Scope requested for device logins
    pub scope: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_key: String::new(),
            device_code_url: "https://oauth2.googleapis.com/device/code".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            youtube_api_url: "https://youtube.googleapis.com/youtube/v3".to_string(),
            scope: "https://www.googleapis.com/auth/youtube.readonly".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// `text` or `json`
    pub format: String,
    /// Also write `ERROR` events to this file, rotated daily
    pub error_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            error_file: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is missing or a value has the
    /// wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
        }

        let mut config: Self = Self::figment(path)
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        // Expand ${VAR} in credentials
        config.expand_env_vars();

        Ok(config)
    }

    /// Layered providers, lowest precedence first
    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(p) = path {
            figment = figment.merge(Yaml::file(p));
        }

        figment
            .merge(Env::raw().filter_map(|key| {
                LEGACY_ENV
                    .iter()
                    .find(|(var, _)| key.as_str().eq_ignore_ascii_case(var))
                    .map(|(_, target)| (*target).into())
            }))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in credential values
    fn expand_env_vars(&mut self) {
        // Pattern: ${VAR} or ${VAR:-default}
        let Ok(re) = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
            return;
        };

        for value in [
            &mut self.google.client_id,
            &mut self.google.client_secret,
            &mut self.google.api_key,
        ] {
            *value = Self::expand_string(&re, value);
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    /// Check that the configuration can serve traffic
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        for (name, value) in [
            ("google.client_id", &self.google.client_id),
            ("google.client_secret", &self.google.client_secret),
            ("google.api_key", &self.google.api_key),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{name} is required"));
            }
        }

        if self.http.request_timeout == 0 {
            problems.push("http.request_timeout must be positive".to_string());
        } else if self.http.upstream_timeout >= self.http.request_timeout {
            problems.push(format!(
                "http.upstream_timeout ({}s) must be shorter than http.request_timeout ({}s)",
                self.http.upstream_timeout, self.http.request_timeout
            ));
        }

        if self.http.upstream_timeout == 0 {
            problems.push("http.upstream_timeout must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(problems.join("; ")))
        }
    }

    /// Lifetime of cached responses
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_in_seconds)
    }

    /// Overall device login polling budget
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout)
    }

    /// Per-call outbound timeout
    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.http.upstream_timeout)
    }

    /// Copy safe to print: secrets are masked
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for value in [
            &mut copy.google.client_secret,
            &mut copy.google.api_key,
        ] {
            if !value.is_empty() {
                *value = "***".to_string();
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;

    fn valid() -> Config {
        Config {
            google: GoogleConfig {
                client_id: "id".into(),
                client_secret: "secret".into(),
                api_key: "key".into(),
                ..GoogleConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.upstream_timeout(), Duration::from_secs(10));
        assert_eq!(config.google.token_url, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn yaml_then_legacy_env_then_prefixed_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tube.yaml",
                r"
server:
  port: 9000
cache:
  ttl_in_seconds: 30
http:
  request_timeout: 90
google:
  client_id: from-yaml
",
            )?;
            jail.set_env("CACHE_TTL_IN_SECONDS", "45");
            jail.set_env("GOOGLE_CLIENT_SECRET", "legacy-secret");
            jail.set_env("TUBE_BFF_CACHE__TTL_IN_SECONDS", "15");
            jail.set_env("TUBE_BFF_GOOGLE__CLIENT_ID", "from-prefixed");

            let config = Config::load(Some(Path::new("tube.yaml"))).map_err(|e| e.to_string())?;

            assert_eq!(config.server.port, 9000);
            assert_eq!(config.http.request_timeout, 90);
            assert_eq!(config.cache.ttl_in_seconds, 15);
            assert_eq!(config.google.client_id, "from-prefixed");
            assert_eq!(config.google.client_secret, "legacy-secret");
            Ok(())
        });
    }

    #[test]
    fn legacy_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file("tube.yaml", "http:\n  request_timeout: 90\n")?;
            jail.set_env("HTTP_REQUEST_TIMEOUT", "30");

            let config = Config::load(Some(Path::new("tube.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.request_timeout(), Duration::from_secs(30));
            Ok(())
        });
    }

    #[test]
    fn error_log_file_from_env() {
        Jail::expect_with(|jail| {
            assert_eq!(Config::load(None).map_err(|e| e.to_string())?.logging.error_file, None);

            jail.set_env("TUBE_BFF_LOGGING__ERROR_FILE", "logs/tube-bff.log");
            let config = Config::load(None).map_err(|e| e.to_string())?;
            assert_eq!(
                config.logging.error_file.as_deref(),
                Some(Path::new("logs/tube-bff.log"))
            );
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/tube.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("not found")));
    }

    #[test]
    fn wrong_type_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file("tube.yaml", "server:\n  port: not-a-port\n")?;
            let err = Config::load(Some(Path::new("tube.yaml"))).unwrap_err();
            assert!(matches!(err, Error::Config(_)));
            Ok(())
        });
    }

    #[test]
    fn credentials_expand_from_env_files() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("google.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "TUBE_BFF_TEST_API_KEY=key-from-env-file").unwrap();
        drop(f);

        let mut config = Config {
            env_files: vec![env_path.to_string_lossy().to_string()],
            google: GoogleConfig {
                api_key: "${TUBE_BFF_TEST_API_KEY}".into(),
                client_secret: "${TUBE_BFF_TEST_UNSET_SECRET:-fallback}".into(),
                ..GoogleConfig::default()
            },
            ..Config::default()
        };
        config.load_env_files();
        config.expand_env_vars();

        assert_eq!(config.google.api_key, "key-from-env-file");
        assert_eq!(config.google.client_secret, "fallback");
    }

    #[test]
    fn missing_env_files_are_skipped() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Config::default()
        };
        config.load_env_files();
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_names_missing_credentials() {
        let err = Config::default().validate().unwrap_err().to_string();
        assert!(err.contains("google.client_id is required"));
        assert!(err.contains("google.client_secret is required"));
        assert!(err.contains("google.api_key is required"));
    }

    #[test]
    fn validate_rejects_upstream_timeout_beyond_budget() {
        let mut config = valid();
        config.http.request_timeout = 5;
        config.http.upstream_timeout = 5;
        assert!(config.validate().is_err());

        config.http.request_timeout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn redacted_masks_secrets() {
        let redacted = valid().redacted();
        assert_eq!(redacted.google.client_id, "id");
        assert_eq!(redacted.google.client_secret, "***");
        assert_eq!(redacted.google.api_key, "***");
    }
}
