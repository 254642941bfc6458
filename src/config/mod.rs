//! Configuration module for the project sync service.
//!
//! All configuration is loaded from environment variables with sensible defaults.
//! Whether a remote backend is configured is decided here once and never revisited.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;

/// Whole values that ship in `.env.example` files and mean "not configured".
const PLACEHOLDER_VALUES: [&str; 2] = ["changeme", "placeholder"];

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite file backing the local fallback store
    pub db_path: PathBuf,
    /// Remote document service URL (`sqlite:<path>` or `memory:`)
    pub remote_url: Option<String>,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Bounded wait before a silent subscription is treated as loaded
    pub first_push_timeout: Duration,
    /// How often remote subscriptions re-read for writes made by other clients
    pub poll_interval: Duration,
    /// Identity to sign in as at startup
    pub user_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("PSYNC_DB_PATH")
            .unwrap_or_else(|_| "./data/local.sqlite".to_string())
            .into();

        let remote_url = env::var("PSYNC_REMOTE_URL").ok();

        let bind_addr_raw =
            env::var("PSYNC_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = bind_addr_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "PSYNC_BIND_ADDR",
            value: bind_addr_raw.clone(),
        })?;

        let log_level = env::var("PSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let first_push_timeout = millis_var("PSYNC_FIRST_PUSH_TIMEOUT_MS", 5000)?;
        let poll_interval = millis_var("PSYNC_POLL_INTERVAL_MS", 1000)?;

        let user_id = env::var("PSYNC_USER_ID").ok().filter(|s| !s.trim().is_empty());

        Ok(Self {
            db_path,
            remote_url,
            bind_addr,
            log_level,
            first_push_timeout,
            poll_interval,
            user_id,
        })
    }

    /// The remote URL, if one is present and not a placeholder.
    pub fn remote(&self) -> Option<&str> {
        self.remote_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !is_placeholder(url))
    }

    pub fn remote_configured(&self) -> bool {
        self.remote().is_some()
    }
}

fn is_placeholder(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let lower = value.to_ascii_lowercase();
    PLACEHOLDER_VALUES.contains(&lower.as_str())
        || lower.starts_with("your-")
        || (lower.starts_with('<') && lower.ends_with('>'))
}

fn millis_var(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(Duration::from_millis(default)),
    }
}

#[cfg(test)]
impl Config {
    /// Config for tests: local store at `db_path`, no remote, quiet logging.
    pub fn for_tests(db_path: PathBuf) -> Self {
        Self {
            db_path,
            remote_url: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "warn".to_string(),
            first_push_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(50),
            user_id: None,
        }
    }
}
