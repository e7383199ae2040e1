use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::matcher::DEFAULT_MATCH_CACHE_CAPACITY;
use crate::queue::{QueueLimits, DEFAULT_PENDING_BYTES_LIMIT, DEFAULT_PENDING_MSGS_LIMIT};

pub const DEFAULT_INBOX_PREFIX: &str = "_INBOX";
pub const DEFAULT_API_PREFIX: &str = "$JS.API";
pub const DEFAULT_ACK_SYNC_TIMEOUT: Duration = Duration::from_millis(500);
/// Subtracted from a fetch timeout to get the server-side pull expiry, so
/// the server gives up before the client does.
pub const DEFAULT_EXPIRES_MARGIN: Duration = Duration::from_micros(100);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Client-side knobs for routing, pull fetches and acknowledgments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix for generated reply inboxes.
    pub inbox_prefix: String,
    /// Prefix of the stream API subjects.
    pub api_prefix: String,
    /// Per-subscription cap on queued messages.
    pub pending_msgs_limit: usize,
    /// Per-subscription cap on queued payload bytes.
    pub pending_bytes_limit: usize,
    /// Match cache entries kept by the dispatcher; 0 disables caching.
    pub match_cache_capacity: usize,
    /// Confirmation wait used by `ack_sync` when no timeout is given.
    #[serde(with = "humantime_serde")]
    pub ack_sync_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub expires_margin: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            inbox_prefix: DEFAULT_INBOX_PREFIX.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            pending_msgs_limit: DEFAULT_PENDING_MSGS_LIMIT,
            pending_bytes_limit: DEFAULT_PENDING_BYTES_LIMIT,
            match_cache_capacity: DEFAULT_MATCH_CACHE_CAPACITY,
            ack_sync_timeout: DEFAULT_ACK_SYNC_TIMEOUT,
            expires_margin: DEFAULT_EXPIRES_MARGIN,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Points the API prefix at a named domain (`$JS.<domain>.API`).
    ///
    /// An empty domain restores the default prefix.
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.api_prefix = if domain.is_empty() {
            DEFAULT_API_PREFIX.to_string()
        } else {
            format!("$JS.{domain}.API")
        };
        self
    }

    pub fn queue_limits(&self) -> QueueLimits {
        QueueLimits {
            max_msgs: self.pending_msgs_limit,
            max_bytes: self.pending_bytes_limit,
        }
    }
}
