//! Engine configuration

use crate::request::SendPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;

/// Transaction engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Response timeout applied when an operation does not set one
    pub default_timeout_ms: u64,
    /// Policy applied when an operation does not set one
    pub default_send_policy: SendPolicy,
    /// Fast poll duration requested in checkin responses, in quarter-seconds
    pub fast_poll_timeout: u16,
    pub event_channel_capacity: usize,
    /// Ask the adapter for a new route when a default response fails
    pub route_discovery_on_failure: bool,
    /// Source endpoint of outgoing frames
    pub source_endpoint: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            default_send_policy: SendPolicy::Queue,
            fast_poll_timeout: 0,
            event_channel_capacity: 64,
            route_discovery_on_failure: true,
            source_endpoint: 1,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value {:?} for {}", raw, key);
            default
        }),
        Err(_) => default,
    }
}

impl EngineConfig {
    /// Defaults overridden by `ZCL_*` environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `ZCL_*` environment variables on top of these settings
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        Self {
            default_timeout_ms: env_or("ZCL_DEFAULT_TIMEOUT_MS", self.default_timeout_ms),
            default_send_policy: env_or("ZCL_SEND_POLICY", self.default_send_policy),
            fast_poll_timeout: env_or("ZCL_FAST_POLL_TIMEOUT", self.fast_poll_timeout),
            event_channel_capacity: env_or("ZCL_EVENT_CAPACITY", self.event_channel_capacity),
            route_discovery_on_failure: env_or(
                "ZCL_ROUTE_DISCOVERY",
                self.route_discovery_on_failure,
            ),
            source_endpoint: env_or("ZCL_SOURCE_ENDPOINT", self.source_endpoint),
        }
    }

    /// Load settings from a JSON file, then apply environment overrides
    pub async fn load(path: &Path) -> Self {
        let config = match fs::read_to_string(path).await {
            Ok(contents) => match serde_json::from_str::<EngineConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded engine config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        };
        config.with_env_overrides()
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}
