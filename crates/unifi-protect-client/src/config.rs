//! Client configuration.
//!
//! All knobs live here and are passed into [`ProtectClient::new`]; there is
//! no module-level state. `from_env` covers the conventional `UFP_*`
//! variables for tooling that configures itself from the environment.
//!
//! [`ProtectClient::new`]: crate::ProtectClient::new

use std::time::Duration;

use serde::{Deserialize, Serialize};

use unifi_protect_data::engine::EngineConfig;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "kebab-case"), default)]
pub struct ProtectConfig {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Long-lived API key for the public integration API. The private API
    /// still requires cookie auth even when this is set.
    pub api_key: Option<String>,
    pub verify_ssl: bool,
    /// Per-request connect/read timeout in seconds. WebSocket reads are
    /// exempt; the socket has its own keepalive.
    pub request_timeout_secs: u64,
    /// TTL of echo-suppression entries in milliseconds.
    pub echo_suppression_ttl_ms: u64,
    /// Ring events do not always get an end packet; the ring flag resets
    /// after this many milliseconds.
    pub ring_reset_ms: u64,
    /// Unread state-channel messages before a slow subscriber is dropped.
    pub state_channel_capacity: usize,
    /// Strip stats/telemetry churn from update packets.
    pub ignore_stats: bool,
}

impl Default for ProtectConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: 443,
            username: String::new(),
            password: String::new(),
            api_key: None,
            verify_ssl: true,
            request_timeout_secs: 30,
            echo_suppression_ttl_ms: 2_000,
            ring_reset_ms: 3_000,
            state_channel_capacity: 100,
            ignore_stats: false,
        }
    }
}

impl ProtectConfig {
    /// Builds a config from the `UFP_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            address: std::env::var("UFP_ADDRESS")
                .map_err(|_| Error::Config("UFP_ADDRESS is not set".to_string()))?,
            username: std::env::var("UFP_USERNAME").unwrap_or_default(),
            password: std::env::var("UFP_PASSWORD").unwrap_or_default(),
            api_key: std::env::var("UFP_API_KEY").ok(),
            ..Self::default()
        };
        if let Ok(port) = std::env::var("UFP_PORT") {
            config.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid UFP_PORT: {port}")))?;
        }
        if let Ok(verify) = std::env::var("UFP_SSL_VERIFY") {
            config.verify_ssl = !matches!(verify.to_lowercase().as_str(), "false" | "0" | "no");
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(Error::Config("address must not be empty".to_string()));
        }
        if self.username.is_empty() && self.api_key.is_none() {
            return Err(Error::Config(
                "either username/password or api-key is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ring_reset(&self) -> Duration {
        Duration::from_millis(self.ring_reset_ms)
    }

    pub(crate) fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            ignore_ttl: Duration::from_millis(self.echo_suppression_ttl_ms),
            ignore_stats: self.ignore_stats,
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProtectConfig::default();
        assert_eq!(config.port, 443);
        assert!(config.verify_ssl);
        assert_eq!(config.echo_suppression_ttl_ms, 2_000);
        assert_eq!(config.ring_reset_ms, 3_000);
    }

    #[test]
    fn validate_requires_credentials() {
        let config = ProtectConfig {
            address: "192.168.1.1".into(),
            ..ProtectConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ProtectConfig {
            address: "192.168.1.1".into(),
            api_key: Some("key".into()),
            ..ProtectConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn kebab_case_file_form() {
        let config: ProtectConfig = serde_json::from_str(
            r#"{
                "address": "192.168.1.1",
                "username": "svc",
                "password": "pw",
                "verify-ssl": false,
                "ring-reset-ms": 5000
            }"#,
        )
        .unwrap();
        assert!(!config.verify_ssl);
        assert_eq!(config.ring_reset_ms, 5_000);
    }
}
