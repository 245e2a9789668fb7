use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};
use crate::protocol::LayoutVersion;

/// Configuration for a telemetry channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Station websocket endpoint
    pub url: String,
    /// Websocket subprotocol to request, if any
    pub subprotocol: Option<String>,
    /// Frame layout revision spoken by the station
    pub layout: LayoutVersion,
    /// Pause between losing the link and the next connection attempt
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub reconnect_delay: Duration,
    /// Limit on a single handshake; a station that accepts TCP but never
    /// upgrades is treated as a failed attempt after this long
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub handshake_timeout: Duration,
    /// Cadence of link-quality samples
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub sample_period: Duration,
    /// Capacity of the consumer request mailbox
    pub mailbox_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            url: format!("ws://127.0.0.1:{}", super::DEFAULT_PORT),
            subprotocol: Some(super::DEFAULT_SUBPROTOCOL.to_string()),
            layout: LayoutVersion::CURRENT,
            reconnect_delay: super::RECONNECT_DELAY,
            handshake_timeout: super::HANDSHAKE_TIMEOUT,
            sample_period: super::NETWORK_SAMPLE_PERIOD,
            mailbox_capacity: 64,
        }
    }
}

impl ChannelConfig {
    /// Creates a default configuration pointing at `url`
    pub fn with_url(url: impl Into<String>) -> Self {
        ChannelConfig {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Parses a JSON configuration document; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ChannelConfig = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can drive a channel
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(Error::config(format!(
                "Station url must use ws:// or wss://, got {}",
                self.url
            )));
        }
        if self.reconnect_delay.is_zero() {
            return Err(Error::config("Reconnect delay must be non-zero"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::config("Handshake timeout must be non-zero"));
        }
        if self.sample_period.is_zero() {
            return Err(Error::config("Sample period must be non-zero"));
        }
        if self.mailbox_capacity == 0 {
            return Err(Error::config("Mailbox capacity must be non-zero"));
        }
        Ok(())
    }
}
