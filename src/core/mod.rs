//! Core types shared by the telemetry channel
//!
//! Errors, configuration and the fixed timing constants of the station link.

pub mod error;
pub mod serde;
pub mod types;

use std::time::Duration;

pub use self::error::{Error, Result};
pub use self::types::ChannelConfig;

/// Fixed pause before reconnecting after the link drops
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Longest wait for a websocket handshake before the attempt counts as failed
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Fixed cadence of link-quality samples
pub const NETWORK_SAMPLE_PERIOD: Duration = Duration::from_millis(5000);

/// Default websocket port of the station server
pub const DEFAULT_PORT: u16 = 10024;

/// Websocket subprotocol the station broadcasts on
pub const DEFAULT_SUBPROTOCOL: &str = "broadcast";
