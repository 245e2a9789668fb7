//! meteo_link: telemetry channel for weather and navigation stations
//!
//! This library keeps a websocket link to a station open, decodes its
//! fixed-layout binary frames into [`SensorState`] snapshots, encodes control
//! commands, and reconnects on its own after the link drops. Consumers talk to
//! it only by message passing through a [`ChannelHandle`].
pub mod channel;
pub mod core;
pub mod network;
pub mod protocol;

// Re-export commonly used items
pub use crate::channel::{Channel, ChannelHandle};
pub use crate::core::{ChannelConfig, Error, Result};
pub use crate::protocol::{Command, ConnectionState, Event, LayoutVersion, Request, SensorState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
