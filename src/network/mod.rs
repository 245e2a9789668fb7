//! Station link management module
//!
//! This module owns the socket lifecycle: the transport abstraction and its
//! websocket implementation, the reconnecting connection state machine, and
//! the host link-quality sampler.

mod connection;
mod quality;
mod transport;

pub use self::connection::{Activity, Connection};
pub use self::quality::{FixedLinkSpeed, LinkQuality, NetworkSampler, SysfsLinkSpeed, Unsupported};
pub use self::transport::{Connector, Link, WsConnector, WsLink};

#[cfg(test)]
pub(crate) use self::connection::tests::MockConnector;
