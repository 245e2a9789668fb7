use std::io;
use thiserror::Error;

use crate::protocol::{LayoutVersion, Opcode};

/// Error types for the telemetry channel
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame too short: layout needs {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Length required by the active layout
        expected: usize,
        /// Length of the received buffer
        actual: usize,
    },

    #[error("Layout mismatch: decoder expects tag {expected:#04x}, frame carries {found:#04x}")]
    LayoutMismatch {
        /// Tag of the configured layout revision
        expected: u8,
        /// Tag found in the frame
        found: u8,
    },

    #[error("Peer reported checksum failure: {0}")]
    PeerReportedChecksumFailure(String),

    #[error("Opcode {opcode} is not defined in layout revision {revision}")]
    UnsupportedOpcode {
        /// Requested opcode
        opcode: Opcode,
        /// Active layout revision
        revision: LayoutVersion,
    },

    #[error("Argument `{argument}` out of range: {value}")]
    ArgumentOutOfRange {
        /// Argument name as used in the request vocabulary
        argument: &'static str,
        /// Value that did not fit the wire width
        value: i64,
    },

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Unknown request: {0}")]
    UnknownRequest(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new socket error
    pub fn socket(msg: impl ToString) -> Self {
        Error::Socket(msg.to_string())
    }

    /// Creates a new invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates an argument range error
    pub fn out_of_range(argument: &'static str, value: i64) -> Self {
        Error::ArgumentOutOfRange { argument, value }
    }

    /// Whether this error means the link can no longer be trusted.
    ///
    /// A short or foreign frame means the stream is desynchronized, and a
    /// transport failure means there is no stream at all. Both end the epoch.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Error::FrameTooShort { .. } | Error::LayoutMismatch { .. } | Error::Socket(_)
        )
    }
}
