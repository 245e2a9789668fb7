use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use super::command::Command;
use super::frame::SensorState;

/// Requests a consumer can post to the channel
///
/// Serialized as `{"cmd": <name>, "data": <payload>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data", rename_all = "lowercase")]
pub enum Request {
    /// Open the station link
    Connect,
    /// Start recording a flight
    Start {
        #[serde(rename = "flightNumber")]
        flight_number: i64,
        #[serde(rename = "topNumber")]
        top_number: i64,
    },
    /// Stop recording
    Stop,
    /// Swap runway direction
    FromTo,
    /// Set runway elevation
    Elevation { elevation: i64 },
    /// Set runway heading
    Heading { heading: i64 },
    /// Synchronize the station clock
    TimeSync,
}

impl Request {
    /// Every request name the channel recognizes
    pub const NAMES: [&'static str; 7] = [
        "connect",
        "start",
        "stop",
        "fromto",
        "elevation",
        "heading",
        "timesync",
    ];

    /// Parses a JSON request envelope
    ///
    /// Unrecognized names yield [`Error::UnknownRequest`]; a known name with a
    /// malformed payload yields [`Error::InvalidRequest`].
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::invalid_request(format!("Malformed request: {}", e)))?;
        let name = value
            .get("cmd")
            .and_then(|cmd| cmd.as_str())
            .ok_or_else(|| Error::invalid_request("Request has no `cmd` name"))?;
        if !Self::NAMES.contains(&name) {
            return Err(Error::UnknownRequest(name.to_string()));
        }

        serde_json::from_value(value.clone())
            .map_err(|e| Error::invalid_request(format!("Bad `{}` request: {}", name, e)))
    }

    /// Station command carried by this request; `Connect` has none
    pub fn command(&self) -> Option<Command> {
        match *self {
            Request::Connect => None,
            Request::Start {
                flight_number,
                top_number,
            } => Some(Command::Start {
                flight_number,
                top_number,
            }),
            Request::Stop => Some(Command::Stop),
            Request::FromTo => Some(Command::FromTo),
            Request::Elevation { elevation } => Some(Command::SetElevation { elevation }),
            Request::Heading { heading } => Some(Command::SetHeading { heading }),
            Request::TimeSync => Some(Command::TimeSync),
        }
    }
}

/// Events the channel emits to its consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data", rename_all = "lowercase")]
pub enum Event {
    /// A station link epoch began
    Connected,
    /// The current epoch ended
    Disconnected,
    /// Host link-quality estimate
    Network {
        #[serde(rename = "downlinkMbps")]
        downlink_mbps: f64,
    },
    /// A decoded telemetry snapshot
    Data(SensorState),
}

impl Event {
    /// Request-vocabulary name of this event
    pub fn name(&self) -> &'static str {
        match self {
            Event::Connected => "connected",
            Event::Disconnected => "disconnected",
            Event::Network { .. } => "network",
            Event::Data(_) => "data",
        }
    }
}
