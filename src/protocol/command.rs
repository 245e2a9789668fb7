use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::{Error, Result};
use super::layout::LayoutVersion;

/// Command opcodes understood by the station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Start recording a flight
    Start = 0x01,
    /// Stop recording
    Stop = 0x02,
    /// Swap runway direction by 180 degrees
    FromTo = 0x03,
    /// Set runway elevation
    SetElevation = 0x04,
    /// Set runway heading
    SetHeading = 0x05,
    /// Synchronize the station clock to GPS time
    TimeSync = 0x06,
}

impl Opcode {
    /// Opcode byte on the wire
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Looks up the opcode for a wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Opcode::Start),
            0x02 => Some(Opcode::Stop),
            0x03 => Some(Opcode::FromTo),
            0x04 => Some(Opcode::SetElevation),
            0x05 => Some(Opcode::SetHeading),
            0x06 => Some(Opcode::TimeSync),
            _ => None,
        }
    }

    /// Exact frame length for this opcode, opcode byte included
    pub fn frame_len(self) -> usize {
        match self {
            Opcode::Start => 4,
            Opcode::SetElevation | Opcode::SetHeading => 3,
            Opcode::Stop | Opcode::FromTo | Opcode::TimeSync => 1,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#04x})", self, self.byte())
    }
}

/// Outbound command with its arguments as supplied by the consumer
///
/// Arguments are kept wide; they are checked against their wire width when
/// encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin recording a flight
    ///
    /// The command frame is canonical: flight number travels as an unsigned
    /// 16-bit word and top number as an unsigned byte, and [`Command::parse`]
    /// reads them back unsigned. Telemetry frames echo both as signed fields, so
    /// a `SensorState` shows values above 32767 and 127 as negative.
    Start { flight_number: i64, top_number: i64 },
    Stop,
    FromTo,
    SetElevation { elevation: i64 },
    SetHeading { heading: i64 },
    TimeSync,
}

impl Command {
    /// Opcode selecting this command
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Start { .. } => Opcode::Start,
            Command::Stop => Opcode::Stop,
            Command::FromTo => Opcode::FromTo,
            Command::SetElevation { .. } => Opcode::SetElevation,
            Command::SetHeading { .. } => Opcode::SetHeading,
            Command::TimeSync => Opcode::TimeSync,
        }
    }

    /// Parses a command frame, the inverse of [`CommandEncoder::encode`]
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let (&byte, args) = frame
            .split_first()
            .ok_or_else(|| Error::invalid_request("Empty command frame"))?;
        let opcode = Opcode::from_byte(byte)
            .ok_or_else(|| Error::invalid_request(format!("Unknown opcode {:#04x}", byte)))?;
        if frame.len() != opcode.frame_len() {
            return Err(Error::invalid_request(format!(
                "{} frame must be {} bytes, got {}",
                opcode,
                opcode.frame_len(),
                frame.len()
            )));
        }

        let word = |i: usize| i16::from_le_bytes([args[i], args[i + 1]]);
        Ok(match opcode {
            Opcode::Start => Command::Start {
                flight_number: u16::from_le_bytes([args[0], args[1]]).into(),
                top_number: args[2].into(),
            },
            Opcode::Stop => Command::Stop,
            Opcode::FromTo => Command::FromTo,
            Opcode::SetElevation => Command::SetElevation {
                elevation: word(0).into(),
            },
            Opcode::SetHeading => Command::SetHeading {
                heading: word(0).into(),
            },
            Opcode::TimeSync => Command::TimeSync,
        })
    }
}

/// Encoder for the command set of one layout revision
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandEncoder {
    version: LayoutVersion,
}

impl CommandEncoder {
    /// Creates an encoder for `version`
    pub fn new(version: LayoutVersion) -> Self {
        CommandEncoder { version }
    }

    /// Encodes `command` into a new buffer of exactly the opcode's length
    pub fn encode(&self, command: &Command) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(command.opcode().frame_len());
        self.encode_into(command, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Appends the encoded `command` to `dst`; nothing is written on error
    pub fn encode_into(&self, command: &Command, dst: &mut BytesMut) -> Result<()> {
        let opcode = command.opcode();
        if !self.version.supports(opcode) {
            return Err(Error::UnsupportedOpcode {
                opcode,
                revision: self.version,
            });
        }

        // Validate everything before the first write
        match *command {
            Command::Start {
                flight_number,
                top_number,
            } => {
                let flight = u16::try_from(flight_number)
                    .map_err(|_| Error::out_of_range("flightNumber", flight_number))?;
                let top = u8::try_from(top_number)
                    .map_err(|_| Error::out_of_range("topNumber", top_number))?;
                dst.put_u8(opcode.byte());
                dst.put_u16_le(flight);
                dst.put_u8(top);
            }
            Command::SetElevation { elevation } => {
                let elevation = i16::try_from(elevation)
                    .map_err(|_| Error::out_of_range("elevation", elevation))?;
                dst.put_u8(opcode.byte());
                dst.put_i16_le(elevation);
            }
            Command::SetHeading { heading } => {
                let heading = i16::try_from(heading)
                    .map_err(|_| Error::out_of_range("heading", heading))?;
                dst.put_u8(opcode.byte());
                dst.put_i16_le(heading);
            }
            Command::Stop | Command::FromTo | Command::TimeSync => {
                dst.put_u8(opcode.byte());
            }
        }
        Ok(())
    }
}
