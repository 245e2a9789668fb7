//! Station protocol module
//!
//! This module defines the versioned telemetry frame layouts, the frame decoder,
//! the command encoder, the consumer message vocabulary and the connection
//! lifecycle states.

pub mod codec;
pub mod command;
pub mod frame;
pub mod layout;
pub mod message;
pub mod state;

pub use self::command::{Command, CommandEncoder, Opcode};
pub use self::frame::{DecodedFrame, FrameDecoder, Inbound, SensorState};
pub use self::layout::{Field, FieldSpec, FieldType, Layout, LayoutVersion, WireKind};
pub use self::message::{Event, Request};
pub use self::state::ConnectionState;
