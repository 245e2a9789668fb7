//! Versioned frame layouts
//!
//! Every revision of the station frame is a table of `(field, offset, kind)` rows.
//! The decoder walks the table of its configured revision; supporting a new
//! revision means adding a table here.
//!
//! # Revision history
//!
//! - **V0** (tag `0x00`, 140 bytes): first broadcast layout. Byte 0 was the
//!   master-client slot and is always zero on the wire. Single-byte calendar and
//!   GPS codes, year/flight/heading/wind direction as 16-bit words, GPS time as a
//!   split 64-bit counter, then fourteen doubles. Runway elevation and barometer
//!   height were doubles. Understands `Start` and `Stop` commands.
//! - **V1** (tag `0x01`, 155 bytes): adds GPS mode, from/to status, the
//!   barometer-height class byte, runway elevation as a 16-bit word, mean wind
//!   direction and speed, station local time and the local-vs-GPS time
//!   difference. Understands the full command set.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::command::Opcode;

/// Wire representation of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    /// Signed byte
    I8,
    /// Signed 16-bit little-endian word
    I16,
    /// Unsigned 64-bit counter stored as two little-endian 32-bit halves, low half first
    U64Split,
    /// IEEE-754 double, little-endian
    F64,
}

impl WireKind {
    /// Number of bytes the field occupies
    pub const fn width(self) -> usize {
        match self {
            WireKind::I8 => 1,
            WireKind::I16 => 2,
            WireKind::U64Split | WireKind::F64 => 8,
        }
    }

    /// Whether values of this kind widen into `ty` without loss of range
    pub const fn fits(self, ty: FieldType) -> bool {
        matches!(
            (self, ty),
            (WireKind::I8, FieldType::Int8)
                | (WireKind::I8 | WireKind::I16, FieldType::Int16)
                | (_, FieldType::Float)
        )
    }
}

/// Type of the [`SensorState`](super::SensorState) member a field lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int8,
    Int16,
    Float,
}

/// Named sensor fields carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    RecordStatus,
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
    Humidity,
    TopNumber,
    FlightNumber,
    GpsStatus,
    GpsMode,
    GpsSatellitesVisible,
    GpsSatellitesUsed,
    FromToStatus,
    GpsTime,
    GpsHdop,
    GpsPdop,
    GpsLat,
    GpsLon,
    GpsAltMsl,
    BarometerHeight,
    RunwayElevation,
    RunwayHeading,
    Temperature,
    BaroPressure,
    WindDirection,
    WindDirectionMean,
    Windspeed,
    WindspeedMean,
    CrossWindspeed,
    HeadWindspeed,
    BaroQfe,
    BaroQnh,
    LocalTime,
    TimeDifference,
}

impl Field {
    /// Type of the decoded member this field fills
    pub const fn ty(self) -> FieldType {
        match self {
            Field::RecordStatus
            | Field::Second
            | Field::Minute
            | Field::Hour
            | Field::Day
            | Field::Month
            | Field::Humidity
            | Field::TopNumber
            | Field::GpsStatus
            | Field::GpsMode
            | Field::GpsSatellitesVisible
            | Field::GpsSatellitesUsed
            | Field::FromToStatus => FieldType::Int8,
            Field::Year
            | Field::FlightNumber
            | Field::RunwayHeading
            | Field::WindDirection
            | Field::WindDirectionMean => FieldType::Int16,
            _ => FieldType::Float,
        }
    }
}

/// Placement of one field inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field the bytes map to
    pub field: Field,
    /// Byte offset from the start of the frame
    pub offset: usize,
    /// Wire representation
    pub kind: WireKind,
}

impl FieldSpec {
    // Tables are statics, so a row whose kind does not fit its field fails the build
    const fn new(field: Field, offset: usize, kind: WireKind) -> Self {
        assert!(kind.fits(field.ty()), "wire kind does not fit field type");
        FieldSpec { field, offset, kind }
    }

    /// First byte past the field
    pub const fn end(&self) -> usize {
        self.offset + self.kind.width()
    }
}

/// A complete frame layout
#[derive(Debug)]
pub struct Layout {
    /// Value of byte 0 identifying this layout
    pub tag: u8,
    /// Minimum frame length
    pub len: usize,
    /// Field placements, ordered by offset
    pub fields: &'static [FieldSpec],
    /// Commands the station understands in this revision
    pub opcodes: &'static [Opcode],
}

/// Offset of the revision tag in every layout
pub const TAG_OFFSET: usize = 0;

/// Frame layout revisions, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutVersion {
    V0,
    V1,
}

impl LayoutVersion {
    /// Revision spoken by current station firmware
    pub const CURRENT: LayoutVersion = LayoutVersion::V1;

    /// All known revisions
    pub const ALL: [LayoutVersion; 2] = [LayoutVersion::V0, LayoutVersion::V1];

    /// Layout table for this revision
    pub fn layout(self) -> &'static Layout {
        match self {
            LayoutVersion::V0 => &LAYOUT_V0,
            LayoutVersion::V1 => &LAYOUT_V1,
        }
    }

    /// Tag byte identifying this revision on the wire
    pub fn tag(self) -> u8 {
        self.layout().tag
    }

    /// Looks up the revision carrying `tag`
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.tag() == tag)
    }

    /// Whether this revision defines `opcode`
    pub fn supports(self, opcode: Opcode) -> bool {
        self.layout().opcodes.contains(&opcode)
    }
}

impl Default for LayoutVersion {
    fn default() -> Self {
        LayoutVersion::CURRENT
    }
}

impl fmt::Display for LayoutVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutVersion::V0 => write!(f, "V0"),
            LayoutVersion::V1 => write!(f, "V1"),
        }
    }
}

use Field::*;
use WireKind::*;

static LAYOUT_V0: Layout = Layout {
    tag: 0x00,
    len: 140,
    fields: &[
        FieldSpec::new(RecordStatus, 1, I8),
        FieldSpec::new(Second, 2, I8),
        FieldSpec::new(Minute, 3, I8),
        FieldSpec::new(Hour, 4, I8),
        FieldSpec::new(Day, 5, I8),
        FieldSpec::new(Month, 6, I8),
        FieldSpec::new(Humidity, 7, I8),
        FieldSpec::new(TopNumber, 8, I8),
        FieldSpec::new(GpsStatus, 9, I8),
        FieldSpec::new(GpsSatellitesVisible, 10, I8),
        FieldSpec::new(GpsSatellitesUsed, 11, I8),
        FieldSpec::new(Year, 12, I16),
        FieldSpec::new(FlightNumber, 14, I16),
        FieldSpec::new(RunwayHeading, 16, I16),
        FieldSpec::new(WindDirection, 18, I16),
        FieldSpec::new(GpsTime, 20, U64Split),
        FieldSpec::new(GpsHdop, 28, F64),
        FieldSpec::new(GpsPdop, 36, F64),
        FieldSpec::new(GpsLat, 44, F64),
        FieldSpec::new(GpsLon, 52, F64),
        FieldSpec::new(GpsAltMsl, 60, F64),
        FieldSpec::new(BarometerHeight, 68, F64),
        FieldSpec::new(RunwayElevation, 76, F64),
        FieldSpec::new(Temperature, 84, F64),
        FieldSpec::new(BaroPressure, 92, F64),
        FieldSpec::new(Windspeed, 100, F64),
        FieldSpec::new(CrossWindspeed, 108, F64),
        FieldSpec::new(HeadWindspeed, 116, F64),
        FieldSpec::new(BaroQfe, 124, F64),
        FieldSpec::new(BaroQnh, 132, F64),
    ],
    opcodes: &[Opcode::Start, Opcode::Stop],
};

static LAYOUT_V1: Layout = Layout {
    tag: 0x01,
    len: 155,
    fields: &[
        FieldSpec::new(RecordStatus, 1, I8),
        FieldSpec::new(Second, 2, I8),
        FieldSpec::new(Minute, 3, I8),
        FieldSpec::new(Hour, 4, I8),
        FieldSpec::new(Day, 5, I8),
        FieldSpec::new(Month, 6, I8),
        FieldSpec::new(Humidity, 7, I8),
        FieldSpec::new(TopNumber, 8, I8),
        FieldSpec::new(GpsStatus, 9, I8),
        FieldSpec::new(GpsMode, 10, I8),
        FieldSpec::new(GpsSatellitesVisible, 11, I8),
        FieldSpec::new(GpsSatellitesUsed, 12, I8),
        FieldSpec::new(FromToStatus, 13, I8),
        FieldSpec::new(BarometerHeight, 14, I8),
        FieldSpec::new(Year, 15, I16),
        FieldSpec::new(FlightNumber, 17, I16),
        FieldSpec::new(RunwayHeading, 19, I16),
        FieldSpec::new(RunwayElevation, 21, I16),
        FieldSpec::new(WindDirection, 23, I16),
        FieldSpec::new(WindDirectionMean, 25, I16),
        FieldSpec::new(GpsTime, 27, U64Split),
        FieldSpec::new(GpsHdop, 35, F64),
        FieldSpec::new(GpsPdop, 43, F64),
        FieldSpec::new(GpsLat, 51, F64),
        FieldSpec::new(GpsLon, 59, F64),
        FieldSpec::new(GpsAltMsl, 67, F64),
        FieldSpec::new(Temperature, 75, F64),
        FieldSpec::new(BaroPressure, 83, F64),
        FieldSpec::new(Windspeed, 91, F64),
        FieldSpec::new(WindspeedMean, 99, F64),
        FieldSpec::new(CrossWindspeed, 107, F64),
        FieldSpec::new(HeadWindspeed, 115, F64),
        FieldSpec::new(BaroQfe, 123, F64),
        FieldSpec::new(BaroQnh, 131, F64),
        FieldSpec::new(LocalTime, 139, F64),
        FieldSpec::new(TimeDifference, 147, F64),
    ],
    opcodes: &[
        Opcode::Start,
        Opcode::Stop,
        Opcode::FromTo,
        Opcode::SetElevation,
        Opcode::SetHeading,
        Opcode::TimeSync,
    ],
};
