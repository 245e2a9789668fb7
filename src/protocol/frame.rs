use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use super::layout::{Field, LayoutVersion, WireKind, TAG_OFFSET};

/// One message received from the station
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Binary telemetry frame
    Binary(Bytes),
    /// Diagnostic text; the station only sends these when its checksum check fails
    Text(String),
}

/// Snapshot of every sensor value carried by one frame
///
/// A fresh value is built for each decoded frame. Fields not present in the
/// active layout revision are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorState {
    pub record_status: i8,
    pub year: i16,
    pub month: i8,
    pub day: i8,
    pub hour: i8,
    pub minute: i8,
    pub second: i8,
    pub flight_number: i16,
    pub top_number: i8,
    pub gps_status: i8,
    pub gps_mode: i8,
    pub gps_satellites_visible: i8,
    pub gps_satellites_used: i8,
    /// GPS time in seconds
    pub gps_time: f64,
    pub gps_hdop: f64,
    pub gps_pdop: f64,
    pub gps_lat: f64,
    pub gps_lon: f64,
    pub gps_alt_msl: f64,
    pub runway_elevation: f64,
    pub runway_heading: i16,
    pub baro_pressure: f64,
    pub baro_qfe: f64,
    pub baro_qnh: f64,
    pub temperature: f64,
    pub humidity: i8,
    pub wind_direction: i16,
    pub wind_direction_mean: i16,
    pub windspeed: f64,
    pub windspeed_mean: f64,
    /// Negative when the wind comes from the left
    pub cross_windspeed: f64,
    /// Negative for tailwind
    pub head_windspeed: f64,
    pub barometer_height: f64,
    pub from_to_status: i8,
    pub local_time: f64,
    pub time_difference: f64,
}

/// Raw value read from the wire before widening into its field
#[derive(Debug, Clone, Copy, PartialEq)]
enum Raw {
    I8(i8),
    I16(i16),
    U64(u64),
    F64(f64),
}

impl Raw {
    // Layout rows are checked at build time to only widen (`WireKind::fits`),
    // so the `None` arms below are never taken by a table walk.

    fn into_i8(self) -> Option<i8> {
        match self {
            Raw::I8(v) => Some(v),
            Raw::I16(_) | Raw::U64(_) | Raw::F64(_) => None,
        }
    }

    fn into_i16(self) -> Option<i16> {
        match self {
            Raw::I8(v) => Some(v.into()),
            Raw::I16(v) => Some(v),
            Raw::U64(_) | Raw::F64(_) => None,
        }
    }

    fn into_f64(self) -> f64 {
        match self {
            Raw::I8(v) => v.into(),
            Raw::I16(v) => v.into(),
            // Inexact values are reported through `DecodedFrame::precision_loss`
            Raw::U64(v) => v as f64,
            Raw::F64(v) => v,
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl SensorState {
    fn apply(&mut self, field: Field, raw: Raw) {
        match field {
            Field::RecordStatus => set(&mut self.record_status, raw.into_i8()),
            Field::Second => set(&mut self.second, raw.into_i8()),
            Field::Minute => set(&mut self.minute, raw.into_i8()),
            Field::Hour => set(&mut self.hour, raw.into_i8()),
            Field::Day => set(&mut self.day, raw.into_i8()),
            Field::Month => set(&mut self.month, raw.into_i8()),
            Field::Year => set(&mut self.year, raw.into_i16()),
            Field::Humidity => set(&mut self.humidity, raw.into_i8()),
            Field::TopNumber => set(&mut self.top_number, raw.into_i8()),
            Field::FlightNumber => set(&mut self.flight_number, raw.into_i16()),
            Field::GpsStatus => set(&mut self.gps_status, raw.into_i8()),
            Field::GpsMode => set(&mut self.gps_mode, raw.into_i8()),
            Field::GpsSatellitesVisible => set(&mut self.gps_satellites_visible, raw.into_i8()),
            Field::GpsSatellitesUsed => set(&mut self.gps_satellites_used, raw.into_i8()),
            Field::FromToStatus => set(&mut self.from_to_status, raw.into_i8()),
            Field::GpsTime => self.gps_time = raw.into_f64(),
            Field::GpsHdop => self.gps_hdop = raw.into_f64(),
            Field::GpsPdop => self.gps_pdop = raw.into_f64(),
            Field::GpsLat => self.gps_lat = raw.into_f64(),
            Field::GpsLon => self.gps_lon = raw.into_f64(),
            Field::GpsAltMsl => self.gps_alt_msl = raw.into_f64(),
            Field::BarometerHeight => self.barometer_height = raw.into_f64(),
            Field::RunwayElevation => self.runway_elevation = raw.into_f64(),
            Field::RunwayHeading => set(&mut self.runway_heading, raw.into_i16()),
            Field::Temperature => self.temperature = raw.into_f64(),
            Field::BaroPressure => self.baro_pressure = raw.into_f64(),
            Field::WindDirection => set(&mut self.wind_direction, raw.into_i16()),
            Field::WindDirectionMean => set(&mut self.wind_direction_mean, raw.into_i16()),
            Field::Windspeed => self.windspeed = raw.into_f64(),
            Field::WindspeedMean => self.windspeed_mean = raw.into_f64(),
            Field::CrossWindspeed => self.cross_windspeed = raw.into_f64(),
            Field::HeadWindspeed => self.head_windspeed = raw.into_f64(),
            Field::BaroQfe => self.baro_qfe = raw.into_f64(),
            Field::BaroQnh => self.baro_qnh = raw.into_f64(),
            Field::LocalTime => self.local_time = raw.into_f64(),
            Field::TimeDifference => self.time_difference = raw.into_f64(),
        }
    }
}

/// Result of decoding one binary frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedFrame {
    /// Decoded sensor values
    pub state: SensorState,
    /// Set when a 64-bit counter could not be represented exactly as a float
    pub precision_loss: bool,
}

/// Decoder for one layout revision
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    version: LayoutVersion,
}

impl FrameDecoder {
    /// Creates a decoder for `version`
    pub fn new(version: LayoutVersion) -> Self {
        FrameDecoder { version }
    }

    /// Revision this decoder accepts
    pub fn version(&self) -> LayoutVersion {
        self.version
    }

    /// Decodes any station message
    ///
    /// Text messages never reach field extraction; they surface as
    /// [`Error::PeerReportedChecksumFailure`].
    pub fn decode_message(&self, message: &Inbound) -> Result<DecodedFrame> {
        match message {
            Inbound::Text(text) => Err(Error::PeerReportedChecksumFailure(text.clone())),
            Inbound::Binary(bytes) => self.decode(bytes),
        }
    }

    /// Decodes a binary frame
    pub fn decode(&self, buf: &[u8]) -> Result<DecodedFrame> {
        let layout = self.version.layout();
        if buf.len() < layout.len {
            return Err(Error::FrameTooShort {
                expected: layout.len,
                actual: buf.len(),
            });
        }

        let found = buf[TAG_OFFSET];
        if found != layout.tag {
            return Err(Error::LayoutMismatch {
                expected: layout.tag,
                found,
            });
        }

        let mut state = SensorState::default();
        let mut precision_loss = false;
        for spec in layout.fields {
            let bytes = &buf[spec.offset..spec.end()];
            let raw = match spec.kind {
                WireKind::I8 => Raw::I8(bytes[0] as i8),
                WireKind::I16 => Raw::I16(i16::from_le_bytes([bytes[0], bytes[1]])),
                WireKind::F64 => Raw::F64(f64::from_le_bytes(le_array(bytes))),
                WireKind::U64Split => {
                    let value = combine_halves(bytes);
                    precision_loss |= !exact_in_f64(value);
                    Raw::U64(value)
                }
            };
            state.apply(spec.field, raw);
        }

        Ok(DecodedFrame {
            state,
            precision_loss,
        })
    }
}

fn le_array(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    out
}

/// Combines two little-endian 32-bit halves, low half first
fn combine_halves(bytes: &[u8]) -> u64 {
    let low = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let high = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    (u64::from(high) << 32) | u64::from(low)
}

fn exact_in_f64(value: u64) -> bool {
    let float = value as f64;
    // 2^64 itself is representable but out of range for u64
    float < 18_446_744_073_709_551_616.0 && float as u64 == value
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a frame of `version` with all fields zero
    pub(crate) fn blank_frame(version: LayoutVersion) -> Vec<u8> {
        let layout = version.layout();
        let mut frame = vec![0u8; layout.len];
        frame[TAG_OFFSET] = layout.tag;
        frame
    }

    pub(crate) fn put(frame: &mut [u8], version: LayoutVersion, field: Field, bytes: &[u8]) {
        let spec = version
            .layout()
            .fields
            .iter()
            .find(|s| s.field == field)
            .expect("field in layout");
        assert_eq!(spec.kind.width(), bytes.len());
        frame[spec.offset..spec.end()].copy_from_slice(bytes);
    }

    #[test]
    fn test_all_zero_frame_decodes_to_zero_state() {
        let frame = blank_frame(LayoutVersion::V1);
        assert_eq!(frame[0], 0x01);
        assert_eq!(frame[1], 0x00);

        let decoded = FrameDecoder::new(LayoutVersion::V1).decode(&frame).unwrap();
        assert_eq!(decoded.state, SensorState::default());
        assert!(!decoded.precision_loss);
    }

    #[test]
    fn test_short_buffers_rejected() {
        let decoder = FrameDecoder::new(LayoutVersion::V1);
        let frame = blank_frame(LayoutVersion::V1);

        for len in 0..frame.len() {
            match decoder.decode(&frame[..len]) {
                Err(Error::FrameTooShort { expected, actual }) => {
                    assert_eq!(expected, 155);
                    assert_eq!(actual, len);
                }
                other => panic!("expected FrameTooShort for {} bytes, got {:?}", len, other),
            }
        }
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut frame = blank_frame(LayoutVersion::V1);
        frame.extend_from_slice(&[0xff; 9]);
        assert!(FrameDecoder::new(LayoutVersion::V1).decode(&frame).is_ok());
    }

    #[test]
    fn test_foreign_tag_rejected() {
        let frame = blank_frame(LayoutVersion::V1);
        let err = FrameDecoder::new(LayoutVersion::V0).decode(&frame).unwrap_err();
        assert!(matches!(err, Error::LayoutMismatch { expected: 0x00, found: 0x01 }));
    }

    #[test]
    fn test_text_message_is_checksum_failure() {
        let decoder = FrameDecoder::new(LayoutVersion::V1);
        let err = decoder
            .decode_message(&Inbound::Text("CRC NOK".to_string()))
            .unwrap_err();
        match err {
            Error::PeerReportedChecksumFailure(text) => assert_eq!(text, "CRC NOK"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_v1_fields_decode_little_endian() {
        let v = LayoutVersion::V1;
        let mut frame = blank_frame(v);
        put(&mut frame, v, Field::RecordStatus, &[1]);
        put(&mut frame, v, Field::Hour, &[13]);
        put(&mut frame, v, Field::FlightNumber, &150i16.to_le_bytes());
        put(&mut frame, v, Field::RunwayElevation, &(-12i16).to_le_bytes());
        put(&mut frame, v, Field::WindDirectionMean, &275i16.to_le_bytes());
        put(&mut frame, v, Field::GpsLat, &52.5_f64.to_le_bytes());
        put(&mut frame, v, Field::CrossWindspeed, &(-4.25_f64).to_le_bytes());
        put(&mut frame, v, Field::BarometerHeight, &[3]);
        put(&mut frame, v, Field::TimeDifference, &0.5_f64.to_le_bytes());

        let state = FrameDecoder::new(v).decode(&frame).unwrap().state;
        assert_eq!(state.record_status, 1);
        assert_eq!(state.hour, 13);
        assert_eq!(state.flight_number, 150);
        assert_eq!(state.runway_elevation, -12.0);
        assert_eq!(state.wind_direction_mean, 275);
        assert_eq!(state.gps_lat, 52.5);
        assert_eq!(state.cross_windspeed, -4.25);
        assert_eq!(state.barometer_height, 3.0);
        assert_eq!(state.time_difference, 0.5);
    }

    #[test]
    fn test_v0_layout_leaves_newer_fields_zero() {
        let v = LayoutVersion::V0;
        let mut frame = blank_frame(v);
        put(&mut frame, v, Field::Year, &121i16.to_le_bytes());
        put(&mut frame, v, Field::RunwayElevation, &118.5_f64.to_le_bytes());
        put(&mut frame, v, Field::BaroQnh, &1013.25_f64.to_le_bytes());

        let state = FrameDecoder::new(v).decode(&frame).unwrap().state;
        assert_eq!(state.year, 121);
        assert_eq!(state.runway_elevation, 118.5);
        assert_eq!(state.baro_qnh, 1013.25);
        assert_eq!(state.gps_mode, 0);
        assert_eq!(state.windspeed_mean, 0.0);
    }

    #[test]
    fn test_gps_time_combines_halves() {
        let v = LayoutVersion::V1;
        let mut frame = blank_frame(v);
        let seconds: u64 = 1_633_046_400;
        put(&mut frame, v, Field::GpsTime, &seconds.to_le_bytes());

        let decoded = FrameDecoder::new(v).decode(&frame).unwrap();
        assert_eq!(decoded.state.gps_time, 1_633_046_400.0);
        assert!(!decoded.precision_loss);
    }

    #[test]
    fn test_gps_time_precision_loss_is_flagged() {
        let v = LayoutVersion::V1;
        let mut frame = blank_frame(v);
        let beyond_safe: u64 = (1 << 53) + 1;
        put(&mut frame, v, Field::GpsTime, &beyond_safe.to_le_bytes());

        let decoded = FrameDecoder::new(v).decode(&frame).unwrap();
        assert!(decoded.precision_loss);
        assert_eq!(decoded.state.gps_time, (1u64 << 53) as f64);
    }

    #[test]
    fn test_raw_values_only_widen() {
        assert_eq!(Raw::I8(-3).into_i8(), Some(-3));
        assert_eq!(Raw::I8(-3).into_i16(), Some(-3));
        assert_eq!(Raw::I16(300).into_i8(), None);
        assert_eq!(Raw::F64(1.5).into_i16(), None);
        assert_eq!(Raw::U64(7).into_i8(), None);
        assert_eq!(Raw::I16(-300).into_f64(), -300.0);
    }

    #[test]
    fn test_exact_in_f64_edges() {
        assert!(exact_in_f64(0));
        assert!(exact_in_f64(1 << 53));
        assert!(!exact_in_f64((1 << 53) + 1));
        assert!(exact_in_f64(1 << 60));
        assert!(!exact_in_f64(u64::MAX));
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let state = SensorState {
            flight_number: 7,
            ..Default::default()
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["flightNumber"], 7);
        assert!(json.get("gpsSatellitesVisible").is_some());
    }
}
