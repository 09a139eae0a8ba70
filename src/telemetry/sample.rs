//! # Telemetry Sample Types
//!
//! Typed readings produced by the payload decoder.

use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use std::fmt;

/// Payload layout expected from the peripheral
///
/// Also acts as the schema tag of a telemetry buffer: every sample in a
/// buffer is decoded with the same mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// Four numeric tokens: `ax, ay, az, battery`
    #[default]
    FixedQuad,
    /// One value: a number if the payload parses as one, otherwise text
    Generic,
}

/// Column names for the fixed quad layout
pub const FIXED_QUAD_FIELDS: [&str; 5] = ["timestamp", "ax", "ay", "az", "battery"];

/// Column names for the generic layout
pub const GENERIC_FIELDS: [&str; 2] = ["Horário", "Valor"];

impl DecodeMode {
    /// Export column names, timestamp first
    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            DecodeMode::FixedQuad => &FIXED_QUAD_FIELDS,
            DecodeMode::Generic => &GENERIC_FIELDS,
        }
    }
}

impl fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeMode::FixedQuad => write!(f, "fixed_quad"),
            DecodeMode::Generic => write!(f, "generic"),
        }
    }
}

/// Accelerometer + battery reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuReading {
    /// Acceleration on X in g
    pub ax: f64,
    /// Acceleration on Y in g
    pub ay: f64,
    /// Acceleration on Z in g
    pub az: f64,
    /// Battery charge in percent as reported (not clamped)
    pub battery: f64,
}

/// One accelerometer axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl ImuReading {
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.ax,
            Axis::Y => self.ay,
            Axis::Z => self.az,
        }
    }
}

/// Decoded payload contents
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// Fixed quad payload
    Imu(ImuReading),
    /// Generic payload that parsed as a number
    Number(f64),
    /// Generic payload kept verbatim (trimmed)
    Text(String),
}

/// A single exported value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(value) => write!(f, "{}", value),
            FieldValue::Text(text) => f.write_str(text),
        }
    }
}

/// A decoded notification stamped with the wall-clock time it was decoded
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: NaiveDateTime,
    pub reading: Reading,
}

impl TelemetrySample {
    pub fn new(timestamp: NaiveDateTime, reading: Reading) -> Self {
        Self { timestamp, reading }
    }

    /// Stamp a reading with the current local time
    pub fn now(reading: Reading) -> Self {
        Self::new(Local::now().naive_local(), reading)
    }

    /// Layout this sample was decoded with
    pub fn mode(&self) -> DecodeMode {
        match self.reading {
            Reading::Imu(_) => DecodeMode::FixedQuad,
            Reading::Number(_) | Reading::Text(_) => DecodeMode::Generic,
        }
    }

    /// IMU reading, if this is a fixed quad sample
    pub fn imu(&self) -> Option<&ImuReading> {
        match &self.reading {
            Reading::Imu(imu) => Some(imu),
            _ => None,
        }
    }

    /// Values in column order, excluding the timestamp
    pub fn fields(&self) -> Vec<FieldValue> {
        match &self.reading {
            Reading::Imu(imu) => vec![
                FieldValue::Number(imu.ax),
                FieldValue::Number(imu.ay),
                FieldValue::Number(imu.az),
                FieldValue::Number(imu.battery),
            ],
            Reading::Number(value) => vec![FieldValue::Number(*value)],
            Reading::Text(text) => vec![FieldValue::Text(text.clone())],
        }
    }

    /// Timestamp as shown in exports and charts
    pub fn clock_time(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_field_names_match_layout() {
        assert_eq!(
            DecodeMode::FixedQuad.field_names(),
            &["timestamp", "ax", "ay", "az", "battery"]
        );
        assert_eq!(DecodeMode::Generic.field_names(), &["Horário", "Valor"]);
    }

    #[test]
    fn test_imu_fields_in_order() {
        let sample = TelemetrySample::new(
            at(10, 0, 0),
            Reading::Imu(ImuReading {
                ax: 1.5,
                ay: -2.3,
                az: 9.8,
                battery: 76.0,
            }),
        );
        assert_eq!(sample.mode(), DecodeMode::FixedQuad);
        assert_eq!(
            sample.fields(),
            vec![
                FieldValue::Number(1.5),
                FieldValue::Number(-2.3),
                FieldValue::Number(9.8),
                FieldValue::Number(76.0),
            ]
        );
    }

    #[test]
    fn test_generic_sample_mode() {
        let sample = TelemetrySample::new(at(10, 0, 0), Reading::Text("hello".into()));
        assert_eq!(sample.mode(), DecodeMode::Generic);
        assert!(sample.imu().is_none());
        assert_eq!(sample.fields(), vec![FieldValue::Text("hello".into())]);
    }

    #[test]
    fn test_clock_time_format() {
        let sample = TelemetrySample::new(at(9, 5, 7), Reading::Number(1.0));
        assert_eq!(sample.clock_time(), "09:05:07");
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Number(3.14).to_string(), "3.14");
        assert_eq!(FieldValue::Number(-2.5).to_string(), "-2.5");
        assert_eq!(FieldValue::Text("ok".into()).to_string(), "ok");
    }

    #[test]
    fn test_axis_selection() {
        let imu = ImuReading {
            ax: 1.0,
            ay: 2.0,
            az: 3.0,
            battery: 50.0,
        };
        assert_eq!(imu.axis(Axis::X), 1.0);
        assert_eq!(imu.axis(Axis::Y), 2.0);
        assert_eq!(imu.axis(Axis::Z), 3.0);
    }
}
