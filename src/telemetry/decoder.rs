//! # Payload Decoder
//!
//! Decodes text notification payloads into telemetry samples.
//!
//! The peripheral sends human-readable text such as
//! `ax=1.5, ay=-2.3, az=9.8, batt=76`. Field labels are not checked: the
//! decoder only looks at numeric tokens, in order.

use chrono::NaiveDateTime;

use super::sample::{DecodeMode, ImuReading, Reading, TelemetrySample};
use crate::error::DecodeError;

/// Number of numeric tokens a fixed quad payload must carry
pub const FIXED_QUAD_FIELD_COUNT: usize = 4;

/// Decode a notification payload, stamped with the current time
///
/// # Arguments
///
/// * `raw` - Notification value bytes
/// * `mode` - Expected payload layout
///
/// # Errors
///
/// Returns error if:
/// - The payload is not valid UTF-8
/// - Fixed quad mode finds fewer than four numeric tokens
///
/// # Examples
///
/// ```
/// use imu_monitor::telemetry::decoder::decode;
/// use imu_monitor::telemetry::sample::{DecodeMode, Reading};
///
/// let sample = decode(b"ax=1.5, ay=-2.3, az=9.8, batt=76", DecodeMode::FixedQuad).unwrap();
/// match sample.reading {
///     Reading::Imu(imu) => assert_eq!(imu.battery, 76.0),
///     _ => unreachable!(),
/// }
/// ```
pub fn decode(raw: &[u8], mode: DecodeMode) -> Result<TelemetrySample, DecodeError> {
    decode_reading(raw, mode).map(TelemetrySample::now)
}

/// Decode a notification payload with an explicit timestamp
pub fn decode_at(
    raw: &[u8],
    mode: DecodeMode,
    timestamp: NaiveDateTime,
) -> Result<TelemetrySample, DecodeError> {
    decode_reading(raw, mode).map(|reading| TelemetrySample::new(timestamp, reading))
}

/// Decode a payload into a reading without stamping it
pub fn decode_reading(raw: &[u8], mode: DecodeMode) -> Result<Reading, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|e| DecodeError::Encoding {
        valid_up_to: e.valid_up_to(),
    })?;

    match mode {
        DecodeMode::FixedQuad => decode_fixed_quad(text),
        DecodeMode::Generic => Ok(decode_generic(text)),
    }
}

fn decode_fixed_quad(text: &str) -> Result<Reading, DecodeError> {
    let tokens = numeric_tokens(text);
    if tokens.len() < FIXED_QUAD_FIELD_COUNT {
        return Err(DecodeError::InsufficientFields {
            expected: FIXED_QUAD_FIELD_COUNT,
            found: tokens.len(),
        });
    }

    Ok(Reading::Imu(ImuReading {
        ax: tokens[0],
        ay: tokens[1],
        az: tokens[2],
        battery: tokens[3],
    }))
}

fn decode_generic(text: &str) -> Reading {
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        Ok(value) => Reading::Number(value),
        Err(_) => Reading::Text(trimmed.to_string()),
    }
}

/// Extract every numeric literal in `text`, left to right
///
/// A literal is an optional `+`/`-`, then digits, then an optional `.` with
/// at least one digit after it. A bare fraction such as `.5` also counts.
/// Everything else acts as a separator.
pub fn numeric_tokens(text: &str) -> Vec<f64> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let start = i;
        let mut j = i;
        if bytes[j] == b'+' || bytes[j] == b'-' {
            j += 1;
        }

        let int_start = j;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        let has_int = j > int_start;

        let mut end = j;
        if j < len && bytes[j] == b'.' {
            let mut k = j + 1;
            while k < len && bytes[k].is_ascii_digit() {
                k += 1;
            }
            if k > j + 1 {
                end = k;
            }
        }

        if !has_int && end == j {
            i += 1;
            continue;
        }

        // Token boundaries always sit on ASCII bytes
        if let Ok(value) = text[start..end].parse::<f64>() {
            tokens.push(value);
        }
        i = end;
    }

    tokens
}
