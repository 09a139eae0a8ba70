//! # Telemetry Export
//!
//! Writes buffer snapshots to flat files.
//!
//! - CSV: header row from the snapshot's layout, one row per sample
//! - JSONL: one JSON object per sample, keys from the same layout
//!
//! Timestamps are written as `HH:MM:SS` local time.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use super::buffer::TelemetrySnapshot;
use super::sample::{FieldValue, TelemetrySample};
use crate::error::ExportError;

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Jsonl,
}

impl ExportFormat {
    /// Guess the format from a file extension, defaulting to CSV
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") => ExportFormat::Jsonl,
            _ => ExportFormat::Csv,
        }
    }
}

/// Write a snapshot to `path` in the given format
///
/// # Errors
///
/// Returns error if the file cannot be created or written
pub fn export<P: AsRef<Path>>(
    snapshot: &TelemetrySnapshot,
    path: P,
    format: ExportFormat,
) -> Result<(), ExportError> {
    let path = path.as_ref();
    let io_err = |source| ExportError::Io {
        path: path.display().to_string(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);

    match format {
        ExportFormat::Csv => write_csv(snapshot, &mut writer),
        ExportFormat::Jsonl => write_jsonl(snapshot, &mut writer),
    }
    .map_err(io_err)?;
    writer.flush().map_err(io_err)?;

    info!(
        path = %path.display(),
        samples = snapshot.len(),
        ?format,
        "telemetry exported"
    );
    Ok(())
}

/// Write a snapshot as CSV
pub fn write_csv<W: Write>(snapshot: &TelemetrySnapshot, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "{}", snapshot.mode.field_names().join(","))?;

    for sample in snapshot.iter() {
        let mut row = vec![sample.clock_time()];
        row.extend(sample.fields().iter().map(csv_field));
        writeln!(writer, "{}", row.join(","))?;
    }

    Ok(())
}

/// Write a snapshot as JSON Lines
pub fn write_jsonl<W: Write>(snapshot: &TelemetrySnapshot, writer: &mut W) -> std::io::Result<()> {
    for sample in snapshot.iter() {
        let record = json_record(snapshot, sample);
        serde_json::to_writer(&mut *writer, &record)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

fn json_record(snapshot: &TelemetrySnapshot, sample: &TelemetrySample) -> Value {
    let names = snapshot.mode.field_names();
    let mut record = Map::new();
    record.insert(names[0].to_string(), Value::String(sample.clock_time()));

    for (name, field) in names[1..].iter().zip(sample.fields()) {
        let value = match field {
            FieldValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(t) => Value::String(t),
        };
        record.insert(name.to_string(), value);
    }

    Value::Object(record)
}

/// Quote a value if it would break the row
fn csv_field(field: &FieldValue) -> String {
    let text = field.to_string();
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::sample::{DecodeMode, ImuReading, Reading};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn generic_snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            mode: DecodeMode::Generic,
            samples: vec![
                TelemetrySample::new(at(10, 0, 1), Reading::Number(3.14)),
                TelemetrySample::new(at(10, 0, 2), Reading::Text("hello".into())),
            ],
        }
    }

    fn to_csv(snapshot: &TelemetrySnapshot) -> String {
        let mut out = Vec::new();
        write_csv(snapshot, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_generic_csv() {
        assert_eq!(
            to_csv(&generic_snapshot()),
            "Horário,Valor\n10:00:01,3.14\n10:00:02,hello\n"
        );
    }

    #[test]
    fn test_fixed_quad_csv() {
        let snapshot = TelemetrySnapshot {
            mode: DecodeMode::FixedQuad,
            samples: vec![TelemetrySample::new(
                at(12, 30, 0),
                Reading::Imu(ImuReading {
                    ax: 1.5,
                    ay: -2.3,
                    az: 9.8,
                    battery: 76.5,
                }),
            )],
        };
        assert_eq!(
            to_csv(&snapshot),
            "timestamp,ax,ay,az,battery\n12:30:00,1.5,-2.3,9.8,76.5\n"
        );
    }

    #[test]
    fn test_empty_snapshot_writes_header_only() {
        let snapshot = TelemetrySnapshot {
            mode: DecodeMode::FixedQuad,
            samples: vec![],
        };
        assert_eq!(to_csv(&snapshot), "timestamp,ax,ay,az,battery\n");
    }

    #[test]
    fn test_csv_quotes_text_with_separators() {
        let snapshot = TelemetrySnapshot {
            mode: DecodeMode::Generic,
            samples: vec![TelemetrySample::new(
                at(8, 0, 0),
                Reading::Text("a,\"b\"".into()),
            )],
        };
        assert_eq!(to_csv(&snapshot), "Horário,Valor\n08:00:00,\"a,\"\"b\"\"\"\n");
    }

    #[test]
    fn test_jsonl_records() {
        let mut out = Vec::new();
        write_jsonl(&generic_snapshot(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["Horário"], "10:00:01");
        assert_eq!(lines[0]["Valor"], 3.14);
        assert_eq!(lines[1]["Valor"], "hello");
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.csv");

        export(&generic_snapshot(), &path, ExportFormat::Csv).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("Horário,Valor\n"));
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("telemetry.csv");

        let err = export(&generic_snapshot(), &path, ExportFormat::Csv).unwrap_err();
        let ExportError::Io { path: p, .. } = err;
        assert!(p.contains("telemetry.csv"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path("out.jsonl"), ExportFormat::Jsonl);
        assert_eq!(ExportFormat::from_path("out.JSONL"), ExportFormat::Jsonl);
        assert_eq!(ExportFormat::from_path("out.csv"), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path("out"), ExportFormat::Csv);
    }
}
