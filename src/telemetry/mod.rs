//! # Telemetry Module
//!
//! Decoding, buffering and export of sensor telemetry.
//!
//! This module handles:
//! - Decoding text notification payloads (fixed quad or generic layout)
//! - Keeping an ordered, optionally bounded window of samples
//! - Sharing that window with renderers through snapshots
//! - Exporting snapshots to CSV or JSONL

pub mod buffer;
pub mod decoder;
pub mod export;
pub mod sample;
pub mod view;

pub use buffer::{BufferPolicy, TelemetryBuffer, TelemetrySnapshot};
pub use sample::{DecodeMode, ImuReading, Reading, TelemetrySample};
pub use view::{TelemetryFeed, TelemetryView};
