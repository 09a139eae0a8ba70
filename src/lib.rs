//! # IMU Monitor Library
//!
//! Collect telemetry from a BLE sensor peripheral.
//!
//! This library discovers a peripheral, subscribes to one of its notifiable
//! characteristics, decodes each text payload into a typed sample and keeps
//! the recent samples in a shared buffer for live display and export.

pub mod ble;
pub mod config;
pub mod error;
pub mod logging;
pub mod readout;
pub mod telemetry;
