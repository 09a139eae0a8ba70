//! # Error Types
//!
//! Custom error types for IMU Monitor using `thiserror`.
//!
//! Each failure class has its own enum so callers can decide how to recover:
//! decode errors drop one sample, connection errors end the current session,
//! adapter errors end the run.

use thiserror::Error;

/// Payload decoding failures
///
/// A decode failure only ever drops the offending sample.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload bytes are not valid UTF-8
    #[error("payload is not valid UTF-8 (valid up to byte {valid_up_to})")]
    Encoding { valid_up_to: usize },

    /// Fewer numeric tokens than the fixed quad layout requires
    #[error("expected at least {expected} numeric fields, found {found}")]
    InsufficientFields { expected: usize, found: usize },
}

/// Discovery failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// The BLE stack or adapter could not be used
    #[error("BLE adapter unavailable: {0}")]
    AdapterUnavailable(String),
}

/// Connection level failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The peripheral rejected the connection or never reported connected
    #[error("connection to {address} refused: {reason}")]
    Refused { address: String, reason: String },

    /// The link dropped while a subscription was active
    #[error("connection to {address} lost: {reason}")]
    Lost { address: String, reason: String },

    /// A GATT operation failed on an established connection
    #[error("GATT operation on {address} failed: {reason}")]
    Gatt { address: String, reason: String },

    /// The operation did not complete in time
    #[error("timed out after {timeout_ms}ms waiting for {address}")]
    Timeout { address: String, timeout_ms: u64 },
}

/// Export failures
#[derive(Debug, Error)]
pub enum ExportError {
    /// Writing the export file failed
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Main error type for IMU Monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    /// BLE adapter errors
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// No discovered device matched the requested name or address
    #[error("device not found: no device matching '{target}'")]
    DeviceNotFound { target: String },

    /// Connection errors
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The requested characteristic was not listed for the device
    #[error("characteristic {uuid} not found on {address}")]
    CharacteristicNotFound { address: String, uuid: String },

    /// The characteristic cannot push values
    #[error("characteristic {uuid} on {address} does not support notify or indicate")]
    NotNotifiable { address: String, uuid: String },

    /// Operation is not allowed in the current session state
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// Payload decoding errors
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Export errors
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for IMU Monitor
pub type Result<T> = std::result::Result<T, MonitorError>;
