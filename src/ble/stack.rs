//! Trait abstraction for BLE stack operations to enable testing

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::directory::{CharacteristicDescriptor, DiscoveredDevice};
use crate::error::{ConnectionError, ScanError};

/// Event pushed by the stack for an active subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// Raw characteristic value
    Value(Bytes),
    /// The link dropped; no further values will arrive
    Disconnected(String),
}

/// Receiving end of a subscription
pub type NotificationReceiver = mpsc::UnboundedReceiver<NotificationEvent>;

/// Discovery and connection entry points of a BLE stack
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleStack: Send + Sync {
    /// Scan for advertising peripherals for `timeout`
    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, ScanError>;

    /// Open a connection to a previously discovered peripheral
    async fn connect(&self, address: &str) -> Result<Arc<dyn BleConnection>, ConnectionError>;
}

/// An open connection to one peripheral
#[async_trait]
pub trait BleConnection: Send + Sync {
    fn address(&self) -> &str;

    async fn is_connected(&self) -> Result<bool, ConnectionError>;

    /// Enumerate GATT characteristics with their capabilities
    async fn list_characteristics(&self) -> Result<Vec<CharacteristicDescriptor>, ConnectionError>;

    /// Enable notifications and return the event stream for `uuid`
    async fn start_notify(&self, uuid: &str) -> Result<NotificationReceiver, ConnectionError>;

    async fn stop_notify(&self, uuid: &str) -> Result<(), ConnectionError>;

    async fn disconnect(&self) -> Result<(), ConnectionError>;
}
