//! # BLE Module
//!
//! Discovery, connection and notification handling for BLE peripherals.
//!
//! This module handles:
//! - Scanning for advertising peripherals and selecting one by name or address
//! - Listing GATT characteristics and their capabilities
//! - Subscribing to a notifiable characteristic for a timed window or
//!   continuously, feeding every payload into the telemetry buffer
//! - Releasing the subscription and link exactly once however it ends

pub mod btleplug_stack;
pub mod directory;
pub mod session;
pub mod stack;

pub use btleplug_stack::BtleplugStack;
pub use directory::{Capability, CharacteristicDescriptor, DeviceDirectory, DiscoveredDevice};
pub use session::{BleSession, SessionConfig, SessionState, SubscriptionEnd, SubscriptionPolicy};
pub use stack::{BleConnection, BleStack, NotificationEvent};
