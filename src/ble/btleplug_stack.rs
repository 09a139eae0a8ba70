//! # btleplug Backend
//!
//! [`BleStack`] implementation on top of the platform BLE stack.
//!
//! Peripherals are addressed by their btleplug `PeripheralId` rendered as a
//! string (a MAC address on Linux and Windows, a UUID on macOS).

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::directory::{Capability, CharacteristicDescriptor, DiscoveredDevice};
use super::stack::{BleConnection, BleStack, NotificationEvent, NotificationReceiver};
use crate::error::{ConnectionError, ScanError};

/// Capability flags in the order they are reported
const CAPABILITY_FLAGS: [(CharPropFlags, Capability); 8] = [
    (CharPropFlags::BROADCAST, Capability::Broadcast),
    (CharPropFlags::READ, Capability::Read),
    (CharPropFlags::WRITE_WITHOUT_RESPONSE, Capability::WriteWithoutResponse),
    (CharPropFlags::WRITE, Capability::Write),
    (CharPropFlags::NOTIFY, Capability::Notify),
    (CharPropFlags::INDICATE, Capability::Indicate),
    (CharPropFlags::AUTHENTICATED_SIGNED_WRITES, Capability::AuthenticatedSignedWrites),
    (CharPropFlags::EXTENDED_PROPERTIES, Capability::ExtendedProperties),
];

/// BLE stack backed by the first adapter btleplug reports
pub struct BtleplugStack {
    adapter: Adapter,
}

impl std::fmt::Debug for BtleplugStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugStack").finish_non_exhaustive()
    }
}

impl BtleplugStack {
    /// Open the platform BLE manager and pick the first adapter
    ///
    /// # Errors
    ///
    /// Returns `ScanError::AdapterUnavailable` if the stack cannot be opened
    /// or no adapter is present
    pub async fn new() -> Result<Self, ScanError> {
        let manager = Manager::new().await.map_err(adapter_error)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(adapter_error)?
            .into_iter()
            .next()
            .ok_or_else(|| ScanError::AdapterUnavailable("no BLE adapter found".to_string()))?;

        match adapter.adapter_info().await {
            Ok(info) => info!(adapter = %info, "BLE adapter ready"),
            Err(e) => debug!(error = %e, "adapter info unavailable"),
        }

        Ok(Self { adapter })
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral, ConnectionError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| refused(address, e))?;

        peripherals
            .into_iter()
            .find(|p| p.id().to_string().eq_ignore_ascii_case(address))
            .ok_or_else(|| ConnectionError::Refused {
                address: address.to_string(),
                reason: "peripheral not known to the adapter; scan first".to_string(),
            })
    }
}

#[async_trait]
impl BleStack for BtleplugStack {
    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, ScanError> {
        info!(timeout_ms = timeout.as_millis() as u64, "starting BLE scan");
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(adapter_error)?;

        tokio::time::sleep(timeout).await;

        let peripherals = self.adapter.peripherals().await.map_err(adapter_error);
        if let Err(e) = self.adapter.stop_scan().await {
            debug!(error = %e, "failed to stop scan cleanly");
        }

        let mut devices = Vec::new();
        for peripheral in peripherals? {
            let name = match peripheral.properties().await {
                Ok(Some(properties)) => properties.local_name,
                Ok(None) => None,
                Err(e) => {
                    debug!(error = %e, "skipping peripheral without properties");
                    continue;
                }
            };
            devices.push(DiscoveredDevice::new(name, peripheral.id().to_string()));
        }

        Ok(devices)
    }

    async fn connect(&self, address: &str) -> Result<Arc<dyn BleConnection>, ConnectionError> {
        let peripheral = self.find_peripheral(address).await?;

        let connected = peripheral.is_connected().await.map_err(|e| refused(address, e))?;
        if !connected {
            peripheral.connect().await.map_err(|e| refused(address, e))?;
        }

        let connection: Arc<dyn BleConnection> = Arc::new(BtleplugConnection {
            adapter: self.adapter.clone(),
            peripheral,
            address: address.to_string(),
            forwarders: Mutex::new(HashMap::new()),
        });
        Ok(connection)
    }
}

/// Connection to one btleplug peripheral
pub struct BtleplugConnection {
    adapter: Adapter,
    peripheral: Peripheral,
    address: String,
    forwarders: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl BtleplugConnection {
    async fn characteristic(&self, uuid: &str) -> Result<Characteristic, ConnectionError> {
        let target = Uuid::parse_str(uuid)
            .map_err(|e| self.gatt(format!("invalid UUID {}: {}", uuid, e)))?;

        if self.peripheral.characteristics().is_empty() {
            self.peripheral
                .discover_services()
                .await
                .map_err(|e| self.gatt(e))?;
        }

        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == target)
            .ok_or_else(|| self.gatt(format!("characteristic {} not found", uuid)))
    }

    fn gatt(&self, reason: impl ToString) -> ConnectionError {
        ConnectionError::Gatt {
            address: self.address.clone(),
            reason: reason.to_string(),
        }
    }

    fn abort_forwarder(&self, uuid: &str) {
        let mut forwarders = self.forwarders.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = forwarders.remove(uuid) {
            handle.abort();
        }
    }
}

#[async_trait]
impl BleConnection for BtleplugConnection {
    fn address(&self) -> &str {
        &self.address
    }

    async fn is_connected(&self) -> Result<bool, ConnectionError> {
        self.peripheral.is_connected().await.map_err(|e| self.gatt(e))
    }

    async fn list_characteristics(&self) -> Result<Vec<CharacteristicDescriptor>, ConnectionError> {
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| self.gatt(e))?;

        Ok(self
            .peripheral
            .characteristics()
            .iter()
            .map(descriptor_from)
            .collect())
    }

    async fn start_notify(&self, uuid: &str) -> Result<NotificationReceiver, ConnectionError> {
        let characteristic = self.characteristic(uuid).await?;
        let target = characteristic.uuid;

        // Open both streams before subscribing so no early value is missed
        let mut notifications = self.peripheral.notifications().await.map_err(|e| self.gatt(e))?;
        let mut events = self.adapter.events().await.map_err(|e| self.gatt(e))?;
        self.peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| self.gatt(e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let peripheral_id = self.peripheral.id();
        let address = self.address.clone();

        let forwarder = tokio::spawn(async move {
            let mut events_open = true;
            loop {
                tokio::select! {
                    notification = notifications.next() => match notification {
                        Some(n) if n.uuid == target => {
                            if tx.send(NotificationEvent::Value(Bytes::from(n.value))).is_err() {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => {
                            let _ = tx.send(NotificationEvent::Disconnected(
                                "notification stream ended".to_string(),
                            ));
                            break;
                        }
                    },
                    event = events.next(), if events_open => match event {
                        Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                            let _ = tx.send(NotificationEvent::Disconnected(
                                "peripheral disconnected".to_string(),
                            ));
                            break;
                        }
                        Some(_) => {}
                        None => events_open = false,
                    },
                }
            }
            debug!(%address, "notification forwarder finished");
        });

        self.abort_forwarder(uuid);
        self.forwarders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uuid.to_string(), forwarder);

        info!(address = %self.address, %uuid, "notifications enabled");
        Ok(rx)
    }

    async fn stop_notify(&self, uuid: &str) -> Result<(), ConnectionError> {
        self.abort_forwarder(uuid);
        let characteristic = self.characteristic(uuid).await?;
        self.peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(|e| self.gatt(e))
    }

    async fn disconnect(&self) -> Result<(), ConnectionError> {
        let uuids: Vec<String> = self
            .forwarders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        for uuid in uuids {
            self.abort_forwarder(&uuid);
        }

        if let Err(e) = self.peripheral.disconnect().await {
            warn!(address = %self.address, error = %e, "disconnect failed");
            return Err(self.gatt(e));
        }
        info!(address = %self.address, "disconnected");
        Ok(())
    }
}

/// Map btleplug characteristic metadata into a descriptor
fn descriptor_from(characteristic: &Characteristic) -> CharacteristicDescriptor {
    CharacteristicDescriptor::new(
        characteristic.uuid.to_string(),
        capabilities(characteristic.properties),
    )
}

fn capabilities(flags: CharPropFlags) -> Vec<Capability> {
    CAPABILITY_FLAGS
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, capability)| *capability)
        .collect()
}

fn adapter_error(e: btleplug::Error) -> ScanError {
    ScanError::AdapterUnavailable(e.to_string())
}

fn refused(address: &str, e: btleplug::Error) -> ConnectionError {
    ConnectionError::Refused {
        address: address.to_string(),
        reason: e.to_string(),
    }
}
