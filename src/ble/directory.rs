//! # Device Directory
//!
//! Results of discovery and characteristic listing.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Name shown for peripherals that do not advertise one
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown";

/// A peripheral seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Advertised local name, if any
    pub name: Option<String>,
    /// Stack-specific identifier used to connect
    pub address: String,
}

impl DiscoveredDevice {
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            name,
            address: address.into(),
        }
    }

    /// Advertised name or "Unknown"
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_DEVICE_NAME)
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.display_name(), self.address)
    }
}

/// GATT characteristic capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    Notify,
    Indicate,
    AuthenticatedSignedWrites,
    ExtendedProperties,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Broadcast => "broadcast",
            Capability::Read => "read",
            Capability::WriteWithoutResponse => "write-without-response",
            Capability::Write => "write",
            Capability::Notify => "notify",
            Capability::Indicate => "indicate",
            Capability::AuthenticatedSignedWrites => "authenticated-signed-writes",
            Capability::ExtendedProperties => "extended-properties",
        };
        f.write_str(name)
    }
}

/// A characteristic listed on a connected peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    /// Lowercase hyphenated UUID
    pub uuid: String,
    pub properties: BTreeSet<Capability>,
}

impl CharacteristicDescriptor {
    pub fn new(uuid: impl Into<String>, properties: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            uuid: uuid.into().to_ascii_lowercase(),
            properties: properties.into_iter().collect(),
        }
    }

    /// True if the peripheral can push values for this characteristic
    pub fn can_notify(&self) -> bool {
        self.properties.contains(&Capability::Notify)
            || self.properties.contains(&Capability::Indicate)
    }

    /// Case-insensitive UUID comparison
    pub fn matches(&self, uuid: &str) -> bool {
        self.uuid.eq_ignore_ascii_case(uuid.trim())
    }
}

impl fmt::Display for CharacteristicDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caps: Vec<String> = self.properties.iter().map(|c| c.to_string()).collect();
        write!(f, "{} ({})", self.uuid, caps.join(", "))
    }
}

/// Devices from the last scan and the characteristics listed for them
#[derive(Debug, Clone, Default)]
pub struct DeviceDirectory {
    devices: Vec<DiscoveredDevice>,
    characteristics: HashMap<String, Vec<CharacteristicDescriptor>>,
}

impl DeviceDirectory {
    pub fn new(devices: Vec<DiscoveredDevice>) -> Self {
        Self {
            devices,
            characteristics: HashMap::new(),
        }
    }

    pub fn devices(&self) -> &[DiscoveredDevice] {
        &self.devices
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// First device whose advertised name contains `target`
    pub fn find_by_name(&self, target: &str) -> Option<&DiscoveredDevice> {
        find_by_name(&self.devices, target)
    }

    /// Device with exactly this address (case-insensitive)
    pub fn find_by_address(&self, address: &str) -> Option<&DiscoveredDevice> {
        self.devices
            .iter()
            .find(|d| d.address.eq_ignore_ascii_case(address))
    }

    /// Record the characteristics listed for `address`
    ///
    /// A listing is kept for the rest of the session; later calls for the
    /// same address are ignored.
    pub fn record_characteristics(
        &mut self,
        address: &str,
        characteristics: Vec<CharacteristicDescriptor>,
    ) {
        self.characteristics
            .entry(address.to_string())
            .or_insert(characteristics);
    }

    pub fn characteristics(&self, address: &str) -> Option<&[CharacteristicDescriptor]> {
        self.characteristics.get(address).map(Vec::as_slice)
    }

    /// Look up one listed characteristic
    pub fn characteristic(&self, address: &str, uuid: &str) -> Option<&CharacteristicDescriptor> {
        self.characteristics(address)?
            .iter()
            .find(|c| c.matches(uuid))
    }
}

/// First device whose advertised name contains `target` as a substring
///
/// Devices without a name never match.
pub fn find_by_name<'a>(
    devices: &'a [DiscoveredDevice],
    target: &str,
) -> Option<&'a DiscoveredDevice> {
    devices
        .iter()
        .find(|d| d.name.as_deref().is_some_and(|name| name.contains(target)))
}
