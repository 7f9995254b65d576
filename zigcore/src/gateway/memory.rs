//! In-memory gateway collaborators.

use std::collections::HashMap;
use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::{DeviceDirectory, KnownDevice, ProcessManager, PropertyStore};
use crate::address::DeviceAddress;
use crate::error::{Result, ZigbeeError};

#[derive(Debug, Clone, Default)]
struct DeviceRecord {
    auto_acknowledge: bool,
    comm_fail: bool,
    last_contact: Option<SystemTime>,
    metadata: HashMap<String, String>,
}

/// Device directory backed by a concurrent map.
#[derive(Default)]
pub struct InMemoryDirectory {
    devices: DashMap<DeviceAddress, DeviceRecord>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists a device.
    pub fn add_device(&self, address: DeviceAddress, auto_acknowledge: bool) {
        self.devices.insert(
            address,
            DeviceRecord {
                auto_acknowledge,
                ..Default::default()
            },
        );
    }

    pub fn remove_device(&self, address: DeviceAddress) -> bool {
        self.devices.remove(&address).is_some()
    }

    pub fn set_comm_fail(&self, address: DeviceAddress, comm_fail: bool) {
        if let Some(mut record) = self.devices.get_mut(&address) {
            record.comm_fail = comm_fail;
        }
    }

    /// Records contact with a device at `at`.
    pub fn touch(&self, address: DeviceAddress, at: SystemTime) {
        if let Some(mut record) = self.devices.get_mut(&address) {
            record.last_contact = Some(at);
            record.comm_fail = false;
        }
    }
}

impl DeviceDirectory for InMemoryDirectory {
    fn is_known(&self, address: DeviceAddress) -> bool {
        self.devices.contains_key(&address)
    }

    fn known_devices(&self) -> Vec<KnownDevice> {
        let mut devices: Vec<KnownDevice> = self
            .devices
            .iter()
            .map(|entry| KnownDevice {
                address: *entry.key(),
                auto_acknowledge: entry.value().auto_acknowledge,
            })
            .collect();
        devices.sort_by_key(|d| d.address);
        devices
    }

    fn is_in_comm_fail(&self, address: DeviceAddress) -> bool {
        self.devices
            .get(&address)
            .map(|r| r.comm_fail)
            .unwrap_or(false)
    }

    fn last_contact(&self, address: DeviceAddress) -> Option<SystemTime> {
        self.devices.get(&address).and_then(|r| r.last_contact)
    }

    fn metadata(&self, address: DeviceAddress, key: &str) -> Option<String> {
        self.devices
            .get(&address)
            .and_then(|r| r.metadata.get(key).cloned())
    }

    fn set_metadata(&self, address: DeviceAddress, key: &str, value: &str) -> Result<()> {
        let mut record = self
            .devices
            .get_mut(&address)
            .ok_or_else(|| ZigbeeError::NotFound(format!("device {}", address)))?;
        record.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Property store backed by a concurrent map.
#[derive(Default)]
pub struct InMemoryProperties {
    values: DashMap<String, String>,
}

impl InMemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStore for InMemoryProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.clone())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(ZigbeeError::InvalidArgument(
                "property key is empty".to_string(),
            ));
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Process manager that only records restart requests.
#[derive(Default)]
pub struct RecordingProcessManager {
    restarts: Mutex<Vec<String>>,
}

impl RecordingProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reasons given for every restart so far.
    pub fn restarts(&self) -> Vec<String> {
        self.restarts.lock().clone()
    }
}

impl ProcessManager for RecordingProcessManager {
    fn restart_radio_process(&self, reason: &str) -> Result<()> {
        tracing::info!(reason, "Radio process restart requested");
        self.restarts.lock().push(reason.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_get_bool_parsing() {
        let props = InMemoryProperties::new();
        assert_eq!(props.get_bool("missing"), None);
        props.set("a", "TRUE").unwrap();
        props.set("b", "0").unwrap();
        props.set("c", "maybe").unwrap();
        assert_eq!(props.get_bool("a"), Some(true));
        assert_eq!(props.get_bool("b"), Some(false));
        assert_eq!(props.get_bool("c"), None);
        assert!(props.get_bool_or("c", true));
    }

    #[test]
    fn test_empty_property_key_rejected() {
        let props = InMemoryProperties::new();
        assert!(props.set("", "x").is_err());
    }

    #[test]
    fn test_directory_tracks_contact_and_comm_fail() {
        let dir = InMemoryDirectory::new();
        let addr = DeviceAddress::new(1);
        dir.add_device(addr, true);
        dir.set_comm_fail(addr, true);
        assert!(dir.is_in_comm_fail(addr));

        let now = SystemTime::now() + Duration::from_secs(1);
        dir.touch(addr, now);
        assert!(!dir.is_in_comm_fail(addr));
        assert_eq!(dir.last_contact(addr), Some(now));
    }

    #[test]
    fn test_metadata_requires_known_device() {
        let dir = InMemoryDirectory::new();
        let addr = DeviceAddress::new(2);
        assert!(dir.set_metadata(addr, "k", "v").is_err());
        dir.add_device(addr, false);
        dir.set_metadata(addr, "k", "v").unwrap();
        assert_eq!(dir.metadata(addr, "k").as_deref(), Some("v"));
    }

    #[test]
    fn test_known_devices_sorted() {
        let dir = InMemoryDirectory::new();
        dir.add_device(DeviceAddress::new(3), false);
        dir.add_device(DeviceAddress::new(1), true);
        let known = dir.known_devices();
        assert_eq!(known[0].address, DeviceAddress::new(1));
        assert!(known[0].auto_acknowledge);
        assert_eq!(known.len(), 2);
    }

    #[test]
    fn test_recording_process_manager() {
        let pm = RecordingProcessManager::new();
        pm.restart_radio_process("heartbeat").unwrap();
        assert_eq!(pm.restarts(), vec!["heartbeat".to_string()]);
    }
}
