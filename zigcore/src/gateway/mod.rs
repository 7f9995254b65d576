//! Collaborators provided by the rest of the gateway.
//!
//! The orchestration layer does not own device persistence, system
//! properties, or process supervision. It reaches them through these
//! traits; [`memory`] has in-memory implementations for tests and the CLI.

pub mod memory;
pub mod properties;

use std::time::SystemTime;

use crate::address::DeviceAddress;
use crate::error::Result;

/// A device the gateway has persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub address: DeviceAddress,
    /// The radio should acknowledge traffic from this device itself.
    pub auto_acknowledge: bool,
}

/// Persistent device lookup.
pub trait DeviceDirectory: Send + Sync {
    /// Is the device known (persisted)?
    fn is_known(&self, address: DeviceAddress) -> bool;

    fn known_devices(&self) -> Vec<KnownDevice>;

    fn is_in_comm_fail(&self, address: DeviceAddress) -> bool;

    /// Last time the device was heard from.
    fn last_contact(&self, address: DeviceAddress) -> Option<SystemTime>;

    fn metadata(&self, address: DeviceAddress, key: &str) -> Option<String>;

    fn set_metadata(&self, address: DeviceAddress, key: &str, value: &str) -> Result<()>;
}

/// System property get/set.
pub trait PropertyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Parses a boolean property. Unset or unparseable returns `None`.
    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}

/// External process supervision.
pub trait ProcessManager: Send + Sync {
    /// Asks the supervisor to restart the radio process.
    fn restart_radio_process(&self, reason: &str) -> Result<()>;
}
