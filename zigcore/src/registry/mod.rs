//! Per-device listener registry.
//!
//! Drivers register one [`DeviceListener`] per device address. Inbound
//! events are dispatched to it; events a listener does not override are
//! silently skipped. The `notify_*` methods report whether a listener was
//! found, which the unknown-device gate uses as a "known to a driver" check.

mod reaping;

pub use reaping::ReapingMap;

use std::sync::Arc;

use tracing::debug;

use crate::address::DeviceAddress;
use crate::error::{Result, ZigbeeError};
use crate::radio::{AttributeReport, FirmwareStatus, ReceivedClusterCommand};

/// Callbacks a driver receives for one device.
///
/// Every method defaults to a no-op.
pub trait DeviceListener: Send + Sync {
    fn on_attribute_report(&self, _report: &AttributeReport) {}

    fn on_cluster_command(&self, _command: &ReceivedClusterCommand) {}

    fn on_rejoin(&self, _address: DeviceAddress, _is_secure: bool) {}

    fn on_left(&self, _address: DeviceAddress) {}

    fn on_firmware_status(&self, _address: DeviceAddress, _status: FirmwareStatus) {}
}

/// Address-keyed listener map.
pub struct DeviceListenerRegistry {
    listeners: ReapingMap<DeviceAddress, Arc<dyn DeviceListener>>,
}

impl DeviceListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: ReapingMap::new(),
        }
    }

    /// Registers `listener` for `address`.
    ///
    /// # Errors
    ///
    /// [`ZigbeeError::AlreadyRegistered`] if the address already has one.
    pub fn register(&self, address: DeviceAddress, listener: Arc<dyn DeviceListener>) -> Result<()> {
        if !self.listeners.insert_new(address, listener) {
            return Err(ZigbeeError::AlreadyRegistered(address));
        }
        debug!(address = %address, "Device listener registered");
        Ok(())
    }

    /// Removes the listener for `address`.
    ///
    /// # Errors
    ///
    /// [`ZigbeeError::NotFound`] if none is registered.
    pub fn unregister(&self, address: DeviceAddress) -> Result<()> {
        match self.listeners.remove(&address) {
            Some(_) => {
                debug!(address = %address, "Device listener unregistered");
                Ok(())
            }
            None => Err(ZigbeeError::NotFound(format!(
                "no listener registered for device {}",
                address
            ))),
        }
    }

    pub fn is_registered(&self, address: DeviceAddress) -> bool {
        self.listeners.contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    // The listener is cloned out so callbacks run without the map lock;
    // a callback may register or unregister listeners itself.
    fn lookup(&self, address: DeviceAddress) -> Option<Arc<dyn DeviceListener>> {
        self.listeners.with_item(&address, |l| Arc::clone(l))
    }

    pub fn notify_attribute_report(&self, report: &AttributeReport) -> bool {
        self.lookup(report.address)
            .map(|l| l.on_attribute_report(report))
            .is_some()
    }

    pub fn notify_cluster_command(&self, command: &ReceivedClusterCommand) -> bool {
        self.lookup(command.address)
            .map(|l| l.on_cluster_command(command))
            .is_some()
    }

    pub fn notify_rejoin(&self, address: DeviceAddress, is_secure: bool) -> bool {
        self.lookup(address)
            .map(|l| l.on_rejoin(address, is_secure))
            .is_some()
    }

    pub fn notify_left(&self, address: DeviceAddress) -> bool {
        self.lookup(address).map(|l| l.on_left(address)).is_some()
    }

    pub fn notify_firmware_status(&self, address: DeviceAddress, status: FirmwareStatus) -> bool {
        self.lookup(address)
            .map(|l| l.on_firmware_status(address, status))
            .is_some()
    }
}

impl Default for DeviceListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
