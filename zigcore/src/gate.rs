//! Unknown-device gate.
//!
//! Decides whether traffic from a device should be refused, and evicts the
//! device when it is.

use std::sync::Arc;

use tracing::{info, warn};

use crate::address::DeviceAddress;
use crate::discovery::DiscoveryManager;
use crate::gateway::properties::REJECT_UNKNOWN_DEVICES;
use crate::gateway::{DeviceDirectory, PropertyStore};
use crate::radio::RadioClient;
use crate::registry::DeviceListenerRegistry;

/// Result of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub reject: bool,
    pub window_open: bool,
}

pub struct UnknownDeviceGate {
    radio: Arc<dyn RadioClient>,
    directory: Arc<dyn DeviceDirectory>,
    properties: Arc<dyn PropertyStore>,
    discovery: Arc<DiscoveryManager>,
    listeners: Arc<DeviceListenerRegistry>,
}

impl UnknownDeviceGate {
    pub fn new(
        radio: Arc<dyn RadioClient>,
        directory: Arc<dyn DeviceDirectory>,
        properties: Arc<dyn PropertyStore>,
        discovery: Arc<DiscoveryManager>,
        listeners: Arc<DeviceListenerRegistry>,
    ) -> Self {
        Self {
            radio,
            directory,
            properties,
            discovery,
            listeners,
        }
    }

    /// Evaluates `address` without side effects.
    ///
    /// Never rejects when rejection is explicitly disabled or while the
    /// join window is open. Otherwise rejects unless the device is in
    /// discovery, persisted, or has a registered listener.
    pub fn evaluate(&self, address: DeviceAddress) -> GateDecision {
        let window_open = self.discovery.is_window_open();

        if self.properties.get_bool(REJECT_UNKNOWN_DEVICES) == Some(false) || window_open {
            return GateDecision {
                reject: false,
                window_open,
            };
        }

        let allowed = self.discovery.is_in_discovery(address)
            || self.directory.is_known(address)
            || self.listeners.is_registered(address);

        GateDecision {
            reject: !allowed,
            window_open,
        }
    }

    /// Evaluates `address` and asks a rejected device to leave.
    pub fn should_reject(&self, address: DeviceAddress) -> GateDecision {
        let decision = self.evaluate(address);
        if decision.reject {
            info!(address = %address, "Rejecting traffic from unknown device");
            if let Err(e) = self.radio.request_leave(address) {
                warn!(address = %address, error = %e, "Failed to evict unknown device");
            }
        }
        decision
    }
}
