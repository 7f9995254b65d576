//! Boundary to the radio hardware-abstraction process.
//!
//! The radio process is consumed through the synchronous [`RadioClient`]
//! trait and reports inbound activity as [`RadioEvent`]s. Calls may block
//! on an RPC round trip; callers on async paths run them via
//! `spawn_blocking`.
//!
//! [`SimulatedRadio`] is an in-memory implementation used by tests and the
//! CLI's simulated scenarios.

mod events;
mod simulated;

pub use events::{AttributeReport, FirmwareStatus, RadioEvent, ReceivedClusterCommand};
pub use simulated::{RadioCall, SimulatedDevice, SimulatedRadio};

use std::collections::BTreeMap;
use std::time::Duration;

use crate::address::DeviceAddress;
use crate::error::Result;

/// Parameters for bringing the network up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInitRequest {
    /// Local radio identity.
    pub eui64: DeviceAddress,
    /// Regulatory region code (e.g. `US`).
    pub region: String,
    /// Opaque network configuration last reported by the radio, if any.
    pub network_blob: Option<String>,
    /// Advance frame counters before forming/resuming the network.
    pub increment_counters: bool,
    /// Free-form properties forwarded to the radio.
    pub properties: BTreeMap<String, String>,
}

/// Snapshot of the radio's network state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStatus {
    pub network_is_up: bool,
    pub channel: u8,
    pub pan_id: u16,
    pub extended_pan_id: u64,
    pub eui64: DeviceAddress,
}

/// Simple descriptor for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub endpoint_id: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    pub server_cluster_ids: Vec<u16>,
    pub client_cluster_ids: Vec<u16>,
}

/// One record of an attribute read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeReadRecord {
    pub attribute_id: u16,
    /// ZCL status; zero is success.
    pub status: u8,
    /// Raw attribute value (empty when `status` is non-zero).
    pub data: Vec<u8>,
}

impl AttributeReadRecord {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// One row of the radio's device address table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTableEntry {
    pub address: DeviceAddress,
    pub auto_acknowledge: bool,
    pub hash_based_link_key: bool,
}

/// Energy measured on one channel during a scan. Higher is quieter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEnergy {
    pub channel: u8,
    pub score: i32,
}

/// Energy-scan parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnergyScanRequest {
    pub channels: Vec<u8>,
    pub duration: Duration,
    pub count: u32,
}

/// Radio-side clear-channel-assessment health check parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub cca_threshold: i8,
    pub cca_failure_threshold: u32,
    pub restore_threshold: u32,
    pub delay_between_retries: Duration,
}

/// Radio-side PAN-id conflict defender parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefenderConfig {
    pub pan_id_change_threshold: u32,
    pub window: Duration,
    pub restore: Duration,
}

/// Command surface of the radio process.
///
/// Every method is a blocking RPC. Non-zero radio results surface as
/// [`ZigbeeError::HardwareCallFailed`](crate::error::ZigbeeError::HardwareCallFailed).
pub trait RadioClient: Send + Sync {
    fn heartbeat(&self) -> Result<()>;

    fn network_init(&self, request: &NetworkInitRequest) -> Result<()>;

    fn network_change(&self, channel: u8) -> Result<()>;

    fn system_status(&self) -> Result<SystemStatus>;

    /// Opens the join window. Long-running; never call from the event thread.
    fn enable_join(&self) -> Result<()>;

    fn disable_join(&self) -> Result<()>;

    /// Asks the device to leave the network.
    fn request_leave(&self, address: DeviceAddress) -> Result<()>;

    fn endpoint_ids(&self, address: DeviceAddress) -> Result<Vec<u8>>;

    fn endpoint_info(&self, address: DeviceAddress, endpoint_id: u8) -> Result<EndpointInfo>;

    fn discover_attributes(
        &self,
        address: DeviceAddress,
        endpoint_id: u8,
        cluster_id: u16,
    ) -> Result<Vec<u16>>;

    fn read_attributes(
        &self,
        address: DeviceAddress,
        endpoint_id: u8,
        cluster_id: u16,
        attribute_ids: &[u16],
    ) -> Result<Vec<AttributeReadRecord>>;

    /// Replaces the whole address table.
    fn set_devices(&self, entries: &[AddressTableEntry]) -> Result<()>;

    fn energy_scan(&self, request: &EnergyScanRequest) -> Result<Vec<ChannelEnergy>>;

    fn configure_health_check(&self, config: &HealthCheckConfig) -> Result<()>;

    fn configure_defender(&self, config: &DefenderConfig) -> Result<()>;

    fn enter_low_power_mode(&self) -> Result<()>;

    fn exit_low_power_mode(&self) -> Result<()>;
}
