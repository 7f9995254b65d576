//! Inbound radio events.

use std::time::SystemTime;

use crate::address::DeviceAddress;
use crate::device::{DeviceType, PowerSource};

/// A cluster command received from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedClusterCommand {
    pub address: DeviceAddress,
    pub endpoint_id: u8,
    pub profile_id: u16,
    pub cluster_id: u16,
    pub command_id: u8,
    pub from_server: bool,
    pub mfg_specific: bool,
    pub mfg_code: u16,
    pub seq_num: u8,
    pub rssi: i8,
    pub lqi: u8,
    pub payload: Vec<u8>,
}

impl ReceivedClusterCommand {
    /// Minimal command with zeroed link metadata.
    pub fn new(address: DeviceAddress, cluster_id: u16, command_id: u8, payload: Vec<u8>) -> Self {
        Self {
            address,
            endpoint_id: 1,
            profile_id: 0x0104,
            cluster_id,
            command_id,
            from_server: false,
            mfg_specific: false,
            mfg_code: 0,
            seq_num: 0,
            rssi: 0,
            lqi: 0,
            payload,
        }
    }
}

/// An attribute report received from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeReport {
    pub address: DeviceAddress,
    pub endpoint_id: u8,
    pub cluster_id: u16,
    pub rssi: i8,
    pub lqi: u8,
    /// Raw report records.
    pub payload: Vec<u8>,
    pub received_at: SystemTime,
}

/// Progress of an over-the-air firmware upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareStatus {
    Idle,
    Downloading { percent: u8 },
    Completed,
    Failed,
}

/// Everything the radio process reports asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// The radio process (re)started and is ready for network init.
    Startup,
    DeviceJoined {
        address: DeviceAddress,
    },
    DeviceAnnounced {
        address: DeviceAddress,
        device_type: DeviceType,
        power_source: PowerSource,
    },
    DeviceRejoined {
        address: DeviceAddress,
        is_secure: bool,
    },
    DeviceLeft {
        address: DeviceAddress,
    },
    /// `address` may be [`DeviceAddress::WILDCARD`].
    LinkKeyUpdated {
        address: DeviceAddress,
        is_hash_based: bool,
    },
    AttributeReport(AttributeReport),
    ClusterCommand(ReceivedClusterCommand),
    FirmwareStatus {
        address: DeviceAddress,
        status: FirmwareStatus,
    },
    InterferenceChanged {
        detected: bool,
    },
    NetworkConfigChanged {
        blob: String,
    },
}

impl RadioEvent {
    /// Device the event is about, if any.
    pub fn address(&self) -> Option<DeviceAddress> {
        match self {
            RadioEvent::DeviceJoined { address }
            | RadioEvent::DeviceAnnounced { address, .. }
            | RadioEvent::DeviceRejoined { address, .. }
            | RadioEvent::DeviceLeft { address }
            | RadioEvent::LinkKeyUpdated { address, .. }
            | RadioEvent::FirmwareStatus { address, .. } => Some(*address),
            RadioEvent::AttributeReport(r) => Some(r.address),
            RadioEvent::ClusterCommand(c) => Some(c.address),
            RadioEvent::Startup
            | RadioEvent::InterferenceChanged { .. }
            | RadioEvent::NetworkConfigChanged { .. } => None,
        }
    }
}
