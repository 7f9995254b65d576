//! Discovered device capability model.
//!
//! [`DiscoveredDeviceDetails`] is the tree produced by discovery and handed
//! to claim handlers. All types are plain owned values; cloning a tree is a
//! structural deep copy.

use serde::{Deserialize, Serialize};

use crate::address::DeviceAddress;
use crate::error::{Result, ZigbeeError};

/// Mesh role reported in a device announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    EndDevice,
    Router,
    #[default]
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::EndDevice => "end_device",
            DeviceType::Router => "router",
            DeviceType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power source reported in a device announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    Mains,
    Battery,
    #[default]
    Unknown,
}

impl PowerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerSource::Mains => "mains",
            PowerSource::Battery => "battery",
            PowerSource::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PowerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attribute id, optionally with the raw value captured during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDetails {
    pub attribute_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Vec<u8>>,
}

impl AttributeDetails {
    pub fn new(attribute_id: u16) -> Self {
        Self {
            attribute_id,
            value: None,
        }
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDetails {
    pub cluster_id: u16,
    #[serde(default)]
    pub attributes: Vec<AttributeDetails>,
}

impl ClusterDetails {
    pub fn new(cluster_id: u16) -> Self {
        Self {
            cluster_id,
            attributes: Vec::new(),
        }
    }

    /// Looks up an attribute by id.
    pub fn attribute(&self, attribute_id: u16) -> Option<&AttributeDetails> {
        self.attributes
            .iter()
            .find(|a| a.attribute_id == attribute_id)
    }
}

/// One application endpoint on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDetails {
    pub endpoint_id: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    #[serde(default)]
    pub server_clusters: Vec<ClusterDetails>,
    #[serde(default)]
    pub client_clusters: Vec<ClusterDetails>,
}

impl EndpointDetails {
    pub fn server_cluster(&self, cluster_id: u16) -> Option<&ClusterDetails> {
        self.server_clusters
            .iter()
            .find(|c| c.cluster_id == cluster_id)
    }

    pub fn client_cluster(&self, cluster_id: u16) -> Option<&ClusterDetails> {
        self.client_clusters
            .iter()
            .find(|c| c.cluster_id == cluster_id)
    }
}

/// Full capability tree for a device, as offered to claim handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDeviceDetails {
    pub address: DeviceAddress,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub hardware_version: u8,
    #[serde(default)]
    pub app_version: u8,
    /// OTA current file version, when the device exposes one.
    #[serde(default)]
    pub firmware_version: u32,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub power_source: PowerSource,
    #[serde(default)]
    pub endpoints: Vec<EndpointDetails>,
}

impl DiscoveredDeviceDetails {
    /// Creates an empty tree for `address`.
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            manufacturer: String::new(),
            model: String::new(),
            hardware_version: 0,
            app_version: 0,
            firmware_version: 0,
            device_type: DeviceType::Unknown,
            power_source: PowerSource::Unknown,
            endpoints: Vec::new(),
        }
    }

    /// Fills fields the fetch left unknown from announcement data.
    ///
    /// Values already known from the radio take precedence.
    pub fn merge_announcement(
        &mut self,
        device_type: Option<DeviceType>,
        power_source: Option<PowerSource>,
    ) {
        if self.device_type == DeviceType::Unknown {
            if let Some(t) = device_type {
                self.device_type = t;
            }
        }
        if self.power_source == PowerSource::Unknown {
            if let Some(p) = power_source {
                self.power_source = p;
            }
        }
    }

    pub fn endpoint(&self, endpoint_id: u8) -> Option<&EndpointDetails> {
        self.endpoints.iter().find(|e| e.endpoint_id == endpoint_id)
    }

    /// Serializes the tree for persistence hand-off.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ZigbeeError::InvalidArgument(format!("device details: {}", e)))
    }

    /// Parses a tree produced by [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Err(ZigbeeError::InvalidArgument(
                "device details JSON is empty".to_string(),
            ));
        }
        serde_json::from_str(json)
            .map_err(|e| ZigbeeError::InvalidArgument(format!("device details: {}", e)))
    }
}
