//! Builds device capability trees from radio primitives.

use tracing::debug;

use crate::address::DeviceAddress;
use crate::codec::PayloadCodec;
use crate::device::{AttributeDetails, ClusterDetails, DiscoveredDeviceDetails, EndpointDetails};
use crate::error::Result;
use crate::radio::{AttributeReadRecord, RadioClient};

pub const BASIC_CLUSTER: u16 = 0x0000;
pub const OTA_CLUSTER: u16 = 0x0019;

const ATTR_APP_VERSION: u16 = 0x0001;
const ATTR_HW_VERSION: u16 = 0x0003;
const ATTR_MANUFACTURER: u16 = 0x0004;
const ATTR_MODEL: u16 = 0x0005;
const ATTR_OTA_CURRENT_FILE_VERSION: u16 = 0x0002;

const BASIC_ATTRIBUTES: [u16; 4] = [
    ATTR_APP_VERSION,
    ATTR_HW_VERSION,
    ATTR_MANUFACTURER,
    ATTR_MODEL,
];

/// Queries the radio for the full capability tree of `address`.
///
/// Walks endpoints, discovers attributes on every server cluster, then
/// reads identification from the Basic cluster and the OTA file version
/// when the device has an OTA client cluster. Attributes the device
/// reports as unsupported are left at their defaults.
///
/// # Errors
///
/// Any failed radio call or undecodable value fails the whole fetch.
pub fn fetch_details(radio: &dyn RadioClient, address: DeviceAddress) -> Result<DiscoveredDeviceDetails> {
    let mut details = DiscoveredDeviceDetails::new(address);

    for endpoint_id in radio.endpoint_ids(address)? {
        let info = radio.endpoint_info(address, endpoint_id)?;

        let mut server_clusters = Vec::with_capacity(info.server_cluster_ids.len());
        for cluster_id in &info.server_cluster_ids {
            let attribute_ids = radio.discover_attributes(address, endpoint_id, *cluster_id)?;
            server_clusters.push(ClusterDetails {
                cluster_id: *cluster_id,
                attributes: attribute_ids.into_iter().map(AttributeDetails::new).collect(),
            });
        }

        details.endpoints.push(EndpointDetails {
            endpoint_id,
            profile_id: info.profile_id,
            device_id: info.device_id,
            device_version: info.device_version,
            server_clusters,
            client_clusters: info
                .client_cluster_ids
                .iter()
                .map(|id| ClusterDetails::new(*id))
                .collect(),
        });
    }

    read_basic_identity(radio, &mut details)?;
    read_firmware_version(radio, &mut details)?;

    debug!(
        address = %address,
        endpoints = details.endpoints.len(),
        manufacturer = %details.manufacturer,
        model = %details.model,
        "Fetched device details"
    );
    Ok(details)
}

fn read_basic_identity(radio: &dyn RadioClient, details: &mut DiscoveredDeviceDetails) -> Result<()> {
    let Some(endpoint_id) = details
        .endpoints
        .iter()
        .find(|e| e.server_cluster(BASIC_CLUSTER).is_some())
        .map(|e| e.endpoint_id)
    else {
        return Ok(());
    };

    let records = radio.read_attributes(details.address, endpoint_id, BASIC_CLUSTER, &BASIC_ATTRIBUTES)?;

    for record in records.iter().filter(|r| r.is_success()) {
        let mut codec = PayloadCodec::reader(&record.data);
        match record.attribute_id {
            ATTR_APP_VERSION => details.app_version = codec.get_u8()?,
            ATTR_HW_VERSION => details.hardware_version = codec.get_u8()?,
            ATTR_MANUFACTURER => details.manufacturer = codec.get_string()?,
            ATTR_MODEL => details.model = codec.get_string()?,
            _ => continue,
        }
        codec.finish()?;
    }

    capture_values(details, endpoint_id, BASIC_CLUSTER, &records);
    Ok(())
}

fn read_firmware_version(radio: &dyn RadioClient, details: &mut DiscoveredDeviceDetails) -> Result<()> {
    let Some(endpoint_id) = details
        .endpoints
        .iter()
        .find(|e| e.client_cluster(OTA_CLUSTER).is_some())
        .map(|e| e.endpoint_id)
    else {
        return Ok(());
    };

    let records = radio.read_attributes(
        details.address,
        endpoint_id,
        OTA_CLUSTER,
        &[ATTR_OTA_CURRENT_FILE_VERSION],
    )?;

    if let Some(record) = records
        .iter()
        .find(|r| r.attribute_id == ATTR_OTA_CURRENT_FILE_VERSION && r.is_success())
    {
        let mut codec = PayloadCodec::reader(&record.data);
        details.firmware_version = codec.get_u32()?;
        codec.finish()?;
    }
    Ok(())
}

/// Stores raw read values on the matching server cluster attributes.
fn capture_values(
    details: &mut DiscoveredDeviceDetails,
    endpoint_id: u8,
    cluster_id: u16,
    records: &[AttributeReadRecord],
) {
    let Some(cluster) = details
        .endpoints
        .iter_mut()
        .find(|e| e.endpoint_id == endpoint_id)
        .and_then(|e| e.server_clusters.iter_mut().find(|c| c.cluster_id == cluster_id))
    else {
        return;
    };

    for record in records.iter().filter(|r| r.is_success()) {
        match cluster
            .attributes
            .iter_mut()
            .find(|a| a.attribute_id == record.attribute_id)
        {
            Some(attr) => attr.value = Some(record.data.clone()),
            None => cluster
                .attributes
                .push(AttributeDetails::new(record.attribute_id).with_value(record.data.clone())),
        }
    }
}
