//! Join/announce correlation records.

use crate::address::DeviceAddress;
use crate::device::{DeviceType, PowerSource};

/// What has been seen of a device during the join window.
///
/// Complete once the device has joined and announced; completion is the
/// only trigger for discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnouncementRecord {
    pub has_joined: bool,
    pub device_type: Option<DeviceType>,
    pub power_source: Option<PowerSource>,
}

impl AnnouncementRecord {
    pub fn is_complete(&self) -> bool {
        self.has_joined && self.device_type.is_some() && self.power_source.is_some()
    }
}

/// A completed record, handed to discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryTrigger {
    pub address: DeviceAddress,
    pub device_type: Option<DeviceType>,
    pub power_source: Option<PowerSource>,
}

impl DiscoveryTrigger {
    pub(super) fn from_record(address: DeviceAddress, record: &AnnouncementRecord) -> Self {
        Self {
            address,
            device_type: record.device_type,
            power_source: record.power_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completeness_needs_all_three() {
        let mut record = AnnouncementRecord::default();
        assert!(!record.is_complete());
        record.has_joined = true;
        assert!(!record.is_complete());
        record.device_type = Some(DeviceType::Router);
        assert!(!record.is_complete());
        record.power_source = Some(PowerSource::Mains);
        assert!(record.is_complete());
    }
}
