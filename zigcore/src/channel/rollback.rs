//! Rollback watchdog context and the rejoin check.

use std::collections::HashSet;
use std::time::SystemTime;

use crate::address::DeviceAddress;
use crate::gateway::DeviceDirectory;

/// State captured when a channel change is requested, consumed once when
/// the rollback check runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelChangeWatchdogContext {
    /// Devices already in comm-fail; they are not expected to follow.
    pub devices_previously_in_comm_fail: HashSet<DeviceAddress>,
    pub previous_channel: u8,
    pub target_channel: u8,
    /// Devices must be heard from at or after this moment.
    pub requested_at: SystemTime,
    /// When the check is due.
    pub deadline: SystemTime,
}

impl ChannelChangeWatchdogContext {
    /// Snapshots the comm-fail set from `directory`.
    pub fn capture(
        directory: &dyn DeviceDirectory,
        previous_channel: u8,
        target_channel: u8,
        requested_at: SystemTime,
        delay: std::time::Duration,
    ) -> Self {
        let devices_previously_in_comm_fail = directory
            .known_devices()
            .into_iter()
            .map(|d| d.address)
            .filter(|a| directory.is_in_comm_fail(*a))
            .collect();

        Self {
            devices_previously_in_comm_fail,
            previous_channel,
            target_channel,
            requested_at,
            deadline: requested_at + delay,
        }
    }
}

/// Known, non-exempt devices with no contact since the change was requested.
pub fn devices_failing_to_follow(
    directory: &dyn DeviceDirectory,
    context: &ChannelChangeWatchdogContext,
) -> Vec<DeviceAddress> {
    directory
        .known_devices()
        .into_iter()
        .map(|d| d.address)
        .filter(|a| !context.devices_previously_in_comm_fail.contains(a))
        .filter(|a| match directory.last_contact(*a) {
            Some(at) => at < context.requested_at,
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::InMemoryDirectory;
    use std::time::Duration;

    #[test]
    fn test_exempt_and_followers_not_reported() {
        let directory = InMemoryDirectory::new();
        let t0 = SystemTime::now();
        for raw in 1..=4 {
            directory.add_device(DeviceAddress::new(raw), false);
        }
        directory.set_comm_fail(DeviceAddress::new(1), true);

        let ctx = ChannelChangeWatchdogContext::capture(&directory, 25, 20, t0, Duration::from_secs(900));
        assert_eq!(ctx.devices_previously_in_comm_fail.len(), 1);
        assert_eq!(ctx.deadline, t0 + Duration::from_secs(900));

        directory.touch(DeviceAddress::new(2), t0 + Duration::from_secs(5));
        directory.touch(DeviceAddress::new(3), t0 - Duration::from_secs(5));

        let failed = devices_failing_to_follow(&directory, &ctx);
        assert_eq!(failed, vec![DeviceAddress::new(3), DeviceAddress::new(4)]);
    }

    #[test]
    fn test_contact_exactly_at_request_counts() {
        let directory = InMemoryDirectory::new();
        let t0 = SystemTime::now();
        directory.add_device(DeviceAddress::new(1), false);
        let ctx = ChannelChangeWatchdogContext::capture(&directory, 25, 20, t0, Duration::from_secs(1));
        directory.touch(DeviceAddress::new(1), t0);
        assert!(devices_failing_to_follow(&directory, &ctx).is_empty());
    }
}
