//! Buffer for commands that arrive before a device is persisted.
//!
//! Some battery-powered devices send a confirmation command right after
//! joining, before discovery has finished. Those commands are held here,
//! keyed by address, until a driver collects them or the device is
//! finalized.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::address::DeviceAddress;
use crate::error::{Result, ZigbeeError};
use crate::radio::ReceivedClusterCommand;
use crate::registry::ReapingMap;

/// How often a waiter re-checks the queue when no add wakes it.
pub const WAIT_POLL_PERIOD: Duration = Duration::from_secs(1);

/// Per-address queues of premature cluster commands.
pub struct PrematureCommandBuffer {
    queues: ReapingMap<DeviceAddress, VecDeque<ReceivedClusterCommand>>,
    added: Notify,
}

impl PrematureCommandBuffer {
    pub fn new() -> Self {
        Self {
            queues: ReapingMap::new(),
            added: Notify::new(),
        }
    }

    /// Appends a copy of `command` and wakes waiters.
    pub fn add(&self, command: &ReceivedClusterCommand) {
        let address = command.address;
        let depth = self
            .queues
            .upsert(address, VecDeque::new, |q| {
                q.push_back(command.clone());
                q.len()
            });
        debug!(
            address = %address,
            cluster_id = command.cluster_id,
            command_id = command.command_id,
            depth,
            "Buffered premature command"
        );
        self.added.notify_waiters();
    }

    /// Removes and returns every buffered command for `address`, oldest first.
    pub fn get_all(&self, address: DeviceAddress) -> Vec<ReceivedClusterCommand> {
        self.queues
            .remove(&address)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// First buffered command for `address` with `command_id`, not removed.
    pub fn find(&self, address: DeviceAddress, command_id: u8) -> Option<ReceivedClusterCommand> {
        self.queues
            .with_item(&address, |q| {
                q.iter().find(|c| c.command_id == command_id).cloned()
            })
            .flatten()
    }

    /// Waits up to `timeout` for a matching command.
    ///
    /// The match is returned without being removed. Waiters wake on every
    /// add and at least once per [`WAIT_POLL_PERIOD`].
    ///
    /// # Errors
    ///
    /// [`ZigbeeError::NotFound`] if nothing matched before the timeout.
    pub async fn wait_for(
        &self,
        address: DeviceAddress,
        command_id: u8,
        timeout: Duration,
    ) -> Result<ReceivedClusterCommand> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so an add between the
            // check and the wait is not missed.
            let notified = self.added.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(command) = self.find(address, command_id) {
                return Ok(command);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ZigbeeError::NotFound(format!(
                    "command {} from device {} not received within {:?}",
                    command_id, address, timeout
                )));
            }

            let tick = (deadline - now).min(WAIT_POLL_PERIOD);
            tokio::select! {
                _ = &mut notified => trace!(address = %address, "Premature command waiter woken"),
                _ = tokio::time::sleep(tick) => {}
            }
        }
    }

    /// Deletes every buffered command for `address` with `command_id`.
    ///
    /// Returns the number removed.
    pub fn remove_matching(&self, address: DeviceAddress, command_id: u8) -> usize {
        self.queues
            .update(&address, |q| {
                let before = q.len();
                q.retain(|c| c.command_id != command_id);
                (before - q.len(), q.is_empty())
            })
            .unwrap_or(0)
    }

    /// Frees the whole queue for `address`.
    pub fn destroy_all(&self, address: DeviceAddress) {
        if let Some(queue) = self.queues.remove(&address) {
            debug!(address = %address, dropped = queue.len(), "Discarded premature commands");
        }
    }

    /// Frees every queue.
    pub fn clear(&self) {
        self.queues.clear();
    }

    pub fn buffered_addresses(&self) -> Vec<DeviceAddress> {
        self.queues.keys()
    }
}

impl Default for PrematureCommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cmd(addr: u64, command_id: u8) -> ReceivedClusterCommand {
        ReceivedClusterCommand::new(DeviceAddress::new(addr), 0x0500, command_id, vec![command_id])
    }

    #[test]
    fn test_get_all_returns_insertion_order_then_empty() {
        let buffer = PrematureCommandBuffer::new();
        let addr = DeviceAddress::new(1);
        buffer.add(&cmd(1, 3));
        buffer.add(&cmd(1, 1));
        buffer.add(&cmd(2, 9));

        let ids: Vec<u8> = buffer.get_all(addr).iter().map(|c| c.command_id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert!(buffer.get_all(addr).is_empty());
        assert_eq!(buffer.get_all(DeviceAddress::new(2)).len(), 1);
    }

    #[test]
    fn test_add_clones_command() {
        let buffer = PrematureCommandBuffer::new();
        let mut original = cmd(1, 2);
        buffer.add(&original);
        original.payload.push(0xFF);
        assert_eq!(buffer.get_all(DeviceAddress::new(1))[0].payload, vec![2]);
    }

    #[test]
    fn test_remove_matching_reaps_empty_queue() {
        let buffer = PrematureCommandBuffer::new();
        let addr = DeviceAddress::new(1);
        buffer.add(&cmd(1, 5));
        buffer.add(&cmd(1, 5));
        buffer.add(&cmd(1, 6));

        assert_eq!(buffer.remove_matching(addr, 5), 2);
        assert_eq!(buffer.buffered_addresses(), vec![addr]);
        assert_eq!(buffer.remove_matching(addr, 6), 1);
        assert!(buffer.buffered_addresses().is_empty());
        assert_eq!(buffer.remove_matching(addr, 6), 0);
    }

    #[test]
    fn test_destroy_all() {
        let buffer = PrematureCommandBuffer::new();
        buffer.add(&cmd(1, 1));
        buffer.destroy_all(DeviceAddress::new(1));
        assert!(buffer.find(DeviceAddress::new(1), 1).is_none());
    }

    #[tokio::test]
    async fn test_wait_for_returns_already_buffered_without_removing() {
        let buffer = PrematureCommandBuffer::new();
        buffer.add(&cmd(1, 4));
        let found = buffer
            .wait_for(DeviceAddress::new(1), 4, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(found.command_id, 4);
        assert!(buffer.find(DeviceAddress::new(1), 4).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out_with_not_found() {
        let buffer = PrematureCommandBuffer::new();
        let started = Instant::now();
        let err = buffer
            .wait_for(DeviceAddress::new(1), 4, Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(err, ZigbeeError::NotFound(_)));
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_wakes_on_add() {
        let buffer = Arc::new(PrematureCommandBuffer::new());
        let waiter = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                buffer
                    .wait_for(DeviceAddress::new(7), 2, Duration::from_secs(30))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(2500)).await;
        buffer.add(&cmd(7, 1));
        buffer.add(&cmd(7, 2));

        let found = waiter.await.unwrap().unwrap();
        assert_eq!(found.command_id, 2);
    }
}
