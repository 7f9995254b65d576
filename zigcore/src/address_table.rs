//! Radio address-table synchronization.
//!
//! The radio keeps a per-device table (auto-acknowledge, hash-based link
//! key). It is always replaced whole: every sync pushes every known device.
//!
//! Link-key updates can arrive before a device is persisted. Those are kept
//! as early updates and folded into the device's metadata at the next sync
//! that finds it known.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::address::DeviceAddress;
use crate::error::Result;
use crate::gateway::properties::META_HASH_BASED_LINK_KEY;
use crate::gateway::DeviceDirectory;
use crate::radio::{AddressTableEntry, RadioClient};

pub struct AddressTableSync {
    radio: Arc<dyn RadioClient>,
    directory: Arc<dyn DeviceDirectory>,
    early_updates: DashMap<DeviceAddress, bool>,
}

impl AddressTableSync {
    pub fn new(radio: Arc<dyn RadioClient>, directory: Arc<dyn DeviceDirectory>) -> Self {
        Self {
            radio,
            directory,
            early_updates: DashMap::new(),
        }
    }

    /// Records a link-key update.
    ///
    /// Known devices get their metadata updated right away; unknown ones are
    /// held for the next sync. The wildcard address applies to every known
    /// device.
    pub fn on_link_key_updated(&self, address: DeviceAddress, is_hash_based: bool) {
        if address.is_wildcard() {
            let devices = self.directory.known_devices();
            debug!(devices = devices.len(), is_hash_based, "Link key update for all devices");
            for device in devices {
                self.persist_flag(device.address, is_hash_based);
            }
            return;
        }

        if self.directory.is_known(address) {
            self.persist_flag(address, is_hash_based);
        } else {
            debug!(address = %address, is_hash_based, "Link key update before device is persisted");
            self.early_updates.insert(address, is_hash_based);
        }
    }

    pub fn early_update(&self, address: DeviceAddress) -> Option<bool> {
        self.early_updates.get(&address).map(|v| *v)
    }

    pub fn forget(&self, address: DeviceAddress) {
        if self.early_updates.remove(&address).is_some() {
            debug!(address = %address, "Dropped early link key update");
        }
    }

    /// Drops early updates for devices that never got persisted.
    ///
    /// Called when the join window closes; returns the number dropped.
    pub fn discard_unpersisted(&self) -> usize {
        let before = self.early_updates.len();
        self.early_updates
            .retain(|address, _| self.directory.is_known(*address));
        let dropped = before.saturating_sub(self.early_updates.len());
        if dropped > 0 {
            debug!(dropped, "Discarded link key updates for unpersisted devices");
        }
        dropped
    }

    fn persist_flag(&self, address: DeviceAddress, is_hash_based: bool) {
        if let Err(e) = self.directory.set_metadata(
            address,
            META_HASH_BASED_LINK_KEY,
            if is_hash_based { "true" } else { "false" },
        ) {
            warn!(address = %address, error = %e, "Failed to persist link key flag");
        }
    }

    fn hash_flag(&self, address: DeviceAddress) -> bool {
        if let Some((_, early)) = self.early_updates.remove(&address) {
            self.persist_flag(address, early);
            return early;
        }
        self.directory
            .metadata(address, META_HASH_BASED_LINK_KEY)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Builds the full table from known devices.
    pub fn build_table(&self) -> Vec<AddressTableEntry> {
        self.directory
            .known_devices()
            .into_iter()
            .map(|device| AddressTableEntry {
                address: device.address,
                auto_acknowledge: device.auto_acknowledge,
                hash_based_link_key: self.hash_flag(device.address),
            })
            .collect()
    }

    /// Pushes every known device to the radio in one call.
    ///
    /// Returns the number of entries sent.
    pub fn sync_all(&self) -> Result<usize> {
        let table = self.build_table();
        self.radio.set_devices(&table)?;
        info!(entries = table.len(), "Address table synchronized");
        Ok(table.len())
    }
}
