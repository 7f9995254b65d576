//! Discovery claim offers.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::device::DiscoveredDeviceDetails;

/// A discovered device offered to claim handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOffer {
    /// Correlates the offer with later driver activity in logs.
    pub token: u64,
    pub details: DiscoveredDeviceDetails,
}

/// Something that may take ownership of newly discovered devices,
/// typically a driver factory.
pub trait DiscoveryHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Returns true to claim the device. The first handler to claim wins.
    fn claim(&self, offer: &DiscoveryOffer) -> bool;
}

/// Monotonic offer token source.
#[derive(Debug, Default)]
pub(super) struct OfferTokens(AtomicU64);

impl OfferTokens {
    pub(super) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}
