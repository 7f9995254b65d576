//! Device discovery: join window, join/announce correlation, claim offers.
//!
//! A device is discovered once both its "joined" and "announced" events
//! have been seen, in either order. Completion marks the address as in
//! discovery, and the caller then runs [`DiscoveryManager::run_discovery`]
//! off the event thread: details are fetched from the radio, offered to
//! claim handlers in registration order, and an unclaimed device is told
//! to leave.
//!
//! The join window is reference counted. The first opener enables joining
//! on the radio (in the background, the call is slow); the last closer
//! disables it and discards every partial record and buffered command.

mod claim;
mod fetch;
mod record;

pub use claim::{DiscoveryHandler, DiscoveryOffer};
pub use fetch::{fetch_details, BASIC_CLUSTER, OTA_CLUSTER};
pub use record::{AnnouncementRecord, DiscoveryTrigger};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::address::DeviceAddress;
use crate::device::{DeviceType, PowerSource};
use crate::gateway::DeviceDirectory;
use crate::pending::PrematureCommandBuffer;
use crate::radio::RadioClient;
use crate::scheduler::TaskScheduler;
use claim::OfferTokens;

/// How a discovery run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// A handler took the device.
    Claimed { handler: String },
    /// No handler wanted it; the device was asked to leave.
    Unclaimed,
    /// Details could not be fetched; correlation was reset for a retry.
    FetchFailed,
}

/// Join-window, correlation and in-discovery state.
pub struct DiscoveryManager {
    radio: Arc<dyn RadioClient>,
    directory: Arc<dyn DeviceDirectory>,
    pending: Arc<PrematureCommandBuffer>,
    scheduler: TaskScheduler,

    /// Window reference count. Held while issuing join enable/disable so
    /// transitions are serialized.
    window: Mutex<u32>,
    /// Copy of the count for readers on the event path, which must not wait
    /// behind a join enable/disable call.
    holds: AtomicU32,
    /// "Find orphaned devices" mode.
    recovery: AtomicBool,
    /// One lock linearizes join/announce per address.
    records: Mutex<HashMap<DeviceAddress, AnnouncementRecord>>,
    in_discovery: Mutex<HashSet<DeviceAddress>>,
    handlers: RwLock<Vec<Arc<dyn DiscoveryHandler>>>,
    tokens: OfferTokens,
}

impl DiscoveryManager {
    pub fn new(
        radio: Arc<dyn RadioClient>,
        directory: Arc<dyn DeviceDirectory>,
        pending: Arc<PrematureCommandBuffer>,
        scheduler: TaskScheduler,
    ) -> Self {
        Self {
            radio,
            directory,
            pending,
            scheduler,
            window: Mutex::new(0),
            holds: AtomicU32::new(0),
            recovery: AtomicBool::new(false),
            records: Mutex::new(HashMap::new()),
            in_discovery: Mutex::new(HashSet::new()),
            handlers: RwLock::new(Vec::new()),
            tokens: OfferTokens::default(),
        }
    }

    // =========================================================================
    // Join window
    // =========================================================================

    /// Opens (or holds open) the join window. Returns the new count.
    pub fn start_discovery(&self) -> u32 {
        let mut count = self.window.lock();
        *count += 1;
        self.holds.store(*count, Ordering::SeqCst);

        if *count == 1 {
            info!("Opening join window");
            let radio = Arc::clone(&self.radio);
            self.scheduler.spawn_detached("enable-join", move || {
                if let Err(e) = radio.enable_join() {
                    warn!(error = %e, "Failed to enable joining");
                }
            });
        }
        *count
    }

    /// Releases one hold on the join window. Returns the new count.
    ///
    /// Closing the window discards partial correlation records and all
    /// premature commands. Unbalanced calls are ignored.
    pub fn stop_discovery(&self) -> u32 {
        let mut count = self.window.lock();
        if *count == 0 {
            warn!("Join window stop without matching start");
            return 0;
        }
        *count -= 1;
        self.holds.store(*count, Ordering::SeqCst);

        if *count == 0 {
            info!("Closing join window");
            if let Err(e) = self.radio.disable_join() {
                warn!(error = %e, "Failed to disable joining");
            }
            let abandoned = {
                let mut records = self.records.lock();
                let n = records.len();
                records.clear();
                n
            };
            self.pending.clear();
            if abandoned > 0 {
                debug!(abandoned, "Discarded incomplete announcement records");
            }
        }
        *count
    }

    /// Lock-free; safe to call from the radio event thread.
    pub fn is_window_open(&self) -> bool {
        self.holds.load(Ordering::SeqCst) > 0
    }

    pub fn window_count(&self) -> u32 {
        self.holds.load(Ordering::SeqCst)
    }

    /// Enters orphan recovery and opens the window.
    pub fn start_orphan_recovery(&self) {
        self.recovery.store(true, Ordering::SeqCst);
        info!("Orphaned device recovery started");
        self.start_discovery();
    }

    /// Closes the window and leaves orphan recovery.
    pub fn stop_orphan_recovery(&self) {
        self.stop_discovery();
        self.recovery.store(false, Ordering::SeqCst);
        info!("Orphaned device recovery stopped");
    }

    pub fn is_recovery_mode(&self) -> bool {
        self.recovery.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Correlation
    // =========================================================================

    pub fn is_in_discovery(&self, address: DeviceAddress) -> bool {
        self.in_discovery.lock().contains(&address)
    }

    pub fn pending_record(&self, address: DeviceAddress) -> Option<AnnouncementRecord> {
        self.records.lock().get(&address).cloned()
    }

    pub fn pending_record_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Drops a partial record, e.g. when the device leaves mid-pairing.
    pub fn forget(&self, address: DeviceAddress) -> bool {
        let removed = self.records.lock().remove(&address).is_some();
        if removed {
            debug!(address = %address, "Discarded announcement record");
        }
        removed
    }

    /// Handles a hardware "joined" event.
    ///
    /// Returns a trigger when this event completed the device's record.
    pub fn on_joined(&self, address: DeviceAddress) -> Option<DiscoveryTrigger> {
        self.correlate(address, "joined", |record| record.has_joined = true)
    }

    /// Handles a hardware "announced" event.
    ///
    /// Returns a trigger when this event completed the device's record.
    pub fn on_announced(
        &self,
        address: DeviceAddress,
        device_type: DeviceType,
        power_source: PowerSource,
    ) -> Option<DiscoveryTrigger> {
        self.correlate(address, "announced", |record| {
            record.device_type = Some(device_type);
            record.power_source = Some(power_source);
        })
    }

    /// Known devices are ignored unless recovering orphans; unknown devices
    /// are ignored while recovering. Recovery only re-finds devices the
    /// gateway already owns.
    fn should_ignore(&self, address: DeviceAddress, event: &'static str) -> bool {
        let known = self.directory.is_known(address);
        let recovering = self.is_recovery_mode();

        match (known, recovering) {
            (true, false) => {
                warn!(address = %address, event, "Ignoring event from already known device");
                true
            }
            (false, true) => {
                warn!(address = %address, event, "Ignoring unknown device during orphan recovery");
                true
            }
            _ => false,
        }
    }

    fn correlate(
        &self,
        address: DeviceAddress,
        event: &'static str,
        apply: impl FnOnce(&mut AnnouncementRecord),
    ) -> Option<DiscoveryTrigger> {
        if self.should_ignore(address, event) {
            return None;
        }

        let mut records = self.records.lock();

        if self.is_in_discovery(address) {
            debug!(address = %address, event, "Device already in discovery");
            return None;
        }

        let record = records.entry(address).or_default();
        apply(record);
        debug!(address = %address, event, ?record, "Correlated device event");

        if !record.is_complete() {
            return None;
        }

        let trigger = DiscoveryTrigger::from_record(address, record);
        records.remove(&address);
        // Marked before the records lock drops so the gate never sees a
        // gap between "complete" and "in discovery".
        self.in_discovery.lock().insert(address);
        info!(address = %address, "Device ready for discovery");
        Some(trigger)
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Adds a claim handler after those already registered.
    pub fn add_handler(&self, handler: Arc<dyn DiscoveryHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Fetches details, offers them to handlers and evicts unclaimed devices.
    ///
    /// Blocking: calls the radio. Always removes the in-discovery marker.
    pub fn run_discovery(&self, trigger: DiscoveryTrigger) -> DiscoveryOutcome {
        let address = trigger.address;

        let mut details = match fetch_details(self.radio.as_ref(), address) {
            Ok(d) => d,
            Err(e) => {
                warn!(address = %address, error = %e, "Device detail fetch failed, abandoning discovery");
                self.records.lock().remove(&address);
                self.in_discovery.lock().remove(&address);
                return DiscoveryOutcome::FetchFailed;
            }
        };
        details.merge_announcement(trigger.device_type, trigger.power_source);

        let offer = DiscoveryOffer {
            token: self.tokens.next(),
            details,
        };
        let handlers: Vec<Arc<dyn DiscoveryHandler>> = self.handlers.read().clone();
        let claimed_by = handlers
            .iter()
            .find(|h| h.claim(&offer))
            .map(|h| h.name().to_string());

        self.in_discovery.lock().remove(&address);

        match claimed_by {
            Some(handler) => {
                info!(address = %address, token = offer.token, handler = %handler, "Device claimed");
                DiscoveryOutcome::Claimed { handler }
            }
            None => {
                info!(
                    address = %address,
                    manufacturer = %offer.details.manufacturer,
                    model = %offer.details.model,
                    "No handler claimed device, requesting leave"
                );
                if let Err(e) = self.radio.request_leave(address) {
                    warn!(address = %address, error = %e, "Leave request failed");
                }
                DiscoveryOutcome::Unclaimed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::InMemoryDirectory;
    use crate::radio::{RadioCall, ReceivedClusterCommand, SimulatedDevice, SimulatedRadio};
    use std::time::{Duration, Instant};

    struct Claimer {
        name: &'static str,
        accept: bool,
        offers: Mutex<Vec<DiscoveryOffer>>,
    }

    impl Claimer {
        fn new(name: &'static str, accept: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                accept,
                offers: Mutex::new(Vec::new()),
            })
        }
    }

    impl DiscoveryHandler for Claimer {
        fn name(&self) -> &str {
            self.name
        }

        fn claim(&self, offer: &DiscoveryOffer) -> bool {
            self.offers.lock().push(offer.clone());
            self.accept
        }
    }

    struct Fixture {
        radio: Arc<SimulatedRadio>,
        directory: Arc<InMemoryDirectory>,
        pending: Arc<PrematureCommandBuffer>,
        manager: DiscoveryManager,
    }

    fn fixture() -> Fixture {
        let radio = Arc::new(SimulatedRadio::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let pending = Arc::new(PrematureCommandBuffer::new());
        let manager = DiscoveryManager::new(
            radio.clone(),
            directory.clone(),
            pending.clone(),
            TaskScheduler::try_current().unwrap(),
        );
        Fixture {
            radio,
            directory,
            pending,
            manager,
        }
    }

    const ADDR: DeviceAddress = DeviceAddress::new(0xAABB_CCDD_EEFF_0011);

    #[tokio::test]
    async fn test_join_then_announce_triggers_once() {
        let f = fixture();
        assert!(f.manager.on_joined(ADDR).is_none());
        let trigger = f
            .manager
            .on_announced(ADDR, DeviceType::Router, PowerSource::Mains)
            .unwrap();
        assert_eq!(trigger.device_type, Some(DeviceType::Router));
        assert!(f.manager.is_in_discovery(ADDR));
        assert!(f.manager.pending_record(ADDR).is_none());

        // Duplicates while in discovery do not re-trigger.
        assert!(f.manager.on_joined(ADDR).is_none());
        assert!(f
            .manager
            .on_announced(ADDR, DeviceType::Router, PowerSource::Mains)
            .is_none());
    }

    #[tokio::test]
    async fn test_announce_then_join_triggers() {
        let f = fixture();
        assert!(f
            .manager
            .on_announced(ADDR, DeviceType::EndDevice, PowerSource::Battery)
            .is_none());
        let trigger = f.manager.on_joined(ADDR).unwrap();
        assert_eq!(trigger.power_source, Some(PowerSource::Battery));
    }

    #[tokio::test]
    async fn test_known_device_ignored_outside_recovery() {
        let f = fixture();
        f.directory.add_device(ADDR, false);
        assert!(f.manager.on_joined(ADDR).is_none());
        assert!(f
            .manager
            .on_announced(ADDR, DeviceType::Router, PowerSource::Mains)
            .is_none());
        assert!(f.manager.pending_record(ADDR).is_none());
    }

    #[tokio::test]
    async fn test_recovery_only_rediscovers_known_devices() {
        let f = fixture();
        f.manager.start_orphan_recovery();

        let stranger = DeviceAddress::new(0x1234);
        assert!(f.manager.on_joined(stranger).is_none());
        assert!(f.manager.pending_record(stranger).is_none());

        f.directory.add_device(ADDR, false);
        f.manager.on_joined(ADDR);
        assert!(f
            .manager
            .on_announced(ADDR, DeviceType::Router, PowerSource::Mains)
            .is_some());

        f.manager.stop_orphan_recovery();
        assert!(!f.manager.is_recovery_mode());
    }

    #[tokio::test]
    async fn test_window_ref_counting_and_reset() {
        let f = fixture();
        assert_eq!(f.manager.start_discovery(), 1);
        assert_eq!(f.manager.start_discovery(), 2);

        f.manager.on_joined(ADDR);
        f.pending
            .add(&ReceivedClusterCommand::new(ADDR, 0x0500, 0, vec![]));

        assert_eq!(f.manager.stop_discovery(), 1);
        assert!(f.manager.is_window_open());
        assert_eq!(f.manager.pending_record_count(), 1);

        assert_eq!(f.manager.stop_discovery(), 0);
        assert!(!f.manager.is_window_open());
        assert_eq!(f.manager.pending_record_count(), 0);
        assert!(f.pending.get_all(ADDR).is_empty());
        assert_eq!(f.radio.count_calls(|c| *c == RadioCall::DisableJoin), 1);

        // Unbalanced stop is ignored.
        assert_eq!(f.manager.stop_discovery(), 0);
        assert_eq!(f.radio.count_calls(|c| *c == RadioCall::DisableJoin), 1);
    }

    #[tokio::test]
    async fn test_window_check_does_not_wait_for_disable_join() {
        let f = fixture();
        f.radio
            .set_latency("disable_join", Duration::from_millis(1500));
        f.manager.start_discovery();

        std::thread::scope(|scope| {
            let closer = scope.spawn(|| f.manager.stop_discovery());
            std::thread::sleep(Duration::from_millis(100));

            let started = Instant::now();
            let open = f.manager.is_window_open();
            let waited = started.elapsed();

            assert!(!open);
            assert!(waited < Duration::from_millis(500), "gate check waited {:?}", waited);
            assert_eq!(closer.join().unwrap(), 0);
        });
        assert_eq!(f.radio.count_calls(|c| *c == RadioCall::DisableJoin), 1);
    }

    #[tokio::test]
    async fn test_forget_drops_partial_record() {
        let f = fixture();
        f.manager.on_joined(ADDR);
        assert!(f.manager.forget(ADDR));
        assert!(f.manager.pending_record(ADDR).is_none());
        assert!(!f.manager.forget(ADDR));

        // The next announce starts a fresh record rather than completing.
        assert!(f
            .manager
            .on_announced(ADDR, DeviceType::Router, PowerSource::Mains)
            .is_none());
    }

    #[tokio::test]
    async fn test_unclaimed_device_is_told_to_leave() {
        let f = fixture();
        f.radio.add_device(ADDR, SimulatedDevice::basic("Acme", "Plug"));
        let decliner = Claimer::new("decliner", false);
        f.manager.add_handler(decliner.clone());

        f.manager.on_joined(ADDR);
        let trigger = f
            .manager
            .on_announced(ADDR, DeviceType::Router, PowerSource::Mains)
            .unwrap();
        let outcome = f.manager.run_discovery(trigger);

        assert_eq!(outcome, DiscoveryOutcome::Unclaimed);
        assert_eq!(f.radio.leave_requests(), vec![ADDR]);
        assert!(!f.manager.is_in_discovery(ADDR));
        let offered = &decliner.offers.lock()[0];
        assert_eq!(offered.details.device_type, DeviceType::Router);
        assert_eq!(offered.details.power_source, PowerSource::Mains);
        assert_eq!(offered.details.model, "Plug");
    }

    #[tokio::test]
    async fn test_first_claimer_wins() {
        let f = fixture();
        f.radio.add_device(ADDR, SimulatedDevice::basic("Acme", "Plug"));
        let first = Claimer::new("first", true);
        let second = Claimer::new("second", true);
        f.manager.add_handler(first.clone());
        f.manager.add_handler(second.clone());

        f.manager.on_joined(ADDR);
        let trigger = f
            .manager
            .on_announced(ADDR, DeviceType::Router, PowerSource::Mains)
            .unwrap();

        assert_eq!(
            f.manager.run_discovery(trigger),
            DiscoveryOutcome::Claimed {
                handler: "first".to_string()
            }
        );
        assert!(second.offers.lock().is_empty());
        assert!(f.radio.leave_requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_resets_for_retry() {
        let f = fixture();
        // No simulated device: endpoint query fails.
        f.manager.on_joined(ADDR);
        let trigger = f
            .manager
            .on_announced(ADDR, DeviceType::Router, PowerSource::Mains)
            .unwrap();

        assert_eq!(f.manager.run_discovery(trigger), DiscoveryOutcome::FetchFailed);
        assert!(!f.manager.is_in_discovery(ADDR));
        assert!(f.radio.leave_requests().is_empty());

        // A fresh join/announce pair can retry.
        f.manager.on_joined(ADDR);
        assert!(f
            .manager
            .on_announced(ADDR, DeviceType::Router, PowerSource::Mains)
            .is_some());
    }
}
