//! End-to-end pairing through the full subsystem.
//!
//! Drives join/announce events into a [`ZigbeeSubsystem`] backed by the
//! simulated radio and checks:
//! - discovery fires once per completed join+announce pair, in either order
//! - unclaimed devices are asked to leave and leave no in-discovery marker
//! - claimed devices keep commands buffered during pairing

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use zigcore::device::{DeviceType, PowerSource};
use zigcore::discovery::{DiscoveryHandler, DiscoveryOffer};
use zigcore::events::SubsystemEvent;
use zigcore::gateway::memory::{InMemoryDirectory, InMemoryProperties, RecordingProcessManager};
use zigcore::radio::{RadioCall, RadioEvent, ReceivedClusterCommand, SimulatedDevice, SimulatedRadio};
use zigcore::subsystem::{SubsystemBuilder, ZigbeeSubsystem};
use zigcore::DeviceAddress;

const DEVICE: DeviceAddress = DeviceAddress::new(0xAABB_CCDD_EEFF_0011);
const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Test Helpers
// =============================================================================

/// Records every offer and optionally claims it.
struct RecordingHandler {
    claims: bool,
    offers: Mutex<Vec<DiscoveryOffer>>,
    seen: mpsc::UnboundedSender<DeviceAddress>,
}

impl RecordingHandler {
    fn new(claims: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<DeviceAddress>) {
        let (seen, rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Self {
            claims,
            offers: Mutex::new(Vec::new()),
            seen,
        });
        (handler, rx)
    }

    fn offers(&self) -> Vec<DiscoveryOffer> {
        self.offers.lock().clone()
    }
}

impl DiscoveryHandler for RecordingHandler {
    fn name(&self) -> &str {
        if self.claims {
            "plug-driver"
        } else {
            "picky-driver"
        }
    }

    fn claim(&self, offer: &DiscoveryOffer) -> bool {
        self.offers.lock().push(offer.clone());
        let _ = self.seen.send(offer.details.address);
        self.claims
    }
}

struct Harness {
    radio: Arc<SimulatedRadio>,
    directory: Arc<InMemoryDirectory>,
    subsystem: Arc<ZigbeeSubsystem>,
}

fn harness() -> Harness {
    let radio = Arc::new(SimulatedRadio::new());
    radio.add_device(DEVICE, SimulatedDevice::basic("Acme", "SmartPlug"));
    let directory = Arc::new(InMemoryDirectory::new());
    let subsystem = SubsystemBuilder::new(
        radio.clone(),
        directory.clone(),
        Arc::new(InMemoryProperties::new()),
        Arc::new(RecordingProcessManager::new()),
    )
    .build()
    .unwrap();
    Harness {
        radio,
        directory,
        subsystem,
    }
}

fn joined() -> RadioEvent {
    RadioEvent::DeviceJoined { address: DEVICE }
}

fn announced() -> RadioEvent {
    RadioEvent::DeviceAnnounced {
        address: DEVICE,
        device_type: DeviceType::Router,
        power_source: PowerSource::Mains,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_unclaimed_device_is_discovered_once_and_evicted() {
    let h = harness();
    let (handler, mut seen) = RecordingHandler::new(false);
    h.subsystem.add_discovery_handler(handler.clone());
    let mut events = h.subsystem.subscribe();

    h.subsystem.start_discovery();
    h.subsystem.handle_radio_event(joined());
    assert!(!h.subsystem.discovery().is_in_discovery(DEVICE));
    h.subsystem.handle_radio_event(announced());

    let rejected = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(rejected, SubsystemEvent::DeviceRejected { address: DEVICE });
    assert_eq!(seen.recv().await, Some(DEVICE));

    let offers = handler.offers();
    assert_eq!(offers.len(), 1);
    let details = &offers[0].details;
    assert_eq!(details.device_type, DeviceType::Router);
    assert_eq!(details.power_source, PowerSource::Mains);
    assert_eq!(details.manufacturer, "Acme");
    assert_eq!(details.model, "SmartPlug");

    assert_eq!(h.radio.leave_requests(), vec![DEVICE]);
    assert!(!h.subsystem.discovery().is_in_discovery(DEVICE));
    assert_eq!(
        h.radio
            .count_calls(|c| matches!(c, RadioCall::EndpointIds(a) if *a == DEVICE)),
        1
    );
}

#[tokio::test]
async fn test_announce_then_join_also_completes() {
    let h = harness();
    let (handler, mut seen) = RecordingHandler::new(true);
    h.subsystem.add_discovery_handler(handler.clone());

    h.subsystem.start_discovery();
    h.subsystem.handle_radio_event(announced());
    h.subsystem.handle_radio_event(joined());

    assert_eq!(tokio::time::timeout(WAIT, seen.recv()).await.unwrap(), Some(DEVICE));
    wait_until(|| !h.subsystem.discovery().is_in_discovery(DEVICE)).await;

    assert_eq!(handler.offers().len(), 1);
    assert!(h.radio.leave_requests().is_empty());
}

#[tokio::test]
async fn test_duplicate_join_does_not_retrigger() {
    let h = harness();
    let (handler, mut seen) = RecordingHandler::new(true);
    h.subsystem.add_discovery_handler(handler.clone());

    h.subsystem.start_discovery();
    h.subsystem.handle_radio_event(joined());
    h.subsystem.handle_radio_event(joined());
    h.subsystem.handle_radio_event(announced());

    tokio::time::timeout(WAIT, seen.recv()).await.unwrap();
    wait_until(|| !h.subsystem.discovery().is_in_discovery(DEVICE)).await;
    assert_eq!(handler.offers().len(), 1);
}

#[tokio::test]
async fn test_known_device_rejoining_is_not_rediscovered() {
    let h = harness();
    let (handler, _seen) = RecordingHandler::new(true);
    h.subsystem.add_discovery_handler(handler.clone());
    h.directory.add_device(DEVICE, false);

    h.subsystem.start_discovery();
    h.subsystem.handle_radio_event(joined());
    h.subsystem.handle_radio_event(announced());

    assert_eq!(h.subsystem.discovery().pending_record_count(), 0);
    assert!(!h.subsystem.discovery().is_in_discovery(DEVICE));
    assert!(handler.offers().is_empty());
}

#[tokio::test]
async fn test_orphan_recovery_rediscovers_known_device() {
    let h = harness();
    let (handler, mut seen) = RecordingHandler::new(true);
    h.subsystem.add_discovery_handler(handler.clone());
    h.directory.add_device(DEVICE, false);

    h.subsystem.start_orphan_recovery();
    h.subsystem.handle_radio_event(joined());
    h.subsystem.handle_radio_event(announced());

    assert_eq!(tokio::time::timeout(WAIT, seen.recv()).await.unwrap(), Some(DEVICE));
    h.subsystem.stop_orphan_recovery();
    assert!(!h.subsystem.discovery().is_window_open());
}

#[tokio::test]
async fn test_confirmation_command_buffered_until_finalized() {
    let h = harness();
    let (handler, mut seen) = RecordingHandler::new(true);
    h.subsystem.add_discovery_handler(handler.clone());

    h.subsystem.start_discovery();
    h.subsystem.handle_radio_event(joined());
    h.subsystem.handle_radio_event(announced());

    // Legacy sensors confirm enrollment right after joining.
    let confirmation = ReceivedClusterCommand::new(DEVICE, 0x0500, 0x01, vec![0x00]);
    h.subsystem
        .handle_radio_event(RadioEvent::ClusterCommand(confirmation.clone()));

    tokio::time::timeout(WAIT, seen.recv()).await.unwrap();

    let found = h
        .subsystem
        .wait_for_command(DEVICE, 0x01, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(found, confirmation);

    // The driver persists the device and releases the buffer.
    h.directory.add_device(DEVICE, true);
    let synced = h.subsystem.finalize_device(DEVICE).unwrap();
    assert_eq!(synced, 1);
    assert!(h.subsystem.take_premature_commands(DEVICE).is_empty());

    let table = h.radio.last_address_table().unwrap();
    assert_eq!(table.len(), 1);
    assert!(table[0].auto_acknowledge);
}

#[tokio::test]
async fn test_closing_window_abandons_partial_records() {
    let h = harness();
    h.subsystem.start_discovery();
    h.subsystem.start_discovery();
    h.subsystem.handle_radio_event(joined());

    // Only the first hold turns joining on.
    wait_until(|| h.radio.count_calls(|c| matches!(c, RadioCall::EnableJoin)) == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.radio.count_calls(|c| matches!(c, RadioCall::EnableJoin)), 1);

    assert_eq!(h.subsystem.stop_discovery(), 1);
    assert!(h.subsystem.discovery().pending_record(DEVICE).is_some());
    assert_eq!(h.radio.count_calls(|c| matches!(c, RadioCall::DisableJoin)), 0);

    assert_eq!(h.subsystem.stop_discovery(), 0);
    assert_eq!(h.subsystem.discovery().pending_record_count(), 0);
    assert_eq!(h.radio.count_calls(|c| matches!(c, RadioCall::DisableJoin)), 1);

    // With the window closed, the late announce is rejected outright.
    h.subsystem.handle_radio_event(announced());
    assert_eq!(h.radio.leave_requests(), vec![DEVICE]);
}
