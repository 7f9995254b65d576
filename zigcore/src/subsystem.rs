//! The Zigbee subsystem: every orchestration component wired together.
//!
//! [`ZigbeeSubsystem`] is constructed once at process start and receives
//! every [`RadioEvent`] through [`handle_radio_event`](ZigbeeSubsystem::handle_radio_event).
//! Events pass the unknown-device gate, then go to discovery correlation or
//! to the device's registered listener. Control operations (join window,
//! channel change, address table sync, low-power mode) are exposed as
//! methods and forwarded to the owning component.
//!
//! # Example
//!
//! ```ignore
//! let subsystem = SubsystemBuilder::new(radio, directory, properties, process_manager)
//!     .with_config(config)
//!     .build()?;
//! subsystem.start().await?;
//! radio_events.for_each(|event| subsystem.handle_radio_event(event));
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::address::DeviceAddress;
use crate::address_table::AddressTableSync;
use crate::channel::{ChannelChangeOrchestrator, ChannelChangeOutcome};
use crate::config::ConfigFile;
use crate::discovery::{DiscoveryHandler, DiscoveryManager, DiscoveryOutcome, DiscoveryTrigger};
use crate::error::{Result, ZigbeeError};
use crate::events::{EventPublisher, SubsystemEvent, DEFAULT_EVENT_CAPACITY};
use crate::gate::{GateDecision, UnknownDeviceGate};
use crate::gateway::properties::NETWORK_CONFIG;
use crate::gateway::{DeviceDirectory, ProcessManager, PropertyStore};
use crate::network::{NetworkBootstrap, ReadinessGate};
use crate::pending::PrematureCommandBuffer;
use crate::radio::{
    DefenderConfig, HealthCheckConfig, RadioClient, RadioEvent, ReceivedClusterCommand,
};
use crate::registry::{DeviceListener, DeviceListenerRegistry};
use crate::scheduler::{ScheduledTask, TaskScheduler};
use crate::watchdog::CoreProcessWatchdog;

/// Builder for a [`ZigbeeSubsystem`].
pub struct SubsystemBuilder {
    radio: Arc<dyn RadioClient>,
    directory: Arc<dyn DeviceDirectory>,
    properties: Arc<dyn PropertyStore>,
    process_manager: Arc<dyn ProcessManager>,
    config: ConfigFile,
    runtime_handle: Option<Handle>,
    event_capacity: usize,
}

impl SubsystemBuilder {
    pub fn new(
        radio: Arc<dyn RadioClient>,
        directory: Arc<dyn DeviceDirectory>,
        properties: Arc<dyn PropertyStore>,
        process_manager: Arc<dyn ProcessManager>,
    ) -> Self {
        Self {
            radio,
            directory,
            properties,
            process_manager,
            config: ConfigFile::default(),
            runtime_handle: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_config(mut self, config: ConfigFile) -> Self {
        self.config = config;
        self
    }

    /// Sets the runtime scheduled work runs on. Defaults to the current one.
    pub fn with_runtime_handle(mut self, handle: Handle) -> Self {
        self.runtime_handle = Some(handle);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Wires the components.
    ///
    /// # Errors
    ///
    /// [`ZigbeeError::Unsupported`] when no runtime handle was given and
    /// the caller is not inside a tokio runtime.
    pub fn build(self) -> Result<Arc<ZigbeeSubsystem>> {
        if self.event_capacity == 0 {
            return Err(ZigbeeError::InvalidArgument(
                "event capacity must be positive".to_string(),
            ));
        }

        let scheduler = match self.runtime_handle {
            Some(handle) => TaskScheduler::new(handle),
            None => TaskScheduler::try_current()?,
        };
        let publisher = EventPublisher::new(self.event_capacity);

        let ready_publisher = publisher.clone();
        let readiness = Arc::new(ReadinessGate::new(move || {
            ready_publisher.publish(SubsystemEvent::NetworkReady);
        }));

        let listeners = Arc::new(DeviceListenerRegistry::new());
        let pending = Arc::new(PrematureCommandBuffer::new());
        let discovery = Arc::new(DiscoveryManager::new(
            Arc::clone(&self.radio),
            Arc::clone(&self.directory),
            Arc::clone(&pending),
            scheduler.clone(),
        ));
        let gate = UnknownDeviceGate::new(
            Arc::clone(&self.radio),
            Arc::clone(&self.directory),
            Arc::clone(&self.properties),
            Arc::clone(&discovery),
            Arc::clone(&listeners),
        );
        let bootstrap = NetworkBootstrap::new(
            Arc::clone(&self.radio),
            Arc::clone(&self.properties),
            self.config.network.clone(),
        );
        let address_table = Arc::new(AddressTableSync::new(
            Arc::clone(&self.radio),
            Arc::clone(&self.directory),
        ));
        let channel = Arc::new(ChannelChangeOrchestrator::new(
            Arc::clone(&self.radio),
            Arc::clone(&self.directory),
            Arc::clone(&self.properties),
            scheduler.clone(),
            publisher.clone(),
            self.config.channel_change.clone(),
        ));
        let watchdog = Arc::new(CoreProcessWatchdog::new(
            Arc::clone(&self.radio),
            self.process_manager,
            Arc::clone(&self.directory),
            Arc::clone(&readiness),
            self.config.watchdog.clone(),
        ));

        Ok(Arc::new(ZigbeeSubsystem {
            radio: self.radio,
            directory: self.directory,
            properties: self.properties,
            config: self.config,
            scheduler,
            publisher,
            listeners,
            pending,
            discovery,
            gate,
            bootstrap,
            readiness,
            address_table,
            channel,
            watchdog,
            watchdog_task: Mutex::new(None),
        }))
    }
}

/// Network orchestration for one radio.
pub struct ZigbeeSubsystem {
    radio: Arc<dyn RadioClient>,
    directory: Arc<dyn DeviceDirectory>,
    properties: Arc<dyn PropertyStore>,
    config: ConfigFile,
    scheduler: TaskScheduler,
    publisher: EventPublisher,
    listeners: Arc<DeviceListenerRegistry>,
    pending: Arc<PrematureCommandBuffer>,
    discovery: Arc<DiscoveryManager>,
    gate: UnknownDeviceGate,
    bootstrap: NetworkBootstrap,
    readiness: Arc<ReadinessGate>,
    address_table: Arc<AddressTableSync>,
    channel: Arc<ChannelChangeOrchestrator>,
    watchdog: Arc<CoreProcessWatchdog>,
    watchdog_task: Mutex<Option<ScheduledTask>>,
}

impl ZigbeeSubsystem {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the core watchdog and brings the network up.
    ///
    /// A failed init is returned but the watchdog keeps running; it
    /// restarts the radio process, whose startup event retries the init.
    pub async fn start(self: &Arc<Self>) -> Result<DeviceAddress> {
        {
            let mut task = self.watchdog_task.lock();
            if task.is_none() {
                *task = Some(self.watchdog.start(&self.scheduler));
            }
        }
        self.start_network().await
    }

    /// Initializes the network and runs the post-init steps.
    pub async fn start_network(self: &Arc<Self>) -> Result<DeviceAddress> {
        let identity = self.bootstrap.initialize().await?;

        let this = Arc::clone(self);
        if let Err(e) = tokio::task::spawn_blocking(move || this.after_network_init()).await {
            error!(error = %e, "Post-init steps panicked");
        }

        self.readiness.set_network_ready(true);
        Ok(identity)
    }

    /// Blocking: pushes the address table, configures the radio's
    /// supervision loops and resumes an interrupted channel change.
    fn after_network_init(self: &Arc<Self>) {
        match self.address_table.sync_all() {
            Ok(count) => debug!(devices = count, "Address table pushed after init"),
            Err(e) => warn!(error = %e, "Address table sync after init failed"),
        }

        let health = HealthCheckConfig::from(&self.config.health_check);
        if let Err(e) = self.radio.configure_health_check(&health) {
            warn!(error = %e, "Failed to configure radio health check");
        }

        let defender = DefenderConfig::from(&self.config.defender);
        if let Err(e) = self.radio.configure_defender(&defender) {
            warn!(error = %e, "Failed to configure interference defender");
        }

        if self.channel.resume_interrupted_change() {
            info!("Interrupted channel change supervision resumed");
        }
    }

    /// Stops the watchdog, any pending rollback check and every scheduled
    /// task.
    pub fn shutdown(&self) {
        self.channel.shutdown();
        if let Some(task) = self.watchdog_task.lock().take() {
            task.cancel();
        }
        self.scheduler.shutdown();
        info!("Zigbee subsystem shut down");
    }

    // =========================================================================
    // Radio events
    // =========================================================================

    /// Routes one event from the radio process.
    ///
    /// Never fails: problems are logged and the event is dropped. May be
    /// called from the radio's event thread; nothing here blocks on a
    /// long-running radio call.
    pub fn handle_radio_event(self: &Arc<Self>, event: RadioEvent) {
        match event {
            RadioEvent::Startup => self.on_radio_startup(),
            RadioEvent::DeviceJoined { address } => {
                if self.admit(address, "joined").reject {
                    return;
                }
                if let Some(trigger) = self.discovery.on_joined(address) {
                    self.begin_discovery(trigger);
                }
            }
            RadioEvent::DeviceAnnounced {
                address,
                device_type,
                power_source,
            } => {
                if self.admit(address, "announced").reject {
                    return;
                }
                if let Some(trigger) = self.discovery.on_announced(address, device_type, power_source) {
                    self.begin_discovery(trigger);
                }
            }
            RadioEvent::DeviceRejoined { address, is_secure } => {
                if self.admit(address, "rejoined").reject {
                    return;
                }
                if !self.listeners.notify_rejoin(address, is_secure) {
                    debug!(address = %address, is_secure, "Rejoin with no listener");
                }
            }
            RadioEvent::DeviceLeft { address } => {
                info!(address = %address, "Device left the network");
                self.listeners.notify_left(address);
                self.pending.destroy_all(address);
                self.address_table.forget(address);
                self.discovery.forget(address);
            }
            RadioEvent::LinkKeyUpdated {
                address,
                is_hash_based,
            } => self.address_table.on_link_key_updated(address, is_hash_based),
            RadioEvent::AttributeReport(report) => {
                if self.admit(report.address, "attribute report").reject {
                    return;
                }
                if !self.listeners.notify_attribute_report(&report) {
                    debug!(
                        address = %report.address,
                        cluster = report.cluster_id,
                        "Attribute report with no listener"
                    );
                }
            }
            RadioEvent::ClusterCommand(command) => self.on_cluster_command(command),
            RadioEvent::FirmwareStatus { address, status } => {
                if self.admit(address, "firmware status").reject {
                    return;
                }
                self.listeners.notify_firmware_status(address, status);
            }
            RadioEvent::InterferenceChanged { detected } => {
                if detected {
                    warn!("Network interference detected");
                } else {
                    info!("Network interference cleared");
                }
                self.publisher
                    .publish(SubsystemEvent::InterferenceChanged { detected });
            }
            RadioEvent::NetworkConfigChanged { blob } => {
                if let Err(e) = self.properties.set(NETWORK_CONFIG, &blob) {
                    warn!(error = %e, "Failed to persist network configuration");
                } else {
                    debug!(bytes = blob.len(), "Network configuration persisted");
                }
            }
        }
    }

    fn admit(&self, address: DeviceAddress, event: &'static str) -> GateDecision {
        let decision = self.gate.should_reject(address);
        if decision.reject {
            debug!(address = %address, event, "Event from rejected device dropped");
            self.address_table.forget(address);
        }
        decision
    }

    fn on_radio_startup(self: &Arc<Self>) {
        info!("Radio process started, initializing network");
        self.readiness.set_network_ready(false);
        self.bootstrap.reset();

        let this = Arc::clone(self);
        self.scheduler.spawn_async("network-init", async move {
            match this.start_network().await {
                Ok(identity) => debug!(identity = %identity, "Network init after radio startup complete"),
                Err(ZigbeeError::AlreadyInitializing) => {
                    debug!("Network init already running, startup event ignored")
                }
                Err(e) => error!(error = %e, "Network init after radio startup failed"),
            }
        });
    }

    fn begin_discovery(&self, trigger: DiscoveryTrigger) {
        let discovery = Arc::clone(&self.discovery);
        let pending = Arc::clone(&self.pending);
        let address_table = Arc::clone(&self.address_table);
        let publisher = self.publisher.clone();
        let address = trigger.address;

        self.scheduler.spawn_detached("device-discovery", move || {
            match discovery.run_discovery(trigger) {
                DiscoveryOutcome::Claimed { handler } => {
                    debug!(address = %address, handler = %handler, "Discovery finished");
                }
                DiscoveryOutcome::Unclaimed => {
                    pending.destroy_all(address);
                    address_table.forget(address);
                    publisher.publish(SubsystemEvent::DeviceRejected { address });
                }
                DiscoveryOutcome::FetchFailed => {}
            }
        });
    }

    /// Dispatches a command, buffering it when the device is not yet
    /// persisted and has no listener.
    fn on_cluster_command(&self, command: ReceivedClusterCommand) {
        let address = command.address;
        if self.admit(address, "cluster command").reject {
            return;
        }
        if self.listeners.notify_cluster_command(&command) {
            return;
        }

        if self.discovery.is_in_discovery(address) || !self.directory.is_known(address) {
            debug!(
                address = %address,
                cluster = command.cluster_id,
                command = command.command_id,
                "Buffering command from undiscovered device"
            );
            self.pending.add(&command);
        } else {
            debug!(address = %address, command = command.command_id, "Command with no listener dropped");
        }
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Opens (or holds open) the join window. Returns the new hold count.
    pub fn start_discovery(&self) -> u32 {
        self.discovery.start_discovery()
    }

    /// Releases one hold on the join window. Returns the new hold count.
    pub fn stop_discovery(&self) -> u32 {
        let remaining = self.discovery.stop_discovery();
        if remaining == 0 {
            self.address_table.discard_unpersisted();
        }
        remaining
    }

    pub fn start_orphan_recovery(&self) {
        self.discovery.start_orphan_recovery();
    }

    pub fn stop_orphan_recovery(&self) {
        self.discovery.stop_orphan_recovery();
        if !self.discovery.is_window_open() {
            self.address_table.discard_unpersisted();
        }
    }

    pub fn add_discovery_handler(&self, handler: Arc<dyn DiscoveryHandler>) {
        self.discovery.add_handler(handler);
    }

    // =========================================================================
    // Device listeners and buffered commands
    // =========================================================================

    pub fn register_listener(&self, address: DeviceAddress, listener: Arc<dyn DeviceListener>) -> Result<()> {
        self.listeners.register(address, listener)
    }

    pub fn unregister_listener(&self, address: DeviceAddress) -> Result<()> {
        self.listeners.unregister(address)
    }

    /// Removes and returns everything buffered for `address`.
    pub fn take_premature_commands(&self, address: DeviceAddress) -> Vec<ReceivedClusterCommand> {
        self.pending.get_all(address)
    }

    /// Waits up to `timeout` for a buffered command.
    pub async fn wait_for_command(
        &self,
        address: DeviceAddress,
        command_id: u8,
        timeout: Duration,
    ) -> Result<ReceivedClusterCommand> {
        self.pending.wait_for(address, command_id, timeout).await
    }

    pub fn remove_premature_commands(&self, address: DeviceAddress, command_id: u8) -> usize {
        self.pending.remove_matching(address, command_id)
    }

    /// Called once a driver has persisted `address`: releases its buffered
    /// commands and pushes the address table so the radio learns the new
    /// device.
    pub fn finalize_device(&self, address: DeviceAddress) -> Result<usize> {
        self.pending.destroy_all(address);
        info!(address = %address, "Device finalized");
        self.address_table.sync_all()
    }

    // =========================================================================
    // Network control
    // =========================================================================

    /// Blocking: see [`ChannelChangeOrchestrator::change_channel`].
    pub fn change_channel(&self, channel: u8, dry_run: bool) -> ChannelChangeOutcome {
        self.channel.change_channel(channel, dry_run)
    }

    /// Blocking: pushes the full address table to the radio.
    pub fn sync_address_table(&self) -> Result<usize> {
        self.address_table.sync_all()
    }

    pub fn enter_low_power_mode(&self) -> Result<()> {
        info!("Entering low power mode");
        self.radio.enter_low_power_mode()
    }

    pub fn exit_low_power_mode(&self) -> Result<()> {
        info!("Exiting low power mode");
        self.radio.exit_low_power_mode()
    }

    /// Sets the "all drivers started" readiness gate.
    pub fn set_all_drivers_started(&self, started: bool) {
        if self.readiness.set_drivers_started(started) {
            info!("Zigbee network ready");
        }
    }

    /// Re-evaluates the all-devices-in-comm-fail restart condition.
    ///
    /// Returns true if a radio process restart was requested.
    pub fn on_comm_fail_changed(&self) -> bool {
        self.watchdog.check_all_comm_fail()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubsystemEvent> {
        self.publisher.subscribe()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn discovery(&self) -> &Arc<DiscoveryManager> {
        &self.discovery
    }

    pub fn channel(&self) -> &Arc<ChannelChangeOrchestrator> {
        &self.channel
    }

    pub fn bootstrap(&self) -> &NetworkBootstrap {
        &self.bootstrap
    }

    pub fn readiness(&self) -> &ReadinessGate {
        &self.readiness
    }

    pub fn listeners(&self) -> &DeviceListenerRegistry {
        &self.listeners
    }

    pub fn address_table(&self) -> &AddressTableSync {
        &self.address_table
    }

    pub fn pending(&self) -> &PrematureCommandBuffer {
        &self.pending
    }

    pub fn watchdog(&self) -> &CoreProcessWatchdog {
        &self.watchdog
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceType, PowerSource};
    use crate::gateway::memory::{InMemoryDirectory, InMemoryProperties, RecordingProcessManager};
    use crate::gateway::properties::REJECT_UNKNOWN_DEVICES;
    use crate::network::InitState;
    use crate::radio::{AttributeReport, RadioCall, SimulatedRadio};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::SystemTime;

    struct Fixture {
        radio: Arc<SimulatedRadio>,
        directory: Arc<InMemoryDirectory>,
        properties: Arc<InMemoryProperties>,
        subsystem: Arc<ZigbeeSubsystem>,
    }

    fn fixture() -> Fixture {
        let radio = Arc::new(SimulatedRadio::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let properties = Arc::new(InMemoryProperties::new());
        let mut config = ConfigFile::default();
        config.network.init_retry_delay_ms = 10;
        let subsystem = SubsystemBuilder::new(
            radio.clone(),
            directory.clone(),
            properties.clone(),
            Arc::new(RecordingProcessManager::new()),
        )
        .with_config(config)
        .build()
        .unwrap();
        Fixture {
            radio,
            directory,
            properties,
            subsystem,
        }
    }

    #[derive(Default)]
    struct CountingListener {
        reports: AtomicU32,
        commands: AtomicU32,
    }

    impl DeviceListener for CountingListener {
        fn on_attribute_report(&self, _report: &AttributeReport) {
            self.reports.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cluster_command(&self, _command: &ReceivedClusterCommand) {
            self.commands.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn report(address: DeviceAddress) -> AttributeReport {
        AttributeReport {
            address,
            endpoint_id: 1,
            cluster_id: 0x0006,
            rssi: -40,
            lqi: 200,
            payload: vec![0x00, 0x00, 0x10, 0x01],
            received_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = SubsystemBuilder::new(
            Arc::new(SimulatedRadio::new()),
            Arc::new(InMemoryDirectory::new()),
            Arc::new(InMemoryProperties::new()),
            Arc::new(RecordingProcessManager::new()),
        )
        .build();
        assert!(matches!(result, Err(ZigbeeError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_start_brings_network_up() {
        let f = fixture();
        let mut events = f.subsystem.subscribe();

        let identity = f.subsystem.start().await.unwrap();
        assert_eq!(f.subsystem.bootstrap().state(), InitState::Initialized);
        assert!(f.subsystem.readiness().is_network_ready());
        assert_eq!(identity.to_bytes()[..3], [0x00, 0x1B, 0x5F]);

        let calls = f.radio.calls();
        assert!(calls.iter().any(|c| matches!(c, RadioCall::SetDevices(_))));
        assert!(calls.iter().any(|c| matches!(c, RadioCall::ConfigureHealthCheck)));
        assert!(calls.iter().any(|c| matches!(c, RadioCall::ConfigureDefender)));

        f.subsystem.set_all_drivers_started(true);
        assert_eq!(events.recv().await.unwrap(), SubsystemEvent::NetworkReady);
        f.subsystem.shutdown();
    }

    #[tokio::test]
    async fn test_attribute_report_reaches_listener() {
        let f = fixture();
        let address = DeviceAddress::new(0x10);
        f.directory.add_device(address, false);
        let listener = Arc::new(CountingListener::default());
        f.subsystem.register_listener(address, listener.clone()).unwrap();

        f.subsystem
            .handle_radio_event(RadioEvent::AttributeReport(report(address)));
        assert_eq!(listener.reports.load(Ordering::SeqCst), 1);
        assert!(f.radio.leave_requests().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_device_traffic_rejected() {
        let f = fixture();
        let stranger = DeviceAddress::new(0x99);

        f.subsystem
            .handle_radio_event(RadioEvent::AttributeReport(report(stranger)));
        assert_eq!(f.radio.leave_requests(), vec![stranger]);
    }

    #[tokio::test]
    async fn test_reject_disabled_lets_unknown_device_through() {
        let f = fixture();
        f.properties.set(REJECT_UNKNOWN_DEVICES, "false").unwrap();
        f.subsystem.handle_radio_event(RadioEvent::ClusterCommand(
            ReceivedClusterCommand::new(DeviceAddress::new(0x99), 0x0500, 0x00, vec![]),
        ));
        assert!(f.radio.leave_requests().is_empty());
    }

    #[tokio::test]
    async fn test_commands_buffered_while_window_open() {
        let f = fixture();
        let address = DeviceAddress::new(0x20);
        f.subsystem.start_discovery();

        let command = ReceivedClusterCommand::new(address, 0x0500, 0x01, vec![0xAA]);
        f.subsystem
            .handle_radio_event(RadioEvent::ClusterCommand(command.clone()));

        assert_eq!(f.subsystem.take_premature_commands(address), vec![command]);
        assert!(f.subsystem.take_premature_commands(address).is_empty());
    }

    #[tokio::test]
    async fn test_known_device_command_goes_to_listener_not_buffer() {
        let f = fixture();
        let address = DeviceAddress::new(0x21);
        f.directory.add_device(address, false);
        let listener = Arc::new(CountingListener::default());
        f.subsystem.register_listener(address, listener.clone()).unwrap();

        f.subsystem.handle_radio_event(RadioEvent::ClusterCommand(
            ReceivedClusterCommand::new(address, 0x0006, 0x02, vec![]),
        ));
        assert_eq!(listener.commands.load(Ordering::SeqCst), 1);
        assert!(f.subsystem.pending().buffered_addresses().is_empty());
    }

    #[tokio::test]
    async fn test_device_left_drops_buffered_commands() {
        let f = fixture();
        let address = DeviceAddress::new(0x22);
        f.subsystem.start_discovery();
        f.subsystem.handle_radio_event(RadioEvent::ClusterCommand(
            ReceivedClusterCommand::new(address, 0x0500, 0x01, vec![]),
        ));
        f.subsystem
            .handle_radio_event(RadioEvent::DeviceLeft { address });
        assert!(f.subsystem.take_premature_commands(address).is_empty());
    }

    #[tokio::test]
    async fn test_device_left_mid_pairing_drops_partial_record() {
        let f = fixture();
        let address = DeviceAddress::new(0x23);
        f.subsystem.start_discovery();
        f.subsystem
            .handle_radio_event(RadioEvent::DeviceJoined { address });
        assert!(f.subsystem.discovery().pending_record(address).is_some());

        f.subsystem
            .handle_radio_event(RadioEvent::DeviceLeft { address });
        assert!(f.subsystem.discovery().pending_record(address).is_none());
    }

    #[tokio::test]
    async fn test_window_close_drops_link_keys_of_unpaired_devices() {
        let f = fixture();
        let stray = DeviceAddress::new(0x24);
        f.subsystem.start_discovery();
        f.subsystem.handle_radio_event(RadioEvent::LinkKeyUpdated {
            address: stray,
            is_hash_based: true,
        });
        assert_eq!(f.subsystem.address_table().early_update(stray), Some(true));

        assert_eq!(f.subsystem.stop_discovery(), 0);
        assert_eq!(f.subsystem.address_table().early_update(stray), None);
    }

    #[tokio::test]
    async fn test_rejected_device_link_key_dropped() {
        let f = fixture();
        let stranger = DeviceAddress::new(0x25);
        f.subsystem.handle_radio_event(RadioEvent::LinkKeyUpdated {
            address: stranger,
            is_hash_based: true,
        });
        assert_eq!(f.subsystem.address_table().early_update(stranger), Some(true));

        f.subsystem
            .handle_radio_event(RadioEvent::AttributeReport(report(stranger)));
        assert_eq!(f.radio.leave_requests(), vec![stranger]);
        assert_eq!(f.subsystem.address_table().early_update(stranger), None);
    }

    #[tokio::test]
    async fn test_network_config_and_interference_events() {
        let f = fixture();
        let mut events = f.subsystem.subscribe();

        f.subsystem.handle_radio_event(RadioEvent::NetworkConfigChanged {
            blob: "c2VjcmV0".to_string(),
        });
        assert_eq!(f.properties.get(NETWORK_CONFIG).as_deref(), Some("c2VjcmV0"));

        f.subsystem
            .handle_radio_event(RadioEvent::InterferenceChanged { detected: true });
        assert_eq!(
            events.recv().await.unwrap(),
            SubsystemEvent::InterferenceChanged { detected: true }
        );
    }

    #[tokio::test]
    async fn test_announce_from_known_device_does_not_start_discovery() {
        let f = fixture();
        let address = DeviceAddress::new(0x30);
        f.directory.add_device(address, false);
        f.subsystem.start_discovery();

        f.subsystem
            .handle_radio_event(RadioEvent::DeviceJoined { address });
        f.subsystem.handle_radio_event(RadioEvent::DeviceAnnounced {
            address,
            device_type: DeviceType::Router,
            power_source: PowerSource::Mains,
        });

        assert!(!f.subsystem.discovery().is_in_discovery(address));
        assert_eq!(f.subsystem.discovery().pending_record_count(), 0);
    }

    #[tokio::test]
    async fn test_low_power_passthrough() {
        let f = fixture();
        f.subsystem.enter_low_power_mode().unwrap();
        assert!(f.radio.is_low_power());
        f.subsystem.exit_low_power_mode().unwrap();
        assert!(!f.radio.is_low_power());
    }

    #[tokio::test]
    async fn test_startup_event_reinitializes() {
        let f = fixture();
        f.subsystem.start().await.unwrap();
        f.radio.clear_calls();

        f.subsystem.handle_radio_event(RadioEvent::Startup);
        assert!(!f.subsystem.readiness().is_network_ready());

        for _ in 0..100 {
            if f.subsystem.readiness().is_network_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(f.subsystem.readiness().is_network_ready());
        assert_eq!(
            f.radio
                .count_calls(|c| matches!(c, RadioCall::NetworkInit(_))),
            1
        );
        f.subsystem.shutdown();
    }
}
