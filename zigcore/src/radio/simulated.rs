//! In-memory radio process.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    AddressTableEntry, AttributeReadRecord, ChannelEnergy, DefenderConfig, EndpointInfo,
    EnergyScanRequest, HealthCheckConfig, NetworkInitRequest, RadioClient, SystemStatus,
};
use crate::address::DeviceAddress;
use crate::codec::PayloadCodec;
use crate::error::{Result, ZigbeeError};

/// ZCL status returned for attributes a simulated device does not have.
const UNSUPPORTED_ATTRIBUTE: u8 = 0x86;

/// Result code used for injected failures.
const SIMULATED_FAILURE: i32 = -1;

/// A call made against the [`SimulatedRadio`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Heartbeat,
    NetworkInit(NetworkInitRequest),
    NetworkChange(u8),
    SystemStatus,
    EnableJoin,
    DisableJoin,
    RequestLeave(DeviceAddress),
    EndpointIds(DeviceAddress),
    EndpointInfo(DeviceAddress, u8),
    DiscoverAttributes(DeviceAddress, u8, u16),
    ReadAttributes(DeviceAddress, u8, u16),
    SetDevices(Vec<AddressTableEntry>),
    EnergyScan(Vec<u8>),
    ConfigureHealthCheck,
    ConfigureDefender,
    EnterLowPowerMode,
    ExitLowPowerMode,
}

impl RadioCall {
    fn operation(&self) -> &'static str {
        match self {
            RadioCall::Heartbeat => "heartbeat",
            RadioCall::NetworkInit(_) => "network_init",
            RadioCall::NetworkChange(_) => "network_change",
            RadioCall::SystemStatus => "system_status",
            RadioCall::EnableJoin => "enable_join",
            RadioCall::DisableJoin => "disable_join",
            RadioCall::RequestLeave(_) => "request_leave",
            RadioCall::EndpointIds(_) => "endpoint_ids",
            RadioCall::EndpointInfo(..) => "endpoint_info",
            RadioCall::DiscoverAttributes(..) => "discover_attributes",
            RadioCall::ReadAttributes(..) => "read_attributes",
            RadioCall::SetDevices(_) => "set_devices",
            RadioCall::EnergyScan(_) => "energy_scan",
            RadioCall::ConfigureHealthCheck => "configure_health_check",
            RadioCall::ConfigureDefender => "configure_defender",
            RadioCall::EnterLowPowerMode => "enter_low_power_mode",
            RadioCall::ExitLowPowerMode => "exit_low_power_mode",
        }
    }
}

/// Endpoint and attribute content of a simulated device.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    endpoints: Vec<EndpointInfo>,
    attributes: BTreeMap<(u8, u16, u16), Vec<u8>>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-endpoint HA device with a populated Basic cluster.
    pub fn basic(manufacturer: &str, model: &str) -> Self {
        Self::new()
            .with_endpoint(EndpointInfo {
                endpoint_id: 1,
                profile_id: 0x0104,
                device_id: 0x0051,
                device_version: 1,
                server_cluster_ids: vec![0x0000, 0x0006],
                client_cluster_ids: vec![],
            })
            .with_attribute(1, 0x0000, 0x0001, vec![3])
            .with_attribute(1, 0x0000, 0x0003, vec![1])
            .with_attribute(1, 0x0000, 0x0004, encode_short_string(manufacturer))
            .with_attribute(1, 0x0000, 0x0005, encode_short_string(model))
    }

    pub fn with_endpoint(mut self, info: EndpointInfo) -> Self {
        self.endpoints.push(info);
        self
    }

    pub fn with_attribute(mut self, endpoint_id: u8, cluster_id: u16, attribute_id: u16, value: Vec<u8>) -> Self {
        self.attributes
            .insert((endpoint_id, cluster_id, attribute_id), value);
        self
    }
}

fn encode_short_string(value: &str) -> Vec<u8> {
    let mut buf = vec![0u8; value.len().min(255) + 1];
    let mut codec = PayloadCodec::writer(&mut buf);
    if codec.put_string(value).is_err() {
        return vec![0];
    }
    buf
}

struct State {
    calls: Vec<RadioCall>,
    devices: HashMap<DeviceAddress, SimulatedDevice>,
    failing: HashSet<&'static str>,
    latency: HashMap<&'static str, Duration>,
    init_failures_remaining: u32,
    network_up: bool,
    channel: u8,
    pan_id: u16,
    eui64: DeviceAddress,
    scan_results: Vec<ChannelEnergy>,
    low_power: bool,
}

/// In-memory [`RadioClient`] that records every call.
///
/// Failures are injected per operation name (`"heartbeat"`,
/// `"network_init"`, ...) with [`fail`](Self::fail).
pub struct SimulatedRadio {
    state: Mutex<State>,
}

impl SimulatedRadio {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                calls: Vec::new(),
                devices: HashMap::new(),
                failing: HashSet::new(),
                latency: HashMap::new(),
                init_failures_remaining: 0,
                network_up: false,
                channel: 25,
                pan_id: 0x1A2B,
                eui64: DeviceAddress::new(0),
                scan_results: Vec::new(),
                low_power: false,
            }),
        }
    }

    /// Starts on `channel` instead of the default 25.
    pub fn with_channel(self, channel: u8) -> Self {
        self.state.lock().channel = channel;
        self
    }

    pub fn add_device(&self, address: DeviceAddress, device: SimulatedDevice) {
        self.state.lock().devices.insert(address, device);
    }

    pub fn set_scan_results(&self, results: Vec<ChannelEnergy>) {
        self.state.lock().scan_results = results;
    }

    /// Makes every call to `operation` fail until [`recover`](Self::recover).
    pub fn fail(&self, operation: &'static str) {
        self.state.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.state.lock().failing.remove(operation);
    }

    /// Makes `operation` block the caller for `delay` before it runs.
    ///
    /// Honoured by join control, network change and energy scan.
    pub fn set_latency(&self, operation: &'static str, delay: Duration) {
        self.state.lock().latency.insert(operation, delay);
    }

    /// Fails the next `count` network init attempts.
    pub fn fail_next_inits(&self, count: u32) {
        self.state.lock().init_failures_remaining = count;
    }

    pub fn channel(&self) -> u8 {
        self.state.lock().channel
    }

    pub fn is_low_power(&self) -> bool {
        self.state.lock().low_power
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&RadioCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn leave_requests(&self) -> Vec<DeviceAddress> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RadioCall::RequestLeave(addr) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    pub fn channel_changes(&self) -> Vec<u8> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RadioCall::NetworkChange(ch) => Some(*ch),
                _ => None,
            })
            .collect()
    }

    /// Most recent table pushed with `set_devices`.
    pub fn last_address_table(&self) -> Option<Vec<AddressTableEntry>> {
        self.state.lock().calls.iter().rev().find_map(|c| match c {
            RadioCall::SetDevices(entries) => Some(entries.clone()),
            _ => None,
        })
    }

    /// Records `call` and applies injected failures.
    fn record(&self, state: &mut State, call: RadioCall) -> Result<()> {
        let op = call.operation();
        state.calls.push(call);
        if state.failing.contains(op) {
            return Err(ZigbeeError::hardware(op, SIMULATED_FAILURE));
        }
        Ok(())
    }

    /// Sleeps for the operation's configured latency, without holding the
    /// state lock.
    fn stall(&self, op: &'static str) {
        let delay = self.state.lock().latency.get(op).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
    }

    fn device<'a>(state: &'a State, address: DeviceAddress, op: &'static str) -> Result<&'a SimulatedDevice> {
        state.devices.get(&address).ok_or_else(|| {
            tracing::debug!(address = %address, operation = op, "Simulated device not present");
            ZigbeeError::hardware(op, SIMULATED_FAILURE)
        })
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioClient for SimulatedRadio {
    fn heartbeat(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::Heartbeat)
    }

    fn network_init(&self, request: &NetworkInitRequest) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::NetworkInit(request.clone()))?;
        if state.init_failures_remaining > 0 {
            state.init_failures_remaining -= 1;
            return Err(ZigbeeError::hardware("network_init", SIMULATED_FAILURE));
        }
        state.network_up = true;
        state.eui64 = request.eui64;
        Ok(())
    }

    fn network_change(&self, channel: u8) -> Result<()> {
        self.stall("network_change");
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::NetworkChange(channel))?;
        state.channel = channel;
        Ok(())
    }

    fn system_status(&self) -> Result<SystemStatus> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::SystemStatus)?;
        Ok(SystemStatus {
            network_is_up: state.network_up,
            channel: state.channel,
            pan_id: state.pan_id,
            extended_pan_id: 0xDEAD_BEEF_0000_0001,
            eui64: state.eui64,
        })
    }

    fn enable_join(&self) -> Result<()> {
        self.stall("enable_join");
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::EnableJoin)
    }

    fn disable_join(&self) -> Result<()> {
        self.stall("disable_join");
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::DisableJoin)
    }

    fn request_leave(&self, address: DeviceAddress) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::RequestLeave(address))
    }

    fn endpoint_ids(&self, address: DeviceAddress) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::EndpointIds(address))?;
        let device = Self::device(&state, address, "endpoint_ids")?;
        Ok(device.endpoints.iter().map(|e| e.endpoint_id).collect())
    }

    fn endpoint_info(&self, address: DeviceAddress, endpoint_id: u8) -> Result<EndpointInfo> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::EndpointInfo(address, endpoint_id))?;
        let device = Self::device(&state, address, "endpoint_info")?;
        device
            .endpoints
            .iter()
            .find(|e| e.endpoint_id == endpoint_id)
            .cloned()
            .ok_or_else(|| ZigbeeError::hardware("endpoint_info", SIMULATED_FAILURE))
    }

    fn discover_attributes(&self, address: DeviceAddress, endpoint_id: u8, cluster_id: u16) -> Result<Vec<u16>> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            RadioCall::DiscoverAttributes(address, endpoint_id, cluster_id),
        )?;
        let device = Self::device(&state, address, "discover_attributes")?;
        Ok(device
            .attributes
            .keys()
            .filter(|(ep, cl, _)| *ep == endpoint_id && *cl == cluster_id)
            .map(|(_, _, attr)| *attr)
            .collect())
    }

    fn read_attributes(
        &self,
        address: DeviceAddress,
        endpoint_id: u8,
        cluster_id: u16,
        attribute_ids: &[u16],
    ) -> Result<Vec<AttributeReadRecord>> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            RadioCall::ReadAttributes(address, endpoint_id, cluster_id),
        )?;
        let device = Self::device(&state, address, "read_attributes")?;
        Ok(attribute_ids
            .iter()
            .map(|id| match device.attributes.get(&(endpoint_id, cluster_id, *id)) {
                Some(data) => AttributeReadRecord {
                    attribute_id: *id,
                    status: 0,
                    data: data.clone(),
                },
                None => AttributeReadRecord {
                    attribute_id: *id,
                    status: UNSUPPORTED_ATTRIBUTE,
                    data: Vec::new(),
                },
            })
            .collect())
    }

    fn set_devices(&self, entries: &[AddressTableEntry]) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::SetDevices(entries.to_vec()))
    }

    fn energy_scan(&self, request: &EnergyScanRequest) -> Result<Vec<ChannelEnergy>> {
        self.stall("energy_scan");
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::EnergyScan(request.channels.clone()))?;
        Ok(state
            .scan_results
            .iter()
            .filter(|r| request.channels.contains(&r.channel))
            .copied()
            .collect())
    }

    fn configure_health_check(&self, _config: &HealthCheckConfig) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::ConfigureHealthCheck)
    }

    fn configure_defender(&self, _config: &DefenderConfig) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::ConfigureDefender)
    }

    fn enter_low_power_mode(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::EnterLowPowerMode)?;
        state.low_power = true;
        Ok(())
    }

    fn exit_low_power_mode(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, RadioCall::ExitLowPowerMode)?;
        state.low_power = false;
        Ok(())
    }
}
