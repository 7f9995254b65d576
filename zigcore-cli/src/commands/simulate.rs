//! End-to-end scenarios against the simulated radio.
//!
//! Each scenario builds a full subsystem on in-memory collaborators, drives
//! radio events into it and reports what the subsystem did. Logging goes
//! to the configured log file and stdout.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use clap::{Subcommand, ValueEnum};
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use zigcore::device::{DeviceType, PowerSource};
use zigcore::discovery::{DiscoveryHandler, DiscoveryOffer};
use zigcore::events::SubsystemEvent;
use zigcore::gateway::memory::{InMemoryDirectory, InMemoryProperties, RecordingProcessManager};
use zigcore::radio::{RadioEvent, SimulatedDevice, SimulatedRadio};
use zigcore::subsystem::ZigbeeSubsystem;
use zigcore::DeviceAddress;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Extra time allowed past the rollback delay before giving up.
const EVENT_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DeviceKind {
    Router,
    EndDevice,
}

impl From<DeviceKind> for DeviceType {
    fn from(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Router => DeviceType::Router,
            DeviceKind::EndDevice => DeviceType::EndDevice,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PowerKind {
    Mains,
    Battery,
}

impl From<PowerKind> for PowerSource {
    fn from(kind: PowerKind) -> Self {
        match kind {
            PowerKind::Mains => PowerSource::Mains,
            PowerKind::Battery => PowerSource::Battery,
        }
    }
}

/// Simulation scenarios.
#[derive(Debug, Subcommand)]
pub enum SimulateCommands {
    /// Pair one device: join, announce, discovery, claim or eviction
    Pairing {
        /// Device address (16 hex digits)
        #[arg(long, default_value = "aabbccddeeff0011")]
        address: String,

        #[arg(long, value_enum, default_value = "router")]
        device_type: DeviceKind,

        #[arg(long, value_enum, default_value = "mains")]
        power: PowerKind,

        /// Have a driver claim the device instead of evicting it
        #[arg(long)]
        claim: bool,
    },

    /// Move the network and watch the rollback check
    ChannelChange {
        /// Target channel (0 picks one by energy scan)
        #[arg(long, default_value = "20")]
        channel: u8,

        /// Number of paired devices
        #[arg(long, default_value = "5")]
        devices: u8,

        /// Devices already in comm-fail before the change
        #[arg(long, default_value = "2")]
        comm_fail: u8,

        /// Devices that report in on the new channel
        #[arg(long, default_value = "0")]
        followers: u8,

        /// Seconds before the rollback check (overrides config)
        #[arg(long, default_value = "3")]
        rollback_delay_secs: u64,
    },
}

/// Run a simulation subcommand.
pub fn run(command: SimulateCommands) -> Result<(), CliError> {
    match command {
        SimulateCommands::Pairing {
            address,
            device_type,
            power,
            claim,
        } => {
            let address: DeviceAddress = address.parse()?;
            run_pairing(address, device_type.into(), power.into(), claim)
        }
        SimulateCommands::ChannelChange {
            channel,
            devices,
            comm_fail,
            followers,
            rollback_delay_secs,
        } => {
            if comm_fail.saturating_add(followers) > devices {
                return Err(CliError::Config(
                    "--comm-fail plus --followers cannot exceed --devices".to_string(),
                ));
            }
            run_channel_change(channel, devices, comm_fail, followers, rollback_delay_secs)
        }
    }
}

/// Driver stand-in that prints each offer.
struct PrintingHandler {
    claims: bool,
    offered: mpsc::UnboundedSender<DeviceAddress>,
}

impl DiscoveryHandler for PrintingHandler {
    fn name(&self) -> &str {
        "simulated-driver"
    }

    fn claim(&self, offer: &DiscoveryOffer) -> bool {
        println!("Discovery offer #{}:", offer.token);
        match offer.details.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => println!("  (details not serializable: {})", e),
        }
        let _ = self.offered.send(offer.details.address);
        self.claims
    }
}

fn run_pairing(
    address: DeviceAddress,
    device_type: DeviceType,
    power_source: PowerSource,
    claim: bool,
) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("simulate pairing");

    let radio = Arc::new(SimulatedRadio::new());
    radio.add_device(address, SimulatedDevice::basic("Acme", "SmartPlug"));

    let subsystem = runner.build_subsystem(
        radio.clone(),
        Arc::new(InMemoryDirectory::new()),
        Arc::new(InMemoryProperties::new()),
        Arc::new(RecordingProcessManager::new()),
    )?;

    let (offered, mut offers) = mpsc::unbounded_channel();
    subsystem.add_discovery_handler(Arc::new(PrintingHandler {
        claims: claim,
        offered,
    }));

    runner
        .runtime()
        .block_on(drive_pairing(&subsystem, address, device_type, power_source, claim, &mut offers))?;

    let leaves = radio.leave_requests();
    if claim {
        println!("Device {} claimed by simulated-driver", address);
    } else {
        println!("Device {} unclaimed; leave requests sent: {}", address, leaves.len());
    }
    Ok(())
}

fn run_channel_change(
    channel: u8,
    devices: u8,
    comm_fail: u8,
    followers: u8,
    rollback_delay_secs: u64,
) -> Result<(), CliError> {
    let mut runner = CliRunner::new()?;
    runner.config_mut().channel_change.rollback_delay_secs = rollback_delay_secs;
    runner.log_startup("simulate channel-change");

    let radio = Arc::new(SimulatedRadio::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let addresses: Vec<DeviceAddress> = (1..=u64::from(devices))
        .map(|n| DeviceAddress::new(0x0011_2233_4455_0000 + n))
        .collect();
    for (i, address) in addresses.iter().enumerate() {
        directory.add_device(*address, false);
        if i < usize::from(comm_fail) {
            directory.set_comm_fail(*address, true);
        }
    }

    let subsystem = runner.build_subsystem(
        radio.clone(),
        directory.clone(),
        Arc::new(InMemoryProperties::new()),
        Arc::new(RecordingProcessManager::new()),
    )?;

    let (succeeded, effective) = runner.runtime().block_on(drive_channel_change(
        &subsystem,
        &radio,
        &directory,
        &addresses[usize::from(comm_fail)..usize::from(comm_fail) + usize::from(followers)],
        channel,
        rollback_delay_secs,
    ))?;

    println!(
        "Channel change {}; network on channel {} (radio calls: {:?})",
        if succeeded { "kept" } else { "reverted" },
        effective,
        radio.channel_changes()
    );
    Ok(())
}

async fn drive_pairing(
    subsystem: &Arc<ZigbeeSubsystem>,
    address: DeviceAddress,
    device_type: DeviceType,
    power_source: PowerSource,
    claim: bool,
    offers: &mut mpsc::UnboundedReceiver<DeviceAddress>,
) -> Result<(), CliError> {
    let identity = subsystem.start().await?;
    println!("Network up, local identity {}", identity);

    let mut events = subsystem.subscribe();
    subsystem.start_discovery();

    info!(address = %address, "Simulating join and announce");
    subsystem.handle_radio_event(RadioEvent::DeviceJoined { address });
    subsystem.handle_radio_event(RadioEvent::DeviceAnnounced {
        address,
        device_type,
        power_source,
    });

    tokio::time::timeout(EVENT_GRACE, offers.recv())
        .await
        .map_err(|_| CliError::Scenario("device was never offered to a handler".to_string()))?;

    if !claim {
        wait_for(&mut events, EVENT_GRACE, |e| {
            matches!(e, SubsystemEvent::DeviceRejected { address: a } if *a == address)
        })
        .await?;
    }

    subsystem.stop_discovery();
    subsystem.shutdown();
    Ok(())
}

/// Returns whether the change was kept and the channel the network ends on.
async fn drive_channel_change(
    subsystem: &Arc<ZigbeeSubsystem>,
    radio: &SimulatedRadio,
    directory: &InMemoryDirectory,
    followers: &[DeviceAddress],
    channel: u8,
    rollback_delay_secs: u64,
) -> Result<(bool, u8), CliError> {
    subsystem.start().await?;
    let mut events = subsystem.subscribe();
    let previous = radio.channel();

    let outcome = subsystem.change_channel(channel, false);
    println!("Change {} -> {}: {}", previous, outcome.channel, outcome.result);
    let target = match outcome.into_result() {
        Ok(target) => target,
        Err(e) => {
            subsystem.shutdown();
            return Err(e.into());
        }
    };
    if target == previous {
        subsystem.shutdown();
        return Ok((true, previous));
    }

    let heard = SystemTime::now();
    for address in followers {
        directory.touch(*address, heard);
    }

    let limit = Duration::from_secs(rollback_delay_secs) + EVENT_GRACE;
    let event = wait_for(&mut events, limit, |e| {
        matches!(e, SubsystemEvent::ChannelChanged { .. })
    })
    .await;
    subsystem.shutdown();

    match event? {
        SubsystemEvent::ChannelChanged { succeeded, channel } => Ok((succeeded, channel)),
        other => Err(CliError::Scenario(format!("unexpected event {:?}", other))),
    }
}

async fn wait_for(
    events: &mut broadcast::Receiver<SubsystemEvent>,
    limit: Duration,
    predicate: impl Fn(&SubsystemEvent) -> bool,
) -> Result<SubsystemEvent, CliError> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let received = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| CliError::Scenario("timed out waiting for subsystem event".to_string()))?;
        match received {
            Ok(event) if predicate(&event) => return Ok(event),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
                return Err(CliError::Scenario("event channel closed".to_string()))
            }
        }
    }
}
