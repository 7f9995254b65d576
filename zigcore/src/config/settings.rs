//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;
use std::time::Duration;

use crate::network::Oui;
use crate::radio::{DefenderConfig, EnergyScanRequest, HealthCheckConfig};

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub network: NetworkSettings,
    pub channel_change: ChannelChangeSettings,
    pub watchdog: WatchdogSettings,
    pub health_check: HealthCheckSettings,
    pub defender: DefenderSettings,
    pub logging: LoggingSettings,
}

/// Network bring-up.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    /// Regulatory region code passed to network init.
    pub region: String,
    /// Init attempts per call before giving up.
    pub init_attempts: u32,
    /// Pause between init attempts in milliseconds.
    pub init_retry_delay_ms: u64,
    /// Vendor prefix for a generated local identity.
    pub oui: Oui,
}

/// Channel change and rollback supervision.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelChangeSettings {
    /// How long devices get to follow a change before rollback is evaluated.
    pub rollback_delay_secs: u64,
    /// Candidate channels for automatic selection, in tie-break order.
    pub scan_channels: Vec<u8>,
    pub scan_duration_ms: u64,
    pub scan_count: u32,
}

impl ChannelChangeSettings {
    pub fn rollback_delay(&self) -> Duration {
        Duration::from_secs(self.rollback_delay_secs)
    }

    pub fn scan_request(&self) -> EnergyScanRequest {
        EnergyScanRequest {
            channels: self.scan_channels.clone(),
            duration: Duration::from_millis(self.scan_duration_ms),
            count: self.scan_count,
        }
    }
}

/// Core process watchdog.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchdogSettings {
    pub heartbeat_interval_secs: u64,
    /// Consecutive heartbeat failures that trigger a restart.
    pub failure_threshold: u32,
    /// Restart the radio process when every known device is in comm-fail.
    pub restart_on_all_comm_fail: bool,
}

impl WatchdogSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Radio-side clear-channel health check.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckSettings {
    pub interval_ms: u64,
    /// dBm; readings above this count as a CCA failure.
    pub cca_threshold: i8,
    pub cca_failure_threshold: u32,
    pub restore_threshold: u32,
    pub delay_between_retries_ms: u64,
}

impl From<&HealthCheckSettings> for HealthCheckConfig {
    fn from(s: &HealthCheckSettings) -> Self {
        Self {
            interval: Duration::from_millis(s.interval_ms),
            cca_threshold: s.cca_threshold,
            cca_failure_threshold: s.cca_failure_threshold,
            restore_threshold: s.restore_threshold,
            delay_between_retries: Duration::from_millis(s.delay_between_retries_ms),
        }
    }
}

/// Radio-side PAN id conflict defender.
#[derive(Debug, Clone, PartialEq)]
pub struct DefenderSettings {
    pub pan_id_change_threshold: u32,
    pub window_ms: u64,
    pub restore_ms: u64,
}

impl From<&DefenderSettings> for DefenderConfig {
    fn from(s: &DefenderSettings) -> Self {
        Self {
            pan_id_change_threshold: s.pan_id_change_threshold,
            window: Duration::from_millis(s.window_ms),
            restore: Duration::from_millis(s.restore_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}
