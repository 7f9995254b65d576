//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation.

use std::path::PathBuf;

use super::settings::*;
use crate::network::Oui;

// =============================================================================
// [network]
// =============================================================================

pub const DEFAULT_REGION: &str = "US";
pub const DEFAULT_INIT_ATTEMPTS: u32 = 3;
pub const DEFAULT_INIT_RETRY_DELAY_MS: u64 = 2_000;
pub const DEFAULT_OUI: Oui = Oui::new([0x00, 0x1B, 0x5F]);

// =============================================================================
// [channel_change]
// =============================================================================

/// 15 minutes for devices to follow a channel change.
pub const DEFAULT_ROLLBACK_DELAY_SECS: u64 = 900;
pub const DEFAULT_SCAN_CHANNELS: [u8; 3] = [15, 20, 25];
pub const DEFAULT_SCAN_DURATION_MS: u64 = 30;
pub const DEFAULT_SCAN_COUNT: u32 = 16;

// =============================================================================
// [watchdog]
// =============================================================================

pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_HEARTBEAT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_RESTART_ON_ALL_COMM_FAIL: bool = true;

// =============================================================================
// [health_check]
// =============================================================================

pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_CCA_THRESHOLD: i8 = -70;
pub const DEFAULT_CCA_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESTORE_THRESHOLD: u32 = 3;
pub const DEFAULT_DELAY_BETWEEN_RETRIES_MS: u64 = 1_000;

// =============================================================================
// [defender]
// =============================================================================

pub const DEFAULT_PAN_ID_CHANGE_THRESHOLD: u32 = 3;
pub const DEFAULT_DEFENDER_WINDOW_MS: u64 = 10_000;
pub const DEFAULT_DEFENDER_RESTORE_MS: u64 = 60_000;

// =============================================================================
// [logging]
// =============================================================================

pub const DEFAULT_LOG_DIRECTORY: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "zigcore.log";

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            network: NetworkSettings {
                region: DEFAULT_REGION.to_string(),
                init_attempts: DEFAULT_INIT_ATTEMPTS,
                init_retry_delay_ms: DEFAULT_INIT_RETRY_DELAY_MS,
                oui: DEFAULT_OUI,
            },
            channel_change: ChannelChangeSettings {
                rollback_delay_secs: DEFAULT_ROLLBACK_DELAY_SECS,
                scan_channels: DEFAULT_SCAN_CHANNELS.to_vec(),
                scan_duration_ms: DEFAULT_SCAN_DURATION_MS,
                scan_count: DEFAULT_SCAN_COUNT,
            },
            watchdog: WatchdogSettings {
                heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
                failure_threshold: DEFAULT_HEARTBEAT_FAILURE_THRESHOLD,
                restart_on_all_comm_fail: DEFAULT_RESTART_ON_ALL_COMM_FAIL,
            },
            health_check: HealthCheckSettings {
                interval_ms: DEFAULT_HEALTH_CHECK_INTERVAL_MS,
                cca_threshold: DEFAULT_CCA_THRESHOLD,
                cca_failure_threshold: DEFAULT_CCA_FAILURE_THRESHOLD,
                restore_threshold: DEFAULT_RESTORE_THRESHOLD,
                delay_between_retries_ms: DEFAULT_DELAY_BETWEEN_RETRIES_MS,
            },
            defender: DefenderSettings {
                pan_id_change_threshold: DEFAULT_PAN_ID_CHANGE_THRESHOLD,
                window_ms: DEFAULT_DEFENDER_WINDOW_MS,
                restore_ms: DEFAULT_DEFENDER_RESTORE_MS,
            },
            logging: LoggingSettings {
                directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}
