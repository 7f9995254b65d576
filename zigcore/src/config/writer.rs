//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let scan_channels = config
        .channel_change
        .scan_channels
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"[network]
; Regulatory region code passed to the radio at network init
region = {}
; Network init attempts per call before giving up (default: 3)
; The core watchdog keeps retrying through process restarts after that
init_attempts = {}
; Pause between init attempts in milliseconds (default: 2000)
init_retry_delay_ms = {}
; Vendor prefix (OUI) for a generated local radio identity
oui = {}

[channel_change]
; Seconds devices get to follow a channel change before the rollback
; check runs (default: 900)
rollback_delay_secs = {}
; Candidate channels for automatic selection (channel 0 requests),
; earlier channels win ties
scan_channels = {}
; Energy scan dwell per channel in milliseconds (default: 30)
scan_duration_ms = {}
; Energy scan samples per channel (default: 16)
scan_count = {}

[watchdog]
; Seconds between radio process heartbeats (default: 60)
heartbeat_interval_secs = {}
; Consecutive heartbeat failures before the radio process is restarted
failure_threshold = {}
; Restart the radio process when every known device is in comm-fail
restart_on_all_comm_fail = {}

[health_check]
; Clear-channel assessment interval in milliseconds
interval_ms = {}
; CCA threshold in dBm; readings above it count as interference
cca_threshold = {}
; Failed assessments before interference is reported
cca_failure_threshold = {}
; Passing assessments before interference is cleared
restore_threshold = {}
delay_between_retries_ms = {}

[defender]
; PAN id changes within the window that trigger the defender
pan_id_change_threshold = {}
window_ms = {}
restore_ms = {}

[logging]
; Log directory (relative paths are relative to the working directory)
directory = {}
; Log file name, cleared at session start
file = {}
"#,
        config.network.region,
        config.network.init_attempts,
        config.network.init_retry_delay_ms,
        config.network.oui,
        config.channel_change.rollback_delay_secs,
        scan_channels,
        config.channel_change.scan_duration_ms,
        config.channel_change.scan_count,
        config.watchdog.heartbeat_interval_secs,
        config.watchdog.failure_threshold,
        config.watchdog.restart_on_all_comm_fail,
        config.health_check.interval_ms,
        config.health_check.cca_threshold,
        config.health_check.cca_failure_threshold,
        config.health_check.restore_threshold,
        config.health_check.delay_between_retries_ms,
        config.defender.pan_id_change_threshold,
        config.defender.window_ms,
        config.defender.restore_ms,
        config.logging.directory.display(),
        config.logging.file,
    )
}
