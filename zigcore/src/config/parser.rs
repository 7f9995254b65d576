//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::channel::{MAX_CHANNEL, MIN_CHANNEL};

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [network] section
    if let Some(section) = ini.section(Some("network")) {
        if let Some(v) = section.get("region") {
            let v = v.trim().to_uppercase();
            if v.len() != 2 || !v.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(invalid(
                    "network",
                    "region",
                    &v,
                    "must be a two-letter region code",
                ));
            }
            config.network.region = v;
        }
        if let Some(v) = positive(section, "network", "init_attempts")? {
            config.network.init_attempts = v;
        }
        if let Some(v) = number(section, "network", "init_retry_delay_ms")? {
            config.network.init_retry_delay_ms = v;
        }
        if let Some(v) = section.get("oui") {
            config.network.oui = v.parse().map_err(|_| {
                invalid(
                    "network",
                    "oui",
                    v,
                    "expected three hex bytes like '00:1B:5F'",
                )
            })?;
        }
    }

    // [channel_change] section
    if let Some(section) = ini.section(Some("channel_change")) {
        if let Some(v) = number(section, "channel_change", "rollback_delay_secs")? {
            config.channel_change.rollback_delay_secs = v;
        }
        if let Some(v) = section.get("scan_channels") {
            config.channel_change.scan_channels = parse_channel_list(v)?;
        }
        if let Some(v) = number(section, "channel_change", "scan_duration_ms")? {
            config.channel_change.scan_duration_ms = v;
        }
        if let Some(v) = positive(section, "channel_change", "scan_count")? {
            config.channel_change.scan_count = v;
        }
    }

    // [watchdog] section
    if let Some(section) = ini.section(Some("watchdog")) {
        if let Some(v) = positive(section, "watchdog", "heartbeat_interval_secs")? {
            config.watchdog.heartbeat_interval_secs = v as u64;
        }
        if let Some(v) = positive(section, "watchdog", "failure_threshold")? {
            config.watchdog.failure_threshold = v;
        }
        if let Some(v) = boolean(section, "watchdog", "restart_on_all_comm_fail")? {
            config.watchdog.restart_on_all_comm_fail = v;
        }
    }

    // [health_check] section
    if let Some(section) = ini.section(Some("health_check")) {
        if let Some(v) = number(section, "health_check", "interval_ms")? {
            config.health_check.interval_ms = v;
        }
        if let Some(v) = section.get("cca_threshold") {
            config.health_check.cca_threshold = v.trim().parse().map_err(|_| {
                invalid(
                    "health_check",
                    "cca_threshold",
                    v,
                    "must be a dBm value between -128 and 127",
                )
            })?;
        }
        if let Some(v) = number(section, "health_check", "cca_failure_threshold")? {
            config.health_check.cca_failure_threshold = v;
        }
        if let Some(v) = number(section, "health_check", "restore_threshold")? {
            config.health_check.restore_threshold = v;
        }
        if let Some(v) = number(section, "health_check", "delay_between_retries_ms")? {
            config.health_check.delay_between_retries_ms = v;
        }
    }

    // [defender] section
    if let Some(section) = ini.section(Some("defender")) {
        if let Some(v) = number(section, "defender", "pan_id_change_threshold")? {
            config.defender.pan_id_change_threshold = v;
        }
        if let Some(v) = number(section, "defender", "window_ms")? {
            config.defender.window_ms = v;
        }
        if let Some(v) = number(section, "defender", "restore_ms")? {
            config.defender.restore_ms = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if v.is_empty() || v.contains('/') {
                return Err(invalid("logging", "file", v, "must be a plain file name"));
            }
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Non-negative integer value.
fn number<T: FromStr>(props: &Properties, section: &str, key: &str) -> Result<Option<T>, ConfigFileError> {
    match props.get(key) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(section, key, v, "must be a non-negative integer")),
    }
}

/// Integer value of at least one.
fn positive(props: &Properties, section: &str, key: &str) -> Result<Option<u32>, ConfigFileError> {
    match number::<u32>(props, section, key)? {
        Some(0) => Err(invalid(section, key, "0", "must be at least 1")),
        other => Ok(other),
    }
}

fn boolean(props: &Properties, section: &str, key: &str) -> Result<Option<bool>, ConfigFileError> {
    match props.get(key) {
        None => Ok(None),
        Some(v) => match v.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            _ => Err(invalid(section, key, v, "must be true or false")),
        },
    }
}

/// Parses `15, 20, 25` into a validated channel list.
fn parse_channel_list(value: &str) -> Result<Vec<u8>, ConfigFileError> {
    let reason = format!(
        "must be a comma-separated list of channels {}-{}",
        MIN_CHANNEL, MAX_CHANNEL
    );
    let mut channels = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let channel: u8 = part
            .parse()
            .map_err(|_| invalid("channel_change", "scan_channels", value, &reason))?;
        if !(MIN_CHANNEL..=MAX_CHANNEL).contains(&channel) {
            return Err(invalid("channel_change", "scan_channels", value, &reason));
        }
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }
    if channels.is_empty() {
        return Err(invalid("channel_change", "scan_channels", value, &reason));
    }
    Ok(channels)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
