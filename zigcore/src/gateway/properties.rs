//! Property and metadata key names.

/// When explicitly `false`, traffic from unknown devices is never rejected.
pub const REJECT_UNKNOWN_DEVICES: &str = "zigbee.rejectUnknownDevices";

/// When explicitly `false`, channel changes return `NotAllowed`.
pub const CHANNEL_CHANGE_ENABLED: &str = "zigbee.channelChangeEnabled";

/// Persisted local radio identity (16 hex digits).
pub const LOCAL_EUI64: &str = "zigbee.localEui64";

/// Last network configuration blob reported by the radio.
pub const NETWORK_CONFIG: &str = "zigbee.networkConfig";

/// Channel in use before an in-flight channel change. Empty when none.
pub const PREVIOUS_CHANNEL: &str = "zigbee.previousChannel";

/// Advance security frame counters at the next network init.
pub const INCREMENT_COUNTERS: &str = "zigbee.incrementCountersOnInit";

/// Stable system identifier used to derive the local identity.
pub const SYSTEM_ID: &str = "system.id";

/// Per-device metadata: device uses a hash-based link key.
pub const META_HASH_BASED_LINK_KEY: &str = "hashBasedLinkKey";
