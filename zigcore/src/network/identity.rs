//! Local radio identity.
//!
//! The coordinator's EUI64 is generated once and persisted. Generated
//! identities start with a vendor OUI, carry two random bytes, and end with
//! the low 24 bits of the system identifier's trailing hex digits, so the
//! same gateway tends to get a recognizable identity.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use tracing::{info, warn};

use crate::address::DeviceAddress;
use crate::error::{Result, ZigbeeError};
use crate::gateway::properties::{LOCAL_EUI64, SYSTEM_ID};
use crate::gateway::PropertyStore;

/// Hex digits taken from the end of the system identifier.
const SYSTEM_ID_DIGITS: usize = 6;

/// Organizationally unique identifier: the three high bytes of an EUI64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oui([u8; 3]);

impl Oui {
    pub const fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 3] {
        self.0
    }
}

impl fmt::Display for Oui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}:{:02X}:{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for Oui {
    type Err = ZigbeeError;

    /// Accepts `00:1B:5F`, `00-1B-5F` or `001B5F`.
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();
        if digits.len() != 6 {
            return Err(ZigbeeError::InvalidArgument(format!(
                "OUI '{}' must have 6 hex digits",
                s
            )));
        }
        let raw = u32::from_str_radix(&digits, 16)
            .map_err(|_| ZigbeeError::InvalidArgument(format!("invalid OUI '{}'", s)))?;
        let [_, a, b, c] = raw.to_be_bytes();
        Ok(Self([a, b, c]))
    }
}

/// Builds an identity from `oui`, random bytes and the system id's trailing
/// hex digits. When the system id has no hex digits the low bytes are
/// random as well.
pub fn derive_identity<R: Rng + ?Sized>(oui: Oui, system_id: &str, rng: &mut R) -> DeviceAddress {
    let hex: Vec<char> = system_id.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    let tail: String = hex[hex.len().saturating_sub(SYSTEM_ID_DIGITS)..]
        .iter()
        .collect();

    let low = match u32::from_str_radix(&tail, 16) {
        Ok(v) if !tail.is_empty() => v & 0x00FF_FFFF,
        _ => rng.gen::<u32>() & 0x00FF_FFFF,
    };
    let [_, l0, l1, l2] = low.to_be_bytes();
    let random: [u8; 2] = rng.gen();
    let [o0, o1, o2] = oui.bytes();

    DeviceAddress::from_bytes([o0, o1, o2, random[0], random[1], l0, l1, l2])
}

/// Returns the persisted identity, generating and persisting one if absent.
///
/// An unparseable persisted value is replaced.
pub fn load_or_generate(properties: &dyn PropertyStore, oui: Oui) -> Result<DeviceAddress> {
    if let Some(stored) = properties.get(LOCAL_EUI64) {
        match stored.parse::<DeviceAddress>() {
            Ok(addr) => return Ok(addr),
            Err(e) => warn!(value = %stored, error = %e, "Persisted radio identity is invalid, regenerating"),
        }
    }

    let system_id = properties.get(SYSTEM_ID).unwrap_or_default();
    let identity = derive_identity(oui, &system_id, &mut rand::thread_rng());
    properties.set(LOCAL_EUI64, &identity.to_string())?;
    info!(identity = %identity, "Generated local radio identity");
    Ok(identity)
}
