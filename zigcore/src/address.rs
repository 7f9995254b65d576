//! Device addressing.
//!
//! Every map in the orchestration layer is keyed by a [`DeviceAddress`], the
//! 64-bit globally unique identity a radio carries for its whole life.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ZigbeeError;

/// 64-bit radio identity (EUI64) of a mesh device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(u64);

impl DeviceAddress {
    /// Address that radio events use to mean "every device".
    pub const WILDCARD: DeviceAddress = DeviceAddress(0xFFFF_FFFF_FFFF_FFFF);

    /// Creates an address from its raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns true for the "apply to all devices" address.
    #[inline]
    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }

    /// Big-endian byte representation (OUI first).
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Builds an address from big-endian bytes.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl From<u64> for DeviceAddress {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for DeviceAddress {
    type Err = ZigbeeError;

    /// Accepts 16 hex digits, optionally `0x`-prefixed and/or `:`/`-` separated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let digits: String = trimmed.chars().filter(|c| *c != ':' && *c != '-').collect();

        if digits.len() != 16 {
            return Err(ZigbeeError::InvalidArgument(format!(
                "device address '{}' must have 16 hex digits",
                s
            )));
        }

        u64::from_str_radix(&digits, 16)
            .map(Self)
            .map_err(|_| ZigbeeError::InvalidArgument(format!("invalid device address '{}'", s)))
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_zero_padded_hex() {
        assert_eq!(DeviceAddress::new(0xab).to_string(), "00000000000000ab");
        assert_eq!(
            DeviceAddress::new(0xAABB_CCDD_EEFF_0011).to_string(),
            "aabbccddeeff0011"
        );
    }

    #[test]
    fn test_parse_accepts_prefixes_and_separators() {
        let expected = DeviceAddress::new(0x0011_2233_4455_6677);
        assert_eq!("0011223344556677".parse::<DeviceAddress>().unwrap(), expected);
        assert_eq!("0x0011223344556677".parse::<DeviceAddress>().unwrap(), expected);
        assert_eq!(
            "00:11:22:33:44:55:66:77".parse::<DeviceAddress>().unwrap(),
            expected
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("1234".parse::<DeviceAddress>().is_err());
        assert!("zz11223344556677".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_wildcard() {
        assert!(DeviceAddress::WILDCARD.is_wildcard());
        assert!(!DeviceAddress::new(1).is_wildcard());
    }

    #[test]
    fn test_bytes_are_big_endian() {
        let addr = DeviceAddress::new(0x0102_0304_0506_0708);
        assert_eq!(addr.to_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(DeviceAddress::from_bytes(addr.to_bytes()), addr);
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let addr = DeviceAddress::new(0xAABB);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"000000000000aabb\"");
        let back: DeviceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
