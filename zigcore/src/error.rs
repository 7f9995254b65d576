//! Error types for the orchestration layer.
//!
//! Lookup and codec errors are returned to the immediate caller. Event
//! handling paths never surface these upward; they log and carry on.

use thiserror::Error;

use crate::address::DeviceAddress;
use crate::codec::CodecError;

/// Errors returned by orchestration operations.
#[derive(Debug, Error)]
pub enum ZigbeeError {
    /// A required input was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lookup miss, including a command wait that timed out.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network initialization is already running on another thread.
    #[error("network initialization already in progress")]
    AlreadyInitializing,

    /// A guarded operation is already in flight.
    #[error("{0} already in progress")]
    AlreadyInProgress(&'static str),

    /// A listener set already exists for this device.
    #[error("listener already registered for device {0}")]
    AlreadyRegistered(DeviceAddress),

    /// The operation is disabled by a feature property.
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// The radio process returned a non-zero result.
    #[error("radio call '{operation}' failed with code {code}")]
    HardwareCallFailed { operation: &'static str, code: i32 },

    /// Request outside what the radio supports (e.g. out-of-band channel).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Payload marshalling failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ZigbeeError {
    /// Shorthand for a failed radio call.
    pub fn hardware(operation: &'static str, code: i32) -> Self {
        Self::HardwareCallFailed { operation, code }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ZigbeeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_display() {
        let err = ZigbeeError::hardware("network_init", -3);
        assert_eq!(err.to_string(), "radio call 'network_init' failed with code -3");
    }

    #[test]
    fn test_already_registered_display() {
        let err = ZigbeeError::AlreadyRegistered(DeviceAddress::new(0x42));
        assert!(err.to_string().contains("0000000000000042"));
    }

    #[test]
    fn test_codec_error_converts() {
        let err: ZigbeeError = CodecError::TooLong { length: 300 }.into();
        assert!(matches!(err, ZigbeeError::Codec(CodecError::TooLong { length: 300 })));
    }
}
