//! Channel change orchestration with rollback supervision.

mod change;
mod rollback;
mod scan;

pub use change::ChannelChangeOrchestrator;
pub use rollback::{devices_failing_to_follow, ChannelChangeWatchdogContext};
pub use scan::select_best_channel;

use crate::error::{Result, ZigbeeError};

/// Lowest channel in the 2.4 GHz band.
pub const MIN_CHANNEL: u8 = 11;
/// Highest channel in the 2.4 GHz band.
pub const MAX_CHANNEL: u8 = 26;

/// Requesting this channel selects the best channel by energy scan.
pub const AUTO_CHANNEL: u8 = 0;

pub fn is_valid_channel(channel: u8) -> bool {
    (MIN_CHANNEL..=MAX_CHANNEL).contains(&channel)
}

/// Result code of a channel change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelChangeResult {
    Success,
    /// Channel changes are disabled by property.
    NotAllowed,
    /// Another change is being supervised.
    InProgress,
    /// Requested channel is outside the radio band.
    InvalidChannel,
    /// Automatic selection found no usable channel.
    UnableToCalculate,
    /// The radio refused or could not be queried.
    Failed,
}

impl ChannelChangeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotAllowed => "not_allowed",
            Self::InProgress => "in_progress",
            Self::InvalidChannel => "invalid_channel",
            Self::UnableToCalculate => "unable_to_calculate",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChannelChangeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed reply to a channel change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelChangeOutcome {
    /// Target channel (requested, computed, or current for a no-op).
    pub channel: u8,
    pub result: ChannelChangeResult,
}

impl ChannelChangeOutcome {
    pub fn new(channel: u8, result: ChannelChangeResult) -> Self {
        Self { channel, result }
    }

    pub fn is_success(&self) -> bool {
        self.result == ChannelChangeResult::Success
    }

    /// The target channel on success, otherwise the matching error.
    ///
    /// The radio's own code is not kept for `Failed`, which maps to a
    /// hardware error with code -1.
    pub fn into_result(self) -> Result<u8> {
        match self.result {
            ChannelChangeResult::Success => Ok(self.channel),
            ChannelChangeResult::NotAllowed => Err(ZigbeeError::NotAllowed(
                "channel changes are disabled".to_string(),
            )),
            ChannelChangeResult::InProgress => Err(ZigbeeError::AlreadyInProgress("channel change")),
            ChannelChangeResult::InvalidChannel => Err(ZigbeeError::Unsupported(format!(
                "channel {} is outside {}..={}",
                self.channel, MIN_CHANNEL, MAX_CHANNEL
            ))),
            ChannelChangeResult::UnableToCalculate => Err(ZigbeeError::NotFound(
                "no usable channel in energy scan".to_string(),
            )),
            ChannelChangeResult::Failed => Err(ZigbeeError::hardware("network_change", -1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_yields_channel() {
        let outcome = ChannelChangeOutcome::new(20, ChannelChangeResult::Success);
        assert_eq!(outcome.into_result().unwrap(), 20);
    }

    #[test]
    fn test_refusals_map_to_errors() {
        let err = ChannelChangeOutcome::new(20, ChannelChangeResult::InProgress)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, ZigbeeError::AlreadyInProgress("channel change")));
        assert_eq!(err.to_string(), "channel change already in progress");

        let err = ChannelChangeOutcome::new(20, ChannelChangeResult::NotAllowed)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, ZigbeeError::NotAllowed(_)));

        let err = ChannelChangeOutcome::new(27, ChannelChangeResult::InvalidChannel)
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported: channel 27 is outside 11..=26");
    }
}
