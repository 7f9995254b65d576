//! Best-channel selection from energy scan results.

use crate::radio::ChannelEnergy;

/// Picks the highest-scoring channel.
///
/// Ties go to the channel that appears first in `results`. Channels
/// scoring zero or less never qualify; `None` when nothing qualifies.
pub fn select_best_channel(results: &[ChannelEnergy]) -> Option<u8> {
    results
        .iter()
        .filter(|r| r.score > 0)
        .fold(None::<&ChannelEnergy>, |best, r| match best {
            Some(b) if b.score >= r.score => Some(b),
            _ => Some(r),
        })
        .map(|r| r.channel)
}
