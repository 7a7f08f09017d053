//! Difficulty retargeting.
//!
//! Every `RETARGET_INTERVAL` blocks the target is rescaled by the ratio of
//! the interval's actual duration to its intended duration, clamped to a
//! factor of four in either direction and capped at the network maximum.
//! All other heights inherit the previous block's bits.

use meridian_chain::block::Height;
use meridian_chain::parameters::{Network, RETARGET_INTERVAL, TARGET_TIMESPAN};
use meridian_chain::work::difficulty::{CompactDifficulty, ExpandedDifficulty};
use tracing::debug;

/// Whether the block at `height` begins a new difficulty period.
pub fn is_retarget_height(height: Height) -> bool {
    height.0 != 0 && height.0 % RETARGET_INTERVAL == 0
}

/// The bits required at a retarget height, given the previous block's bits
/// and the timestamps bounding the interval just ended.
pub fn retarget(
    prev_bits: CompactDifficulty,
    first_block_time: u64,
    last_block_time: u64,
    network: Network,
) -> CompactDifficulty {
    let actual = last_block_time.saturating_sub(first_block_time);
    let clamped = actual.clamp(TARGET_TIMESPAN / 4, TARGET_TIMESPAN * 4);
    if clamped != actual {
        debug!(actual, clamped, "clamped retarget timespan");
    }

    let old_target = match prev_bits.to_expanded() {
        Some(target) => target,
        // Unreachable for blocks that passed validation; fall back to the
        // network floor rather than panic.
        None => network.max_target(),
    };

    let max_target = network.max_target();
    let new_target = match old_target.to_u256().checked_mul(clamped.into()) {
        Some(scaled) => {
            let divided = scaled / TARGET_TIMESPAN;
            ExpandedDifficulty::from_u256(divided)
        }
        // Overflow means the easing ran off the top of the range; the cap
        // below applies anyway.
        None => max_target,
    };

    let capped = if new_target > max_target {
        max_target
    } else {
        new_target
    };
    capped.to_compact()
}
