//! The block emission schedule.

use meridian_chain::amount::Amount;
use meridian_chain::block::Height;
use meridian_chain::parameters::{HALVING_INTERVAL, INITIAL_SUBSIDY};

/// The miner subsidy for a block at `height`.
///
/// Starts at 50 MRD and halves every `HALVING_INTERVAL` blocks; after 64
/// halvings the shift would wrap, and the subsidy is defined as zero.
pub fn block_subsidy(height: Height) -> Amount {
    let halvings = height.0 / HALVING_INTERVAL;
    if halvings >= 64 {
        return Amount::ZERO;
    }
    Amount::from_units(INITIAL_SUBSIDY >> halvings)
        .expect("the genesis subsidy is below MAX_MONEY and halving only shrinks it")
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_chain::amount::COIN;

    #[test]
    fn halving_schedule() {
        meridian_test::init();

        assert_eq!(block_subsidy(Height(0)).units(), 50 * COIN);
        assert_eq!(
            block_subsidy(Height(HALVING_INTERVAL - 1)).units(),
            50 * COIN
        );
        assert_eq!(block_subsidy(Height(HALVING_INTERVAL)).units(), 25 * COIN);
        assert_eq!(
            block_subsidy(Height(HALVING_INTERVAL * 2)).units(),
            1_250_000_000
        );

        // Deep halvings shrink to a single unit, then nothing.
        assert_eq!(block_subsidy(Height(HALVING_INTERVAL * 32)).units(), 1);
        assert_eq!(block_subsidy(Height(HALVING_INTERVAL * 33)).units(), 0);

        // At and beyond the 64th halving the subsidy is defined as zero.
        assert_eq!(block_subsidy(Height(HALVING_INTERVAL * 64)).units(), 0);
        assert_eq!(block_subsidy(Height(u32::MAX)).units(), 0);
    }
}
