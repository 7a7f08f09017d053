//! Network definitions and the consensus parameters that never change
//! within a network.

mod genesis;

pub use genesis::{genesis_block, genesis_hash};

use crate::amount::COIN;
use crate::work::difficulty::{CompactDifficulty, ExpandedDifficulty};

/// Coinbase outputs may not be spent until they are this many blocks deep.
pub const COINBASE_MATURITY: u32 = 100;

/// The difficulty retarget fires every this many blocks.
pub const RETARGET_INTERVAL: u32 = 2_016;

/// The intended spacing between blocks, in seconds.
pub const TARGET_SPACING: u64 = 600;

/// The intended duration of a full retarget interval, in seconds.
pub const TARGET_TIMESPAN: u64 = RETARGET_INTERVAL as u64 * TARGET_SPACING;

/// Block timestamps may lead local time by at most this many seconds.
pub const MAX_FUTURE_DRIFT: u64 = 2 * 60 * 60;

/// The block subsidy halves every this many blocks.
pub const HALVING_INTERVAL: u32 = 210_000;

/// The block subsidy at height 0, in base units.
pub const INITIAL_SUBSIDY: u64 = 50 * COIN;

/// The cap on the aggregate signature-operation count of a block.
pub const MAX_BLOCK_SIGOPS: u64 = 20_000;

/// The floor fee rate for relay and mempool admission, in base units per
/// 1000 bytes of transaction.
pub const MIN_RELAY_TX_FEE: u64 = 1_000;

/// The easiest target any mainnet block may carry, in compact form.
pub const MAX_TARGET_BITS: CompactDifficulty = CompactDifficulty(0x1d00ffff);

/// The testnet difficulty floor. Low enough that a development machine
/// mines blocks in milliseconds.
pub const TESTNET_MAX_TARGET_BITS: CompactDifficulty = CompactDifficulty(0x207fffff);

/// The coinbase script length bounds, inclusive.
pub const COINBASE_SCRIPT_BOUNDS: (usize, usize) = (2, 100);

/// The production network and its long-lived test companion.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Network {
    /// The production network.
    Mainnet,
    /// The testing network.
    Testnet,
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

impl Network {
    /// The four-byte message-frame magic, as a little-endian integer.
    pub fn magic_value(self) -> u32 {
        match self {
            Network::Mainnet => 0xD9B4_BEF9,
            Network::Testnet => 0xDAB5_BFFA,
        }
    }

    /// The default peer-to-peer listener port.
    pub fn default_port(self) -> u16 {
        match self {
            Network::Mainnet => 9333,
            Network::Testnet => 19333,
        }
    }

    /// The default RPC listener port.
    pub fn default_rpc_port(self) -> u16 {
        match self {
            Network::Mainnet => 9334,
            Network::Testnet => 19334,
        }
    }

    /// The compact form of the easiest target allowed on this network.
    pub fn max_target_bits(self) -> CompactDifficulty {
        match self {
            Network::Mainnet => MAX_TARGET_BITS,
            Network::Testnet => TESTNET_MAX_TARGET_BITS,
        }
    }

    /// The easiest target allowed on this network.
    pub fn max_target(self) -> ExpandedDifficulty {
        self.max_target_bits()
            .to_expanded()
            .expect("the network target bits are a valid compact encoding")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magics_and_ports() {
        meridian_test::init();

        assert_eq!(Network::Mainnet.magic_value(), 0xD9B4BEF9);
        assert_eq!(Network::Testnet.magic_value(), 0xDAB5BFFA);
        assert_eq!(Network::Mainnet.default_port(), 9333);
        assert_eq!(Network::Testnet.default_rpc_port(), 19334);
    }

    #[test]
    fn max_target_is_valid() {
        meridian_test::init();

        let target = Network::Mainnet.max_target();
        assert_eq!(target.to_compact(), MAX_TARGET_BITS);
    }
}
