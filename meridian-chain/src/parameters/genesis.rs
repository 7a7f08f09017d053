//! The pinned genesis block for each network.

use std::sync::Arc;

use crate::amount::Amount;
use crate::block::{self, merkle, Block, Header};
use crate::parameters::{Network, INITIAL_SUBSIDY};
use crate::transaction::{LockTime, Transaction};
use crate::transparent::{Input, OutPoint, Output, Script, SEQUENCE_FINAL};

/// The previous block hash for the genesis block: the null hash, since
/// there is nothing before it.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

/// The timestamp baked into the genesis header: 2024-12-30 00:00:00 UTC.
const GENESIS_TIME: u64 = 1735516800;

/// The message carried in the genesis coinbase script, proving the chain
/// was not started earlier than its date.
const GENESIS_COINBASE_DATA: &[u8] = b"Meridian 2024-12-30: fiat lux";

/// The uncompressed public key the genesis subsidy is paid to. This output
/// is unspendable in practice; it exists to give the genesis coinbase a
/// well-formed shape.
const GENESIS_PUBKEY: &str = "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61de\
                              b649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";

/// The genesis block for `network`.
///
/// The genesis block is trusted by identity rather than by proof of work:
/// validation pins its hash and never runs the PoW predicate at height 0,
/// so the nonce is an arbitrary constant.
pub fn genesis_block(network: Network) -> Block {
    let nonce = match network {
        Network::Mainnet => 2_083_236_893,
        Network::Testnet => 414_098_458,
    };

    let pubkey = hex::decode(GENESIS_PUBKEY).expect("hard-coded key decodes");
    // <pubkey> OP_CHECKSIG
    let mut script_pubkey = Vec::with_capacity(pubkey.len() + 2);
    script_pubkey.push(pubkey.len() as u8);
    script_pubkey.extend_from_slice(&pubkey);
    script_pubkey.push(0xAC);

    let coinbase = Transaction::new(
        1,
        vec![Input {
            previous_output: OutPoint::NULL,
            script_sig: Script(GENESIS_COINBASE_DATA.to_vec()),
            sequence: SEQUENCE_FINAL,
        }],
        vec![Output {
            value: Amount::from_units(INITIAL_SUBSIDY).expect("subsidy is below MAX_MONEY"),
            script_pubkey: Script(script_pubkey),
        }],
        LockTime(0),
    );

    let merkle_root: merkle::Root = std::iter::once(coinbase.hash()).collect();

    Block {
        header: Header::new(
            1,
            GENESIS_PREVIOUS_BLOCK_HASH,
            merkle_root,
            GENESIS_TIME,
            network.max_target_bits(),
            nonce,
        ),
        transactions: vec![Arc::new(coinbase)],
    }
}

/// Returns the pinned hash of the genesis block for `network`.
pub fn genesis_hash(network: Network) -> block::Hash {
    genesis_block(network).hash()
}
