//! Property tests for the canonical serialization and the compact-target
//! encoding.

use std::sync::Arc;

use proptest::prelude::*;

use meridian_chain::amount::{Amount, MAX_MONEY};
use meridian_chain::block::{merkle, Block, Header};
use meridian_chain::transaction::{Hash as TxHash, LockTime, Transaction};
use meridian_chain::transparent::{Input, OutPoint, Output, Script};
use meridian_chain::work::difficulty::{CompactDifficulty, ExpandedDifficulty};
use meridian_chain::{MeridianDeserialize, MeridianSerialize};
use primitive_types::U256;

fn arb_script() -> impl Strategy<Value = Script> {
    proptest::collection::vec(any::<u8>(), 0..64).prop_map(Script)
}

fn arb_outpoint() -> impl Strategy<Value = OutPoint> {
    (any::<[u8; 32]>(), any::<u32>()).prop_map(|(hash, index)| OutPoint {
        hash: TxHash(hash),
        index,
    })
}

fn arb_input() -> impl Strategy<Value = Input> {
    (arb_outpoint(), arb_script(), any::<u32>()).prop_map(|(previous_output, script_sig, sequence)| {
        Input {
            previous_output,
            script_sig,
            sequence,
        }
    })
}

fn arb_output() -> impl Strategy<Value = Output> {
    (0..=MAX_MONEY, arb_script()).prop_map(|(units, script_pubkey)| Output {
        value: Amount::from_units(units).expect("strategy stays in range"),
        script_pubkey,
    })
}

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (
        1..=2u32,
        proptest::collection::vec(arb_input(), 1..4),
        proptest::collection::vec(arb_output(), 1..4),
        any::<u32>(),
    )
        .prop_map(|(version, inputs, outputs, lock_time)| {
            Transaction::new(version, inputs, outputs, LockTime(lock_time))
        })
}

fn arb_header() -> impl Strategy<Value = Header> {
    (
        any::<u32>(),
        any::<[u8; 32]>(),
        any::<[u8; 32]>(),
        any::<u64>(),
        any::<u32>(),
        any::<u64>(),
    )
        .prop_map(|(version, prev, root, time, bits, nonce)| {
            Header::new(
                version,
                meridian_chain::block::Hash(prev),
                merkle::Root(root),
                time,
                CompactDifficulty(bits),
                nonce,
            )
        })
}

fn arb_block() -> impl Strategy<Value = Block> {
    (arb_header(), proptest::collection::vec(arb_transaction(), 1..3)).prop_map(
        |(header, transactions)| Block {
            header,
            transactions: transactions.into_iter().map(Arc::new).collect(),
        },
    )
}

proptest! {
    /// `decode(encode(tx))` is byte-exact, and txids track encodings.
    #[test]
    fn transaction_round_trip(tx in arb_transaction()) {
        meridian_test::init();

        let bytes = tx.mrd_serialize_to_vec().unwrap();
        prop_assert_eq!(bytes.len(), tx.serialized_size());

        let parsed = Transaction::mrd_deserialize(&bytes[..]).unwrap();
        prop_assert_eq!(&parsed, &tx);
        prop_assert_eq!(parsed.hash(), tx.hash());
        prop_assert_eq!(parsed.mrd_serialize_to_vec().unwrap(), bytes);
    }

    /// Distinct canonical encodings imply distinct txids.
    #[test]
    fn txid_matches_encoding_equality(a in arb_transaction(), b in arb_transaction()) {
        meridian_test::init();

        let bytes_a = a.mrd_serialize_to_vec().unwrap();
        let bytes_b = b.mrd_serialize_to_vec().unwrap();
        prop_assert_eq!(bytes_a == bytes_b, a.hash() == b.hash());
    }

    /// Headers are a fixed 88 bytes and survive the round trip.
    #[test]
    fn header_round_trip(header in arb_header()) {
        meridian_test::init();

        let bytes = header.mrd_serialize_to_vec().unwrap();
        prop_assert_eq!(bytes.len(), Header::len());

        let parsed = Header::mrd_deserialize(&bytes[..]).unwrap();
        prop_assert_eq!(parsed, header);
        prop_assert_eq!(parsed.hash(), header.hash());
    }

    #[test]
    fn block_round_trip(block in arb_block()) {
        meridian_test::init();

        let bytes = block.mrd_serialize_to_vec().unwrap();
        prop_assert_eq!(bytes.len(), block.serialized_size());

        let parsed = Block::mrd_deserialize(&bytes[..]).unwrap();
        prop_assert_eq!(&parsed, &block);
        prop_assert_eq!(parsed.hash(), block.hash());
    }

    /// Valid, minimally encoded compact values survive expansion.
    #[test]
    fn compact_round_trip(exponent in 3u32..=32, mantissa in 0x008000u32..=0x7fffff) {
        meridian_test::init();

        let compact = CompactDifficulty((exponent << 24) | mantissa);
        let expanded = compact.to_expanded().expect("in-range compacts expand");
        prop_assert_eq!(expanded.to_compact(), compact);
    }

    /// Encoding is lossy only downward: the re-expanded target never
    /// exceeds the original.
    #[test]
    fn compact_encoding_never_rounds_up(bytes in any::<[u8; 32]>()) {
        meridian_test::init();

        let target = ExpandedDifficulty::from_u256(U256::from_big_endian(&bytes));
        let reencoded = target.to_compact().to_expanded();

        if let Some(reencoded) = reencoded {
            prop_assert!(reencoded <= target);
        }
    }
}
