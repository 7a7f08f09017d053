//! Consensus check functions.
//!
//! Each rule is its own function returning `Ok(())` or its typed reason,
//! so callers can compose exactly the checks a context needs. The cheap,
//! stateless checks run on every block and transaction as they arrive;
//! the contextual checks need the UTXO view the data would connect onto.

use std::collections::HashSet;

use meridian_chain::amount::Amount;
use meridian_chain::block::{Block, Height, Header, MAX_BLOCK_BYTES};
use meridian_chain::parameters::{
    Network, COINBASE_SCRIPT_BOUNDS, MAX_BLOCK_SIGOPS, MAX_FUTURE_DRIFT,
};
use meridian_chain::transaction::{Transaction, MAX_TX_BYTES};
use meridian_script::{sigop_count, verify_script};
use meridian_state::UtxoSet;

use crate::error::{BlockError, TransactionError};

// ---- context-free transaction checks ----

/// Returns `Ok(())` if the transaction has at least one input and one
/// output.
pub fn has_inputs_and_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        Err(TransactionError::NoInputs)
    } else if tx.outputs.is_empty() {
        Err(TransactionError::NoOutputs)
    } else {
        Ok(())
    }
}

/// Returns `Ok(())` if the version is one this network understands.
pub fn version_is_supported(tx: &Transaction) -> Result<(), TransactionError> {
    match tx.version {
        1 | 2 => Ok(()),
        other => Err(TransactionError::BadVersion(other)),
    }
}

/// Returns `Ok(())` if no outpoint is spent twice within the transaction.
pub fn no_duplicate_inputs(tx: &Transaction) -> Result<(), TransactionError> {
    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in tx.inputs.iter() {
        if !seen.insert(input.previous_output) {
            return Err(TransactionError::DuplicateInput(input.previous_output));
        }
    }
    Ok(())
}

/// Returns `Ok(())` if the output sum stays inside the money range.
///
/// Individual outputs cannot exceed `MAX_MONEY` by construction, so only
/// the sum needs checking here.
pub fn output_sum_in_range(tx: &Transaction) -> Result<(), TransactionError> {
    Amount::sum(tx.outputs.iter().map(|output| output.value))
        .map(|_| ())
        .map_err(|_| TransactionError::Overflow)
}

/// Returns `Ok(())` if coinbase-ness is well-formed: a coinbase carries
/// bounded free data, anything else must not touch the null outpoint.
pub fn coinbase_shape(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.is_coinbase() {
        let len = tx.inputs[0].script_sig.0.len();
        let (min, max) = COINBASE_SCRIPT_BOUNDS;
        if len < min || len > max {
            return Err(TransactionError::BadCoinbaseScriptLength(len));
        }
    } else if tx.contains_null_input() {
        return Err(TransactionError::NullInput);
    }
    Ok(())
}

/// Returns `Ok(())` if the serialized transaction fits in a block.
pub fn tx_size_is_bounded(tx: &Transaction) -> Result<(), TransactionError> {
    let size = tx.serialized_size() as u64;
    if size > MAX_TX_BYTES {
        return Err(TransactionError::TxTooLarge(MAX_TX_BYTES));
    }
    Ok(())
}

/// All context-free transaction checks.
pub fn transaction(tx: &Transaction) -> Result<(), TransactionError> {
    has_inputs_and_outputs(tx)?;
    version_is_supported(tx)?;
    no_duplicate_inputs(tx)?;
    output_sum_in_range(tx)?;
    coinbase_shape(tx)?;
    tx_size_is_bounded(tx)
}

// ---- contextual transaction checks ----

/// Returns `Ok(())` if the transaction is final when mined at `height`
/// with block timestamp `block_time`.
pub fn is_final(
    tx: &Transaction,
    height: Height,
    block_time: u64,
) -> Result<(), TransactionError> {
    if tx.is_final_at(height, block_time) {
        Ok(())
    } else {
        Err(TransactionError::NonFinalTx)
    }
}

/// Returns `Ok(())` if every input's unlock script satisfies the lock
/// script of the output it spends, as found in `utxos`.
pub fn scripts_verify(tx: &Transaction, utxos: &UtxoSet) -> Result<(), TransactionError> {
    for (index, input) in tx.inputs.iter().enumerate() {
        let entry = utxos
            .get(&input.previous_output)
            .ok_or(meridian_state::UtxoError::MissingInput(
                input.previous_output,
            ))?;
        verify_script(
            &input.script_sig.0,
            &entry.output.script_pubkey.0,
            tx,
            index,
        )
        .map_err(|error| TransactionError::BadSignature { input: index, error })?;
    }
    Ok(())
}

/// The full contextual validation of one non-coinbase transaction against
/// a UTXO view: spendability, maturity, value conservation, scripts, and
/// finality.
///
/// Value and maturity rules are enforced by applying to a scratch clone of
/// the view, which also reports the fee.
pub fn contextual_transaction(
    tx: &Transaction,
    utxos: &UtxoSet,
    height: Height,
    block_time: u64,
) -> Result<Amount, TransactionError> {
    is_final(tx, height, block_time)?;
    scripts_verify(tx, utxos)?;
    let mut scratch = utxos.clone();
    Ok(scratch.apply_tx(tx, height)?)
}

// ---- block checks ----

/// Returns `Ok(())` if there is exactly one coinbase transaction in the
/// block, and it is the first transaction.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block.transactions.get(0).ok_or(BlockError::NoTransactions)?;
    if !first.is_coinbase() {
        return Err(BlockError::CoinbasePosition);
    }
    let mut rest = block.transactions.iter().skip(1);
    if rest.any(|tx| tx.contains_null_input()) {
        return Err(BlockError::ExtraCoinbase);
    }
    Ok(())
}

/// Returns `Ok(())` if `header`'s hash meets its own difficulty target,
/// and that target is valid and within the network limit.
///
/// Note: the comparisons here are 256-bit integer comparisons; greater
/// values represent *less* work.
pub fn difficulty_is_valid(header: &Header, network: Network) -> Result<(), BlockError> {
    let threshold = header
        .bits
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty)?;

    if threshold > network.max_target() {
        return Err(BlockError::InvalidDifficulty);
    }

    if header.hash() > threshold {
        return Err(BlockError::BadPoW);
    }

    Ok(())
}

/// Returns `Ok(())` if `time` moves strictly forward from the parent and
/// does not lead local time by more than the allowed drift.
///
/// The future bound is non-deterministic by nature: a block rejected now
/// may be accepted later.
pub fn time_is_valid(time: u64, prev_time: u64, now: u64) -> Result<(), BlockError> {
    if time <= prev_time {
        return Err(BlockError::TimeTooOld);
    }
    if time > now + MAX_FUTURE_DRIFT {
        return Err(BlockError::TimeTooNew);
    }
    Ok(())
}

/// Returns `Ok(())` if the header's merkle root commits to exactly the
/// block's transactions and no txid repeats.
///
/// The duplication rule of the tree makes some distinct transaction lists
/// collide; rejecting duplicate txids closes that gap.
pub fn merkle_root_is_valid(block: &Block) -> Result<(), BlockError> {
    let actual = block.merkle_root();
    if actual != block.header.merkle_root {
        return Err(BlockError::BadMerkleRoot {
            actual,
            expected: block.header.merkle_root,
        });
    }

    let unique: HashSet<_> = block.transactions.iter().map(|tx| tx.hash()).collect();
    if unique.len() != block.transactions.len() {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}

/// Returns `Ok(())` if the block fits the serialized-size cap.
pub fn block_size_is_bounded(block: &Block) -> Result<(), BlockError> {
    if block.serialized_size() as u64 > MAX_BLOCK_BYTES {
        return Err(BlockError::BlockTooLarge(MAX_BLOCK_BYTES));
    }
    Ok(())
}

/// Returns `Ok(())` if the aggregate signature-operation count is under
/// the cap.
pub fn sigops_are_bounded(block: &Block) -> Result<(), BlockError> {
    let mut count: u64 = 0;
    for tx in block.transactions.iter() {
        for input in tx.inputs.iter() {
            count += sigop_count(&input.script_sig);
        }
        for output in tx.outputs.iter() {
            count += sigop_count(&output.script_pubkey);
        }
    }
    if count > MAX_BLOCK_SIGOPS {
        return Err(BlockError::TooManySigOps {
            count,
            max: MAX_BLOCK_SIGOPS,
        });
    }
    Ok(())
}

/// All context-free block checks, including the per-transaction ones.
pub fn block(block: &Block, network: Network) -> Result<(), BlockError> {
    difficulty_is_valid(&block.header, network)?;
    coinbase_is_first(block)?;
    merkle_root_is_valid(block)?;
    block_size_is_bounded(block)?;
    sigops_are_bounded(block)?;
    for tx in block.transactions.iter() {
        transaction(tx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_chain::amount::COIN;
    use meridian_chain::transaction::LockTime;
    use meridian_chain::transparent::{Input, OutPoint, Output, Script, SEQUENCE_FINAL};

    fn valid_tx() -> Transaction {
        Transaction::new(
            1,
            vec![Input {
                previous_output: OutPoint {
                    hash: meridian_chain::transaction::Hash([1; 32]),
                    index: 0,
                },
                script_sig: Script(vec![]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::from_units(COIN).unwrap(),
                script_pubkey: Script(vec![0x51]),
            }],
            LockTime(0),
        )
    }

    #[test]
    fn empty_sides_are_rejected() {
        meridian_test::init();

        let mut tx = valid_tx();
        tx.inputs.clear();
        assert_eq!(transaction(&tx), Err(TransactionError::NoInputs));

        let mut tx = valid_tx();
        tx.outputs.clear();
        assert_eq!(transaction(&tx), Err(TransactionError::NoOutputs));
    }

    #[test]
    fn versions_outside_one_and_two_are_rejected() {
        meridian_test::init();

        let mut tx = valid_tx();
        tx.version = 3;
        assert_eq!(transaction(&tx), Err(TransactionError::BadVersion(3)));
    }

    #[test]
    fn duplicate_outpoints_are_rejected() {
        meridian_test::init();

        let mut tx = valid_tx();
        let dup = tx.inputs[0].clone();
        tx.inputs.push(dup);
        assert!(matches!(
            transaction(&tx),
            Err(TransactionError::DuplicateInput(_))
        ));
    }

    #[test]
    fn null_input_outside_coinbase_is_rejected() {
        meridian_test::init();

        let mut tx = valid_tx();
        tx.inputs.push(Input {
            previous_output: OutPoint::NULL,
            script_sig: Script(vec![0, 0]),
            sequence: SEQUENCE_FINAL,
        });
        assert_eq!(transaction(&tx), Err(TransactionError::NullInput));
    }

    #[test]
    fn coinbase_script_bounds_are_inclusive() {
        meridian_test::init();

        let coinbase = |len: usize| {
            Transaction::new(
                1,
                vec![Input {
                    previous_output: OutPoint::NULL,
                    script_sig: Script(vec![0xAB; len]),
                    sequence: SEQUENCE_FINAL,
                }],
                vec![Output {
                    value: Amount::from_units(COIN).unwrap(),
                    script_pubkey: Script(vec![0x51]),
                }],
                LockTime(0),
            )
        };

        assert!(transaction(&coinbase(2)).is_ok());
        assert!(transaction(&coinbase(100)).is_ok());
        assert_eq!(
            transaction(&coinbase(1)),
            Err(TransactionError::BadCoinbaseScriptLength(1))
        );
        assert_eq!(
            transaction(&coinbase(101)),
            Err(TransactionError::BadCoinbaseScriptLength(101))
        );
    }

    #[test]
    fn block_time_window() {
        meridian_test::init();

        let now = 1_000_000;
        assert!(time_is_valid(500_001, 500_000, now).is_ok());
        assert_eq!(
            time_is_valid(500_000, 500_000, now),
            Err(BlockError::TimeTooOld)
        );
        assert!(time_is_valid(now + MAX_FUTURE_DRIFT, 0, now).is_ok());
        assert_eq!(
            time_is_valid(now + MAX_FUTURE_DRIFT + 1, 0, now),
            Err(BlockError::TimeTooNew)
        );
    }
}
