//! The unspent transaction output set, with apply/revert semantics for
//! chain reorganization.

use std::collections::HashMap;

use thiserror::Error;

use meridian_chain::amount::{Amount, AmountError};
use meridian_chain::block::{Block, Height};
use meridian_chain::parameters::COINBASE_MATURITY;
use meridian_chain::transaction::Transaction;
use meridian_chain::transparent::{OutPoint, Output};
use meridian_chain::{MeridianDeserialize, MeridianSerialize, SerializationError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UtxoError {
    #[error("input {0:?} is not an unspent output")]
    MissingInput(OutPoint),
    #[error("coinbase output {outpoint:?} from height {created:?} spent at {spent:?} before maturity")]
    ImmatureCoinbase {
        outpoint: OutPoint,
        created: Height,
        spent: Height,
    },
    #[error("transaction spends {input:?} but creates {output:?}")]
    Overspend { input: Amount, output: Amount },
    #[error("coinbase claims {claimed:?} but only {allowed:?} is available")]
    BadCoinbaseValue { claimed: Amount, allowed: Amount },
    #[error("amount arithmetic failed: {0}")]
    Amount(#[from] AmountError),
    #[error("output {0:?} already exists")]
    DoubleInsert(OutPoint),
    #[error("undo log does not match the block being reverted")]
    UndoMismatch,
}

/// One unspent output, with the context needed to validate a spend of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    /// The unspent output itself.
    pub output: Output,
    /// The height of the block that created it.
    pub height: Height,
    /// Whether it was created by a coinbase, and so subject to maturity.
    pub is_coinbase: bool,
}

/// The entries a block consumed, in consumption order, so the block can be
/// reverted during a reorganization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoLog {
    spent: Vec<(OutPoint, UtxoEntry)>,
}

impl UndoLog {
    pub fn len(&self) -> usize {
        self.spent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spent.is_empty()
    }
}

impl MeridianSerialize for UtxoEntry {
    fn mrd_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.output.mrd_serialize(&mut target)?;
        self.height.mrd_serialize(&mut target)?;
        self.is_coinbase.mrd_serialize(&mut target)
    }
}

impl MeridianDeserialize for UtxoEntry {
    fn mrd_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(UtxoEntry {
            output: Output::mrd_deserialize(&mut reader)?,
            height: Height::mrd_deserialize(&mut reader)?,
            is_coinbase: bool::mrd_deserialize(&mut reader)?,
        })
    }
}

impl MeridianSerialize for UndoLog {
    fn mrd_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.spent.mrd_serialize(target)
    }
}

impl MeridianDeserialize for UndoLog {
    fn mrd_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(UndoLog {
            spent: Vec::mrd_deserialize(reader)?,
        })
    }
}

/// The set of all unspent outputs on one chain.
///
/// The chain manager is the exclusive owner; every mutation happens under
/// its lock. Apply and revert are exact inverses: reverting a block
/// restores the byte-identical pre-apply state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: HashMap<OutPoint, UtxoEntry>,
}

impl UtxoSet {
    pub fn new() -> UtxoSet {
        UtxoSet::default()
    }

    /// Rebuild a set from stored entries.
    pub fn from_entries<I>(entries: I) -> UtxoSet
    where
        I: IntoIterator<Item = (OutPoint, UtxoEntry)>,
    {
        UtxoSet {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &UtxoEntry)> {
        self.entries.iter()
    }

    /// Whether a spend of `outpoint` at `height` satisfies coinbase
    /// maturity.
    pub fn is_mature(&self, outpoint: &OutPoint, height: Height) -> bool {
        match self.entries.get(outpoint) {
            Some(entry) if entry.is_coinbase => {
                height.0.saturating_sub(entry.height.0) >= COINBASE_MATURITY
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Apply one transaction at `height`, returning the fee it pays.
    ///
    /// Coinbase transactions consume nothing and pay no fee; all others
    /// must spend existing, mature outputs worth at least their output sum.
    pub fn apply_tx(&mut self, tx: &Transaction, height: Height) -> Result<Amount, UtxoError> {
        self.apply_tx_inner(tx, height, &mut UndoLog::default())
    }

    fn apply_tx_inner(
        &mut self,
        tx: &Transaction,
        height: Height,
        undo: &mut UndoLog,
    ) -> Result<Amount, UtxoError> {
        let is_coinbase = tx.is_coinbase();
        let mut input_value = Amount::ZERO;

        if !is_coinbase {
            // Check every input before consuming any, so a failed apply
            // leaves the set untouched.
            for input in tx.inputs.iter() {
                let outpoint = &input.previous_output;
                let entry = self
                    .entries
                    .get(outpoint)
                    .ok_or(UtxoError::MissingInput(*outpoint))?;
                if entry.is_coinbase && height.0.saturating_sub(entry.height.0) < COINBASE_MATURITY
                {
                    return Err(UtxoError::ImmatureCoinbase {
                        outpoint: *outpoint,
                        created: entry.height,
                        spent: height,
                    });
                }
                input_value = input_value.checked_add(entry.output.value)?;
            }
            for input in tx.inputs.iter() {
                let outpoint = input.previous_output;
                let entry = self
                    .entries
                    .remove(&outpoint)
                    .expect("inputs were checked above");
                undo.spent.push((outpoint, entry));
            }
        }

        let output_value = Amount::sum(tx.outputs.iter().map(|output| output.value))?;
        if !is_coinbase && output_value > input_value {
            return Err(UtxoError::Overspend {
                input: input_value,
                output: output_value,
            });
        }

        let txid = tx.hash();
        for (index, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint {
                hash: txid,
                index: index as u32,
            };
            if self
                .entries
                .insert(
                    outpoint,
                    UtxoEntry {
                        output: output.clone(),
                        height,
                        is_coinbase,
                    },
                )
                .is_some()
            {
                return Err(UtxoError::DoubleInsert(outpoint));
            }
        }

        if is_coinbase {
            Ok(Amount::ZERO)
        } else {
            Ok(input_value.checked_sub(output_value)?)
        }
    }

    /// Apply a whole block: the coinbase, then every other transaction in
    /// order. Returns the undo log and the fee total.
    ///
    /// `subsidy` is the block reward allowed at `height`; the coinbase may
    /// claim at most `subsidy + fees`. On any failure the set is restored
    /// to its pre-call state.
    pub fn apply_block(
        &mut self,
        block: &Block,
        height: Height,
        subsidy: Amount,
    ) -> Result<(UndoLog, Amount), UtxoError> {
        let snapshot = self.entries.clone();
        match self.apply_block_inner(block, height, subsidy) {
            Ok(result) => Ok(result),
            Err(error) => {
                self.entries = snapshot;
                Err(error)
            }
        }
    }

    fn apply_block_inner(
        &mut self,
        block: &Block,
        height: Height,
        subsidy: Amount,
    ) -> Result<(UndoLog, Amount), UtxoError> {
        let mut undo = UndoLog::default();
        let mut fees = Amount::ZERO;

        for tx in block.transactions.iter() {
            let fee = self.apply_tx_inner(tx, height, &mut undo)?;
            fees = fees.checked_add(fee)?;
        }

        // Re-check the coinbase now that the fee total is known.
        if let Some(coinbase) = block.transactions.first() {
            let claimed = Amount::sum(coinbase.outputs.iter().map(|output| output.value))?;
            let allowed = subsidy.checked_add(fees)?;
            if claimed > allowed {
                return Err(UtxoError::BadCoinbaseValue { claimed, allowed });
            }
        }

        Ok((undo, fees))
    }

    /// Undo a previously applied block: delete every output it created and
    /// restore every entry it consumed.
    pub fn revert_block(&mut self, block: &Block, undo: &UndoLog) -> Result<(), UtxoError> {
        for tx in block.transactions.iter() {
            let txid = tx.hash();
            for index in 0..tx.outputs.len() {
                let outpoint = OutPoint {
                    hash: txid,
                    index: index as u32,
                };
                if self.entries.remove(&outpoint).is_none() {
                    return Err(UtxoError::UndoMismatch);
                }
            }
        }

        for (outpoint, entry) in undo.spent.iter() {
            if self
                .entries
                .insert(*outpoint, entry.clone())
                .is_some()
            {
                return Err(UtxoError::DoubleInsert(*outpoint));
            }
        }

        Ok(())
    }
}
