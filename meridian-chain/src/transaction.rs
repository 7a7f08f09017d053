//! Transactions and transaction-related structures.

use crate::MeridianSerialize;
use crate::{cached::Cached, compactint::CompactInt};
use meridian_serde_derive::MrdSerialize;

mod hash;
mod lock_time;
mod serialize;
mod sighash;

pub use hash::Hash;
pub use lock_time::{LockTime, LOCKTIME_THRESHOLD};
pub use serialize::MAX_TX_BYTES;
pub use sighash::{SighashError, SIGHASH_ALL};

use crate::block::Height;
use crate::transparent;

/// A Meridian transaction.
///
/// A transaction consumes previously created outputs and creates new ones,
/// conserving value except for the miner fee. Its identity is the SHA-256d
/// hash of its canonical serialization.
#[derive(Clone, Debug, PartialEq, Eq, MrdSerialize)]
pub struct Transaction {
    /// The transaction format version; only versions 1 and 2 are valid.
    pub version: u32,
    /// The transaction inputs.
    pub inputs: Vec<transparent::Input>,
    /// The transaction outputs.
    pub outputs: Vec<transparent::Output>,
    /// Earliest height or time this transaction may be mined at.
    pub lock_time: LockTime,
    hash: Cached<Hash>,
}

impl Transaction {
    pub fn new(
        version: u32,
        inputs: Vec<transparent::Input>,
        outputs: Vec<transparent::Output>,
        lock_time: LockTime,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: Cached::new(),
        }
    }

    /// Get the txid of this transaction.
    pub fn hash(&self) -> Hash {
        // If we have a cached version, just return that.
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        // Otherwise, serialize the tx to calculate the hash.
        Hash::from(self)
    }

    /// Returns `true` if this transaction is a coinbase transaction: a
    /// single input spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Returns `true` if any input spends the null outpoint. Only valid in
    /// the coinbase position.
    pub fn contains_null_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| input.previous_output.is_null())
    }

    /// Whether this transaction may be mined into a block at `height` with
    /// timestamp `block_time`.
    pub fn is_final_at(&self, height: Height, block_time: u64) -> bool {
        let lock = self.lock_time.0;
        if lock == 0 {
            return true;
        }
        if lock < LOCKTIME_THRESHOLD {
            if u64::from(lock) <= u64::from(height.0) {
                return true;
            }
        } else if u64::from(lock) <= block_time {
            return true;
        }
        // A past-locked transaction is still final if every input opted out
        // of the lock by using the final sequence number.
        self.inputs
            .iter()
            .all(|input| input.sequence == transparent::SEQUENCE_FINAL)
    }

    /// Returns the length of this transaction's canonical serialization, in
    /// bytes.
    pub fn serialized_size(&self) -> usize {
        let mut size = 4 + CompactInt::size(self.inputs.len());
        for input in self.inputs.iter() {
            size += input.serialized_size();
        }
        size += CompactInt::size(self.outputs.len());
        for output in self.outputs.iter() {
            size += output.serialized_size();
        }
        size + 4
    }
}
