//! The typed consensus failure taxonomy.
//!
//! Every rejection carries the rule that fired. Failures of consensus
//! rules penalize the peer that offered the data; transient context gaps
//! (an unknown parent) are not errors here at all — they surface as the
//! `Orphan` acceptance outcome.

use thiserror::Error;

use meridian_chain::transparent::OutPoint;
use meridian_chain::work::difficulty::CompactDifficulty;
use meridian_script::ScriptError;
use meridian_state::{MempoolError, UtxoError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("transaction has no outputs")]
    NoOutputs,
    #[error("unsupported transaction version {0}")]
    BadVersion(u32),
    #[error("duplicate input {0:?}")]
    DuplicateInput(OutPoint),
    #[error("null outpoint in a non-coinbase transaction")]
    NullInput,
    #[error("coinbase script length {0} outside the valid range")]
    BadCoinbaseScriptLength(usize),
    #[error("transaction exceeds {0} bytes")]
    TxTooLarge(u64),
    #[error("output value sum out of range")]
    Overflow,
    #[error("transaction is not final at this height and time")]
    NonFinalTx,
    #[error("script verification failed on input {input}: {error}")]
    BadSignature { input: usize, error: ScriptError },
    #[error(transparent)]
    Utxo(#[from] UtxoError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block has no transactions")]
    NoTransactions,
    #[error("first transaction is not a coinbase")]
    CoinbasePosition,
    #[error("coinbase found outside the first position")]
    ExtraCoinbase,
    #[error("block contains duplicate transactions")]
    DuplicateTransaction,
    #[error("merkle root {actual:?} does not commit to the block's transactions ({expected:?} expected)")]
    BadMerkleRoot {
        actual: meridian_chain::block::merkle::Root,
        expected: meridian_chain::block::merkle::Root,
    },
    #[error("block exceeds {0} bytes")]
    BlockTooLarge(u64),
    #[error("block has {count} signature operations, over the cap of {max}")]
    TooManySigOps { count: u64, max: u64 },
    #[error("difficulty bits do not encode a valid target")]
    InvalidDifficulty,
    #[error("header hash does not meet its difficulty target")]
    BadPoW,
    #[error("wrong difficulty: expected {expected:?}, got {actual:?}")]
    BadDifficulty {
        expected: CompactDifficulty,
        actual: CompactDifficulty,
    },
    #[error("timestamp is not after the previous block")]
    TimeTooOld,
    #[error("timestamp is too far in the future")]
    TimeTooNew,
    #[error("block is marked invalid by a failed reorganization")]
    KnownInvalid,
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Utxo(#[from] UtxoError),
}

/// Rejections from transaction submission: consensus failures penalize the
/// source peer, pool-policy failures do not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Mempool(#[from] MempoolError),
}

impl SubmitError {
    /// Whether the offering peer should have its misbehavior score raised.
    pub fn is_misbehavior(&self) -> bool {
        match self {
            SubmitError::Transaction(_) => true,
            // Conflicts, fee policy, and capacity are this node's local
            // policy, not the peer's fault. A missing input is a context
            // gap, also unpenalized.
            SubmitError::Mempool(MempoolError::Utxo(UtxoError::MissingInput(_))) => false,
            SubmitError::Mempool(MempoolError::Utxo(_)) => true,
            SubmitError::Mempool(_) => false,
        }
    }
}
