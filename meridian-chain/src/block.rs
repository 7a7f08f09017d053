//! Blocks and block-related structures (heights, headers, merkle trees).

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;

use std::{fmt, sync::Arc};

use crate::compactint::CompactInt;
use crate::transaction::Transaction;
use crate::MeridianSerialize;
use meridian_serde_derive::MrdSerialize;

pub use hash::Hash;
pub use header::Header;
pub use height::Height;
pub use serialize::MAX_BLOCK_BYTES;

/// A Meridian block, containing a header and a list of transactions.
#[derive(Clone, Debug, Eq, PartialEq, MrdSerialize)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions, coinbase first.
    pub transactions: Vec<Arc<Transaction>>,
}

impl Block {
    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// The merkle root of this block's transactions.
    ///
    /// Validation compares this against `header.merkle_root`; they differ
    /// for blocks that are malformed or in transit from a miner that hasn't
    /// finalized the header yet.
    pub fn merkle_root(&self) -> merkle::Root {
        self.transactions.iter().map(|tx| tx.hash()).collect()
    }

    /// The length of this block in the canonical serialization, in bytes.
    pub fn serialized_size(&self) -> usize {
        Header::len()
            + CompactInt::size(self.transactions.len())
            + self
                .transactions
                .iter()
                .map(|tx| tx.serialized_size())
                .sum::<usize>()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("hash", &self.hash())
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        block.header.hash()
    }
}
