use std::{io::Read, sync::Arc};

use crate::compactint::CompactInt;
use crate::serialization::{MeridianDeserialize, SerializationError};
use crate::transaction::Transaction;

use super::{Block, Header};

/// The maximum size of a serialized block, in bytes.
pub const MAX_BLOCK_BYTES: u64 = 1_000_000;

/// The smallest possible serialized transaction: a coinbase with a 2-byte
/// script and one empty output. Used to bound the claimed tx count.
const MIN_TX_BYTES: u64 = 60;

impl MeridianDeserialize for Block {
    fn mrd_deserialize<R: Read>(reader: R) -> Result<Self, SerializationError> {
        // A reader limit turns an oversized block into a Truncated error
        // before it can allocate unbounded memory.
        let mut src = reader.take(MAX_BLOCK_BYTES);

        let header = Header::mrd_deserialize(&mut src)?;

        let tx_count = CompactInt::mrd_deserialize(&mut src)?.value();
        let max = MAX_BLOCK_BYTES / MIN_TX_BYTES;
        if tx_count > max {
            return Err(SerializationError::OversizedArray { len: tx_count, max });
        }

        let mut transactions = Vec::with_capacity(std::cmp::min(tx_count, 1024) as usize);
        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::mrd_deserialize(&mut src)?);
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}
