use std::io::Read;

use crate::cached::Cached;
use crate::serialization::{MeridianDeserialize, SerializationError};
use crate::transparent;

use super::{LockTime, Transaction};

/// The maximum size of a serialized transaction: a transaction may fill a
/// whole block.
pub const MAX_TX_BYTES: u64 = crate::block::MAX_BLOCK_BYTES;

/// Deserializes a transaction, calculating and caching its txid.
impl MeridianDeserialize for Transaction {
    fn mrd_deserialize<R: Read>(src: R) -> Result<Self, SerializationError> {
        let mut src = src.take(MAX_TX_BYTES);

        let version = u32::mrd_deserialize(&mut src)?;
        let inputs = <Vec<transparent::Input>>::mrd_deserialize(&mut src)?;
        let outputs = <Vec<transparent::Output>>::mrd_deserialize(&mut src)?;
        let lock_time = LockTime::mrd_deserialize(&mut src)?;

        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: Cached::new(),
        };
        // Calculate and cache the txid.
        let own_hash = tx.hash();
        tx.hash = Cached::from(own_hash);
        Ok(tx)
    }
}
