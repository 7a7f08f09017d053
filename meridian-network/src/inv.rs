//! Inventory items: typed hashes advertising or requesting data.

use std::io::{Read, Write};

use meridian_chain::{
    block, transaction, MeridianDeserialize, MeridianSerialize, SerializationError,
};

/// An inventory hash which refers to some advertised or requested data.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InventoryHash {
    /// A placeholder; data with this code is ignored.
    Error,
    /// The hash of a transaction.
    Tx(transaction::Hash),
    /// The hash of a block.
    Block(block::Hash),
}

impl From<transaction::Hash> for InventoryHash {
    fn from(hash: transaction::Hash) -> InventoryHash {
        InventoryHash::Tx(hash)
    }
}

impl From<block::Hash> for InventoryHash {
    fn from(hash: block::Hash) -> InventoryHash {
        InventoryHash::Block(hash)
    }
}

impl MeridianSerialize for InventoryHash {
    fn mrd_serialize<W: Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        let (code, bytes) = match *self {
            InventoryHash::Error => (0u32, [0; 32]),
            InventoryHash::Tx(hash) => (1, hash.0),
            InventoryHash::Block(hash) => (2, hash.0),
        };
        code.mrd_serialize(&mut writer)?;
        bytes.mrd_serialize(&mut writer)?;
        Ok(())
    }
}

impl MeridianDeserialize for InventoryHash {
    fn mrd_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let code = u32::mrd_deserialize(&mut reader)?;
        let bytes = <[u8; 32]>::mrd_deserialize(&mut reader)?;
        match code {
            0 => Ok(InventoryHash::Error),
            1 => Ok(InventoryHash::Tx(transaction::Hash(bytes))),
            2 => Ok(InventoryHash::Block(block::Hash(bytes))),
            _ => Err(SerializationError::Parse("invalid inventory code")),
        }
    }
}
