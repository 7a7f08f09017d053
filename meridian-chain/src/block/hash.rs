use std::{fmt, io};

use crate::serialization::{sha256d, MeridianDeserialize, MeridianSerialize, SerializationError};
use meridian_serde_derive::MrdSerialize;

use super::Header;

/// A hash of a block, used to identify blocks and link them into a chain.
///
/// Technically this is the SHA-256d hash of the block *header*, but since
/// the header commits to the Merkle root of the transactions, it binds the
/// entire block contents.
///
/// Note: Meridian displays block and transaction hashes in big-endian byte
/// order, following the u256 convention set by Bitcoin.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, MrdSerialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub fn from_bytes_exact(bytes: [u8; 32]) -> Hash {
        Hash(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.write_str(&hex::encode(&reversed_bytes))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("block::Hash")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl MeridianDeserialize for Hash {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Hash(<[u8; 32]>::mrd_deserialize(&mut reader)?))
    }
}

impl<'a> From<&'a Header> for Hash {
    fn from(header: &'a Header) -> Self {
        let mut hash_writer = sha256d::Writer::default();
        header
            .mrd_serialize(&mut hash_writer)
            .expect("sha256d::Writer is infallible");
        Self(hash_writer.finish())
    }
}

impl std::str::FromStr for Hash {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
            Err(SerializationError::Parse("hex decoding error"))
        } else {
            bytes.reverse();
            Ok(Hash(bytes))
        }
    }
}
