use std::{fmt, io};

use crate::serialization::{sha256d, MeridianDeserialize, MeridianSerialize, SerializationError};
use meridian_serde_derive::MrdSerialize;

use super::Transaction;

/// A transaction id: the SHA-256d hash of the transaction's canonical
/// serialization. Two transactions are equal exactly when their txids are.
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, MrdSerialize)]
pub struct Hash(pub [u8; 32]);

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
        f.debug_tuple("transaction::Hash")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl<'a> From<&'a Transaction> for Hash {
    fn from(transaction: &'a Transaction) -> Self {
        let mut hash_writer = sha256d::Writer::default();
        transaction
            .mrd_serialize(&mut hash_writer)
            .expect("sha256d::Writer is infallible");
        Self(hash_writer.finish())
    }
}

impl MeridianDeserialize for Hash {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Hash(<[u8; 32]>::mrd_deserialize(&mut reader)?))
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
