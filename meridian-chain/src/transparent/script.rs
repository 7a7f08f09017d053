use crate::{
    compactint::CompactInt,
    serialization::{MeridianDeserialize, MeridianSerialize, SerializationError},
};
use std::{
    fmt,
    io::{self, Read},
};

/// An encoding of a Meridian script.
///
/// This type carries raw script bytes; parsing and evaluation live in the
/// script interpreter crate.
#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Script")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl MeridianSerialize for Script {
    fn mrd_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        CompactInt::from(self.0.len()).mrd_serialize(&mut writer)?;
        writer.write_all(&self.0[..])?;
        Ok(())
    }
}

impl MeridianDeserialize for Script {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let len = CompactInt::mrd_deserialize(&mut reader)?.value();
        // Scripts are embedded in size-limited transactions, but an
        // attacker-controlled prefix must still not drive allocation.
        if len > crate::block::MAX_BLOCK_BYTES {
            return Err(SerializationError::OversizedArray {
                len,
                max: crate::block::MAX_BLOCK_BYTES,
            });
        }
        let mut bytes = Vec::with_capacity(std::cmp::min(len, 1024) as usize);
        reader.take(len).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != len {
            return Err(SerializationError::Truncated);
        }
        Ok(Script(bytes))
    }
}
