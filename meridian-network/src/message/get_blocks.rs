use meridian_chain::{block, MeridianDeserialize, MeridianSerialize, SerializationError};

/// A `getblocks` (or `getheaders`) request body: the sender's block
/// locator plus an optional stop hash.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GetBlocks {
    /// The sender's best known block hashes, newest first, with geometric
    /// backoff. The receiver replies starting after the first hash it
    /// recognizes on its main chain.
    pub locator: Vec<block::Hash>,
    /// The last hash to send, or `None` (all-zero on the wire) for "as
    /// many as allowed".
    pub stop_hash: Option<block::Hash>,
}

impl MeridianDeserialize for GetBlocks {
    fn mrd_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let locator = Vec::mrd_deserialize(&mut reader)?;
        let raw_stop_hash = block::Hash::mrd_deserialize(&mut reader)?;
        let stop_hash = if raw_stop_hash.0 == [0u8; 32] {
            None
        } else {
            Some(raw_stop_hash)
        };
        Ok(GetBlocks { locator, stop_hash })
    }
}

impl MeridianSerialize for GetBlocks {
    fn mrd_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.locator.mrd_serialize(&mut target)?;
        match self.stop_hash {
            Some(hash) => hash.mrd_serialize(&mut target),
            None => [0u8; 32].mrd_serialize(&mut target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stop_hash_means_none() {
        meridian_test::init();

        let request = GetBlocks {
            locator: vec![block::Hash([1; 32]), block::Hash([2; 32])],
            stop_hash: None,
        };
        let bytes = request.mrd_serialize_to_vec().unwrap();
        assert_eq!(GetBlocks::mrd_deserialize(&bytes[..]).unwrap(), request);

        let request = GetBlocks {
            locator: vec![block::Hash([1; 32])],
            stop_hash: Some(block::Hash([9; 32])),
        };
        let bytes = request.mrd_serialize_to_vec().unwrap();
        assert_eq!(GetBlocks::mrd_deserialize(&bytes[..]).unwrap(), request);
    }
}
