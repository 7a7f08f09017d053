use std::io;

use crate::serialization::sha256d;
use crate::work::difficulty::CompactDifficulty;
use crate::{cached::Cached, MeridianDeserialize, MeridianSerialize, SerializationError};
use meridian_serde_derive::MrdSerialize;

use super::{merkle, Hash};

/// A block header, containing metadata about a block.
///
/// Blocks are chained together via the previous-header hash: each block
/// points backwards to its parent, all the way back to the genesis block.
///
/// Unlike Bitcoin's 80-byte header, `time` and `nonce` are 64-bit, giving a
/// fixed 88-byte serialization. This is consensus-critical.
#[derive(Clone, Copy, Debug, Eq, PartialEq, MrdSerialize)]
pub struct Header {
    /// The block's version field.
    pub version: u32,

    /// The hash of the previous block, linking this block into the chain.
    pub previous_block_hash: Hash,

    /// The root of the transaction Merkle tree, binding the header to the
    /// transactions in the block.
    pub merkle_root: merkle::Root,

    /// Unix epoch seconds (UTC) when the miner started hashing the header,
    /// according to the miner.
    pub time: u64,

    /// The difficulty threshold this header's hash must meet, in compact
    /// form. For a block at height `h`, `bits` must equal the retarget
    /// schedule's expected value at `h`.
    pub bits: CompactDifficulty,

    /// An arbitrary field miners change to search for a hash at or below
    /// the target threshold.
    pub nonce: u64,

    /// The hash of this header, cached after it is first computed.
    /// Not part of the consensus serialization.
    hash: Cached<Hash>,
}

impl Header {
    /// Length of the serialized header in bytes.
    pub const fn len() -> usize {
        88
    }

    pub fn new(
        version: u32,
        previous_block_hash: Hash,
        merkle_root: merkle::Root,
        time: u64,
        bits: CompactDifficulty,
        nonce: u64,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            bits,
            nonce,
            hash: Cached::new(),
        }
    }

    /// The hash of this header, computed on first use.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Replace the nonce, invalidating the cached hash. Used by the miner's
    /// search loop.
    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
        self.hash = Cached::new();
    }
}

impl MeridianDeserialize for Header {
    /// Deserializes a header, hashing the raw 88 bytes once so the hash
    /// cache is always populated on the receive path.
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut raw = [0u8; 88];
        reader.read_exact(&mut raw)?;

        let mut hash_writer = sha256d::Writer::default();
        io::Write::write_all(&mut hash_writer, &raw).expect("sha256d::Writer is infallible");
        let own_hash = Hash::from_bytes_exact(hash_writer.finish());

        let mut src = io::Cursor::new(&raw[..]);
        Ok(Header {
            version: u32::mrd_deserialize(&mut src)?,
            previous_block_hash: Hash::mrd_deserialize(&mut src)?,
            merkle_root: merkle::Root::mrd_deserialize(&mut src)?,
            time: u64::mrd_deserialize(&mut src)?,
            bits: CompactDifficulty::mrd_deserialize(&mut src)?,
            nonce: u64::mrd_deserialize(&mut src)?,
            hash: Cached::from(own_hash),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_header() -> Header {
        Header::new(
            1,
            Hash([0x11; 32]),
            merkle::Root([0x22; 32]),
            1735516800,
            CompactDifficulty(0x1d00ffff),
            0x0123456789abcdef,
        )
    }

    #[test]
    fn serialization_is_88_bytes() {
        meridian_test::init();

        let bytes = example_header().mrd_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), Header::len());
    }

    #[test]
    fn round_trip_populates_the_hash_cache() {
        meridian_test::init();

        let header = example_header();
        let bytes = header.mrd_serialize_to_vec().unwrap();
        let parsed = Header::mrd_deserialize(&bytes[..]).unwrap();

        assert_eq!(parsed, header);
        assert_eq!(parsed.hash(), header.hash());
    }

    #[test]
    fn set_nonce_invalidates_the_cached_hash() {
        meridian_test::init();

        let bytes = example_header().mrd_serialize_to_vec().unwrap();
        let mut parsed = Header::mrd_deserialize(&bytes[..]).unwrap();

        let before = parsed.hash();
        parsed.set_nonce(parsed.nonce + 1);
        assert_ne!(parsed.hash(), before);
    }
}
