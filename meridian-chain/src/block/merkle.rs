//! The transaction Merkle tree committed to by each block header.

use std::{fmt, io, iter::FromIterator};

use crate::primitives::sha256d;
use crate::serialization::{MeridianDeserialize, MeridianSerialize, SerializationError};
use crate::transaction;
use meridian_serde_derive::MrdSerialize;

/// The root of the transaction Merkle tree.
///
/// Built with the Bitcoin rule: hash pairs of nodes with SHA-256d,
/// duplicating the last node when a level has odd cardinality; the root of
/// a single leaf is the leaf itself.
///
/// Because of the duplication rule, distinct transaction lists can produce
/// the same root (CVE-2012-2459 in Bitcoin); validation therefore also
/// rejects blocks with duplicate txids.
#[derive(Copy, Clone, Eq, PartialEq, Hash, MrdSerialize)]
pub struct Root(pub [u8; 32]);

impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = transaction::Hash>,
    {
        let mut level: Vec<[u8; 32]> = hashes.into_iter().map(|hash| hash.0).collect();
        if level.is_empty() {
            return Root([0u8; 32]);
        }

        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| {
                    let mut preimage = [0u8; 64];
                    preimage[..32].copy_from_slice(&pair[0]);
                    // Odd levels duplicate their last node.
                    preimage[32..].copy_from_slice(pair.get(1).unwrap_or(&pair[0]));
                    sha256d(&preimage)
                })
                .collect();
        }

        Root(level[0])
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl MeridianDeserialize for Root {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::mrd_deserialize(&mut reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> transaction::Hash {
        transaction::Hash([byte; 32])
    }

    fn paired(a: &transaction::Hash, b: &transaction::Hash) -> [u8; 32] {
        let mut preimage = [0u8; 64];
        preimage[..32].copy_from_slice(&a.0);
        preimage[32..].copy_from_slice(&b.0);
        sha256d(&preimage)
    }

    #[test]
    fn single_leaf_root_is_the_leaf() {
        meridian_test::init();

        let h = leaf(0xAB);
        let root: Root = vec![h].into_iter().collect();
        assert_eq!(root.0, h.0);
    }

    #[test]
    fn two_leaves_hash_their_concatenation() {
        meridian_test::init();

        let (h1, h2) = (leaf(1), leaf(2));
        let root: Root = vec![h1, h2].into_iter().collect();
        assert_eq!(root.0, paired(&h1, &h2));
    }

    #[test]
    fn odd_levels_duplicate_the_last_leaf() {
        meridian_test::init();

        let (h1, h2, h3) = (leaf(1), leaf(2), leaf(3));
        let odd: Root = vec![h1, h2, h3].into_iter().collect();
        let padded: Root = vec![h1, h2, h3, h3].into_iter().collect();
        assert_eq!(odd, padded);
    }
}
