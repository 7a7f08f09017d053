//! Block difficulty as compact bits, expanded 256-bit targets, and the
//! work each block contributes to chain selection.
//!
//! The compact format packs a 256-bit target into `(exponent: 1 byte,
//! mantissa: 3 bytes)`, value `mantissa × 256^(exponent − 3)`. Note: the
//! comparisons here are 256-bit unsigned integer comparisons. Greater
//! targets represent *less* work.

use std::fmt;

use primitive_types::U256;

use crate::block;
use crate::{MeridianDeserialize, MeridianSerialize, SerializationError};

/// The difficulty threshold in the compact `bits` format carried in every
/// block header.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompactDifficulty(pub u32);

/// A difficulty threshold expanded to the full 256-bit target.
///
/// A header satisfies its threshold when its hash, read as a little-endian
/// 256-bit integer, is less than or equal to this value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExpandedDifficulty(U256);

/// The work contributed by a single block: `floor(2^256 / (target + 1))`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Work(U256);

impl CompactDifficulty {
    /// Expand to the full target.
    ///
    /// Returns `None` for encodings that denote an invalid (zero) target:
    /// sign bit set in the mantissa, zero mantissa, zero exponent, exponent
    /// above 32, or a mantissa shifted entirely out of range.
    pub fn to_expanded(self) -> Option<ExpandedDifficulty> {
        const SIGN_BIT: u32 = 0x0080_0000;

        let mantissa = self.0 & 0x00ff_ffff;
        let exponent = self.0 >> 24;

        if mantissa & SIGN_BIT != 0 || mantissa == 0 || exponent == 0 || exponent > 32 {
            return None;
        }

        let target = if exponent <= 3 {
            U256::from(mantissa >> (8 * (3 - exponent)))
        } else {
            U256::from(mantissa) << (8 * (exponent - 3))
        };

        if target.is_zero() {
            None
        } else {
            Some(ExpandedDifficulty(target))
        }
    }
}

impl ExpandedDifficulty {
    /// Interpret a block hash as a 256-bit little-endian integer, so it can
    /// be compared against a target.
    pub fn from_hash(hash: &block::Hash) -> ExpandedDifficulty {
        ExpandedDifficulty(U256::from_little_endian(&hash.0))
    }

    pub fn from_u256(value: U256) -> ExpandedDifficulty {
        ExpandedDifficulty(value)
    }

    pub fn to_u256(self) -> U256 {
        self.0
    }

    /// Re-encode as compact bits with the minimal exponent. If the top byte
    /// of the mantissa would have its sign bit set, the mantissa is shifted
    /// right one byte and the exponent incremented, so the sign bit is never
    /// set on output.
    pub fn to_compact(self) -> CompactDifficulty {
        if self.0.is_zero() {
            return CompactDifficulty(0);
        }

        let mut exponent = (self.0.bits() as u32 + 7) / 8;
        let mut mantissa = if exponent <= 3 {
            (self.0.low_u32()) << (8 * (3 - exponent))
        } else {
            (self.0 >> (8 * (exponent - 3))).low_u32()
        };

        if mantissa & 0x0080_0000 != 0 {
            mantissa >>= 8;
            exponent += 1;
        }

        CompactDifficulty((exponent << 24) | mantissa)
    }

    /// The work this target represents: `floor(2^256 / (target + 1))`,
    /// computed without leaving 256-bit arithmetic as `!target / (target
    /// + 1) + 1`.
    pub fn to_work(self) -> Work {
        let work = (!self.0) / (self.0 + U256::one()) + U256::one();
        Work(work)
    }

    /// `max_target / target` as a float, the conventional difficulty shown
    /// to operators.
    pub fn relative_difficulty(self, max_target: ExpandedDifficulty) -> f64 {
        u256_to_f64(max_target.0) / u256_to_f64(self.0)
    }
}

impl Work {
    pub const ZERO: Work = Work(U256([0, 0, 0, 0]));

    /// Cumulative work is accumulated with checked addition; a `None` here
    /// would mean more than 2^256 total work, which indicates corruption.
    pub fn checked_add(self, rhs: Work) -> Option<Work> {
        self.0.checked_add(rhs.0).map(Work)
    }
}

fn u256_to_f64(value: U256) -> f64 {
    let mut result = 0f64;
    for i in (0..4).rev() {
        result = result * 18_446_744_073_709_551_616f64 + value.0[i] as f64;
    }
    result
}

impl PartialEq<ExpandedDifficulty> for block::Hash {
    fn eq(&self, other: &ExpandedDifficulty) -> bool {
        ExpandedDifficulty::from_hash(self) == *other
    }
}

impl PartialOrd<ExpandedDifficulty> for block::Hash {
    fn partial_cmp(&self, other: &ExpandedDifficulty) -> Option<std::cmp::Ordering> {
        ExpandedDifficulty::from_hash(self).partial_cmp(other)
    }
}

impl PartialEq<block::Hash> for ExpandedDifficulty {
    fn eq(&self, other: &block::Hash) -> bool {
        *self == ExpandedDifficulty::from_hash(other)
    }
}

impl PartialOrd<block::Hash> for ExpandedDifficulty {
    fn partial_cmp(&self, other: &block::Hash) -> Option<std::cmp::Ordering> {
        self.partial_cmp(&ExpandedDifficulty::from_hash(other))
    }
}

impl fmt::Debug for CompactDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompactDifficulty")
            .field(&format_args!("{:#010x}", self.0))
            .finish()
    }
}

impl fmt::Debug for ExpandedDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        f.debug_tuple("ExpandedDifficulty")
            .field(&hex::encode(&bytes))
            .finish()
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        f.debug_tuple("Work").field(&hex::encode(&bytes)).finish()
    }
}

impl fmt::Display for Work {
    /// Formats as 64 hex digits, the conventional `chainwork` rendering.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        f.write_str(&hex::encode(&bytes))
    }
}

impl MeridianSerialize for CompactDifficulty {
    fn mrd_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.mrd_serialize(target)
    }
}

impl MeridianDeserialize for CompactDifficulty {
    fn mrd_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::mrd_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_expansion_matches_reference_target() {
        meridian_test::init();

        // 0x1d00ffff expands to 0x00000000ffff0000...0000: the 0xffff
        // mantissa sits 26 bytes up, leaving the top four bytes zero.
        let target = CompactDifficulty(0x1d00ffff).to_expanded().unwrap();
        assert_eq!(target.to_u256(), U256::from(0xffffu64) << (8 * 26));
        assert_eq!(target.to_compact(), CompactDifficulty(0x1d00ffff));
    }

    #[test]
    fn invalid_encodings_expand_to_none() {
        meridian_test::init();

        // Sign bit set in the mantissa.
        assert_eq!(CompactDifficulty(0x1d80_0000).to_expanded(), None);
        // Zero mantissa.
        assert_eq!(CompactDifficulty(0x1d00_0000).to_expanded(), None);
        // Zero exponent.
        assert_eq!(CompactDifficulty(0x0000_ffff).to_expanded(), None);
        // Exponent above 32.
        assert_eq!(CompactDifficulty(0x2100_ffff).to_expanded(), None);
        // Mantissa shifted entirely out of the bottom of the target.
        assert_eq!(CompactDifficulty(0x0100_00ff).to_expanded(), None);
    }

    #[test]
    fn sign_bit_is_never_set_on_encode() {
        meridian_test::init();

        // A target whose top mantissa byte is >= 0x80 must be encoded with
        // a bumped exponent instead of a signed-looking mantissa.
        let target = ExpandedDifficulty::from_u256(U256::from(0x80_0000u64));
        let compact = target.to_compact();
        assert_eq!(compact.0 & 0x0080_0000, 0);
        assert_eq!(compact.0, 0x0400_8000);
        // And it still round-trips to the same target.
        assert_eq!(compact.to_expanded().unwrap(), target);
    }

    #[test]
    fn work_for_difficulty_one_is_2_to_the_32() {
        meridian_test::init();

        // The classic check: work per block at bits 0x1d00ffff is just
        // above 2^32.
        let target = CompactDifficulty(0x1d00ffff).to_expanded().unwrap();
        let work = target.to_work();
        assert!(work > Work(U256::from(1u64) << 32));
        assert!(work < Work(U256::from(1u64) << 33));
    }

    #[test]
    fn work_is_exact_for_small_targets() {
        meridian_test::init();

        // target = 1: floor(2^256 / 2) = 2^255.
        let target = ExpandedDifficulty::from_u256(U256::one());
        assert_eq!(target.to_work(), Work(U256::one() << 255));

        // target = 3: floor(2^256 / 4) = 2^254.
        let target = ExpandedDifficulty::from_u256(U256::from(3u64));
        assert_eq!(target.to_work(), Work(U256::one() << 254));
    }

    #[test]
    fn hash_to_target_comparison_is_little_endian() {
        meridian_test::init();

        // The hash's *last* byte is the most significant.
        let mut high = block::Hash([0u8; 32]);
        high.0[31] = 1;
        let mut low = block::Hash([0xffu8; 32]);
        low.0[31] = 0;

        let threshold = ExpandedDifficulty::from_u256(U256::from(1u64) << 248);
        assert!(low < threshold);
        assert!(high >= threshold);
    }

    #[test]
    fn pow_monotonicity() {
        meridian_test::init();

        // If a hash meets a target, it meets every easier target.
        let hash = block::Hash([0x22u8; 32]);
        let target = ExpandedDifficulty::from_hash(&hash);
        let easier = ExpandedDifficulty::from_u256(target.to_u256() + U256::one());
        assert!(hash <= target);
        assert!(hash <= easier);
    }
}
