//! The Bitcoin-style variable-length integer that prefixes every list and
//! byte string in the canonical format.

use crate::{MeridianDeserialize, MeridianSerialize, SerializationError};
use byteorder::{LittleEndian, WriteBytesExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactInt(u64);

impl CompactInt {
    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The encoded length of `value`, in bytes.
    pub fn size(value: usize) -> usize {
        if value < 0xFD {
            1
        } else if value <= 0xFFFF {
            3
        } else if value <= 0xFFFF_FFFF {
            5
        } else {
            9
        }
    }
}

impl MeridianSerialize for CompactInt {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.value() < 0xFD {
            target.write_all(&[self.value() as u8])
        } else if self.value() <= 0xFFFF {
            target.write_all(&[0xFD])?;
            target.write_u16::<LittleEndian>(self.value() as u16)
        } else if self.value() <= 0xFFFF_FFFF {
            target.write_all(&[0xFE])?;
            target.write_u32::<LittleEndian>(self.value() as u32)
        } else {
            target.write_all(&[0xFF])?;
            target.write_u64::<LittleEndian>(self.value())
        }
    }
}

impl MeridianDeserialize for CompactInt {
    fn mrd_deserialize<R: std::io::Read>(mut target: R) -> Result<CompactInt, SerializationError> {
        let first = u8::mrd_deserialize(&mut target)?;
        if first < 0xFD {
            Ok(CompactInt(first as u64))
        } else if first == 0xFD {
            Ok(CompactInt(u16::mrd_deserialize(&mut target)? as u64))
        } else if first == 0xFE {
            Ok(CompactInt(u32::mrd_deserialize(&mut target)? as u64))
        } else {
            Ok(CompactInt(u64::mrd_deserialize(&mut target)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: usize) -> Vec<u8> {
        let encoded = CompactInt::from(value).mrd_serialize_to_vec().unwrap();
        let decoded = CompactInt::mrd_deserialize(&encoded[..]).unwrap();
        assert_eq!(decoded.value(), value as u64);
        assert_eq!(encoded.len(), CompactInt::size(value));
        encoded
    }

    #[test]
    fn encoding_thresholds() {
        meridian_test::init();

        assert_eq!(round_trip(0), vec![0]);
        assert_eq!(round_trip(0xFC), vec![0xFC]);
        assert_eq!(round_trip(0xFD), vec![0xFD, 0xFD, 0x00]);
        assert_eq!(round_trip(0xFFFF), vec![0xFD, 0xFF, 0xFF]);
        assert_eq!(round_trip(0x10000), vec![0xFE, 0x00, 0x00, 0x01, 0x00]);
        round_trip(0xFFFF_FFFF);
        round_trip(0x1_0000_0000);
    }
}
