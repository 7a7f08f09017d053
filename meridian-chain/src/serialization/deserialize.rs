use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::net::{Ipv6Addr, SocketAddr};
use std::{
    io,
    net::IpAddr::{V4, V6},
};

use super::CompactInt;
use super::SerializationError;

type Result<R> = std::result::Result<R, SerializationError>;

/// The largest element count any length-prefixed list will be allowed to
/// claim unless the caller supplies a tighter cap. Every message type caps
/// its own lists well below this; it exists to bound memory for the rest.
pub const DEFAULT_LIST_SANITY_CAP: u64 = 4_194_304;

pub trait MeridianDeserialize {
    fn mrd_deserialize<R: io::Read>(reader: R) -> Result<Self>
    where
        Self: Sized;
}

/// Helper for deserializing more succinctly via type inference
pub trait MeridianDeserializeInto {
    /// Deserialize based on type inference
    fn mrd_deserialize_into<T>(self) -> Result<T>
    where
        T: MeridianDeserialize;
}

impl<R: io::Read> MeridianDeserializeInto for R {
    fn mrd_deserialize_into<T>(self) -> Result<T>
    where
        T: MeridianDeserialize,
    {
        T::mrd_deserialize(self)
    }
}

/// Read a length-prefixed list, rejecting prefixes beyond `max_len` before
/// any allocation happens.
pub fn mrd_deserialize_list<T, R>(mut reader: R, max_len: u64) -> Result<Vec<T>>
where
    T: MeridianDeserialize,
    R: io::Read,
{
    let len = CompactInt::mrd_deserialize(&mut reader)?.value();
    if len > max_len {
        return Err(SerializationError::OversizedArray { len, max: max_len });
    }
    // Limit blind preallocation since an attacker controls the prefix.
    let mut result: Vec<T> = Vec::with_capacity(std::cmp::min(len, 1024) as usize);
    for _ in 0..len {
        result.push(T::mrd_deserialize(&mut reader)?);
    }
    Ok(result)
}

impl MeridianDeserialize for bool {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<bool> {
        let value = reader.read_u8()?;
        match value {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerializationError::Parse("invalid bool")),
        }
    }
}

impl MeridianDeserialize for u8 {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<u8> {
        Ok(reader.read_u8()?)
    }
}

impl MeridianDeserialize for u16 {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<u16> {
        Ok(reader.read_u16::<LittleEndian>()?)
    }
}

impl MeridianDeserialize for u32 {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<u32> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

impl MeridianDeserialize for u64 {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<u64> {
        Ok(reader.read_u64::<LittleEndian>()?)
    }
}

impl MeridianDeserialize for i32 {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<i32> {
        Ok(reader.read_i32::<LittleEndian>()?)
    }
}

impl MeridianDeserialize for i64 {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<i64> {
        Ok(reader.read_i64::<LittleEndian>()?)
    }
}

impl<T> MeridianDeserialize for Vec<T>
where
    T: MeridianDeserialize,
{
    fn mrd_deserialize<R: io::Read>(reader: R) -> Result<Vec<T>> {
        mrd_deserialize_list(reader, DEFAULT_LIST_SANITY_CAP)
    }
}

impl MeridianDeserialize for String {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<String> {
        let len = CompactInt::mrd_deserialize(&mut reader)?.value();
        // Strings only appear in a few short wire fields (user agents,
        // reject reasons), so cap them aggressively.
        const MAX_STRING_LEN: u64 = 4096;
        if len > MAX_STRING_LEN {
            return Err(SerializationError::OversizedArray {
                len,
                max: MAX_STRING_LEN,
            });
        }
        let mut buf = vec![0; len as usize];
        reader.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| SerializationError::Parse("invalid utf-8"))
    }
}

impl MeridianDeserialize for SocketAddr {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<SocketAddr> {
        let octets = <[u8; 16]>::mrd_deserialize(&mut reader)?;
        let v6_addr = Ipv6Addr::from(octets);

        let addr = match v6_addr.to_ipv4() {
            Some(v4_addr) => V4(v4_addr),
            None => V6(v6_addr),
        };
        Ok(SocketAddr::from((addr, reader.read_u16::<BigEndian>()?)))
    }
}

impl<T, U> MeridianDeserialize for (T, U)
where
    T: MeridianDeserialize,
    U: MeridianDeserialize,
{
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<(T, U)> {
        Ok((
            T::mrd_deserialize(&mut reader)?,
            U::mrd_deserialize(&mut reader)?,
        ))
    }
}

impl<T> MeridianDeserialize for std::sync::Arc<T>
where
    T: MeridianDeserialize,
{
    fn mrd_deserialize<R: io::Read>(reader: R) -> Result<Self> {
        Ok(std::sync::Arc::new(T::mrd_deserialize(reader)?))
    }
}

macro_rules! impl_deserializable_byte_array {
    ($size:expr) => {
        impl MeridianDeserialize for [u8; $size] {
            fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<[u8; $size]> {
                let mut result = [0u8; $size];
                reader.read_exact(&mut result)?;
                Ok(result)
            }
        }
    };
}

impl_deserializable_byte_array!(4);
impl_deserializable_byte_array!(12);
impl_deserializable_byte_array!(16);
impl_deserializable_byte_array!(20);
impl_deserializable_byte_array!(32);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::MeridianSerialize;

    #[test]
    fn truncated_input_is_typed() {
        meridian_test::init();

        let short = [0u8; 3];
        match u32::mrd_deserialize(&short[..]) {
            Err(SerializationError::Truncated) => {}
            other => panic!("expected Truncated, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn oversized_list_is_rejected_before_allocation() {
        meridian_test::init();

        // Claim u64::MAX elements with no payload behind the prefix.
        let mut bytes = Vec::new();
        CompactInt::from(usize::MAX)
            .mrd_serialize(&mut bytes)
            .unwrap();
        match <Vec<u32>>::mrd_deserialize(&bytes[..]) {
            Err(SerializationError::OversizedArray { .. }) => {}
            other => panic!("expected OversizedArray, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn socket_addr_round_trip() {
        meridian_test::init();

        let addr: SocketAddr = "203.0.113.6:9333".parse().unwrap();
        let bytes = addr.mrd_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), 18);
        assert_eq!(SocketAddr::mrd_deserialize(&bytes[..]).unwrap(), addr);
    }
}
