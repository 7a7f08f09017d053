//! Consensus-critical serialization.
//!
//! This module contains the `MeridianSerialize` and `MeridianDeserialize`
//! traits, analogs of the Serde `Serialize` and `Deserialize` traits but
//! intended for the canonical little-endian format that all persisted and
//! wire data is hashed in. The format is stable forever: changing any impl
//! here is a consensus break.

mod deserialize;
mod error;

pub mod sha256d;

pub use deserialize::{
    mrd_deserialize_list, MeridianDeserialize, MeridianDeserializeInto, DEFAULT_LIST_SANITY_CAP,
};
pub use error::SerializationError;

use crate::compactint::CompactInt;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use std::net::IpAddr;

pub trait MeridianSerialize {
    fn mrd_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    fn mrd_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.mrd_serialize(&mut data)?;
        Ok(data)
    }
}

impl MeridianSerialize for bool {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self as u8])
    }
}

impl MeridianSerialize for u16 {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl MeridianSerialize for u32 {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl MeridianSerialize for u64 {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl MeridianSerialize for i32 {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i32::<LittleEndian>(*self)
    }
}

impl MeridianSerialize for i64 {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

// A bare `u8` impl would conflict with the length-prefixed `Vec<u8>` impl
// below until specialization stabilizes, so single bytes are written with
// `write_all(&[b])` at the call sites that need them.

impl MeridianSerialize for std::net::Ipv6Addr {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&self.octets())
    }
}

impl MeridianSerialize for std::net::IpAddr {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        match self {
            IpAddr::V4(addr) => addr.to_ipv6_mapped().mrd_serialize(&mut target),
            IpAddr::V6(addr) => addr.mrd_serialize(&mut target),
        }
    }
}

impl MeridianSerialize for std::net::SocketAddr {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.ip().mrd_serialize(&mut target)?;
        target.write_u16::<BigEndian>(self.port())
    }
}

impl MeridianSerialize for &[u8] {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

macro_rules! impl_serializable_byte_array {
    ($size:expr) => {
        impl MeridianSerialize for [u8; $size] {
            fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
            where
                W: std::io::Write,
            {
                target.write_all(self)
            }
        }
    };
}

impl_serializable_byte_array!(4);
impl_serializable_byte_array!(12);
impl_serializable_byte_array!(16);
impl_serializable_byte_array!(20);
impl_serializable_byte_array!(32);

impl MeridianSerialize for Vec<u8> {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).mrd_serialize(&mut target)?;
        target.write_all(self)?;
        Ok(())
    }
}

impl<T> MeridianSerialize for Vec<T>
where
    T: MeridianSerialize,
{
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).mrd_serialize(&mut target)?;
        for item in self.iter() {
            item.mrd_serialize(&mut target)?
        }
        Ok(())
    }
}

impl MeridianSerialize for String {
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).mrd_serialize(&mut target)?;
        self.as_bytes().mrd_serialize(&mut target)?;
        Ok(())
    }
}

impl<T, U> MeridianSerialize for (T, U)
where
    T: MeridianSerialize,
    U: MeridianSerialize,
{
    fn mrd_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.0.mrd_serialize(&mut target)?;
        self.1.mrd_serialize(&mut target)?;
        Ok(())
    }
}

impl<T> MeridianSerialize for std::sync::Arc<T>
where
    T: MeridianSerialize,
{
    fn mrd_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        T::mrd_serialize(self, target)
    }
}
