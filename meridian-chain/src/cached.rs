use crate::{MeridianDeserialize, MeridianSerialize, SerializationError};

/// A `Cached` value is an option that is never serialized.
///
/// It can be added to any consensus struct without changing its wire format.
/// Deserialization always produces an empty cache; constructors that know
/// the value (because they just hashed the raw bytes) fill it in.
#[derive(Clone, Copy, Eq)]
pub struct Cached<T: Clone + Copy>(Option<T>);

impl<T: Clone + Copy> Cached<T> {
    pub fn new() -> Cached<T> {
        Cached(None)
    }

    pub fn from(val: T) -> Cached<T> {
        Cached(Some(val))
    }

    pub fn value(&self) -> Option<T> {
        self.0
    }
}

impl<T: Clone + Copy> Default for Cached<T> {
    fn default() -> Self {
        Cached::new()
    }
}

/// Two caches are unequal only when both are full and their values differ.
///
/// This lets tests build values with empty caches and compare them to their
/// deserialized counterparts, whose caches are always populated.
impl<T: PartialEq + Copy> PartialEq for Cached<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => true,
        }
    }
}

impl<T: Clone + Copy> std::fmt::Debug for Cached<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Clone + Copy> MeridianSerialize for Cached<T> {
    fn mrd_serialize<W>(&self, _: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        Ok(())
    }
}

impl<T: Clone + Copy> MeridianDeserialize for Cached<T> {
    fn mrd_deserialize<R: std::io::Read>(_: R) -> Result<Self, SerializationError> {
        Ok(Cached(None))
    }
}
