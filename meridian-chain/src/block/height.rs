use crate::{MeridianDeserialize, MeridianSerialize, SerializationError};

/// The height of a block on the main chain: its distance from genesis.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Height(pub u32);

impl Height {
    pub const MIN: Height = Height(0);
    pub const MAX: Height = Height(u32::MAX);

    pub fn checked_add(self, rhs: u32) -> Option<Height> {
        self.0.checked_add(rhs).map(Height)
    }

    pub fn checked_sub(self, rhs: u32) -> Option<Height> {
        self.0.checked_sub(rhs).map(Height)
    }

    /// Big-endian key bytes, so that height-keyed store iteration runs in
    /// chain order.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 4]) -> Height {
        Height(u32::from_be_bytes(bytes))
    }
}

impl MeridianSerialize for Height {
    fn mrd_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.mrd_serialize(target)
    }
}

impl MeridianDeserialize for Height {
    fn mrd_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u32::mrd_deserialize(reader)?))
    }
}
