use crate::{MeridianDeserialize, MeridianSerialize, SerializationError};

/// Lock times below this value are block heights; at or above it, Unix
/// timestamps.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// The earliest height or time a transaction may be included in a block.
///
/// Zero means the transaction is final everywhere.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LockTime(pub u32);

impl LockTime {
    pub fn is_height(self) -> bool {
        self.0 != 0 && self.0 < LOCKTIME_THRESHOLD
    }

    pub fn is_time(self) -> bool {
        self.0 >= LOCKTIME_THRESHOLD
    }
}

impl MeridianSerialize for LockTime {
    fn mrd_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.mrd_serialize(target)
    }
}

impl MeridianDeserialize for LockTime {
    fn mrd_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(LockTime(u32::mrd_deserialize(reader)?))
    }
}
