//! Small wire types shared across messages.

use meridian_chain::parameters::Network;
use meridian_chain::{MeridianDeserialize, MeridianSerialize, SerializationError};
use meridian_serde_derive::{MrdDeserialize, MrdSerialize};

/// The four-byte network id that opens every message frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq, MrdSerialize, MrdDeserialize)]
pub struct Magic(pub [u8; 4]);

impl From<Network> for Magic {
    fn from(network: Network) -> Self {
        Magic(network.magic_value().to_le_bytes())
    }
}

/// A nonce used in `ping`/`pong` and in `version` self-connection
/// detection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, MrdSerialize, MrdDeserialize)]
pub struct Nonce(pub u64);

impl Nonce {
    pub fn random() -> Nonce {
        Nonce(rand::random())
    }
}

/// A protocol version number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, MrdSerialize, MrdDeserialize)]
pub struct ProtocolVersion(pub u32);

/// The service bits a peer advertises.
#[derive(Copy, Clone, Debug, Eq, PartialEq, MrdSerialize, MrdDeserialize)]
pub struct PeerServices(pub u64);

impl PeerServices {
    /// A full node serving the whole chain.
    pub const NODE_NETWORK: PeerServices = PeerServices(1);

    pub fn serves_network(self) -> bool {
        self.0 & Self::NODE_NETWORK.0 != 0
    }
}
