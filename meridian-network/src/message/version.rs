use std::net::SocketAddr;

use meridian_chain::block;
use meridian_chain::{MeridianDeserialize, MeridianSerialize, SerializationError};
use meridian_serde_derive::{MrdDeserialize, MrdSerialize};

use crate::types::{Nonce, PeerServices, ProtocolVersion};

/// A `version` message.
///
/// Sent once at the start of every connection; carries what each side
/// needs to decide whether to keep talking.
#[derive(Clone, Debug, Eq, PartialEq, MrdSerialize, MrdDeserialize)]
pub struct Version {
    /// The network protocol version the sender speaks.
    pub version: ProtocolVersion,

    /// The services the sender provides.
    pub services: PeerServices,

    /// When the message was sent, in epoch seconds.
    pub timestamp: u64,

    /// The receiving node's address and services, as the sender sees them.
    pub address_recv: (PeerServices, SocketAddr),

    /// The sending node's address and services.
    pub address_from: (PeerServices, SocketAddr),

    /// A random nonce regenerated per connection; a node receiving its own
    /// nonce back has connected to itself.
    pub nonce: Nonce,

    /// The sender's user agent.
    pub user_agent: String,

    /// The height of the sender's best block.
    pub start_height: block::Height,

    /// Whether the sender wants transaction relay.
    pub relay: bool,
}

impl Version {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: ProtocolVersion,
        their_addr: SocketAddr,
        their_services: PeerServices,
        our_services: PeerServices,
        our_addr: SocketAddr,
        nonce: Nonce,
        user_agent: String,
        start_height: block::Height,
        timestamp: u64,
    ) -> Version {
        Version {
            version,
            services: our_services,
            timestamp,
            address_recv: (their_services, their_addr),
            address_from: (our_services, our_addr),
            nonce,
            user_agent,
            start_height,
            relay: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CURRENT_VERSION;

    #[test]
    fn version_round_trip() {
        meridian_test::init();

        let version = Version::new(
            CURRENT_VERSION,
            "203.0.113.6:9333".parse().unwrap(),
            PeerServices::NODE_NETWORK,
            PeerServices::NODE_NETWORK,
            "198.51.100.9:9333".parse().unwrap(),
            Nonce(0x1122_3344_5566_7788),
            crate::constants::USER_AGENT.to_owned(),
            block::Height(42),
            1_700_000_000,
        );

        let bytes = version.mrd_serialize_to_vec().unwrap();
        let parsed = Version::mrd_deserialize(&bytes[..]).unwrap();
        assert_eq!(parsed, version);
    }
}
