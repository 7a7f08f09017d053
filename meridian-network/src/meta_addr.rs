//! An address as gossiped between peers.

use std::net::SocketAddr;

use meridian_chain::{MeridianDeserialize, MeridianSerialize, SerializationError};
use meridian_serde_derive::{MrdDeserialize, MrdSerialize};

use crate::types::PeerServices;

/// A peer address with the metadata that rides along in `addr` messages.
///
/// IPv4 addresses travel as IPv6-mapped 16-byte addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq, MrdSerialize, MrdDeserialize)]
pub struct MetaAddr {
    /// The services the peer at this address claimed to provide.
    pub services: PeerServices,
    /// The peer's address and port.
    pub addr: SocketAddr,
    /// When this address was last seen working, in epoch seconds.
    pub last_seen: u32,
}

impl MetaAddr {
    /// Whether the address is worth gossiping to other peers.
    pub fn is_routable(&self) -> bool {
        match self.addr.ip() {
            std::net::IpAddr::V4(ip) => {
                !ip.is_unspecified() && !ip.is_broadcast() && !ip.is_multicast()
            }
            std::net::IpAddr::V6(ip) => !ip.is_unspecified() && !ip.is_multicast(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_layout_is_30_bytes() {
        meridian_test::init();

        let meta = MetaAddr {
            services: PeerServices::NODE_NETWORK,
            addr: "203.0.113.6:9333".parse().unwrap(),
            last_seen: 1_700_000_000,
        };
        let bytes = meta.mrd_serialize_to_vec().unwrap();
        // services(8) + ip(16) + port(2, big-endian) + last_seen(4)
        assert_eq!(bytes.len(), 30);

        let parsed = MetaAddr::mrd_deserialize(&bytes[..]).unwrap();
        assert_eq!(parsed, meta);
    }
}
