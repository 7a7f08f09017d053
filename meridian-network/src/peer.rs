//! Per-peer connection state.

use std::net::SocketAddr;

use thiserror::Error;

use meridian_chain::SerializationError;

use crate::message::Version;
use crate::types::ProtocolVersion;

/// Which side opened the connection.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// The connection lifecycle.
///
/// Outbound connections walk `Connecting → VersionSent → VersionReceived →
/// Active`; inbound connections wait for the remote `version` before
/// sending their own. Application messages flow only in `Active`.
/// `Disconnecting` is terminal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PeerState {
    Connecting,
    VersionSent,
    VersionReceived,
    Active,
    Disconnecting,
}

/// What this node knows about one connected peer.
#[derive(Clone, Debug)]
pub struct Peer {
    pub addr: SocketAddr,
    pub direction: Direction,
    pub state: PeerState,
    /// The peer's `version` message, once received.
    pub version: Option<Version>,
    /// Accumulated misbehavior score.
    pub misbehavior: u32,
    /// Round-trip time measured by the last matched ping/pong.
    pub latency: Option<std::time::Duration>,
}

impl Peer {
    pub fn new(addr: SocketAddr, direction: Direction) -> Peer {
        Peer {
            addr,
            direction,
            state: PeerState::Connecting,
            version: None,
            misbehavior: 0,
            latency: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == PeerState::Active
    }

    pub fn start_height(&self) -> u32 {
        self.version
            .as_ref()
            .map(|version| version.start_height.0)
            .unwrap_or(0)
    }
}

#[derive(Error, Debug)]
pub enum PeerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] SerializationError),
    #[error("handshake did not complete in time")]
    HandshakeTimeout,
    #[error("expected {expected} during handshake, received {received}")]
    UnexpectedHandshakeMessage {
        expected: &'static str,
        received: &'static str,
    },
    #[error("peer speaks obsolete protocol version {0:?}")]
    ObsoleteVersion(ProtocolVersion),
    #[error("connected to self")]
    SelfConnection,
    #[error("remote peer closed the connection")]
    RemoteClosed,
}
