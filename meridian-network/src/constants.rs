//! Protocol-wide constants.

use std::time::Duration;

use crate::types::ProtocolVersion;

/// The protocol version this node speaks.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion(70_001);

/// The oldest peer protocol version this node will talk to.
pub const MIN_PEER_VERSION: ProtocolVersion = ProtocolVersion(70_001);

/// The user agent advertised in `version` messages.
pub const USER_AGENT: &str = "/Meridian:0.1.0/";

/// Hard cap on a message body. Larger frames disconnect the peer.
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Caps on list-carrying messages.
pub const MAX_INV_PER_MESSAGE: usize = 50_000;
pub const MAX_ADDRS_PER_MESSAGE: usize = 1_000;
pub const MAX_HEADERS_PER_MESSAGE: usize = 2_000;

/// The most block hashes returned for one `getblocks` request.
pub const MAX_BLOCKS_PER_GETBLOCKS: usize = 500;

/// A quiet outbound link sends a ping this often.
pub const PING_INTERVAL: Duration = Duration::from_secs(120);

/// A link with no traffic in either direction for this long is dropped.
pub const TIMEOUT_INTERVAL: Duration = Duration::from_secs(900);

/// The whole handshake must finish within this window.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection targets.
pub const MAX_OUTBOUND_CONNECTIONS: usize = 8;
pub const MAX_INBOUND_CONNECTIONS: usize = 125;

/// Misbehavior score at which a peer is banned.
pub const BAN_THRESHOLD: u32 = 100;

/// How long a ban lasts, in seconds.
pub const BAN_DURATION_SECS: u64 = 24 * 60 * 60;

/// Address-book retry policy: delay doubles per failed attempt from the
/// base, capped; the record is dropped after `MAX_ATTEMPTS` failures.
pub const RETRY_BASE_SECS: u64 = 60;
pub const RETRY_CAP_SECS: u64 = 60 * 60;
pub const MAX_ATTEMPTS: u32 = 5;

/// Gossip only addresses seen within this horizon.
pub const ADDR_GOSSIP_HORIZON_SECS: u64 = 3 * 60 * 60;
