//! Definitions of network messages.
//!
//! The wire format identifies messages by a 12-byte ASCII command string;
//! internally that is a serialization detail, and dispatch happens by
//! exhaustive matching on this enum.

use std::{fmt, sync::Arc};

use meridian_chain::block::{Block, Header};
use meridian_chain::compactint::CompactInt;
use meridian_chain::transaction::Transaction;
use meridian_chain::{MeridianDeserialize, MeridianSerialize, SerializationError};

use crate::inv::InventoryHash;
use crate::meta_addr::MetaAddr;
use crate::types::Nonce;

mod command;
mod get_blocks;
mod version;

pub use command::Command;
pub use get_blocks::GetBlocks;
pub use version::Version;

/// A Meridian network message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// A `version` message, opening the handshake. Despite the name it is
    /// closer to a TLS `ClientHello` than a bare version number.
    Version(Version),

    /// A `verack` message, acknowledging the peer's `version`.
    Verack,

    /// A `ping` keepalive carrying a nonce to be echoed.
    Ping(Nonce),

    /// A `pong` answering a `ping` with the same nonce.
    Pong(Nonce),

    /// A `reject` message describing why the peer refused our data.
    Reject {
        /// The command of the message being rejected.
        message: String,
        /// The rejection category.
        ccode: RejectReason,
        /// Human-readable detail.
        reason: String,
        /// The hash of the rejected object, when there is one.
        data: Option<[u8; 32]>,
    },

    /// A `getaddr` request for gossip addresses.
    GetAddr,

    /// An `addr` message carrying known peer addresses.
    Addr(Vec<MetaAddr>),

    /// A `getblocks` request: a block locator from the sender's chain; the
    /// receiver answers with an `inv` of up to 500 subsequent hashes.
    GetBlocks(GetBlocks),

    /// A `getheaders` request, shaped like `getblocks` but answered with
    /// a `headers` message.
    GetHeaders(GetBlocks),

    /// A `headers` reply: block headers with their transaction counts.
    Headers(Vec<CountedHeader>),

    /// An `inv` advertisement of blocks or transactions the sender has.
    Inv(Vec<InventoryHash>),

    /// A `getdata` request for the content behind inventory hashes.
    GetData(Vec<InventoryHash>),

    /// A `notfound` reply listing requested items the sender lacks.
    NotFound(Vec<InventoryHash>),

    /// A `block` message carrying a full block.
    Block(Arc<Block>),

    /// A `tx` message carrying one transaction.
    Tx(Arc<Transaction>),

    /// A `mempool` request for the sender's unconfirmed txids.
    Mempool,
}

/// Reject message category codes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum RejectReason {
    Malformed = 0x01,
    Invalid = 0x10,
    Obsolete = 0x11,
    Duplicate = 0x12,
    Nonstandard = 0x40,
    Dust = 0x41,
    InsufficientFee = 0x42,
    Other = 0x50,
}

impl RejectReason {
    pub fn from_code(code: u8) -> Option<RejectReason> {
        Some(match code {
            0x01 => RejectReason::Malformed,
            0x10 => RejectReason::Invalid,
            0x11 => RejectReason::Obsolete,
            0x12 => RejectReason::Duplicate,
            0x40 => RejectReason::Nonstandard,
            0x41 => RejectReason::Dust,
            0x42 => RejectReason::InsufficientFee,
            0x50 => RejectReason::Other,
            _ => return None,
        })
    }
}

/// A header with the transaction count of its block, as carried in a
/// `headers` message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CountedHeader {
    pub header: Header,
    pub transaction_count: usize,
}

impl MeridianSerialize for CountedHeader {
    fn mrd_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.header.mrd_serialize(&mut target)?;
        CompactInt::from(self.transaction_count).mrd_serialize(&mut target)
    }
}

impl MeridianDeserialize for CountedHeader {
    fn mrd_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(CountedHeader {
            header: Header::mrd_deserialize(&mut reader)?,
            transaction_count: CompactInt::mrd_deserialize(&mut reader)?.value() as usize,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Message::Version { .. } => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Reject { .. } => "reject",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::GetBlocks { .. } => "getblocks",
            Message::GetHeaders { .. } => "getheaders",
            Message::Headers(_) => "headers",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::NotFound(_) => "notfound",
            Message::Block(_) => "block",
            Message::Tx(_) => "tx",
            Message::Mempool => "mempool",
        })
    }
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Version { .. } => Command::Version,
            Message::Verack => Command::Verack,
            Message::Ping { .. } => Command::Ping,
            Message::Pong { .. } => Command::Pong,
            Message::Reject { .. } => Command::Reject,
            Message::GetAddr => Command::GetAddr,
            Message::Addr { .. } => Command::Addr,
            Message::GetBlocks { .. } => Command::GetBlocks,
            Message::GetHeaders { .. } => Command::GetHeaders,
            Message::Headers { .. } => Command::Headers,
            Message::Inv { .. } => Command::Inv,
            Message::GetData { .. } => Command::GetData,
            Message::NotFound { .. } => Command::NotFound,
            Message::Block { .. } => Command::Block,
            Message::Tx { .. } => Command::Tx,
            Message::Mempool => Command::Mempool,
        }
    }
}
