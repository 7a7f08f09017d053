//! Peer-to-peer networking for Meridian: the framed wire codec, the
//! per-connection state machine, and the address book.
//!
//! This crate speaks the protocol and surfaces events; deciding what a
//! `block` or `tx` message *means* is the embedding node's job, which
//! wires [`PeerEvent`]s into the chain manager and mempool.

#![deny(missing_debug_implementations)]

pub mod address_book;
pub mod codec;
pub mod connection;
pub mod constants;
pub mod inv;
pub mod message;
pub mod meta_addr;
pub mod peer;
pub mod types;

pub use address_book::{AddressBook, PeerRecord};
pub use codec::Codec;
pub use connection::{Connection, PeerEvent};
pub use inv::InventoryHash;
pub use message::{Message, Version};
pub use meta_addr::MetaAddr;
pub use peer::{Direction, Peer, PeerError, PeerState};
pub use types::{Magic, Nonce, PeerServices, ProtocolVersion};
