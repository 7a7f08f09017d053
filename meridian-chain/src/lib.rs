//! Consensus-critical data structures and serialization for Meridian.
//!
//! This crate defines the block, transaction, and script types shared by
//! every other component, along with the canonical little-endian wire
//! format they are hashed and transmitted in.

#![deny(missing_debug_implementations)]

pub mod amount;
pub mod block;
pub mod cached;
pub mod compactint;
pub mod parameters;
pub mod primitives;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use cached::Cached;
pub use compactint::CompactInt;
pub use serialization::{
    MeridianDeserialize, MeridianDeserializeInto, MeridianSerialize, SerializationError,
};
