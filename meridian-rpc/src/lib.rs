//! The JSON-RPC interface.
//!
//! A dispatch table maps method names to handlers over shared node state;
//! the HTTP layer adds Basic authentication (compared in constant time)
//! and a per-IP rate limit.

#![deny(missing_debug_implementations)]

mod http;
mod methods;

pub use http::{serve, RpcConfig};
pub use methods::dispatch;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{json, Value};

use meridian_chain::transaction;
use meridian_consensus::ChainManager;
use meridian_wallet::Wallet;

/// JSON-RPC 2.0 and wallet error codes.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// General application failure (e.g. a rejected transaction).
    pub const MISC_ERROR: i64 = -1;
    /// Wallet errors.
    pub const WALLET_INSUFFICIENT_FUNDS: i64 = -4;
    /// Unknown address, block, or transaction.
    pub const INVALID_ADDRESS_OR_KEY: i64 = -5;
}

/// An error returned to the RPC caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> RpcError {
        RpcError {
            code,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> RpcError {
        RpcError::new(codes::METHOD_NOT_FOUND, format!("unknown method {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> RpcError {
        RpcError::new(codes::INVALID_PARAMS, message)
    }

    pub fn not_found(message: impl Into<String>) -> RpcError {
        RpcError::new(codes::INVALID_ADDRESS_OR_KEY, message)
    }

    pub fn to_value(&self) -> Value {
        json!({ "code": self.code, "message": self.message })
    }
}

/// A connected peer as reported by `getpeerinfo`.
#[derive(Debug, Clone)]
pub struct PeerStatus {
    pub addr: SocketAddr,
    pub inbound: bool,
    pub version: u32,
    pub user_agent: String,
    pub start_height: u32,
    pub latency_ms: Option<u64>,
    pub misbehavior: u32,
}

/// The node services the RPC layer calls back into.
pub trait NodeInterface: Send + Sync {
    /// Connected peers, for `getpeerinfo`.
    fn peer_statuses(&self) -> Vec<PeerStatus>;
    /// Announce a freshly accepted transaction to peers.
    fn relay_transaction(&self, txid: transaction::Hash);
    /// Begin graceful shutdown, for `stop`.
    fn request_shutdown(&self);
}

/// Everything a method handler may touch.
pub struct SharedState {
    pub chain: Arc<RwLock<ChainManager>>,
    pub wallet: Arc<Mutex<Wallet>>,
    pub node: Arc<dyn NodeInterface>,
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState").finish()
    }
}
