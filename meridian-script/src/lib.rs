//! The Meridian script interpreter.
//!
//! Scripts are small stack programs attached to outputs (lock scripts) and
//! inputs (unlock scripts). Spending an output runs the unlock script to
//! seed the stack, then the lock script against that stack; the spend is
//! authorized when the final stack's top element is truthy.
//!
//! The interpreter state is an owned value created per verification; it is
//! never shared or reentrant.

mod error;
mod interpreter;
mod standard;

pub mod opcodes;

pub use error::ScriptError;
pub use interpreter::{
    verify_script, Interpreter, MAX_MULTISIG_KEYS, MAX_OPS_PER_SCRIPT, MAX_PUSH_BYTES,
    MAX_SCRIPT_BYTES, MAX_STACK_DEPTH,
};
pub use standard::{
    multisig, null_data, pay_to_pubkey, pay_to_pubkey_hash, pay_to_script_hash, sigop_count,
    ScriptTemplate, MAX_NULL_DATA_BYTES,
};
