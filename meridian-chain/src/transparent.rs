//! Transaction inputs, outputs, and the types that reference them.

mod address;
mod keys;
mod script;

pub use address::Address;
pub use keys::PrivateKey;
pub use script::Script;

use crate::{
    amount::Amount, transaction, MeridianDeserialize, MeridianSerialize, SerializationError,
};
use meridian_serde_derive::{MrdDeserialize, MrdSerialize};

/// An input consuming this sequence number is *final*: it opts out of its
/// transaction's lock time.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// The serialized size of a typical pay-to-pubkey-hash spend (outpoint,
/// signature, public key, sequence), used to estimate the cost of spending
/// an output when classifying dust.
pub const ESTIMATED_SPEND_BYTES: u64 = 148;

/// A reference to a particular output of a particular transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, MrdSerialize, MrdDeserialize)]
pub struct OutPoint {
    /// The transaction that created the output being spent.
    pub hash: transaction::Hash,

    /// Which output of that transaction is referenced; the first output
    /// is 0.
    pub index: u32,
}

impl OutPoint {
    /// The null reference, spent exclusively by coinbase transactions.
    pub const NULL: OutPoint = OutPoint {
        hash: transaction::Hash([0u8; 32]),
        index: u32::MAX,
    };

    pub fn is_null(&self) -> bool {
        *self == OutPoint::NULL
    }

    #[inline]
    pub const fn len() -> usize {
        36
    }
}

/// A transaction input.
///
/// A coinbase input is not a separate type: it is an input whose
/// `previous_output` is [`OutPoint::NULL`], whose `script_sig` carries free
/// miner data instead of an unlock script.
#[derive(Clone, Debug, Eq, PartialEq, MrdSerialize, MrdDeserialize)]
pub struct Input {
    /// The output being spent.
    pub previous_output: OutPoint,
    /// The script that authorizes spending `previous_output`.
    pub script_sig: Script,
    /// The sequence number for this input.
    pub sequence: u32,
}

impl Input {
    pub fn serialized_size(&self) -> usize {
        OutPoint::len() + self.script_sig.serialized_size() + 4
    }
}

/// A transaction output.
///
/// The coins someone "owns" are a subset of the unspent transaction
/// outputs of the chain. Outputs are indivisible: they are consumed in
/// their entirety, with change returned as a new output.
#[derive(Clone, Debug, Eq, PartialEq, Hash, MrdSerialize, MrdDeserialize)]
pub struct Output {
    /// Transaction value.
    pub value: Amount,

    /// The lock script that defines the conditions under which this output
    /// can be spent.
    pub script_pubkey: Script,
}

impl Output {
    pub fn serialized_size(&self) -> usize {
        8 + self.script_pubkey.serialized_size()
    }

    /// An output is dust when it carries less than three times the relay
    /// fee for the input that will eventually spend it.
    pub fn is_dust(&self, min_relay_fee_rate: u64) -> bool {
        let spend_fee = ESTIMATED_SPEND_BYTES * min_relay_fee_rate / 1000;
        self.value.units() < 3 * spend_fee
    }
}
