//! A minimal keystore wallet: random keys, pay-to-pubkey-hash addresses,
//! UTXO scanning, and transaction building.
//!
//! Key derivation is deliberately simple — every address is an independent
//! random key. Hierarchical derivation and at-rest encryption live outside
//! this crate's boundary.

#![deny(missing_debug_implementations)]

use std::collections::HashMap;

use secp256k1::{Message, Secp256k1};
use thiserror::Error;
use tracing::{debug, info};

use meridian_chain::amount::{Amount, AmountError};
use meridian_chain::block::Height;
use meridian_chain::parameters::{Network, COINBASE_MATURITY, MIN_RELAY_TX_FEE};
use meridian_chain::transaction::{LockTime, Transaction, SIGHASH_ALL};
use meridian_chain::transparent::{
    Address, Input, OutPoint, Output, PrivateKey, Script, SEQUENCE_FINAL,
};
use meridian_script::{pay_to_pubkey_hash, ScriptTemplate};
use meridian_state::UtxoSet;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("insufficient funds: need {needed:?}, have {available:?} spendable")]
    InsufficientFunds { needed: Amount, available: Amount },
    #[error("address {0} is not usable on this network")]
    WrongNetwork(Address),
    #[error("amount error: {0}")]
    Amount(#[from] AmountError),
    #[error("signature hashing failed")]
    Sighash,
}

/// One spendable output owned by the wallet.
#[derive(Debug, Clone)]
pub struct Unspent {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub address: Address,
    pub confirmations: u32,
    pub is_coinbase: bool,
}

/// An in-memory keystore plus the scanning and signing built on it.
pub struct Wallet {
    network: Network,
    /// Keys by the HASH160 of their compressed public key.
    keys: HashMap<[u8; 20], PrivateKey>,
    /// Address labels, in creation order.
    labels: Vec<(Address, String)>,
    secp: Secp256k1<secp256k1::All>,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("network", &self.network)
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl Wallet {
    pub fn new(network: Network) -> Wallet {
        Wallet {
            network,
            keys: HashMap::new(),
            labels: Vec::new(),
            secp: Secp256k1::new(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Generate a fresh key and return its address.
    pub fn new_address(&mut self, label: Option<String>) -> Address {
        let key = PrivateKey::generate(self.network);
        let address = key.address();
        self.keys.insert(address.hash(), key);
        self.labels
            .push((address, label.unwrap_or_default()));
        info!(%address, "generated wallet address");
        address
    }

    /// Adopt an external key (e.g. from a WIF import).
    pub fn import_key(&mut self, key: PrivateKey, label: Option<String>) -> Address {
        let address = key.address();
        self.keys.insert(address.hash(), key);
        self.labels.push((address, label.unwrap_or_default()));
        address
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.labels.iter().map(|(address, _)| *address).collect()
    }

    /// Whether a lock script pays one of this wallet's keys.
    ///
    /// Only the pay-to-pubkey-hash template counts: it is the only shape
    /// this wallet creates, and the only one its signer can redeem.
    pub fn owns_script(&self, script: &Script) -> bool {
        match ScriptTemplate::classify(script) {
            ScriptTemplate::PayToPubkeyHash(hash) => self.keys.contains_key(&hash),
            _ => false,
        }
    }

    /// The wallet's spendable outputs at the given chain state.
    pub fn unspent(&self, utxos: &UtxoSet, height: Height, min_confirmations: u32) -> Vec<Unspent> {
        let mut found = Vec::new();
        for (outpoint, entry) in utxos.iter() {
            if !self.owns_script(&entry.output.script_pubkey) {
                continue;
            }
            let confirmations = height.0.saturating_sub(entry.height.0) + 1;
            if confirmations < min_confirmations {
                continue;
            }
            // Immature coinbases are visible but not spendable; skip them
            // so balances reflect what can actually move.
            if entry.is_coinbase && height.0.saturating_sub(entry.height.0) < COINBASE_MATURITY {
                continue;
            }
            let hash = match ScriptTemplate::classify(&entry.output.script_pubkey).destination() {
                Some(hash) => hash,
                None => continue,
            };
            found.push(Unspent {
                outpoint: *outpoint,
                value: entry.output.value,
                address: Address::PayToPublicKeyHash {
                    network: self.network,
                    pub_key_hash: hash,
                },
                confirmations,
                is_coinbase: entry.is_coinbase,
            });
        }
        found.sort_by(|a, b| b.value.cmp(&a.value));
        found
    }

    /// The spendable balance.
    pub fn balance(&self, utxos: &UtxoSet, height: Height) -> Amount {
        Amount::sum(
            self.unspent(utxos, height, 1)
                .into_iter()
                .map(|unspent| unspent.value),
        )
        .unwrap_or(Amount::MAX)
    }

    /// Build and sign a payment of `amount` to `to`, spending the largest
    /// outputs first, with change back to a fresh address.
    pub fn create_transaction(
        &mut self,
        utxos: &UtxoSet,
        height: Height,
        to: &Address,
        amount: Amount,
    ) -> Result<Transaction, WalletError> {
        if to.network() != self.network {
            return Err(WalletError::WrongNetwork(*to));
        }

        let spendable = self.unspent(utxos, height, 1);
        let available = Amount::sum(spendable.iter().map(|unspent| unspent.value))?;

        // Largest-first selection until the target plus a size-estimated
        // fee is covered.
        let mut selected: Vec<&Unspent> = Vec::new();
        let mut gathered = Amount::ZERO;
        let mut fee = Amount::ZERO;
        for unspent in spendable.iter() {
            selected.push(unspent);
            gathered = gathered.checked_add(unspent.value)?;
            fee = estimate_fee(selected.len(), 2);
            if gathered >= amount.checked_add(fee)? {
                break;
            }
        }
        let needed = amount.checked_add(fee)?;
        if gathered < needed {
            return Err(WalletError::InsufficientFunds { needed, available });
        }

        let mut outputs = vec![Output {
            value: amount,
            script_pubkey: pay_to_pubkey_hash(to.hash()),
        }];
        let change = gathered.checked_sub(needed)?;
        if change > Amount::ZERO {
            let change_address = self.new_address(Some("change".to_owned()));
            outputs.push(Output {
                value: change,
                script_pubkey: pay_to_pubkey_hash(change_address.hash()),
            });
        }

        let unsigned = Transaction::new(
            1,
            selected
                .iter()
                .map(|unspent| Input {
                    previous_output: unspent.outpoint,
                    script_sig: Script(vec![]),
                    sequence: SEQUENCE_FINAL,
                })
                .collect(),
            outputs,
            LockTime(0),
        );

        let signed = self.sign(unsigned, &selected)?;
        debug!(
            txid = %signed.hash(),
            inputs = signed.inputs.len(),
            "built wallet transaction"
        );
        Ok(signed)
    }

    /// Sign every input of `tx` with SIGHASH_ALL against the lock scripts
    /// of the outputs being spent.
    fn sign(&self, mut tx: Transaction, spent: &[&Unspent]) -> Result<Transaction, WalletError> {
        let mut script_sigs = Vec::with_capacity(tx.inputs.len());
        for (index, unspent) in spent.iter().enumerate() {
            let key = self
                .keys
                .get(&unspent.address.hash())
                .expect("selection only uses owned outputs");
            let lock_script = pay_to_pubkey_hash(unspent.address.hash());

            let digest = tx
                .signature_hash(index, &lock_script.0, SIGHASH_ALL)
                .map_err(|_| WalletError::Sighash)?;
            let message = Message::from_slice(&digest).expect("digest is 32 bytes");
            let signature = self.secp.sign(&message, &key.secret);

            let mut der = signature.serialize_der().as_ref().to_vec();
            der.push(SIGHASH_ALL as u8);
            let pub_key = key.pub_key().serialize();

            let mut script_sig = Vec::with_capacity(der.len() + pub_key.len() + 2);
            script_sig.push(der.len() as u8);
            script_sig.extend_from_slice(&der);
            script_sig.push(pub_key.len() as u8);
            script_sig.extend_from_slice(&pub_key);
            script_sigs.push(Script(script_sig));
        }

        // The pre-images above assume every script_sig is empty, so the
        // real scripts go in only after all digests are computed.
        for (input, script_sig) in tx.inputs.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }
        Ok(Transaction::new(
            tx.version,
            tx.inputs,
            tx.outputs,
            tx.lock_time,
        ))
    }
}

/// A conventional size estimate: 148 bytes per input, 34 per output, 10
/// overhead, priced at the relay floor.
fn estimate_fee(inputs: usize, outputs: usize) -> Amount {
    let size = 148 * inputs as u64 + 34 * outputs as u64 + 10;
    Amount::from_units(size * MIN_RELAY_TX_FEE / 1000).expect("fee estimate is tiny")
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_chain::amount::COIN;
    use meridian_script::verify_script;

    /// Fund the wallet with a mature coinbase paying `value` to a fresh
    /// wallet address.
    fn funded_wallet(value: u64) -> (Wallet, UtxoSet, Height) {
        let mut wallet = Wallet::new(Network::Testnet);
        let address = wallet.new_address(None);

        let fund = Transaction::new(
            1,
            vec![Input {
                previous_output: OutPoint::NULL,
                script_sig: Script(vec![1, 2]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::from_units(value).unwrap(),
                script_pubkey: pay_to_pubkey_hash(address.hash()),
            }],
            LockTime(0),
        );

        let mut utxos = UtxoSet::new();
        utxos.apply_tx(&fund, Height(0)).unwrap();
        (wallet, utxos, Height(COINBASE_MATURITY + 10))
    }

    #[test]
    fn balance_sees_owned_mature_outputs() {
        meridian_test::init();

        let (wallet, utxos, height) = funded_wallet(50 * COIN);
        assert_eq!(wallet.balance(&utxos, height).units(), 50 * COIN);

        // Immature coinbases don't count.
        assert_eq!(wallet.balance(&utxos, Height(5)).units(), 0);

        // Another wallet sees nothing.
        let stranger = Wallet::new(Network::Testnet);
        assert_eq!(stranger.balance(&utxos, height).units(), 0);
    }

    #[test]
    fn built_transactions_pass_script_verification() {
        meridian_test::init();

        let (mut wallet, utxos, height) = funded_wallet(50 * COIN);
        let mut recipient = Wallet::new(Network::Testnet);
        let to = recipient.new_address(None);

        let amount = Amount::from_units(12 * COIN).unwrap();
        let tx = wallet
            .create_transaction(&utxos, height, &to, amount)
            .unwrap();

        // Paid the recipient and returned change.
        assert_eq!(tx.outputs[0].value, amount);
        assert_eq!(tx.outputs.len(), 2);
        assert!(recipient.owns_script(&tx.outputs[0].script_pubkey));
        assert!(wallet.owns_script(&tx.outputs[1].script_pubkey));

        // The input's signature satisfies the spent lock script.
        let entry = utxos.get(&tx.inputs[0].previous_output).unwrap();
        verify_script(
            &tx.inputs[0].script_sig.0,
            &entry.output.script_pubkey.0,
            &tx,
            0,
        )
        .expect("wallet signature verifies");

        // And value is conserved minus the fee.
        let spent = entry.output.value;
        let returned = Amount::sum(tx.outputs.iter().map(|output| output.value)).unwrap();
        assert!(returned < spent);
        assert!(spent.checked_sub(returned).unwrap().units() < COIN / 100);
    }

    #[test]
    fn overdrafts_are_refused() {
        meridian_test::init();

        let (mut wallet, utxos, height) = funded_wallet(COIN);
        let mut recipient = Wallet::new(Network::Testnet);
        let to = recipient.new_address(None);

        let result =
            wallet.create_transaction(&utxos, height, &to, Amount::from_units(COIN).unwrap());
        assert!(matches!(
            result,
            Err(WalletError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn wrong_network_addresses_are_refused() {
        meridian_test::init();

        let (mut wallet, utxos, height) = funded_wallet(COIN);
        let mut mainnet = Wallet::new(Network::Mainnet);
        let to = mainnet.new_address(None);

        assert!(matches!(
            wallet.create_transaction(&utxos, height, &to, Amount::from_units(1).unwrap()),
            Err(WalletError::WrongNetwork(_))
        ));
    }
}
