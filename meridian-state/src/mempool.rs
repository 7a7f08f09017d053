//! The pool of valid, unconfirmed transactions.
//!
//! Three indices are kept mutually consistent within each operation: the
//! primary txid map, a spent-outpoint map for conflict detection, and a
//! fee-rate ordering for eviction and block-template selection.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use meridian_chain::amount::Amount;
use meridian_chain::block::{Block, Height};
use meridian_chain::parameters::MIN_RELAY_TX_FEE;
use meridian_chain::transaction::{self, Transaction};
use meridian_chain::transparent::OutPoint;

use crate::utxo::{UtxoError, UtxoSet};

/// The default byte budget for the pool.
pub const DEFAULT_MEMPOOL_BYTES: usize = 64 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("coinbase transactions cannot enter the mempool")]
    Coinbase,
    #[error("transaction {0} is already in the mempool")]
    Duplicate(transaction::Hash),
    #[error("input {outpoint:?} is already spent by mempool transaction {existing}")]
    Conflict {
        outpoint: OutPoint,
        existing: transaction::Hash,
    },
    #[error("utxo check failed: {0}")]
    Utxo(#[from] UtxoError),
    #[error("fee rate {fee_rate} is below the relay floor {minimum}")]
    FeeTooLow { fee_rate: u64, minimum: u64 },
    #[error("mempool is full and the fee rate {fee_rate} does not beat the floor {floor}")]
    Full { fee_rate: u64, floor: u64 },
}

/// A transaction resident in the pool, with its admission metadata.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub transaction: Arc<Transaction>,
    pub time_added: u64,
    pub fee: Amount,
    pub size: usize,
    /// Base units per 1000 bytes.
    pub fee_rate: u64,
}

/// The mempool itself. Not internally synchronized: the chain manager wraps
/// it in the chain lock.
#[derive(Debug, Default)]
pub struct Mempool {
    by_txid: HashMap<transaction::Hash, MempoolEntry>,
    by_input: HashMap<OutPoint, transaction::Hash>,
    by_fee_rate: BTreeSet<(u64, transaction::Hash)>,
    total_bytes: usize,
    capacity_bytes: usize,
}

impl Mempool {
    pub fn new() -> Mempool {
        Mempool::with_capacity(DEFAULT_MEMPOOL_BYTES)
    }

    pub fn with_capacity(capacity_bytes: usize) -> Mempool {
        Mempool {
            capacity_bytes,
            ..Mempool::default()
        }
    }

    pub fn len(&self) -> usize {
        self.by_txid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_txid.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn contains(&self, txid: &transaction::Hash) -> bool {
        self.by_txid.contains_key(txid)
    }

    pub fn get(&self, txid: &transaction::Hash) -> Option<&MempoolEntry> {
        self.by_txid.get(txid)
    }

    /// The transaction, if any, that already spends `outpoint`.
    pub fn spender_of(&self, outpoint: &OutPoint) -> Option<transaction::Hash> {
        self.by_input.get(outpoint).copied()
    }

    pub fn txids(&self) -> Vec<transaction::Hash> {
        self.by_txid.keys().copied().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.by_txid.values()
    }

    /// Admit a transaction.
    ///
    /// The caller has already run the stateless and script checks; this
    /// enforces the pool's own rules: no coinbase, no duplicate, no
    /// conflicting spend, inputs present and mature in the UTXO set, value
    /// conserved, fee rate at or above the relay floor, and room in the
    /// byte budget (evicting cheaper entries to make it when possible).
    pub fn insert(
        &mut self,
        transaction: Arc<Transaction>,
        utxos: &UtxoSet,
        height: Height,
        now: u64,
    ) -> Result<(), MempoolError> {
        if transaction.is_coinbase() {
            return Err(MempoolError::Coinbase);
        }
        let txid = transaction.hash();
        if self.by_txid.contains_key(&txid) {
            return Err(MempoolError::Duplicate(txid));
        }

        // A conflict with a resident transaction is fatal to the newcomer:
        // first spend wins, there is no replacement.
        for input in transaction.inputs.iter() {
            if let Some(existing) = self.by_input.get(&input.previous_output) {
                return Err(MempoolError::Conflict {
                    outpoint: input.previous_output,
                    existing: *existing,
                });
            }
        }

        // All inputs must be unspent, mature outputs of the active chain.
        // Transactions with unknown inputs are rejected, not held.
        let mut input_value = Amount::ZERO;
        for input in transaction.inputs.iter() {
            let outpoint = &input.previous_output;
            let entry = utxos
                .get(outpoint)
                .ok_or(UtxoError::MissingInput(*outpoint))?;
            if !utxos.is_mature(outpoint, Height(height.0 + 1)) {
                return Err(UtxoError::ImmatureCoinbase {
                    outpoint: *outpoint,
                    created: entry.height,
                    spent: height,
                }
                .into());
            }
            input_value = input_value
                .checked_add(entry.output.value)
                .map_err(UtxoError::from)?;
        }
        let output_value = Amount::sum(transaction.outputs.iter().map(|output| output.value))
            .map_err(UtxoError::from)?;
        if output_value > input_value {
            return Err(UtxoError::Overspend {
                input: input_value,
                output: output_value,
            }
            .into());
        }
        let fee = input_value
            .checked_sub(output_value)
            .map_err(UtxoError::from)?;

        let size = transaction.serialized_size();
        let fee_rate = fee.units().saturating_mul(1000) / size.max(1) as u64;
        if fee_rate < MIN_RELAY_TX_FEE {
            return Err(MempoolError::FeeTooLow {
                fee_rate,
                minimum: MIN_RELAY_TX_FEE,
            });
        }

        // A transaction larger than the whole budget can never fit.
        if size > self.capacity_bytes {
            return Err(MempoolError::Full { fee_rate, floor: 0 });
        }

        // When the pool is full the newcomer must beat the cheapest
        // resident, then residents are evicted until the newcomer fits.
        if self.total_bytes + size > self.capacity_bytes {
            let floor = self
                .by_fee_rate
                .iter()
                .next()
                .map(|(rate, _)| *rate)
                .unwrap_or(0);
            if fee_rate <= floor {
                return Err(MempoolError::Full { fee_rate, floor });
            }
            while self.total_bytes + size > self.capacity_bytes {
                let victim = match self.by_fee_rate.iter().next() {
                    Some((_, txid)) => *txid,
                    None => break,
                };
                debug!(%victim, "evicting lowest-fee-rate transaction");
                self.remove(&victim);
            }
        }

        for input in transaction.inputs.iter() {
            self.by_input.insert(input.previous_output, txid);
        }
        self.by_fee_rate.insert((fee_rate, txid));
        self.total_bytes += size;
        self.by_txid.insert(
            txid,
            MempoolEntry {
                transaction,
                time_added: now,
                fee,
                size,
                fee_rate,
            },
        );

        metrics::gauge!("mempool.size", self.by_txid.len() as f64);
        metrics::gauge!("mempool.bytes", self.total_bytes as f64);
        Ok(())
    }

    /// Remove one transaction, keeping all three indices consistent.
    pub fn remove(&mut self, txid: &transaction::Hash) -> Option<MempoolEntry> {
        let entry = self.by_txid.remove(txid)?;
        for input in entry.transaction.inputs.iter() {
            self.by_input.remove(&input.previous_output);
        }
        self.by_fee_rate.remove(&(entry.fee_rate, *txid));
        self.total_bytes -= entry.size;
        Some(entry)
    }

    /// Remove everything a newly connected block confirmed or invalidated:
    /// the block's own transactions, and any resident transaction that
    /// spends an outpoint the block just spent.
    pub fn remove_committed(&mut self, block: &Block) {
        for tx in block.transactions.iter() {
            self.remove(&tx.hash());

            for input in tx.inputs.iter() {
                if let Some(conflicting) = self.by_input.get(&input.previous_output).copied() {
                    debug!(%conflicting, "dropping transaction conflicting with block");
                    self.remove(&conflicting);
                }
            }
        }
        metrics::gauge!("mempool.size", self.by_txid.len() as f64);
        metrics::gauge!("mempool.bytes", self.total_bytes as f64);
    }

    /// Select transactions for a block template: greedy by descending fee
    /// rate, skipping entries that no longer fit the byte budget, stopping
    /// at the count cap.
    pub fn select_for_block(&self, max_bytes: usize, max_count: usize) -> Vec<Arc<Transaction>> {
        let mut selected = Vec::new();
        let mut remaining = max_bytes;

        for (_, txid) in self.by_fee_rate.iter().rev() {
            if selected.len() >= max_count {
                break;
            }
            let entry = &self.by_txid[txid];
            if entry.size <= remaining {
                remaining -= entry.size;
                selected.push(entry.transaction.clone());
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_chain::amount::COIN;
    use meridian_chain::block::Header;
    use meridian_chain::transaction::LockTime;
    use meridian_chain::transparent::{Input, Output, Script, SEQUENCE_FINAL};
    use meridian_chain::work::difficulty::CompactDifficulty;

    /// The height used for admissions; old enough that height-0 coinbase
    /// funding is mature.
    const TIP: Height = Height(500);

    fn coinbase_fund(salt: u8, value: u64) -> Transaction {
        Transaction::new(
            1,
            vec![Input {
                previous_output: OutPoint::NULL,
                script_sig: Script(vec![salt, salt]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::from_units(value).unwrap(),
                script_pubkey: Script(vec![0x51]),
            }],
            LockTime(0),
        )
    }

    /// Spend `prev:index`, returning `value` and padding the transaction
    /// with roughly `pad` extra script bytes.
    fn spend_of(prev: &Transaction, index: u32, value: u64, pad: usize) -> Arc<Transaction> {
        Arc::new(Transaction::new(
            1,
            vec![Input {
                previous_output: OutPoint {
                    hash: prev.hash(),
                    index,
                },
                script_sig: Script(vec![0x6a; pad]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::from_units(value).unwrap(),
                script_pubkey: Script(vec![0x51]),
            }],
            LockTime(0),
        ))
    }

    fn funded_utxos(funds: &[&Transaction]) -> UtxoSet {
        let mut utxos = UtxoSet::new();
        for fund in funds {
            utxos.apply_tx(fund, Height(0)).unwrap();
        }
        utxos
    }

    #[test]
    fn conflicting_spends_leave_at_most_one_resident() {
        meridian_test::init();

        let fund = coinbase_fund(1, 50 * COIN);
        let utxos = funded_utxos(&[&fund]);
        let mut mempool = Mempool::new();

        let first = spend_of(&fund, 0, 49 * COIN, 10);
        let second = spend_of(&fund, 0, 48 * COIN, 20);

        mempool.insert(first.clone(), &utxos, TIP, 1).unwrap();
        let err = mempool.insert(second.clone(), &utxos, TIP, 2).unwrap_err();
        assert!(matches!(err, MempoolError::Conflict { existing, .. } if existing == first.hash()));

        assert!(mempool.contains(&first.hash()));
        assert!(!mempool.contains(&second.hash()));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn unknown_inputs_are_rejected_not_held() {
        meridian_test::init();

        let fund = coinbase_fund(1, 50 * COIN);
        let utxos = UtxoSet::new();
        let mut mempool = Mempool::new();

        let orphan = spend_of(&fund, 0, 49 * COIN, 0);
        assert!(matches!(
            mempool.insert(orphan, &utxos, TIP, 1),
            Err(MempoolError::Utxo(UtxoError::MissingInput(_)))
        ));
        assert!(mempool.is_empty());
    }

    #[test]
    fn coinbase_and_duplicates_are_rejected() {
        meridian_test::init();

        let fund = coinbase_fund(1, 50 * COIN);
        let utxos = funded_utxos(&[&fund]);
        let mut mempool = Mempool::new();

        assert_eq!(
            mempool.insert(Arc::new(coinbase_fund(9, COIN)), &utxos, TIP, 1),
            Err(MempoolError::Coinbase)
        );

        let tx = spend_of(&fund, 0, 49 * COIN, 0);
        mempool.insert(tx.clone(), &utxos, TIP, 1).unwrap();
        assert_eq!(
            mempool.insert(tx.clone(), &utxos, TIP, 2),
            Err(MempoolError::Duplicate(tx.hash()))
        );
    }

    #[test]
    fn fee_rate_floor_is_enforced() {
        meridian_test::init();

        let fund = coinbase_fund(1, 50 * COIN);
        let utxos = funded_utxos(&[&fund]);
        let mut mempool = Mempool::new();

        // A fee of zero is always below the floor.
        let free_rider = spend_of(&fund, 0, 50 * COIN, 0);
        assert!(matches!(
            mempool.insert(free_rider, &utxos, TIP, 1),
            Err(MempoolError::FeeTooLow { .. })
        ));
    }

    #[test]
    fn full_pool_evicts_cheapest_for_a_better_payer() {
        meridian_test::init();

        // Three distinct funded outputs; pool sized for about two 1KB txs.
        let funds: Vec<_> = (1..=3).map(|i| coinbase_fund(i, 50 * COIN)).collect();
        let utxos = funded_utxos(&[&funds[0], &funds[1], &funds[2]]);
        let mut mempool = Mempool::with_capacity(2300);

        // ~1KB each. Fees chosen so tx0 is the cheapest resident.
        let cheap = spend_of(&funds[0], 0, 50 * COIN - 1100, 1000);
        let mid = spend_of(&funds[1], 0, 50 * COIN - 2200, 1000);
        mempool.insert(cheap.clone(), &utxos, TIP, 1).unwrap();
        mempool.insert(mid.clone(), &utxos, TIP, 2).unwrap();

        // A newcomer at ~100x the rate evicts the cheapest entry.
        let rich = spend_of(&funds[2], 0, 50 * COIN - 110_000, 1000);
        mempool.insert(rich.clone(), &utxos, TIP, 3).unwrap();
        assert!(!mempool.contains(&cheap.hash()));
        assert!(mempool.contains(&mid.hash()));
        assert!(mempool.contains(&rich.hash()));

        // The evicted output is spendable again, but a newcomer at the
        // floor rate no longer gets in.
        let poor = spend_of(&funds[0], 0, 50 * COIN - 1100, 999);
        assert!(matches!(
            mempool.insert(poor, &utxos, TIP, 4),
            Err(MempoolError::Full { .. })
        ));
    }

    #[test]
    fn committed_and_conflicting_transactions_are_flushed() {
        meridian_test::init();

        let funds: Vec<_> = (1..=2).map(|i| coinbase_fund(i, 50 * COIN)).collect();
        let utxos = funded_utxos(&[&funds[0], &funds[1]]);
        let mut mempool = Mempool::new();

        let confirmed = spend_of(&funds[0], 0, 49 * COIN, 0);
        let double_spent = spend_of(&funds[1], 0, 49 * COIN, 0);
        mempool.insert(confirmed.clone(), &utxos, TIP, 1).unwrap();
        mempool.insert(double_spent.clone(), &utxos, TIP, 2).unwrap();

        // The block includes `confirmed` and a *different* spend of the
        // output `double_spent` uses.
        let competing = spend_of(&funds[1], 0, 48 * COIN, 5);
        let transactions = vec![confirmed.clone(), competing];
        let merkle_root = transactions.iter().map(|tx| tx.hash()).collect();
        let block = Block {
            header: Header::new(
                1,
                meridian_chain::block::Hash([0; 32]),
                merkle_root,
                0,
                CompactDifficulty(0x207fffff),
                0,
            ),
            transactions,
        };

        mempool.remove_committed(&block);
        assert!(mempool.is_empty());
        assert_eq!(mempool.total_bytes(), 0);
    }

    #[test]
    fn block_template_selection_is_fee_rate_descending() {
        meridian_test::init();

        let funds: Vec<_> = (1..=3).map(|i| coinbase_fund(i, 50 * COIN)).collect();
        let utxos = funded_utxos(&[&funds[0], &funds[1], &funds[2]]);
        let mut mempool = Mempool::new();

        let low = spend_of(&funds[0], 0, 50 * COIN - 200, 0);
        let high = spend_of(&funds[1], 0, 50 * COIN - 100_000, 0);
        let mid = spend_of(&funds[2], 0, 50 * COIN - 10_000, 0);
        for (i, tx) in [&low, &high, &mid].iter().enumerate() {
            mempool.insert((*tx).clone(), &utxos, TIP, i as u64).unwrap();
        }

        let selected = mempool.select_for_block(1_000_000, 10);
        let order: Vec<_> = selected.iter().map(|tx| tx.hash()).collect();
        assert_eq!(order, vec![high.hash(), mid.hash(), low.hash()]);

        // The count cap truncates from the low-fee end.
        let top_two = mempool.select_for_block(1_000_000, 2);
        assert_eq!(top_two.len(), 2);
        assert_eq!(top_two[0].hash(), high.hash());
    }
}
