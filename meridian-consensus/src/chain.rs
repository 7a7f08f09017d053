//! The chain manager: block indexing, best-chain selection by cumulative
//! work, and atomic reorganization.
//!
//! The block index is an arena of nodes addressed by `BlockId`, linked
//! both ways (`prev` id and `children` ids), forming a tree rooted at
//! genesis. The manager is not internally synchronized: the embedding node
//! wraps it in a single coarse lock, which serializes every mutation of
//! the index, the height map, the UTXO set, and the mempool. A
//! reorganization holds that lock for its whole duration, so observers see
//! either the old chain or the new one, never a mixture.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use meridian_chain::block::{self, Block, Header, Height};
use meridian_chain::parameters::{Network, RETARGET_INTERVAL};
use meridian_chain::transaction::{self, Transaction};
use meridian_chain::work::difficulty::{CompactDifficulty, Work};
use meridian_state::{Mempool, UndoLog, UtxoSet};

use crate::check;
use crate::difficulty::{is_retarget_height, retarget};
use crate::error::{BlockError, SubmitError};
use crate::subsidy::block_subsidy;

/// The bound on blocks held while their parent is unknown. When full, the
/// oldest orphan is dropped.
pub const MAX_ORPHAN_BLOCKS: usize = 128;

/// An index into the block-index arena.
pub type BlockId = u32;

/// One node of the block index.
#[derive(Debug)]
struct BlockIndex {
    hash: block::Hash,
    header: Header,
    height: Height,
    /// Total work of the chain ending at this block.
    chain_work: Work,
    prev: Option<BlockId>,
    children: Vec<BlockId>,
    in_main_chain: bool,
    /// Cleared when the block fails to connect during a reorganization.
    valid: bool,
    /// The undo log from when this block was connected; present exactly
    /// while the block is on the main chain (genesis excepted).
    undo: Option<UndoLog>,
}

/// The outcome of offering a block to the chain.
#[derive(Debug)]
pub enum BlockAcceptance {
    /// The block extends the index; `reorg` reports a chain switch if the
    /// block ended up displacing the previous best chain.
    Accepted {
        height: Height,
        reorg: Option<ReorgInfo>,
    },
    /// The block is already indexed.
    Duplicate,
    /// The block's parent is unknown; it is parked in the orphan pool.
    Orphan,
}

/// A completed chain switch.
#[derive(Debug, Clone)]
pub struct ReorgInfo {
    pub fork_height: Height,
    /// Hashes leaving the main chain, tip first.
    pub disconnected: Vec<block::Hash>,
    /// Hashes joining the main chain, fork first.
    pub connected: Vec<block::Hash>,
}

/// Why stored chain state could not be installed. The caller falls back
/// to replaying the stored blocks through full validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestoreError {
    #[error("stored block {0:?} does not extend the restored tip")]
    NotSequential(block::Hash),
    #[error("stored block {0:?} carries invalid difficulty bits")]
    InvalidBits(block::Hash),
    #[error("the persisted utxo snapshot is missing or empty")]
    MissingUtxos,
}

/// Block index, best-chain state, UTXO set, and mempool for one node.
#[derive(Debug)]
pub struct ChainManager {
    network: Network,
    arena: Vec<BlockIndex>,
    by_hash: HashMap<block::Hash, BlockId>,
    /// Main chain only.
    by_height: HashMap<Height, block::Hash>,
    blocks: HashMap<block::Hash, Arc<Block>>,
    /// Main-chain transactions, for lookup by txid.
    tx_index: HashMap<transaction::Hash, block::Hash>,
    best: BlockId,
    genesis: BlockId,
    orphans: HashMap<block::Hash, Arc<Block>>,
    orphan_order: VecDeque<block::Hash>,
    utxos: UtxoSet,
    pub mempool: Mempool,
}

impl ChainManager {
    /// Start a chain from its genesis block.
    ///
    /// Genesis is trusted by identity: its proof of work and difficulty
    /// schedule are not checked.
    pub fn new(network: Network, genesis: Block) -> ChainManager {
        let genesis = Arc::new(genesis);
        let hash = genesis.hash();

        let mut utxos = UtxoSet::new();
        utxos
            .apply_tx(&genesis.transactions[0], Height(0))
            .expect("the genesis coinbase applies to an empty set");

        let chain_work = genesis
            .header
            .bits
            .to_expanded()
            .map(|target| target.to_work())
            .unwrap_or(Work::ZERO);

        let mut tx_index = HashMap::new();
        for tx in genesis.transactions.iter() {
            tx_index.insert(tx.hash(), hash);
        }

        let index = BlockIndex {
            hash,
            header: genesis.header,
            height: Height(0),
            chain_work,
            prev: None,
            children: Vec::new(),
            in_main_chain: true,
            valid: true,
            undo: None,
        };

        let mut by_hash = HashMap::new();
        by_hash.insert(hash, 0);
        let mut by_height = HashMap::new();
        by_height.insert(Height(0), hash);
        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);

        info!(%hash, %network, "initialized chain at genesis");

        ChainManager {
            network,
            arena: vec![index],
            by_hash,
            by_height,
            blocks,
            tx_index,
            best: 0,
            genesis: 0,
            orphans: HashMap::new(),
            orphan_order: VecDeque::new(),
            utxos,
            mempool: Mempool::new(),
        }
    }

    /// Rebuild a chain from the node's own storage: the main-chain blocks
    /// in height order with the undo logs recorded when they connected,
    /// plus the persisted UTXO set.
    ///
    /// Nothing is re-validated or re-applied — the store wrote this state
    /// itself, so it is trusted the way the genesis block is. Any
    /// inconsistency aborts the restore and the caller replays the blocks
    /// through [`ChainManager::accept_block`] instead.
    pub fn restore(
        network: Network,
        genesis: Block,
        blocks: Vec<(Arc<Block>, UndoLog)>,
        utxos: UtxoSet,
    ) -> Result<ChainManager, RestoreError> {
        let mut chain = ChainManager::new(network, genesis);
        let has_blocks = !blocks.is_empty();

        for (block, undo) in blocks {
            chain.attach_restored(block, undo)?;
        }

        if has_blocks {
            // The snapshot replaces the genesis-only set built by `new`.
            if utxos.is_empty() {
                return Err(RestoreError::MissingUtxos);
            }
            chain.utxos = utxos;
        }

        info!(height = chain.height().0, "chain restored from storage");
        Ok(chain)
    }

    /// Append one stored block to the restored tip, indexing it without
    /// touching the UTXO set.
    fn attach_restored(&mut self, block: Arc<Block>, undo: UndoLog) -> Result<(), RestoreError> {
        let hash = block.hash();
        if block.header.previous_block_hash != self.best_hash() {
            return Err(RestoreError::NotSequential(hash));
        }

        let prev_id = self.best;
        let height = Height(self.entry(prev_id).height.0 + 1);
        let work = block
            .header
            .bits
            .to_expanded()
            .ok_or(RestoreError::InvalidBits(hash))?
            .to_work();
        let chain_work = self
            .entry(prev_id)
            .chain_work
            .checked_add(work)
            .expect("cumulative work cannot reach 2^256");

        let id = self.arena.len() as BlockId;
        self.arena.push(BlockIndex {
            hash,
            header: block.header,
            height,
            chain_work,
            prev: Some(prev_id),
            children: Vec::new(),
            in_main_chain: false,
            valid: true,
            undo: None,
        });
        self.arena[prev_id as usize].children.push(id);
        self.by_hash.insert(hash, id);
        self.blocks.insert(hash, block);
        self.connect_index_entry(id, undo);
        self.best = id;
        Ok(())
    }

    /// The undo log of a main-chain block, for persistence. Genesis has
    /// none.
    pub fn undo_log(&self, hash: &block::Hash) -> Option<UndoLog> {
        self.by_hash
            .get(hash)
            .and_then(|&id| self.entry(id).undo.clone())
    }

    fn entry(&self, id: BlockId) -> &BlockIndex {
        &self.arena[id as usize]
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn height(&self) -> Height {
        self.entry(self.best).height
    }

    pub fn best_hash(&self) -> block::Hash {
        self.entry(self.best).hash
    }

    pub fn best_chain_work(&self) -> Work {
        self.entry(self.best).chain_work
    }

    pub fn best_header(&self) -> Header {
        self.entry(self.best).header
    }

    pub fn genesis_hash(&self) -> block::Hash {
        self.entry(self.genesis).hash
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Whether the block is already known, as indexed data or as an orphan.
    pub fn contains_block(&self, hash: &block::Hash) -> bool {
        self.by_hash.contains_key(hash) || self.orphans.contains_key(hash)
    }

    pub fn block(&self, hash: &block::Hash) -> Option<Arc<Block>> {
        self.blocks.get(hash).cloned()
    }

    pub fn hash_at_height(&self, height: Height) -> Option<block::Hash> {
        self.by_height.get(&height).copied()
    }

    pub fn block_at_height(&self, height: Height) -> Option<Arc<Block>> {
        self.hash_at_height(height)
            .and_then(|hash| self.block(&hash))
    }

    /// The main-chain height of an indexed block, if it is on the main
    /// chain.
    pub fn main_chain_height(&self, hash: &block::Hash) -> Option<Height> {
        let entry = self.entry(*self.by_hash.get(hash)?);
        if entry.in_main_chain {
            Some(entry.height)
        } else {
            None
        }
    }

    /// Look up a transaction in the mempool or the main chain. Returns the
    /// containing block hash for confirmed transactions.
    pub fn transaction(
        &self,
        txid: &transaction::Hash,
    ) -> Option<(Arc<Transaction>, Option<block::Hash>)> {
        if let Some(entry) = self.mempool.get(txid) {
            return Some((entry.transaction.clone(), None));
        }
        let block_hash = self.tx_index.get(txid)?;
        let block = self.blocks.get(block_hash)?;
        let tx = block
            .transactions
            .iter()
            .find(|tx| tx.hash() == *txid)?
            .clone();
        Some((tx, Some(*block_hash)))
    }

    /// The `(height, hash)` pairs of the current main chain, in order.
    pub fn main_chain(&self) -> Vec<(Height, block::Hash)> {
        let mut pairs: Vec<_> = self
            .by_height
            .iter()
            .map(|(height, hash)| (*height, *hash))
            .collect();
        pairs.sort();
        pairs
    }

    /// The bits a block extending the current best tip must carry.
    pub fn next_required_bits(&self) -> CompactDifficulty {
        self.expected_bits_for(self.best)
    }

    fn expected_bits_for(&self, prev_id: BlockId) -> CompactDifficulty {
        let prev = self.entry(prev_id);
        let next_height = Height(prev.height.0 + 1);
        if !is_retarget_height(next_height) {
            return prev.header.bits;
        }

        // Walk back along this branch to the first block of the closing
        // interval; during a fork this may not be the main chain.
        let first_height = Height(next_height.0 - RETARGET_INTERVAL);
        let mut id = prev_id;
        while self.entry(id).height > first_height {
            id = self
                .entry(id)
                .prev
                .expect("blocks above genesis have parents");
        }
        let first_time = self.entry(id).header.time;

        retarget(prev.header.bits, first_time, prev.header.time, self.network)
    }

    /// Offer a block to the chain, then drain any orphans it reconnects.
    pub fn accept_block(
        &mut self,
        block: Arc<Block>,
        now: u64,
    ) -> Result<BlockAcceptance, BlockError> {
        let acceptance = self.accept_inner(block, now)?;

        if let BlockAcceptance::Accepted { .. } = acceptance {
            self.drain_orphans(now);
        }
        Ok(acceptance)
    }

    fn accept_inner(
        &mut self,
        block: Arc<Block>,
        now: u64,
    ) -> Result<BlockAcceptance, BlockError> {
        let hash = block.hash();

        if let Some(&id) = self.by_hash.get(&hash) {
            if !self.entry(id).valid {
                return Err(BlockError::KnownInvalid);
            }
            debug!(%hash, "duplicate block");
            return Ok(BlockAcceptance::Duplicate);
        }
        if self.orphans.contains_key(&hash) {
            return Ok(BlockAcceptance::Duplicate);
        }

        check::block(&block, self.network)?;

        let prev_id = match self.by_hash.get(&block.header.previous_block_hash) {
            Some(&id) => id,
            None => {
                self.add_orphan(hash, block);
                return Ok(BlockAcceptance::Orphan);
            }
        };
        if !self.entry(prev_id).valid {
            return Err(BlockError::KnownInvalid);
        }

        let prev = self.entry(prev_id);
        let height = Height(prev.height.0 + 1);
        let prev_time = prev.header.time;
        let prev_work = prev.chain_work;

        let expected = self.expected_bits_for(prev_id);
        if block.header.bits != expected {
            return Err(BlockError::BadDifficulty {
                expected,
                actual: block.header.bits,
            });
        }

        check::time_is_valid(block.header.time, prev_time, now)?;

        // Contextual validation runs against the UTXO set as it would be
        // with this block's parent as the tip.
        let mut view = self.utxo_view_at(prev_id)?;
        {
            let mut scratch = view.clone();
            for tx in block.transactions.iter() {
                check::is_final(tx, height, block.header.time)?;
                if !tx.is_coinbase() {
                    check::scripts_verify(tx, &scratch)?;
                }
                scratch.apply_tx(tx, height)?;
            }
        }
        let (undo, fees) = view.apply_block(&block, height, block_subsidy(height))?;

        let work = block
            .header
            .bits
            .to_expanded()
            .expect("bits were validated above")
            .to_work();
        let chain_work = prev_work
            .checked_add(work)
            .expect("cumulative work cannot reach 2^256");

        let id = self.arena.len() as BlockId;
        self.arena.push(BlockIndex {
            hash,
            header: block.header,
            height,
            chain_work,
            prev: Some(prev_id),
            children: Vec::new(),
            in_main_chain: false,
            valid: true,
            undo: None,
        });
        self.arena[prev_id as usize].children.push(id);
        self.by_hash.insert(hash, id);
        self.blocks.insert(hash, block.clone());

        let reorg = if chain_work > self.entry(self.best).chain_work {
            if prev_id == self.best {
                // Plain extension: `view` already has the block connected.
                self.utxos = view;
                self.connect_index_entry(id, undo);
                self.best = id;
                self.mempool.remove_committed(&block);
                debug!(%hash, ?height, ?fees, "extended best chain");
                None
            } else {
                Some(self.reorganize_to(id, now)?)
            }
        } else {
            debug!(%hash, ?height, "accepted side-chain block");
            None
        };

        metrics::gauge!("chain.best.height", self.height().0 as f64);
        Ok(BlockAcceptance::Accepted { height, reorg })
    }

    /// Record `id` as a main-chain block that was just connected.
    fn connect_index_entry(&mut self, id: BlockId, undo: UndoLog) {
        let (hash, height) = {
            let entry = &mut self.arena[id as usize];
            entry.in_main_chain = true;
            entry.undo = Some(undo);
            (entry.hash, entry.height)
        };
        self.by_height.insert(height, hash);
        let block = self.blocks[&hash].clone();
        for tx in block.transactions.iter() {
            self.tx_index.insert(tx.hash(), hash);
        }
    }

    /// Clear the main-chain records of `id` as it is disconnected.
    fn disconnect_index_entry(&mut self, id: BlockId) {
        let (hash, height) = {
            let entry = &mut self.arena[id as usize];
            entry.in_main_chain = false;
            (entry.hash, entry.height)
        };
        self.by_height.remove(&height);
        let block = self.blocks[&hash].clone();
        for tx in block.transactions.iter() {
            self.tx_index.remove(&tx.hash());
        }
    }

    /// The UTXO set as it stands with `target` as the tip: the live set
    /// for the best tip, or a clone rewound to the fork and replayed up
    /// the side chain.
    fn utxo_view_at(&self, target: BlockId) -> Result<UtxoSet, BlockError> {
        let mut view = self.utxos.clone();
        if target == self.best {
            return Ok(view);
        }

        let fork = self.find_fork(self.best, target);

        let mut id = self.best;
        while id != fork {
            let entry = self.entry(id);
            let block = &self.blocks[&entry.hash];
            let undo = entry
                .undo
                .as_ref()
                .expect("main-chain entries keep their undo logs");
            view.revert_block(block, undo)
                .expect("undo logs revert the blocks that produced them");
            id = entry.prev.expect("the fork point is at or above genesis");
        }

        let mut path = Vec::new();
        let mut id = target;
        while id != fork {
            path.push(id);
            id = self
                .entry(id)
                .prev
                .expect("the fork point is at or above genesis");
        }
        for &id in path.iter().rev() {
            let entry = self.entry(id);
            let block = &self.blocks[&entry.hash];
            view.apply_block(block, entry.height, block_subsidy(entry.height))?;
        }

        Ok(view)
    }

    /// The lowest common ancestor of two indexed blocks.
    fn find_fork(&self, a: BlockId, b: BlockId) -> BlockId {
        let (mut a, mut b) = (a, b);
        while self.entry(a).height > self.entry(b).height {
            a = self.entry(a).prev.expect("heights above genesis");
        }
        while self.entry(b).height > self.entry(a).height {
            b = self.entry(b).prev.expect("heights above genesis");
        }
        while a != b {
            a = self.entry(a).prev.expect("chains share a genesis");
            b = self.entry(b).prev.expect("chains share a genesis");
        }
        a
    }

    /// Switch the main chain to `new_tip`.
    ///
    /// Effectively atomic: on any connect failure, the work done so far is
    /// undone, the old chain is restored, and the offending block is
    /// marked invalid.
    fn reorganize_to(&mut self, new_tip: BlockId, now: u64) -> Result<ReorgInfo, BlockError> {
        let fork = self.find_fork(self.best, new_tip);
        let fork_height = self.entry(fork).height;

        let mut outgoing = Vec::new();
        let mut id = self.best;
        while id != fork {
            outgoing.push(id);
            id = self.entry(id).prev.expect("fork is an ancestor of best");
        }

        let mut incoming = Vec::new();
        let mut id = new_tip;
        while id != fork {
            incoming.push(id);
            id = self.entry(id).prev.expect("fork is an ancestor of new tip");
        }
        incoming.reverse();

        info!(
            ?fork_height,
            disconnecting = outgoing.len(),
            connecting = incoming.len(),
            "reorganizing"
        );

        // Disconnect the old branch, tip first, collecting its
        // transactions for re-admission.
        let mut returned = Vec::new();
        for &id in outgoing.iter() {
            let hash = self.entry(id).hash;
            let block = self.blocks[&hash].clone();
            let undo = self.arena[id as usize]
                .undo
                .take()
                .expect("main-chain entries keep their undo logs");
            self.utxos
                .revert_block(&block, &undo)
                .expect("undo logs revert the blocks that produced them");
            self.disconnect_index_entry(id);
            for tx in block.transactions.iter().skip(1) {
                returned.push(tx.clone());
            }
        }

        // Connect the new branch, fork first.
        for (position, &id) in incoming.iter().enumerate() {
            let (hash, height) = {
                let entry = self.entry(id);
                (entry.hash, entry.height)
            };
            let block = self.blocks[&hash].clone();
            match self.utxos.apply_block(&block, height, block_subsidy(height)) {
                Ok((undo, _fees)) => {
                    self.connect_index_entry(id, undo);
                    self.mempool.remove_committed(&block);
                }
                Err(error) => {
                    warn!(%hash, %error, "reorganization failed; rolling back");
                    self.rollback_failed_reorg(&incoming[..position], &outgoing);
                    self.arena[id as usize].valid = false;
                    return Err(error.into());
                }
            }
        }

        self.best = new_tip;

        // Give the disconnected transactions a chance to re-enter the
        // pool; stale ones are silently dropped.
        let height = self.height();
        for tx in returned {
            let txid = tx.hash();
            if let Err(error) = self.mempool.insert(tx, &self.utxos, height, now) {
                debug!(%txid, %error, "dropped disconnected transaction");
            }
        }

        metrics::counter!("chain.reorgs", 1);
        Ok(ReorgInfo {
            fork_height,
            disconnected: outgoing.iter().map(|&id| self.entry(id).hash).collect(),
            connected: incoming.iter().map(|&id| self.entry(id).hash).collect(),
        })
    }

    /// Restore the pre-reorg chain after a connect failure: peel off the
    /// partially connected new branch, then replay the old branch.
    fn rollback_failed_reorg(&mut self, connected: &[BlockId], outgoing: &[BlockId]) {
        for &id in connected.iter().rev() {
            let hash = self.entry(id).hash;
            let block = self.blocks[&hash].clone();
            let undo = self.arena[id as usize]
                .undo
                .take()
                .expect("just-connected entries have undo logs");
            self.utxos
                .revert_block(&block, &undo)
                .expect("undo logs revert the blocks that produced them");
            self.disconnect_index_entry(id);
        }

        for &id in outgoing.iter().rev() {
            let (hash, height) = {
                let entry = self.entry(id);
                (entry.hash, entry.height)
            };
            let block = self.blocks[&hash].clone();
            let (undo, _fees) = self
                .utxos
                .apply_block(&block, height, block_subsidy(height))
                .expect("previously connected blocks reconnect");
            self.connect_index_entry(id, undo);
        }
    }

    fn add_orphan(&mut self, hash: block::Hash, block: Arc<Block>) {
        while self.orphans.len() >= MAX_ORPHAN_BLOCKS {
            if let Some(oldest) = self.orphan_order.pop_front() {
                self.orphans.remove(&oldest);
                debug!(%oldest, "orphan pool full, dropping oldest");
            } else {
                break;
            }
        }
        debug!(%hash, "storing orphan block");
        self.orphans.insert(hash, block);
        self.orphan_order.push_back(hash);
        metrics::gauge!("chain.orphans", self.orphans.len() as f64);
    }

    /// Re-offer orphans whose parents have become known, cascading.
    fn drain_orphans(&mut self, now: u64) {
        loop {
            let ready: Vec<block::Hash> = self
                .orphans
                .iter()
                .filter(|(_, block)| {
                    self.by_hash
                        .contains_key(&block.header.previous_block_hash)
                })
                .map(|(hash, _)| *hash)
                .collect();
            if ready.is_empty() {
                return;
            }

            for hash in ready {
                let block = match self.orphans.remove(&hash) {
                    Some(block) => block,
                    None => continue,
                };
                self.orphan_order.retain(|queued| *queued != hash);
                match self.accept_inner(block, now) {
                    Ok(BlockAcceptance::Accepted { height, .. }) => {
                        debug!(%hash, ?height, "connected former orphan");
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%hash, %error, "orphan failed validation");
                    }
                }
            }
        }
    }

    /// Admit a transaction to the mempool, running the full stateless and
    /// contextual rule set first.
    pub fn submit_transaction(
        &mut self,
        tx: Arc<Transaction>,
        now: u64,
    ) -> Result<transaction::Hash, SubmitError> {
        check::transaction(&tx).map_err(SubmitError::from)?;

        // The full contextual rule set runs as if the transaction were
        // mined in the next block.
        let next_height = Height(self.height().0 + 1);
        if !tx.is_coinbase() {
            check::contextual_transaction(&tx, &self.utxos, next_height, now)
                .map_err(SubmitError::from)?;
        }

        let txid = tx.hash();
        self.mempool
            .insert(tx, &self.utxos, self.height(), now)?;
        debug!(%txid, "accepted transaction into mempool");
        Ok(txid)
    }

    /// A geometric-backoff list of main-chain hashes, newest first, used
    /// by peers to find the common ancestor: ten consecutive steps, then
    /// doubling, always ending at genesis.
    pub fn block_locator(&self) -> Vec<block::Hash> {
        let mut hashes = Vec::new();
        let mut height = self.height();
        let mut step = 1u32;

        loop {
            let hash = self.by_height[&height];
            hashes.push(hash);
            if height.0 == 0 {
                break;
            }
            if hashes.len() >= 10 {
                step = step.saturating_mul(2);
            }
            height = Height(height.0.saturating_sub(step));
        }
        hashes
    }

    /// The first locator hash that lies on the main chain; genesis if none
    /// does.
    pub fn find_common_ancestor(&self, locator: &[block::Hash]) -> block::Hash {
        for hash in locator {
            if self.main_chain_height(hash).is_some() {
                return *hash;
            }
        }
        self.genesis_hash()
    }

    /// Main-chain hashes after the locator's common ancestor, up to `max`
    /// entries, optionally stopping at (and including) `stop`.
    pub fn hashes_after(
        &self,
        locator: &[block::Hash],
        stop: Option<block::Hash>,
        max: usize,
    ) -> Vec<block::Hash> {
        let ancestor = self.find_common_ancestor(locator);
        let start = self
            .main_chain_height(&ancestor)
            .unwrap_or(Height(0))
            .0
            + 1;

        let mut hashes = Vec::new();
        for height in start..=self.height().0 {
            if hashes.len() >= max {
                break;
            }
            let hash = self.by_height[&Height(height)];
            hashes.push(hash);
            if Some(hash) == stop {
                break;
            }
        }
        hashes
    }
}
