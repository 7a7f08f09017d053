//! The on-disk store: blocks with their undo logs, the main-chain height
//! index, the UTXO set, and the peer/ban tables, each in its own sled
//! tree.
//!
//! Values are stored in the canonical consensus serialization, so the
//! on-disk bytes hash to the same ids as the wire bytes.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use meridian_chain::block::{self, Block, Height};
use meridian_chain::transparent::OutPoint;
use meridian_chain::{MeridianDeserialize, MeridianSerialize, SerializationError};

use crate::utxo::{UndoLog, UtxoEntry, UtxoSet};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),
    #[error("corrupt stored value: {0}")]
    Corrupt(#[from] SerializationError),
}

/// A handle to the node's persistent state.
#[derive(Clone)]
pub struct Store {
    block_by_hash: sled::Tree,
    undo_by_hash: sled::Tree,
    hash_by_height: sled::Tree,
    utxo_by_outpoint: sled::Tree,
    peers: sled::Tree,
    bans: sled::Tree,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish()
    }
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Store, StoreError> {
        let db = sled::open(path)?;
        info!("opened state database");
        Store::with_db(db)
    }

    /// An in-memory store for tests and ephemeral nodes.
    pub fn in_memory() -> Result<Store, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Store::with_db(db)
    }

    fn with_db(db: sled::Db) -> Result<Store, StoreError> {
        Ok(Store {
            block_by_hash: db.open_tree(b"block_by_hash")?,
            undo_by_hash: db.open_tree(b"undo_by_hash")?,
            hash_by_height: db.open_tree(b"hash_by_height")?,
            utxo_by_outpoint: db.open_tree(b"utxo_by_outpoint")?,
            peers: db.open_tree(b"peers")?,
            bans: db.open_tree(b"bans")?,
        })
    }

    pub fn put_block(&self, block: &Block) -> Result<(), StoreError> {
        let bytes = block
            .mrd_serialize_to_vec()
            .expect("serializing to a vec is infallible");
        self.block_by_hash.insert(&block.hash().0, bytes)?;
        Ok(())
    }

    pub fn block(&self, hash: &block::Hash) -> Result<Option<Arc<Block>>, StoreError> {
        match self.block_by_hash.get(&hash.0)? {
            Some(bytes) => Ok(Some(Arc::new(Block::mrd_deserialize(&bytes[..])?))),
            None => Ok(None),
        }
    }

    pub fn contains_block(&self, hash: &block::Hash) -> Result<bool, StoreError> {
        Ok(self.block_by_hash.contains_key(&hash.0)?)
    }

    /// Persist a connected block's undo log, so a restart can restore the
    /// reorganization machinery without replaying the chain.
    pub fn put_undo(&self, hash: &block::Hash, undo: &UndoLog) -> Result<(), StoreError> {
        let bytes = undo
            .mrd_serialize_to_vec()
            .expect("serializing to a vec is infallible");
        self.undo_by_hash.insert(&hash.0, bytes)?;
        Ok(())
    }

    pub fn undo(&self, hash: &block::Hash) -> Result<Option<UndoLog>, StoreError> {
        match self.undo_by_hash.get(&hash.0)? {
            Some(bytes) => Ok(Some(UndoLog::mrd_deserialize(&bytes[..])?)),
            None => Ok(None),
        }
    }

    /// Record `hash` as the main-chain block at `height`.
    pub fn set_main_chain(&self, height: Height, hash: block::Hash) -> Result<(), StoreError> {
        self.hash_by_height.insert(&height.to_be_bytes(), &hash.0)?;
        Ok(())
    }

    /// Drop main-chain records strictly above `height`, after a reorg.
    pub fn truncate_main_chain(&self, height: Height) -> Result<(), StoreError> {
        let start = Height(height.0.saturating_add(1)).to_be_bytes();
        let stale: Vec<_> = self
            .hash_by_height
            .range(start.to_vec()..)
            .keys()
            .collect::<Result<_, _>>()?;
        for key in stale {
            self.hash_by_height.remove(key)?;
        }
        Ok(())
    }

    pub fn main_chain_hash(&self, height: Height) -> Result<Option<block::Hash>, StoreError> {
        match self.hash_by_height.get(&height.to_be_bytes())? {
            Some(bytes) => Ok(Some(block::Hash::mrd_deserialize(&bytes[..])?)),
            None => Ok(None),
        }
    }

    /// The highest recorded main-chain entry.
    pub fn tip(&self) -> Result<Option<(Height, block::Hash)>, StoreError> {
        if let Some((height_bytes, hash_bytes)) = self.hash_by_height.last()? {
            let mut be = [0u8; 4];
            be.copy_from_slice(&height_bytes);
            let height = Height::from_be_bytes(be);
            let hash = block::Hash::mrd_deserialize(&hash_bytes[..])?;
            Ok(Some((height, hash)))
        } else {
            Ok(None)
        }
    }

    /// Replace the stored UTXO set with `utxos`.
    ///
    /// Written as clear-and-refill: the set is small relative to the block
    /// data, and the store is only flushed at shutdown and after reorgs.
    pub fn put_utxos(&self, utxos: &UtxoSet) -> Result<(), StoreError> {
        self.utxo_by_outpoint.clear()?;
        for (outpoint, entry) in utxos.iter() {
            let key = outpoint
                .mrd_serialize_to_vec()
                .expect("serializing to a vec is infallible");
            let value = entry
                .mrd_serialize_to_vec()
                .expect("serializing to a vec is infallible");
            self.utxo_by_outpoint.insert(key, value)?;
        }
        debug!(utxos = utxos.len(), "persisted utxo set");
        Ok(())
    }

    pub fn load_utxos(&self) -> Result<Vec<(OutPoint, UtxoEntry)>, StoreError> {
        let mut entries = Vec::new();
        for kv in self.utxo_by_outpoint.iter() {
            let (key, value) = kv?;
            entries.push((
                OutPoint::mrd_deserialize(&key[..])?,
                UtxoEntry::mrd_deserialize(&value[..])?,
            ));
        }
        Ok(entries)
    }

    /// Persist the address book's serialized form.
    pub fn put_peers(&self, bytes: &[u8]) -> Result<(), StoreError> {
        self.peers.insert(b"peers", bytes)?;
        Ok(())
    }

    pub fn peers(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.peers.get(b"peers")?.map(|bytes| bytes.to_vec()))
    }

    /// Persist the ban list's serialized form.
    pub fn put_bans(&self, bytes: &[u8]) -> Result<(), StoreError> {
        self.bans.insert(b"bans", bytes)?;
        Ok(())
    }

    pub fn bans(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.bans.get(b"bans")?.map(|bytes| bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_chain::amount::{Amount, COIN};
    use meridian_chain::block::Header;
    use meridian_chain::parameters::{genesis_block, Network};
    use meridian_chain::transaction::{LockTime, Transaction};
    use meridian_chain::transparent::{Input, Output, Script, SEQUENCE_FINAL};
    use meridian_chain::work::difficulty::CompactDifficulty;

    #[test]
    fn blocks_round_trip_through_disk_bytes() {
        meridian_test::init();

        let store = Store::in_memory().unwrap();
        let genesis = genesis_block(Network::Mainnet);

        store.put_block(&genesis).unwrap();
        let loaded = store.block(&genesis.hash()).unwrap().unwrap();
        assert_eq!(*loaded, genesis);
        assert_eq!(loaded.hash(), genesis.hash());
    }

    #[test]
    fn tip_tracks_the_highest_height() {
        meridian_test::init();

        let store = Store::in_memory().unwrap();
        let hash_a = block::Hash([1; 32]);
        let hash_b = block::Hash([2; 32]);

        assert!(store.tip().unwrap().is_none());
        store.set_main_chain(Height(0), hash_a).unwrap();
        store.set_main_chain(Height(1), hash_b).unwrap();
        assert_eq!(store.tip().unwrap(), Some((Height(1), hash_b)));

        store.truncate_main_chain(Height(0)).unwrap();
        assert_eq!(store.tip().unwrap(), Some((Height(0), hash_a)));
    }

    #[test]
    fn utxo_snapshot_round_trip() {
        meridian_test::init();

        let store = Store::in_memory().unwrap();
        let genesis = genesis_block(Network::Mainnet);

        let mut utxos = UtxoSet::new();
        utxos
            .apply_tx(&genesis.transactions[0], Height(0))
            .unwrap();
        store.put_utxos(&utxos).unwrap();

        let restored = UtxoSet::from_entries(store.load_utxos().unwrap());
        assert_eq!(restored, utxos);
    }

    #[test]
    fn undo_logs_round_trip_through_the_store() {
        meridian_test::init();

        let store = Store::in_memory().unwrap();
        let genesis = genesis_block(Network::Mainnet);

        let mut utxos = UtxoSet::new();
        let funding = &genesis.transactions[0];
        utxos.apply_tx(funding, Height(0)).unwrap();

        // A mature spend of the genesis output gives the block a
        // non-empty undo log.
        let spend = Transaction::new(
            1,
            vec![Input {
                previous_output: OutPoint {
                    hash: funding.hash(),
                    index: 0,
                },
                script_sig: Script(vec![]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::from_units(49 * COIN).unwrap(),
                script_pubkey: Script(vec![0x51]),
            }],
            LockTime(0),
        );
        let coinbase = Transaction::new(
            1,
            vec![Input {
                previous_output: OutPoint::NULL,
                script_sig: Script(vec![150, 0]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::from_units(51 * COIN).unwrap(),
                script_pubkey: Script(vec![0x51]),
            }],
            LockTime(0),
        );
        let transactions: Vec<_> = vec![coinbase, spend].into_iter().map(Arc::new).collect();
        let merkle_root = transactions.iter().map(|tx| tx.hash()).collect();
        let block = Block {
            header: Header::new(
                1,
                genesis.hash(),
                merkle_root,
                1,
                CompactDifficulty(0x207fffff),
                0,
            ),
            transactions,
        };

        let subsidy = Amount::from_units(50 * COIN).unwrap();
        let (undo, _) = utxos.apply_block(&block, Height(150), subsidy).unwrap();
        assert!(!undo.is_empty());

        assert!(store.undo(&block.hash()).unwrap().is_none());
        store.put_undo(&block.hash(), &undo).unwrap();
        assert_eq!(store.undo(&block.hash()).unwrap(), Some(undo));
    }
}
