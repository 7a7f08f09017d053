//! End-to-end chain scenarios on a low-difficulty test network.

use std::sync::Arc;

use meridian_chain::amount::{Amount, COIN};
use meridian_chain::block::{merkle, Block, Header, Height};
use meridian_chain::parameters::{genesis_block, Network, COINBASE_MATURITY};
use meridian_chain::transaction::{LockTime, Transaction};
use meridian_chain::transparent::{Input, OutPoint, Output, Script, SEQUENCE_FINAL};
use meridian_consensus::{BlockAcceptance, ChainManager};

const NETWORK: Network = Network::Testnet;

/// Deterministic "wall clock" far past every block time used here.
const NOW: u64 = 1_900_000_000;

fn coinbase(height: Height, fees: u64) -> Transaction {
    let subsidy = meridian_consensus::subsidy::block_subsidy(height);
    let mut script_sig = height.0.to_le_bytes().to_vec();
    script_sig.push(0x4D);
    Transaction::new(
        1,
        vec![Input {
            previous_output: OutPoint::NULL,
            script_sig: Script(script_sig),
            sequence: SEQUENCE_FINAL,
        }],
        vec![Output {
            value: Amount::from_units(subsidy.units() + fees).unwrap(),
            script_pubkey: Script(vec![0x51]),
        }],
        LockTime(0),
    )
}

/// Assemble and mine a block on `parent`, searching nonces until the hash
/// meets the (easy) test-network target.
fn mine_block(
    chain: &ChainManager,
    parent: meridian_chain::block::Hash,
    height: Height,
    time: u64,
    txs: Vec<Transaction>,
    fees: u64,
) -> Arc<Block> {
    let mut transactions = vec![coinbase(height, fees)];
    transactions.extend(txs);
    let transactions: Vec<_> = transactions.into_iter().map(Arc::new).collect();
    let merkle_root: merkle::Root = transactions.iter().map(|tx| tx.hash()).collect();

    let bits = chain.next_required_bits();
    let target = bits.to_expanded().expect("test bits are valid");

    let mut nonce = 0u64;
    loop {
        let header = Header::new(1, parent, merkle_root, time, bits, nonce);
        if header.hash() <= target {
            return Arc::new(Block {
                header,
                transactions,
            });
        }
        nonce += 1;
    }
}

fn extend_tip(chain: &mut ChainManager, txs: Vec<Transaction>, fees: u64) -> Arc<Block> {
    let height = Height(chain.height().0 + 1);
    let time = chain.best_header().time + 1;
    let block = mine_block(chain, chain.best_hash(), height, time, txs, fees);
    match chain.accept_block(block.clone(), NOW).unwrap() {
        BlockAcceptance::Accepted { .. } => block,
        other => panic!("expected acceptance, got {:?}", other),
    }
}

#[test]
fn genesis_only_chain() {
    meridian_test::init();

    let chain = ChainManager::new(NETWORK, genesis_block(NETWORK));

    assert_eq!(chain.height(), Height(0));
    assert_eq!(chain.best_hash(), genesis_block(NETWORK).hash());
    assert_eq!(chain.utxos().len(), 1);
}

#[test]
fn linear_extension() {
    meridian_test::init();

    let mut chain = ChainManager::new(NETWORK, genesis_block(NETWORK));
    let block1 = extend_tip(&mut chain, vec![], 0);

    assert_eq!(chain.height(), Height(1));
    assert_eq!(chain.best_hash(), block1.hash());

    // Both coinbase outputs are unspent.
    assert_eq!(chain.utxos().len(), 2);
    let genesis_coinbase = OutPoint {
        hash: genesis_block(NETWORK).transactions[0].hash(),
        index: 0,
    };
    let new_coinbase = OutPoint {
        hash: block1.transactions[0].hash(),
        index: 0,
    };
    assert!(chain.utxos().contains(&genesis_coinbase));
    assert!(chain.utxos().contains(&new_coinbase));

    // Chain work strictly increased.
    assert!(chain.best_chain_work() > ChainManager::new(NETWORK, genesis_block(NETWORK)).best_chain_work());
}

#[test]
fn duplicate_blocks_are_reported() {
    meridian_test::init();

    let mut chain = ChainManager::new(NETWORK, genesis_block(NETWORK));
    let block1 = extend_tip(&mut chain, vec![], 0);

    assert!(matches!(
        chain.accept_block(block1, NOW).unwrap(),
        BlockAcceptance::Duplicate
    ));
}

#[test]
fn orphans_connect_when_the_parent_arrives() {
    meridian_test::init();

    let mut chain = ChainManager::new(NETWORK, genesis_block(NETWORK));

    // Build heights 1 and 2 against a scratch chain, then feed them to a
    // fresh chain out of order.
    let mut scratch = ChainManager::new(NETWORK, genesis_block(NETWORK));
    let block1 = extend_tip(&mut scratch, vec![], 0);
    let block2 = extend_tip(&mut scratch, vec![], 0);

    assert!(matches!(
        chain.accept_block(block2.clone(), NOW).unwrap(),
        BlockAcceptance::Orphan
    ));
    assert_eq!(chain.height(), Height(0));
    assert!(chain.contains_block(&block2.hash()));

    // The parent arrives; the orphan cascades in behind it.
    assert!(matches!(
        chain.accept_block(block1, NOW).unwrap(),
        BlockAcceptance::Accepted { .. }
    ));
    assert_eq!(chain.height(), Height(2));
    assert_eq!(chain.best_hash(), block2.hash());
    assert_eq!(chain.orphan_count(), 0);
}

#[test]
fn reorganization_switches_to_the_heavier_fork() {
    meridian_test::init();

    let mut chain = ChainManager::new(NETWORK, genesis_block(NETWORK));

    // Grow past coinbase maturity so a real spend can ride in a block.
    let mut blocks = vec![];
    for _ in 0..(COINBASE_MATURITY + 1) {
        blocks.push(extend_tip(&mut chain, vec![], 0));
    }
    let spendable = &blocks[0].transactions[0];

    // Height 102 on chain A carries a spend of block 1's coinbase, paying
    // a 1 MRD fee.
    let spend = Transaction::new(
        1,
        vec![Input {
            previous_output: OutPoint {
                hash: spendable.hash(),
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
    let spend_txid = spend.hash();
    let a_tip = extend_tip(&mut chain, vec![spend], COIN);
    let a_height = chain.height();
    assert!(chain.main_chain_height(&a_tip.hash()).is_some());
    assert!(chain.transaction(&spend_txid).is_some());

    // Build a competing fork from A's parent: same height first, then one
    // more. The spend is not in it.
    let fork_parent = a_tip.header.previous_block_hash;
    let fork_base_time = a_tip.header.time + 10;
    let b1 = mine_block(&chain, fork_parent, a_height, fork_base_time, vec![], 0);
    let b2 = mine_block(
        &chain,
        b1.hash(),
        Height(a_height.0 + 1),
        fork_base_time + 1,
        vec![],
        0,
    );

    // Equal work: no switch yet.
    assert!(matches!(
        chain.accept_block(b1.clone(), NOW).unwrap(),
        BlockAcceptance::Accepted { reorg: None, .. }
    ));
    assert_eq!(chain.best_hash(), a_tip.hash());

    // One block more work: the chain switches.
    let acceptance = chain.accept_block(b2.clone(), NOW).unwrap();
    let reorg = match acceptance {
        BlockAcceptance::Accepted { reorg: Some(reorg), .. } => reorg,
        other => panic!("expected a reorg, got {:?}", other),
    };
    assert_eq!(reorg.disconnected, vec![a_tip.hash()]);
    assert_eq!(reorg.connected, vec![b1.hash(), b2.hash()]);

    assert_eq!(chain.best_hash(), b2.hash());
    assert_eq!(chain.height(), Height(a_height.0 + 1));
    assert!(chain.main_chain_height(&a_tip.hash()).is_none());
    assert!(chain.main_chain_height(&b1.hash()).is_some());

    // A's coinbase output is gone; B's are present.
    assert!(!chain.utxos().contains(&OutPoint {
        hash: a_tip.transactions[0].hash(),
        index: 0,
    }));
    assert!(chain.utxos().contains(&OutPoint {
        hash: b1.transactions[0].hash(),
        index: 0,
    }));
    assert!(chain.utxos().contains(&OutPoint {
        hash: b2.transactions[0].hash(),
        index: 0,
    }));

    // The disconnected spend went back to the mempool, still valid on B.
    assert!(chain.mempool.contains(&spend_txid));
}

#[test]
fn snapshot_restore_preserves_state_and_supports_reorgs() {
    meridian_test::init();

    let mut original = ChainManager::new(NETWORK, genesis_block(NETWORK));
    for _ in 0..3 {
        extend_tip(&mut original, vec![], 0);
    }

    // What a node persists: the main-chain blocks with the undo logs they
    // connected with, plus the UTXO set.
    let stored: Vec<_> = original
        .main_chain()
        .into_iter()
        .filter(|(height, _)| height.0 > 0)
        .map(|(_, hash)| {
            (
                original.block(&hash).unwrap(),
                original.undo_log(&hash).unwrap(),
            )
        })
        .collect();

    let mut restored = ChainManager::restore(
        NETWORK,
        genesis_block(NETWORK),
        stored,
        original.utxos().clone(),
    )
    .unwrap();

    assert_eq!(restored.height(), original.height());
    assert_eq!(restored.best_hash(), original.best_hash());
    assert_eq!(restored.best_chain_work(), original.best_chain_work());
    assert_eq!(restored.utxos(), original.utxos());
    assert_eq!(
        restored.hash_at_height(Height(2)),
        original.hash_at_height(Height(2))
    );

    // The restored chain extends normally...
    extend_tip(&mut restored, vec![], 0);
    assert_eq!(restored.height(), Height(4));

    // ...and still reorganizes below the restore boundary, which spends
    // the undo logs that came from storage.
    let fork_parent = restored.hash_at_height(Height(2)).unwrap();
    let fork_time = restored.best_header().time + 50;
    let b3 = mine_block(&restored, fork_parent, Height(3), fork_time, vec![], 0);
    let b4 = mine_block(&restored, b3.hash(), Height(4), fork_time + 1, vec![], 0);
    let b5 = mine_block(&restored, b4.hash(), Height(5), fork_time + 2, vec![], 0);
    for block in [b3, b4, b5.clone()] {
        assert!(matches!(
            restored.accept_block(block, NOW).unwrap(),
            BlockAcceptance::Accepted { .. }
        ));
    }

    assert_eq!(restored.height(), Height(5));
    assert_eq!(restored.best_hash(), b5.hash());
}

#[test]
fn restore_rejects_inconsistent_storage() {
    meridian_test::init();

    let mut original = ChainManager::new(NETWORK, genesis_block(NETWORK));
    extend_tip(&mut original, vec![], 0);
    let block1 = original.block(&original.best_hash()).unwrap();
    let undo1 = original.undo_log(&original.best_hash()).unwrap();

    // A gap in the stored sequence aborts the restore.
    let mut scratch = ChainManager::new(NETWORK, genesis_block(NETWORK));
    extend_tip(&mut scratch, vec![], 0);
    let block2 = extend_tip(&mut scratch, vec![], 0);
    assert!(matches!(
        ChainManager::restore(
            NETWORK,
            genesis_block(NETWORK),
            vec![(block2, undo1.clone())],
            original.utxos().clone(),
        ),
        Err(meridian_consensus::RestoreError::NotSequential(_))
    ));

    // So does a missing snapshot.
    assert!(matches!(
        ChainManager::restore(
            NETWORK,
            genesis_block(NETWORK),
            vec![(block1, undo1)],
            Default::default(),
        ),
        Err(meridian_consensus::RestoreError::MissingUtxos)
    ));
}

#[test]
fn locator_has_geometric_backoff_and_finds_ancestors() {
    meridian_test::init();

    let mut chain = ChainManager::new(NETWORK, genesis_block(NETWORK));
    for _ in 0..40 {
        extend_tip(&mut chain, vec![], 0);
    }

    let locator = chain.block_locator();
    // Tip first, genesis last.
    assert_eq!(locator.first(), Some(&chain.best_hash()));
    assert_eq!(locator.last(), Some(&chain.genesis_hash()));
    // First ten entries step back one block each.
    for (offset, hash) in locator.iter().take(10).enumerate() {
        assert_eq!(
            chain.main_chain_height(hash),
            Some(Height(40 - offset as u32))
        );
    }
    // Beyond ten, the gaps double, so the list stays short.
    assert!(locator.len() < 20);

    // A peer that only knows height 30 gets hashes from 31 on.
    let ancestor = chain.hash_at_height(Height(30)).unwrap();
    let hashes = chain.hashes_after(&[ancestor], None, 500);
    assert_eq!(hashes.len(), 10);
    assert_eq!(hashes[0], chain.hash_at_height(Height(31)).unwrap());

    // An unknown locator falls back to genesis.
    let unknown = meridian_chain::block::Hash([0xEE; 32]);
    assert_eq!(chain.find_common_ancestor(&[unknown]), chain.genesis_hash());
}

#[test]
fn submitted_transactions_enter_the_mempool_and_mine_out() {
    meridian_test::init();

    let mut chain = ChainManager::new(NETWORK, genesis_block(NETWORK));
    let mut blocks = vec![];
    for _ in 0..(COINBASE_MATURITY as usize + 1) {
        blocks.push(extend_tip(&mut chain, vec![], 0));
    }

    let spend = Arc::new(Transaction::new(
        1,
        vec![Input {
            previous_output: OutPoint {
                hash: blocks[0].transactions[0].hash(),
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
    ));

    let txid = chain.submit_transaction(spend.clone(), NOW).unwrap();
    assert!(chain.mempool.contains(&txid));

    // Double spends are refused while the first sits in the pool.
    let double = Arc::new(Transaction::new(
        1,
        vec![Input {
            previous_output: OutPoint {
                hash: blocks[0].transactions[0].hash(),
                index: 0,
            },
            script_sig: Script(vec![0x00]),
            sequence: SEQUENCE_FINAL,
        }],
        vec![Output {
            value: Amount::from_units(48 * COIN).unwrap(),
            script_pubkey: Script(vec![0x51]),
        }],
        LockTime(0),
    ));
    assert!(chain.submit_transaction(double, NOW).is_err());

    // Mining the template confirms the transaction and drains the pool.
    let selected: Vec<Transaction> = chain
        .mempool
        .select_for_block(500_000, 100)
        .iter()
        .map(|tx| (**tx).clone())
        .collect();
    assert_eq!(selected.len(), 1);
    extend_tip(&mut chain, selected, COIN);

    assert!(chain.mempool.is_empty());
    assert!(chain.transaction(&txid).unwrap().1.is_some());
}
