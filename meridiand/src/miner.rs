//! The built-in miner: assembles block templates from the mempool and
//! scans nonces, observing the shutdown flag and chain tip as it goes.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use tracing::{debug, info};

use meridian_chain::amount::Amount;
use meridian_chain::block::{merkle, Block, Header, Height, MAX_BLOCK_BYTES};
use meridian_chain::transaction::{LockTime, Transaction};
use meridian_chain::transparent::{Input, OutPoint, Output, Script, SEQUENCE_FINAL};
use meridian_consensus::subsidy::block_subsidy;
use meridian_consensus::{BlockAcceptance, ChainManager};
use meridian_script::pay_to_pubkey_hash;
use meridian_wallet::Wallet;

use crate::node::{now_secs, NodeHandle};

/// Nonces tried between shutdown/tip checks.
const NONCE_BATCH: u64 = 1 << 20;

/// Space reserved in the template for the coinbase transaction.
const COINBASE_RESERVED: usize = 1000;

/// Cap on non-coinbase transactions per template.
const MAX_TEMPLATE_TXS: usize = 10_000;

struct Template {
    height: Height,
    block: Block,
    parent: meridian_chain::block::Hash,
}

/// Build a block template on the current tip, paying the subsidy and all
/// fees to a wallet address.
fn build_template(chain: &ChainManager, wallet: &mut Wallet) -> Template {
    let parent = chain.best_hash();
    let height = Height(chain.height().0 + 1);
    let bits = chain.next_required_bits();
    let time = now_secs().max(chain.best_header().time + 1);

    let selected = chain
        .mempool
        .select_for_block(MAX_BLOCK_BYTES as usize - COINBASE_RESERVED, MAX_TEMPLATE_TXS);
    let fees = Amount::sum(selected.iter().filter_map(|tx| {
        chain
            .mempool
            .get(&tx.hash())
            .map(|entry| entry.fee)
    }))
    .unwrap_or(Amount::ZERO);

    let reward = block_subsidy(height)
        .checked_add(fees)
        .unwrap_or_else(|_| block_subsidy(height));

    let payout = wallet.new_address(Some("coinbase".to_owned()));
    let mut script_sig = height.0.to_le_bytes().to_vec();
    script_sig.extend_from_slice(b"meridiand");
    let coinbase = Transaction::new(
        1,
        vec![Input {
            previous_output: OutPoint::NULL,
            script_sig: Script(script_sig),
            sequence: SEQUENCE_FINAL,
        }],
        vec![Output {
            value: reward,
            script_pubkey: pay_to_pubkey_hash(payout.hash()),
        }],
        LockTime(0),
    );

    let mut transactions = vec![Arc::new(coinbase)];
    transactions.extend(selected);
    let merkle_root: merkle::Root = transactions.iter().map(|tx| tx.hash()).collect();

    Template {
        height,
        parent,
        block: Block {
            header: Header::new(1, parent, merkle_root, time, bits, 0),
            transactions,
        },
    }
}

/// Mine until shutdown. Each nonce batch re-checks the flag and abandons
/// the template if the tip moved underneath it.
pub async fn mine_task(
    chain: Arc<RwLock<ChainManager>>,
    wallet: Arc<Mutex<Wallet>>,
    handle: Arc<NodeHandle>,
    shutdown_rx: watch::Receiver<bool>,
) {
    info!("miner started");
    let mut nonce_base: u64 = rand::random();

    'templates: loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let mut template = {
            let chain = chain.read().expect("chain lock poisoned");
            let mut wallet = wallet.lock().expect("wallet lock poisoned");
            build_template(&chain, &mut wallet)
        };
        let target = match template.block.header.bits.to_expanded() {
            Some(target) => target,
            None => {
                debug!("template bits invalid; retrying");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
        };

        loop {
            // The hash scan runs on a blocking thread so the runtime stays
            // responsive.
            let (solved, next_base) = {
                let header = template.block.header;
                let base = nonce_base;
                tokio::task::spawn_blocking(move || {
                    let mut header = header;
                    for offset in 0..NONCE_BATCH {
                        header.set_nonce(base.wrapping_add(offset));
                        if header.hash() <= target {
                            return (Some(header), base.wrapping_add(offset));
                        }
                    }
                    (None, base.wrapping_add(NONCE_BATCH))
                })
                .await
                .expect("mining batch does not panic")
            };
            nonce_base = next_base;

            if *shutdown_rx.borrow() {
                break 'templates;
            }

            match solved {
                Some(header) => {
                    template.block.header = header;
                    let block = Arc::new(template.block);
                    let hash = block.hash();

                    let accepted = {
                        let mut chain = chain.write().expect("chain lock poisoned");
                        chain.accept_block(block, now_secs())
                    };
                    match accepted {
                        Ok(BlockAcceptance::Accepted { height, .. }) => {
                            info!(%hash, height = height.0, "mined block");
                            handle.announce_block(hash, None);
                        }
                        Ok(other) => debug!(%hash, ?other, "mined block not adopted"),
                        Err(error) => debug!(%hash, %error, "mined block rejected"),
                    }
                    continue 'templates;
                }
                None => {
                    // Abandon the template if someone else extended the
                    // chain meanwhile.
                    let tip = chain.read().expect("chain lock poisoned").best_hash();
                    if tip != template.parent {
                        debug!(height = template.height.0, "tip moved, rebuilding template");
                        continue 'templates;
                    }
                }
            }
        }
    }
    info!("miner stopped");
}
