//! The node: accept/connect loops, the peer table, and the dispatcher
//! that feeds network messages into the chain manager and mempool.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use color_eyre::eyre::eyre;
use color_eyre::Report;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use meridian_chain::block::{self, Block, Height};
use meridian_chain::parameters::{genesis_block, Network};
use meridian_chain::transaction;
use meridian_consensus::{BlockAcceptance, ChainManager};
use meridian_network::connection::{Connection, LocalIdentity, PeerEvent};
use meridian_network::constants::{
    MAX_ADDRS_PER_MESSAGE, MAX_BLOCKS_PER_GETBLOCKS, MAX_HEADERS_PER_MESSAGE,
    MAX_INV_PER_MESSAGE,
};
use meridian_network::message::CountedHeader;
use meridian_network::{
    AddressBook, Direction, InventoryHash, Message, Nonce, PeerServices, Version,
};
use meridian_rpc::{NodeInterface, PeerStatus, SharedState};
use meridian_state::{Store, UtxoSet};
use meridian_wallet::Wallet;

use crate::config::Config;
use crate::miner;

/// Per-peer outbound queue depth; a stuck peer drops messages rather than
/// stalling the dispatcher.
const PEER_QUEUE_DEPTH: usize = 256;

/// Misbehavior penalties.
const PENALTY_BAD_BLOCK: u32 = 50;
const PENALTY_BAD_TX: u32 = 10;
const PENALTY_BAD_FRAME: u32 = 50;
const PENALTY_UNSOLICITED: u32 = 10;

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("the clock is past 1970")
        .as_secs()
}

#[derive(Debug)]
struct PeerHandle {
    sender: mpsc::Sender<Message>,
    inbound: bool,
    version: Option<Version>,
    latency_ms: Option<u64>,
    misbehavior: u32,
}

/// The connected-peer table; independent of the chain lock.
#[derive(Debug, Default)]
pub(crate) struct PeerTable {
    peers: Mutex<HashMap<SocketAddr, PeerHandle>>,
}

impl PeerTable {
    fn register(&self, addr: SocketAddr, handle: PeerHandle) {
        self.peers
            .lock()
            .expect("peer table lock poisoned")
            .insert(addr, handle);
    }

    fn remove(&self, addr: &SocketAddr) {
        self.peers
            .lock()
            .expect("peer table lock poisoned")
            .remove(addr);
    }

    fn len(&self) -> usize {
        self.peers.lock().expect("peer table lock poisoned").len()
    }

    fn count_direction(&self, inbound: bool) -> usize {
        self.peers
            .lock()
            .expect("peer table lock poisoned")
            .values()
            .filter(|handle| handle.inbound == inbound)
            .count()
    }

    fn record_latency(&self, addr: &SocketAddr, latency_ms: u64) {
        if let Some(handle) = self
            .peers
            .lock()
            .expect("peer table lock poisoned")
            .get_mut(addr)
        {
            handle.latency_ms = Some(latency_ms);
        }
    }

    fn record_misbehavior(&self, addr: &SocketAddr, penalty: u32) {
        if let Some(handle) = self
            .peers
            .lock()
            .expect("peer table lock poisoned")
            .get_mut(addr)
        {
            handle.misbehavior += penalty;
        }
    }

    /// Queue a message to one peer; silently drops if the peer is gone or
    /// its queue is full.
    fn send(&self, addr: &SocketAddr, message: Message) {
        let sender = {
            let peers = self.peers.lock().expect("peer table lock poisoned");
            match peers.get(addr) {
                Some(handle) => handle.sender.clone(),
                None => return,
            }
        };
        if sender.try_send(message).is_err() {
            debug!(%addr, "peer queue full, dropping message");
        }
    }

    /// Queue a message to every connected peer except `except`.
    fn broadcast(&self, message: Message, except: Option<SocketAddr>) {
        let senders: Vec<(SocketAddr, mpsc::Sender<Message>)> = {
            let peers = self.peers.lock().expect("peer table lock poisoned");
            peers
                .iter()
                .filter(|(addr, _)| Some(**addr) != except)
                .map(|(addr, handle)| (*addr, handle.sender.clone()))
                .collect()
        };
        for (addr, sender) in senders {
            if sender.try_send(message.clone()).is_err() {
                debug!(%addr, "peer queue full, dropping broadcast");
            }
        }
    }

    fn statuses(&self) -> Vec<PeerStatus> {
        self.peers
            .lock()
            .expect("peer table lock poisoned")
            .iter()
            .map(|(addr, handle)| PeerStatus {
                addr: *addr,
                inbound: handle.inbound,
                version: handle
                    .version
                    .as_ref()
                    .map(|version| version.version.0)
                    .unwrap_or(0),
                user_agent: handle
                    .version
                    .as_ref()
                    .map(|version| version.user_agent.clone())
                    .unwrap_or_default(),
                start_height: handle
                    .version
                    .as_ref()
                    .map(|version| version.start_height.0)
                    .unwrap_or(0),
                latency_ms: handle.latency_ms,
                misbehavior: handle.misbehavior,
            })
            .collect()
    }
}

/// The handle given to the RPC layer and the miner.
pub(crate) struct NodeHandle {
    pub chain: Arc<RwLock<ChainManager>>,
    pub peers: Arc<PeerTable>,
    pub shutdown: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle").finish()
    }
}

impl NodeHandle {
    pub fn announce_block(&self, hash: block::Hash, except: Option<SocketAddr>) {
        self.peers
            .broadcast(Message::Inv(vec![InventoryHash::Block(hash)]), except);
    }
}

impl NodeInterface for NodeHandle {
    fn peer_statuses(&self) -> Vec<PeerStatus> {
        self.peers.statuses()
    }

    fn relay_transaction(&self, txid: transaction::Hash) {
        self.peers
            .broadcast(Message::Inv(vec![InventoryHash::Tx(txid)]), None);
    }

    fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

pub struct Node {
    network: Network,
    config: Config,
    chain: Arc<RwLock<ChainManager>>,
    wallet: Arc<Mutex<Wallet>>,
    address_book: Arc<Mutex<AddressBook>>,
    store: Store,
    peers: Arc<PeerTable>,
    shutdown: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("network", &self.network).finish()
    }
}

impl Node {
    pub fn new(config: Config) -> Result<Node, Report> {
        let network = config.network()?;
        let store = Store::open(config.data_dir.join(network.to_string()))?;

        let chain = restore_chain(network, &store)?;

        let peer_bytes = store.peers()?;
        let ban_bytes = store.bans()?;
        let address_book =
            AddressBook::from_bytes(peer_bytes.as_deref(), ban_bytes.as_deref())
                .unwrap_or_default();

        let (shutdown, shutdown_rx) = watch::channel(false);

        Ok(Node {
            network,
            config,
            chain: Arc::new(RwLock::new(chain)),
            wallet: Arc::new(Mutex::new(Wallet::new(network))),
            address_book: Arc::new(Mutex::new(address_book)),
            store,
            peers: Arc::new(PeerTable::default()),
            shutdown: Arc::new(shutdown),
            shutdown_rx,
        })
    }

    fn handle(&self) -> Arc<NodeHandle> {
        Arc::new(NodeHandle {
            chain: self.chain.clone(),
            peers: self.peers.clone(),
            shutdown: self.shutdown.clone(),
        })
    }

    /// Run the node until shutdown.
    pub async fn run(mut self) -> Result<(), Report> {
        let listen_addr = self.config.listen_addr(self.network);
        let rpc_addr = self.config.rpc_addr(self.network);
        let handle = self.handle();

        let (events_tx, events_rx) = mpsc::channel::<PeerEvent>(1024);

        self.seed_address_book().await;

        // Inbound listener.
        tokio::spawn(listener_task(
            listen_addr,
            self.network,
            self.config.max_inbound,
            self.chain.clone(),
            self.peers.clone(),
            self.address_book.clone(),
            events_tx.clone(),
            self.shutdown_rx.clone(),
        ));

        // Outbound connector.
        tokio::spawn(connector_task(
            listen_addr,
            self.network,
            self.config.max_outbound,
            self.chain.clone(),
            self.peers.clone(),
            self.address_book.clone(),
            events_tx.clone(),
            self.shutdown_rx.clone(),
        ));

        // RPC server.
        let rpc_state = Arc::new(SharedState {
            chain: self.chain.clone(),
            wallet: self.wallet.clone(),
            node: handle.clone(),
        });
        let rpc_config = meridian_rpc::RpcConfig {
            username: self.config.rpc_username.clone(),
            password: self.config.rpc_password.clone(),
            ..meridian_rpc::RpcConfig::default()
        };
        tokio::spawn(meridian_rpc::serve(
            rpc_addr,
            rpc_config,
            rpc_state,
            self.shutdown_rx.clone(),
        ));

        // Periodic stats.
        tokio::spawn(stats_task(
            self.chain.clone(),
            self.peers.clone(),
            self.shutdown_rx.clone(),
        ));

        // Optional miner.
        if self.config.mine {
            tokio::spawn(miner::mine_task(
                self.chain.clone(),
                self.wallet.clone(),
                handle.clone(),
                self.shutdown_rx.clone(),
            ));
        }

        info!(network = %self.network, %listen_addr, %rpc_addr, "node started");

        // The dispatcher is the node's main loop.
        self.dispatch_loop(events_rx).await;

        self.persist();
        info!("node stopped");
        Ok(())
    }

    async fn seed_address_book(&self) {
        let now = now_secs();
        let mut resolved = Vec::new();
        let seeds = self
            .config
            .connect
            .iter()
            .chain(self.config.dns_seeds.iter());
        for seed in seeds {
            match tokio::net::lookup_host(seed).await {
                Ok(addrs) => resolved.extend(addrs),
                Err(error) => debug!(%seed, %error, "seed lookup failed"),
            }
        }

        let mut book = self
            .address_book
            .lock()
            .expect("address book lock poisoned");
        for addr in resolved {
            book.add(addr, PeerServices::NODE_NETWORK, now);
        }
        info!(known = book.len(), "address book seeded");
    }

    async fn dispatch_loop(&mut self, mut events: mpsc::Receiver<PeerEvent>) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }
    }

    fn handle_event(&self, event: PeerEvent) {
        match event {
            PeerEvent::Message { addr, message } => self.handle_message(addr, message),
            PeerEvent::Pong { addr, latency, .. } => {
                if let Some(latency) = latency {
                    self.peers.record_latency(&addr, latency.as_millis() as u64);
                }
            }
            PeerEvent::Disconnected {
                addr,
                reason,
                misbehaved,
            } => {
                debug!(%addr, %reason, "peer gone");
                self.peers.remove(&addr);
                let mut book = self
                    .address_book
                    .lock()
                    .expect("address book lock poisoned");
                book.mark_disconnected(addr);
                if misbehaved {
                    book.misbehave(addr.ip(), PENALTY_BAD_FRAME, now_secs());
                }
            }
        }
    }

    fn handle_message(&self, addr: SocketAddr, message: Message) {
        let now = now_secs();
        match message {
            Message::Inv(items) => {
                // Ask for everything we have not seen.
                let chain = self.chain.read().expect("chain lock poisoned");
                let wanted: Vec<InventoryHash> = items
                    .into_iter()
                    .filter(|item| match item {
                        InventoryHash::Block(hash) => !chain.contains_block(hash),
                        InventoryHash::Tx(txid) => chain.transaction(txid).is_none(),
                        InventoryHash::Error => false,
                    })
                    .collect();
                drop(chain);
                if !wanted.is_empty() {
                    self.peers.send(&addr, Message::GetData(wanted));
                }
            }

            Message::GetData(items) => {
                let chain = self.chain.read().expect("chain lock poisoned");
                let mut missing = Vec::new();
                let mut replies = Vec::new();
                for item in items.into_iter().take(MAX_INV_PER_MESSAGE) {
                    match item {
                        InventoryHash::Block(hash) => match chain.block(&hash) {
                            Some(block) => replies.push(Message::Block(block)),
                            None => missing.push(InventoryHash::Block(hash)),
                        },
                        InventoryHash::Tx(txid) => match chain.transaction(&txid) {
                            Some((tx, _)) => replies.push(Message::Tx(tx)),
                            None => missing.push(InventoryHash::Tx(txid)),
                        },
                        InventoryHash::Error => {}
                    }
                }
                drop(chain);
                for reply in replies {
                    self.peers.send(&addr, reply);
                }
                if !missing.is_empty() {
                    self.peers.send(&addr, Message::NotFound(missing));
                }
            }

            Message::Block(block) => {
                let hash = block.hash();
                let outcome = {
                    let mut chain = self.chain.write().expect("chain lock poisoned");
                    chain.accept_block(block, now)
                };
                match outcome {
                    Ok(BlockAcceptance::Accepted { height, reorg }) => {
                        if let Some(reorg) = reorg {
                            info!(
                                fork = reorg.fork_height.0,
                                connected = reorg.connected.len(),
                                "chain reorganized"
                            );
                        }
                        debug!(%hash, height = height.0, "block accepted from peer");
                        // Relay to everyone but the source.
                        self.peers.broadcast(
                            Message::Inv(vec![InventoryHash::Block(hash)]),
                            Some(addr),
                        );
                    }
                    Ok(BlockAcceptance::Orphan) => {
                        // Parent unknown: fetch the gap from this peer,
                        // no penalty.
                        let locator = {
                            let chain = self.chain.read().expect("chain lock poisoned");
                            chain.block_locator()
                        };
                        self.peers.send(
                            &addr,
                            Message::GetBlocks(meridian_network::message::GetBlocks {
                                locator,
                                stop_hash: Some(hash),
                            }),
                        );
                    }
                    Ok(BlockAcceptance::Duplicate) => {}
                    Err(error) => {
                        warn!(%addr, %hash, %error, "invalid block from peer");
                        self.punish(addr, PENALTY_BAD_BLOCK);
                    }
                }
            }

            Message::Tx(tx) => {
                let outcome = {
                    let mut chain = self.chain.write().expect("chain lock poisoned");
                    chain.submit_transaction(tx, now)
                };
                match outcome {
                    Ok(txid) => {
                        self.peers
                            .broadcast(Message::Inv(vec![InventoryHash::Tx(txid)]), Some(addr));
                    }
                    Err(error) => {
                        debug!(%addr, %error, "rejected transaction from peer");
                        if error.is_misbehavior() {
                            self.punish(addr, PENALTY_BAD_TX);
                        }
                    }
                }
            }

            Message::GetBlocks(request) => {
                let chain = self.chain.read().expect("chain lock poisoned");
                let hashes = chain.hashes_after(
                    &request.locator,
                    request.stop_hash,
                    MAX_BLOCKS_PER_GETBLOCKS,
                );
                drop(chain);
                if !hashes.is_empty() {
                    let inv = hashes.into_iter().map(InventoryHash::Block).collect();
                    self.peers.send(&addr, Message::Inv(inv));
                }
            }

            Message::GetHeaders(request) => {
                let chain = self.chain.read().expect("chain lock poisoned");
                let headers: Vec<CountedHeader> = chain
                    .hashes_after(&request.locator, request.stop_hash, MAX_HEADERS_PER_MESSAGE)
                    .into_iter()
                    .filter_map(|hash| chain.block(&hash))
                    .map(|block| CountedHeader {
                        header: block.header,
                        transaction_count: block.transactions.len(),
                    })
                    .collect();
                drop(chain);
                self.peers.send(&addr, Message::Headers(headers));
            }

            Message::Headers(_) => {
                // This node syncs whole blocks; header announcements are
                // redundant with inv.
            }

            Message::Mempool => {
                let chain = self.chain.read().expect("chain lock poisoned");
                let inv: Vec<InventoryHash> = chain
                    .mempool
                    .txids()
                    .into_iter()
                    .take(MAX_INV_PER_MESSAGE)
                    .map(InventoryHash::Tx)
                    .collect();
                drop(chain);
                self.peers.send(&addr, Message::Inv(inv));
            }

            Message::GetAddr => {
                let book = self
                    .address_book
                    .lock()
                    .expect("address book lock poisoned");
                let addrs = book.addresses_for_gossip(MAX_ADDRS_PER_MESSAGE, now);
                drop(book);
                self.peers.send(&addr, Message::Addr(addrs));
            }

            Message::Addr(addrs) => {
                self.address_book
                    .lock()
                    .expect("address book lock poisoned")
                    .extend_from_gossip(&addrs, now);
            }

            Message::Reject {
                message,
                ccode,
                reason,
                ..
            } => {
                debug!(%addr, %message, ?ccode, %reason, "peer rejected our data");
            }

            Message::NotFound(items) => {
                debug!(%addr, count = items.len(), "peer lacked requested data");
            }

            // Handshake messages after the handshake are a protocol
            // violation.
            Message::Version(_) | Message::Verack => {
                self.punish(addr, PENALTY_UNSOLICITED);
            }

            // Ping/pong are answered inside the connection task.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    /// Raise a peer's misbehavior score; at the ban threshold the address
    /// book bans its IP and the connection is torn down.
    fn punish(&self, addr: SocketAddr, penalty: u32) {
        self.peers.record_misbehavior(&addr, penalty);
        let banned = self
            .address_book
            .lock()
            .expect("address book lock poisoned")
            .misbehave(addr.ip(), penalty, now_secs());
        if banned {
            info!(%addr, "banning misbehaving peer");
            self.peers.remove(&addr);
        }
    }

    /// Write chain and peer state out at shutdown.
    fn persist(&self) {
        let chain = self.chain.read().expect("chain lock poisoned");
        for (height, hash) in chain.main_chain() {
            if let Some(block) = chain.block(&hash) {
                if let Err(error) = self.store.put_block(&block) {
                    warn!(%error, "failed to persist block");
                }
            }
            // Undo logs let the next start restore without replaying;
            // genesis has none.
            if let Some(undo) = chain.undo_log(&hash) {
                if let Err(error) = self.store.put_undo(&hash, &undo) {
                    warn!(%error, "failed to persist undo log");
                }
            }
            if let Err(error) = self.store.set_main_chain(height, hash) {
                warn!(%error, "failed to persist chain index");
            }
        }
        if let Err(error) = self.store.truncate_main_chain(chain.height()) {
            warn!(%error, "failed to trim chain index");
        }
        if let Err(error) = self.store.put_utxos(chain.utxos()) {
            warn!(%error, "failed to persist utxo set");
        }

        let book = self
            .address_book
            .lock()
            .expect("address book lock poisoned");
        if let Err(error) = self.store.put_peers(&book.to_bytes()) {
            warn!(%error, "failed to persist address book");
        }
        if let Err(error) = self.store.put_bans(&book.bans_to_bytes()) {
            warn!(%error, "failed to persist ban list");
        }
    }
}

/// Bring the chain back from disk.
///
/// The fast path installs the stored blocks with their undo logs and the
/// persisted UTXO snapshot directly, with no replay. If any piece is
/// missing or inconsistent, every stored block is replayed through full
/// validation instead.
fn restore_chain(network: Network, store: &Store) -> Result<ChainManager, Report> {
    let genesis = genesis_block(network);
    let tip = match store.tip()? {
        Some((height, _)) => height,
        None => return Ok(ChainManager::new(network, genesis)),
    };

    match restore_from_snapshot(network, &genesis, store, tip) {
        Ok(chain) => return Ok(chain),
        Err(error) => warn!(%error, "snapshot restore failed, replaying stored blocks"),
    }

    let now = now_secs();
    let mut chain = ChainManager::new(network, genesis);
    for height in 1..=tip.0 {
        let hash = match store.main_chain_hash(Height(height))? {
            Some(hash) => hash,
            None => break,
        };
        let block = match store.block(&hash)? {
            Some(block) => block,
            None => break,
        };
        if let Err(error) = chain.accept_block(block, now) {
            warn!(height, %error, "stored block failed validation, truncating");
            break;
        }
    }
    info!(height = chain.height().0, "chain restored by replay");
    Ok(chain)
}

/// The fast restore path: every main-chain block, its undo log, and the
/// UTXO snapshot must all be present and consistent.
fn restore_from_snapshot(
    network: Network,
    genesis: &Block,
    store: &Store,
    tip: Height,
) -> Result<ChainManager, Report> {
    let mut blocks = Vec::with_capacity(tip.0 as usize);
    for height in 1..=tip.0 {
        let hash = store
            .main_chain_hash(Height(height))?
            .ok_or_else(|| eyre!("missing main-chain index entry at height {}", height))?;
        let block = store
            .block(&hash)?
            .ok_or_else(|| eyre!("missing block data for {}", hash))?;
        let undo = store
            .undo(&hash)?
            .ok_or_else(|| eyre!("missing undo log for {}", hash))?;
        blocks.push((block, undo));
    }

    let utxos = UtxoSet::from_entries(store.load_utxos()?);
    Ok(ChainManager::restore(
        network,
        genesis.clone(),
        blocks,
        utxos,
    )?)
}

#[allow(clippy::too_many_arguments)]
async fn listener_task(
    listen_addr: SocketAddr,
    network: Network,
    max_inbound: usize,
    chain: Arc<RwLock<ChainManager>>,
    peers: Arc<PeerTable>,
    address_book: Arc<Mutex<AddressBook>>,
    events_tx: mpsc::Sender<PeerEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let listener = match TcpListener::bind(listen_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            warn!(%listen_addr, %error, "cannot bind p2p listener");
            return;
        }
    };
    info!(%listen_addr, "listening for peers");

    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown_rx.changed() => return,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(error) => {
                    debug!(%error, "accept failed");
                    continue;
                }
            },
        };

        if peers.count_direction(true) >= max_inbound {
            debug!(%addr, "inbound slots full, refusing");
            continue;
        }
        let banned = address_book
            .lock()
            .expect("address book lock poisoned")
            .is_banned(addr.ip(), now_secs());
        if banned {
            debug!(%addr, "refusing banned peer");
            continue;
        }

        let best_height = chain.read().expect("chain lock poisoned").height();
        let identity = LocalIdentity {
            network,
            services: PeerServices::NODE_NETWORK,
            best_height,
            nonce: Nonce::random(),
            listen_addr,
            now: now_secs(),
        };

        let peers = peers.clone();
        let address_book = address_book.clone();
        let chain = chain.clone();
        let events_tx = events_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            match Connection::accept(stream, addr, identity).await {
                Ok(connection) => {
                    register_connection(
                        connection,
                        Direction::Inbound,
                        &chain,
                        &peers,
                        &address_book,
                        events_tx,
                        shutdown_rx,
                    );
                }
                Err(error) => debug!(%addr, %error, "inbound handshake failed"),
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn connector_task(
    listen_addr: SocketAddr,
    network: Network,
    max_outbound: usize,
    chain: Arc<RwLock<ChainManager>>,
    peers: Arc<PeerTable>,
    address_book: Arc<Mutex<AddressBook>>,
    events_tx: mpsc::Sender<PeerEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = tick.tick() => {}
        }

        if peers.count_direction(false) >= max_outbound {
            continue;
        }

        let now = now_secs();
        let candidate = {
            let mut book = address_book.lock().expect("address book lock poisoned");
            book.sweep_bans(now);
            let candidate = book.get_random_for_connect(now);
            if let Some(addr) = candidate {
                book.mark_attempt(addr, now);
            }
            candidate
        };
        let addr = match candidate {
            Some(addr) => addr,
            None => continue,
        };

        let best_height = chain.read().expect("chain lock poisoned").height();
        let identity = LocalIdentity {
            network,
            services: PeerServices::NODE_NETWORK,
            best_height,
            nonce: Nonce::random(),
            listen_addr,
            now,
        };

        let peers = peers.clone();
        let address_book = address_book.clone();
        let chain = chain.clone();
        let events_tx = events_tx.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            match Connection::connect(addr, identity).await {
                Ok(connection) => {
                    address_book
                        .lock()
                        .expect("address book lock poisoned")
                        .mark_good(addr, now_secs());
                    register_connection(
                        connection,
                        Direction::Outbound,
                        &chain,
                        &peers,
                        &address_book,
                        events_tx,
                        shutdown_rx,
                    );
                }
                Err(error) => {
                    debug!(%addr, %error, "outbound connection failed");
                    address_book
                        .lock()
                        .expect("address book lock poisoned")
                        .mark_failed(addr);
                }
            }
        });
    }
}

/// Put a handshaken connection into the peer table, kick off sync if the
/// peer is ahead, and spawn its pump.
fn register_connection(
    connection: Connection,
    direction: Direction,
    chain: &Arc<RwLock<ChainManager>>,
    peers: &Arc<PeerTable>,
    address_book: &Arc<Mutex<AddressBook>>,
    events_tx: mpsc::Sender<PeerEvent>,
    shutdown_rx: watch::Receiver<bool>,
) {
    let peer = connection.peer().clone();
    let addr = peer.addr;
    let (sender, receiver) = mpsc::channel(PEER_QUEUE_DEPTH);

    peers.register(
        addr,
        PeerHandle {
            sender: sender.clone(),
            inbound: direction == Direction::Inbound,
            version: peer.version.clone(),
            latency_ms: None,
            misbehavior: 0,
        },
    );
    if let Some(version) = peer.version.as_ref() {
        address_book
            .lock()
            .expect("address book lock poisoned")
            .add(addr, version.services, now_secs());
    }
    info!(%addr, ?direction, "peer connected");

    // If the peer claims more chain than we have, start pulling it.
    let (our_height, locator) = {
        let chain = chain.read().expect("chain lock poisoned");
        (chain.height(), chain.block_locator())
    };
    if peer.start_height() > our_height.0 {
        let request = Message::GetBlocks(meridian_network::message::GetBlocks {
            locator,
            stop_hash: None,
        });
        let _ = sender.try_send(request);
    }
    // And ask for more peers either way.
    let _ = sender.try_send(Message::GetAddr);

    tokio::spawn(connection.run(events_tx, receiver, shutdown_rx));
}

async fn stats_task(
    chain: Arc<RwLock<ChainManager>>,
    peers: Arc<PeerTable>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = tick.tick() => {}
        }
        let (height, best, mempool, orphans) = {
            let chain = chain.read().expect("chain lock poisoned");
            (
                chain.height().0,
                chain.best_hash(),
                chain.mempool.len(),
                chain.orphan_count(),
            )
        };
        info!(
            height,
            %best,
            peers = peers.len(),
            mempool,
            orphans,
            "node status"
        );
    }
}
