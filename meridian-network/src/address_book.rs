//! The address book: every peer address this node has heard of, with the
//! bookkeeping that drives outbound connection attempts, gossip replies,
//! and bans.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use rand::seq::IteratorRandom;
use tracing::{debug, info};

use meridian_chain::compactint::CompactInt;
use meridian_chain::{MeridianDeserialize, MeridianSerialize, SerializationError};
use meridian_serde_derive::{MrdDeserialize, MrdSerialize};

use crate::constants::{
    ADDR_GOSSIP_HORIZON_SECS, BAN_DURATION_SECS, BAN_THRESHOLD, MAX_ATTEMPTS, RETRY_BASE_SECS,
    RETRY_CAP_SECS,
};
use crate::meta_addr::MetaAddr;
use crate::types::PeerServices;

/// One known peer address and its connection history.
#[derive(Clone, Debug, PartialEq, Eq, MrdSerialize, MrdDeserialize)]
pub struct PeerRecord {
    pub addr: SocketAddr,
    pub services: PeerServices,
    /// When the address last worked or was last gossiped, epoch seconds.
    pub last_seen: u32,
    /// When a connection to it was last attempted, epoch seconds.
    pub last_try: u32,
    /// Consecutive failed attempts; reset by a successful connection.
    pub attempts: u32,
    /// Not serialized state would go stale; connectivity is runtime-only
    /// and rebuilt after load.
    pub connected: bool,
}

impl PeerRecord {
    /// When this record may next be dialed: the retry delay doubles per
    /// failed attempt, capped.
    fn retry_at(&self) -> u64 {
        if self.attempts == 0 {
            return 0;
        }
        let shift = (self.attempts - 1).min(63);
        let delay = RETRY_BASE_SECS
            .saturating_mul(1u64 << shift)
            .min(RETRY_CAP_SECS);
        u64::from(self.last_try) + delay
    }
}

/// The address book. An independent leaf in the lock order: it never calls
/// back into other components.
#[derive(Debug, Default)]
pub struct AddressBook {
    records: HashMap<SocketAddr, PeerRecord>,
    /// Banned IPs and their expiry, epoch seconds.
    bans: HashMap<IpAddr, u64>,
    /// Misbehavior scores, keyed by IP so reconnecting doesn't reset them.
    scores: HashMap<IpAddr, u32>,
}

impl AddressBook {
    pub fn new() -> AddressBook {
        AddressBook::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record an address heard from gossip or a successful connection.
    pub fn add(&mut self, addr: SocketAddr, services: PeerServices, now: u64) {
        let entry = self.records.entry(addr).or_insert(PeerRecord {
            addr,
            services,
            last_seen: now as u32,
            last_try: 0,
            attempts: 0,
            connected: false,
        });
        entry.services = services;
        entry.last_seen = entry.last_seen.max(now as u32);
    }

    /// Feed a batch of gossiped addresses.
    pub fn extend_from_gossip(&mut self, addrs: &[MetaAddr], now: u64) {
        for meta in addrs {
            if meta.is_routable() {
                self.add(meta.addr, meta.services, now);
            }
        }
        debug!(total = self.records.len(), "address book updated from gossip");
    }

    /// Pick a random address worth dialing: not connected, not banned, and
    /// past its retry backoff.
    pub fn get_random_for_connect(&self, now: u64) -> Option<SocketAddr> {
        self.records
            .values()
            .filter(|record| !record.connected)
            .filter(|record| !self.is_banned(record.addr.ip(), now))
            .filter(|record| record.retry_at() <= now)
            .map(|record| record.addr)
            .choose(&mut rand::thread_rng())
    }

    /// Up to `max` routable, recently seen addresses for a `getaddr`
    /// reply.
    pub fn addresses_for_gossip(&self, max: usize, now: u64) -> Vec<MetaAddr> {
        let horizon = now.saturating_sub(ADDR_GOSSIP_HORIZON_SECS);
        self.records
            .values()
            .filter(|record| u64::from(record.last_seen) >= horizon)
            .map(|record| MetaAddr {
                services: record.services,
                addr: record.addr,
                last_seen: record.last_seen,
            })
            .filter(MetaAddr::is_routable)
            .take(max)
            .collect()
    }

    /// A connection attempt is starting.
    pub fn mark_attempt(&mut self, addr: SocketAddr, now: u64) {
        if let Some(record) = self.records.get_mut(&addr) {
            record.last_try = now as u32;
        }
    }

    /// The connection handshake completed.
    pub fn mark_good(&mut self, addr: SocketAddr, now: u64) {
        if let Some(record) = self.records.get_mut(&addr) {
            record.attempts = 0;
            record.last_seen = now as u32;
            record.connected = true;
        }
    }

    /// The connection failed or was lost. After too many consecutive
    /// failures the record is dropped entirely.
    pub fn mark_failed(&mut self, addr: SocketAddr) {
        let drop_record = match self.records.get_mut(&addr) {
            Some(record) => {
                record.connected = false;
                record.attempts += 1;
                record.attempts >= MAX_ATTEMPTS
            }
            None => false,
        };
        if drop_record {
            debug!(%addr, "dropping address after repeated failures");
            self.records.remove(&addr);
        }
    }

    pub fn mark_disconnected(&mut self, addr: SocketAddr) {
        if let Some(record) = self.records.get_mut(&addr) {
            record.connected = false;
        }
    }

    /// Raise an IP's misbehavior score; at the threshold the IP is banned
    /// and `true` is returned so the caller can disconnect it.
    pub fn misbehave(&mut self, ip: IpAddr, score: u32, now: u64) -> bool {
        let total = self.scores.entry(ip).or_insert(0);
        *total += score;
        if *total >= BAN_THRESHOLD {
            info!(%ip, score = *total, "misbehavior threshold reached, banning");
            self.scores.remove(&ip);
            self.ban(ip, now + BAN_DURATION_SECS);
            true
        } else {
            false
        }
    }

    pub fn ban(&mut self, ip: IpAddr, until: u64) {
        self.bans.insert(ip, until);
        metrics::gauge!("addressbook.bans", self.bans.len() as f64);
    }

    pub fn is_banned(&self, ip: IpAddr, now: u64) -> bool {
        match self.bans.get(&ip) {
            Some(&until) => until > now,
            None => false,
        }
    }

    /// Drop expired bans.
    pub fn sweep_bans(&mut self, now: u64) {
        self.bans.retain(|_, &mut until| until > now);
    }

    /// Serialize the peer records for persistence.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        let records: Vec<PeerRecord> = self
            .records
            .values()
            .map(|record| PeerRecord {
                // Connectivity is runtime state.
                connected: false,
                ..record.clone()
            })
            .collect();
        records
            .mrd_serialize(&mut bytes)
            .expect("serializing to a vec is infallible");
        bytes
    }

    /// Serialize the ban list for persistence.
    pub fn bans_to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        CompactInt::from(self.bans.len())
            .mrd_serialize(&mut bytes)
            .expect("serializing to a vec is infallible");
        for (ip, until) in self.bans.iter() {
            ip.mrd_serialize(&mut bytes)
                .expect("serializing to a vec is infallible");
            until
                .mrd_serialize(&mut bytes)
                .expect("serializing to a vec is infallible");
        }
        bytes
    }

    /// Restore a book from its serialized records and ban list.
    pub fn from_bytes(
        records: Option<&[u8]>,
        bans: Option<&[u8]>,
    ) -> Result<AddressBook, SerializationError> {
        let records: Vec<PeerRecord> = match records {
            Some(mut reader) => Vec::mrd_deserialize(&mut reader)?,
            None => Vec::new(),
        };

        let mut ban_map = HashMap::new();
        if let Some(mut reader) = bans {
            let ban_count = CompactInt::mrd_deserialize(&mut reader)?.value();
            for _ in 0..ban_count {
                let octets = <[u8; 16]>::mrd_deserialize(&mut reader)?;
                let v6 = std::net::Ipv6Addr::from(octets);
                let ip = match v6.to_ipv4() {
                    Some(v4) => IpAddr::V4(v4),
                    None => IpAddr::V6(v6),
                };
                let until = u64::mrd_deserialize(&mut reader)?;
                ban_map.insert(ip, until);
            }
        }

        Ok(AddressBook {
            records: records
                .into_iter()
                .map(|record| (record.addr, record))
                .collect(),
            bans: ban_map,
            scores: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn addr(last_octet: u8) -> SocketAddr {
        SocketAddr::from(([203, 0, 113, last_octet], 9333))
    }

    #[test]
    fn failed_attempts_back_off_and_eventually_evict() {
        meridian_test::init();

        let mut book = AddressBook::new();
        book.add(addr(1), PeerServices::NODE_NETWORK, NOW);

        // Fresh records are immediately dialable.
        assert_eq!(book.get_random_for_connect(NOW), Some(addr(1)));

        book.mark_attempt(addr(1), NOW);
        book.mark_failed(addr(1));
        // One failure: not dialable again until the base delay passes.
        assert_eq!(book.get_random_for_connect(NOW), None);
        assert_eq!(
            book.get_random_for_connect(NOW + RETRY_BASE_SECS),
            Some(addr(1))
        );

        // Second failure doubles the delay.
        book.mark_attempt(addr(1), NOW);
        book.mark_failed(addr(1));
        assert_eq!(book.get_random_for_connect(NOW + RETRY_BASE_SECS), None);
        assert_eq!(
            book.get_random_for_connect(NOW + 2 * RETRY_BASE_SECS),
            Some(addr(1))
        );

        // Enough failures evict the record entirely.
        for _ in 0..MAX_ATTEMPTS {
            book.mark_failed(addr(1));
        }
        assert!(book.is_empty());
    }

    #[test]
    fn good_marks_reset_the_backoff() {
        meridian_test::init();

        let mut book = AddressBook::new();
        book.add(addr(1), PeerServices::NODE_NETWORK, NOW);
        book.mark_attempt(addr(1), NOW);
        book.mark_failed(addr(1));
        book.mark_good(addr(1), NOW + 5);

        let record = book.records.get(&addr(1)).unwrap();
        assert_eq!(record.attempts, 0);
        assert!(record.connected);

        // Connected records are not offered for dialing.
        assert_eq!(book.get_random_for_connect(NOW + 10), None);
        book.mark_disconnected(addr(1));
        assert_eq!(book.get_random_for_connect(NOW + 10), Some(addr(1)));
    }

    #[test]
    fn misbehavior_accumulates_to_a_ban() {
        meridian_test::init();

        let mut book = AddressBook::new();
        let ip = addr(1).ip();

        assert!(!book.misbehave(ip, 50, NOW));
        assert!(!book.is_banned(ip, NOW));
        assert!(book.misbehave(ip, 50, NOW));
        assert!(book.is_banned(ip, NOW));

        // Bans expire.
        assert!(!book.is_banned(ip, NOW + BAN_DURATION_SECS + 1));
        book.sweep_bans(NOW + BAN_DURATION_SECS + 1);
        assert!(book.bans.is_empty());
    }

    #[test]
    fn persistence_round_trip_keeps_records_and_bans() {
        meridian_test::init();

        let mut book = AddressBook::new();
        book.add(addr(1), PeerServices::NODE_NETWORK, NOW);
        book.add(addr(2), PeerServices::NODE_NETWORK, NOW - 100);
        book.mark_good(addr(1), NOW);
        book.ban(addr(9).ip(), NOW + BAN_DURATION_SECS);

        let restored =
            AddressBook::from_bytes(Some(&book.to_bytes()), Some(&book.bans_to_bytes())).unwrap();
        assert_eq!(restored.records.len(), 2);
        assert!(restored.is_banned(addr(9).ip(), NOW));
        // Connection state does not survive restarts.
        assert!(!restored.records[&addr(1)].connected);
    }

    #[test]
    fn gossip_skips_stale_addresses() {
        meridian_test::init();

        let mut book = AddressBook::new();
        book.add(addr(1), PeerServices::NODE_NETWORK, NOW);
        book.add(
            addr(2),
            PeerServices::NODE_NETWORK,
            NOW - ADDR_GOSSIP_HORIZON_SECS - 10,
        );

        let gossip = book.addresses_for_gossip(100, NOW);
        assert_eq!(gossip.len(), 1);
        assert_eq!(gossip[0].addr, addr(1));
    }
}
