use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use insights_agent_witness::{PairKey, PartialWitness};

struct PairEntry {
    /// `None` once taken, either by a merge or by the expiration sweep —
    /// this doubles as the "flushed" flag spec.md §4.4 describes: the
    /// mutex is the single point two racing paths (merge, sweep) must
    /// both go through to claim the partial, so only one can win.
    partial: Mutex<Option<PartialWitness>>,
    cached_at: Instant,
}

/// What happened when a new partial was offered under its pair key.
pub enum TakeOutcome {
    Stored,
    Merged(PartialWitness),
}

/// Map from pair key to partial witness (spec.md §3 Pairing Cache).
/// Invariant: a pair key is present at most once, and only while
/// unpaired (spec.md §3) — enforced by routing every mutation through
/// `dashmap`'s per-shard `Entry` API plus a per-entry mutex, so the
/// "pair arrived" path and the background expiration sweep can never
/// both emit the same partial (spec.md §4.4 "Double-flush guard").
#[derive(Default)]
pub struct PairingCache {
    entries: DashMap<PairKey, Arc<PairEntry>>,
}

impl PairingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomically loads-and-deletes the partial cached under `key`; on a
    /// miss, stores `new_partial` (spec.md §4.4 `Process`).
    pub fn take_or_insert(&self, key: PairKey, new_partial: PartialWitness) -> TakeOutcome {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let entry = Arc::clone(occupied.get());
                occupied.remove();
                match entry.partial.lock().take() {
                    Some(existing) => TakeOutcome::Merged(existing),
                    None => {
                        // The expiration sweep claimed this entry's
                        // partial between our `entry()` call observing it
                        // occupied and us taking the per-entry mutex.
                        // Treat the freshly-arrived side as a fresh store.
                        self.insert_new(key, new_partial);
                        TakeOutcome::Stored
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(PairEntry {
                    partial: Mutex::new(Some(new_partial)),
                    cached_at: Instant::now(),
                }));
                TakeOutcome::Stored
            }
        }
    }

    fn insert_new(&self, key: PairKey, partial: PartialWitness) {
        self.entries.insert(
            key,
            Arc::new(PairEntry {
                partial: Mutex::new(Some(partial)),
                cached_at: Instant::now(),
            }),
        );
    }

    /// Flushes every entry whose age is `>= expiration` (spec.md §8:
    /// "Pair expiration at exactly `PAIR_EXPIRATION` emits
    /// single-sided"), removing it from the cache.
    pub fn sweep_expired(&self, expiration: Duration) -> Vec<PartialWitness> {
        let now = Instant::now();
        let expired_keys: Vec<PairKey> = self
            .entries
            .iter()
            .filter(|kv| now.duration_since(kv.value().cached_at) >= expiration)
            .map(|kv| kv.key().clone())
            .collect();

        self.take_keys(expired_keys)
    }

    /// Flushes every entry unconditionally, as if each had expired
    /// (spec.md §4.4 `Close`).
    pub fn drain_all(&self) -> Vec<PartialWitness> {
        let keys: Vec<PairKey> = self.entries.iter().map(|kv| kv.key().clone()).collect();
        self.take_keys(keys)
    }

    fn take_keys(&self, keys: Vec<PairKey>) -> Vec<PartialWitness> {
        let mut flushed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key) {
                if let Some(partial) = entry.partial.lock().take() {
                    flushed.push(partial);
                }
            }
        }
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use insights_agent_witness::{Direction, FiveTuple, MethodTree};
    use std::net::{IpAddr, Ipv4Addr};

    fn partial(direction: Direction) -> PartialWitness {
        let now = Utc::now();
        PartialWitness {
            pair_key: PairKey::new("s", 1),
            tuple: FiveTuple {
                src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                src_port: 1,
                dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                dst_port: 2,
                interface: "eth0".to_string(),
            },
            direction,
            method: Some("GET".to_string()),
            host: Some("h".to_string()),
            path_template: Some("/p".to_string()),
            status_code: None,
            tree: MethodTree::empty(),
            observed_at: now,
            final_packet_at: now,
        }
    }

    #[test]
    fn first_arrival_is_stored_second_triggers_merge() {
        let cache = PairingCache::new();
        let key = PairKey::new("s", 1);

        let outcome = cache.take_or_insert(key.clone(), partial(Direction::Request));
        assert!(matches!(outcome, TakeOutcome::Stored));
        assert_eq!(cache.len(), 1);

        let outcome = cache.take_or_insert(key, partial(Direction::Response));
        assert!(matches!(outcome, TakeOutcome::Merged(_)));
        assert_eq!(cache.len(), 0, "pair key removed once merged");
    }

    #[test]
    fn expiration_sweep_flushes_only_old_entries() {
        let cache = PairingCache::new();
        cache.take_or_insert(PairKey::new("old", 1), partial(Direction::Request));
        std::thread::sleep(Duration::from_millis(20));
        cache.take_or_insert(PairKey::new("new", 1), partial(Direction::Request));

        let flushed = cache.sweep_expired(Duration::from_millis(10));
        assert_eq!(flushed.len(), 1);
        assert_eq!(cache.len(), 1, "the newer entry remains cached");
    }

    #[test]
    fn drain_all_flushes_every_entry_regardless_of_age() {
        let cache = PairingCache::new();
        cache.take_or_insert(PairKey::new("a", 1), partial(Direction::Request));
        cache.take_or_insert(PairKey::new("b", 1), partial(Direction::Response));

        let flushed = cache.drain_all();
        assert_eq!(flushed.len(), 2);
        assert!(cache.is_empty());
    }
}
