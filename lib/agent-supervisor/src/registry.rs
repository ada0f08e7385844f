//! The pod-session registry (spec.md §4.1, §5): a concurrent map from
//! `PodUid` to registry entry. Writers use compare-and-insert
//! (load-or-store) semantics so that a racing `Added` event and health
//! tick can never both win and create two sessions for the same pod.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use insights_agent_capability::pod_registry::PodUid;
use insights_agent_session::PodSession;

/// One registry row: the pod session itself plus supervisor-local
/// bookkeeping that does not belong on `PodSession` (spec.md §3 draws
/// the line at the state + stop-channel object; retry accounting and
/// the running task handle are the Supervisor's business).
pub struct RegistryEntry {
    pub session: Arc<PodSession>,
    pub task: Mutex<Option<JoinHandle<()>>>,
    pub env_inspection_attempts: AtomicU32,
}

impl RegistryEntry {
    fn new(session: Arc<PodSession>) -> Self {
        Self {
            session,
            task: Mutex::new(None),
            env_inspection_attempts: AtomicU32::new(0),
        }
    }

    pub fn has_live_task(&self) -> bool {
        matches!(&*self.task.lock(), Some(handle) if !handle.is_finished())
    }
}

/// The Supervisor's authoritative pod-session registry (spec.md §4.1
/// "Owns the set of active capture sessions on a node"). Exclusively
/// owned by the Supervisor; a Capture Session only ever holds a shared
/// reference to one `PodSession` inside one entry, never the map.
#[derive(Default)]
pub struct PodRegistry {
    entries: DashMap<PodUid, Arc<RegistryEntry>>,
}

impl PodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entry only if one is not already present
    /// (load-or-store); returns the entry that ended up in the map
    /// either way, and whether this call was the one that inserted it.
    pub fn load_or_store(&self, uid: PodUid, session: Arc<PodSession>) -> (Arc<RegistryEntry>, bool) {
        match self.entries.entry(uid) {
            Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            Entry::Vacant(vacant) => {
                let entry = Arc::new(RegistryEntry::new(session));
                vacant.insert(Arc::clone(&entry));
                (entry, true)
            }
        }
    }

    pub fn get(&self, uid: &PodUid) -> Option<Arc<RegistryEntry>> {
        self.entries.get(uid).map(|e| Arc::clone(e.value()))
    }

    pub fn remove(&self, uid: &PodUid) -> Option<Arc<RegistryEntry>> {
        self.entries.remove(uid).map(|(_, e)| e)
    }

    pub fn contains(&self, uid: &PodUid) -> bool {
        self.entries.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A read-only diagnostic view of the registry (SPEC_FULL.md §2.1
    /// "debug snapshot operation"), not a mutable handle.
    pub fn snapshot(&self) -> Vec<(PodUid, insights_agent_session::PodSessionState)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().session.state()))
            .collect()
    }

    pub fn iter_entries(&self) -> Vec<(PodUid, Arc<RegistryEntry>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}
