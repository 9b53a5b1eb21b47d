//! Static membership table.
//!
//! The roster is built once from [`NodeConfig::peers`](crate::config::NodeConfig)
//! and never changes shape afterwards. Each entry carries a liveness flag that
//! only transport-level evidence updates (outbound delivery results and
//! heartbeat probes); the election engine reads it but never writes it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::PeerConfig;
use crate::error::{ElectionError, Result};

/// Unique, totally ordered process priority. Higher wins.
pub type ProcessId = u64;

#[derive(Debug)]
pub struct RosterEntry {
    pub id: ProcessId,
    pub addr: String,
    alive: AtomicBool,
}

impl RosterEntry {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct Roster {
    entries: BTreeMap<ProcessId, RosterEntry>,
}

impl Roster {
    /// Every entry starts presumed alive.
    pub fn from_peers(peers: &[PeerConfig]) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for peer in peers {
            if peer.node_id == 0 {
                return Err(ElectionError::InvalidConfig(format!(
                    "roster entry '{}' has id 0",
                    peer.addr
                )));
            }
            let entry = RosterEntry {
                id: peer.node_id,
                addr: peer.addr.clone(),
                alive: AtomicBool::new(true),
            };
            if entries.insert(peer.node_id, entry).is_some() {
                return Err(ElectionError::InvalidConfig(format!(
                    "duplicate process id {} in roster",
                    peer.node_id
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn addr(&self, id: ProcessId) -> Option<&str> {
        self.entries.get(&id).map(|e| e.addr.as_str())
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> Vec<ProcessId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every other peer not currently presumed down.
    pub fn live_peers_of(&self, id: ProcessId) -> Vec<ProcessId> {
        self.entries
            .values()
            .filter(|e| e.id != id && e.is_alive())
            .map(|e| e.id)
            .collect()
    }

    pub fn is_alive(&self, id: ProcessId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.is_alive())
    }

    /// Records liveness evidence for `id`. Returns the previous value so the
    /// caller can log transitions; unknown ids are ignored.
    pub(crate) fn set_alive(&self, id: ProcessId, alive: bool) -> Option<bool> {
        self.entries
            .get(&id)
            .map(|e| e.alive.swap(alive, Ordering::Relaxed))
    }
}
