//! Record storage seam.
//!
//! The engine never touches a concrete storage technology; it sees only
//! [`RecordStore`]. The in-memory implementation is what the daemon runs
//! with; a relational backend would implement the same four operations.

use std::sync::Arc;

use dashmap::DashMap;

use crate::record::{Identity, ServerRecord};

/// The narrow storage contract of the engine.
///
/// Implementations must make each operation atomic with respect to the
/// others: a reader must never observe a half-updated record.
pub trait RecordStore: Send + Sync {
    /// Look up by exact identity.
    fn find(&self, identity: &Identity) -> Option<ServerRecord>;

    /// Announce-time lookup: by world id when one was sent, otherwise by
    /// endpoint. The endpoint scan also matches records keyed by a world
    /// id, keeping (address, port) unique among online records.
    fn find_for_announce(
        &self,
        world_id: Option<&str>,
        address: &str,
        port: u16,
    ) -> Option<ServerRecord>;

    /// Insert or replace the record under its identity.
    fn upsert(&self, record: ServerRecord);

    /// Transition a record to offline. Returns false when absent.
    fn mark_offline(&self, identity: &Identity, now: u64) -> bool;

    /// Snapshot of every online record.
    fn online_records(&self) -> Vec<ServerRecord>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store, shared between the announce path and the sweeper.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<Identity, ServerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }
}

impl RecordStore for MemoryStore {
    fn find(&self, identity: &Identity) -> Option<ServerRecord> {
        self.records.get(identity).map(|r| r.clone())
    }

    fn find_for_announce(
        &self,
        world_id: Option<&str>,
        address: &str,
        port: u16,
    ) -> Option<ServerRecord> {
        if let Some(id) = world_id {
            return self.find(&Identity::World(id.to_string()));
        }
        if let Some(rec) = self.find(&Identity::Endpoint(address.to_string(), port)) {
            return Some(rec);
        }
        // A record created under a world id is still addressable by its
        // endpoint. The registry stays small enough that a scan is fine.
        self.records
            .iter()
            .find(|e| e.value().address == address && e.value().port == port)
            .map(|e| e.value().clone())
    }

    fn upsert(&self, record: ServerRecord) {
        self.records.insert(record.identity(), record);
    }

    fn mark_offline(&self, identity: &Identity, now: u64) -> bool {
        match self.records.get_mut(identity) {
            Some(mut rec) => {
                if rec.online {
                    rec.mark_offline(now);
                }
                true
            }
            None => false,
        }
    }

    fn online_records(&self) -> Vec<ServerRecord> {
        self.records
            .iter()
            .filter(|e| e.value().online)
            .map(|e| e.value().clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
