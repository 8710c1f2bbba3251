//! In-memory implementation of `AuditStore`.
//!
//! `InMemoryAuditStore` is the reference implementation of the storage
//! primitives.  It keeps all records in a `Vec` protected by a `Mutex`, which
//! also makes its conditional append atomic: the tail check and the push
//! happen under the same lock.
//!
//! Use it for tests, demos and embedding; use the SQLite store for anything
//! that must outlive the process.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use auditchain_contracts::{
    error::{AuditError, AuditResult},
    query::{ChainStatistics, RecordFilter, RecordPage, RecordQuery},
    record::{AuditRecord, ChainTail, PendingRecord, GENESIS},
};
use auditchain_core::traits::AuditStore;

// ── Internal mutable state ────────────────────────────────────────────────────

/// The mutable interior of an `InMemoryAuditStore`.
pub(crate) struct InMemoryState {
    /// All records, in ascending id order.
    pub(crate) records: Vec<AuditRecord>,

    /// The id the next appended record receives (starts at 1).
    pub(crate) next_id: u64,
}

// ── Public store ──────────────────────────────────────────────────────────────

/// An in-memory, append-only audit store.
///
/// Cloning shares the same underlying records.
#[derive(Clone)]
pub struct InMemoryAuditStore {
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        let state = InMemoryState {
            records: Vec::new(),
            next_id: 1,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every stored record in chain order.
    pub fn snapshot(&self) -> AuditResult<Vec<AuditRecord>> {
        Ok(self.lock()?.records.clone())
    }

    fn lock(&self) -> AuditResult<MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|e| AuditError::Storage {
            reason: format!("audit store lock poisoned: {}", e),
        })
    }
}

impl AuditStore for InMemoryAuditStore {
    fn tail(&self) -> AuditResult<Option<ChainTail>> {
        let state = self.lock()?;
        Ok(state.records.last().map(|r| ChainTail {
            id: r.id,
            sha256_hash: r.sha256_hash.clone(),
        }))
    }

    /// Check the tail and push under one lock acquisition.
    fn append(&self, record: PendingRecord) -> AuditResult<AuditRecord> {
        let mut state = self.lock()?;

        let links = match state.records.last() {
            Some(tail) => tail.sha256_hash == record.previous_hash,
            None => record.previous_hash == GENESIS,
        };
        if !links {
            let actual = state
                .records
                .last()
                .map(|t| t.sha256_hash.clone())
                .unwrap_or_else(|| GENESIS.to_string());
            return Err(AuditError::TailConflict {
                observed: record.previous_hash,
                actual,
            });
        }

        let id = state.next_id;
        let stored = record.into_record(id);
        state.records.push(stored.clone());
        state.next_id += 1;

        debug!(id, event_id = %stored.event_id, "record appended to in-memory store");
        Ok(stored)
    }

    fn scan(&self, after_id: u64, up_to_id: u64, limit: usize) -> AuditResult<Vec<AuditRecord>> {
        let state = self.lock()?;
        let start = state.records.partition_point(|r| r.id <= after_id);
        Ok(state.records[start..]
            .iter()
            .take_while(|r| r.id <= up_to_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn predecessor(&self, id: u64) -> AuditResult<Option<ChainTail>> {
        let state = self.lock()?;
        let idx = state.records.partition_point(|r| r.id < id);
        Ok(idx.checked_sub(1).map(|i| {
            let r = &state.records[i];
            ChainTail {
                id: r.id,
                sha256_hash: r.sha256_hash.clone(),
            }
        }))
    }

    fn id_span(&self, filter: &RecordFilter, up_to_id: u64) -> AuditResult<Option<(u64, u64)>> {
        let state = self.lock()?;
        let mut matching = state
            .records
            .iter()
            .take_while(|r| r.id <= up_to_id)
            .filter(|r| filter.matches(r))
            .map(|r| r.id);
        let Some(first) = matching.next() else {
            return Ok(None);
        };
        let last = matching.last().unwrap_or(first);
        Ok(Some((first, last)))
    }

    fn get(&self, id: u64) -> AuditResult<Option<AuditRecord>> {
        let state = self.lock()?;
        Ok(state
            .records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| state.records[i].clone()))
    }

    fn find_by_event_id(&self, event_id: &str) -> AuditResult<Option<AuditRecord>> {
        let state = self.lock()?;
        Ok(state.records.iter().find(|r| r.event_id == event_id).cloned())
    }

    fn query(&self, query: &RecordQuery) -> AuditResult<RecordPage> {
        query.validate()?;
        let state = self.lock()?;
        let matching: Vec<&AuditRecord> = state
            .records
            .iter()
            .rev()
            .filter(|r| query.filter.matches(r))
            .collect();
        let total = matching.len() as u64;
        let records = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .cloned()
            .collect();
        Ok(RecordPage::new(records, query, total))
    }

    fn statistics(&self, filter: &RecordFilter) -> AuditResult<ChainStatistics> {
        let state = self.lock()?;
        Ok(ChainStatistics::tally(
            state.records.iter().filter(|r| filter.matches(r)),
        ))
    }
}
