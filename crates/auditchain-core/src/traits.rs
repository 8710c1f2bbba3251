//! Trait seams of the audit chain.
//!
//! - `AuditStore`: the storage primitives the chain logic needs (append a
//!   row, read the latest row, scan ordered rows, plus lookups).  It is the
//!   only seam to persistence.
//! - `Clock`: the source of `created_at`, injectable so tests can control
//!   time.
//!
//! Stores never update or delete a stored record; there is deliberately no
//! method for it.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use auditchain_contracts::{
    error::AuditResult,
    query::{ChainStatistics, RecordFilter, RecordPage, RecordQuery},
    record::{AuditRecord, ChainTail, PendingRecord},
};

/// Persistence for the audit chain.
///
/// Implementations must be safe to share across threads.  Every method that
/// can touch the backing storage returns `AuditError::Storage` when it fails.
pub trait AuditStore: Send + Sync {
    /// The max-id record's position and stored hash, or `None` when the
    /// chain is empty.
    fn tail(&self) -> AuditResult<Option<ChainTail>>;

    /// Atomically append `record` if it links to the current tail.
    ///
    /// The insert happens only when the store's tail hash equals
    /// `record.previous_hash`, or the store is empty and
    /// `record.previous_hash` is `GENESIS`.  Otherwise nothing is written and
    /// `AuditError::TailConflict` is returned.  On success the record comes
    /// back with its storage-assigned `id`.
    fn append(&self, record: PendingRecord) -> AuditResult<AuditRecord>;

    /// Up to `limit` records with `after_id < id <= up_to_id`, ascending by id.
    fn scan(&self, after_id: u64, up_to_id: u64, limit: usize) -> AuditResult<Vec<AuditRecord>>;

    /// Position and stored hash of the record with the greatest id below `id`.
    fn predecessor(&self, id: u64) -> AuditResult<Option<ChainTail>>;

    /// Smallest and largest id of the records matching `filter` with
    /// `id <= up_to_id`.
    fn id_span(&self, filter: &RecordFilter, up_to_id: u64) -> AuditResult<Option<(u64, u64)>>;

    fn get(&self, id: u64) -> AuditResult<Option<AuditRecord>>;

    /// The lowest-id record carrying `event_id`.  Event ids are not required
    /// to be unique.
    fn find_by_event_id(&self, event_id: &str) -> AuditResult<Option<AuditRecord>>;

    /// Matching records, newest (highest id) first, paginated.
    fn query(&self, query: &RecordQuery) -> AuditResult<RecordPage>;

    fn statistics(&self, filter: &RecordFilter) -> AuditResult<ChainStatistics>;
}

impl<S: AuditStore + ?Sized> AuditStore for Arc<S> {
    fn tail(&self) -> AuditResult<Option<ChainTail>> {
        (**self).tail()
    }

    fn append(&self, record: PendingRecord) -> AuditResult<AuditRecord> {
        (**self).append(record)
    }

    fn scan(&self, after_id: u64, up_to_id: u64, limit: usize) -> AuditResult<Vec<AuditRecord>> {
        (**self).scan(after_id, up_to_id, limit)
    }

    fn predecessor(&self, id: u64) -> AuditResult<Option<ChainTail>> {
        (**self).predecessor(id)
    }

    fn id_span(&self, filter: &RecordFilter, up_to_id: u64) -> AuditResult<Option<(u64, u64)>> {
        (**self).id_span(filter, up_to_id)
    }

    fn get(&self, id: u64) -> AuditResult<Option<AuditRecord>> {
        (**self).get(id)
    }

    fn find_by_event_id(&self, event_id: &str) -> AuditResult<Option<AuditRecord>> {
        (**self).find_by_event_id(event_id)
    }

    fn query(&self, query: &RecordQuery) -> AuditResult<RecordPage> {
        (**self).query(query)
    }

    fn statistics(&self, filter: &RecordFilter) -> AuditResult<ChainStatistics> {
        (**self).statistics(filter)
    }
}

/// Source of wall-clock time for `created_at`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
