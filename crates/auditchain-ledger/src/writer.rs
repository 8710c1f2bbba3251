//! The chain writer: the only component that appends to the audit chain.
//!
//! Each append is a read-then-write sequence:
//!
//!   read tail → assign event id → stamp created_at → hash → conditional append
//!
//! Two writers that read the same tail would both link to it and fork the
//! chain.  Two layers prevent that:
//!
//! 1. Appends from this process are serialized by a writer-owned lock, so at
//!    most one read-then-write sequence is in flight per writer.
//! 2. The store's `append` only inserts when the record still links to the
//!    current tail.  A writer in another process that got there first turns
//!    our insert into `TailConflict`, and we retry with a fresh tail read,
//!    bounded by `WriterConfig::max_attempts` with exponential backoff.
//!
//! `append` is fire-and-forget: failures are logged and counted, never
//! returned to the business operation.  `append_durable` returns them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use auditchain_contracts::{
    error::{AuditError, AuditResult},
    event::NewAuditEvent,
    record::{AuditRecord, PendingRecord, GENESIS},
};
use auditchain_core::{
    canonical::truncate_to_millis,
    hash::hash_pending,
    traits::{AuditStore, Clock},
};

use crate::{config::WriterConfig, event_id::resolve_event_id};

/// Snapshot of the writer's failure counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteFailureStats {
    /// Fire-and-forget appends that did not reach storage.
    pub failures: u64,
    /// Display text of the most recent failure.
    pub last_error: Option<String>,
}

pub struct ChainWriter {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
    config: WriterConfig,
    append_lock: Mutex<()>,
    failures: AtomicU64,
    last_failure: Mutex<Option<String>>,
}

impl ChainWriter {
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>, config: WriterConfig) -> Self {
        Self {
            store,
            clock,
            config,
            append_lock: Mutex::new(()),
            failures: AtomicU64::new(0),
            last_failure: Mutex::new(None),
        }
    }

    /// Append `event`, never failing the caller.
    ///
    /// A failed append is logged at `error` level and counted in
    /// `failure_stats()`.  The audit entry is then missing from the chain;
    /// operators see that through the counter, not through the caller.
    pub fn append(&self, event: NewAuditEvent) {
        let table_name = event.table_name.clone();
        let record_id = event.record_id.clone();

        if let Err(e) = self.append_durable(event) {
            let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
            match self.last_failure.lock() {
                Ok(mut last) => *last = Some(e.to_string()),
                Err(_) => warn!(
                    error = %e,
                    "last-failure slot poisoned; failure text not retained"
                ),
            }
            error!(
                table_name = %table_name,
                record_id = %record_id,
                error = %e,
                failures,
                "audit append failed; event not recorded"
            );
        }
    }

    /// Append `event` and return the stored record.
    ///
    /// Intended for operations that must not proceed unless their audit entry
    /// is committed.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` when `table_name` or `record_id` is blank
    /// - `ContentionExhausted` when every attempt lost the tail race
    /// - any non-retryable store error, unchanged
    pub fn append_durable(&self, event: NewAuditEvent) -> AuditResult<AuditRecord> {
        validate_event(&event)?;

        let _guard = self.append_lock.lock().map_err(|e| AuditError::WriteFailed {
            reason: format!("append lock poisoned: {}", e),
        })?;

        // Resolved once so every retry carries the same event id.
        let event_id = resolve_event_id(&event, self.clock.now());

        for attempt in 0..self.config.max_attempts {
            let previous_hash = match self.store.tail()? {
                Some(tail) => tail.sha256_hash,
                None => GENESIS.to_string(),
            };
            let created_at = truncate_to_millis(self.clock.now());
            let pending = build_pending(&event, &event_id, previous_hash, created_at);

            match self.store.append(pending) {
                Ok(record) => {
                    info!(
                        id = record.id,
                        event_id = %record.event_id,
                        table_name = %record.table_name,
                        record_id = %record.record_id,
                        "audit record appended"
                    );
                    return Ok(record);
                }
                Err(e) if e.is_retryable() => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        event_id = %event_id,
                        attempt = attempt + 1,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "chain tail moved during append, retrying"
                    );
                    if attempt + 1 < self.config.max_attempts {
                        std::thread::sleep(delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(AuditError::ContentionExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Number of fire-and-forget appends that failed.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn failure_stats(&self) -> WriteFailureStats {
        WriteFailureStats {
            failures: self.failure_count(),
            last_error: self.last_failure.lock().ok().and_then(|l| l.clone()),
        }
    }
}

fn validate_event(event: &NewAuditEvent) -> AuditResult<()> {
    if event.table_name.trim().is_empty() {
        return Err(AuditError::InvalidInput {
            reason: "table_name must not be blank".to_string(),
        });
    }
    if event.record_id.trim().is_empty() {
        return Err(AuditError::InvalidInput {
            reason: "record_id must not be blank".to_string(),
        });
    }
    Ok(())
}

/// Assemble and hash the row for one append attempt.
pub(crate) fn build_pending(
    event: &NewAuditEvent,
    event_id: &str,
    previous_hash: String,
    created_at: DateTime<Utc>,
) -> PendingRecord {
    let mut pending = PendingRecord {
        event_id: event_id.to_string(),
        org_id: event.org_id.clone(),
        table_name: event.table_name.clone(),
        record_id: event.record_id.clone(),
        action: event.action,
        diff_before: event.diff_before.clone(),
        diff_after: event.diff_after.clone(),
        operator_id: event.operator.id.clone(),
        operator_type: event.operator.operator_type,
        operator_name: event.operator.name.clone(),
        ip_address: event.ip_address.clone(),
        user_agent: event.user_agent.clone(),
        reason: event.reason.clone(),
        previous_hash,
        sha256_hash: String::new(),
        created_at,
    };
    pending.sha256_hash = hash_pending(&pending);
    debug!(event_id = %pending.event_id, previous_hash = %pending.previous_hash, "pending record hashed");
    pending
}
