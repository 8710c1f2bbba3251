//! Chain validation: walk records in id order and check every link and hash.
//!
//! The walk always continues from a record's *stored* hash, even when that
//! record failed its own hash check.  A single tampered record therefore
//! produces one finding instead of cascading onto every later record.
//!
//! Tenant and date filters select which records are *reported on*; they do
//! not change what a record links to.  The chain is global, so a filtered
//! walk still follows every record between the first and last in-scope ids.

use std::sync::Arc;

use tracing::{debug, info, warn};

use auditchain_contracts::{
    error::AuditResult,
    query::ValidationFilter,
    record::{AuditRecord, GENESIS},
    report::{ChainValidationReport, ErrorRecord, EventVerification, IntegrityFinding},
};
use auditchain_core::{hash::recompute, traits::AuditStore};

/// Incremental state of a validation walk.
pub(crate) struct ChainWalk {
    expected_prev: String,
    total: u64,
    errors: Vec<ErrorRecord>,
}

impl ChainWalk {
    /// Start a walk whose first record must link to `expected_prev`.
    pub(crate) fn new(expected_prev: impl Into<String>) -> Self {
        Self {
            expected_prev: expected_prev.into(),
            total: 0,
            errors: Vec::new(),
        }
    }

    /// Check `record` if it is in scope, then advance to its stored hash.
    pub(crate) fn visit(&mut self, record: &AuditRecord, in_scope: bool) {
        if in_scope {
            self.total += 1;

            if record.previous_hash != self.expected_prev {
                self.errors.push(ErrorRecord::new(
                    record.id,
                    record.event_id.clone(),
                    IntegrityFinding::LinkBreak {
                        expected: self.expected_prev.clone(),
                        actual: record.previous_hash.clone(),
                    },
                ));
            }

            let computed = recompute(record);
            if computed != record.sha256_hash {
                self.errors.push(ErrorRecord::new(
                    record.id,
                    record.event_id.clone(),
                    IntegrityFinding::ContentTamper {
                        computed,
                        stored: record.sha256_hash.clone(),
                    },
                ));
            }
        }

        self.expected_prev.clone_from(&record.sha256_hash);
    }

    pub(crate) fn finish(self) -> ChainValidationReport {
        ChainValidationReport::from_findings(self.total, self.errors)
    }
}

/// Verify an in-memory, id-ordered slice of records.
///
/// The first record must link to `expected_first_prev` (`GENESIS` for a
/// slice that starts at the beginning of the chain).
pub fn verify_records(records: &[AuditRecord], expected_first_prev: &str) -> ChainValidationReport {
    let mut walk = ChainWalk::new(expected_first_prev);
    for record in records {
        walk.visit(record, true);
    }
    walk.finish()
}

/// Read-only integrity checker over an `AuditStore`.
pub struct ChainValidator {
    store: Arc<dyn AuditStore>,
    batch_size: usize,
}

impl ChainValidator {
    pub fn new(store: Arc<dyn AuditStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Validate the records selected by `filter`.
    ///
    /// The tail id is snapshotted first; records appended while the walk is
    /// running do not affect this verdict.  Records are fetched in batches of
    /// `batch_size`.
    ///
    /// # Errors
    ///
    /// Storage failures abort the walk with `AuditError::Storage`.  Integrity
    /// problems are never errors; they are reported in the returned report.
    pub fn validate_chain(&self, filter: &ValidationFilter) -> AuditResult<ChainValidationReport> {
        let Some(tail) = self.store.tail()? else {
            debug!("validation requested on an empty chain");
            return Ok(ChainValidationReport::empty());
        };
        let upper = tail.id;

        let scope = filter.to_record_filter();
        let Some((first, last)) = self.store.id_span(&scope, upper)? else {
            debug!(upper, "no records in validation scope");
            return Ok(ChainValidationReport::empty());
        };

        // The lowest record of the whole chain must be the genesis record.
        let seed = match self.store.predecessor(first)? {
            Some(prev) => prev.sha256_hash,
            None => GENESIS.to_string(),
        };

        debug!(first, last, upper, batch_size = self.batch_size, "validation walk starting");

        let unbounded = filter.is_unbounded();
        let mut walk = ChainWalk::new(seed);
        let mut after = first.saturating_sub(1);
        loop {
            let batch = self.store.scan(after, last, self.batch_size)?;
            let Some(last_in_batch) = batch.last().map(|r| r.id) else {
                break;
            };
            for record in &batch {
                walk.visit(record, unbounded || filter.matches(record));
            }
            after = last_in_batch;
            if after >= last {
                break;
            }
        }

        let report = walk.finish();
        if report.is_valid {
            info!(total_records = report.total_records, "audit chain validation passed");
        } else {
            warn!(
                total_records = report.total_records,
                errors = report.error_records.len(),
                "audit chain validation found integrity errors"
            );
        }
        Ok(report)
    }

    /// Spot-check one event without walking the chain.
    pub fn verify_event(&self, event_id: &str) -> AuditResult<EventVerification> {
        let Some(record) = self.store.find_by_event_id(event_id)? else {
            debug!(event_id = %event_id, "event not found for point verification");
            return Ok(EventVerification::not_found());
        };

        let computed = recompute(&record);
        let hash_matches = computed == record.sha256_hash;
        if !hash_matches {
            warn!(id = record.id, event_id = %event_id, "point verification hash mismatch");
        }

        Ok(EventVerification {
            found: true,
            hash_matches,
            record: Some(record),
            computed_hash: Some(computed),
        })
    }
}
