//! Genesis registration: create the chain's first record exactly once.
//!
//! Registration is idempotent on `event_id`.  If a record with that id
//! already exists the registrar reports it and writes nothing.  A chain that
//! already holds other records cannot receive a genesis record at all.

use std::sync::Arc;

use tracing::{info, warn};

use auditchain_contracts::{
    error::{AuditError, AuditResult},
    event::{GenesisEvent, NewAuditEvent, Operator},
    record::{OperatorType, GENESIS},
    report::GenesisOutcome,
};
use auditchain_core::{
    canonical::truncate_to_millis,
    traits::{AuditStore, Clock},
};

use crate::writer::build_pending;

/// Operator name recorded when the genesis event names none.
pub const DEFAULT_GENESIS_OPERATOR: &str = "Internal Audit Team";

pub struct GenesisRegistrar {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
}

impl GenesisRegistrar {
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Register the genesis record under `event_id`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` when `event_id` is blank
    /// - `GenesisConflict` when the chain already has records and none of
    ///   them carries `event_id`
    /// - store errors, unchanged
    pub fn register(&self, event_id: &str, event: GenesisEvent) -> AuditResult<GenesisOutcome> {
        if event_id.trim().is_empty() {
            return Err(AuditError::InvalidInput {
                reason: "genesis event id must not be blank".to_string(),
            });
        }

        // A non-empty chain only accepts the genesis record it already holds.
        if let Some(tail) = self.store.tail()? {
            return self.existing_or_conflict(event_id, tail.id);
        }

        let new_event = to_new_event(event_id, event);
        let created_at = truncate_to_millis(self.clock.now());
        let pending = build_pending(&new_event, event_id, GENESIS.to_string(), created_at);

        match self.store.append(pending) {
            Ok(record) => {
                info!(
                    id = record.id,
                    event_id = %record.event_id,
                    sha256_hash = %record.sha256_hash,
                    "genesis record created"
                );
                Ok(GenesisOutcome::Created(record))
            }
            // Someone else started the chain between the tail read and the insert.
            Err(e) if e.is_retryable() => {
                let tail_id = self.store.tail()?.map(|t| t.id).unwrap_or_default();
                self.existing_or_conflict(event_id, tail_id)
            }
            Err(e) => Err(e),
        }
    }

    fn existing_or_conflict(&self, event_id: &str, tail_id: u64) -> AuditResult<GenesisOutcome> {
        match self.store.find_by_event_id(event_id)? {
            Some(existing) => {
                info!(id = existing.id, event_id = %event_id, "genesis event already registered");
                Ok(GenesisOutcome::AlreadyExists(existing))
            }
            None => {
                warn!(tail_id, event_id = %event_id, "refusing genesis on a non-empty chain");
                Err(AuditError::GenesisConflict { tail_id })
            }
        }
    }
}

fn to_new_event(event_id: &str, event: GenesisEvent) -> NewAuditEvent {
    let operator = Operator {
        id: None,
        operator_type: Some(event.operator_type.unwrap_or(OperatorType::System)),
        name: Some(
            event
                .operator_name
                .unwrap_or_else(|| DEFAULT_GENESIS_OPERATOR.to_string()),
        ),
    };

    NewAuditEvent {
        org_id: None,
        table_name: event.table_name,
        record_id: event.record_id,
        action: event.action,
        diff_before: None,
        diff_after: event.diff_after,
        operator,
        ip_address: None,
        user_agent: None,
        reason: event.reason,
        request_id: None,
        event_id: Some(event_id.to_string()),
    }
}
