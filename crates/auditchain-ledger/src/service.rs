//! `AuditChainService`: one explicit object owning the chain components.
//!
//! Construct it once at process start and pass it by reference to every
//! consumer (request handlers, CLI commands, scheduled jobs).  The store is a
//! constructor argument, so tests substitute an in-memory store freely.

use std::sync::Arc;

use auditchain_contracts::{
    error::{AuditError, AuditResult},
    event::{GenesisEvent, NewAuditEvent},
    query::{ChainStatistics, RecordFilter, RecordPage, RecordQuery, ValidationFilter},
    record::AuditRecord,
    report::{ChainValidationReport, EventVerification, GenesisOutcome},
};
use auditchain_core::traits::{AuditStore, Clock, SystemClock};

use crate::{
    config::AuditChainConfig,
    genesis::GenesisRegistrar,
    validator::ChainValidator,
    writer::{ChainWriter, WriteFailureStats},
};

pub struct AuditChainService {
    store: Arc<dyn AuditStore>,
    writer: ChainWriter,
    validator: ChainValidator,
    registrar: GenesisRegistrar,
}

impl AuditChainService {
    /// Wire the service over `store` using the system clock.
    pub fn new(store: Arc<dyn AuditStore>, config: &AuditChainConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<dyn AuditStore>,
        clock: Arc<dyn Clock>,
        config: &AuditChainConfig,
    ) -> Self {
        Self {
            writer: ChainWriter::new(store.clone(), clock.clone(), config.writer.clone()),
            validator: ChainValidator::new(store.clone(), config.validator.batch_size),
            registrar: GenesisRegistrar::new(store.clone(), clock),
            store,
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Fire-and-forget append.  See `ChainWriter::append`.
    pub fn append(&self, event: NewAuditEvent) {
        self.writer.append(event);
    }

    /// Blocking append for security-sensitive operations.
    pub fn append_durable(&self, event: NewAuditEvent) -> AuditResult<AuditRecord> {
        self.writer.append_durable(event)
    }

    pub fn register_genesis(&self, event_id: &str, event: GenesisEvent) -> AuditResult<GenesisOutcome> {
        self.registrar.register(event_id, event)
    }

    pub fn failure_stats(&self) -> WriteFailureStats {
        self.writer.failure_stats()
    }

    // ── Verification ──────────────────────────────────────────────────────────

    pub fn validate_chain(&self, filter: &ValidationFilter) -> AuditResult<ChainValidationReport> {
        self.validator.validate_chain(filter)
    }

    pub fn verify_event(&self, event_id: &str) -> AuditResult<EventVerification> {
        self.validator.verify_event(event_id)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn get(&self, id: u64) -> AuditResult<Option<AuditRecord>> {
        self.store.get(id)
    }

    /// Every record about one business row, newest first.
    pub fn records_for(&self, table_name: &str, record_id: &str) -> AuditResult<Vec<AuditRecord>> {
        let filter = RecordFilter {
            table_name: Some(table_name.to_string()),
            record_id: Some(record_id.to_string()),
            ..RecordFilter::default()
        };
        let mut query = RecordQuery::new(filter);
        query.page_size = auditchain_contracts::query::MAX_PAGE_SIZE;

        let mut records = Vec::new();
        loop {
            let page = self.store.query(&query)?;
            let fetched = page.records.len();
            records.extend(page.records);
            if fetched == 0 || records.len() as u64 >= page.total {
                break;
            }
            query.page += 1;
        }
        Ok(records)
    }

    pub fn list(&self, query: &RecordQuery) -> AuditResult<RecordPage> {
        query.validate()?;
        self.store.query(query)
    }

    /// Keyword search over event id, table name, record id and operator id.
    pub fn search(&self, keyword: &str, page: u32, page_size: u32) -> AuditResult<RecordPage> {
        if keyword.trim().is_empty() {
            return Err(AuditError::InvalidInput {
                reason: "search keyword must not be blank".to_string(),
            });
        }
        let query = RecordQuery {
            filter: RecordFilter {
                keyword: Some(keyword.to_string()),
                ..RecordFilter::default()
            },
            page,
            page_size,
        };
        self.list(&query)
    }

    pub fn statistics(&self, filter: &RecordFilter) -> AuditResult<ChainStatistics> {
        self.store.statistics(filter)
    }
}
