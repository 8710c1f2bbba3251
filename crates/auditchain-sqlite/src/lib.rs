//! # auditchain-sqlite
//!
//! SQLite persistence for the audit chain.
//!
//! Records live in a single append-only `audit_log` table.  Nothing in this
//! crate updates or deletes a row; the chain validator is what notices when
//! someone else does.
//!
//! ```rust,ignore
//! use std::{sync::Arc, time::Duration};
//! use auditchain_sqlite::SqliteAuditStore;
//!
//! let store = SqliteAuditStore::open("audit.db", Duration::from_secs(5))?;
//! let service = AuditChainService::new(Arc::new(store), &config);
//! ```

pub mod store;

pub use store::SqliteAuditStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use rusqlite::params;
    use serde_json::json;

    use auditchain_contracts::{
        error::AuditError,
        event::{GenesisEvent, NewAuditEvent},
        query::{RecordFilter, RecordQuery, ValidationFilter},
        record::{AuditAction, GENESIS},
        report::GenesisOutcome,
    };
    use auditchain_core::{
        hash::recompute,
        traits::{AuditStore, Clock},
    };
    use auditchain_ledger::{
        AuditChainConfig, AuditChainService, ChainWriter, InMemoryAuditStore, WriterConfig,
    };

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Advances one second on every reading.
    struct SteppingClock {
        start: DateTime<Utc>,
        ticks: AtomicI64,
    }

    impl SteppingClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                start: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
                ticks: AtomicI64::new(0),
            })
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst);
            self.start + chrono::Duration::seconds(n) + chrono::Duration::microseconds(250)
        }
    }

    fn service_over(store: Arc<dyn AuditStore>) -> AuditChainService {
        AuditChainService::with_clock(store, SteppingClock::new(), &AuditChainConfig::default())
    }

    fn sqlite_service() -> (SqliteAuditStore, AuditChainService) {
        let store = SqliteAuditStore::in_memory().unwrap();
        let service = service_over(Arc::new(store.clone()));
        (store, service)
    }

    fn mixed_events() -> Vec<NewAuditEvent> {
        vec![
            NewAuditEvent::new("orders", "1001", AuditAction::Insert)
                .with_org("org-a")
                .with_diff_after(json!({ "total": 1999, "items": [{ "sku": "A-1", "qty": 2 }] }))
                .with_request_id("req-1"),
            NewAuditEvent::new("orders", "1001", AuditAction::Update)
                .with_org("org-a")
                .with_diff_before(json!({ "status": "PENDING" }))
                .with_diff_after(json!({ "status": "PAID" }))
                .with_request_id("req-2"),
            NewAuditEvent::new("withdrawals", "w-7", AuditAction::Insert)
                .with_org("org-b")
                .with_diff_after(json!({ "amount": 12.5, "currency": "EUR" }))
                .with_request_id("req-3"),
            NewAuditEvent::new("products", "sku-9", AuditAction::Delete)
                .with_reason("discontinued")
                .with_request_id("req-4"),
            NewAuditEvent::new("orders", "1002", AuditAction::Insert)
                .with_org("org-b")
                .with_request_id("req-5"),
        ]
    }

    fn execute(store: &SqliteAuditStore, sql: &str) {
        store.conn.lock().unwrap().execute(sql, params![]).unwrap();
    }

    // ── Storage ───────────────────────────────────────────────────────────────

    #[test]
    fn test_stored_record_reads_back_identically() {
        let (store, service) = sqlite_service();
        for event in mixed_events() {
            let written = service.append_durable(event).unwrap();
            let read = store.get(written.id).unwrap().unwrap();
            assert_eq!(read, written);
            assert_eq!(recompute(&read), read.sha256_hash);
        }
        assert!(store.get(99).unwrap().is_none());
    }

    #[test]
    fn test_tail_and_predecessor() {
        let (store, service) = sqlite_service();
        assert!(store.tail().unwrap().is_none());

        for event in mixed_events() {
            service.append_durable(event).unwrap();
        }
        let tail = store.tail().unwrap().unwrap();
        assert_eq!(tail.id, 5);

        let prev = store.predecessor(3).unwrap().unwrap();
        assert_eq!(prev.id, 2);
        assert_eq!(prev.sha256_hash, store.get(2).unwrap().unwrap().sha256_hash);
        assert!(store.predecessor(1).unwrap().is_none());
    }

    #[test]
    fn test_append_rejects_stale_link() {
        let (store, service) = sqlite_service();
        let first = service.append_durable(mixed_events().remove(0)).unwrap();
        service.append_durable(mixed_events().remove(1)).unwrap();

        let mut stale = store.scan(0, 2, 10).unwrap().remove(1);
        stale.previous_hash = first.sha256_hash.clone();
        let pending = auditchain_contracts::record::PendingRecord {
            event_id: "EVT-stale".to_string(),
            org_id: stale.org_id,
            table_name: stale.table_name,
            record_id: stale.record_id,
            action: stale.action,
            diff_before: stale.diff_before,
            diff_after: stale.diff_after,
            operator_id: stale.operator_id,
            operator_type: stale.operator_type,
            operator_name: stale.operator_name,
            ip_address: stale.ip_address,
            user_agent: stale.user_agent,
            reason: stale.reason,
            previous_hash: stale.previous_hash,
            sha256_hash: "0".repeat(64),
            created_at: stale.created_at,
        };

        let err = store.append(pending.clone()).unwrap_err();
        assert!(matches!(err, AuditError::TailConflict { .. }));

        let mut genesis_again = pending;
        genesis_again.previous_hash = GENESIS.to_string();
        assert!(store.append(genesis_again).unwrap_err().is_retryable());
        assert_eq!(store.tail().unwrap().unwrap().id, 2);
    }

    #[test]
    fn test_scan_respects_bounds() {
        let (store, service) = sqlite_service();
        for event in mixed_events() {
            service.append_durable(event).unwrap();
        }
        let ids: Vec<u64> = store.scan(1, 4, 2).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
        let ids: Vec<u64> = store.scan(3, 4, 10).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4]);
    }

    /// SQL pushdown must select what `RecordFilter::matches` selects.
    #[test]
    fn test_filters_agree_with_in_memory_store() {
        let (sqlite, on_sqlite) = sqlite_service();
        let memory = InMemoryAuditStore::new();
        let on_memory = service_over(Arc::new(memory.clone()));
        for event in mixed_events() {
            on_sqlite.append_durable(event.clone()).unwrap();
            on_memory.append_durable(event).unwrap();
        }

        let third = sqlite.get(3).unwrap().unwrap().created_at;
        let filters = vec![
            RecordFilter::default(),
            RecordFilter {
                table_name: Some("orders".to_string()),
                ..RecordFilter::default()
            },
            RecordFilter {
                org_id: Some("org-b".to_string()),
                action: Some(AuditAction::Insert),
                ..RecordFilter::default()
            },
            RecordFilter {
                from: Some(third),
                ..RecordFilter::default()
            },
            RecordFilter {
                from: Some(third + chrono::Duration::microseconds(1)),
                ..RecordFilter::default()
            },
            RecordFilter {
                to: Some(third),
                ..RecordFilter::default()
            },
            RecordFilter {
                keyword: Some("req-4".to_string()),
                ..RecordFilter::default()
            },
            RecordFilter {
                keyword: Some("ORDERS".to_string()),
                ..RecordFilter::default()
            },
        ];

        for filter in filters {
            let query = RecordQuery::new(filter.clone());
            let ids = |page: auditchain_contracts::query::RecordPage| {
                page.records.iter().map(|r| r.id).collect::<Vec<_>>()
            };
            assert_eq!(
                ids(sqlite.query(&query).unwrap()),
                ids(memory.query(&query).unwrap()),
                "{filter:?}"
            );
            assert_eq!(
                sqlite.statistics(&filter).unwrap(),
                memory.statistics(&filter).unwrap(),
                "{filter:?}"
            );
            assert_eq!(
                sqlite.id_span(&filter, 5).unwrap(),
                memory.id_span(&filter, 5).unwrap(),
                "{filter:?}"
            );
        }
    }

    #[test]
    fn test_listing_is_newest_first_and_paged() {
        let (store, service) = sqlite_service();
        for _ in 0..5 {
            for event in mixed_events() {
                service.append_durable(event).unwrap();
            }
        }

        let query = RecordQuery {
            filter: RecordFilter::default(),
            page: 2,
            page_size: 10,
        };
        let page = store.query(&query).unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
        let ids: Vec<u64> = page.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, (6..=15u64).rev().collect::<Vec<u64>>());
    }

    #[test]
    fn test_find_by_event_id_prefers_lowest_id() {
        let (store, service) = sqlite_service();
        let event = NewAuditEvent::new("orders", "1", AuditAction::Insert).with_event_id("EVT-dup");
        service.append_durable(event.clone()).unwrap();
        service.append_durable(event).unwrap();

        assert_eq!(store.find_by_event_id("EVT-dup").unwrap().unwrap().id, 1);
        assert!(store.find_by_event_id("EVT-none").unwrap().is_none());
    }

    // ── Tamper detection through raw SQL ──────────────────────────────────────

    #[test]
    fn test_sql_update_of_diff_is_detected() {
        let (store, service) = sqlite_service();
        for event in mixed_events() {
            service.append_durable(event).unwrap();
        }
        execute(&store, r#"UPDATE audit_log SET diff_after = '{"status":"REFUNDED"}' WHERE id = 2"#);

        let report = service.validate_chain(&ValidationFilter::all()).unwrap();
        assert!(!report.is_valid);
        assert_eq!(report.error_records.len(), 1);
        assert_eq!(report.error_records[0].id, 2);
        assert_eq!(report.error_records[0].error, "hash mismatch");

        let check = service.verify_event("EVT-req-2").unwrap();
        assert!(check.found && !check.hash_matches);
    }

    #[test]
    fn test_sql_delete_breaks_next_link() {
        let (store, service) = sqlite_service();
        for event in mixed_events() {
            service.append_durable(event).unwrap();
        }
        execute(&store, "DELETE FROM audit_log WHERE id = 3");

        let report = service.validate_chain(&ValidationFilter::all()).unwrap();
        assert_eq!(report.total_records, 4);
        assert_eq!(report.error_records.len(), 1);
        assert_eq!(report.error_records[0].id, 4);
        assert_eq!(report.error_records[0].error, "previous hash mismatch");
    }

    #[test]
    fn test_whitespace_reformatting_is_not_tampering() {
        let (store, service) = sqlite_service();
        for event in mixed_events() {
            service.append_durable(event).unwrap();
        }
        execute(
            &store,
            r#"UPDATE audit_log SET diff_after = '{ "currency" : "EUR", "amount" : 12.5 }' WHERE id = 3"#,
        );
        assert!(service.validate_chain(&ValidationFilter::all()).unwrap().is_valid);
    }

    #[test]
    fn test_floats_in_diffs_read_back_to_their_hash() {
        let (_store, service) = sqlite_service();
        let amounts = [
            1.0715660391465826e-75,
            -1.81996730402717e-179,
            -1.603964615428183e143,
            0.1 + 0.2,
        ];
        for (i, &amount) in amounts.iter().enumerate() {
            let record = service
                .append_durable(
                    NewAuditEvent::new("ledger_entries", format!("le-{}", i), AuditAction::Insert)
                        .with_diff_after(json!({ "amount": amount, "rates": [amount, -amount] })),
                )
                .unwrap();
            let stored = service.get(record.id).unwrap().unwrap();
            assert_eq!(stored.diff_after, record.diff_after);
            assert_eq!(recompute(&stored), stored.sha256_hash);
        }

        let report = service.validate_chain(&ValidationFilter::all()).unwrap();
        assert!(report.is_valid, "{:?}", report.error_records);
        assert_eq!(report.total_records, amounts.len() as u64);
    }

    #[test]
    fn test_corrupt_json_is_a_storage_error() {
        let (store, service) = sqlite_service();
        service.append_durable(mixed_events().remove(0)).unwrap();
        execute(&store, "UPDATE audit_log SET diff_after = '{not json' WHERE id = 1");

        let err = service.validate_chain(&ValidationFilter::all()).unwrap_err();
        assert!(matches!(err, AuditError::Storage { .. }));
    }

    // ── Genesis ───────────────────────────────────────────────────────────────

    #[test]
    fn test_genesis_on_sqlite() {
        let (store, service) = sqlite_service();
        let genesis = GenesisEvent::system_initialization(json!({ "tables_migrated": 74 }));

        let first = service.register_genesis("CHAIN-INIT", genesis.clone()).unwrap();
        assert!(matches!(first, GenesisOutcome::Created(_)));
        let second = service.register_genesis("CHAIN-INIT", genesis).unwrap();
        assert!(!second.was_created());
        assert_eq!(store.tail().unwrap().unwrap().id, 1);
    }

    // ── Files and processes ───────────────────────────────────────────────────

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        {
            let store = SqliteAuditStore::open(&path, Duration::from_secs(5)).unwrap();
            assert_eq!(store.path(), Some(path.as_path()));
            let service = service_over(Arc::new(store));
            for event in mixed_events() {
                service.append_durable(event).unwrap();
            }
        }

        let store = SqliteAuditStore::open(&path, Duration::from_secs(5)).unwrap();
        let service = service_over(Arc::new(store));
        let report = service.validate_chain(&ValidationFilter::all()).unwrap();
        assert!(report.is_valid);
        assert_eq!(report.total_records, 5);
    }

    /// Separate connections stand in for separate processes.
    #[test]
    fn test_writers_on_separate_connections_never_fork() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let config = WriterConfig {
            max_attempts: 100,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
        };

        let handles: Vec<_> = (0..3)
            .map(|w| {
                let store = SqliteAuditStore::open(&path, Duration::from_secs(10)).unwrap();
                let config = config.clone();
                thread::spawn(move || {
                    let writer = ChainWriter::new(
                        Arc::new(store),
                        Arc::new(auditchain_core::traits::SystemClock),
                        config,
                    );
                    for i in 0..15 {
                        writer
                            .append_durable(
                                NewAuditEvent::new("ledger", format!("{w}-{i}"), AuditAction::Insert)
                                    .with_diff_after(json!({ "writer": w, "seq": i })),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let store = SqliteAuditStore::open(&path, Duration::from_secs(5)).unwrap();
        let service = service_over(Arc::new(store));
        let report = service.validate_chain(&ValidationFilter::all()).unwrap();
        assert!(report.is_valid, "{:?}", report.error_records);
        assert_eq!(report.total_records, 45);
    }
}
