// Property tests over randomly generated chains.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use auditchain_contracts::{
    event::NewAuditEvent,
    query::ValidationFilter,
    record::{AuditAction, GENESIS},
};
use auditchain_core::hash::recompute;

use crate::{AuditChainConfig, AuditChainService, InMemoryAuditStore};

fn action() -> impl Strategy<Value = AuditAction> {
    prop_oneof![
        Just(AuditAction::Insert),
        Just(AuditAction::Update),
        Just(AuditAction::Delete),
    ]
}

fn events() -> impl Strategy<Value = Vec<(String, String, AuditAction, Option<i64>)>> {
    prop::collection::vec(
        (
            "[a-z_]{1,12}",
            "[A-Za-z0-9-]{1,10}",
            action(),
            prop::option::of(any::<i64>()),
        ),
        1..24,
    )
}

fn build(events: &[(String, String, AuditAction, Option<i64>)]) -> (InMemoryAuditStore, AuditChainService) {
    let store = InMemoryAuditStore::new();
    let service = AuditChainService::new(Arc::new(store.clone()), &AuditChainConfig::default());
    for (table, record, action, amount) in events {
        let mut event = NewAuditEvent::new(table.clone(), record.clone(), *action);
        if let Some(amount) = amount {
            event = event.with_diff_after(json!({ "amount": amount, "note": "ünïcode \"quoted\"" }));
        }
        service.append_durable(event).unwrap();
    }
    (store, service)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_written_chain_links_and_recomputes(events in events()) {
        let (store, service) = build(&events);
        let records = store.snapshot().unwrap();

        prop_assert_eq!(records.len(), events.len());
        prop_assert_eq!(records[0].previous_hash.as_str(), GENESIS);
        for pair in records.windows(2) {
            prop_assert_eq!(&pair[1].previous_hash, &pair[0].sha256_hash);
        }
        for record in &records {
            prop_assert_eq!(recompute(record), record.sha256_hash.clone());
        }

        let report = service.validate_chain(&ValidationFilter::all()).unwrap();
        prop_assert!(report.is_valid);
        prop_assert_eq!(report.total_records, events.len() as u64);
    }

    #[test]
    fn prop_single_tamper_is_isolated(events in events(), pick in any::<prop::sample::Index>()) {
        let (store, service) = build(&events);
        let target = pick.index(events.len()) as u64 + 1;
        {
            let mut state = store.state.lock().unwrap();
            let record = &mut state.records[(target - 1) as usize];
            record.record_id.push_str("-forged");
        }

        let report = service.validate_chain(&ValidationFilter::all()).unwrap();
        prop_assert!(!report.is_valid);
        prop_assert_eq!(report.error_records.len(), 1);
        prop_assert_eq!(report.error_records[0].id, target);
        prop_assert_eq!(report.error_records[0].error.as_str(), "hash mismatch");

        // Re-running over unchanged storage gives the same verdict.
        let again = service.validate_chain(&ValidationFilter::all()).unwrap();
        prop_assert_eq!(report, again);
    }
}
