//! Human-readable output for the `audit-chain` commands.

use auditchain_contracts::{
    query::{ChainStatistics, RecordPage, ValidationFilter},
    record::AuditRecord,
    report::{ChainValidationReport, EventVerification, GenesisOutcome},
};
use auditchain_core::canonical::format_timestamp;

pub fn validation(filter: &ValidationFilter, report: &ChainValidationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Scope: {}\n", describe_scope(filter)));

    if report.is_valid {
        out.push_str("Audit chain validation: PASSED\n");
        out.push_str(&format!("  Total records: {}\n", report.total_records));
        return out;
    }

    out.push_str("Audit chain validation: FAILED\n");
    out.push_str(&format!("  Total records: {}\n", report.total_records));
    out.push_str(&format!("  Errors: {}\n", report.error_records.len()));
    for e in &report.error_records {
        out.push_str(&format!("  - record #{} ({}): {}\n", e.id, e.event_id, e.error));
        out.push_str(&format!("      {}\n", e.finding.detail()));
    }
    out
}

pub fn verification(event_id: &str, v: &EventVerification) -> String {
    let Some(record) = &v.record else {
        return format!("Event not found: {}\n", event_id);
    };

    let mut out = record_details(record);
    if v.hash_matches {
        out.push_str("Hash verification: PASSED\n");
    } else {
        out.push_str("Hash verification: FAILED\n");
        if let Some(computed) = &v.computed_hash {
            out.push_str(&format!("  Computed: {}\n", computed));
        }
        out.push_str(&format!("  Stored:   {}\n", record.sha256_hash));
    }
    out
}

pub fn genesis(outcome: &GenesisOutcome) -> String {
    let headline = if outcome.was_created() {
        "Genesis record created"
    } else {
        "Genesis record already registered"
    };
    format!("{}\n{}", headline, record_details(outcome.record()))
}

pub fn statistics(stats: &ChainStatistics) -> String {
    let mut out = format!("Total records: {}\n", stats.total);
    if !stats.by_action.is_empty() {
        out.push_str("By action:\n");
        for a in &stats.by_action {
            out.push_str(&format!("  {:<8} {}\n", a.action.as_str(), a.count));
        }
    }
    if !stats.by_table.is_empty() {
        out.push_str("By table:\n");
        for t in &stats.by_table {
            out.push_str(&format!("  {:<24} {}\n", t.table_name, t.count));
        }
    }
    out
}

pub fn listing(page: &RecordPage) -> String {
    let mut out = String::new();
    for r in &page.records {
        out.push_str(&format!(
            "{:>8}  {}  {:<6}  {}/{}  {}\n",
            r.id,
            format_timestamp(&r.created_at),
            r.action.as_str(),
            r.table_name,
            r.record_id,
            r.event_id,
        ));
    }
    out.push_str(&format!(
        "Page {} of {} ({} records)\n",
        page.page,
        page.total_pages.max(1),
        page.total
    ));
    out
}

fn record_details(r: &AuditRecord) -> String {
    format!(
        "  ID:            {}\n  Event ID:      {}\n  Table:         {}\n  Record ID:     {}\n  \
         Action:        {}\n  Previous hash: {}\n  SHA-256 hash:  {}\n  Created at:    {}\n",
        r.id,
        r.event_id,
        r.table_name,
        r.record_id,
        r.action,
        r.previous_hash,
        r.sha256_hash,
        format_timestamp(&r.created_at),
    )
}

fn describe_scope(filter: &ValidationFilter) -> String {
    if filter.is_unbounded() {
        return "entire chain".to_string();
    }
    let mut parts = Vec::new();
    if let Some(from) = &filter.from {
        parts.push(format!("from {}", format_timestamp(from)));
    }
    if let Some(to) = &filter.to {
        parts.push(format!("to {}", format_timestamp(to)));
    }
    if let Some(org) = &filter.org_id {
        parts.push(format!("organization {}", org));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use auditchain_contracts::{
        query::{ActionCount, TableCount},
        record::{AuditAction, GENESIS},
        report::{ErrorRecord, IntegrityFinding},
    };

    use super::*;

    fn record() -> AuditRecord {
        AuditRecord {
            id: 7,
            event_id: "EVT-req-7".to_string(),
            org_id: None,
            table_name: "orders".to_string(),
            record_id: "1001".to_string(),
            action: AuditAction::Update,
            diff_before: None,
            diff_after: None,
            operator_id: None,
            operator_type: None,
            operator_name: None,
            ip_address: None,
            user_agent: None,
            reason: None,
            previous_hash: GENESIS.to_string(),
            sha256_hash: "ab".repeat(32),
            created_at: Utc.with_ymd_and_hms(2026, 1, 12, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_failed_report_lists_each_finding() {
        let report = ChainValidationReport::from_findings(
            3,
            vec![ErrorRecord::new(
                2,
                "EVT-2",
                IntegrityFinding::ContentTamper {
                    computed: "c".repeat(64),
                    stored: "s".repeat(64),
                },
            )],
        );
        let text = validation(&ValidationFilter::all(), &report);
        assert!(text.contains("FAILED"));
        assert!(text.contains("record #2 (EVT-2): hash mismatch"));
        assert!(text.contains("entire chain"));
    }

    #[test]
    fn test_passed_report_shows_scope() {
        let filter = ValidationFilter {
            org_id: Some("org-9".to_string()),
            ..ValidationFilter::default()
        };
        let text = validation(&filter, &ChainValidationReport::from_findings(4, Vec::new()));
        assert!(text.contains("PASSED"));
        assert!(text.contains("Total records: 4"));
        assert!(text.contains("organization org-9"));
    }

    #[test]
    fn test_verification_output() {
        assert_eq!(
            verification("EVT-x", &EventVerification::not_found()),
            "Event not found: EVT-x\n"
        );

        let v = EventVerification {
            found: true,
            hash_matches: false,
            record: Some(record()),
            computed_hash: Some("cd".repeat(32)),
        };
        let text = verification("EVT-req-7", &v);
        assert!(text.contains("Previous hash: GENESIS"));
        assert!(text.contains("Created at:    2026-01-12T08:00:00.000Z"));
        assert!(text.contains("Hash verification: FAILED"));
    }

    #[test]
    fn test_statistics_and_listing() {
        let stats = ChainStatistics {
            total: 3,
            by_action: vec![ActionCount {
                action: AuditAction::Insert,
                count: 3,
            }],
            by_table: vec![TableCount {
                table_name: "orders".to_string(),
                count: 3,
            }],
        };
        let text = statistics(&stats);
        assert!(text.starts_with("Total records: 3\n"));
        assert!(text.contains("INSERT"));

        let page = RecordPage {
            records: vec![record()],
            page: 1,
            page_size: 20,
            total: 1,
            total_pages: 1,
        };
        let text = listing(&page);
        assert!(text.contains("orders/1001"));
        assert!(text.ends_with("Page 1 of 1 (1 records)\n"));
    }
}
