//! Filters, pagination and statistics over stored records.
//!
//! `RecordFilter::matches` is the reference semantics; storage adapters that
//! push filters down into a query language must agree with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};
use crate::record::{AuditAction, AuditRecord};

/// Largest page a listing may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Selects the records a validation walk reports on.
///
/// Date bounds are inclusive and compare against `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub org_id: Option<String>,
}

impl ValidationFilter {
    /// The whole chain.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none() && self.org_id.is_none()
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.to_record_filter().matches(record)
    }

    pub fn to_record_filter(&self) -> RecordFilter {
        RecordFilter {
            org_id: self.org_id.clone(),
            from: self.from,
            to: self.to,
            ..RecordFilter::default()
        }
    }
}

/// Conjunctive filter over record fields.  `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    pub table_name: Option<String>,
    pub record_id: Option<String>,
    pub action: Option<AuditAction>,
    pub operator_id: Option<String>,
    pub org_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Substring of event id, table name, record id or operator id.
    pub keyword: Option<String>,
}

impl RecordFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(table) = &self.table_name {
            if &record.table_name != table {
                return false;
            }
        }
        if let Some(record_id) = &self.record_id {
            if &record.record_id != record_id {
                return false;
            }
        }
        if let Some(action) = self.action {
            if record.action != action {
                return false;
            }
        }
        if let Some(operator_id) = &self.operator_id {
            if record.operator_id.as_ref() != Some(operator_id) {
                return false;
            }
        }
        if let Some(org_id) = &self.org_id {
            if record.org_id.as_ref() != Some(org_id) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.created_at > to {
                return false;
            }
        }
        if let Some(keyword) = &self.keyword {
            let hit = record.event_id.contains(keyword.as_str())
                || record.table_name.contains(keyword.as_str())
                || record.record_id.contains(keyword.as_str())
                || record
                    .operator_id
                    .as_deref()
                    .is_some_and(|op| op.contains(keyword.as_str()));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// A filtered, paginated listing request.  Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    pub filter: RecordFilter,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            filter: RecordFilter::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl RecordQuery {
    pub fn new(filter: RecordFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Reject out-of-range pagination before any storage call.
    pub fn validate(&self) -> AuditResult<()> {
        if self.page == 0 {
            return Err(AuditError::InvalidInput {
                reason: "page numbers start at 1".to_string(),
            });
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(AuditError::InvalidInput {
                reason: format!(
                    "page size must be between 1 and {}, got {}",
                    MAX_PAGE_SIZE, self.page_size
                ),
            });
        }
        Ok(())
    }

    /// Number of matching records to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub records: Vec<AuditRecord>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl RecordPage {
    pub fn new(records: Vec<AuditRecord>, query: &RecordQuery, total: u64) -> Self {
        let size = u64::from(query.page_size.max(1));
        Self {
            records,
            page: query.page,
            page_size: query.page_size,
            total,
            total_pages: total.div_ceil(size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCount {
    pub action: AuditAction,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCount {
    pub table_name: String,
    pub count: u64,
}

/// Record counts grouped by action and by table.
///
/// Groups are sorted by action and by table name so output is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatistics {
    pub total: u64,
    pub by_action: Vec<ActionCount>,
    pub by_table: Vec<TableCount>,
}

impl ChainStatistics {
    /// Tally statistics from an iterator of matching records.
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a AuditRecord>) -> Self {
        use std::collections::BTreeMap;

        let mut total = 0u64;
        let mut by_action: BTreeMap<AuditAction, u64> = BTreeMap::new();
        let mut by_table: BTreeMap<String, u64> = BTreeMap::new();
        for record in records {
            total += 1;
            *by_action.entry(record.action).or_default() += 1;
            *by_table.entry(record.table_name.clone()).or_default() += 1;
        }

        Self {
            total,
            by_action: by_action
                .into_iter()
                .map(|(action, count)| ActionCount { action, count })
                .collect(),
            by_table: by_table
                .into_iter()
                .map(|(table_name, count)| TableCount { table_name, count })
                .collect(),
        }
    }
}
