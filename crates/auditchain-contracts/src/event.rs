//! Caller-supplied audit event payloads.
//!
//! The HTTP adapter (or any other event source) builds a `NewAuditEvent` and
//! hands it to the chain writer.  Linkage fields (`previous_hash`,
//! `sha256_hash`, `created_at`, `id`) are never supplied by callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{AuditAction, OperatorType};

/// Provenance of a mutation: who did it and from where.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: Option<String>,
    pub operator_type: Option<OperatorType>,
    pub name: Option<String>,
}

impl Operator {
    pub fn system(name: impl Into<String>) -> Self {
        Self {
            id: None,
            operator_type: Some(OperatorType::System),
            name: Some(name.into()),
        }
    }
}

/// One mutation to be appended to the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditEvent {
    pub org_id: Option<String>,
    pub table_name: String,
    pub record_id: String,
    pub action: AuditAction,
    pub diff_before: Option<Value>,
    pub diff_after: Option<Value>,
    #[serde(default)]
    pub operator: Operator,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub reason: Option<String>,
    /// Correlation id of the originating request; yields `EVT-<request_id>`.
    pub request_id: Option<String>,
    /// Explicit event id.  Takes precedence over `request_id`.
    pub event_id: Option<String>,
}

impl NewAuditEvent {
    /// Minimal event: everything optional is left empty.
    pub fn new(
        table_name: impl Into<String>,
        record_id: impl Into<String>,
        action: AuditAction,
    ) -> Self {
        Self {
            org_id: None,
            table_name: table_name.into(),
            record_id: record_id.into(),
            action,
            diff_before: None,
            diff_after: None,
            operator: Operator::default(),
            ip_address: None,
            user_agent: None,
            reason: None,
            request_id: None,
            event_id: None,
        }
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_diff_before(mut self, diff: Value) -> Self {
        self.diff_before = Some(diff);
        self
    }

    pub fn with_diff_after(mut self, diff: Value) -> Self {
        self.diff_after = Some(diff);
        self
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_client(mut self, ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

/// Payload of the chain's first record.
///
/// Operator fields default to a system operator when absent; see
/// `GenesisRegistrar`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisEvent {
    pub table_name: String,
    pub record_id: String,
    pub action: AuditAction,
    pub diff_after: Option<Value>,
    pub operator_type: Option<OperatorType>,
    pub operator_name: Option<String>,
    pub reason: Option<String>,
}

impl GenesisEvent {
    /// The conventional bootstrap payload: an `INSERT` on the `_system` table.
    pub fn system_initialization(diff_after: Value) -> Self {
        Self {
            table_name: "_system".to_string(),
            record_id: "database_initialization".to_string(),
            action: AuditAction::Insert,
            diff_after: Some(diff_after),
            operator_type: None,
            operator_name: None,
            reason: Some("Database initialization and audit chain genesis".to_string()),
        }
    }
}
