//! The persisted audit record and its enumerations.
//!
//! `AuditRecord` is what storage holds: one immutable row per mutation.
//! `PendingRecord` is the same row before storage has assigned its `id`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuditError;

/// The `previous_hash` sentinel carried by the first record of the chain.
pub const GENESIS: &str = "GENESIS";

/// The kind of mutation an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
}

impl AuditAction {
    /// The wire spelling, which is also the spelling that gets hashed.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Insert => "INSERT",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(AuditAction::Insert),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            other => Err(AuditError::InvalidInput {
                reason: format!("unknown audit action '{}'", other),
            }),
        }
    }
}

/// Who performed the audited mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperatorType {
    System,
    Admin,
    User,
    Merchant,
    Api,
}

impl OperatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorType::System => "SYSTEM",
            OperatorType::Admin => "ADMIN",
            OperatorType::User => "USER",
            OperatorType::Merchant => "MERCHANT",
            OperatorType::Api => "API",
        }
    }
}

impl fmt::Display for OperatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SYSTEM" => Ok(OperatorType::System),
            "ADMIN" => Ok(OperatorType::Admin),
            "USER" => Ok(OperatorType::User),
            "MERCHANT" => Ok(OperatorType::Merchant),
            "API" => Ok(OperatorType::Api),
            other => Err(AuditError::InvalidInput {
                reason: format!("unknown operator type '{}'", other),
            }),
        }
    }
}

/// One immutable, stored link of the audit chain.
///
/// Only `event_id`, `table_name`, `record_id`, `action`, `diff_after`,
/// `previous_hash` and `created_at` are covered by `sha256_hash`.  The
/// remaining fields are provenance metadata and are not chain-protected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Storage-assigned sequence number; the total order of the chain.
    pub id: u64,
    pub event_id: String,
    /// Tenant scope.  Does not affect linkage: the chain is global.
    pub org_id: Option<String>,
    pub table_name: String,
    pub record_id: String,
    pub action: AuditAction,
    /// Advisory snapshot before the mutation.  Not hashed.
    pub diff_before: Option<Value>,
    pub diff_after: Option<Value>,
    pub operator_id: Option<String>,
    pub operator_type: Option<OperatorType>,
    pub operator_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub reason: Option<String>,
    /// `sha256_hash` of the predecessor, or [`GENESIS`].
    pub previous_hash: String,
    pub sha256_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// True when this record claims to be the first link of the chain.
    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS
    }
}

/// A fully hashed record waiting for storage to assign its `id`.
///
/// Stores must insert it only if their current tail hash still equals
/// `previous_hash` (or the chain is empty and `previous_hash` is
/// [`GENESIS`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecord {
    pub event_id: String,
    pub org_id: Option<String>,
    pub table_name: String,
    pub record_id: String,
    pub action: AuditAction,
    pub diff_before: Option<Value>,
    pub diff_after: Option<Value>,
    pub operator_id: Option<String>,
    pub operator_type: Option<OperatorType>,
    pub operator_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub reason: Option<String>,
    pub previous_hash: String,
    pub sha256_hash: String,
    pub created_at: DateTime<Utc>,
}

impl PendingRecord {
    /// Attach the storage-assigned `id`.
    pub fn into_record(self, id: u64) -> AuditRecord {
        AuditRecord {
            id,
            event_id: self.event_id,
            org_id: self.org_id,
            table_name: self.table_name,
            record_id: self.record_id,
            action: self.action,
            diff_before: self.diff_before,
            diff_after: self.diff_after,
            operator_id: self.operator_id,
            operator_type: self.operator_type,
            operator_name: self.operator_name,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            reason: self.reason,
            previous_hash: self.previous_hash,
            sha256_hash: self.sha256_hash,
            created_at: self.created_at,
        }
    }
}

/// The current head of the chain: the max-id record's position and hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTail {
    pub id: u64,
    pub sha256_hash: String,
}
