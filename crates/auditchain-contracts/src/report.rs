//! Validation, point-verification and genesis outcome types.

use serde::{Deserialize, Serialize};

use crate::record::AuditRecord;

/// What a validation walk found wrong with one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IntegrityFinding {
    /// The record's `previous_hash` is not its predecessor's stored hash.
    LinkBreak { expected: String, actual: String },
    /// The record's recomputed hash differs from its stored hash.
    ContentTamper { computed: String, stored: String },
}

impl IntegrityFinding {
    /// The short description printed in reports.
    pub fn summary(&self) -> &'static str {
        match self {
            IntegrityFinding::LinkBreak { .. } => "previous hash mismatch",
            IntegrityFinding::ContentTamper { .. } => "hash mismatch",
        }
    }

    /// The summary plus expected/actual values.
    pub fn detail(&self) -> String {
        match self {
            IntegrityFinding::LinkBreak { expected, actual } => {
                format!("{}: expected {}, got {}", self.summary(), expected, actual)
            }
            IntegrityFinding::ContentTamper { computed, stored } => {
                format!("{}: computed {}, stored {}", self.summary(), computed, stored)
            }
        }
    }
}

/// One integrity finding, attributed to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: u64,
    pub event_id: String,
    /// Short description, e.g. `"hash mismatch"`.
    pub error: String,
    pub finding: IntegrityFinding,
}

impl ErrorRecord {
    pub fn new(id: u64, event_id: impl Into<String>, finding: IntegrityFinding) -> Self {
        Self {
            id,
            event_id: event_id.into(),
            error: finding.summary().to_string(),
            finding,
        }
    }
}

/// Result of walking a range of the chain.
///
/// `is_valid` is true iff `error_records` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainValidationReport {
    pub is_valid: bool,
    pub total_records: u64,
    pub error_records: Vec<ErrorRecord>,
}

impl ChainValidationReport {
    pub fn empty() -> Self {
        Self {
            is_valid: true,
            total_records: 0,
            error_records: Vec::new(),
        }
    }

    pub fn from_findings(total_records: u64, error_records: Vec<ErrorRecord>) -> Self {
        Self {
            is_valid: error_records.is_empty(),
            total_records,
            error_records,
        }
    }
}

/// Result of spot-checking a single event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventVerification {
    pub found: bool,
    pub hash_matches: bool,
    pub record: Option<AuditRecord>,
    pub computed_hash: Option<String>,
}

impl EventVerification {
    pub fn not_found() -> Self {
        Self {
            found: false,
            hash_matches: false,
            record: None,
            computed_hash: None,
        }
    }
}

/// What the genesis registrar did.
#[derive(Debug, Clone, PartialEq)]
pub enum GenesisOutcome {
    /// The genesis record was appended by this call.
    Created(AuditRecord),
    /// A record with the requested event id already existed; nothing written.
    AlreadyExists(AuditRecord),
}

impl GenesisOutcome {
    pub fn record(&self) -> &AuditRecord {
        match self {
            GenesisOutcome::Created(r) | GenesisOutcome::AlreadyExists(r) => r,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, GenesisOutcome::Created(_))
    }
}
