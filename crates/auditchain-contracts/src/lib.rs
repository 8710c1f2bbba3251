//! # auditchain-contracts
//!
//! Shared types and error definitions for the audit chain.
//!
//! All crates in the workspace import from here. No chain logic lives in
//! this crate, only the record model, caller payloads, report types and
//! errors.

pub mod error;
pub mod event;
pub mod query;
pub mod record;
pub mod report;

pub use error::{AuditError, AuditResult};
pub use event::{GenesisEvent, NewAuditEvent, Operator};
pub use query::{ChainStatistics, RecordFilter, RecordPage, RecordQuery, ValidationFilter};
pub use record::{AuditAction, AuditRecord, ChainTail, OperatorType, PendingRecord, GENESIS};
pub use report::{
    ChainValidationReport, ErrorRecord, EventVerification, GenesisOutcome, IntegrityFinding,
};
