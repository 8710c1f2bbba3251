//! # auditchain-ledger
//!
//! Immutable, append-only, SHA-256 hash-chained audit log of business data
//! mutations.
//!
//! ## Overview
//!
//! Every mutation is appended as an `AuditRecord` whose hash covers its key
//! fields and its predecessor's hash.  Tampering with any stored record, even
//! a single byte of its `diff_after`, is detected by `ChainValidator`.
//!
//! - `ChainWriter`: the only component that appends; serializes concurrent
//!   writers and retries lost tail races
//! - `ChainValidator`: batched, read-only integrity walk and point checks
//! - `GenesisRegistrar`: idempotent creation of the first record
//! - `AuditChainService`: the above wired over one store
//! - `InMemoryAuditStore`: reference `AuditStore`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use auditchain_ledger::{AuditChainConfig, AuditChainService, InMemoryAuditStore};
//!
//! let service = AuditChainService::new(Arc::new(InMemoryAuditStore::new()), &AuditChainConfig::default());
//! service.append(NewAuditEvent::new("orders", "1001", AuditAction::Insert));
//!
//! let report = service.validate_chain(&ValidationFilter::all())?;
//! assert!(report.is_valid);
//! ```

pub mod config;
pub mod event_id;
pub mod genesis;
pub mod memory;
pub mod service;
pub mod validator;
pub mod writer;

#[cfg(test)]
mod properties;

pub use config::{AuditChainConfig, StorageConfig, ValidatorConfig, WriterConfig};
pub use genesis::GenesisRegistrar;
pub use memory::InMemoryAuditStore;
pub use service::AuditChainService;
pub use validator::{verify_records, ChainValidator};
pub use writer::{ChainWriter, WriteFailureStats};

// ── Tests ─────────────────────────────────────────────────────────────────────
