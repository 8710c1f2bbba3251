//! # auditchain-core
//!
//! The pure building blocks of the tamper-evident audit chain.
//!
//! This crate provides:
//! - The canonical encoder (`canonical`) that fixes the exact bytes a record
//!   hash covers
//! - The hash computer (`hash`): SHA-256 over that encoding
//! - The `AuditStore` and `Clock` traits that the writer, validator and
//!   storage adapters meet at
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auditchain_core::hash::recompute;
//!
//! let intact = recompute(&record) == record.sha256_hash;
//! ```

pub mod canonical;
pub mod hash;
pub mod traits;

pub use canonical::{canonical_encode, HashInput};
pub use hash::{compute_record_hash, recompute, sha256_hex};
pub use traits::{AuditStore, Clock, SystemClock};
