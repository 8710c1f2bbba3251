//! Error types for the audit chain.
//!
//! Integrity findings (a broken link, a tampered record) are not errors: they
//! are data in a `ChainValidationReport`.  `AuditError` covers the cases where
//! an operation could not be carried out at all, so callers can always tell
//! "we could not check" apart from "we checked and found tampering".

use thiserror::Error;

/// The unified error type for the audit chain crates.
#[derive(Debug, Error)]
pub enum AuditError {
    /// An append could not be persisted.
    ///
    /// `ChainWriter::append` counts and logs this instead of returning it.
    #[error("audit write failed: {reason}")]
    WriteFailed { reason: String },

    /// A conditional append observed a tail that is no longer the chain tail.
    ///
    /// Returned by stores when another writer appended first; the writer
    /// retries with a fresh tail read.
    #[error("chain tail moved: observed '{observed}', actual '{actual}'")]
    TailConflict { observed: String, actual: String },

    /// Every retry of a contended append lost the race.
    #[error("append abandoned after {attempts} contended attempts")]
    ContentionExhausted { attempts: u32 },

    /// A genesis record was requested for a chain that already has records.
    #[error("chain already started (tail id {tail_id}); refusing a second genesis record")]
    GenesisConflict { tail_id: u64 },

    /// The storage layer failed (connection lost, query error, I/O).
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// A stored or supplied value could not be (de)serialized.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// A configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// Caller-supplied input was rejected before touching storage.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl AuditError {
    /// True when the error is a lost race that a fresh attempt may win.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuditError::TailConflict { .. })
    }
}

/// Convenience alias used throughout the audit chain crates.
pub type AuditResult<T> = Result<T, AuditError>;
