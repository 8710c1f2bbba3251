//! SHA-256 hash computation for audit records.

use sha2::{Digest, Sha256};

use auditchain_contracts::record::{AuditRecord, PendingRecord};

use crate::canonical::{canonical_encode, HashInput};

/// Lowercase hex SHA-256 of `bytes` (always 64 characters).
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash of the canonical encoding of `input`.
pub fn compute_record_hash(input: &HashInput<'_>) -> String {
    sha256_hex(&canonical_encode(input))
}

/// Recompute a stored record's hash from its own stored fields.
pub fn recompute(record: &AuditRecord) -> String {
    compute_record_hash(&HashInput::from_record(record))
}

/// Hash a pending record before it is handed to storage.
pub fn hash_pending(record: &PendingRecord) -> String {
    compute_record_hash(&HashInput::from_pending(record))
}
