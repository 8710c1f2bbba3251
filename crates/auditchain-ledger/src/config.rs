//! TOML configuration for the audit chain service.
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below.
//!
//! ```toml
//! [storage]
//! database_path = "/var/lib/audit/chain.db"
//! busy_timeout_ms = 5000
//!
//! [writer]
//! max_attempts = 5
//! base_backoff_ms = 10
//! max_backoff_ms = 500
//!
//! [validator]
//! batch_size = 500
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use auditchain_contracts::error::{AuditError, AuditResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditChainConfig {
    pub storage: StorageConfig,
    pub writer: WriterConfig,
    pub validator: ValidatorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database file.  `None` leaves the choice to the caller.
    pub database_path: Option<PathBuf>,
    /// How long a SQLite call waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Retry policy for contended appends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriterConfig {
    /// Total append attempts before reporting `ContentionExhausted`.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 500,
        }
    }
}

impl WriterConfig {
    /// Delay before retry number `attempt + 1`: `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Records fetched per storage round trip during a validation walk.
    pub batch_size: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { batch_size: 500 }
    }
}

impl AuditChainConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `AuditError::Config` if the TOML is malformed, has unknown
    /// keys, or holds out-of-range values.
    pub fn from_toml_str(s: &str) -> AuditResult<Self> {
        let config: AuditChainConfig = toml::from_str(s).map_err(|e| AuditError::Config {
            reason: format!("failed to parse audit chain TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the TOML file at `path`.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AuditError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> AuditResult<()> {
        if self.writer.max_attempts == 0 {
            return Err(AuditError::Config {
                reason: "writer.max_attempts must be at least 1".to_string(),
            });
        }
        if self.writer.base_backoff_ms > self.writer.max_backoff_ms {
            return Err(AuditError::Config {
                reason: format!(
                    "writer.base_backoff_ms ({}) exceeds writer.max_backoff_ms ({})",
                    self.writer.base_backoff_ms, self.writer.max_backoff_ms
                ),
            });
        }
        if self.validator.batch_size == 0 {
            return Err(AuditError::Config {
                reason: "validator.batch_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
