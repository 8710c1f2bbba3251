//! `SqliteAuditStore`: the durable `AuditStore`.
//!
//! One connection per store, guarded by a mutex.  Appends run inside an
//! `IMMEDIATE` transaction, which takes SQLite's write lock before the tail is
//! read, so the tail check and the insert are atomic across every process
//! sharing the database file.  `UNIQUE(previous_hash)` backs this up: no two
//! records can ever link to the same predecessor.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{
    params, params_from_iter,
    types::{Type, Value as SqlValue},
    Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior,
};
use serde_json::Value;
use tracing::{debug, info};

use auditchain_contracts::{
    error::{AuditError, AuditResult},
    query::{ActionCount, ChainStatistics, RecordFilter, RecordPage, RecordQuery, TableCount},
    record::{AuditAction, AuditRecord, ChainTail, PendingRecord, GENESIS},
};
use auditchain_core::{
    canonical::{format_timestamp, truncate_to_millis},
    traits::AuditStore,
};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS audit_log (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id      TEXT    NOT NULL,
    org_id        TEXT,
    table_name    TEXT    NOT NULL,
    record_id     TEXT    NOT NULL,
    action        TEXT    NOT NULL,
    diff_before   TEXT,
    diff_after    TEXT,
    operator_id   TEXT,
    operator_type TEXT,
    operator_name TEXT,
    ip_address    TEXT,
    user_agent    TEXT,
    reason        TEXT,
    previous_hash TEXT    NOT NULL UNIQUE,
    sha256_hash   TEXT    NOT NULL,
    created_at    TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_log_event_id   ON audit_log (event_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_org_id     ON audit_log (org_id);
CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log (created_at);
CREATE INDEX IF NOT EXISTS idx_audit_log_row        ON audit_log (table_name, record_id);
";

const COLUMNS: &str = "id, event_id, org_id, table_name, record_id, action, diff_before, \
    diff_after, operator_id, operator_type, operator_name, ip_address, user_agent, reason, \
    previous_hash, sha256_hash, created_at";

/// Audit chain storage in a SQLite database.
///
/// Cloning shares the connection.
#[derive(Clone)]
pub struct SqliteAuditStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteAuditStore {
    /// Open (or create) the database at `path`.
    ///
    /// WAL journaling is enabled so validation can read while writers append.
    /// A writer blocked by another process waits up to `busy_timeout` for the
    /// write lock before failing with `AuditError::Storage`.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> AuditResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(storage)?;
        conn.busy_timeout(busy_timeout).map_err(storage)?;
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(storage)?;
        initialize(&conn)?;

        info!(path = %path.display(), journal_mode = %journal_mode, "audit database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// A private, non-persistent database.
    pub fn in_memory() -> AuditResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// The database file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> AuditResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| AuditError::Storage {
            reason: format!("audit database lock poisoned: {}", e),
        })
    }
}

fn initialize(conn: &Connection) -> AuditResult<()> {
    conn.execute_batch(SCHEMA_SQL).map_err(storage)
}

impl AuditStore for SqliteAuditStore {
    fn tail(&self) -> AuditResult<Option<ChainTail>> {
        let conn = self.lock()?;
        read_tail(&conn).map_err(storage)
    }

    fn append(&self, record: PendingRecord) -> AuditResult<AuditRecord> {
        let diff_before = encode_json(record.diff_before.as_ref())?;
        let diff_after = encode_json(record.diff_after.as_ref())?;
        let created_at = format_timestamp(&record.created_at);

        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage)?;

        let actual = tail_hash(&tx).map_err(storage)?;
        if actual != record.previous_hash {
            return Err(AuditError::TailConflict {
                observed: record.previous_hash,
                actual,
            });
        }

        let inserted = tx.execute(
            "INSERT INTO audit_log (event_id, org_id, table_name, record_id, action, diff_before, \
             diff_after, operator_id, operator_type, operator_name, ip_address, user_agent, reason, \
             previous_hash, sha256_hash, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                record.event_id,
                record.org_id,
                record.table_name,
                record.record_id,
                record.action.as_str(),
                diff_before,
                diff_after,
                record.operator_id,
                record.operator_type.map(|t| t.as_str()),
                record.operator_name,
                record.ip_address,
                record.user_agent,
                record.reason,
                record.previous_hash,
                record.sha256_hash,
                created_at,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                let actual = tail_hash(&tx).map_err(storage)?;
                return Err(AuditError::TailConflict {
                    observed: record.previous_hash,
                    actual,
                });
            }
            Err(e) => return Err(storage(e)),
        }

        let id = tx.last_insert_rowid() as u64;
        tx.commit().map_err(storage)?;

        debug!(id, event_id = %record.event_id, "record appended to sqlite store");
        Ok(record.into_record(id))
    }

    fn scan(&self, after_id: u64, up_to_id: u64, limit: usize) -> AuditResult<Vec<AuditRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {COLUMNS} FROM audit_log WHERE id > ?1 AND id <= ?2 ORDER BY id ASC LIMIT ?3"
            ))
            .map_err(storage)?;
        let records = stmt
            .query_map(
                params![sql_id(after_id), sql_id(up_to_id), sql_count(limit)],
                row_to_record,
            )
            .map_err(storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;
        Ok(records)
    }

    fn predecessor(&self, id: u64) -> AuditResult<Option<ChainTail>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, sha256_hash FROM audit_log WHERE id < ?1 ORDER BY id DESC LIMIT 1",
            params![sql_id(id)],
            row_to_tail,
        )
        .optional()
        .map_err(storage)
    }

    fn id_span(&self, filter: &RecordFilter, up_to_id: u64) -> AuditResult<Option<(u64, u64)>> {
        let mut clause = SqlFilter::from_filter(filter);
        clause.push("id <= ?", sql_id(up_to_id));

        let conn = self.lock()?;
        let (first, last): (Option<i64>, Option<i64>) = conn
            .query_row(
                &format!("SELECT MIN(id), MAX(id) FROM audit_log WHERE {}", clause.sql()),
                params_from_iter(clause.params.iter()),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(storage)?;
        Ok(first.zip(last).map(|(f, l)| (f as u64, l as u64)))
    }

    fn get(&self, id: u64) -> AuditResult<Option<AuditRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM audit_log WHERE id = ?1"),
            params![sql_id(id)],
            row_to_record,
        )
        .optional()
        .map_err(storage)
    }

    fn find_by_event_id(&self, event_id: &str) -> AuditResult<Option<AuditRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM audit_log WHERE event_id = ?1 ORDER BY id ASC LIMIT 1"),
            params![event_id],
            row_to_record,
        )
        .optional()
        .map_err(storage)
    }

    fn query(&self, query: &RecordQuery) -> AuditResult<RecordPage> {
        query.validate()?;
        let clause = SqlFilter::from_filter(&query.filter);
        let where_sql = clause.sql();

        let conn = self.lock()?;
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM audit_log WHERE {where_sql}"),
                params_from_iter(clause.params.iter()),
                |row| row.get(0),
            )
            .map_err(storage)?;

        let mut page_params = clause.params.clone();
        page_params.push(SqlValue::Integer(i64::from(query.page_size)));
        page_params.push(SqlValue::Integer(sql_id(query.offset())));

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM audit_log WHERE {where_sql} ORDER BY id DESC LIMIT ? OFFSET ?"
            ))
            .map_err(storage)?;
        let records = stmt
            .query_map(params_from_iter(page_params.iter()), row_to_record)
            .map_err(storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;

        Ok(RecordPage::new(records, query, total as u64))
    }

    fn statistics(&self, filter: &RecordFilter) -> AuditResult<ChainStatistics> {
        let clause = SqlFilter::from_filter(filter);
        let where_sql = clause.sql();
        let conn = self.lock()?;

        let mut by_action = Vec::new();
        {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT action, COUNT(*) FROM audit_log WHERE {where_sql} GROUP BY action"
                ))
                .map_err(storage)?;
            let rows = stmt
                .query_map(params_from_iter(clause.params.iter()), |row| {
                    let action: String = row.get(0)?;
                    Ok(ActionCount {
                        action: parse_text::<AuditAction>(0, &action)?,
                        count: row.get::<_, i64>(1)? as u64,
                    })
                })
                .map_err(storage)?;
            for row in rows {
                by_action.push(row.map_err(storage)?);
            }
        }
        by_action.sort_by_key(|a| a.action);

        let mut stmt = conn
            .prepare(&format!(
                "SELECT table_name, COUNT(*) FROM audit_log WHERE {where_sql} \
                 GROUP BY table_name ORDER BY table_name"
            ))
            .map_err(storage)?;
        let by_table = stmt
            .query_map(params_from_iter(clause.params.iter()), |row| {
                Ok(TableCount {
                    table_name: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })
            .map_err(storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;

        Ok(ChainStatistics {
            total: by_action.iter().map(|a| a.count).sum(),
            by_action,
            by_table,
        })
    }
}

// ── Filters ───────────────────────────────────────────────────────────────────

/// A `RecordFilter` rendered as a SQL `WHERE` body with positional params.
///
/// Must select exactly the records `RecordFilter::matches` accepts.
#[derive(Debug, Default)]
struct SqlFilter {
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl SqlFilter {
    fn from_filter(filter: &RecordFilter) -> Self {
        let mut out = Self::default();
        if let Some(table) = &filter.table_name {
            out.push("table_name = ?", table.clone());
        }
        if let Some(record_id) = &filter.record_id {
            out.push("record_id = ?", record_id.clone());
        }
        if let Some(action) = filter.action {
            out.push("action = ?", action.as_str().to_string());
        }
        if let Some(operator_id) = &filter.operator_id {
            out.push("operator_id = ?", operator_id.clone());
        }
        if let Some(org_id) = &filter.org_id {
            out.push("org_id = ?", org_id.clone());
        }
        // Stored times are whole milliseconds; round the bounds to match.
        if let Some(from) = filter.from {
            let mut bound = truncate_to_millis(from);
            if bound < from {
                bound += chrono::Duration::milliseconds(1);
            }
            out.push("created_at >= ?", format_timestamp(&bound));
        }
        if let Some(to) = filter.to {
            out.push("created_at <= ?", format_timestamp(&truncate_to_millis(to)));
        }
        if let Some(keyword) = &filter.keyword {
            out.clauses.push(
                "(instr(event_id, ?) > 0 OR instr(table_name, ?) > 0 \
                 OR instr(record_id, ?) > 0 OR instr(operator_id, ?) > 0)"
                    .to_string(),
            );
            for _ in 0..4 {
                out.params.push(SqlValue::Text(keyword.clone()));
            }
        }
        out
    }

    fn push(&mut self, clause: &str, value: impl Into<SqlValue>) {
        self.clauses.push(clause.to_string());
        self.params.push(value.into());
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }
}

// ── Row mapping ───────────────────────────────────────────────────────────────

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    let action: String = row.get(5)?;
    let operator_type: Option<String> = row.get(9)?;
    let created_at: String = row.get(16)?;

    Ok(AuditRecord {
        id: row.get::<_, i64>(0)? as u64,
        event_id: row.get(1)?,
        org_id: row.get(2)?,
        table_name: row.get(3)?,
        record_id: row.get(4)?,
        action: parse_text(5, &action)?,
        diff_before: json_column(row, 6)?,
        diff_after: json_column(row, 7)?,
        operator_id: row.get(8)?,
        operator_type: operator_type.map(|t| parse_text(9, &t)).transpose()?,
        operator_name: row.get(10)?,
        ip_address: row.get(11)?,
        user_agent: row.get(12)?,
        reason: row.get(13)?,
        previous_hash: row.get(14)?,
        sha256_hash: row.get(15)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_failure(16, e))?,
    })
}

fn row_to_tail(row: &Row<'_>) -> rusqlite::Result<ChainTail> {
    Ok(ChainTail {
        id: row.get::<_, i64>(0)? as u64,
        sha256_hash: row.get(1)?,
    })
}

fn read_tail(conn: &Connection) -> rusqlite::Result<Option<ChainTail>> {
    conn.query_row(
        "SELECT id, sha256_hash FROM audit_log ORDER BY id DESC LIMIT 1",
        [],
        row_to_tail,
    )
    .optional()
}

/// The hash a new record must link to.
fn tail_hash(conn: &Connection) -> rusqlite::Result<String> {
    Ok(read_tail(conn)?.map_or_else(|| GENESIS.to_string(), |t| t.sha256_hash))
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    row.get::<_, Option<String>>(idx)?
        .map(|text| serde_json::from_str(&text).map_err(|e| conversion_failure(idx, e)))
        .transpose()
}

fn parse_text<T>(idx: usize, text: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = AuditError>,
{
    text.parse().map_err(|e| conversion_failure(idx, e))
}

fn conversion_failure(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn encode_json(value: Option<&Value>) -> AuditResult<Option<String>> {
    value
        .map(|v| {
            serde_json::to_string(v).map_err(|e| AuditError::Serialization {
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

fn storage(e: rusqlite::Error) -> AuditError {
    AuditError::Storage {
        reason: e.to_string(),
    }
}

fn sql_id(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
