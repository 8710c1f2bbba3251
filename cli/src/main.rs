//! audit-chain: operational tool for the tamper-evident audit chain.
//!
//! Verifies the chain (whole, by date range, by organization, or a single
//! event), registers the genesis record, and inspects stored records.  It
//! never modifies or repairs existing records.
//!
//! Usage:
//!   audit-chain --db audit.db verify
//!   audit-chain --db audit.db verify --from 2026-01-01 --to 2026-01-31
//!   audit-chain --db audit.db verify --event-id CHAIN-INIT
//!   audit-chain --db audit.db genesis
//!   audit-chain --db audit.db list --table orders --page 2
//!   audit-chain --db audit.db stats --org-id org-123

mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use auditchain_contracts::{
    error::{AuditError, AuditResult},
    event::GenesisEvent,
    query::{RecordFilter, RecordQuery, ValidationFilter, DEFAULT_PAGE_SIZE},
    record::AuditAction,
};
use auditchain_ledger::{AuditChainConfig, AuditChainService};
use auditchain_sqlite::SqliteAuditStore;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Verify and inspect a SHA-256 hash-chained audit log.
#[derive(Parser)]
#[command(
    name = "audit-chain",
    about = "Verify and inspect a tamper-evident audit chain",
    long_about = "Verifies the SHA-256 hash chain of an audit log database, registers its\n\
                  genesis record, and lists or summarizes stored audit records."
)]
struct Cli {
    /// SQLite database holding the audit chain.
    #[arg(long, env = "AUDIT_CHAIN_DB", global = true)]
    db: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the chain, a slice of it, or one event.
    Verify {
        #[command(flatten)]
        range: DateRange,

        /// Check a single event instead of walking the chain.
        #[arg(long)]
        event_id: Option<String>,

        /// Only report on records of this organization.
        #[arg(long)]
        org_id: Option<String>,
    },
    /// Create the genesis record if it does not exist yet.
    Genesis {
        #[arg(long, default_value = DEFAULT_GENESIS_EVENT_ID)]
        event_id: String,

        #[arg(long)]
        reason: Option<String>,

        /// JSON payload stored as the genesis record's diff.
        #[arg(long)]
        payload: Option<String>,
    },
    /// Record counts by action and by table.
    Stats {
        #[command(flatten)]
        range: DateRange,

        #[arg(long)]
        org_id: Option<String>,
    },
    /// List records, newest first.
    List {
        #[arg(long)]
        table: Option<String>,

        #[arg(long)]
        record_id: Option<String>,

        /// INSERT, UPDATE or DELETE.
        #[arg(long)]
        action: Option<AuditAction>,

        #[arg(long)]
        operator_id: Option<String>,

        #[arg(long)]
        org_id: Option<String>,

        #[command(flatten)]
        range: DateRange,

        /// Substring of event id, table, record id or operator id.
        #[arg(long)]
        search: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },
}

/// Inclusive `created_at` bounds.  A bare date covers the whole UTC day.
#[derive(Args, Debug, Clone, Default)]
struct DateRange {
    /// Start date (YYYY-MM-DD or RFC 3339).
    #[arg(long, value_parser = parse_from)]
    from: Option<DateTime<Utc>>,

    /// End date, inclusive (YYYY-MM-DD or RFC 3339).
    #[arg(long, value_parser = parse_to)]
    to: Option<DateTime<Utc>>,
}

const DEFAULT_GENESIS_EVENT_ID: &str = "AUDIT-CHAIN-GENESIS";

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("audit-chain: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run one command.  `Ok(false)` means the command ran but the chain (or
/// event) did not check out.
fn run(cli: &Cli) -> AuditResult<bool> {
    let service = open_service(cli)?;

    match &cli.command {
        Command::Verify {
            range,
            event_id: Some(event_id),
            ..
        } => {
            if range.from.is_some() || range.to.is_some() {
                debug!("date range ignored for single-event verification");
            }
            let verification = service.verify_event(event_id)?;
            emit(cli, &verification, || render::verification(event_id, &verification))?;
            Ok(verification.found && verification.hash_matches)
        }
        Command::Verify {
            range,
            event_id: None,
            org_id,
        } => {
            let filter = ValidationFilter {
                from: range.from,
                to: range.to,
                org_id: org_id.clone(),
            };
            let report = service.validate_chain(&filter)?;
            emit(cli, &report, || render::validation(&filter, &report))?;
            Ok(report.is_valid)
        }
        Command::Genesis {
            event_id,
            reason,
            payload,
        } => {
            let mut event = GenesisEvent::system_initialization(genesis_payload(payload.as_deref())?);
            if let Some(reason) = reason {
                event.reason = Some(reason.clone());
            }
            let outcome = service.register_genesis(event_id, event)?;
            let body = json!({ "created": outcome.was_created(), "record": outcome.record() });
            emit(cli, &body, || render::genesis(&outcome))?;
            Ok(true)
        }
        Command::Stats { range, org_id } => {
            let filter = RecordFilter {
                org_id: org_id.clone(),
                from: range.from,
                to: range.to,
                ..RecordFilter::default()
            };
            let stats = service.statistics(&filter)?;
            emit(cli, &stats, || render::statistics(&stats))?;
            Ok(true)
        }
        Command::List {
            table,
            record_id,
            action,
            operator_id,
            org_id,
            range,
            search,
            page,
            page_size,
        } => {
            let query = RecordQuery {
                filter: RecordFilter {
                    table_name: table.clone(),
                    record_id: record_id.clone(),
                    action: *action,
                    operator_id: operator_id.clone(),
                    org_id: org_id.clone(),
                    from: range.from,
                    to: range.to,
                    keyword: search.clone(),
                },
                page: *page,
                page_size: *page_size,
            };
            let listing = service.list(&query)?;
            emit(cli, &listing, || render::listing(&listing))?;
            Ok(true)
        }
    }
}

fn open_service(cli: &Cli) -> AuditResult<AuditChainService> {
    let mut config = match &cli.config {
        Some(path) => AuditChainConfig::from_file(path)?,
        None => AuditChainConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.storage.database_path = Some(db.clone());
    }
    config.validate()?;

    let path = config
        .storage
        .database_path
        .clone()
        .ok_or_else(|| AuditError::Config {
            reason: "no database given; use --db, AUDIT_CHAIN_DB or storage.database_path"
                .to_string(),
        })?;
    let store = SqliteAuditStore::open(&path, Duration::from_millis(config.storage.busy_timeout_ms))?;
    Ok(AuditChainService::new(Arc::new(store), &config))
}

/// Print `value` as JSON with `--json`, otherwise the rendered text.
fn emit<T, F>(cli: &Cli, value: &T, text: F) -> AuditResult<()>
where
    T: serde::Serialize,
    F: FnOnce() -> String,
{
    if cli.json {
        let out = serde_json::to_string_pretty(value).map_err(|e| AuditError::Serialization {
            reason: e.to_string(),
        })?;
        println!("{}", out);
    } else {
        print!("{}", text());
    }
    Ok(())
}

fn genesis_payload(raw: Option<&str>) -> AuditResult<serde_json::Value> {
    match raw {
        Some(raw) => serde_json::from_str(raw).map_err(|e| AuditError::InvalidInput {
            reason: format!("genesis payload is not valid JSON: {}", e),
        }),
        None => Ok(json!({
            "type": "audit_chain_initialization",
            "description": "Audit chain genesis",
        })),
    }
}

// ── Date arguments ────────────────────────────────────────────────────────────

fn parse_from(s: &str) -> Result<DateTime<Utc>, String> {
    let start_of_day =
        NaiveTime::from_hms_opt(0, 0, 0).ok_or_else(|| "invalid start-of-day time".to_string())?;
    parse_bound(s, start_of_day)
}

fn parse_to(s: &str) -> Result<DateTime<Utc>, String> {
    let end_of_day = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
        .ok_or_else(|| "invalid end-of-day time".to_string())?;
    parse_bound(s, end_of_day)
}

fn parse_bound(s: &str, time_of_day: NaiveTime) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(time_of_day).and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| format!("'{}' is neither YYYY-MM-DD nor an RFC 3339 timestamp", s))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
