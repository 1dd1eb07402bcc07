//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Subsystems call store methods — they never execute SQL directly.
//!
//! Multi-step operations open an explicit transaction with [`EngineStore::begin`];
//! store methods called while it is open join it, and dropping it without
//! commit rolls everything back.

mod advisor;
mod batch;
mod commission;
mod contract;
mod settlement;

use rusqlite::{params, Connection};

use crate::error::EngineResult;
use crate::event::{event_type_name, EngineEvent, EventLogEntry};
use crate::types::Cents;

pub struct EngineStore {
    conn: Connection,
}

impl EngineStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_settlement.sql"))?;
        Ok(())
    }

    /// Begin a transaction on the shared connection. Store methods invoked
    /// while it is open run inside it; drop without commit = rollback.
    pub fn begin(&self) -> EngineResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, component: &str, event: &EngineEvent) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (occurred_at, component, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                now_iso(),
                component,
                event_type_name(event),
                serde_json::to_string(event)?,
            ],
        )?;
        Ok(())
    }

    pub fn events_by_type(&self, event_type: &str) -> EngineResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, occurred_at, component, event_type, payload
             FROM event_log WHERE event_type = ?1 ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![event_type], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    occurred_at: row.get(1)?,
                    component: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> EngineResult<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Current wall-clock time for audit columns, RFC 3339.
pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

// ─────────────────────────────────────────────────────────────────
// Row structs
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AdvisorRow {
    pub advisor_id: String,
    pub name: String,
    pub role: String,
    pub commission_rate: Option<f64>,
    pub team_lead_id: Option<String>,
    pub override_rate: Option<f64>,
    pub override_basis: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct BatchRow {
    pub batch_id: String,
    pub source: String,
    pub fingerprint: String,
    pub label: Option<String>,
    pub rows_seen: i64,
    pub rows_imported: i64,
    pub rows_skipped: i64,
    pub rows_errored: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ContractRow {
    pub contract_id: String,
    pub policy_number: String,
    pub policy_key: String,
    pub alt_policy_key: Option<String>,
    pub account_holder: Option<String>,
    pub holder_key: Option<String>,
    pub insurer: Option<String>,
    pub product: Option<String>,
    pub advisor_id: Option<String>,
    pub status: String,
    pub source: String,
    pub begin_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ConsultationRow {
    pub consultation_id: String,
    pub batch_id: String,
    pub policy_number: String,
    pub policy_key: String,
    pub account_holder: Option<String>,
    pub holder_key: Option<String>,
    pub advisor_name: Option<String>,
    pub advisor_id: Option<String>,
    pub insurer: Option<String>,
    pub product: Option<String>,
    pub consulted_on: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct CommissionRow {
    pub commission_id: String,
    pub batch_id: String,
    pub policy_number: String,
    pub policy_key: String,
    pub account_holder: Option<String>,
    pub holder_key: Option<String>,
    pub broker_name: Option<String>,
    pub broker_key: Option<String>,
    pub amount_cents: Cents,
    pub kind: String,
    pub paid_on: String,
    pub installment_no: Option<i64>,
    pub installment_count: Option<i64>,
    pub row_fingerprint: String,
    pub match_status: String,
    pub match_confidence: Option<f64>,
    pub contract_id: Option<String>,
    pub advisor_id: Option<String>,
    pub advisor_share_cents: Option<Cents>,
    pub team_lead_share_cents: Option<Cents>,
    pub agency_share_cents: Option<Cents>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct MappingRow {
    pub mapping_id: String,
    pub broker_name: String,
    pub broker_key: String,
    pub advisor_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct StatementRow {
    pub statement_id: String,
    pub month: String,
    pub advisor_id: String,
    pub revision: i64,
    pub gross_cents: Cents,
    pub team_lead_cut_cents: Cents,
    pub net_cents: Cents,
    pub chargeback_cents: Cents,
    pub override_cents: Cents,
    pub payout_cents: Cents,
    pub commission_count: i64,
    pub status: String,
    pub locked: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One commission awaiting (re)computation of its shares.
#[derive(Debug, Clone)]
pub struct SplitWork {
    pub commission_id: String,
    pub amount_cents: Cents,
    pub advisor_id: String,
}

/// Per-advisor settlement aggregation for one month.
#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub advisor_id: String,
    pub gross_cents: Cents,
    pub team_lead_cut_cents: Cents,
    pub chargeback_cents: Cents,
    pub commission_count: i64,
}

/// Per-advisor dashboard totals for a period.
#[derive(Debug, Clone)]
pub struct AdvisorPeriodTotals {
    pub advisor_id: String,
    pub name: String,
    pub gross_cents: Cents,
    pub net_cents: Cents,
    pub chargeback_cents: Cents,
    pub commission_count: i64,
}

/// Counts of unresolved commissions by clearance category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearanceCounts {
    pub no_contract: i64,
    pub unknown_broker: i64,
    pub no_rate_model: i64,
    pub no_split: i64,
}
