//! Settlement aggregator — monthly per-advisor statements with a gated
//! status workflow.
//!
//! Design:
//!   - Status is an explicit transition table checked before any write,
//!     not a boolean lock with ad hoc exceptions. The lock flag set on
//!     `approved` blocks every change except the one legal escape,
//!     `approved -> paid`.
//!   - `generate(month)` skips advisors with zero activity and never
//!     overwrites anything beyond a `computed` draft: later lifecycle
//!     stages get a fresh revision instead.

use std::collections::BTreeMap;

use chrono::{Months, NaiveDate};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::event::EngineEvent;
use crate::store::{now_iso, EngineStore, StatementRow};
use crate::types::{Cents, SettlementStatus};

/// The complete set of legal transitions. Everything absent is illegal.
const TRANSITIONS: &[(SettlementStatus, SettlementStatus)] = &[
    (SettlementStatus::Computed, SettlementStatus::Reviewed),
    (SettlementStatus::Reviewed, SettlementStatus::Approved),
    (SettlementStatus::Reviewed, SettlementStatus::Computed),
    (SettlementStatus::Approved, SettlementStatus::Paid),
];

pub fn transition_allowed(from: SettlementStatus, to: SettlementStatus) -> bool {
    TRANSITIONS.contains(&(from, to))
}

pub struct Settler<'a> {
    store: &'a EngineStore,
}

#[derive(Debug, Default, Clone, Copy)]
struct MonthlyFigures {
    gross_cents: Cents,
    team_lead_cut_cents: Cents,
    chargeback_cents: Cents,
    override_cents: Cents,
    commission_count: i64,
}

impl MonthlyFigures {
    fn is_zero(&self) -> bool {
        self.gross_cents == 0 && self.chargeback_cents == 0 && self.override_cents == 0
    }
}

impl<'a> Settler<'a> {
    pub fn new(store: &'a EngineStore) -> Self {
        Self { store }
    }

    /// Generate statements for one month (`YYYY-MM`). Returns the rows
    /// created in this run. One transaction for the whole month.
    pub fn generate(&self, month: &str) -> EngineResult<Vec<StatementRow>> {
        let (from, to) = month_bounds(month)?;

        let tx = self.store.begin()?;
        let ts = now_iso();

        let mut figures: BTreeMap<String, MonthlyFigures> = BTreeMap::new();
        for row in self.store.settlement_activity(&from, &to)? {
            figures.insert(
                row.advisor_id.clone(),
                MonthlyFigures {
                    gross_cents: row.gross_cents,
                    team_lead_cut_cents: row.team_lead_cut_cents,
                    chargeback_cents: row.chargeback_cents,
                    override_cents: 0,
                    commission_count: row.commission_count,
                },
            );
        }
        // A team lead with only override income still has activity.
        for (team_lead_id, override_cents) in self.store.override_income(&from, &to)? {
            figures.entry(team_lead_id).or_default().override_cents = override_cents;
        }

        let mut created = Vec::new();
        for (advisor_id, f) in figures {
            if f.is_zero() {
                continue;
            }
            let Some(advisor) = self.store.advisor(&advisor_id)? else {
                continue;
            };
            if !advisor.active {
                continue;
            }

            let revision = match self.store.latest_statement(month, &advisor_id)? {
                None => 1,
                Some(prev) if prev.status == SettlementStatus::Computed.as_str() => {
                    // A computed statement is a draft; regeneration replaces it.
                    self.store.delete_statement(&prev.statement_id)?;
                    prev.revision
                }
                Some(prev) => prev.revision + 1,
            };

            let net_cents = f.gross_cents - f.team_lead_cut_cents;
            let statement = StatementRow {
                statement_id: Uuid::new_v4().to_string(),
                month: month.to_string(),
                advisor_id: advisor_id.clone(),
                revision,
                gross_cents: f.gross_cents,
                team_lead_cut_cents: f.team_lead_cut_cents,
                net_cents,
                chargeback_cents: f.chargeback_cents,
                override_cents: f.override_cents,
                payout_cents: net_cents + f.chargeback_cents + f.override_cents,
                commission_count: f.commission_count,
                status: SettlementStatus::Computed.as_str().to_string(),
                locked: false,
                created_at: ts.clone(),
                updated_at: ts.clone(),
            };
            self.store.insert_statement(&statement)?;
            created.push(statement);
        }

        self.store.append_event(
            "settlement",
            &EngineEvent::StatementsGenerated {
                month: month.to_string(),
                statements: created.len() as i64,
            },
        )?;
        tx.commit()?;

        log::info!("generated {} statements for {month}", created.len());
        Ok(created)
    }

    /// Apply one status transition, checked against the transition table.
    pub fn transition(
        &self,
        statement_id: &str,
        to: SettlementStatus,
    ) -> EngineResult<StatementRow> {
        let tx = self.store.begin()?;
        let statement = self.store.statement_required(statement_id)?;
        let from = SettlementStatus::parse(&statement.status)?;

        // The approval lock blocks everything except its own escape.
        if statement.locked
            && !(from == SettlementStatus::Approved && to == SettlementStatus::Paid)
        {
            return Err(EngineError::conflict(format!(
                "statement {statement_id} is locked in '{}'",
                statement.status
            )));
        }
        if !transition_allowed(from, to) {
            return Err(EngineError::conflict(format!(
                "illegal settlement transition '{}' -> '{}'",
                from.as_str(),
                to.as_str()
            )));
        }

        let locked = matches!(to, SettlementStatus::Approved | SettlementStatus::Paid);
        self.store
            .update_statement_status(statement_id, to.as_str(), locked, &now_iso())?;
        self.store.append_event(
            "settlement",
            &EngineEvent::StatementTransitioned {
                statement_id: statement_id.to_string(),
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            },
        )?;
        tx.commit()?;

        self.store.statement_required(statement_id)
    }
}

/// Half-open ISO date range [first of month, first of next month).
fn month_bounds(month: &str) -> EngineResult<(String, String)> {
    let first = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
        .map_err(|_| EngineError::validation(format!("month must be YYYY-MM, got '{month}'")))?;
    if month.len() != 7 {
        return Err(EngineError::validation(format!(
            "month must be YYYY-MM, got '{month}'"
        )));
    }
    let next = first
        .checked_add_months(Months::new(1))
        .ok_or_else(|| EngineError::validation(format!("month '{month}' out of range")))?;
    Ok((
        first.format("%Y-%m-%d").to_string(),
        next.format("%Y-%m-%d").to_string(),
    ))
}
