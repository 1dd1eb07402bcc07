//! Clearance and reporting reads. Strictly read-only: counts of
//! unresolved commissions by category, the period dashboard and the
//! per-advisor detail view. The category counts come from one aggregated
//! query — never one table scan per category.

use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::{
    AdvisorPeriodTotals, AdvisorRow, ClearanceCounts, CommissionRow, EngineStore,
};

/// Aggregated totals for a period, per advisor, plus the clearance queue.
#[derive(Debug, Clone)]
pub struct DashboardSummary {
    pub from: String,
    pub to: String,
    pub advisors: Vec<AdvisorPeriodTotals>,
    pub gross_cents: i64,
    pub net_cents: i64,
    pub chargeback_cents: i64,
    pub clearance: ClearanceCounts,
}

/// An advisor plus their most recent resolved commissions.
#[derive(Debug, Clone)]
pub struct AdvisorDetail {
    pub advisor: AdvisorRow,
    pub recent: Vec<CommissionRow>,
}

pub struct Clearance<'a> {
    store: &'a EngineStore,
    config: &'a EngineConfig,
}

impl<'a> Clearance<'a> {
    pub fn new(store: &'a EngineStore, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Unresolved commissions by clearance category, one pass.
    pub fn counts(&self) -> EngineResult<ClearanceCounts> {
        self.store.clearance_counts()
    }

    /// Dashboard for a half-open ISO date range [from, to).
    pub fn dashboard(&self, from: &str, to: &str) -> EngineResult<DashboardSummary> {
        check_date(from)?;
        check_date(to)?;
        let advisors = self.store.dashboard_totals(from, to)?;
        let gross_cents = advisors.iter().map(|a| a.gross_cents).sum();
        let net_cents = advisors.iter().map(|a| a.net_cents).sum();
        let chargeback_cents = advisors.iter().map(|a| a.chargeback_cents).sum();
        Ok(DashboardSummary {
            from: from.to_string(),
            to: to.to_string(),
            advisors,
            gross_cents,
            net_cents,
            chargeback_cents,
            clearance: self.store.clearance_counts()?,
        })
    }

    pub fn advisor_detail(&self, advisor_id: &str) -> EngineResult<AdvisorDetail> {
        let advisor = self.store.advisor_required(advisor_id)?;
        let recent = self
            .store
            .recent_commissions_for_advisor(advisor_id, self.config.recent_commission_limit)?;
        Ok(AdvisorDetail { advisor, recent })
    }
}

fn check_date(value: &str) -> EngineResult<()> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| EngineError::validation(format!("date must be YYYY-MM-DD, got '{value}'")))?;
    Ok(())
}
