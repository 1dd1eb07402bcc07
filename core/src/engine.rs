//! The engine facade — wires the store and configuration together and
//! exposes the administrative trigger surface: ingest, automatic matching,
//! manual assignment, suggestions, settlement generation and transitions,
//! plus the read-side views.
//!
//! RULES:
//!   - Subsystems never talk to each other directly; they share state only
//!     through the store.
//!   - Every mutating operation runs in one or more explicit transactions
//!     and records an audit event inside the transaction it belongs to.

use crate::admin_subsystem::{Admin, AdvisorInput};
use crate::clearance_subsystem::{AdvisorDetail, Clearance, DashboardSummary};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::import_subsystem::{ImportRows, Importer};
use crate::matching_subsystem::{
    AssignOutcome, Matcher, MatchRunSummary, SuggestDirection, Suggestion,
};
use crate::settlement_subsystem::Settler;
use crate::store::{
    AdvisorRow, BatchRow, ClearanceCounts, EngineStore, MappingRow, StatementRow,
};
use crate::types::SettlementStatus;

pub struct CommissionEngine {
    pub store: EngineStore,
    config: EngineConfig,
}

impl CommissionEngine {
    /// Open (creating if necessary) a database file and apply migrations.
    pub fn open(path: &str, config: EngineConfig) -> EngineResult<Self> {
        let store = EngineStore::open(path)?;
        store.migrate()?;
        Ok(Self { store, config })
    }

    /// In-memory engine (used in tests and dry runs).
    pub fn in_memory(config: EngineConfig) -> EngineResult<Self> {
        let store = EngineStore::in_memory()?;
        store.migrate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Import ─────────────────────────────────────────────────

    pub fn ingest(
        &self,
        rows: ImportRows,
        fingerprint: &str,
        label: Option<&str>,
        forced: bool,
    ) -> EngineResult<BatchRow> {
        Importer::new(&self.store).ingest(rows, fingerprint, label, forced)
    }

    // ── Matching ───────────────────────────────────────────────

    pub fn auto_match(&self, scope: Option<&str>) -> EngineResult<MatchRunSummary> {
        Matcher::new(&self.store, &self.config).auto_match(scope)
    }

    pub fn assign(
        &self,
        commission_id: &str,
        contract_id: &str,
        advisor_id: Option<&str>,
    ) -> EngineResult<AssignOutcome> {
        Matcher::new(&self.store, &self.config).assign(commission_id, contract_id, advisor_id)
    }

    pub fn suggest(
        &self,
        id: &str,
        direction: SuggestDirection,
    ) -> EngineResult<Vec<Suggestion>> {
        Matcher::new(&self.store, &self.config).suggest(id, direction)
    }

    pub fn set_ignored(&self, commission_id: &str, ignored: bool) -> EngineResult<bool> {
        Matcher::new(&self.store, &self.config).set_ignored(commission_id, ignored)
    }

    pub fn recompute_for_advisor(&self, advisor_id: &str) -> EngineResult<i64> {
        Matcher::new(&self.store, &self.config).recompute_for_advisor(advisor_id)
    }

    pub fn recompute_for_contract(&self, contract_id: &str) -> EngineResult<i64> {
        Matcher::new(&self.store, &self.config).recompute_for_contract(contract_id)
    }

    // ── Settlement ─────────────────────────────────────────────

    pub fn generate(&self, month: &str) -> EngineResult<Vec<StatementRow>> {
        Settler::new(&self.store).generate(month)
    }

    pub fn transition_statement(
        &self,
        statement_id: &str,
        to: SettlementStatus,
    ) -> EngineResult<StatementRow> {
        Settler::new(&self.store).transition(statement_id, to)
    }

    pub fn statements_for_month(&self, month: &str) -> EngineResult<Vec<StatementRow>> {
        self.store.statements_for_month(month)
    }

    // ── Administration ─────────────────────────────────────────

    pub fn create_advisor(&self, input: &AdvisorInput) -> EngineResult<AdvisorRow> {
        Admin::new(&self.store, &self.config).create_advisor(input)
    }

    pub fn update_advisor(
        &self,
        advisor_id: &str,
        input: &AdvisorInput,
    ) -> EngineResult<AdvisorRow> {
        Admin::new(&self.store, &self.config).update_advisor(advisor_id, input)
    }

    pub fn deactivate_advisor(&self, advisor_id: &str) -> EngineResult<()> {
        Admin::new(&self.store, &self.config).deactivate_advisor(advisor_id)
    }

    pub fn upsert_mapping(&self, broker_name: &str, advisor_id: &str) -> EngineResult<MappingRow> {
        Admin::new(&self.store, &self.config).upsert_mapping(broker_name, advisor_id)
    }

    pub fn delete_mapping(&self, broker_name: &str) -> EngineResult<bool> {
        Admin::new(&self.store, &self.config).delete_mapping(broker_name)
    }

    // ── Read side ──────────────────────────────────────────────

    pub fn clearance_counts(&self) -> EngineResult<ClearanceCounts> {
        Clearance::new(&self.store, &self.config).counts()
    }

    pub fn dashboard(&self, from: &str, to: &str) -> EngineResult<DashboardSummary> {
        Clearance::new(&self.store, &self.config).dashboard(from, to)
    }

    pub fn advisor_detail(&self, advisor_id: &str) -> EngineResult<AdvisorDetail> {
        Clearance::new(&self.store, &self.config).advisor_detail(advisor_id)
    }
}
