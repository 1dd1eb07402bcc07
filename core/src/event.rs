//! Audit events. Every mutating operation appends one entry to the
//! `event_log` table inside the same transaction as the mutation it
//! records, so the trail can never disagree with the data.

use serde::{Deserialize, Serialize};

use crate::types::EntityId;

/// Every event emitted by the engine. Variants are added as operations
/// grow — never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    BatchIngested {
        batch_id: EntityId,
        source: String,
        rows_seen: i64,
        rows_imported: i64,
        rows_skipped: i64,
        rows_errored: i64,
    },
    MatchRunCompleted {
        scope: Option<EntityId>,
        exact: i64,
        alternate: i64,
        consultation: i64,
        advisor_backfill: i64,
        broker_mapping: i64,
        splits_computed: i64,
        contracts_advanced: i64,
    },
    CommissionAssigned {
        commission_id: EntityId,
        contract_id: EntityId,
        advisor_id: Option<EntityId>,
        siblings: i64,
    },
    CommissionIgnored {
        commission_id: EntityId,
        ignored: bool,
    },
    SplitsRecomputed {
        scope: String,
        count: i64,
    },
    StatementsGenerated {
        month: String,
        statements: i64,
    },
    StatementTransitioned {
        statement_id: EntityId,
        from: String,
        to: String,
    },
    AdvisorChanged {
        advisor_id: EntityId,
        commission_rate: Option<f64>,
        override_rate: Option<f64>,
    },
    AdvisorDeactivated {
        advisor_id: EntityId,
    },
    MappingChanged {
        broker_key: String,
        /// None when the mapping was deleted.
        advisor_id: Option<EntityId>,
    },
}

/// A persisted event row.
#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub occurred_at: String,
    pub component: String,
    pub event_type: String,
    pub payload: String,
}

/// Stable string name for the `event_type` column.
pub fn event_type_name(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::BatchIngested { .. } => "batch_ingested",
        EngineEvent::MatchRunCompleted { .. } => "match_run_completed",
        EngineEvent::CommissionAssigned { .. } => "commission_assigned",
        EngineEvent::CommissionIgnored { .. } => "commission_ignored",
        EngineEvent::SplitsRecomputed { .. } => "splits_recomputed",
        EngineEvent::StatementsGenerated { .. } => "statements_generated",
        EngineEvent::StatementTransitioned { .. } => "statement_transitioned",
        EngineEvent::AdvisorChanged { .. } => "advisor_changed",
        EngineEvent::AdvisorDeactivated { .. } => "advisor_deactivated",
        EngineEvent::MappingChanged { .. } => "mapping_changed",
    }
}
