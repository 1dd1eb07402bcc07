//! Administrative surface: advisor and broker-mapping CRUD.
//!
//! Every mutating action validates before touching anything — out-of-range
//! rates, circular team-lead chains and dangling references are rejected,
//! never clamped. Rate and override changes trigger an explicitly scoped
//! share recomputation in a follow-up transaction of their own.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::EngineEvent;
use crate::matching_subsystem::Matcher;
use crate::normalize::normalize_broker_name;
use crate::store::{now_iso, AdvisorRow, EngineStore, MappingRow};
use crate::types::{role, OverrideBasis};

/// Fields accepted when creating or updating an advisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorInput {
    pub name: String,
    pub role: String,
    pub commission_rate: Option<f64>,
    pub team_lead_id: Option<String>,
    pub override_rate: Option<f64>,
    pub override_basis: Option<String>,
}

pub struct Admin<'a> {
    store: &'a EngineStore,
    config: &'a EngineConfig,
}

impl<'a> Admin<'a> {
    pub fn new(store: &'a EngineStore, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    // ── Advisor CRUD ───────────────────────────────────────────

    pub fn create_advisor(&self, input: &AdvisorInput) -> EngineResult<AdvisorRow> {
        self.validate_advisor(input, None)?;

        let ts = now_iso();
        let row = AdvisorRow {
            advisor_id: Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            role: input.role.clone(),
            commission_rate: input.commission_rate,
            team_lead_id: input.team_lead_id.clone(),
            override_rate: input.override_rate,
            override_basis: input.override_basis.clone(),
            active: true,
            created_at: ts.clone(),
            updated_at: ts,
        };

        let tx = self.store.begin()?;
        self.store.insert_advisor(&row)?;
        self.store.append_event(
            "admin",
            &EngineEvent::AdvisorChanged {
                advisor_id: row.advisor_id.clone(),
                commission_rate: row.commission_rate,
                override_rate: row.override_rate,
            },
        )?;
        tx.commit()?;
        Ok(row)
    }

    /// Update an advisor. When the commission rate or the override
    /// configuration changed, the affected shares are recomputed in a
    /// separate, explicitly scoped transaction after the update commits.
    pub fn update_advisor(&self, advisor_id: &str, input: &AdvisorInput) -> EngineResult<AdvisorRow> {
        let existing = self.store.advisor_required(advisor_id)?;
        self.validate_advisor(input, Some(advisor_id))?;

        let updated = AdvisorRow {
            advisor_id: existing.advisor_id.clone(),
            name: input.name.trim().to_string(),
            role: input.role.clone(),
            commission_rate: input.commission_rate,
            team_lead_id: input.team_lead_id.clone(),
            override_rate: input.override_rate,
            override_basis: input.override_basis.clone(),
            active: existing.active,
            created_at: existing.created_at.clone(),
            updated_at: now_iso(),
        };

        let tx = self.store.begin()?;
        self.store.update_advisor(&updated)?;
        self.store.append_event(
            "admin",
            &EngineEvent::AdvisorChanged {
                advisor_id: updated.advisor_id.clone(),
                commission_rate: updated.commission_rate,
                override_rate: updated.override_rate,
            },
        )?;
        tx.commit()?;

        let matcher = Matcher::new(self.store, self.config);
        let rate_changed = existing.commission_rate != input.commission_rate
            || existing.team_lead_id != input.team_lead_id;
        let override_changed = existing.override_rate != input.override_rate
            || existing.override_basis != input.override_basis;
        if rate_changed {
            matcher.recompute_for_advisor(advisor_id)?;
        }
        if override_changed {
            matcher.recompute_for_team_lead(advisor_id)?;
        }

        self.store.advisor_required(advisor_id)
    }

    /// Advisors are never hard-deleted; deactivation preserves historical
    /// attribution while excluding them from future settlements.
    pub fn deactivate_advisor(&self, advisor_id: &str) -> EngineResult<()> {
        self.store.advisor_required(advisor_id)?;
        let tx = self.store.begin()?;
        self.store.set_advisor_active(advisor_id, false)?;
        self.store.append_event(
            "admin",
            &EngineEvent::AdvisorDeactivated {
                advisor_id: advisor_id.to_string(),
            },
        )?;
        tx.commit()?;
        Ok(())
    }

    // ── Broker mapping CRUD ────────────────────────────────────

    pub fn upsert_mapping(&self, broker_name: &str, advisor_id: &str) -> EngineResult<MappingRow> {
        self.store.advisor_required(advisor_id)?;
        let broker_key = normalize_broker_name(broker_name);
        if broker_key.is_empty() {
            return Err(EngineError::validation(format!(
                "broker name '{broker_name}' normalizes to an empty key"
            )));
        }

        let row = MappingRow {
            mapping_id: Uuid::new_v4().to_string(),
            broker_name: broker_name.trim().to_string(),
            broker_key: broker_key.clone(),
            advisor_id: advisor_id.to_string(),
            created_at: now_iso(),
        };

        let tx = self.store.begin()?;
        self.store.upsert_mapping(&row)?;
        self.store.append_event(
            "admin",
            &EngineEvent::MappingChanged {
                broker_key,
                advisor_id: Some(advisor_id.to_string()),
            },
        )?;
        tx.commit()?;
        Ok(row)
    }

    /// Deleting a mapping does not retroactively un-assign commissions it
    /// already resolved. Returns false when no such mapping existed.
    pub fn delete_mapping(&self, broker_name: &str) -> EngineResult<bool> {
        let broker_key = normalize_broker_name(broker_name);
        let tx = self.store.begin()?;
        let deleted = self.store.delete_mapping(&broker_key)?;
        if deleted {
            self.store.append_event(
                "admin",
                &EngineEvent::MappingChanged {
                    broker_key,
                    advisor_id: None,
                },
            )?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    // ── Validation ─────────────────────────────────────────────

    fn validate_advisor(&self, input: &AdvisorInput, self_id: Option<&str>) -> EngineResult<()> {
        if input.name.trim().is_empty() {
            return Err(EngineError::validation("advisor name must not be empty"));
        }
        if !role::ALL.contains(&input.role.as_str()) {
            return Err(EngineError::validation(format!(
                "unknown role '{}'",
                input.role
            )));
        }
        if let Some(rate) = input.commission_rate {
            check_percent("commission_rate", rate)?;
        }
        if let Some(rate) = input.override_rate {
            check_percent("override_rate", rate)?;
        }
        if let Some(basis) = &input.override_basis {
            OverrideBasis::parse(basis)?;
        }
        if let Some(lead_id) = &input.team_lead_id {
            self.ensure_no_cycle(lead_id, self_id)?;
        }
        Ok(())
    }

    /// Walk the team-lead chain upward from `start`; reaching `self_id` or
    /// revisiting a node means the reference would close a cycle.
    fn ensure_no_cycle(&self, start: &str, self_id: Option<&str>) -> EngineResult<()> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut current = Some(start.to_string());
        while let Some(id) = current {
            if self_id == Some(id.as_str()) || !seen.insert(id.clone()) {
                return Err(EngineError::validation(
                    "circular team-lead reference".to_string(),
                ));
            }
            current = self.store.advisor_required(&id)?.team_lead_id;
        }
        Ok(())
    }
}

fn check_percent(name: &str, rate: f64) -> EngineResult<()> {
    if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
        return Err(EngineError::validation(format!(
            "{name} must be between 0 and 100, got {rate}"
        )));
    }
    Ok(())
}
