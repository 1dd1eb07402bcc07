//! Matching engine — resolves commissions to contracts and advisors.
//!
//! Automatic matching is an ordered, idempotent pipeline. Every step runs
//! in its own transaction and only ever touches commissions still in the
//! `unmatched` state, so re-running the pipeline (or running it while an
//! operator assigns manually) can never clobber a resolved row. A failing
//! step rolls itself back and leaves the previously committed steps intact.
//!
//! Execution order (fixed, documented, never reordered):
//!   1. Exact policy-key match            (confidence 1.0)
//!   2. Alternate-policy-key fallback     (confidence 1.0)
//!   3. Cross-source consultation match   (confidence from config, 0.85)
//!   4. Advisor back-fill from consultations
//!   5. Broker-mapping resolution
//!   6. Split computation for rows matched in this run
//!   7. Guarded contract status advance
//!
//! Every step threads the explicit batch scope (`None` = whole account)
//! through its queries; nothing relies on ambient filtering.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::event::EngineEvent;
use crate::split::{compute_split, TeamLeadCut};
use crate::store::{now_iso, AdvisorRow, ContractRow, EngineStore, SplitWork};
use crate::types::{contract_status, match_status, OverrideBasis, SourceType};

/// Row counts per pipeline step for one automatic run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchRunSummary {
    pub exact: i64,
    pub alternate: i64,
    pub consultation: i64,
    pub advisor_backfill: i64,
    pub broker_mapping: i64,
    pub splits_computed: i64,
    pub contracts_advanced: i64,
}

impl MatchRunSummary {
    pub fn total_matched(&self) -> i64 {
        self.exact + self.alternate + self.consultation
    }
}

/// Result of a manual assignment.
#[derive(Debug, Clone)]
pub struct AssignOutcome {
    pub commission_id: String,
    pub advisor_id: Option<String>,
    pub siblings_linked: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestDirection {
    CommissionToContract,
    ContractToCommission,
}

/// One ranked match candidate. Never a mutation.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub id: String,
    pub score: i64,
    pub reason: &'static str,
}

pub struct Matcher<'a> {
    store: &'a EngineStore,
    config: &'a EngineConfig,
}

impl<'a> Matcher<'a> {
    pub fn new(store: &'a EngineStore, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    // ── Automatic batch matching ───────────────────────────────

    /// Run the pipeline. `scope` filters every step to one batch's
    /// commissions; `None` runs account-wide.
    pub fn auto_match(&self, scope: Option<&str>) -> EngineResult<MatchRunSummary> {
        if let Some(batch_id) = scope {
            self.store.batch_required(batch_id)?;
        }

        let mut summary = MatchRunSummary::default();

        summary.exact = self.step(|ts| self.store.match_exact_policy(scope, ts))?;
        summary.alternate = self.step(|ts| self.store.match_alternate_policy(scope, ts))?;
        summary.consultation = self.step(|ts| self.match_consultations(scope, ts))?;
        summary.advisor_backfill = self.step(|ts| {
            let contracts = self.store.backfill_contract_advisors(scope, ts)?;
            let commissions = self.store.adopt_contract_advisors(scope, ts)?;
            Ok(contracts + commissions)
        })?;
        summary.broker_mapping = self.step(|ts| self.store.resolve_broker_mappings(scope, ts))?;
        summary.splits_computed = self.step(|ts| {
            let work = self.store.rows_needing_split(scope)?;
            self.compute_and_apply(&work, ts)
        })?;
        summary.contracts_advanced =
            self.step(|ts| self.store.advance_contract_statuses(scope, ts))?;

        self.store.append_event(
            "matching",
            &EngineEvent::MatchRunCompleted {
                scope: scope.map(String::from),
                exact: summary.exact,
                alternate: summary.alternate,
                consultation: summary.consultation,
                advisor_backfill: summary.advisor_backfill,
                broker_mapping: summary.broker_mapping,
                splits_computed: summary.splits_computed,
                contracts_advanced: summary.contracts_advanced,
            },
        )?;
        log::info!(
            "auto match (scope {:?}): {} matched, {} splits, {} contracts advanced",
            scope,
            summary.total_matched(),
            summary.splits_computed,
            summary.contracts_advanced
        );
        Ok(summary)
    }

    /// Run one pipeline step in its own transaction.
    fn step<F>(&self, f: F) -> EngineResult<i64>
    where
        F: FnOnce(&str) -> EngineResult<usize>,
    {
        let tx = self.store.begin()?;
        let ts = now_iso();
        let changed = f(&ts)?;
        tx.commit()?;
        Ok(changed as i64)
    }

    /// Step 3: link still-unmatched commissions to the secondary source's
    /// consultation records, creating the contract from the consultation
    /// when the primary source never delivered one.
    fn match_consultations(&self, scope: Option<&str>, ts: &str) -> EngineResult<usize> {
        let mut linked = 0;
        for policy_key in self.store.unmatched_policy_keys_with_consultation(scope)? {
            let contract = match self.store.contract_by_policy_key(&policy_key)? {
                Some(existing) => existing,
                None => {
                    let Some(cn) = self.store.latest_consultation_for_policy(&policy_key)?
                    else {
                        continue;
                    };
                    let row = ContractRow {
                        contract_id: Uuid::new_v4().to_string(),
                        policy_number: cn.policy_number.clone(),
                        policy_key: policy_key.clone(),
                        alt_policy_key: None,
                        account_holder: cn.account_holder.clone(),
                        holder_key: cn.holder_key.clone(),
                        insurer: cn.insurer.clone(),
                        product: cn.product.clone(),
                        advisor_id: cn.advisor_id.clone(),
                        status: contract_status::OPEN.to_string(),
                        source: SourceType::Consultation.as_str().to_string(),
                        begin_date: None,
                        created_at: ts.to_string(),
                        updated_at: ts.to_string(),
                    };
                    self.store.insert_contract(&row)?;
                    row
                }
            };
            linked += self.store.link_unmatched_commissions(
                &policy_key,
                &contract.contract_id,
                contract.advisor_id.as_deref(),
                match_status::AUTO,
                Some(self.config.consultation_confidence),
                scope,
                ts,
            )?;
        }
        Ok(linked)
    }

    // ── Split computation ──────────────────────────────────────

    /// Compute and persist shares for the given commissions. An advisor
    /// without a rate model clears the shares instead (the row becomes a
    /// clearance case rather than carrying stale numbers).
    fn compute_and_apply(&self, work: &[SplitWork], ts: &str) -> EngineResult<usize> {
        let mut advisors: HashMap<String, AdvisorRow> = HashMap::new();
        for item in work {
            let advisor = self.advisor_cached(&mut advisors, &item.advisor_id)?;
            let split = match advisor.commission_rate {
                None => None,
                Some(rate) => {
                    let cut = match &advisor.team_lead_id {
                        None => None,
                        Some(lead_id) => {
                            let lead = self.advisor_cached(&mut advisors, lead_id)?;
                            team_lead_cut(&lead)?
                        }
                    };
                    Some(compute_split(item.amount_cents, rate, cut)?)
                }
            };
            self.store.apply_split(&item.commission_id, split, ts)?;
        }
        Ok(work.len())
    }

    fn advisor_cached(
        &self,
        cache: &mut HashMap<String, AdvisorRow>,
        advisor_id: &str,
    ) -> EngineResult<AdvisorRow> {
        if let Some(row) = cache.get(advisor_id) {
            return Ok(row.clone());
        }
        let row = self.store.advisor_required(advisor_id)?;
        cache.insert(advisor_id.to_string(), row.clone());
        Ok(row)
    }

    // ── Scoped recomputation (rate/override changes) ───────────

    /// Recompute shares of every matched commission attributed to one
    /// advisor. Own transaction, explicit scope.
    pub fn recompute_for_advisor(&self, advisor_id: &str) -> EngineResult<i64> {
        self.store.advisor_required(advisor_id)?;
        let tx = self.store.begin()?;
        let ts = now_iso();
        let work = self.store.matched_rows_for_advisor(advisor_id)?;
        let count = self.compute_and_apply(&work, &ts)? as i64;
        self.store.append_event(
            "split",
            &EngineEvent::SplitsRecomputed {
                scope: format!("advisor:{advisor_id}"),
                count,
            },
        )?;
        tx.commit()?;
        Ok(count)
    }

    /// Recompute shares of the supervised advisors' matched commissions
    /// after a team lead's override configuration changed.
    pub fn recompute_for_team_lead(&self, team_lead_id: &str) -> EngineResult<i64> {
        self.store.advisor_required(team_lead_id)?;
        let tx = self.store.begin()?;
        let ts = now_iso();
        let mut count = 0i64;
        for advisor in self.store.advisors_led_by(team_lead_id)? {
            let work = self.store.matched_rows_for_advisor(&advisor.advisor_id)?;
            count += self.compute_and_apply(&work, &ts)? as i64;
        }
        self.store.append_event(
            "split",
            &EngineEvent::SplitsRecomputed {
                scope: format!("team_lead:{team_lead_id}"),
                count,
            },
        )?;
        tx.commit()?;
        Ok(count)
    }

    /// Recompute shares of one contract's matched commissions.
    pub fn recompute_for_contract(&self, contract_id: &str) -> EngineResult<i64> {
        self.store.contract_required(contract_id)?;
        let tx = self.store.begin()?;
        let ts = now_iso();
        let work = self.store.matched_rows_for_contract(contract_id)?;
        let count = self.compute_and_apply(&work, &ts)? as i64;
        self.store.append_event(
            "split",
            &EngineEvent::SplitsRecomputed {
                scope: format!("contract:{contract_id}"),
                count,
            },
        )?;
        tx.commit()?;
        Ok(count)
    }

    // ── Manual assignment ──────────────────────────────────────

    /// Assign one commission to a contract (and optionally an advisor) as
    /// an all-or-nothing transaction: link, split, sibling propagation and
    /// contract status advance either all commit or none do.
    pub fn assign(
        &self,
        commission_id: &str,
        contract_id: &str,
        advisor_id: Option<&str>,
    ) -> EngineResult<AssignOutcome> {
        // Referential validation happens before any mutation.
        let commission = self.store.commission_required(commission_id)?;
        let contract = self.store.contract_required(contract_id)?;
        if let Some(id) = advisor_id {
            self.store.advisor_required(id)?;
        }

        let effective_advisor = advisor_id
            .map(String::from)
            .or_else(|| contract.advisor_id.clone());

        let tx = self.store.begin()?;
        let ts = now_iso();

        self.store
            .assign_commission(commission_id, contract_id, effective_advisor.as_deref(), &ts)?;

        // Siblings still unmatched on the same source policy number follow.
        // An empty key identifies nothing and must not propagate.
        let (sibling_ids, siblings_linked) = if commission.policy_key.is_empty() {
            (Vec::new(), 0i64)
        } else {
            let ids = self
                .store
                .sibling_unmatched_ids(&commission.policy_key, commission_id)?;
            let linked = self.store.link_unmatched_commissions(
                &commission.policy_key,
                contract_id,
                effective_advisor.as_deref(),
                match_status::MANUAL,
                None,
                None,
                &ts,
            )? as i64;
            (ids, linked)
        };

        if effective_advisor.is_some() {
            let mut work = vec![SplitWork {
                commission_id: commission_id.to_string(),
                amount_cents: commission.amount_cents,
                advisor_id: effective_advisor.clone().unwrap(),
            }];
            for id in &sibling_ids {
                let sibling = self.store.commission_required(id)?;
                work.push(SplitWork {
                    commission_id: sibling.commission_id,
                    amount_cents: sibling.amount_cents,
                    advisor_id: effective_advisor.clone().unwrap(),
                });
            }
            self.compute_and_apply(&work, &ts)?;
        }

        self.store.advance_status_for_contract(contract_id, &ts)?;
        self.store.append_event(
            "matching",
            &EngineEvent::CommissionAssigned {
                commission_id: commission_id.to_string(),
                contract_id: contract_id.to_string(),
                advisor_id: effective_advisor.clone(),
                siblings: siblings_linked,
            },
        )?;
        tx.commit()?;

        log::info!(
            "manually assigned commission {commission_id} to contract {contract_id} \
             ({siblings_linked} siblings followed)"
        );
        Ok(AssignOutcome {
            commission_id: commission_id.to_string(),
            advisor_id: effective_advisor,
            siblings_linked,
        })
    }

    /// Park a commission as `ignored` (or bring it back). Ignored rows are
    /// excluded from clearance counts and never auto-matched.
    pub fn set_ignored(&self, commission_id: &str, ignored: bool) -> EngineResult<bool> {
        self.store.commission_required(commission_id)?;
        let tx = self.store.begin()?;
        let changed = self.store.set_ignored(commission_id, ignored, &now_iso())?;
        if changed {
            self.store.append_event(
                "matching",
                &EngineEvent::CommissionIgnored {
                    commission_id: commission_id.to_string(),
                    ignored,
                },
            )?;
        }
        tx.commit()?;
        Ok(changed)
    }

    // ── Scored suggestions ─────────────────────────────────────

    /// Ranked candidates for an unresolved row, in either direction.
    /// Pure read — never mutates.
    pub fn suggest(
        &self,
        id: &str,
        direction: SuggestDirection,
    ) -> EngineResult<Vec<Suggestion>> {
        match direction {
            SuggestDirection::CommissionToContract => self.suggest_contracts(id),
            SuggestDirection::ContractToCommission => self.suggest_commissions(id),
        }
    }

    fn suggest_contracts(&self, commission_id: &str) -> EngineResult<Vec<Suggestion>> {
        let commission = self.store.commission_required(commission_id)?;
        let weights = &self.config.suggestion;
        let mut ranking = Ranking::default();

        if !commission.policy_key.is_empty() {
            if let Some(c) = self.store.contract_by_policy_key(&commission.policy_key)? {
                ranking.add(&c.contract_id, weights.policy_number, "policy_number");
            }
            for c in self
                .store
                .contracts_by_alt_policy_key(&commission.policy_key)?
            {
                ranking.add(
                    &c.contract_id,
                    weights.alternate_policy_number,
                    "alternate_policy_number",
                );
            }
        }
        if let Some(holder) = commission.holder_key.as_deref().filter(|k| !k.is_empty()) {
            for c in self.store.contracts_by_holder_key(holder)? {
                ranking.add(&c.contract_id, weights.account_holder, "account_holder");
            }
            for c in self.store.contracts_by_holder_containment(holder)? {
                ranking.add(
                    &c.contract_id,
                    weights.account_holder_partial,
                    "account_holder_partial",
                );
            }
        }

        Ok(ranking.into_sorted(self.config.suggestion_limit))
    }

    fn suggest_commissions(&self, contract_id: &str) -> EngineResult<Vec<Suggestion>> {
        let contract = self.store.contract_required(contract_id)?;
        let weights = &self.config.suggestion;
        let mut ranking = Ranking::default();

        if !contract.policy_key.is_empty() {
            for cm in self.store.unmatched_by_policy_key(&contract.policy_key)? {
                ranking.add(&cm.commission_id, weights.policy_number, "policy_number");
            }
        }
        if let Some(alt) = contract.alt_policy_key.as_deref().filter(|k| !k.is_empty()) {
            for cm in self.store.unmatched_by_policy_key(alt)? {
                ranking.add(
                    &cm.commission_id,
                    weights.alternate_policy_number,
                    "alternate_policy_number",
                );
            }
        }
        if let Some(holder) = contract.holder_key.as_deref().filter(|k| !k.is_empty()) {
            for cm in self.store.unmatched_by_holder_key(holder)? {
                ranking.add(&cm.commission_id, weights.account_holder, "account_holder");
            }
            for cm in self.store.unmatched_by_holder_containment(holder)? {
                ranking.add(
                    &cm.commission_id,
                    weights.account_holder_partial,
                    "account_holder_partial",
                );
            }
        }

        Ok(ranking.into_sorted(self.config.suggestion_limit))
    }
}

/// Keeps the best score per candidate id.
#[derive(Default)]
struct Ranking {
    best: HashMap<String, (i64, &'static str)>,
}

impl Ranking {
    fn add(&mut self, id: &str, score: i64, reason: &'static str) {
        let keep = self.best.get(id).map_or(false, |(existing, _)| *existing >= score);
        if !keep {
            self.best.insert(id.to_string(), (score, reason));
        }
    }

    fn into_sorted(self, limit: usize) -> Vec<Suggestion> {
        let mut out: Vec<Suggestion> = self
            .best
            .into_iter()
            .map(|(id, (score, reason))| Suggestion { id, score, reason })
            .collect();
        out.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        out.truncate(limit);
        out
    }
}

/// A team lead's cut applies only when both override fields are configured.
fn team_lead_cut(lead: &AdvisorRow) -> EngineResult<Option<TeamLeadCut>> {
    match (lead.override_rate, lead.override_basis.as_deref()) {
        (Some(rate), Some(basis)) => Ok(Some(TeamLeadCut {
            override_rate: rate,
            basis: OverrideBasis::parse(basis)?,
        })),
        _ => Ok(None),
    }
}
