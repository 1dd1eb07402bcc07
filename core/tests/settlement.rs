//! Integration tests for settlement generation and the status workflow:
//! 1. Monthly aggregation figures (gross, deduction, net, chargeback,
//!    override, payout)
//! 2. Zero-activity advisors are skipped
//! 3. Draft replacement vs new revisions
//! 4. Transition gating and the approval lock

use courtage_core::admin_subsystem::AdvisorInput;
use courtage_core::config::EngineConfig;
use courtage_core::import_subsystem::{CommissionRowInput, ContractRowInput, ImportRows};
use courtage_core::types::SettlementStatus;
use courtage_core::{CommissionEngine, EngineError};

fn build() -> CommissionEngine {
    CommissionEngine::in_memory(EngineConfig::default()).expect("in-memory engine")
}

/// Team lead (10% of advisor share) supervising one advisor at 40%,
/// with a matched contract for policy LV-900.
fn setup(engine: &CommissionEngine) -> (String, String) {
    let lead = engine
        .create_advisor(&AdvisorInput {
            name: "Teamleiterin Timm".into(),
            role: "team_lead".into(),
            commission_rate: None,
            team_lead_id: None,
            override_rate: Some(10.0),
            override_basis: Some("advisor_share".into()),
        })
        .unwrap();
    let advisor = engine
        .create_advisor(&AdvisorInput {
            name: "Hans Hansen".into(),
            role: "advisor".into(),
            commission_rate: Some(40.0),
            team_lead_id: Some(lead.advisor_id.clone()),
            override_rate: None,
            override_basis: None,
        })
        .unwrap();
    engine.upsert_mapping("Hans Hansen", &advisor.advisor_id).unwrap();
    engine
        .ingest(
            ImportRows::Contract(vec![ContractRowInput {
                policy_number: "LV-900".into(),
                alternate_policy_number: None,
                account_holder: None,
                insurer: None,
                product: None,
                advisor_name: Some("Hans Hansen".into()),
                status: None,
                begin_date: None,
            }]),
            "fp-c",
            None,
            false,
        )
        .unwrap();
    (advisor.advisor_id, lead.advisor_id)
}

fn pay(engine: &CommissionEngine, fp: &str, amount: f64, paid_on: &str) {
    engine
        .ingest(
            ImportRows::Commission(vec![CommissionRowInput {
                policy_number: "LV-900".into(),
                amount,
                kind: None,
                paid_on: paid_on.into(),
                broker_name: None,
                account_holder: None,
                installment_no: None,
                installment_count: None,
            }]),
            fp,
            None,
            false,
        )
        .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregation figures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn monthly_figures_add_up() {
    let engine = build();
    let (advisor_id, lead_id) = setup(&engine);
    pay(&engine, "fp-1", 1000.0, "2026-03-05");
    pay(&engine, "fp-2", -500.0, "2026-03-20");
    // Outside the month — must not appear.
    pay(&engine, "fp-3", 999.0, "2026-04-01");
    engine.auto_match(None).unwrap();

    let statements = engine.generate("2026-03").unwrap();
    assert_eq!(statements.len(), 2, "advisor and team lead");

    let advisor_stmt = statements.iter().find(|s| s.advisor_id == advisor_id).unwrap();
    // 40% of 1000.00 gross, 10% override deducted, -200.00 chargeback share.
    assert_eq!(advisor_stmt.gross_cents, 40_000);
    assert_eq!(advisor_stmt.team_lead_cut_cents, 4_000);
    assert_eq!(advisor_stmt.net_cents, 36_000);
    assert_eq!(advisor_stmt.chargeback_cents, -20_000);
    assert_eq!(advisor_stmt.override_cents, 0);
    assert_eq!(advisor_stmt.payout_cents, 16_000);
    assert_eq!(advisor_stmt.commission_count, 2);
    assert_eq!(advisor_stmt.status, "computed");
    assert!(!advisor_stmt.locked);

    let lead_stmt = statements.iter().find(|s| s.advisor_id == lead_id).unwrap();
    assert_eq!(lead_stmt.gross_cents, 0);
    assert_eq!(lead_stmt.override_cents, 4_000);
    assert_eq!(lead_stmt.payout_cents, 4_000);
}

#[test]
fn advisors_without_activity_get_no_statement() {
    let engine = build();
    let (_, _) = setup(&engine);
    engine
        .create_advisor(&AdvisorInput {
            name: "Ruhende Beraterin".into(),
            role: "advisor".into(),
            commission_rate: Some(40.0),
            team_lead_id: None,
            override_rate: None,
            override_basis: None,
        })
        .unwrap();
    pay(&engine, "fp-1", 1000.0, "2026-03-05");
    engine.auto_match(None).unwrap();

    let statements = engine.generate("2026-03").unwrap();
    assert_eq!(statements.len(), 2, "only the advisor and the team lead");

    // A month with no activity at all yields nothing.
    let empty = engine.generate("2025-01").unwrap();
    assert!(empty.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Revisions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn regenerating_replaces_computed_drafts_in_place() {
    let engine = build();
    let (advisor_id, _) = setup(&engine);
    pay(&engine, "fp-1", 1000.0, "2026-03-05");
    engine.auto_match(None).unwrap();

    engine.generate("2026-03").unwrap();
    pay(&engine, "fp-2", 500.0, "2026-03-10");
    engine.auto_match(None).unwrap();
    engine.generate("2026-03").unwrap();

    let statements = engine.store.statements_for_month("2026-03").unwrap();
    let of_advisor: Vec<_> = statements.iter().filter(|s| s.advisor_id == advisor_id).collect();
    assert_eq!(of_advisor.len(), 1, "draft was replaced, not stacked");
    assert_eq!(of_advisor[0].revision, 1);
    assert_eq!(of_advisor[0].gross_cents, 60_000);
}

#[test]
fn regenerating_after_approval_creates_a_new_revision() {
    let engine = build();
    let (advisor_id, _) = setup(&engine);
    pay(&engine, "fp-1", 1000.0, "2026-03-05");
    engine.auto_match(None).unwrap();

    let first = engine.generate("2026-03").unwrap();
    let stmt = first.iter().find(|s| s.advisor_id == advisor_id).unwrap();
    engine
        .transition_statement(&stmt.statement_id, SettlementStatus::Reviewed)
        .unwrap();
    engine
        .transition_statement(&stmt.statement_id, SettlementStatus::Approved)
        .unwrap();

    // A late chargeback arrives; the month is regenerated.
    pay(&engine, "fp-2", -1000.0, "2026-03-28");
    engine.auto_match(None).unwrap();
    engine.generate("2026-03").unwrap();

    let approved = engine.store.statement_required(&stmt.statement_id).unwrap();
    assert_eq!(approved.status, "approved", "approved statement untouched");
    assert_eq!(approved.gross_cents, 40_000);

    let latest = engine
        .store
        .latest_statement("2026-03", &advisor_id)
        .unwrap()
        .unwrap();
    assert_eq!(latest.revision, 2);
    assert_eq!(latest.chargeback_cents, -40_000);
}

// ─────────────────────────────────────────────────────────────────────────────
// Status workflow gating
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn approved_rejects_review_but_accepts_payment() {
    let engine = build();
    let (advisor_id, _) = setup(&engine);
    pay(&engine, "fp-1", 1000.0, "2026-03-05");
    engine.auto_match(None).unwrap();
    let statements = engine.generate("2026-03").unwrap();
    let stmt = statements.iter().find(|s| s.advisor_id == advisor_id).unwrap();

    engine
        .transition_statement(&stmt.statement_id, SettlementStatus::Reviewed)
        .unwrap();
    let approved = engine
        .transition_statement(&stmt.statement_id, SettlementStatus::Approved)
        .unwrap();
    assert!(approved.locked, "approval sets the lock");

    let err = engine
        .transition_statement(&stmt.statement_id, SettlementStatus::Reviewed)
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");

    // The lock must not block its own escape transition.
    let paid = engine
        .transition_statement(&stmt.statement_id, SettlementStatus::Paid)
        .unwrap();
    assert_eq!(paid.status, "paid");
    assert!(paid.locked);
}

#[test]
fn reviewed_can_fall_back_to_computed() {
    let engine = build();
    let (advisor_id, _) = setup(&engine);
    pay(&engine, "fp-1", 1000.0, "2026-03-05");
    engine.auto_match(None).unwrap();
    let statements = engine.generate("2026-03").unwrap();
    let stmt = statements.iter().find(|s| s.advisor_id == advisor_id).unwrap();

    engine
        .transition_statement(&stmt.statement_id, SettlementStatus::Reviewed)
        .unwrap();
    let back = engine
        .transition_statement(&stmt.statement_id, SettlementStatus::Computed)
        .unwrap();
    assert_eq!(back.status, "computed");
    assert!(!back.locked);
}

#[test]
fn skipping_stages_is_illegal() {
    let engine = build();
    let (advisor_id, _) = setup(&engine);
    pay(&engine, "fp-1", 1000.0, "2026-03-05");
    engine.auto_match(None).unwrap();
    let statements = engine.generate("2026-03").unwrap();
    let stmt = statements.iter().find(|s| s.advisor_id == advisor_id).unwrap();

    for illegal in [SettlementStatus::Approved, SettlementStatus::Paid] {
        let err = engine
            .transition_statement(&stmt.statement_id, illegal)
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }
}

#[test]
fn malformed_month_is_a_validation_error() {
    let engine = build();
    for bad in ["2026", "2026-00", "March 2026", "2026-3"] {
        let err = engine.generate(bad).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "month '{bad}'");
    }
}
