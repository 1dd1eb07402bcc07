//! Integration tests for the read side:
//! 1. Clearance counts (one bucket per unresolved commission)
//! 2. Dashboard period totals
//! 3. Scored suggestions in both directions

use courtage_core::admin_subsystem::AdvisorInput;
use courtage_core::config::EngineConfig;
use courtage_core::import_subsystem::{CommissionRowInput, ContractRowInput, ImportRows};
use courtage_core::matching_subsystem::SuggestDirection;
use courtage_core::CommissionEngine;

fn build() -> CommissionEngine {
    CommissionEngine::in_memory(EngineConfig::default()).expect("in-memory engine")
}

fn commission_row(policy: &str, amount: f64, holder: Option<&str>) -> CommissionRowInput {
    CommissionRowInput {
        policy_number: policy.into(),
        amount,
        kind: None,
        paid_on: "2026-03-01".into(),
        broker_name: None,
        account_holder: holder.map(String::from),
        installment_no: None,
        installment_count: None,
    }
}

fn contract_row(policy: &str, holder: Option<&str>, advisor_name: Option<&str>) -> ContractRowInput {
    ContractRowInput {
        policy_number: policy.into(),
        alternate_policy_number: None,
        account_holder: holder.map(String::from),
        insurer: None,
        product: None,
        advisor_name: advisor_name.map(String::from),
        status: None,
        begin_date: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clearance counts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn each_unresolved_commission_lands_in_exactly_one_bucket() {
    let engine = build();
    let rated = engine
        .create_advisor(&AdvisorInput {
            name: "Hans Hansen".into(),
            role: "advisor".into(),
            commission_rate: Some(40.0),
            team_lead_id: None,
            override_rate: None,
            override_basis: None,
        })
        .unwrap();
    let unrated = engine
        .create_advisor(&AdvisorInput {
            name: "Neue Beraterin".into(),
            role: "advisor".into(),
            commission_rate: None,
            team_lead_id: None,
            override_rate: None,
            override_basis: None,
        })
        .unwrap();
    engine.upsert_mapping("Hansen", &rated.advisor_id).unwrap();
    engine.upsert_mapping("Neu", &unrated.advisor_id).unwrap();

    engine
        .ingest(
            ImportRows::Contract(vec![
                contract_row("LV-1", None, None),      // no advisor, no mapping hit
                contract_row("LV-2", None, Some("Neu")), // advisor without rate model
                contract_row("LV-3", None, Some("Hansen")), // fully resolvable
            ]),
            "fp-c",
            None,
            false,
        )
        .unwrap();
    engine
        .ingest(
            ImportRows::Commission(vec![
                commission_row("LV-1", 100.0, None),
                commission_row("LV-2", 100.0, None),
                commission_row("LV-3", 100.0, None),
                commission_row("LV-404", 100.0, None), // no contract at all
                commission_row("LV-405", 100.0, None), // will be parked as ignored
            ]),
            "fp-k",
            None,
            false,
        )
        .unwrap();
    engine.auto_match(None).unwrap();

    // Park one of the two unmatched rows.
    let parked = engine
        .store
        .list_commissions()
        .unwrap()
        .into_iter()
        .find(|c| c.policy_key == "45") // LV-405: digits 405, zeros stripped
        .unwrap();
    engine.set_ignored(&parked.commission_id, true).unwrap();

    let counts = engine.clearance_counts().unwrap();
    assert_eq!(counts.no_contract, 1, "LV-404 only; the ignored row is out");
    assert_eq!(counts.unknown_broker, 1, "LV-1: contract but no advisor");
    assert_eq!(counts.no_rate_model, 1, "LV-2: advisor without a rate");
    assert_eq!(counts.no_split, 0, "LV-3 got its split");
}

#[test]
fn rows_with_cleared_shares_count_as_no_split() {
    let engine = build();
    let advisor = engine
        .create_advisor(&AdvisorInput {
            name: "Hans Hansen".into(),
            role: "advisor".into(),
            commission_rate: Some(40.0),
            team_lead_id: None,
            override_rate: None,
            override_basis: None,
        })
        .unwrap();
    engine.upsert_mapping("Hansen", &advisor.advisor_id).unwrap();
    engine
        .ingest(
            ImportRows::Contract(vec![contract_row("LV-1", None, Some("Hansen"))]),
            "fp-c",
            None,
            false,
        )
        .unwrap();
    engine
        .ingest(
            ImportRows::Commission(vec![commission_row("LV-1", 100.0, None)]),
            "fp-k",
            None,
            false,
        )
        .unwrap();
    engine.auto_match(None).unwrap();

    // Simulate the transient state between matching and split computation.
    let commission = &engine.store.list_commissions().unwrap()[0];
    engine
        .store
        .apply_split(&commission.commission_id, None, "2026-03-01T00:00:00Z")
        .unwrap();

    let counts = engine.clearance_counts().unwrap();
    assert_eq!(counts.no_split, 1);
    assert_eq!(counts.no_rate_model, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Dashboard and advisor detail
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn dashboard_sums_the_period_per_advisor() {
    let engine = build();
    let advisor = engine
        .create_advisor(&AdvisorInput {
            name: "Hans Hansen".into(),
            role: "advisor".into(),
            commission_rate: Some(40.0),
            team_lead_id: None,
            override_rate: None,
            override_basis: None,
        })
        .unwrap();
    engine.upsert_mapping("Hansen", &advisor.advisor_id).unwrap();
    engine
        .ingest(
            ImportRows::Contract(vec![contract_row("LV-1", None, Some("Hansen"))]),
            "fp-c",
            None,
            false,
        )
        .unwrap();
    engine
        .ingest(
            ImportRows::Commission(vec![
                commission_row("LV-1", 1000.0, None),
                commission_row("LV-1", -250.0, None),
            ]),
            "fp-k",
            None,
            false,
        )
        .unwrap();
    engine.auto_match(None).unwrap();

    let dashboard = engine.dashboard("2026-03-01", "2026-04-01").unwrap();
    assert_eq!(dashboard.advisors.len(), 1);
    let row = &dashboard.advisors[0];
    assert_eq!(row.gross_cents, 40_000);
    assert_eq!(row.net_cents, 40_000);
    assert_eq!(row.chargeback_cents, -10_000);
    assert_eq!(dashboard.gross_cents, 40_000);
    assert_eq!(dashboard.chargeback_cents, -10_000);

    let detail = engine.advisor_detail(&advisor.advisor_id).unwrap();
    assert_eq!(detail.recent.len(), 2);
    assert!(detail.recent.iter().all(|c| c.advisor_share_cents.is_some()));

    // Outside the period nothing shows up.
    let empty = engine.dashboard("2025-01-01", "2025-02-01").unwrap();
    assert!(empty.advisors.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Suggestions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn suggestions_rank_by_the_score_table() {
    let engine = build();
    engine
        .ingest(
            ImportRows::Contract(vec![
                contract_row("LV-100", Some("Huber, Maria"), None),
                ContractRowInput {
                    alternate_policy_number: Some("LV-100".into()),
                    ..contract_row("LV-200", None, None)
                },
                contract_row("LV-300", Some("Maria"), None),
                contract_row("LV-400", Some("Ganz Anders"), None),
            ]),
            "fp-c",
            None,
            false,
        )
        .unwrap();
    engine
        .ingest(
            ImportRows::Commission(vec![commission_row("LV-100", 100.0, Some("Huber, Maria"))]),
            "fp-k",
            None,
            false,
        )
        .unwrap();

    let commission = &engine.store.list_commissions().unwrap()[0];
    let suggestions = engine
        .suggest(&commission.commission_id, SuggestDirection::CommissionToContract)
        .unwrap();

    assert_eq!(suggestions.len(), 3, "the unrelated contract stays out");
    assert_eq!(suggestions[0].score, 100);
    assert_eq!(suggestions[0].reason, "policy_number");
    assert_eq!(suggestions[1].score, 90);
    assert_eq!(suggestions[1].reason, "alternate_policy_number");
    assert_eq!(suggestions[2].score, 40);
    assert_eq!(suggestions[2].reason, "account_holder_partial");
}

#[test]
fn contract_to_commission_direction_finds_unmatched_rows() {
    let engine = build();
    engine
        .ingest(
            ImportRows::Contract(vec![contract_row("LV-100", Some("Huber, Maria"), None)]),
            "fp-c",
            None,
            false,
        )
        .unwrap();
    engine
        .ingest(
            ImportRows::Commission(vec![
                commission_row("LV-100", 100.0, None),
                commission_row("XX-999", 50.0, Some("Huber, Maria (geb. Schmidt)")),
            ]),
            "fp-k",
            None,
            false,
        )
        .unwrap();

    let contract = engine.store.contract_by_policy_key("1").unwrap().unwrap();
    let suggestions = engine
        .suggest(&contract.contract_id, SuggestDirection::ContractToCommission)
        .unwrap();

    assert_eq!(suggestions.len(), 2);
    assert_eq!(suggestions[0].score, 100, "exact policy match first");
    assert_eq!(suggestions[1].score, 40, "holder containment second");

    // Once matched, the exact row disappears from the candidate set.
    engine.auto_match(None).unwrap();
    let suggestions = engine
        .suggest(&contract.contract_id, SuggestDirection::ContractToCommission)
        .unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].score, 40);
}
