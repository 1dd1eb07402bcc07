//! Integration tests for configuration-change recomputation and the
//! administrative validation rules:
//! 1. A rate change recomputes exactly that advisor's matched commissions
//! 2. An override change recomputes the supervised advisors' rows
//! 3. Deleting a broker mapping has no retroactive effect
//! 4. Validation rejects bad rates, circular chains and dangling references

use courtage_core::admin_subsystem::AdvisorInput;
use courtage_core::config::EngineConfig;
use courtage_core::import_subsystem::{CommissionRowInput, ContractRowInput, ImportRows};
use courtage_core::{CommissionEngine, EngineError};

fn build() -> CommissionEngine {
    CommissionEngine::in_memory(EngineConfig::default()).expect("in-memory engine")
}

fn advisor_input(name: &str, rate: Option<f64>, lead: Option<&str>) -> AdvisorInput {
    AdvisorInput {
        name: name.into(),
        role: "advisor".into(),
        commission_rate: rate,
        team_lead_id: lead.map(String::from),
        override_rate: None,
        override_basis: None,
    }
}

fn setup_matched_commission(engine: &CommissionEngine, policy: &str, mapping: &str, amount: f64) {
    engine
        .ingest(
            ImportRows::Contract(vec![ContractRowInput {
                policy_number: policy.into(),
                alternate_policy_number: None,
                account_holder: None,
                insurer: None,
                product: None,
                advisor_name: Some(mapping.into()),
                status: None,
                begin_date: None,
            }]),
            &format!("fp-c-{policy}"),
            None,
            false,
        )
        .unwrap();
    engine
        .ingest(
            ImportRows::Commission(vec![CommissionRowInput {
                policy_number: policy.into(),
                amount,
                kind: None,
                paid_on: "2026-03-01".into(),
                broker_name: None,
                account_holder: None,
                installment_no: None,
                installment_count: None,
            }]),
            &format!("fp-k-{policy}"),
            None,
            false,
        )
        .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoped recomputation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn rate_change_recomputes_only_that_advisors_commissions() {
    let engine = build();
    let a = engine.create_advisor(&advisor_input("Anna", Some(40.0), None)).unwrap();
    let b = engine.create_advisor(&advisor_input("Bernd", Some(40.0), None)).unwrap();
    engine.upsert_mapping("Anna", &a.advisor_id).unwrap();
    engine.upsert_mapping("Bernd", &b.advisor_id).unwrap();
    setup_matched_commission(&engine, "LV-1", "Anna", 1000.0);
    setup_matched_commission(&engine, "LV-2", "Bernd", 1000.0);
    engine.auto_match(None).unwrap();

    engine
        .update_advisor(&a.advisor_id, &advisor_input("Anna", Some(50.0), None))
        .unwrap();

    let rows = engine.store.list_commissions().unwrap();
    let of_a = rows.iter().find(|c| c.advisor_id.as_deref() == Some(a.advisor_id.as_str())).unwrap();
    let of_b = rows.iter().find(|c| c.advisor_id.as_deref() == Some(b.advisor_id.as_str())).unwrap();
    assert_eq!(of_a.advisor_share_cents, Some(50_000), "recomputed at 50%");
    assert_eq!(of_b.advisor_share_cents, Some(40_000), "other advisor untouched");

    // The invariant survives the retroactive correction.
    let sum = of_a.advisor_share_cents.unwrap()
        + of_a.team_lead_share_cents.unwrap()
        + of_a.agency_share_cents.unwrap();
    assert_eq!(sum, of_a.amount_cents);
}

#[test]
fn override_change_recomputes_the_supervised_advisors() {
    let engine = build();
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
        .create_advisor(&advisor_input("Anna", Some(40.0), Some(&lead.advisor_id)))
        .unwrap();
    engine.upsert_mapping("Anna", &advisor.advisor_id).unwrap();
    setup_matched_commission(&engine, "LV-1", "Anna", 1000.0);
    engine.auto_match(None).unwrap();

    let before = &engine.store.list_commissions().unwrap()[0];
    assert_eq!(before.team_lead_share_cents, Some(4_000));
    assert_eq!(before.advisor_share_cents, Some(36_000));

    // Override moves to 10% of the gross amount.
    engine
        .update_advisor(
            &lead.advisor_id,
            &AdvisorInput {
                name: "Teamleiterin Timm".into(),
                role: "team_lead".into(),
                commission_rate: None,
                team_lead_id: None,
                override_rate: Some(10.0),
                override_basis: Some("gross_amount".into()),
            },
        )
        .unwrap();

    let after = &engine.store.list_commissions().unwrap()[0];
    assert_eq!(after.team_lead_share_cents, Some(10_000));
    assert_eq!(after.advisor_share_cents, Some(30_000));
    assert_eq!(after.agency_share_cents, Some(60_000), "agency share is unaffected");
}

// ─────────────────────────────────────────────────────────────────────────────
// Mapping deletion policy
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn deleting_a_mapping_is_not_retroactive() {
    let engine = build();
    let advisor = engine.create_advisor(&advisor_input("Anna", Some(40.0), None)).unwrap();
    engine.upsert_mapping("Vertrieb Nord", &advisor.advisor_id).unwrap();

    engine
        .ingest(
            ImportRows::Contract(vec![ContractRowInput {
                policy_number: "LV-1".into(),
                alternate_policy_number: None,
                account_holder: None,
                insurer: None,
                product: None,
                advisor_name: None,
                status: None,
                begin_date: None,
            }]),
            "fp-c",
            None,
            false,
        )
        .unwrap();
    engine
        .ingest(
            ImportRows::Commission(vec![CommissionRowInput {
                policy_number: "LV-1".into(),
                amount: 100.0,
                kind: None,
                paid_on: "2026-03-01".into(),
                broker_name: Some("Vertrieb Nord".into()),
                account_holder: None,
                installment_no: None,
                installment_count: None,
            }]),
            "fp-k",
            None,
            false,
        )
        .unwrap();
    engine.auto_match(None).unwrap();

    let resolved = &engine.store.list_commissions().unwrap()[0];
    assert_eq!(resolved.advisor_id.as_deref(), Some(advisor.advisor_id.as_str()));

    assert!(engine.delete_mapping("Vertrieb Nord").unwrap());
    assert!(!engine.delete_mapping("Vertrieb Nord").unwrap(), "second delete is a no-op");

    let still = &engine.store.list_commissions().unwrap()[0];
    assert_eq!(
        still.advisor_id.as_deref(),
        Some(advisor.advisor_id.as_str()),
        "already resolved commissions keep their advisor"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn out_of_range_rates_are_rejected_not_clamped() {
    let engine = build();
    for rate in [-1.0, 100.5, f64::NAN, f64::INFINITY] {
        let err = engine
            .create_advisor(&advisor_input("Anna", Some(rate), None))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "rate {rate}");
    }
    assert!(engine.store.list_advisors(false).unwrap().is_empty(), "nothing persisted");
}

#[test]
fn circular_team_lead_chains_are_rejected() {
    let engine = build();
    let a = engine.create_advisor(&advisor_input("Anna", Some(40.0), None)).unwrap();
    let b = engine
        .create_advisor(&advisor_input("Bernd", Some(40.0), Some(&a.advisor_id)))
        .unwrap();

    // Closing the loop a -> b -> a must fail.
    let err = engine
        .update_advisor(
            &a.advisor_id,
            &advisor_input("Anna", Some(40.0), Some(&b.advisor_id)),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");

    // Direct self-reference as well.
    let err = engine
        .update_advisor(
            &a.advisor_id,
            &advisor_input("Anna", Some(40.0), Some(&a.advisor_id)),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn dangling_references_and_bad_enums_are_rejected() {
    let engine = build();
    let err = engine
        .create_advisor(&advisor_input("Anna", Some(40.0), Some("no-such-lead")))
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));

    let mut bad_role = advisor_input("Anna", Some(40.0), None);
    bad_role.role = "intern".into();
    let err = engine.create_advisor(&bad_role).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let mut bad_basis = advisor_input("Anna", Some(40.0), None);
    bad_basis.override_rate = Some(10.0);
    bad_basis.override_basis = Some("percent".into());
    let err = engine.create_advisor(&bad_basis).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine.upsert_mapping("Vertrieb", "no-such-advisor").unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));

    let err = engine.update_advisor("no-such-advisor", &advisor_input("X", None, None)).unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[test]
fn deactivated_advisors_keep_their_history() {
    let engine = build();
    let advisor = engine.create_advisor(&advisor_input("Anna", Some(40.0), None)).unwrap();
    engine.upsert_mapping("Anna", &advisor.advisor_id).unwrap();
    setup_matched_commission(&engine, "LV-1", "Anna", 1000.0);
    engine.auto_match(None).unwrap();

    engine.deactivate_advisor(&advisor.advisor_id).unwrap();

    let row = engine.store.advisor_required(&advisor.advisor_id).unwrap();
    assert!(!row.active);
    let commission = &engine.store.list_commissions().unwrap()[0];
    assert_eq!(
        commission.advisor_id.as_deref(),
        Some(advisor.advisor_id.as_str()),
        "historical attribution survives deactivation"
    );
}
