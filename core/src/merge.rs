//! Pure merge policy for contract re-imports.
//!
//! RULE: Re-importing portfolio data must never regress a contract that the
//! matching engine already advanced. Status resolution is per-field, not a
//! blanket coalesce: `commission_received` and `chargeback` are owned by the
//! matching engine and survive any import; everything else adopts the
//! incoming value when one is present.

use crate::store::ContractRow;
use crate::types::contract_status;

/// Fields an incoming contract-source row may contribute.
#[derive(Debug, Clone, Default)]
pub struct ContractPatch {
    pub policy_number: String,
    pub alt_policy_key: Option<String>,
    pub account_holder: Option<String>,
    pub holder_key: Option<String>,
    pub insurer: Option<String>,
    pub product: Option<String>,
    pub advisor_id: Option<String>,
    pub status: Option<String>,
    pub begin_date: Option<String>,
}

/// Statuses the matching engine owns. Imports may not overwrite them.
fn is_engine_owned(status: &str) -> bool {
    status == contract_status::COMMISSION_RECEIVED || status == contract_status::CHARGEBACK
}

/// Merge an incoming portfolio row into the current contract. Returns the
/// merged row; the caller persists it. Pure — no store access, unit-tested
/// independently of the persistence layer.
pub fn merge_contract(current: &ContractRow, incoming: &ContractPatch) -> ContractRow {
    let mut merged = current.clone();

    merged.policy_number = incoming.policy_number.clone();

    if incoming.alt_policy_key.is_some() {
        merged.alt_policy_key = incoming.alt_policy_key.clone();
    }
    if incoming.account_holder.is_some() {
        merged.account_holder = incoming.account_holder.clone();
        merged.holder_key = incoming.holder_key.clone();
    }
    if incoming.insurer.is_some() {
        merged.insurer = incoming.insurer.clone();
    }
    if incoming.product.is_some() {
        merged.product = incoming.product.clone();
    }
    if incoming.begin_date.is_some() {
        merged.begin_date = incoming.begin_date.clone();
    }

    // An assigned advisor is never clobbered by an import.
    if merged.advisor_id.is_none() {
        merged.advisor_id = incoming.advisor_id.clone();
    }

    // Preserve engine-owned statuses; otherwise adopt the incoming one.
    if !is_engine_owned(&merged.status) {
        if let Some(status) = &incoming.status {
            merged.status = status.clone();
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(status: &str, advisor: Option<&str>) -> ContractRow {
        ContractRow {
            contract_id: "K1".into(),
            policy_number: "LV-00815".into(),
            policy_key: "815".into(),
            alt_policy_key: None,
            account_holder: Some("Huber, Maria".into()),
            holder_key: Some("huber maria".into()),
            insurer: None,
            product: None,
            advisor_id: advisor.map(String::from),
            status: status.into(),
            source: "contract".into(),
            begin_date: None,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn patch(status: Option<&str>) -> ContractPatch {
        ContractPatch {
            policy_number: "LV-00815".into(),
            status: status.map(String::from),
            ..ContractPatch::default()
        }
    }

    #[test]
    fn terminal_positive_status_survives_reimport() {
        let current = contract(contract_status::COMMISSION_RECEIVED, None);
        let merged = merge_contract(&current, &patch(Some(contract_status::OPEN)));
        assert_eq!(merged.status, contract_status::COMMISSION_RECEIVED);
    }

    #[test]
    fn chargeback_status_survives_reimport() {
        let current = contract(contract_status::CHARGEBACK, None);
        let merged = merge_contract(&current, &patch(Some(contract_status::CONCLUDED)));
        assert_eq!(merged.status, contract_status::CHARGEBACK);
    }

    #[test]
    fn non_terminal_status_adopts_incoming() {
        let current = contract(contract_status::PROPOSAL, None);
        let merged = merge_contract(&current, &patch(Some(contract_status::CONCLUDED)));
        assert_eq!(merged.status, contract_status::CONCLUDED);
    }

    #[test]
    fn missing_incoming_status_keeps_current() {
        let current = contract(contract_status::OPEN, None);
        let merged = merge_contract(&current, &patch(None));
        assert_eq!(merged.status, contract_status::OPEN);
    }

    #[test]
    fn assigned_advisor_is_not_clobbered() {
        let current = contract(contract_status::OPEN, Some("A1"));
        let mut incoming = patch(None);
        incoming.advisor_id = Some("A2".into());
        let merged = merge_contract(&current, &incoming);
        assert_eq!(merged.advisor_id.as_deref(), Some("A1"));
    }

    #[test]
    fn missing_advisor_adopts_incoming() {
        let current = contract(contract_status::OPEN, None);
        let mut incoming = patch(None);
        incoming.advisor_id = Some("A2".into());
        let merged = merge_contract(&current, &incoming);
        assert_eq!(merged.advisor_id.as_deref(), Some("A2"));
    }

    #[test]
    fn fresher_fields_are_adopted() {
        let current = contract(contract_status::OPEN, None);
        let mut incoming = patch(None);
        incoming.alt_policy_key = Some("4711".into());
        incoming.insurer = Some("Nordstern".into());
        let merged = merge_contract(&current, &incoming);
        assert_eq!(merged.alt_policy_key.as_deref(), Some("4711"));
        assert_eq!(merged.insurer.as_deref(), Some("Nordstern"));
        // Absent incoming holder keeps the current one.
        assert_eq!(merged.account_holder.as_deref(), Some("Huber, Maria"));
    }
}
