//! Shared primitive types used across the entire engine.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// A monetary amount in integer minor units (euro cents). Signed:
/// chargebacks are negative.
pub type Cents = i64;

/// A stable, unique identifier for any entity in the engine.
pub type EntityId = String;

/// Which external origin a batch (or a row) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Insurer settlement statements; rows become commissions.
    Commission,
    /// Primary portfolio export; rows upsert contracts.
    Contract,
    /// Secondary advisory-protocol export; rows become consultations.
    Consultation,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Commission => "commission",
            SourceType::Contract => "contract",
            SourceType::Consultation => "consultation",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "commission" => Ok(SourceType::Commission),
            "contract" => Ok(SourceType::Contract),
            "consultation" => Ok(SourceType::Consultation),
            other => Err(EngineError::validation(format!(
                "unknown source type '{other}'"
            ))),
        }
    }
}

/// Payment kind of a commission line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Payment,
    Renewal,
    Chargeback,
    Other,
}

impl PaymentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentKind::Payment => "payment",
            PaymentKind::Renewal => "renewal",
            PaymentKind::Chargeback => "chargeback",
            PaymentKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "payment" => Ok(PaymentKind::Payment),
            "renewal" => Ok(PaymentKind::Renewal),
            "chargeback" => Ok(PaymentKind::Chargeback),
            "other" => Ok(PaymentKind::Other),
            unknown => Err(EngineError::validation(format!(
                "unknown payment kind '{unknown}'"
            ))),
        }
    }
}

/// How a team lead's override is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideBasis {
    /// Override percent of the advisor's gross share.
    AdvisorShare,
    /// Override percent of the full commission amount.
    GrossAmount,
}

impl OverrideBasis {
    pub fn as_str(self) -> &'static str {
        match self {
            OverrideBasis::AdvisorShare => "advisor_share",
            OverrideBasis::GrossAmount => "gross_amount",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "advisor_share" => Ok(OverrideBasis::AdvisorShare),
            "gross_amount" => Ok(OverrideBasis::GrossAmount),
            other => Err(EngineError::validation(format!(
                "unknown override basis '{other}'"
            ))),
        }
    }
}

/// Settlement statement lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Computed,
    Reviewed,
    Approved,
    Paid,
}

impl SettlementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SettlementStatus::Computed => "computed",
            SettlementStatus::Reviewed => "reviewed",
            SettlementStatus::Approved => "approved",
            SettlementStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> EngineResult<Self> {
        match s {
            "computed" => Ok(SettlementStatus::Computed),
            "reviewed" => Ok(SettlementStatus::Reviewed),
            "approved" => Ok(SettlementStatus::Approved),
            "paid" => Ok(SettlementStatus::Paid),
            other => Err(EngineError::validation(format!(
                "unknown settlement status '{other}'"
            ))),
        }
    }
}

/// Match status literals used in commission rows and SQL filters.
pub mod match_status {
    pub const UNMATCHED: &str = "unmatched";
    pub const AUTO: &str = "auto_matched";
    pub const MANUAL: &str = "manual_matched";
    pub const IGNORED: &str = "ignored";
}

/// Contract status literals. `commission_received` is terminal-positive:
/// once reached, only a chargeback or an explicit manual edit may change it.
pub mod contract_status {
    pub const PROPOSAL: &str = "proposal";
    pub const OPEN: &str = "open";
    pub const CONCLUDED: &str = "concluded";
    pub const COMMISSION_RECEIVED: &str = "commission_received";
    pub const COMMISSION_MISSING: &str = "commission_missing";
    pub const CANCELLED: &str = "cancelled";
    pub const CHARGEBACK: &str = "chargeback";

    pub const ALL: &[&str] = &[
        PROPOSAL,
        OPEN,
        CONCLUDED,
        COMMISSION_RECEIVED,
        COMMISSION_MISSING,
        CANCELLED,
        CHARGEBACK,
    ];
}

/// Advisor role literals.
pub mod role {
    pub const ADVISOR: &str = "advisor";
    pub const TEAM_LEAD: &str = "team_lead";
    pub const BACK_OFFICE: &str = "back_office";

    pub const ALL: &[&str] = &[ADVISOR, TEAM_LEAD, BACK_OFFICE];
}
