//! Engine configuration: suggestion scoring, matching confidences and
//! read-side limits. Defaults mirror the production scoring table; a JSON
//! file can override any subset.

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// Score table for ranked match suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionWeights {
    pub policy_number: i64,
    pub alternate_policy_number: i64,
    pub account_holder: i64,
    pub account_holder_partial: i64,
}

impl Default for SuggestionWeights {
    fn default() -> Self {
        Self {
            policy_number: 100,
            alternate_policy_number: 90,
            account_holder: 70,
            account_holder_partial: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub suggestion: SuggestionWeights,
    /// Maximum candidates returned per suggestion query.
    pub suggestion_limit: usize,
    /// Confidence recorded for cross-source consultation matches.
    pub consultation_confidence: f64,
    /// Rows returned by the per-advisor recent-commission view.
    pub recent_commission_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            suggestion: SuggestionWeights::default(),
            suggestion_limit: 10,
            consultation_confidence: 0.85,
            recent_commission_limit: 50,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_scoring_table() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.suggestion.policy_number, 100);
        assert_eq!(cfg.suggestion.alternate_policy_number, 90);
        assert_eq!(cfg.suggestion.account_holder, 70);
        assert_eq!(cfg.suggestion.account_holder_partial, 40);
        assert!((cfg.consultation_confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_json_overrides_keep_defaults_elsewhere() {
        let cfg = EngineConfig::from_json(r#"{"suggestion_limit": 5}"#).unwrap();
        assert_eq!(cfg.suggestion_limit, 5);
        assert_eq!(cfg.suggestion.policy_number, 100);
    }
}
