//! Three-way revenue split: advisor / team lead / agency.
//!
//! RULE: This is the only place split arithmetic lives. The matching engine
//! and every recomputation path call [`compute_split`] — shares are never
//! derived anywhere else.
//!
//! All arithmetic is in integer cents. Rounding happens once per derived
//! share (half away from zero, which is what `f64::round` does); the
//! remaining share is always produced by exact integer subtraction, so the
//! reconciliation invariant holds by construction and is still checked
//! before returning.

use crate::error::{EngineError, EngineResult};
use crate::types::{Cents, OverrideBasis};

/// A team lead's override configuration, as it applies to one commission.
#[derive(Debug, Clone, Copy)]
pub struct TeamLeadCut {
    pub override_rate: f64,
    pub basis: OverrideBasis,
}

/// The computed shares. `advisor + team_lead + agency == amount`, exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub advisor_cents: Cents,
    pub team_lead_cents: Cents,
    pub agency_cents: Cents,
}

/// Compute the three-way split for one commission amount.
///
/// `commission_rate` and `override_rate` are percentages in 0..=100.
/// Negative amounts (chargebacks) run through the identical formulas, but
/// the team lead's share is forced to 0 — team leads do not absorb
/// clawbacks — and the agency share re-derived from the advisor share.
pub fn compute_split(
    amount_cents: Cents,
    commission_rate: f64,
    team_lead: Option<TeamLeadCut>,
) -> EngineResult<Split> {
    check_rate("commission_rate", commission_rate)?;
    if let Some(cut) = team_lead {
        check_rate("override_rate", cut.override_rate)?;
    }

    let gross_raw = amount_cents as f64 * commission_rate / 100.0;
    let advisor_gross = round_cents(gross_raw);

    let split = if amount_cents < 0 {
        let advisor = advisor_gross;
        Split {
            advisor_cents: advisor,
            team_lead_cents: 0,
            agency_cents: amount_cents - advisor,
        }
    } else {
        let team_lead_cents = match team_lead {
            None => 0,
            Some(cut) => {
                let raw = match cut.basis {
                    OverrideBasis::AdvisorShare => gross_raw * cut.override_rate / 100.0,
                    OverrideBasis::GrossAmount => {
                        amount_cents as f64 * cut.override_rate / 100.0
                    }
                };
                // The override may never exceed the advisor's gross.
                round_cents(raw).clamp(0, advisor_gross)
            }
        };
        Split {
            advisor_cents: advisor_gross - team_lead_cents,
            team_lead_cents,
            agency_cents: amount_cents - advisor_gross,
        }
    };

    let sum = split.advisor_cents + split.team_lead_cents + split.agency_cents;
    if sum != amount_cents {
        return Err(EngineError::integrity(format!(
            "split shares sum to {sum} cents, amount is {amount_cents} cents"
        )));
    }
    Ok(split)
}

fn check_rate(name: &str, rate: f64) -> EngineResult<()> {
    if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
        return Err(EngineError::validation(format!(
            "{name} must be between 0 and 100, got {rate}"
        )));
    }
    Ok(())
}

/// Round half away from zero at the cent.
fn round_cents(raw: f64) -> Cents {
    raw.round() as Cents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cut(rate: f64, basis: OverrideBasis) -> Option<TeamLeadCut> {
        Some(TeamLeadCut {
            override_rate: rate,
            basis,
        })
    }

    #[test]
    fn advisor_share_basis_worked_example() {
        // rate 40, override 10 on advisor share, amount 1000.00
        let s = compute_split(100_000, 40.0, cut(10.0, OverrideBasis::AdvisorShare)).unwrap();
        assert_eq!(s.team_lead_cents, 4_000);
        assert_eq!(s.advisor_cents, 36_000);
        assert_eq!(s.agency_cents, 60_000);
    }

    #[test]
    fn gross_amount_basis_worked_example() {
        let s = compute_split(100_000, 40.0, cut(10.0, OverrideBasis::GrossAmount)).unwrap();
        assert_eq!(s.team_lead_cents, 10_000);
        assert_eq!(s.advisor_cents, 30_000);
        assert_eq!(s.agency_cents, 60_000);
    }

    #[test]
    fn no_team_lead_means_no_deduction() {
        let s = compute_split(100_000, 40.0, None).unwrap();
        assert_eq!(s.advisor_cents, 40_000);
        assert_eq!(s.team_lead_cents, 0);
        assert_eq!(s.agency_cents, 60_000);
    }

    #[test]
    fn override_is_clamped_to_advisor_gross() {
        // gross = 100.00 but 50% of the full amount would be 500.00
        let s = compute_split(100_000, 10.0, cut(50.0, OverrideBasis::GrossAmount)).unwrap();
        assert_eq!(s.team_lead_cents, 10_000);
        assert_eq!(s.advisor_cents, 0);
        assert_eq!(s.agency_cents, 90_000);
    }

    #[test]
    fn chargeback_reverses_shares_but_spares_the_team_lead() {
        let s = compute_split(-50_000, 40.0, cut(10.0, OverrideBasis::AdvisorShare)).unwrap();
        assert_eq!(s.advisor_cents, -20_000);
        assert_eq!(s.team_lead_cents, 0);
        assert_eq!(s.agency_cents, -30_000);
    }

    #[test]
    fn rounding_is_half_away_from_zero_once_per_share() {
        // 33.335% of 10.01 → gross_raw = 333.68335 cents → 334
        let s = compute_split(1_001, 33.335, None).unwrap();
        assert_eq!(s.advisor_cents, 334);
        assert_eq!(s.agency_cents, 667);

        // Negative mirror rounds away from zero too.
        let s = compute_split(-1_001, 33.335, None).unwrap();
        assert_eq!(s.advisor_cents, -334);
        assert_eq!(s.agency_cents, -667);
    }

    #[test]
    fn rate_out_of_range_is_a_validation_error() {
        assert!(matches!(
            compute_split(100, 101.0, None),
            Err(crate::error::EngineError::Validation(_))
        ));
        assert!(matches!(
            compute_split(100, -0.5, None),
            Err(crate::error::EngineError::Validation(_))
        ));
        assert!(matches!(
            compute_split(100, 50.0, cut(f64::NAN, OverrideBasis::AdvisorShare)),
            Err(crate::error::EngineError::Validation(_))
        ));
    }

    #[test]
    fn invariant_holds_across_rate_and_amount_grid() {
        let amounts: [Cents; 8] = [0, 1, -1, 99, 12_345, -12_345, 100_000, 999_999_99];
        for amount in amounts {
            for rate10 in 0..=1000 {
                let rate = rate10 as f64 / 10.0;
                for (override_rate, basis) in [
                    (0.0, OverrideBasis::AdvisorShare),
                    (7.5, OverrideBasis::AdvisorShare),
                    (100.0, OverrideBasis::AdvisorShare),
                    (7.5, OverrideBasis::GrossAmount),
                    (100.0, OverrideBasis::GrossAmount),
                ] {
                    let s = compute_split(
                        amount,
                        rate,
                        cut(override_rate, basis),
                    )
                    .unwrap();
                    assert_eq!(
                        s.advisor_cents + s.team_lead_cents + s.agency_cents,
                        amount,
                        "invariant broken for amount={amount} rate={rate} override={override_rate} basis={basis:?}"
                    );
                    if amount < 0 {
                        assert_eq!(s.team_lead_cents, 0, "team lead absorbed a clawback");
                    }
                }
            }
        }
    }
}
