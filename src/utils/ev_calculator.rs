use crate::error::{PricingError, PricingResult};
use crate::models::{Leg, Parlay, ValueRating};
use crate::utils::correlation::{
    adjust_joint, CorrelationAdjuster, CorrelationSpec, CorrelationTable,
};
use crate::utils::odds::{ev, fair_odds, implied_probability, to_american_saturating};
use serde::{Deserialize, Serialize};

/// Single-leg comparison of our probability against a posted price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegComparison {
    pub implied_prob: f64,   // Implied probability from odds
    pub our_prob: f64,       // Probability from predictive model
    pub edge: f64,           // Difference between our prob and implied prob
    pub expected_value: f64, // EV as a signed fraction of stake
    pub rating: ValueRating,
}

/// Product of the legs' book decimals; fails if the product overflows
pub fn offered_decimal(legs: &[Leg]) -> PricingResult<f64> {
    let mut product = 1.0;
    for leg in legs {
        product *= leg.decimal_odds()?;
    }
    if !product.is_finite() {
        return Err(PricingError::InvalidOdds(format!(
            "offered decimal for {} legs overflows",
            legs.len()
        )));
    }
    Ok(product)
}

/// Price an ordered set of legs at a resolved correlation.
/// Long prices past the i32 American range saturate and set `odds_saturated`.
pub fn price_legs(legs: &[Leg], rho: f64) -> PricingResult<Parlay> {
    if legs.len() < 2 {
        return Err(PricingError::EmptyPool(legs.len()));
    }
    for leg in legs {
        leg.validate()?;
    }

    let probs: Vec<f64> = legs.iter().map(|leg| leg.probability).collect();
    let joint = adjust_joint(&probs, rho)?;
    let fair = fair_odds(joint.joint)?;
    let offered = offered_decimal(legs)?;
    let (offered_american, offered_saturated) = to_american_saturating(offered)?;
    let expected_value = joint.joint * offered - 1.0;

    let same_game = legs.iter().all(|leg| leg.game_id == legs[0].game_id);

    Ok(Parlay {
        legs: legs.to_vec(),
        correlation: rho,
        independent_probability: joint.independent,
        joint_probability: joint.joint,
        fair_decimal: fair.decimal,
        fair_american: fair.american,
        offered_decimal: offered,
        offered_american,
        expected_value,
        rating: ValueRating::from_ev(expected_value),
        same_game,
        clamped: joint.clamped,
        odds_saturated: fair.saturated || offered_saturated,
    })
}

/// Compare our probability for a single leg against the book
pub fn compare(our_prob: f64, book_american: i32) -> PricingResult<LegComparison> {
    let implied_prob = implied_probability(book_american)?;
    let expected_value = ev(our_prob, book_american)?;

    Ok(LegComparison {
        implied_prob,
        our_prob,
        edge: our_prob - implied_prob,
        expected_value,
        rating: ValueRating::from_ev(expected_value),
    })
}

/// Prices tickets the user already picked
#[derive(Debug, Clone, Default)]
pub struct EvCalculator {
    adjuster: CorrelationAdjuster,
}

impl EvCalculator {
    pub fn new(table: CorrelationTable) -> Self {
        Self {
            adjuster: CorrelationAdjuster::new(table),
        }
    }

    pub fn adjuster(&self) -> &CorrelationAdjuster {
        &self.adjuster
    }

    /// Price a ticket. Legs from the same equivalence class are rejected.
    pub fn price_ticket(
        &self,
        legs: &[Leg],
        correlation: &CorrelationSpec,
    ) -> PricingResult<Parlay> {
        if legs.len() < 2 {
            return Err(PricingError::EmptyPool(legs.len()));
        }
        for (i, leg) in legs.iter().enumerate() {
            if let Some(other) = legs[i + 1..].iter().find(|other| leg.is_exclusive_with(other)) {
                return Err(PricingError::MutuallyExclusive(leg.id.clone(), other.id.clone()));
            }
        }

        let rho = self.adjuster.resolve(correlation)?;
        price_legs(legs, rho)
    }

    pub fn compare(&self, our_prob: f64, book_american: i32) -> PricingResult<LegComparison> {
        compare(our_prob, book_american)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn legs(probs: &[f64], odds: i32) -> Vec<Leg> {
        probs
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                Leg::new(format!("leg{}", i), "KC@BUF", format!("p{}", i), "yards", p, odds)
            })
            .collect()
    }

    #[test]
    fn test_price_independent_ticket() {
        let calc = EvCalculator::default();
        let parlay = calc
            .price_ticket(&legs(&[0.60, 0.55], -110), &CorrelationSpec::Rho(0.0))
            .unwrap();

        assert_abs_diff_eq!(parlay.joint_probability, 0.33, epsilon = 1e-12);
        assert!((parlay.fair_decimal - 3.0303).abs() < 1e-4);
        assert_eq!(parlay.fair_american, 203);
        // (21/11)^2 = 3.6446
        assert_abs_diff_eq!(parlay.offered_decimal, (21.0f64 / 11.0).powi(2), epsilon = 1e-12);
        assert_eq!(parlay.offered_american, 264);
        assert_abs_diff_eq!(
            parlay.expected_value,
            0.33 * (21.0f64 / 11.0).powi(2) - 1.0,
            epsilon = 1e-12
        );
        assert_eq!(parlay.rating, ValueRating::Strong);
        assert!(parlay.same_game);
        assert!(!parlay.odds_saturated);
    }

    #[test]
    fn test_long_ticket_saturates_american_odds() {
        let parlay = price_legs(&legs(&[0.2; 10], 500), 0.0).unwrap();
        // 6^10 = 60466176 has no i32 American price
        assert_abs_diff_eq!(parlay.offered_decimal, 60466176.0, epsilon = 1e-3);
        assert_eq!(parlay.offered_american, i32::MAX);
        assert!(parlay.odds_saturated);
        // 1.2^10 - 1
        assert_abs_diff_eq!(parlay.expected_value, 1.2f64.powi(10) - 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_price_correlated_ticket() {
        let calc = EvCalculator::default();
        let qb_wr = CorrelationSpec::Tag("QB_WR".to_string());
        let parlay = calc.price_ticket(&legs(&[0.60, 0.55], 100), &qb_wr).unwrap();

        assert_abs_diff_eq!(parlay.correlation, 0.12, epsilon = 1e-12);
        assert!((parlay.joint_probability - 0.3593).abs() < 1e-4);
        assert_eq!(parlay.fair_american, 178);
        // 0.3592 * 4.0 - 1
        assert!((parlay.expected_value - 0.437).abs() < 1e-3);
    }

    #[test]
    fn test_ticket_errors() {
        let calc = EvCalculator::default();
        assert!(matches!(
            calc.price_ticket(&legs(&[0.6], 100), &CorrelationSpec::Rho(0.0)),
            Err(PricingError::EmptyPool(1))
        ));
        assert!(matches!(
            calc.price_ticket(&[], &CorrelationSpec::Rho(0.0)),
            Err(PricingError::EmptyPool(0))
        ));
        assert!(matches!(
            calc.price_ticket(
                &legs(&[0.6, 0.5], 100),
                &CorrelationSpec::Tag("nope".to_string())
            ),
            Err(PricingError::UnknownCorrelation(_))
        ));
        assert!(matches!(
            calc.price_ticket(&legs(&[0.6, 0.5], 50), &CorrelationSpec::Rho(0.0)),
            Err(PricingError::InvalidOdds(_))
        ));

        let mut same = legs(&[0.6, 0.5], 100);
        same[1].player_id = same[0].player_id.clone();
        assert!(matches!(
            calc.price_ticket(&same, &CorrelationSpec::Rho(0.0)),
            Err(PricingError::MutuallyExclusive(_, _))
        ));
    }

    #[test]
    fn test_offered_decimal_overflow_is_fatal() {
        let many = legs(&[0.5; 400], 10000);
        assert!(matches!(offered_decimal(&many), Err(PricingError::InvalidOdds(_))));
    }

    #[test]
    fn test_cross_game_ticket_is_flagged() {
        let mut ticket = legs(&[0.6, 0.5], 100);
        ticket[1].game_id = "DAL@PHI".to_string();
        let parlay = EvCalculator::default()
            .price_ticket(&ticket, &CorrelationSpec::Rho(0.0))
            .unwrap();
        assert!(!parlay.same_game);
    }

    #[test]
    fn test_compare() {
        let result = compare(0.60, 100).unwrap();
        assert_abs_diff_eq!(result.implied_prob, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(result.edge, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(result.expected_value, 0.2, epsilon = 1e-12);
        assert_eq!(result.rating, ValueRating::Strong);

        let result = compare(0.50, -110).unwrap();
        assert!(result.expected_value < 0.0);
        assert_eq!(result.rating, ValueRating::NoValue);

        let result = compare(0.54, -110).unwrap();
        // 0.54 * 21/11 - 1 = 0.031
        assert_eq!(result.rating, ValueRating::SlightEdge);

        assert!(compare(0.5, 10).is_err());
    }
}
