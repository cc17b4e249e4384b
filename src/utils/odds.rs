use crate::error::{PricingError, PricingResult};

/// Smallest distance from 0 and 1 a priced probability may sit at
pub const PROB_EPSILON: f64 = 1e-9;

/// Fair odds for a probability in both formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairOdds {
    pub decimal: f64,
    pub american: i32,
    pub saturated: bool, // American price clamped to the i32 range
}

fn check_american(odds: i32) -> PricingResult<()> {
    if odds.unsigned_abs() < 100 {
        return Err(PricingError::InvalidOdds(format!(
            "American odds {} have magnitude below 100",
            odds
        )));
    }
    Ok(())
}

fn check_probability(prob: f64) -> PricingResult<()> {
    if !prob.is_finite() || !(0.0..=1.0).contains(&prob) {
        return Err(PricingError::InvalidProbability(prob));
    }
    Ok(())
}

/// Convert American odds to decimal odds (total return per unit staked)
/// Positive odds (+150) mean you win $150 on a $100 bet -> 2.50
/// Negative odds (-200) mean you need to bet $200 to win $100 -> 1.50
pub fn to_decimal(american: i32) -> PricingResult<f64> {
    check_american(american)?;
    if american > 0 {
        Ok(1.0 + american as f64 / 100.0)
    } else {
        Ok(1.0 + 100.0 / american.unsigned_abs() as f64)
    }
}

/// Unrounded American odds for a decimal price
pub fn to_american_exact(decimal: f64) -> PricingResult<f64> {
    if !decimal.is_finite() || decimal <= 1.0 {
        return Err(PricingError::InvalidOdds(format!(
            "decimal odds {} must be finite and above 1.0",
            decimal
        )));
    }
    if decimal >= 2.0 {
        Ok((decimal - 1.0) * 100.0)
    } else {
        Ok(-100.0 / (decimal - 1.0))
    }
}

/// Convert decimal odds to American odds, rounded to the nearest integer.
/// Even money is always reported as +100.
pub fn to_american(decimal: f64) -> PricingResult<i32> {
    let exact = to_american_exact(decimal)?;
    let rounded = exact.round();
    if rounded.abs() > i32::MAX as f64 {
        return Err(PricingError::InvalidOdds(format!(
            "decimal odds {} overflow American odds",
            decimal
        )));
    }

    // Rounding can only land inside (-100, 100) at the even-money edge
    let american = rounded as i32;
    Ok(match american {
        a if a >= 100 || a <= -100 => a,
        a if a >= 0 => 100,
        _ => -100,
    })
}

/// Like `to_american`, but prices past the i32 range clamp to +/-i32::MAX.
/// The flag reports whether clamping happened.
pub fn to_american_saturating(decimal: f64) -> PricingResult<(i32, bool)> {
    let exact = to_american_exact(decimal)?;
    if exact.round().abs() > i32::MAX as f64 {
        let american = if exact > 0.0 { i32::MAX } else { -i32::MAX };
        return Ok((american, true));
    }
    Ok((to_american(decimal)?, false))
}

/// Convert American odds to implied probability
pub fn implied_probability(american: i32) -> PricingResult<f64> {
    check_american(american)?;
    if american > 0 {
        // For positive odds: 100 / (odds + 100)
        Ok(100.0 / (american as f64 + 100.0))
    } else {
        // For negative odds: |odds| / (|odds| + 100)
        let abs_odds = american.unsigned_abs() as f64;
        Ok(abs_odds / (abs_odds + 100.0))
    }
}

/// Fair decimal and American odds for a win probability.
/// A probability of 1 has no finite American price and fails with `Certain`.
pub fn fair_odds(prob: f64) -> PricingResult<FairOdds> {
    if !prob.is_finite() || prob <= 0.0 {
        return Err(PricingError::InvalidProbability(prob));
    }
    if prob >= 1.0 {
        return Err(PricingError::Certain(prob));
    }

    let decimal = 1.0 / prob;
    let (american, saturated) = to_american_saturating(decimal)?;
    Ok(FairOdds {
        decimal,
        american,
        saturated,
    })
}

/// Calculate expected value for a bet
/// EV = (probability of winning * amount won per bet)
///      - (probability of losing * amount lost per bet)
/// Returns EV as a signed fraction of the stake
pub fn ev(our_prob: f64, book_american: i32) -> PricingResult<f64> {
    check_probability(our_prob)?;
    let win_amount = to_decimal(book_american)? - 1.0;

    Ok(our_prob * win_amount - (1.0 - our_prob))
}

/// Read a snapshot price that may be American or decimal.
/// Magnitudes of 100 or more are American; values in (1, 100) are decimal.
pub fn price_to_american(price: f64) -> PricingResult<i32> {
    if !price.is_finite() {
        return Err(PricingError::InvalidOdds(format!("price {} is not finite", price)));
    }
    if price.abs() >= 100.0 {
        let american = price.round();
        if american.abs() > i32::MAX as f64 {
            return Err(PricingError::InvalidOdds(format!("price {} overflows", price)));
        }
        return Ok(american as i32);
    }
    if price > 1.0 {
        return to_american(price);
    }
    Err(PricingError::InvalidOdds(format!(
        "price {} is neither American nor decimal odds",
        price
    )))
}

/// Total implied probability minus one: the bookmaker's margin on a market
pub fn book_hold(odds: &[i32]) -> PricingResult<f64> {
    let total = odds
        .iter()
        .map(|&o| implied_probability(o))
        .sum::<PricingResult<f64>>()?;
    Ok(total - 1.0)
}

/// Strip the margin from a market by normalizing implied probabilities to sum to 1
pub fn no_vig_probabilities(odds: &[i32]) -> PricingResult<Vec<f64>> {
    let implied = odds
        .iter()
        .map(|&o| implied_probability(o))
        .collect::<PricingResult<Vec<f64>>>()?;
    let total: f64 = implied.iter().sum();
    if total <= 0.0 {
        return Err(PricingError::InvalidOdds("empty market".to_string()));
    }
    Ok(implied.into_iter().map(|p| p / total).collect())
}
