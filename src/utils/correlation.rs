//! Correlation adjustment for same-game parlays.
//!
//! Legs from one game are not independent: a quarterback throwing for 300
//! yards makes his receiver's over more likely. The adjuster takes the naive
//! product of leg probabilities and shifts it by a covariance term built from
//! a single representative pairwise correlation `rho`:
//!
//! ```text
//! p_ind   = prod(p_i)
//! cov     = rho * mean_{i<j} sqrt(p_i (1 - p_i) p_j (1 - p_j))
//! p_joint = clamp(p_ind + cov)
//! ```
//!
//! For two legs this is the exact joint probability of two Bernoulli events
//! with Pearson correlation `rho`. For more legs it is a first-order
//! approximation, so the result is clamped into the Fréchet bounds
//! `[max(0, sum(p) - (n - 1)), min(p)]` and then into `[eps, 1 - eps]`.

use crate::error::{PricingError, PricingResult};
use crate::utils::odds::PROB_EPSILON;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Default pairwise correlations by stack type
pub const DEFAULT_CORRELATIONS: [(&str, f64); 9] = [
    ("QB_WR", 0.12),
    ("QB_TE", 0.092),
    ("RB_Team_TDs", 0.13),
    ("WR_WR", -0.016),
    ("Star_Team_Points", 0.25),
    ("Guard_Team_Assists", 0.18),
    ("Center_Team_Rebounds", 0.22),
    ("Teammate_Points", -0.08),
    ("Home_Performance", 0.12),
];

/// Either a named stack type or an explicit coefficient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationSpec {
    Tag(String),
    Rho(f64),
}

impl Default for CorrelationSpec {
    fn default() -> Self {
        CorrelationSpec::Rho(0.0)
    }
}

/// Result of a joint probability adjustment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointProbability {
    pub independent: f64,
    pub joint: f64,
    pub clamped: bool,
}

fn check_rho(rho: f64) -> PricingResult<f64> {
    if !rho.is_finite() || !(-1.0..=1.0).contains(&rho) {
        return Err(PricingError::InvalidCorrelation(rho));
    }
    Ok(rho)
}

/// Immutable tag -> rho table
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationTable {
    values: BTreeMap<String, f64>,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self {
            values: DEFAULT_CORRELATIONS
                .iter()
                .map(|(tag, rho)| (tag.to_string(), *rho))
                .collect(),
        }
    }
}

impl CorrelationTable {
    /// Add or replace a tag
    pub fn with_override(mut self, tag: impl Into<String>, rho: f64) -> PricingResult<Self> {
        self.values.insert(tag.into(), check_rho(rho)?);
        Ok(self)
    }

    pub fn lookup(&self, tag: &str) -> PricingResult<f64> {
        self.values
            .get(tag)
            .copied()
            .ok_or_else(|| PricingError::UnknownCorrelation(tag.to_string()))
    }

    pub fn resolve(&self, spec: &CorrelationSpec) -> PricingResult<f64> {
        match spec {
            CorrelationSpec::Tag(tag) => self.lookup(tag),
            CorrelationSpec::Rho(rho) => check_rho(*rho),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(tag, rho)| (tag.as_str(), *rho))
    }
}

/// Adjust the independent joint probability of `probs` for correlation `rho`
pub fn adjust_joint(probs: &[f64], rho: f64) -> PricingResult<JointProbability> {
    let rho = check_rho(rho)?;
    if probs.is_empty() {
        return Err(PricingError::EmptyPool(0));
    }
    for &p in probs {
        if !p.is_finite() || p <= 0.0 || p >= 1.0 {
            return Err(PricingError::InvalidProbability(p));
        }
    }

    let independent: f64 = probs.iter().product();

    let mut pair_sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..probs.len() {
        let var_i = probs[i] * (1.0 - probs[i]);
        for &p_j in &probs[i + 1..] {
            pair_sum += (var_i * p_j * (1.0 - p_j)).sqrt();
            pairs += 1;
        }
    }
    let cov = if pairs == 0 {
        0.0
    } else {
        rho * (pair_sum / pairs as f64)
    };
    let raw = independent + cov;

    let n = probs.len() as f64;
    let upper = probs.iter().copied().fold(1.0, f64::min);
    let lower = (probs.iter().sum::<f64>() - (n - 1.0)).max(0.0).min(upper);
    let joint = raw
        .clamp(lower, upper)
        .clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);

    let clamped = joint != raw;
    if clamped {
        debug!(raw, joint, rho, legs = probs.len(), "joint probability clamped");
    }

    Ok(JointProbability {
        independent,
        joint,
        clamped,
    })
}

/// Owns the correlation table and resolves tags before adjusting
#[derive(Debug, Clone, Default)]
pub struct CorrelationAdjuster {
    table: CorrelationTable,
}

impl CorrelationAdjuster {
    pub fn new(table: CorrelationTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    pub fn resolve(&self, spec: &CorrelationSpec) -> PricingResult<f64> {
        self.table.resolve(spec)
    }

    pub fn adjust_joint(
        &self,
        probs: &[f64],
        spec: &CorrelationSpec,
    ) -> PricingResult<JointProbability> {
        adjust_joint(probs, self.resolve(spec)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const GRID: [f64; 7] = [0.05, 0.2, 0.35, 0.5, 0.6, 0.8, 0.95];

    #[test]
    fn test_two_leg_independent() {
        let result = adjust_joint(&[0.60, 0.55], 0.0).unwrap();
        assert_abs_diff_eq!(result.joint, 0.33, epsilon = 1e-12);
        assert_eq!(result.joint, result.independent);
        assert!(!result.clamped);
    }

    #[test]
    fn test_two_leg_qb_wr_stack() {
        let adjuster = CorrelationAdjuster::default();
        let result = adjuster
            .adjust_joint(&[0.60, 0.55], &CorrelationSpec::Tag("QB_WR".to_string()))
            .unwrap();
        // 0.33 + 0.12 * sqrt(0.24 * 0.2475)
        assert_abs_diff_eq!(result.joint, 0.33 + 0.12 * 0.0594f64.sqrt(), epsilon = 1e-12);
        assert!((result.joint - 0.3593).abs() < 1e-4);
    }

    #[test]
    fn test_zero_rho_is_product() {
        for &a in &GRID {
            for &b in &GRID {
                for &c in &GRID {
                    let result = adjust_joint(&[a, b, c], 0.0).unwrap();
                    assert_abs_diff_eq!(result.joint, a * b * c, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_two_leg_frechet_identities() {
        for &a in &GRID {
            for &b in &GRID {
                let high = adjust_joint(&[a, b], 1.0).unwrap();
                assert_abs_diff_eq!(high.joint, a.min(b), epsilon = 1e-6);

                let low = adjust_joint(&[a, b], -1.0).unwrap();
                assert_abs_diff_eq!(low.joint, (a + b - 1.0).max(0.0), epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_monotone_in_rho() {
        let sets: [&[f64]; 3] = [&[0.6, 0.55], &[0.3, 0.7, 0.5], &[0.9, 0.85, 0.6, 0.4, 0.75]];
        for probs in sets {
            let mut previous = 0.0;
            for step in -20..=20 {
                let rho = step as f64 / 20.0;
                let joint = adjust_joint(probs, rho).unwrap().joint;
                assert!(joint >= previous, "rho {} joint {} < {}", rho, joint, previous);
                assert!((PROB_EPSILON..=1.0 - PROB_EPSILON).contains(&joint));
                previous = joint;
            }
        }
    }

    #[test]
    fn test_many_legs_extreme_rho_is_clamped() {
        let probs = [0.1; 12];
        let result = adjust_joint(&probs, -1.0).unwrap();
        assert!(result.clamped);
        assert_eq!(result.joint, PROB_EPSILON);

        // 0.162 + 0.11 overshoots the weakest leg
        let result = adjust_joint(&[0.2, 0.9, 0.9], 1.0).unwrap();
        assert!(result.clamped);
        assert_abs_diff_eq!(result.joint, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_single_leg_passes_through() {
        let result = adjust_joint(&[0.42], 0.5).unwrap();
        assert_abs_diff_eq!(result.joint, 0.42, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            adjust_joint(&[0.5, 1.0], 0.0),
            Err(PricingError::InvalidProbability(_))
        ));
        assert!(matches!(
            adjust_joint(&[0.5, 0.5], 1.5),
            Err(PricingError::InvalidCorrelation(_))
        ));
        assert!(matches!(adjust_joint(&[], 0.0), Err(PricingError::EmptyPool(0))));

        let adjuster = CorrelationAdjuster::default();
        assert!(matches!(
            adjuster.adjust_joint(&[0.5, 0.5], &CorrelationSpec::Tag("QB_K".to_string())),
            Err(PricingError::UnknownCorrelation(_))
        ));
    }

    #[test]
    fn test_table_overrides() {
        let table = CorrelationTable::default()
            .with_override("QB_WR", 0.2)
            .unwrap()
            .with_override("Pitcher_Ks", -0.1)
            .unwrap();
        assert_eq!(table.lookup("QB_WR").unwrap(), 0.2);
        assert_eq!(table.lookup("Pitcher_Ks").unwrap(), -0.1);
        assert_eq!(table.lookup("WR_WR").unwrap(), -0.016);
        assert!(CorrelationTable::default().with_override("QB_WR", 2.0).is_err());
        assert_eq!(CorrelationTable::default().iter().count(), 9);
    }
}
