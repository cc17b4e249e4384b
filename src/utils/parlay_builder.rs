use crate::error::{PricingError, PricingResult};
use crate::models::{Leg, Parlay};
use crate::utils::correlation::{adjust_joint, CorrelationAdjuster, CorrelationSpec};
use crate::utils::ev_calculator::price_legs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Largest parlay the builder will ever enumerate
pub const HARD_MAX_LEGS: usize = 20;

/// Most legs per game group a policy may keep for enumeration
pub const HARD_MAX_POOL_SIZE: usize = 40;

/// Constraints on which parlays get built and returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParlayPolicy {
    pub min_legs: usize,
    pub max_legs: usize,
    pub min_ev: f64, // Signed fraction, 0.05 = 5%
    pub min_leg_prob: f64,
    pub max_leg_prob: f64,
    /// None prices each combination at its dominant stack type
    pub correlation: Option<CorrelationSpec>,
    pub max_mutually_exclusive_collisions: usize,
    pub max_parlays_returned: usize,
    pub max_pool_size: usize,
    pub require_same_game: bool,
}

impl Default for ParlayPolicy {
    fn default() -> Self {
        Self {
            min_legs: 2,
            max_legs: 10,
            min_ev: 0.05,
            min_leg_prob: 0.05,
            max_leg_prob: 0.95,
            correlation: None,
            max_mutually_exclusive_collisions: 0,
            max_parlays_returned: 50,
            max_pool_size: 40,
            require_same_game: true,
        }
    }
}

impl ParlayPolicy {
    pub fn validate(&self) -> PricingResult<()> {
        if self.min_legs < 2 {
            return Err(PricingError::InvalidPolicy(format!(
                "min_legs must be at least 2, got {}",
                self.min_legs
            )));
        }
        if self.max_legs < self.min_legs || self.max_legs > HARD_MAX_LEGS {
            return Err(PricingError::InvalidPolicy(format!(
                "max_legs must be in [{}, {}], got {}",
                self.min_legs, HARD_MAX_LEGS, self.max_legs
            )));
        }
        if !self.min_ev.is_finite() {
            return Err(PricingError::InvalidPolicy(format!(
                "min_ev must be finite, got {}",
                self.min_ev
            )));
        }
        if !(self.min_leg_prob > 0.0
            && self.min_leg_prob <= self.max_leg_prob
            && self.max_leg_prob < 1.0)
        {
            return Err(PricingError::InvalidPolicy(format!(
                "leg probability window [{}, {}] must sit inside (0, 1)",
                self.min_leg_prob, self.max_leg_prob
            )));
        }
        if self.max_pool_size == 0 || self.max_pool_size > HARD_MAX_POOL_SIZE {
            return Err(PricingError::InvalidPolicy(format!(
                "max_pool_size must be in [1, {}], got {}",
                HARD_MAX_POOL_SIZE, self.max_pool_size
            )));
        }
        if self.max_parlays_returned == 0 {
            return Err(PricingError::InvalidPolicy(
                "max_parlays_returned must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counters describing what a build dropped and why
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDiagnostics {
    pub pool_size: usize,
    pub filtered_out: usize,
    pub pruned_exclusive: usize,
    pub truncated: usize,
    pub combinations_evaluated: usize,
    pub skipped_exclusive: usize,
    pub below_min_ev: usize,
    pub clamp_events: usize,
}

/// Ranked parlays plus diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayBuild {
    pub parlays: Vec<Parlay>,
    pub diagnostics: BuildDiagnostics,
}

/// A leg that survived filtering, with the numbers enumeration needs
struct Candidate<'a> {
    leg: &'a Leg,
    ev: f64,
    decimal: f64,
}

/// Enumerates and ranks parlays from a pool of legs
#[derive(Debug, Clone)]
pub struct ParlayBuilder {
    adjuster: CorrelationAdjuster,
    policy: ParlayPolicy,
    fixed_rho: Option<f64>,
}

impl ParlayBuilder {
    /// Validates the policy and resolves an explicit correlation up front
    pub fn new(adjuster: CorrelationAdjuster, policy: ParlayPolicy) -> PricingResult<Self> {
        policy.validate()?;
        let fixed_rho = match &policy.correlation {
            Some(spec) => Some(adjuster.resolve(spec)?),
            None => None,
        };
        Ok(Self {
            adjuster,
            policy,
            fixed_rho,
        })
    }

    /// Build every parlay the policy allows and return the best, highest EV first
    pub fn build(&self, pool: &[Leg]) -> PricingResult<ParlayBuild> {
        let mut diagnostics = BuildDiagnostics {
            pool_size: pool.len(),
            ..BuildDiagnostics::default()
        };

        let candidates = self.filter(pool, &mut diagnostics);

        let mut groups: BTreeMap<&str, Vec<Candidate>> = BTreeMap::new();
        for candidate in candidates {
            let game = if self.policy.require_same_game {
                candidate.leg.game_id.as_str()
            } else {
                ""
            };
            groups.entry(game).or_default().push(candidate);
        }

        let mut parlays = Vec::new();
        for (game, group) in groups {
            let group = self.prune_exclusive(group, &mut diagnostics);
            let group = self.cap_pool(game, group, &mut diagnostics);
            self.enumerate(&group, &mut parlays, &mut diagnostics)?;
        }

        sort_parlays(&mut parlays);
        parlays.truncate(self.policy.max_parlays_returned);

        info!(
            pool_size = diagnostics.pool_size,
            combinations = diagnostics.combinations_evaluated,
            clamp_events = diagnostics.clamp_events,
            returned = parlays.len(),
            "Parlay build complete"
        );

        Ok(ParlayBuild {
            parlays,
            diagnostics,
        })
    }

    /// Drop legs with malformed odds or a probability outside the policy window
    fn filter<'a>(
        &self,
        pool: &'a [Leg],
        diagnostics: &mut BuildDiagnostics,
    ) -> Vec<Candidate<'a>> {
        let mut candidates = Vec::with_capacity(pool.len());
        for leg in pool {
            let in_window = leg.probability >= self.policy.min_leg_prob
                && leg.probability <= self.policy.max_leg_prob;
            let priced = leg
                .validate()
                .and_then(|_| Ok((leg.expected_value()?, leg.decimal_odds()?)));
            match priced {
                Ok((ev, decimal)) if in_window => candidates.push(Candidate { leg, ev, decimal }),
                _ => {
                    debug!(leg = %leg.id, "Leg filtered from pool");
                    diagnostics.filtered_out += 1;
                }
            }
        }
        candidates
    }

    /// With no collisions allowed, keep only the best-EV leg of each exclusion class
    fn prune_exclusive<'a>(
        &self,
        group: Vec<Candidate<'a>>,
        diagnostics: &mut BuildDiagnostics,
    ) -> Vec<Candidate<'a>> {
        if self.policy.max_mutually_exclusive_collisions > 0 {
            return group;
        }

        let mut best: HashMap<(&str, &str, &str), usize> = HashMap::new();
        for (i, candidate) in group.iter().enumerate() {
            best.entry(candidate.leg.exclusion_key())
                .and_modify(|kept| {
                    if candidate.ev > group[*kept].ev {
                        *kept = i;
                    }
                })
                .or_insert(i);
        }

        let before = group.len();
        let kept: Vec<Candidate> = group
            .into_iter()
            .enumerate()
            .filter(|(i, candidate)| best.get(&candidate.leg.exclusion_key()) == Some(i))
            .map(|(_, candidate)| candidate)
            .collect();
        diagnostics.pruned_exclusive += before - kept.len();
        kept
    }

    /// Keep at most `max_pool_size` legs, preferring higher single-leg EV
    fn cap_pool<'a>(
        &self,
        game: &str,
        group: Vec<Candidate<'a>>,
        diagnostics: &mut BuildDiagnostics,
    ) -> Vec<Candidate<'a>> {
        let cap = self.policy.max_pool_size;
        if group.len() <= cap {
            return group;
        }

        let mut order: Vec<usize> = (0..group.len()).collect();
        order.sort_by(|&a, &b| {
            group[b]
                .ev
                .partial_cmp(&group[a].ev)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order.truncate(cap);
        order.sort_unstable();

        let dropped = group.len() - cap;
        warn!(game, dropped, cap, "Leg pool truncated to cap");
        diagnostics.truncated += dropped;

        let mut slots: Vec<Option<Candidate>> = group.into_iter().map(Some).collect();
        order.into_iter().filter_map(|i| slots[i].take()).collect()
    }

    fn enumerate(
        &self,
        group: &[Candidate],
        parlays: &mut Vec<Parlay>,
        diagnostics: &mut BuildDiagnostics,
    ) -> PricingResult<()> {
        let max_legs = self.policy.max_legs.min(group.len());
        let keep = self.policy.max_parlays_returned;

        for k in self.policy.min_legs..=max_legs {
            let mut indices: Vec<usize> = (0..k).collect();
            loop {
                diagnostics.combinations_evaluated += 1;
                let combo: Vec<&Candidate> = indices.iter().map(|&i| &group[i]).collect();
                if let Some(parlay) = self.evaluate(&combo, diagnostics)? {
                    parlays.push(parlay);
                    if parlays.len() > 2 * keep {
                        sort_parlays(parlays);
                        parlays.truncate(keep);
                    }
                }
                if !advance(&mut indices, group.len()) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Price one combination; None when it is skipped or falls short of `min_ev`
    fn evaluate(
        &self,
        combo: &[&Candidate],
        diagnostics: &mut BuildDiagnostics,
    ) -> PricingResult<Option<Parlay>> {
        let mut collisions = 0;
        for (i, a) in combo.iter().enumerate() {
            collisions += combo[i + 1..]
                .iter()
                .filter(|b| a.leg.is_exclusive_with(b.leg))
                .count();
        }
        if collisions > self.policy.max_mutually_exclusive_collisions {
            diagnostics.skipped_exclusive += 1;
            return Ok(None);
        }

        let rho = match self.fixed_rho {
            Some(rho) => rho,
            None => self.dominant_rho(combo)?,
        };

        let probs: Vec<f64> = combo.iter().map(|c| c.leg.probability).collect();
        let joint = adjust_joint(&probs, rho)?;
        if joint.clamped {
            diagnostics.clamp_events += 1;
        }

        let offered: f64 = combo.iter().map(|c| c.decimal).product();
        if !offered.is_finite() {
            return Err(PricingError::InvalidOdds(format!(
                "offered decimal for {} legs overflows",
                combo.len()
            )));
        }

        if joint.joint * offered - 1.0 < self.policy.min_ev {
            diagnostics.below_min_ev += 1;
            return Ok(None);
        }

        let legs: Vec<Leg> = combo.iter().map(|c| c.leg.clone()).collect();
        price_legs(&legs, rho).map(Some)
    }

    /// Default rho of the most common stack tag; ties go to the smallest tag
    fn dominant_rho(&self, combo: &[&Candidate]) -> PricingResult<f64> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for candidate in combo {
            if let Some(tag) = &candidate.leg.correlation_tag {
                *counts.entry(tag.as_str()).or_default() += 1;
            }
        }

        let mut dominant: Option<(&str, usize)> = None;
        for (tag, count) in counts {
            if dominant.map_or(true, |(_, best)| count > best) {
                dominant = Some((tag, count));
            }
        }

        match dominant {
            Some((tag, _)) => self.adjuster.table().lookup(tag),
            None => Ok(0.0),
        }
    }
}

/// EV descending, then joint probability descending, then fewer legs
fn sort_parlays(parlays: &mut [Parlay]) {
    parlays.sort_by(|a, b| {
        b.expected_value
            .partial_cmp(&a.expected_value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.joint_probability
                    .partial_cmp(&a.joint_probability)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.leg_count().cmp(&b.leg_count()))
    });
}

/// Step `indices` to the next k-combination of 0..n in lexicographic order
fn advance(indices: &mut [usize], n: usize) -> bool {
    let k = indices.len();
    let mut i = k;
    while i > 0 {
        i -= 1;
        if indices[i] < n - k + i {
            indices[i] += 1;
            for j in i + 1..k {
                indices[j] = indices[j - 1] + 1;
            }
            return true;
        }
    }
    false
}
