//! Context-adjusted projections for rebounds, blocks and steals.
//!
//! Each stat has an ordered table of rules. A rule whose predicate holds
//! multiplies the season average by its factor; rules are applied in table
//! order so floating-point results are reproducible. The product is rounded
//! to one decimal.

use crate::models::{GameContext, PlayerStats, Position, LEAGUE_AVG_PACE};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondaryStat {
    Rebounds,
    Blocks,
    Steals,
}

impl fmt::Display for SecondaryStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecondaryStat::Rebounds => "rebounds",
            SecondaryStat::Blocks => "blocks",
            SecondaryStat::Steals => "steals",
        };
        f.write_str(name)
    }
}

/// Everything a rule may look at
struct RuleInput<'a> {
    position: Position,
    defensive_rating: Option<f64>,
    ctx: &'a GameContext,
}

struct Rule {
    label: &'static str,
    applies: fn(&RuleInput) -> bool,
    factor: fn(&RuleInput) -> f64,
}

const fn rule(
    label: &'static str,
    applies: fn(&RuleInput) -> bool,
    factor: fn(&RuleInput) -> f64,
) -> Rule {
    Rule {
        label,
        applies,
        factor,
    }
}

static REBOUND_RULES: [Rule; 8] = [
    rule(
        "shootout_guard",
        |i| i.ctx.projected_total > 230.0 && i.position == Position::Guard,
        |_| 0.85,
    ),
    rule(
        "shootout_forward",
        |i| i.ctx.projected_total > 230.0 && i.position == Position::Forward,
        |_| 0.92,
    ),
    rule(
        "shootout_center",
        |i| i.ctx.projected_total > 230.0 && i.position == Position::Center,
        |_| 1.03,
    ),
    rule(
        "fast_pace_guard",
        |i| i.ctx.pace > 102.0 && i.position == Position::Guard,
        |_| 0.92,
    ),
    rule(
        "slow_pace_guard",
        |i| i.ctx.pace < 96.0 && i.position == Position::Guard,
        |_| 1.08,
    ),
    rule(
        "elite_center_teammate",
        |i| {
            i.ctx.has_elite_center
                && i.ctx.partner_reb_avg > 7.0
                && matches!(i.position, Position::Guard | Position::Forward)
        },
        |_| 0.88,
    ),
    rule(
        "opponent_strong_glass",
        |i| i.ctx.opp_reb_per_game > 45.0,
        |_| 0.92,
    ),
    rule(
        "opponent_weak_glass",
        |i| i.ctx.opp_reb_per_game < 42.0,
        |_| 1.08,
    ),
];

static BLOCK_RULES: [Rule; 6] = [
    rule("fast_pace", |i| i.ctx.pace > 102.0, |_| 1.08),
    rule("slow_pace", |i| i.ctx.pace < 96.0, |_| 0.92),
    rule("jump_shooting_opponent", |i| i.ctx.opp_three_rate > 40.0, |_| 0.85),
    rule("paint_heavy_opponent", |i| i.ctx.opp_paint_points > 50.0, |_| 1.15),
    rule("guard", |i| i.position == Position::Guard, |_| 0.90),
    rule("forward", |i| i.position == Position::Forward, |_| 0.95),
];

static STEAL_RULES: [Rule; 5] = [
    rule(
        "pace_scaling",
        |i| i.ctx.pace != LEAGUE_AVG_PACE,
        |i| i.ctx.pace / LEAGUE_AVG_PACE,
    ),
    rule("careless_opponent", |i| i.ctx.opp_to_per_game > 14.0, |_| 1.12),
    rule("secure_opponent", |i| i.ctx.opp_to_per_game < 12.0, |_| 0.88),
    rule(
        "strong_defender",
        |i| i.defensive_rating.is_some_and(|rating| rating < 105.0),
        |_| 1.05,
    ),
    rule(
        "weak_defender",
        |i| i.defensive_rating.is_some_and(|rating| rating > 115.0),
        |_| 0.95,
    ),
];

/// A rule that fired and the factor it contributed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFactor {
    pub label: String,
    pub factor: f64,
}

/// Projection with the factors that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatProjection {
    pub stat: SecondaryStat,
    pub base: f64,
    pub factors: Vec<AppliedFactor>,
    pub projection: f64,
}

impl StatProjection {
    /// Combined multiplier of every applied factor
    pub fn multiplier(&self) -> f64 {
        self.factors.iter().map(|f| f.factor).product()
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn rules_for(stat: SecondaryStat) -> &'static [Rule] {
    match stat {
        SecondaryStat::Rebounds => &REBOUND_RULES,
        SecondaryStat::Blocks => &BLOCK_RULES,
        SecondaryStat::Steals => &STEAL_RULES,
    }
}

/// Project a secondary stat for one player in one game context
pub fn project(stats: &PlayerStats, ctx: &GameContext, stat: SecondaryStat) -> StatProjection {
    let base = match stat {
        SecondaryStat::Rebounds => stats.rebounds,
        SecondaryStat::Blocks => stats.blocks,
        SecondaryStat::Steals => stats.steals,
    }
    .max(0.0);

    let input = RuleInput {
        position: stats.position,
        defensive_rating: stats.defensive_rating,
        ctx,
    };

    let mut value = base;
    let mut factors = Vec::new();
    for rule in rules_for(stat) {
        if (rule.applies)(&input) {
            let factor = (rule.factor)(&input);
            value *= factor;
            factors.push(AppliedFactor {
                label: rule.label.to_string(),
                factor,
            });
        }
    }

    StatProjection {
        stat,
        base,
        factors,
        projection: round_one_decimal(value),
    }
}

/// Stateless projector, kept as a value so leg sources can hold one
#[derive(Debug, Clone, Copy, Default)]
pub struct SecondaryStatAdjuster;

impl SecondaryStatAdjuster {
    pub fn project(
        &self,
        stats: &PlayerStats,
        ctx: &GameContext,
        stat: SecondaryStat,
    ) -> StatProjection {
        project(stats, ctx, stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn player(position: Position, rebounds: f64, blocks: f64, steals: f64) -> PlayerStats {
        PlayerStats {
            player_id: "p1".to_string(),
            name: String::new(),
            position,
            points: 20.0,
            rebounds,
            assists: 5.0,
            steals,
            blocks,
            threes: 2.0,
            defensive_rating: None,
        }
    }

    #[test]
    fn test_guard_with_elite_center() {
        let stats = player(Position::Guard, 4.9, 0.8, 2.0);
        let ctx = GameContext {
            projected_total: 228.5,
            pace: 100.0,
            has_elite_center: true,
            partner_reb_avg: 7.9,
            opp_reb_per_game: 43.6,
            ..GameContext::default()
        };

        let result = project(&stats, &ctx, SecondaryStat::Rebounds);
        assert_eq!(result.factors.len(), 1);
        assert_eq!(result.factors[0].label, "elite_center_teammate");
        assert_abs_diff_eq!(result.projection, 4.3, epsilon = 1e-9);
    }

    #[test]
    fn test_shootout_threshold_is_strict() {
        let stats = player(Position::Guard, 4.9, 0.8, 2.0);
        let ctx = GameContext {
            projected_total: 230.0,
            ..GameContext::default()
        };
        let rebounds = project(&stats, &ctx, SecondaryStat::Rebounds);
        assert_abs_diff_eq!(rebounds.projection, 4.9, epsilon = 1e-9);

        let ctx = GameContext {
            projected_total: 231.0,
            has_elite_center: true,
            partner_reb_avg: 7.9,
            ..GameContext::default()
        };
        // 4.9 * 0.85 * 0.88 = 3.665
        let rebounds = project(&stats, &ctx, SecondaryStat::Rebounds);
        assert_abs_diff_eq!(rebounds.projection, 3.7, epsilon = 1e-9);
    }

    #[test]
    fn test_center_rebounds_in_fast_shootout() {
        let stats = player(Position::Center, 11.0, 2.0, 1.0);
        let ctx = GameContext {
            projected_total: 238.0,
            pace: 104.0,
            opp_reb_per_game: 41.0,
            ..GameContext::default()
        };
        let result = project(&stats, &ctx, SecondaryStat::Rebounds);
        // Pace only moves guards; 11.0 * 1.03 * 1.08
        assert_abs_diff_eq!(result.multiplier(), 1.03 * 1.08, epsilon = 1e-12);
        assert_abs_diff_eq!(result.projection, 12.2, epsilon = 1e-9);
    }

    #[test]
    fn test_blocks_against_jump_shooters() {
        let stats = player(Position::Forward, 6.0, 1.5, 1.0);
        let ctx = GameContext {
            pace: 95.0,
            opp_three_rate: 42.0,
            ..GameContext::default()
        };
        let result = project(&stats, &ctx, SecondaryStat::Blocks);
        let labels: Vec<_> = result.factors.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["slow_pace", "jump_shooting_opponent", "forward"]);
        // 1.5 * 0.92 * 0.85 * 0.95 = 1.114
        assert_abs_diff_eq!(result.projection, 1.1, epsilon = 1e-9);
    }

    #[test]
    fn test_steals_scale_with_pace() {
        let mut stats = player(Position::Guard, 4.0, 0.3, 1.6);
        stats.defensive_rating = Some(103.0);
        let ctx = GameContext {
            pace: 105.0,
            opp_to_per_game: 15.0,
            ..GameContext::default()
        };
        let result = project(&stats, &ctx, SecondaryStat::Steals);
        // 1.6 * 1.05 * 1.12 * 1.05 = 1.9757
        assert_abs_diff_eq!(result.multiplier(), 1.05 * 1.12 * 1.05, epsilon = 1e-12);
        assert_abs_diff_eq!(result.projection, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_league_average_context_is_neutral() {
        let ctx = GameContext::default();
        for position in [Position::Guard, Position::Forward, Position::Center] {
            let stats = player(position, 7.3, 1.2, 1.4);
            let rebounds = project(&stats, &ctx, SecondaryStat::Rebounds);
            assert!(rebounds.factors.is_empty());
            assert_abs_diff_eq!(rebounds.projection, 7.3, epsilon = 1e-9);

            let steals = project(&stats, &ctx, SecondaryStat::Steals);
            assert!(steals.factors.is_empty());
            assert_abs_diff_eq!(steals.projection, 1.4, epsilon = 1e-9);
        }

        // Blocks carry a position factor; centers see no context factor at all
        let center = player(Position::Center, 9.0, 2.4, 0.7);
        let blocks = project(&center, &ctx, SecondaryStat::Blocks);
        assert!(blocks.factors.is_empty());
        assert_abs_diff_eq!(blocks.projection, 2.4, epsilon = 1e-9);
    }
}
