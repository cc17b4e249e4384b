use crate::error::{PricingError, PricingResult};
use crate::models::{
    BookLine, GameContext, Leg, LegQuote, PlayerStats, PredictionRecord, PropMarket,
};
use crate::utils::odds::PROB_EPSILON;
use crate::utils::secondary_stats::{SecondaryStat, SecondaryStatAdjuster};
use std::collections::HashMap;
use tracing::warn;

/// Minimum standard deviation for a projected stat line
pub const MIN_STD_DEV: f64 = 0.75;

/// Line a category must clear to count toward a double- or triple-double
const DOUBLE_DIGIT_LINE: f64 = 9.5;

/// Read-only access to per-leg win probabilities and book prices
pub trait LegProbabilitySource {
    fn get_leg(
        &self,
        game_id: &str,
        player_id: &str,
        market: &PropMarket,
    ) -> PricingResult<LegQuote>;
}

/// Resolve a list of requested props into legs
pub fn build_pool<S: LegProbabilitySource + ?Sized>(
    source: &S,
    requests: &[(String, String, PropMarket)],
) -> PricingResult<Vec<Leg>> {
    requests
        .iter()
        .map(|(game_id, player_id, market)| {
            let quote = source.get_leg(game_id, player_id, market)?;
            Ok(Leg::from_prop(game_id, player_id, market, quote))
        })
        .collect()
}

fn clamp_probability(prob: f64) -> f64 {
    prob.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON)
}

type LegKey = (String, String, String);

fn key(game_id: &str, player_id: &str, market: &str) -> LegKey {
    (game_id.to_string(), player_id.to_string(), market.to_string())
}

fn not_found(game_id: &str, player_id: &str, market: &PropMarket) -> PricingError {
    PricingError::LegNotFound {
        game_id: game_id.to_string(),
        player_id: player_id.to_string(),
        market: market.key(),
    }
}

/// Key a persisted row by its canonical market; unreadable markets are skipped
fn row_key(game_id: &str, player_id: &str, market: &str) -> Option<LegKey> {
    match market.parse::<PropMarket>() {
        Ok(parsed) => Some(key(game_id, player_id, &parsed.key())),
        Err(err) => {
            warn!(game_id, player_id, market, error = %err, "Skipping row with unknown market");
            None
        }
    }
}

fn index_lines(lines: Vec<BookLine>) -> HashMap<LegKey, i32> {
    lines
        .into_iter()
        .filter_map(|line| {
            row_key(&line.game_id, &line.player_id, &line.market)
                .map(|lookup| (lookup, line.american_odds))
        })
        .collect()
}

/// Leg source over persisted model predictions and posted book lines
#[derive(Debug, Clone, Default)]
pub struct PredictionBook {
    predictions: HashMap<LegKey, PredictionRecord>,
    lines: HashMap<LegKey, i32>,
}

impl PredictionBook {
    /// Later records for the same prop replace earlier ones
    pub fn new(predictions: Vec<PredictionRecord>, lines: Vec<BookLine>) -> Self {
        let predictions = predictions
            .into_iter()
            .filter_map(|record| {
                row_key(&record.game_id, &record.player_id, &record.market)
                    .map(|lookup| (lookup, record))
            })
            .collect();

        Self {
            predictions,
            lines: index_lines(lines),
        }
    }

    pub fn model_tag(&self, game_id: &str, player_id: &str, market: &PropMarket) -> Option<&str> {
        self.predictions
            .get(&key(game_id, player_id, &market.key()))
            .map(|record| record.model_tag.as_str())
    }
}

impl LegProbabilitySource for PredictionBook {
    fn get_leg(
        &self,
        game_id: &str,
        player_id: &str,
        market: &PropMarket,
    ) -> PricingResult<LegQuote> {
        let lookup = key(game_id, player_id, &market.key());
        let record = self
            .predictions
            .get(&lookup)
            .ok_or_else(|| not_found(game_id, player_id, market))?;
        let american_odds = *self
            .lines
            .get(&lookup)
            .ok_or_else(|| not_found(game_id, player_id, market))?;

        if !record.probability.is_finite() || !(0.0..=1.0).contains(&record.probability) {
            return Err(PricingError::InvalidProbability(record.probability));
        }
        crate::utils::odds::to_decimal(american_odds)?;

        Ok(LegQuote {
            probability: clamp_probability(record.probability),
            american_odds,
        })
    }
}

/// Variance of a stat line as a multiple of its mean
fn dispersion(market: &PropMarket) -> f64 {
    match market {
        PropMarket::PointsOver(_) => 2.0,
        PropMarket::PraOver(_) => 2.5,
        PropMarket::ReboundsOver(_) | PropMarket::AssistsOver(_) => 1.2,
        _ => 1.0,
    }
}

/// Probability a stat with the given projection lands above `line`.
/// Normal approximation with variance proportional to the projection, so the
/// result is monotone in the projection.
pub fn over_probability(projection: f64, line: f64, dispersion: f64) -> f64 {
    let std_dev = (dispersion * projection.max(0.0)).sqrt().max(MIN_STD_DEV);

    // P(X > line) where X ~ Normal(projection, std_dev)
    let z = (line - projection) / std_dev;
    1.0 - normal_cdf(z)
}

/// Approximation of the standard normal cumulative distribution function
/// Using the error function approximation
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Approximation of the error function using Abramowitz and Stegun formula
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

/// Leg source that prices props from season averages adjusted for game context
#[derive(Debug, Clone, Default)]
pub struct ProjectionSource {
    adjuster: SecondaryStatAdjuster,
    players: HashMap<(String, String), PlayerStats>,
    contexts: HashMap<String, GameContext>,
    lines: HashMap<LegKey, i32>,
}

impl ProjectionSource {
    pub fn new(lines: Vec<BookLine>) -> Self {
        Self {
            lines: index_lines(lines),
            ..Self::default()
        }
    }

    pub fn with_player(mut self, game_id: &str, stats: PlayerStats) -> Self {
        self.players
            .insert((game_id.to_string(), stats.player_id.clone()), stats);
        self
    }

    /// Games without a context are projected against league averages
    pub fn with_context(mut self, game_id: &str, ctx: GameContext) -> Self {
        self.contexts.insert(game_id.to_string(), ctx);
        self
    }

    /// Projected mean of the stat behind a market
    pub fn projection(&self, stats: &PlayerStats, ctx: &GameContext, market: &PropMarket) -> f64 {
        let secondary = |stat| self.adjuster.project(stats, ctx, stat).projection;
        match market {
            PropMarket::PointsOver(_) => stats.points,
            PropMarket::AssistsOver(_) => stats.assists,
            PropMarket::ThreesOver(_) => stats.threes,
            PropMarket::ReboundsOver(_) => secondary(SecondaryStat::Rebounds),
            PropMarket::BlocksOver(_) => secondary(SecondaryStat::Blocks),
            PropMarket::StealsOver(_) => secondary(SecondaryStat::Steals),
            PropMarket::PraOver(_) => {
                stats.points + secondary(SecondaryStat::Rebounds) + stats.assists
            }
            PropMarket::DoubleDouble | PropMarket::TripleDouble => stats.points,
        }
    }

    /// Model probability for a market, before clamping
    pub fn probability(&self, stats: &PlayerStats, ctx: &GameContext, market: &PropMarket) -> f64 {
        match market {
            PropMarket::DoubleDouble | PropMarket::TripleDouble => {
                // Categories treated as independent
                let [a, b, c] = [
                    PropMarket::PointsOver(DOUBLE_DIGIT_LINE),
                    PropMarket::ReboundsOver(DOUBLE_DIGIT_LINE),
                    PropMarket::AssistsOver(DOUBLE_DIGIT_LINE),
                ]
                .map(|m| {
                    let projection = self.projection(stats, ctx, &m);
                    over_probability(projection, DOUBLE_DIGIT_LINE, dispersion(&m))
                });

                if matches!(market, PropMarket::TripleDouble) {
                    a * b * c
                } else {
                    // At least two of three
                    a * b + a * c + b * c - 2.0 * a * b * c
                }
            }
            _ => {
                let line = market.line().unwrap_or(0.0);
                over_probability(self.projection(stats, ctx, market), line, dispersion(market))
            }
        }
    }
}

impl LegProbabilitySource for ProjectionSource {
    fn get_leg(
        &self,
        game_id: &str,
        player_id: &str,
        market: &PropMarket,
    ) -> PricingResult<LegQuote> {
        let stats = self
            .players
            .get(&(game_id.to_string(), player_id.to_string()))
            .ok_or_else(|| not_found(game_id, player_id, market))?;
        let american_odds = *self
            .lines
            .get(&key(game_id, player_id, &market.key()))
            .ok_or_else(|| not_found(game_id, player_id, market))?;
        crate::utils::odds::to_decimal(american_odds)?;

        let default_ctx = GameContext::default();
        let ctx = self.contexts.get(game_id).unwrap_or(&default_ctx);

        Ok(LegQuote {
            probability: clamp_probability(self.probability(stats, ctx, market)),
            american_odds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;
    use approx::assert_abs_diff_eq;

    fn line(game_id: &str, player_id: &str, market: &str, american_odds: i32) -> BookLine {
        BookLine {
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            market: market.to_string(),
            american_odds,
        }
    }

    fn guard() -> PlayerStats {
        PlayerStats {
            player_id: "sga".to_string(),
            name: "Guard".to_string(),
            position: Position::Guard,
            points: 30.5,
            rebounds: 4.9,
            assists: 6.2,
            steals: 2.0,
            blocks: 0.9,
            threes: 1.4,
            defensive_rating: Some(108.0),
        }
    }

    #[test]
    fn test_over_probability() {
        // Projection on the line is a coin flip
        assert_abs_diff_eq!(over_probability(10.0, 10.0, 1.0), 0.5, epsilon = 1e-6);
        assert!(over_probability(12.0, 9.5, 1.2) > 0.5);
        assert!(over_probability(4.3, 6.5, 1.2) < 0.5);
    }

    #[test]
    fn test_over_probability_monotone_in_projection() {
        for line in [0.5, 4.5, 9.5, 24.5] {
            let mut previous = 0.0;
            for step in 0..400 {
                let projection = step as f64 / 10.0;
                let prob = over_probability(projection, line, 1.2);
                assert!(prob >= previous - 1e-12, "line {} projection {}", line, projection);
                previous = prob;
            }
        }
    }

    #[test]
    fn test_prediction_book_lookup() {
        let book = PredictionBook::new(
            vec![PredictionRecord {
                player_id: "sga".to_string(),
                game_id: "OKC@DEN".to_string(),
                market: "points_over_29.5".to_string(),
                probability: 0.58,
                model_tag: "xgb_v3".to_string(),
            }],
            vec![line("OKC@DEN", "sga", "points_over_29.5", -115)],
        );

        let market = PropMarket::PointsOver(29.5);
        let quote = book.get_leg("OKC@DEN", "sga", &market).unwrap();
        assert_eq!(quote.american_odds, -115);
        assert_abs_diff_eq!(quote.probability, 0.58, epsilon = 1e-12);
        assert_eq!(book.model_tag("OKC@DEN", "sga", &market), Some("xgb_v3"));

        let missing = book.get_leg("OKC@DEN", "sga", &PropMarket::AssistsOver(6.5));
        assert!(matches!(missing, Err(PricingError::LegNotFound { .. })));
    }

    #[test]
    fn test_prediction_book_canonicalizes_markets() {
        let book = PredictionBook::new(
            vec![
                PredictionRecord {
                    player_id: "sga".to_string(),
                    game_id: "OKC@DEN".to_string(),
                    market: "Points_Over_24.50".to_string(),
                    probability: 0.61,
                    model_tag: "xgb_v3".to_string(),
                },
                PredictionRecord {
                    player_id: "sga".to_string(),
                    game_id: "OKC@DEN".to_string(),
                    market: "free_throws_over_6.5".to_string(),
                    probability: 0.5,
                    model_tag: "xgb_v3".to_string(),
                },
            ],
            vec![line("OKC@DEN", "sga", "POINTS_OVER_24.5", -125)],
        );

        let market: PropMarket = "Points_Over_24.50".parse().unwrap();
        let quote = book.get_leg("OKC@DEN", "sga", &market).unwrap();
        assert_eq!(quote.american_odds, -125);
        assert_abs_diff_eq!(quote.probability, 0.61, epsilon = 1e-12);

        let canonical = book.get_leg("OKC@DEN", "sga", &PropMarket::PointsOver(24.5));
        assert!(canonical.is_ok());
    }

    #[test]
    fn test_prediction_book_clamps_degenerate_probability() {
        let book = PredictionBook::new(
            vec![PredictionRecord {
                player_id: "jokic".to_string(),
                game_id: "g".to_string(),
                market: "triple_double".to_string(),
                probability: 1.0,
                model_tag: "poisson".to_string(),
            }],
            vec![line("g", "jokic", "triple_double", -150)],
        );
        let quote = book.get_leg("g", "jokic", &PropMarket::TripleDouble).unwrap();
        assert!(quote.probability < 1.0);
    }

    #[test]
    fn test_projection_source_uses_context() {
        let ctx = GameContext {
            projected_total: 228.5,
            has_elite_center: true,
            partner_reb_avg: 7.9,
            opp_reb_per_game: 43.6,
            ..GameContext::default()
        };
        let source = ProjectionSource::new(vec![
            line("OKC@DEN", "sga", "rebounds_over_4.5", 110),
            line("OKC@DEN", "sga", "points_over_29.5", -120),
        ])
        .with_player("OKC@DEN", guard())
        .with_context("OKC@DEN", ctx.clone());

        let rebounds = PropMarket::ReboundsOver(4.5);
        assert_abs_diff_eq!(source.projection(&guard(), &ctx, &rebounds), 4.3, epsilon = 1e-9);

        // 4.3 projected against a 4.5 line is just under a coin flip
        let quote = source.get_leg("OKC@DEN", "sga", &rebounds).unwrap();
        assert!(quote.probability < 0.5 && quote.probability > 0.4);

        let points = source
            .get_leg("OKC@DEN", "sga", &PropMarket::PointsOver(29.5))
            .unwrap();
        assert!(points.probability > 0.5);
    }

    #[test]
    fn test_double_and_triple_double() {
        let source = ProjectionSource::default();
        let ctx = GameContext::default();
        let mut big = guard();
        big.points = 26.0;
        big.rebounds = 12.5;
        big.assists = 9.0;

        let dd = source.probability(&big, &ctx, &PropMarket::DoubleDouble);
        let td = source.probability(&big, &ctx, &PropMarket::TripleDouble);
        assert!(dd > td);
        assert!(dd > 0.5 && dd < 1.0);
        assert!(td > 0.0);
    }

    #[test]
    fn test_build_pool() {
        let source = ProjectionSource::new(vec![
            line("g", "sga", "steals_over_1.5", 120),
            line("g", "sga", "assists_over_5.5", -130),
        ])
        .with_player("g", guard());

        let requests = vec![
            ("g".to_string(), "sga".to_string(), PropMarket::StealsOver(1.5)),
            ("g".to_string(), "sga".to_string(), PropMarket::AssistsOver(5.5)),
        ];
        let pool = build_pool(&source, &requests).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[0].market, "steals");
        assert_eq!(pool[0].selection, "over 1.5");
        assert_eq!(pool[1].american_odds, -130);

        let unknown = vec![(
            "g".to_string(),
            "nobody".to_string(),
            PropMarket::StealsOver(1.5),
        )];
        assert!(build_pool(&source, &unknown).is_err());
    }
}
