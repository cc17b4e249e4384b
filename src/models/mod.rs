use crate::error::{PricingError, PricingResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod snapshot;

pub use snapshot::{BookPrice, OddsSnapshot};

/// League-average game environment, used as `GameContext` defaults
pub const LEAGUE_AVG_PACE: f64 = 100.0;
pub const LEAGUE_AVG_TOTAL: f64 = 225.0;
pub const LEAGUE_AVG_REBOUNDS: f64 = 43.5;
pub const LEAGUE_AVG_BLOCKS: f64 = 5.0;
pub const LEAGUE_AVG_STEALS: f64 = 7.8;
pub const LEAGUE_AVG_THREE_RATE: f64 = 36.0;
pub const LEAGUE_AVG_PAINT_POINTS: f64 = 48.0;
pub const LEAGUE_AVG_TURNOVERS: f64 = 13.0;

/// Basketball position, collapsed to the three buckets the adjusters use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Position {
    Guard,
    Forward,
    Center,
}

impl FromStr for Position {
    type Err = PricingError;

    /// "PG"/"SG" -> Guard, "SF"/"PF" -> Forward. Hybrid listings ("G-F") use the first slot.
    fn from_str(s: &str) -> PricingResult<Self> {
        let primary = s.trim().split(['-', '/']).next().unwrap_or("").to_uppercase();
        match primary.as_str() {
            "G" | "PG" | "SG" => Ok(Position::Guard),
            "F" | "SF" | "PF" => Ok(Position::Forward),
            "C" => Ok(Position::Center),
            _ => Err(PricingError::UnknownPosition(s.to_string())),
        }
    }
}

impl TryFrom<String> for Position {
    type Error = PricingError;

    fn try_from(value: String) -> PricingResult<Self> {
        value.parse()
    }
}

impl From<Position> for String {
    fn from(position: Position) -> Self {
        position.to_string()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Position::Guard => "G",
            Position::Forward => "F",
            Position::Center => "C",
        };
        f.write_str(code)
    }
}

/// Player prop markets the leg sources know how to price.
/// Parameterized variants carry the line (e.g. 24.5 for "over 24.5 points").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PropMarket {
    PointsOver(f64),
    ReboundsOver(f64),
    AssistsOver(f64),
    ThreesOver(f64),
    PraOver(f64),
    BlocksOver(f64),
    StealsOver(f64),
    DoubleDouble,
    TripleDouble,
}

impl PropMarket {
    /// Market family; legs sharing a family for the same player are mutually exclusive
    pub fn family(&self) -> &'static str {
        match self {
            PropMarket::PointsOver(_) => "points",
            PropMarket::ReboundsOver(_) => "rebounds",
            PropMarket::AssistsOver(_) => "assists",
            PropMarket::ThreesOver(_) => "threes",
            PropMarket::PraOver(_) => "pra",
            PropMarket::BlocksOver(_) => "blocks",
            PropMarket::StealsOver(_) => "steals",
            PropMarket::DoubleDouble => "double_double",
            PropMarket::TripleDouble => "triple_double",
        }
    }

    pub fn line(&self) -> Option<f64> {
        match *self {
            PropMarket::PointsOver(k)
            | PropMarket::ReboundsOver(k)
            | PropMarket::AssistsOver(k)
            | PropMarket::ThreesOver(k)
            | PropMarket::PraOver(k)
            | PropMarket::BlocksOver(k)
            | PropMarket::StealsOver(k) => Some(k),
            PropMarket::DoubleDouble | PropMarket::TripleDouble => None,
        }
    }

    pub fn selection(&self) -> String {
        match self.line() {
            Some(k) => format!("over {}", k),
            None => "yes".to_string(),
        }
    }

    /// Lookup key used by prediction records and book lines, e.g. "points_over_24.5"
    pub fn key(&self) -> String {
        match self.line() {
            Some(k) => format!("{}_over_{}", self.family(), k),
            None => self.family().to_string(),
        }
    }
}

impl fmt::Display for PropMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for PropMarket {
    type Err = PricingError;

    fn from_str(s: &str) -> PricingResult<Self> {
        let key = s.trim().to_lowercase();
        match key.as_str() {
            "double_double" => return Ok(PropMarket::DoubleDouble),
            "triple_double" => return Ok(PropMarket::TripleDouble),
            _ => {}
        }

        let (family, line) = key
            .split_once("_over_")
            .ok_or_else(|| PricingError::UnknownMarket(s.to_string()))?;
        let line: f64 = line
            .parse()
            .map_err(|_| PricingError::UnknownMarket(s.to_string()))?;
        if !line.is_finite() || line < 0.0 {
            return Err(PricingError::UnknownMarket(s.to_string()));
        }

        match family {
            "points" => Ok(PropMarket::PointsOver(line)),
            "rebounds" => Ok(PropMarket::ReboundsOver(line)),
            "assists" => Ok(PropMarket::AssistsOver(line)),
            "threes" => Ok(PropMarket::ThreesOver(line)),
            "pra" => Ok(PropMarket::PraOver(line)),
            "blocks" => Ok(PropMarket::BlocksOver(line)),
            "steals" => Ok(PropMarket::StealsOver(line)),
            _ => Err(PricingError::UnknownMarket(s.to_string())),
        }
    }
}

impl TryFrom<String> for PropMarket {
    type Error = PricingError;

    fn try_from(value: String) -> PricingResult<Self> {
        value.parse()
    }
}

impl From<PropMarket> for String {
    fn from(market: PropMarket) -> Self {
        market.key()
    }
}

/// Probability and book price for one leg, as returned by a leg source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegQuote {
    pub probability: f64,
    pub american_odds: i32, // American odds format (e.g., -110, +150)
}

/// One atomic wager inside a parlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub id: String,
    pub game_id: String,
    #[serde(default)]
    pub player_id: String, // Empty for team and game markets
    pub market: String,    // Market family, e.g. "rebounds", "moneyline"
    #[serde(default)]
    pub selection: String, // e.g. "over 9.5", "home"
    pub probability: f64,
    pub american_odds: i32,
    #[serde(default)]
    pub correlation_tag: Option<String>,
}

impl Leg {
    pub fn new(
        id: impl Into<String>,
        game_id: impl Into<String>,
        player_id: impl Into<String>,
        market: impl Into<String>,
        probability: f64,
        american_odds: i32,
    ) -> Self {
        Self {
            id: id.into(),
            game_id: game_id.into(),
            player_id: player_id.into(),
            market: market.into(),
            selection: String::new(),
            probability,
            american_odds,
            correlation_tag: None,
        }
    }

    /// Build a leg from a prop market and the quote a leg source returned for it
    pub fn from_prop(
        game_id: &str,
        player_id: &str,
        market: &PropMarket,
        quote: LegQuote,
    ) -> Self {
        Self {
            id: format!("{}:{}:{}", game_id, player_id, market.key()),
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            market: market.family().to_string(),
            selection: market.selection(),
            probability: quote.probability,
            american_odds: quote.american_odds,
            correlation_tag: None,
        }
    }

    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = selection.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.correlation_tag = Some(tag.into());
        self
    }

    /// Legs sharing this key can never all win together
    pub fn exclusion_key(&self) -> (&str, &str, &str) {
        (&self.game_id, &self.player_id, &self.market)
    }

    pub fn is_exclusive_with(&self, other: &Leg) -> bool {
        self.exclusion_key() == other.exclusion_key()
    }

    /// Check the probability is strictly inside (0, 1) and the odds are well-formed
    pub fn validate(&self) -> PricingResult<()> {
        if !self.probability.is_finite() || self.probability <= 0.0 || self.probability >= 1.0 {
            return Err(PricingError::InvalidProbability(self.probability));
        }
        crate::utils::odds::to_decimal(self.american_odds)?;
        Ok(())
    }

    pub fn decimal_odds(&self) -> PricingResult<f64> {
        crate::utils::odds::to_decimal(self.american_odds)
    }

    /// Single-leg EV as a signed fraction of stake
    pub fn expected_value(&self) -> PricingResult<f64> {
        crate::utils::odds::ev(self.probability, self.american_odds)
    }
}

/// Value bucket derived from an EV fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueRating {
    Strong,
    Good,
    SlightEdge,
    NoValue,
}

impl ValueRating {
    pub fn from_ev(ev: f64) -> Self {
        if ev > 0.10 {
            ValueRating::Strong
        } else if ev > 0.05 {
            ValueRating::Good
        } else if ev > 0.0 {
            ValueRating::SlightEdge
        } else {
            ValueRating::NoValue
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueRating::Strong => "STRONG",
            ValueRating::Good => "GOOD",
            ValueRating::SlightEdge => "SLIGHT_EDGE",
            ValueRating::NoValue => "NO_VALUE",
        }
    }
}

impl fmt::Display for ValueRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A priced parlay. Owns its own copy of every leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parlay {
    pub legs: Vec<Leg>,
    pub correlation: f64,             // Representative pairwise rho used for pricing
    pub independent_probability: f64, // Product of leg probabilities
    pub joint_probability: f64,       // Correlation-adjusted
    pub fair_decimal: f64,
    pub fair_american: i32,
    pub offered_decimal: f64, // Product of leg book decimals
    pub offered_american: i32,
    pub expected_value: f64, // Signed fraction of stake
    pub rating: ValueRating,
    pub same_game: bool,
    pub clamped: bool,
    #[serde(default)]
    pub odds_saturated: bool, // An American price hit the i32 range
}

impl Parlay {
    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }

    pub fn leg_ids(&self) -> String {
        self.legs
            .iter()
            .map(|leg| leg.id.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    }

    /// Format the parlay as a readable string
    pub fn format(&self) -> String {
        format!(
            "{} | Joint: {:.1}% | Fair: {:.2} ({:+}) | Book: {:.2} ({:+}) | EV: {:+.2}% | {}",
            self.leg_ids(),
            self.joint_probability * 100.0,
            self.fair_decimal,
            self.fair_american,
            self.offered_decimal,
            self.offered_american,
            self.expected_value * 100.0,
            self.rating
        )
    }
}

/// Season averages for one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub player_id: String,
    #[serde(default)]
    pub name: String,
    pub position: Position,
    pub points: f64,
    pub rebounds: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    #[serde(default)]
    pub threes: f64,
    #[serde(default)]
    pub defensive_rating: Option<f64>,
}

/// Game environment for one game in one prediction run.
/// Missing fields fall back to league averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameContext {
    pub projected_total: f64,
    pub pace: f64,
    pub has_elite_center: bool,
    pub partner_reb_avg: f64,
    pub opp_three_rate: f64, // Percent of field goal attempts from three
    pub opp_paint_points: f64,
    pub opp_to_per_game: f64,
    pub opp_reb_per_game: f64,
}

impl Default for GameContext {
    fn default() -> Self {
        Self {
            projected_total: LEAGUE_AVG_TOTAL,
            pace: LEAGUE_AVG_PACE,
            has_elite_center: false,
            partner_reb_avg: 0.0,
            opp_three_rate: LEAGUE_AVG_THREE_RATE,
            opp_paint_points: LEAGUE_AVG_PAINT_POINTS,
            opp_to_per_game: LEAGUE_AVG_TURNOVERS,
            opp_reb_per_game: LEAGUE_AVG_REBOUNDS,
        }
    }
}

/// Persisted model output for one prop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub player_id: String,
    pub game_id: String,
    pub market: String, // PropMarket key, e.g. "rebounds_over_9.5"
    pub probability: f64,
    pub model_tag: String,
}

/// A sportsbook's posted price for one prop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLine {
    pub game_id: String,
    pub player_id: String,
    pub market: String,
    pub american_odds: i32,
}
