use crate::error::PricingResult;
use crate::models::Leg;
use crate::utils::odds::{book_hold, implied_probability, no_vig_probabilities, price_to_american};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Odds-history snapshot for one game, as written by the snapshotter.
/// Prices may be American or decimal; they are converted when read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub sport: String,
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub markets: SnapshotMarkets,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotMarkets {
    #[serde(default)]
    pub moneyline: Option<MoneylineMarket>,
    #[serde(default)]
    pub spreads: Option<SpreadMarket>,
    #[serde(default)]
    pub totals: Option<TotalMarket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneylineMarket {
    pub home: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointPrice {
    pub point: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadMarket {
    pub home: PointPrice,
    pub away: PointPrice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalMarket {
    pub over: PointPrice,
    pub under: PointPrice,
}

/// One posted price from a snapshot, normalized to American odds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookPrice {
    pub game_id: String,
    pub market: String,    // "moneyline", "spread" or "total"
    pub selection: String, // "home", "away", "over" or "under"
    pub point: Option<f64>,
    pub american_odds: i32,
    pub implied_prob: f64,
}

impl BookPrice {
    fn new(
        game_id: &str,
        market: &str,
        selection: &str,
        point: Option<f64>,
        price: f64,
    ) -> PricingResult<Self> {
        let american_odds = price_to_american(price)?;
        Ok(Self {
            game_id: game_id.to_string(),
            market: market.to_string(),
            selection: selection.to_string(),
            point,
            american_odds,
            implied_prob: implied_probability(american_odds)?,
        })
    }

    /// Selection with its line; only spreads carry a sign
    pub fn label(&self) -> String {
        match (self.market.as_str(), self.point) {
            ("spread", Some(point)) => format!("{} {:+}", self.selection, point),
            (_, Some(point)) => format!("{} {}", self.selection, point),
            (_, None) => self.selection.clone(),
        }
    }

    /// Turn the posted price into a team/game-level leg priced with our probability
    pub fn into_leg(self, probability: f64) -> Leg {
        let selection = self.label();
        Leg::new(
            format!("{}:{}:{}", self.game_id, self.market, self.selection),
            self.game_id,
            "",
            self.market,
            probability,
            self.american_odds,
        )
        .with_selection(selection)
    }
}

/// Bookmaker hold on a two-way market and its de-vigged probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketHold {
    pub market: String,
    pub hold: f64,
    pub no_vig: [f64; 2],
}

impl OddsSnapshot {
    /// Flatten every posted price into a `BookPrice` row
    pub fn book_prices(&self) -> PricingResult<Vec<BookPrice>> {
        let id = self.game_id.as_str();
        let mut prices = Vec::new();

        if let Some(ml) = &self.markets.moneyline {
            prices.push(BookPrice::new(id, "moneyline", "home", None, ml.home)?);
            prices.push(BookPrice::new(id, "moneyline", "away", None, ml.away)?);
        }
        if let Some(spreads) = &self.markets.spreads {
            let (home, away) = (&spreads.home, &spreads.away);
            prices.push(BookPrice::new(id, "spread", "home", Some(home.point), home.price)?);
            prices.push(BookPrice::new(id, "spread", "away", Some(away.point), away.price)?);
        }
        if let Some(totals) = &self.markets.totals {
            let (over, under) = (&totals.over, &totals.under);
            prices.push(BookPrice::new(id, "total", "over", Some(over.point), over.price)?);
            prices.push(BookPrice::new(id, "total", "under", Some(under.point), under.price)?);
        }

        Ok(prices)
    }

    /// Hold and no-vig probabilities for each two-way market present
    pub fn market_holds(&self) -> PricingResult<Vec<MarketHold>> {
        let prices = self.book_prices()?;
        let mut holds = Vec::new();

        for pair in prices.chunks(2) {
            let odds = [pair[0].american_odds, pair[1].american_odds];
            let no_vig = no_vig_probabilities(&odds)?;
            holds.push(MarketHold {
                market: pair[0].market.clone(),
                hold: book_hold(&odds)?,
                no_vig: [no_vig[0], no_vig[1]],
            });
        }

        Ok(holds)
    }

    /// Every posted price as a leg at its de-vigged probability
    pub fn no_vig_legs(&self) -> PricingResult<Vec<Leg>> {
        let mut legs = Vec::new();
        for pair in self.book_prices()?.chunks(2) {
            let no_vig = no_vig_probabilities(&[pair[0].american_odds, pair[1].american_odds])?;
            for (price, probability) in pair.iter().zip(no_vig) {
                legs.push(price.clone().into_leg(probability));
            }
        }
        Ok(legs)
    }
}
