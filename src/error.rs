use thiserror::Error;

/// Errors surfaced by the pricing engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    // Domain-range errors
    #[error("Invalid odds: {0}")]
    InvalidOdds(String),

    #[error("Invalid probability: {0}")]
    InvalidProbability(f64),

    #[error("Probability {0} is at the certain boundary")]
    Certain(f64),

    #[error("Ticket needs at least 2 legs, got {0}")]
    EmptyPool(usize),

    #[error("Legs {0} and {1} are mutually exclusive")]
    MutuallyExclusive(String, String),

    // Configuration errors
    #[error("Correlation {0} outside [-1, 1]")]
    InvalidCorrelation(f64),

    #[error("Unknown correlation tag: {0}")]
    UnknownCorrelation(String),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Unknown position: {0}")]
    UnknownPosition(String),

    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    // Lookup errors
    #[error("No leg for game {game_id}, player {player_id}, market {market}")]
    LegNotFound {
        game_id: String,
        player_id: String,
        market: String,
    },
}

pub type PricingResult<T> = std::result::Result<T, PricingError>;

impl PricingError {
    /// True for errors caused by a bad value rather than bad configuration
    pub fn is_domain_error(&self) -> bool {
        matches!(
            self,
            PricingError::InvalidOdds(_)
                | PricingError::InvalidProbability(_)
                | PricingError::Certain(_)
                | PricingError::EmptyPool(_)
                | PricingError::MutuallyExclusive(_, _)
        )
    }
}
