use crate::error::{PricingError, PricingResult};
use crate::utils::correlation::{CorrelationSpec, CorrelationTable};
use crate::utils::parlay_builder::ParlayPolicy;
use clap::Args;

/// Parlay policy flags, each readable from the environment
#[derive(Args, Debug, Clone)]
pub struct PolicyArgs {
    /// Fewest legs per parlay
    #[arg(long, env = "SGP_MIN_LEGS", default_value = "2")]
    pub min_legs: usize,

    /// Most legs per parlay (hard cap 20)
    #[arg(long, env = "SGP_MAX_LEGS", default_value = "10")]
    pub max_legs: usize,

    /// Minimum parlay EV as a fraction (e.g. 0.05 = 5%)
    #[arg(long, env = "SGP_MIN_EV", default_value = "0.05", allow_negative_numbers = true)]
    pub min_ev: f64,

    /// Drop legs less likely than this
    #[arg(long, env = "SGP_MIN_LEG_PROB", default_value = "0.05")]
    pub min_leg_prob: f64,

    /// Drop legs more likely than this
    #[arg(long, env = "SGP_MAX_LEG_PROB", default_value = "0.95")]
    pub max_leg_prob: f64,

    /// Stack tag (e.g. QB_WR) or explicit rho; omit to use each parlay's dominant tag
    #[arg(long, env = "SGP_CORRELATION", allow_negative_numbers = true)]
    pub correlation: Option<String>,

    /// Mutually exclusive leg pairs allowed in one parlay
    #[arg(long, env = "SGP_MAX_COLLISIONS", default_value = "0")]
    pub max_collisions: usize,

    /// Parlays to return
    #[arg(long, env = "SGP_MAX_PARLAYS", default_value = "50")]
    pub max_parlays: usize,

    /// Legs per game kept for enumeration (hard cap 40)
    #[arg(long, env = "SGP_MAX_POOL_SIZE", default_value = "40")]
    pub max_pool_size: usize,

    /// Combine legs from different games
    #[arg(long, env = "SGP_ALLOW_CROSS_GAME")]
    pub allow_cross_game: bool,
}

impl PolicyArgs {
    pub fn into_policy(&self) -> PricingResult<ParlayPolicy> {
        let policy = ParlayPolicy {
            min_legs: self.min_legs,
            max_legs: self.max_legs,
            min_ev: self.min_ev,
            min_leg_prob: self.min_leg_prob,
            max_leg_prob: self.max_leg_prob,
            correlation: self.correlation.as_deref().map(parse_correlation_spec),
            max_mutually_exclusive_collisions: self.max_collisions,
            max_parlays_returned: self.max_parlays,
            max_pool_size: self.max_pool_size,
            require_same_game: !self.allow_cross_game,
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Correlation table overrides
#[derive(Args, Debug, Clone, Default)]
pub struct CorrelationArgs {
    /// Comma-separated TAG=rho pairs layered onto the defaults, e.g. "QB_WR=0.15,WR_WR=-0.02"
    #[arg(long, env = "SGP_CORRELATIONS")]
    pub correlations: Option<String>,
}

impl CorrelationArgs {
    pub fn table(&self) -> PricingResult<CorrelationTable> {
        correlation_table(self.correlations.as_deref())
    }
}

/// A number is an explicit rho; anything else names a stack tag
pub fn parse_correlation_spec(value: &str) -> CorrelationSpec {
    let value = value.trim();
    match value.parse::<f64>() {
        Ok(rho) => CorrelationSpec::Rho(rho),
        Err(_) => CorrelationSpec::Tag(value.to_string()),
    }
}

/// Parse "TAG=rho,TAG=rho" into pairs
pub fn parse_correlation_overrides(value: &str) -> PricingResult<Vec<(String, f64)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (tag, rho) = entry.split_once('=').ok_or_else(|| {
                PricingError::InvalidPolicy(format!(
                    "correlation override '{}' is not TAG=rho",
                    entry
                ))
            })?;
            let tag = tag.trim();
            if tag.is_empty() {
                return Err(PricingError::InvalidPolicy(format!(
                    "correlation override '{}' has no tag",
                    entry
                )));
            }
            let rho = rho.trim().parse::<f64>().map_err(|_| {
                PricingError::InvalidPolicy(format!(
                    "correlation override '{}' has no numeric rho",
                    entry
                ))
            })?;
            Ok((tag.to_string(), rho))
        })
        .collect()
}

/// Default table with any overrides applied
pub fn correlation_table(overrides: Option<&str>) -> PricingResult<CorrelationTable> {
    let mut table = CorrelationTable::default();
    if let Some(overrides) = overrides {
        for (tag, rho) in parse_correlation_overrides(overrides)? {
            table = table.with_override(tag, rho)?;
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        policy: PolicyArgs,
        #[command(flatten)]
        correlations: CorrelationArgs,
    }

    #[test]
    fn test_default_flags_match_default_policy() {
        let cli = TestCli::try_parse_from(["sgp"]).unwrap();
        assert_eq!(cli.policy.into_policy().unwrap(), ParlayPolicy::default());
    }

    #[test]
    fn test_flags_override_policy() {
        let cli = TestCli::try_parse_from([
            "sgp",
            "--max-legs",
            "4",
            "--min-ev",
            "-0.1",
            "--correlation",
            "QB_WR",
            "--allow-cross-game",
        ])
        .unwrap();
        let policy = cli.policy.into_policy().unwrap();
        assert_eq!(policy.max_legs, 4);
        assert_eq!(policy.min_ev, -0.1);
        assert_eq!(policy.correlation, Some(CorrelationSpec::Tag("QB_WR".to_string())));
        assert!(!policy.require_same_game);
    }

    #[test]
    fn test_out_of_range_policy_is_rejected() {
        let cli = TestCli::try_parse_from(["sgp", "--max-legs", "25"]).unwrap();
        assert!(matches!(cli.policy.into_policy(), Err(PricingError::InvalidPolicy(_))));

        let cli = TestCli::try_parse_from(["sgp", "--max-pool-size", "41"]).unwrap();
        assert!(matches!(cli.policy.into_policy(), Err(PricingError::InvalidPolicy(_))));
    }

    #[test]
    fn test_correlation_spec_parsing() {
        assert_eq!(parse_correlation_spec("0.2"), CorrelationSpec::Rho(0.2));
        assert_eq!(parse_correlation_spec(" -0.05 "), CorrelationSpec::Rho(-0.05));
        assert_eq!(
            parse_correlation_spec("Star_Team_Points"),
            CorrelationSpec::Tag("Star_Team_Points".to_string())
        );
    }

    #[test]
    fn test_correlation_overrides() {
        let cli =
            TestCli::try_parse_from(["sgp", "--correlations", "QB_WR=0.15, WR_WR=-0.02"]).unwrap();
        let table = cli.correlations.table().unwrap();
        assert_eq!(table.lookup("QB_WR").unwrap(), 0.15);
        assert_eq!(table.lookup("WR_WR").unwrap(), -0.02);
        assert_eq!(table.lookup("QB_TE").unwrap(), 0.092);

        assert!(matches!(
            correlation_table(Some("QB_WR")),
            Err(PricingError::InvalidPolicy(_))
        ));
        assert!(matches!(
            correlation_table(Some("QB_WR=high")),
            Err(PricingError::InvalidPolicy(_))
        ));
        assert!(matches!(
            correlation_table(Some("QB_WR=1.5")),
            Err(PricingError::InvalidCorrelation(_))
        ));
        assert_eq!(correlation_table(Some("")).unwrap(), CorrelationTable::default());
    }
}
