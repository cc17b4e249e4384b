use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sgp_ev::config::{parse_correlation_spec, CorrelationArgs, PolicyArgs};
use sgp_ev::data::{
    load_book_lines, load_game_contexts, load_player_stats, load_pool, load_predictions,
    load_snapshots, save_json, save_parlays_to_csv,
};
use sgp_ev::leg_probability::{build_pool, LegProbabilitySource, PredictionBook, ProjectionSource};
use sgp_ev::odds::{implied_probability, to_american, to_decimal};
use sgp_ev::secondary_stats::{SecondaryStat, SecondaryStatAdjuster};
use sgp_ev::{CorrelationAdjuster, EvCalculator, GameContext, Leg, ParlayBuilder, PropMarket};
use std::path::{Path, PathBuf};
use tracing::info;

/// Same-game parlay pricing and EV tools
#[derive(Parser, Debug)]
#[command(name = "sgp-ev", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert between American and decimal odds
    Convert {
        /// American odds, e.g. -110 or 150
        #[arg(long, allow_negative_numbers = true, conflicts_with = "decimal")]
        american: Option<i32>,

        /// Decimal odds, e.g. 2.5
        #[arg(long)]
        decimal: Option<f64>,
    },

    /// Compare a model probability against a posted price
    Compare {
        /// Model win probability
        #[arg(long)]
        prob: f64,

        /// Book American odds
        #[arg(long, allow_negative_numbers = true)]
        odds: i32,
    },

    /// Price a ticket of legs from a JSON file
    Price {
        /// JSON array of legs
        #[arg(long)]
        legs: PathBuf,

        /// Stack tag (e.g. QB_WR) or explicit rho
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        correlation: String,

        #[command(flatten)]
        correlations: CorrelationArgs,
    },

    /// Build and rank parlays from a leg pool
    Build {
        /// JSON array of legs
        #[arg(long, conflicts_with = "predictions")]
        pool: Option<PathBuf>,

        /// Prediction records; requires --lines
        #[arg(long, requires = "lines")]
        predictions: Option<PathBuf>,

        /// Book lines matching the predictions
        #[arg(long)]
        lines: Option<PathBuf>,

        /// Export ranked parlays to CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        #[command(flatten)]
        policy: PolicyArgs,

        #[command(flatten)]
        correlations: CorrelationArgs,
    },

    /// Project rebounds, blocks and steals, and price props from projections
    Project {
        /// Player season averages keyed by game id
        #[arg(long)]
        stats: PathBuf,

        /// Game contexts keyed by game id; missing games use league averages
        #[arg(long)]
        contexts: Option<PathBuf>,

        /// Book lines to price with the projections
        #[arg(long)]
        lines: Option<PathBuf>,
    },

    /// Show normalized prices, hold and no-vig probabilities for odds snapshots
    Snapshot {
        /// JSON array of odds snapshots
        #[arg(long)]
        file: PathBuf,

        /// Write every price as a leg at its no-vig probability
        #[arg(long)]
        legs: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Convert { american, decimal } => convert(american, decimal),
        Command::Compare { prob, odds } => compare(prob, odds),
        Command::Price {
            legs,
            correlation,
            correlations,
        } => price(&legs, &correlation, &correlations),
        Command::Build {
            pool,
            predictions,
            lines,
            csv,
            policy,
            correlations,
        } => build(pool, predictions, lines, csv, &policy, &correlations),
        Command::Project {
            stats,
            contexts,
            lines,
        } => project(&stats, contexts.as_deref(), lines.as_deref()),
        Command::Snapshot { file, legs } => snapshot(&file, legs.as_deref()),
    }
}

fn convert(american: Option<i32>, decimal: Option<f64>) -> Result<()> {
    let american = match (american, decimal) {
        (Some(american), _) => american,
        (None, Some(decimal)) => to_american(decimal)?,
        (None, None) => anyhow::bail!("pass --american or --decimal"),
    };

    println!("American:    {:+}", american);
    println!("Decimal:     {:.4}", to_decimal(american)?);
    println!("Implied:     {:.2}%", implied_probability(american)? * 100.0);
    Ok(())
}

fn compare(prob: f64, odds: i32) -> Result<()> {
    let result = EvCalculator::default().compare(prob, odds)?;

    println!("Odds:        {:+}", odds);
    println!("Implied:     {:.2}%", result.implied_prob * 100.0);
    println!("Model:       {:.2}%", result.our_prob * 100.0);
    println!("Edge:        {:+.2}%", result.edge * 100.0);
    println!("EV:          {:+.2}%", result.expected_value * 100.0);
    println!("Rating:      {}", result.rating);
    Ok(())
}

fn price(legs_file: &Path, correlation: &str, correlations: &CorrelationArgs) -> Result<()> {
    let legs = load_pool(legs_file)?;
    let calculator = EvCalculator::new(correlations.table()?);
    let parlay = calculator.price_ticket(&legs, &parse_correlation_spec(correlation))?;

    println!("TICKET\n");
    for leg in &parlay.legs {
        println!(
            "  {} ({} {}) {:.1}% @ {:+}",
            leg.id,
            leg.market,
            leg.selection,
            leg.probability * 100.0,
            leg.american_odds
        );
    }
    println!();
    println!("Correlation: {:.3}", parlay.correlation);
    println!("Independent: {:.2}%", parlay.independent_probability * 100.0);
    println!("Joint:       {:.2}%", parlay.joint_probability * 100.0);
    println!("Fair:        {:.2} ({:+})", parlay.fair_decimal, parlay.fair_american);
    println!("Book:        {:.2} ({:+})", parlay.offered_decimal, parlay.offered_american);
    println!("EV:          {:+.2}%", parlay.expected_value * 100.0);
    println!("Rating:      {}", parlay.rating);
    if !parlay.same_game {
        println!("\nNote: legs span more than one game");
    }
    Ok(())
}

/// Resolve every prediction into a leg priced at its book line
fn pool_from_predictions(predictions: &Path, lines: &Path) -> Result<Vec<Leg>> {
    let records = load_predictions(predictions)?;
    let requests = records
        .iter()
        .map(|record| -> sgp_ev::PricingResult<(String, String, PropMarket)> {
            let market = record.market.parse::<PropMarket>()?;
            Ok((record.game_id.clone(), record.player_id.clone(), market))
        })
        .collect::<sgp_ev::PricingResult<Vec<_>>>()
        .context("Failed to parse prediction markets")?;

    let book = PredictionBook::new(records, load_book_lines(lines)?);
    let pool = build_pool(&book, &requests).context("Failed to resolve prediction legs")?;
    info!(legs = pool.len(), "Built leg pool from predictions");
    Ok(pool)
}

fn build(
    pool: Option<PathBuf>,
    predictions: Option<PathBuf>,
    lines: Option<PathBuf>,
    csv: Option<PathBuf>,
    policy: &PolicyArgs,
    correlations: &CorrelationArgs,
) -> Result<()> {
    let legs = match (pool, predictions, lines) {
        (Some(pool), _, _) => load_pool(&pool)?,
        (None, Some(predictions), Some(lines)) => pool_from_predictions(&predictions, &lines)?,
        _ => anyhow::bail!("pass --pool, or --predictions with --lines"),
    };

    let builder = ParlayBuilder::new(
        CorrelationAdjuster::new(correlations.table()?),
        policy.into_policy()?,
    )?;
    let build = builder.build(&legs)?;
    let diagnostics = &build.diagnostics;

    println!("PARLAYS\n");
    println!(
        "{} legs in pool, {} filtered, {} pruned as exclusive, {} over the pool cap",
        diagnostics.pool_size,
        diagnostics.filtered_out,
        diagnostics.pruned_exclusive,
        diagnostics.truncated
    );
    println!(
        "{} combinations evaluated, {} below min EV, {} clamped\n",
        diagnostics.combinations_evaluated, diagnostics.below_min_ev, diagnostics.clamp_events
    );

    if build.parlays.is_empty() {
        println!("No parlays clear the minimum EV.");
    } else {
        println!("Top {} Parlays:\n", build.parlays.len());
        for (i, parlay) in build.parlays.iter().enumerate() {
            println!("{}. {}", i + 1, parlay.format());
        }
    }

    if let Some(csv) = csv {
        save_parlays_to_csv(&build.parlays, &csv)?;
        println!("\nSaved parlays to {}", csv.display());
    }
    Ok(())
}

fn project(
    stats_file: &Path,
    contexts_file: Option<&Path>,
    lines_file: Option<&Path>,
) -> Result<()> {
    let stats = load_player_stats(stats_file)?;
    let contexts = match contexts_file {
        Some(path) => load_game_contexts(path)?,
        None => Default::default(),
    };

    let adjuster = SecondaryStatAdjuster;
    let default_ctx = GameContext::default();

    println!("PROJECTIONS\n");
    let mut games: Vec<_> = stats.keys().collect();
    games.sort();
    for game_id in games {
        let ctx = contexts.get(game_id).unwrap_or(&default_ctx);
        println!("{}", game_id);
        for player in &stats[game_id] {
            let [reb, blk, stl] = [
                SecondaryStat::Rebounds,
                SecondaryStat::Blocks,
                SecondaryStat::Steals,
            ]
            .map(|stat| adjuster.project(player, ctx, stat));
            println!(
                "  {} ({}) REB {:.1} -> {:.1} | BLK {:.1} -> {:.1} | STL {:.1} -> {:.1}",
                if player.name.is_empty() { &player.player_id } else { &player.name },
                player.position,
                reb.base,
                reb.projection,
                blk.base,
                blk.projection,
                stl.base,
                stl.projection
            );
        }
    }

    let Some(lines_file) = lines_file else {
        return Ok(());
    };
    let lines = load_book_lines(lines_file)?;

    let mut source = ProjectionSource::new(lines.clone());
    for (game_id, players) in &stats {
        for player in players {
            source = source.with_player(game_id, player.clone());
        }
    }
    for (game_id, ctx) in &contexts {
        source = source.with_context(game_id, ctx.clone());
    }

    let calculator = EvCalculator::default();
    println!("\nPROP PRICES\n");
    for line in &lines {
        let market = match line.market.parse::<PropMarket>() {
            Ok(market) => market,
            Err(e) => {
                eprintln!("Skipping {}: {}", line.market, e);
                continue;
            }
        };
        match source.get_leg(&line.game_id, &line.player_id, &market) {
            Ok(quote) => {
                let result = calculator.compare(quote.probability, quote.american_odds)?;
                println!(
                    "  {} {} {} | Model: {:.1}% | Implied: {:.1}% | EV: {:+.2}% | {}",
                    line.game_id,
                    line.player_id,
                    market,
                    quote.probability * 100.0,
                    result.implied_prob * 100.0,
                    result.expected_value * 100.0,
                    result.rating
                );
            }
            Err(e) => eprintln!("Skipping {} {} {}: {}", line.game_id, line.player_id, market, e),
        }
    }
    Ok(())
}

fn snapshot(file: &Path, legs_file: Option<&Path>) -> Result<()> {
    let snapshots = load_snapshots(file)?;
    let mut legs = Vec::new();

    for snapshot in &snapshots {
        println!(
            "{} @ {} ({}, {})",
            snapshot.away_team,
            snapshot.home_team,
            snapshot.sport,
            snapshot.timestamp.format("%Y-%m-%d %H:%M UTC")
        );
        for price in snapshot.book_prices()? {
            println!(
                "  {:<10} {} {:+} ({:.1}%)",
                price.market,
                price.label(),
                price.american_odds,
                price.implied_prob * 100.0
            );
        }
        for hold in snapshot.market_holds()? {
            println!(
                "  {} hold {:.2}% | no-vig {:.1}% / {:.1}%",
                hold.market,
                hold.hold * 100.0,
                hold.no_vig[0] * 100.0,
                hold.no_vig[1] * 100.0
            );
        }
        println!();

        if legs_file.is_some() {
            legs.extend(snapshot.no_vig_legs()?);
        }
    }

    if let Some(path) = legs_file {
        save_json(&legs, path)?;
        println!("Saved {} legs to {}", legs.len(), path.display());
    }
    Ok(())
}
