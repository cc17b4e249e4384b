use crate::models::{
    BookLine, GameContext, Leg, OddsSnapshot, Parlay, PlayerStats, PredictionRecord,
};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Load any JSON document from disk
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to deserialize {}", path.display()))
}

/// Write any value to disk as pretty JSON
pub fn save_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(value).context("Failed to serialize data")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Load a leg pool
pub fn load_pool(path: impl AsRef<Path>) -> Result<Vec<Leg>> {
    load_json(path)
}

/// Load persisted model predictions
pub fn load_predictions(path: impl AsRef<Path>) -> Result<Vec<PredictionRecord>> {
    load_json(path)
}

/// Load posted book lines
pub fn load_book_lines(path: impl AsRef<Path>) -> Result<Vec<BookLine>> {
    load_json(path)
}

/// Load season averages, keyed by game id
pub fn load_player_stats(path: impl AsRef<Path>) -> Result<HashMap<String, Vec<PlayerStats>>> {
    load_json(path)
}

/// Load game contexts keyed by game id
pub fn load_game_contexts(path: impl AsRef<Path>) -> Result<HashMap<String, GameContext>> {
    load_json(path)
}

/// Load a list of odds snapshots
pub fn load_snapshots(path: impl AsRef<Path>) -> Result<Vec<OddsSnapshot>> {
    load_json(path)
}

/// One ranked parlay flattened for CSV and HTML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayRow {
    pub rank: usize,
    pub legs: String,
    pub leg_count: usize,
    pub correlation: f64,
    pub joint_prob_pct: f64,
    pub fair_decimal: f64,
    pub fair_american: i32,
    pub offered_decimal: f64,
    pub offered_american: i32,
    pub ev_pct: f64, // Presentation layer shows EV in percent
    pub rating: String,
}

impl ParlayRow {
    pub fn from_parlay(rank: usize, parlay: &Parlay) -> Self {
        Self {
            rank,
            legs: parlay.leg_ids(),
            leg_count: parlay.leg_count(),
            correlation: parlay.correlation,
            joint_prob_pct: parlay.joint_probability * 100.0,
            fair_decimal: parlay.fair_decimal,
            fair_american: parlay.fair_american,
            offered_decimal: parlay.offered_decimal,
            offered_american: parlay.offered_american,
            ev_pct: parlay.expected_value * 100.0,
            rating: parlay.rating.to_string(),
        }
    }
}

/// Number parlays from 1 in ranked order
pub fn parlay_rows(parlays: &[Parlay]) -> Vec<ParlayRow> {
    parlays
        .iter()
        .enumerate()
        .map(|(i, parlay)| ParlayRow::from_parlay(i + 1, parlay))
        .collect()
}

/// Save ranked parlays to CSV
pub fn save_parlays_to_csv(parlays: &[Parlay], filename: impl AsRef<Path>) -> Result<()> {
    let filename = filename.as_ref();
    let mut writer = csv::Writer::from_path(filename)
        .with_context(|| format!("Failed to create CSV file {}", filename.display()))?;

    for row in parlay_rows(parlays) {
        writer.serialize(row).context("Failed to write parlay row")?;
    }
    writer.flush().context("Failed to flush CSV file")?;

    Ok(())
}
