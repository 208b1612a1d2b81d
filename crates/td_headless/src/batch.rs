//! Batch runner for balance testing.
//!
//! Runs one scenario over a range of seeds in parallel using rayon and
//! aggregates the outcomes.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use td_core::events::GameOutcome;
use tracing::{debug, info, warn};

use crate::game_runner::{run_scenario, RunSummary};
use crate::scenario::Scenario;

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of games to run
    pub game_count: u32,
    /// Seed of the first game; game `i` uses `seed_start + i`
    pub seed_start: u64,
    /// Maximum parallel games (0 = use rayon default)
    pub parallel_games: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            game_count: 100,
            seed_start: 0,
            parallel_games: 0,
        }
    }
}

impl BatchConfig {
    /// Create config for `game_count` games
    #[must_use]
    pub fn new(game_count: u32) -> Self {
        Self {
            game_count,
            ..Default::default()
        }
    }

    /// Set seed start
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set the number of worker threads
    #[must_use]
    pub fn with_parallelism(mut self, threads: u32) -> Self {
        self.parallel_games = threads;
        self
    }
}

/// Aggregate statistics over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Games played to completion or the tick limit
    pub games: u32,
    /// Games won
    pub victories: u32,
    /// Games lost
    pub defeats: u32,
    /// Games that hit the tick limit
    pub unfinished: u32,
    /// Victories over games
    pub win_rate: f64,
    /// Mean last round reached
    pub avg_final_round: f64,
    /// Mean king health at the end
    pub avg_king_health: f64,
    /// Mean creeps leaked per game
    pub avg_creeps_leaked: f64,
    /// Mean gold at the end
    pub avg_final_gold: f64,
}

impl BatchSummary {
    /// Aggregate a set of runs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_runs(runs: &[RunSummary]) -> Self {
        if runs.is_empty() {
            return Self::default();
        }
        let count = |outcome: Option<GameOutcome>| {
            u32::try_from(runs.iter().filter(|r| r.outcome == outcome).count()).unwrap_or(u32::MAX)
        };
        let n = runs.len() as f64;
        let mean = |f: fn(&RunSummary) -> f64| runs.iter().map(f).sum::<f64>() / n;

        let victories = count(Some(GameOutcome::Victory));
        Self {
            games: u32::try_from(runs.len()).unwrap_or(u32::MAX),
            victories,
            defeats: count(Some(GameOutcome::Defeat)),
            unfinished: count(None),
            win_rate: f64::from(victories) / n,
            avg_final_round: mean(|r| f64::from(r.final_round)),
            avg_king_health: mean(|r| f64::from(r.king_health)),
            avg_creeps_leaked: mean(|r| f64::from(r.metrics.creeps_leaked)),
            avg_final_gold: mean(|r| f64::from(r.gold)),
        }
    }
}

/// Error during batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Game index
    pub game_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Results from a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    /// Scenario name
    pub scenario: String,
    /// Configuration used
    pub config: BatchConfig,
    /// Individual runs, in seed order
    pub runs: Vec<RunSummary>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Run `config.game_count` games of `scenario` with consecutive seeds.
#[must_use]
pub fn run_batch(scenario: &Scenario, config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let completed = AtomicU32::new(0);

    info!(
        games = config.game_count,
        scenario = %scenario.name,
        seed_start = config.seed_start,
        "Starting batch run"
    );

    if config.parallel_games > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build_global()
            .ok(); // Ignore if already set
    }

    let results: Vec<Result<RunSummary, BatchError>> = (0..config.game_count)
        .into_par_iter()
        .map(|i| {
            let seed = config.seed_start.wrapping_add(u64::from(i));
            let result = run_scenario(scenario, seed).map_err(|e| {
                warn!(game = i, seed, error = %e, "Game failed");
                BatchError {
                    game_index: i,
                    seed,
                    message: e.to_string(),
                }
            });
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % 10 == 0 {
                debug!("Progress: {}/{}", done, config.game_count);
            }
            result
        })
        .collect();

    let mut runs = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(run) => runs.push(run),
            Err(err) => errors.push(err),
        }
    }

    let summary = BatchSummary::from_runs(&runs);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        games = runs.len(),
        victories = summary.victories,
        defeats = summary.defeats,
        "Batch complete in {:.1}s",
        duration_seconds
    );

    BatchResults {
        scenario: scenario.name.clone(),
        config,
        runs,
        summary,
        duration_seconds,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use td_core::config::GameConfig;

    use super::*;
    use crate::game_runner::GameMetrics;

    fn run(outcome: Option<GameOutcome>, round: u32, king: u32) -> RunSummary {
        RunSummary {
            scenario: "t".to_string(),
            seed: 0,
            outcome,
            final_round: round,
            ticks: 10,
            king_health: king,
            gold: 100,
            rejected_actions: 0,
            metrics: GameMetrics::default(),
            final_state_hash: 0,
        }
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new(5).with_seed(12345).with_parallelism(2);
        assert_eq!(config.game_count, 5);
        assert_eq!(config.seed_start, 12345);
        assert_eq!(config.parallel_games, 2);
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let runs = vec![
            run(Some(GameOutcome::Victory), 10, 20),
            run(Some(GameOutcome::Defeat), 4, 0),
            run(None, 6, 10),
            run(Some(GameOutcome::Victory), 10, 12),
        ];
        let summary = BatchSummary::from_runs(&runs);
        assert_eq!(summary.games, 4);
        assert_eq!(summary.victories, 2);
        assert_eq!(summary.defeats, 1);
        assert_eq!(summary.unfinished, 1);
        assert!((summary.win_rate - 0.5).abs() < 1e-9);
        assert!((summary.avg_final_round - 7.5).abs() < 1e-9);
        assert!((summary.avg_king_health - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(BatchSummary::from_runs(&[]), BatchSummary::default());
    }

    #[test]
    fn test_batch_runs_in_seed_order() {
        let scenario = Scenario {
            config: GameConfig::default(),
            max_ticks: 50,
            ..Scenario::default()
        };
        let results = run_batch(&scenario, BatchConfig::new(3).with_seed(40));
        assert!(results.errors.is_empty());
        let seeds: Vec<u64> = results.runs.iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![40, 41, 42]);
        assert_eq!(results.summary.unfinished, 3);
    }
}
