//! Scenario files on disk through to run summaries and saved batches.

use std::io::Write;

use td_core::events::GameOutcome;
use td_headless::batch::{run_batch, BatchConfig, BatchResults};
use td_headless::game_runner::run_scenario;
use td_headless::scenario::{Scenario, ScenarioAction, ScenarioError};
use tempfile::{tempdir, NamedTempFile};

const SHORT_LANE: &str = r#"(
    name: "short lane",
    config: (
        seed: 9,
        starting_gold: 500,
        max_rounds: 1,
        first_round_delay: 1.0,
        paths: [
            (spawn: (x: -10.0, y: 0.0, z: 0.0), waypoints: [(x: 10.0, y: 0.0, z: 0.0)]),
        ],
        rounds: {
            1: (creep_type: swarm, difficulty: 1, count: 3, spawn_interval: 1.0),
        },
        tower_slots: [(x: 0.0, y: 0.0, z: 2.0)],
    ),
    max_ticks: 2000,
    actions: [
        (tick: 0, action: Build(slot: 0, tower_type: basic)),
    ],
)"#;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write");
    file
}

#[test]
fn test_shipped_scenario_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/two_lanes.ron");
    let scenario = Scenario::load(path).expect("shipped scenario is valid");
    assert_eq!(scenario.name, "Two Lanes");
    assert_eq!(scenario.config.max_rounds, 3);
    assert_eq!(scenario.config.augments.offer_rounds, vec![3]);
    assert_eq!(scenario.actions.len(), 7);
    assert_eq!(scenario.actions[3].action, ScenarioAction::HireWorker);
}

#[test]
fn test_file_scenario_runs_to_victory() {
    let file = write_temp(SHORT_LANE);
    let scenario = Scenario::load(file.path()).expect("valid scenario");
    let summary = run_scenario(&scenario, scenario.config.seed).expect("runs");

    assert_eq!(summary.scenario, "short lane");
    assert_eq!(summary.outcome, Some(GameOutcome::Victory));
    assert_eq!(summary.metrics.towers_built, 1);
    assert_eq!(summary.metrics.creeps_spawned, 3);
    assert_eq!(
        summary.metrics.creeps_killed + summary.metrics.creeps_leaked,
        3
    );
}

#[test]
fn test_resolve_prefers_builtins_then_files() {
    let file = write_temp(SHORT_LANE);
    let path = file.path().to_str().expect("utf8 path");
    assert_eq!(Scenario::resolve(path).expect("file").name, "short lane");
    assert_eq!(
        Scenario::resolve("standard_defence").expect("builtin"),
        Scenario::standard_defence()
    );
}

#[test]
fn test_bad_files_reported() {
    let malformed = write_temp("(name: \"broken\", actions: [");
    assert!(matches!(
        Scenario::load(malformed.path()),
        Err(ScenarioError::ParseError(_))
    ));

    let invalid = write_temp("(config: (king_max_health: 0))");
    assert!(matches!(
        Scenario::load(invalid.path()),
        Err(ScenarioError::InvalidConfig(_))
    ));
}

#[test]
fn test_batch_results_saved_and_loaded() {
    let file = write_temp(SHORT_LANE);
    let scenario = Scenario::load(file.path()).expect("valid scenario");
    let results = run_batch(&scenario, BatchConfig::new(4).with_seed(100));
    assert_eq!(results.runs.len(), 4);
    assert_eq!(results.summary.victories + results.summary.defeats, 4);

    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("nested").join("batch.json");
    results.save(&path).expect("save");
    let loaded = BatchResults::load(&path).expect("load");

    assert_eq!(loaded.scenario, results.scenario);
    assert_eq!(loaded.config, results.config);
    assert_eq!(loaded.runs, results.runs);
    assert_eq!(loaded.summary.victories, results.summary.victories);
}

#[test]
fn test_batch_matches_single_runs() {
    let file = write_temp(SHORT_LANE);
    let scenario = Scenario::load(file.path()).expect("valid scenario");
    let results = run_batch(&scenario, BatchConfig::new(2).with_seed(7));
    for run in &results.runs {
        assert_eq!(run, &run_scenario(&scenario, run.seed).expect("runs"));
    }
}
