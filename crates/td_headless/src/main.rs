//! Headless tower-defense runner.
//!
//! Runs the simulation without graphics, controlled via JSON on stdin/stdout
//! or driven by scenario scripts.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode - read commands from stdin
//! cargo run -p td_headless
//!
//! # Run one scripted game
//! cargo run -p td_headless -- run --scenario standard_defence
//!
//! # Run a batch balance test
//! cargo run -p td_headless -- batch --scenario scenarios/two_lanes.ron --count 200
//!
//! # Check a config file
//! cargo run -p td_headless -- validate --config my_map.ron
//! ```
//!
//! # Protocol
//!
//! Input (stdin): JSON commands, one per line
//! Output (stdout): JSON responses, one per line
//! Logs (stderr): Human-readable logs

use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use td_core::config::GameConfig;
use td_headless::{
    batch::{run_batch, BatchConfig},
    game_runner::run_scenario,
    runner::{HeadlessConfig, HeadlessRunner},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "td_headless")]
#[command(about = "Headless tower-defense runner for scenario testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive one game with JSON commands on stdin
    Interactive {
        /// Game config file (RON); defaults to the built-in map
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output state after every tick command
        #[arg(long)]
        auto_state: bool,

        /// Forward game events to stdout
        #[arg(long)]
        events: bool,
    },

    /// Run one scripted game to completion
    Run {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "standard_defence")]
        scenario: String,

        /// Override the scenario seed
        #[arg(long)]
        seed: Option<u64>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a batch of games for balance testing
    Batch {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "standard_defence")]
        scenario: String,

        /// Number of games to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel games (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Write results to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify determinism by running the same seed several times
    Verify {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "standard_defence")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "3")]
        runs: u32,
    },

    /// Check a game config file and report every problem
    Validate {
        /// Game config file (RON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is for protocol output
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Some(Commands::Interactive {
            config,
            auto_state,
            events,
        }) => cmd_interactive(config, auto_state, events),
        Some(Commands::Run {
            scenario,
            seed,
            json,
        }) => cmd_run(&scenario, seed, json),
        Some(Commands::Batch {
            scenario,
            count,
            parallel,
            seed,
            output,
        }) => cmd_batch(&scenario, count, parallel, seed, output),
        Some(Commands::Verify {
            scenario,
            seed,
            runs,
        }) => cmd_verify(&scenario, seed, runs),
        Some(Commands::Validate { config }) => cmd_validate(&config),
        None => cmd_interactive(None, false, false),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

type CmdResult = Result<(), String>;

fn load_scenario(name_or_path: &str) -> Result<Scenario, String> {
    Scenario::resolve(name_or_path).map_err(|e| format!("Cannot load scenario '{name_or_path}': {e}"))
}

/// Drive one game from stdin
fn cmd_interactive(config: Option<PathBuf>, auto_state: bool, events: bool) -> CmdResult {
    let game_config = match config {
        Some(path) => GameConfig::load(&path)
            .map_err(|e| format!("Cannot load config {}: {e}", path.display()))?,
        None => GameConfig::default(),
    };
    let runner = HeadlessRunner::new(
        game_config,
        HeadlessConfig {
            auto_state_output: auto_state,
            forward_events: events,
        },
    )
    .map_err(|e| e.to_string())?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    runner
        .run(stdin.lock(), BufWriter::new(stdout.lock()))
        .map_err(|e| format!("I/O error: {e}"))
}

/// Run one scripted game
fn cmd_run(scenario: &str, seed: Option<u64>, json: bool) -> CmdResult {
    let scenario = load_scenario(scenario)?;
    let seed = seed.unwrap_or(scenario.config.seed);
    let summary = run_scenario(&scenario, seed).map_err(|e| e.to_string())?;

    if json {
        let text = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        println!("{text}");
    } else {
        println!("Scenario:   {}", summary.scenario);
        println!("Seed:       {}", summary.seed);
        println!(
            "Outcome:    {}",
            summary
                .outcome
                .map_or_else(|| "unfinished".to_string(), |o| format!("{o:?}"))
        );
        println!("Round:      {}", summary.final_round);
        println!("Ticks:      {}", summary.ticks);
        println!("King:       {}", summary.king_health);
        println!("Gold:       {}", summary.gold);
        println!(
            "Creeps:     {} spawned, {} killed, {} leaked",
            summary.metrics.creeps_spawned,
            summary.metrics.creeps_killed,
            summary.metrics.creeps_leaked
        );
        println!("Rejected:   {}", summary.rejected_actions);
        println!("Hash:       {:016x}", summary.final_state_hash);
    }
    Ok(())
}

/// Run a batch of games
fn cmd_batch(
    scenario: &str,
    count: u32,
    parallel: u32,
    seed: u64,
    output: Option<PathBuf>,
) -> CmdResult {
    let scenario = load_scenario(scenario)?;
    let config = BatchConfig::new(count)
        .with_seed(seed)
        .with_parallelism(parallel);
    let results = run_batch(&scenario, config);

    let summary = &results.summary;
    println!("Games:      {}", summary.games);
    println!(
        "Outcomes:   {} won, {} lost, {} unfinished",
        summary.victories, summary.defeats, summary.unfinished
    );
    println!("Win rate:   {:.1}%", summary.win_rate * 100.0);
    println!("Avg round:  {:.2}", summary.avg_final_round);
    println!("Avg king:   {:.2}", summary.avg_king_health);
    println!("Avg leaked: {:.2}", summary.avg_creeps_leaked);
    if !results.errors.is_empty() {
        println!("Errors:     {}", results.errors.len());
    }

    if let Some(path) = output {
        results
            .save(&path)
            .map_err(|e| format!("Cannot write {}: {e}", path.display()))?;
        info!(path = %path.display(), "Results saved");
    }
    Ok(())
}

/// Run the same seed repeatedly and compare final hashes
fn cmd_verify(scenario: &str, seed: u64, runs: u32) -> CmdResult {
    let scenario = load_scenario(scenario)?;
    let mut hashes = Vec::new();
    for run in 0..runs.max(1) {
        let summary = run_scenario(&scenario, seed).map_err(|e| e.to_string())?;
        info!(run, hash = summary.final_state_hash, "Verification run");
        hashes.push(summary.final_state_hash);
    }

    if hashes.windows(2).all(|w| w[0] == w[1]) {
        println!("DETERMINISTIC: {} runs, hash {:016x}", hashes.len(), hashes[0]);
        Ok(())
    } else {
        Err(format!("NON-DETERMINISTIC: hashes differ: {hashes:x?}"))
    }
}

/// Validate a config file
fn cmd_validate(path: &Path) -> CmdResult {
    let config = GameConfig::load(path).map_err(|e| e.to_string())?;
    config.validate().map_err(|e| e.to_string())?;

    let missing = config.missing_rounds();
    if !missing.is_empty() {
        warn!(rounds = ?missing, "Rounds without a definition will not start");
    }
    println!(
        "{}: OK ({} rounds, {} slots, {} paths)",
        path.display(),
        config.max_rounds,
        config.tower_slots.len(),
        config.paths.len()
    );
    Ok(())
}
