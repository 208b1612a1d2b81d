//! Headless tower-defense runner for scenario testing and CI.
//!
//! This crate drives `td_core` without a renderer:
//!
//! - **Interactive**: a controller sends JSON commands on stdin and reads
//!   acknowledgements, state snapshots and game events on stdout
//! - **Scenarios**: scripted games loaded from RON, run to completion
//! - **Batches**: one scenario over many seeds in parallel, for balance work
//!
//! # Protocol
//!
//! Communication uses JSON lines (one JSON object per line):
//!
//! - **stdin**: Commands from controller (tick, build, upgrade, etc.)
//! - **stdout**: Responses and forwarded events (JSON)
//! - **stderr**: Logs (human-readable)
//!
//! See [`protocol`] for the command and response formats.

pub mod batch;
pub mod game_runner;
pub mod protocol;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, BatchConfig, BatchResults, BatchSummary};
pub use game_runner::{run_scenario, GameMetrics, RunSummary};
pub use protocol::{Command, Response, StateSnapshot};
pub use runner::{HeadlessConfig, HeadlessRunner};
pub use scenario::{Scenario, ScenarioAction, ScenarioError, TimedAction};
