//! JSON protocol for headless game communication.
//!
//! The headless runner stands in for the UI: it takes player commands as
//! JSON lines and answers with JSON lines.
//!
//! **Input (stdin):** Commands from the controller
//! **Output (stdout):** Responses and forwarded game events
//!
//! # Protocol Flow
//!
//! 1. Runner starts, outputs `{"type":"ready","version":"1.0",...}`
//! 2. Controller sends commands as JSON lines
//! 3. Each command is answered with `ack`, `error` or `state`, followed by
//!    one `event` line per game event it caused
//! 4. `quit` ends the session with `bye`
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","tick":0,"hash":1234}
//! -> {"cmd":"build","slot":0,"tower_type":"frost"}
//! <- {"type":"ack","cmd":"build","value":1}
//! <- {"type":"event","tick":0,"event":{"type":"tower_built",...}}
//! -> {"cmd":"tick","count":100}
//! <- {"type":"ack","cmd":"tick","value":100}
//! -> {"cmd":"query"}
//! <- {"type":"state","state":{"tick":100,"gold":75,...}}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use td_core::augments::Augment;
use td_core::events::GameEvent;
use td_core::game::{Game, GamePhase, GameQueries, TowerView};
use td_core::math::fixed_serde;
use td_core::math::Fixed;
use td_core::tower::TowerType;
use td_core::worker::WorkerView;

/// Protocol version reported in `ready`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Problems reading a command line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line was not a valid command.
    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] serde_json::Error),
    /// The line was empty.
    #[error("Empty command line")]
    Empty,
}

// ============================================================================
// Input Commands (Controller -> Runner)
// ============================================================================

/// Commands that can be sent to the headless runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Advance simulation by N ticks (default: 1).
    Tick {
        /// Number of ticks.
        #[serde(default = "default_tick_count")]
        count: u32,
        /// Tick length in milliseconds (default: 100).
        #[serde(default = "default_tick_ms")]
        delta_ms: u32,
    },

    /// Report the current state without advancing time.
    Query,

    /// Build a tower on a slot.
    Build {
        /// Slot index.
        slot: usize,
        /// Tower type.
        tower_type: TowerType,
    },

    /// Upgrade a tower.
    Upgrade {
        /// Tower id.
        tower: u64,
    },

    /// Sell a tower.
    Sell {
        /// Tower id.
        tower: u64,
    },

    /// Select a tower, or clear the selection.
    Select {
        /// Tower id, `null` to clear.
        #[serde(default)]
        tower: Option<u64>,
    },

    /// Hire a worker.
    HireWorker,

    /// Dismiss a worker.
    RemoveWorker {
        /// Worker id.
        worker: u64,
    },

    /// Pick an offered augment.
    ChooseAugment {
        /// Augment to pick.
        augment: Augment,
    },

    /// Pause the game.
    Pause,

    /// Resume the game.
    Resume,

    /// Skip the countdown and start the next round.
    NextRound,

    /// End the session.
    Quit,
}

fn default_tick_count() -> u32 {
    1
}

fn default_tick_ms() -> u32 {
    100
}

impl Command {
    /// Parse from a JSON line.
    pub fn from_json(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }
        Ok(serde_json::from_str(line)?)
    }

    /// Command name for acknowledgment.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tick { .. } => "tick",
            Self::Query => "query",
            Self::Build { .. } => "build",
            Self::Upgrade { .. } => "upgrade",
            Self::Sell { .. } => "sell",
            Self::Select { .. } => "select",
            Self::HireWorker => "hire_worker",
            Self::RemoveWorker { .. } => "remove_worker",
            Self::ChooseAugment { .. } => "choose_augment",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::NextRound => "next_round",
            Self::Quit => "quit",
        }
    }
}

// ============================================================================
// Output Responses (Runner -> Controller)
// ============================================================================

/// Responses sent from the headless runner.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Runner is ready to accept commands.
    Ready {
        /// Protocol version.
        version: String,
        /// Current tick.
        tick: u64,
        /// Current state hash.
        hash: u64,
    },

    /// Command succeeded.
    Ack {
        /// Command name.
        cmd: String,
        /// Result value: new tower or worker id, new rank, refund or ticks run.
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<u64>,
    },

    /// Command failed. The game is unchanged.
    Error {
        /// Human-readable reason.
        message: String,
        /// Command name, when the line parsed.
        cmd: Option<String>,
    },

    /// Current game state.
    State {
        /// Snapshot.
        state: StateSnapshot,
    },

    /// A game event, forwarded as published.
    Event {
        /// Tick the event was published on.
        tick: u64,
        /// The event.
        event: GameEvent,
    },

    /// Goodbye message before shutdown.
    Bye,
}

// ============================================================================
// State Types
// ============================================================================

/// Everything the UI reads, in one object.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// Ticks simulated.
    pub tick: u64,
    /// Game phase.
    pub phase: GamePhase,
    /// Whether the game is paused.
    pub paused: bool,
    /// Current round.
    pub round: u32,
    /// Rounds to clear.
    pub max_rounds: u32,
    /// Gold balance.
    pub gold: u32,
    /// King health.
    pub king_health: u32,
    /// Seconds left on the countdown.
    #[serde(with = "fixed_serde")]
    pub inter_round_timer: Fixed,
    /// Live creeps.
    pub creeps: usize,
    /// Projectiles in flight.
    pub projectiles: usize,
    /// Towers.
    pub towers: Vec<TowerView>,
    /// Workers.
    pub workers: Vec<WorkerView>,
    /// Active augments.
    pub augments: Vec<Augment>,
    /// Pending augment offer.
    pub offered: Vec<Augment>,
    /// State hash.
    pub hash: u64,
}

impl StateSnapshot {
    /// Capture the current state of a game.
    #[must_use]
    pub fn capture(game: &Game) -> Self {
        Self {
            tick: game.tick_count(),
            phase: game.phase(),
            paused: game.is_paused(),
            round: game.current_round(),
            max_rounds: game.max_rounds(),
            gold: game.gold(),
            king_health: game.king_health(),
            inter_round_timer: game.inter_round_timer(),
            creeps: game.waves().creep_count(),
            projectiles: game.combat().projectile_count(),
            towers: game.all_towers(),
            workers: game.workers(),
            augments: game.active_augments(),
            offered: game.augments().offered().to_vec(),
            hash: game.state_hash(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl Response {
    /// Create a ready response.
    pub fn ready(game: &Game) -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION.to_string(),
            tick: game.tick_count(),
            hash: game.state_hash(),
        }
    }

    /// Create an acknowledgment.
    pub fn ack(cmd: &str, value: Option<u64>) -> Self {
        Self::Ack {
            cmd: cmd.to_string(),
            value,
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"Serialization failed: {e}"}}"#)
        });
        json.push('\n');
        json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tick_command() {
        let cmd = Command::from_json(r#"{"cmd":"tick","count":60}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Tick {
                count: 60,
                delta_ms: 100
            }
        );
    }

    #[test]
    fn test_default_tick_count() {
        let cmd = Command::from_json(r#"{"cmd":"tick"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Tick {
                count: 1,
                delta_ms: 100
            }
        );
    }

    #[test]
    fn test_parse_build_command() {
        let cmd = Command::from_json(r#"{"cmd":"build","slot":3,"tower_type":"fire"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Build {
                slot: 3,
                tower_type: TowerType::Fire
            }
        );
    }

    #[test]
    fn test_parse_augment_and_select() {
        assert_eq!(
            Command::from_json(r#"{"cmd":"choose_augment","augment":"rapid_fire"}"#).unwrap(),
            Command::ChooseAugment {
                augment: Augment::RapidFire
            }
        );
        assert_eq!(
            Command::from_json(r#"{"cmd":"select"}"#).unwrap(),
            Command::Select { tower: None }
        );
    }

    #[test]
    fn test_bad_lines_rejected() {
        assert!(matches!(Command::from_json("   "), Err(ProtocolError::Empty)));
        assert!(matches!(
            Command::from_json(r#"{"cmd":"launch_nukes"}"#),
            Err(ProtocolError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_serialize_ack_and_event() {
        let json = Response::ack("build", Some(1)).to_json_line();
        assert_eq!(json, "{\"type\":\"ack\",\"cmd\":\"build\",\"value\":1}\n");

        let json = Response::Event {
            tick: 7,
            event: GameEvent::GamePaused,
        }
        .to_json_line();
        assert!(json.contains(r#""type":"event""#));
        assert!(json.contains(r#""event":{"type":"game_paused"}"#));
    }
}
