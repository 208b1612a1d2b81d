//! Error types for the game simulation.
//!
//! Two families live here:
//! - [`ConfigError`] - a definition is missing or malformed. Fatal to the
//!   action that needed it (a round does not start, a tower is not built),
//!   never to the process.
//! - [`GameError`] - everything a player action can be rejected for. These
//!   come from ordinary timing races (a slot filled between selection and
//!   click), so callers treat them as a no-op with a log line.

use thiserror::Error;

use crate::tower::TowerType;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Problems with loaded configuration data.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No round definition exists for the requested round number.
    #[error("No round definition for round {0}")]
    MissingRound(u32),

    /// A round or creep references a path index that does not exist.
    #[error("No path with index {0}")]
    MissingPath(usize),

    /// No tower definition for the requested tower type.
    #[error("No tower definition for {0:?}")]
    MissingTower(TowerType),

    /// A round references a creep archetype that is not defined.
    #[error("No creep archetype for {0}")]
    MissingCreepType(String),

    /// Config file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed as RON.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Validation found one or more problems.
    #[error("Invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Top-level error type for simulation actions.
#[derive(Debug, Error)]
pub enum GameError {
    /// Configuration problem surfaced while performing an action.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Slot index does not exist.
    #[error("Unknown tower slot: {0}")]
    UnknownSlot(usize),

    /// Slot already holds a tower.
    #[error("Tower slot {0} is already occupied")]
    SlotOccupied(usize),

    /// Tower id does not resolve to a live tower.
    #[error("Unknown tower: {0}")]
    UnknownTower(u64),

    /// Worker id does not resolve to a live worker.
    #[error("Unknown worker: {0}")]
    UnknownWorker(u64),

    /// Tower is already at its highest rank.
    #[error("Tower {tower} is already at max rank {rank}")]
    MaxRank {
        /// Tower id.
        tower: u64,
        /// Current (maximum) rank.
        rank: u8,
    },

    /// Not enough gold for the action.
    #[error("Insufficient gold: need {required}, have {available}")]
    InsufficientGold {
        /// Gold required.
        required: u32,
        /// Gold available.
        available: u32,
    },

    /// A round is already running.
    #[error("Round {0} is already active")]
    RoundAlreadyActive(u32),

    /// The action needs the inter-round countdown to be running.
    #[error("No round can be started right now")]
    NotBetweenRounds,

    /// The game has ended.
    #[error("Game is over")]
    GameOver,

    /// The game is paused.
    #[error("Game is paused")]
    Paused,

    /// Resume was requested while not paused.
    #[error("Game is not paused")]
    NotPaused,

    /// Resume was requested while an augment choice is pending.
    #[error("An augment must be chosen before resuming")]
    AugmentPending,

    /// The augment is not among the current offer.
    #[error("Augment {0} was not offered")]
    AugmentNotOffered(&'static str),

    /// The augment is already active.
    #[error("Augment {0} is already active")]
    AugmentAlreadyActive(&'static str),

    /// The active augment limit has been reached.
    #[error("Active augment limit of {0} reached")]
    AugmentLimitReached(usize),

    /// The worker limit has been reached.
    #[error("Worker limit of {0} reached")]
    WorkerLimitReached(usize),

    /// Every resource node is already claimed.
    #[error("No free resource node for a new worker")]
    NoFreeResource,
}
