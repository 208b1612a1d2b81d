//! # TD Core
//!
//! Deterministic simulation core for King's Road TD.
//!
//! This crate contains **only** simulation logic:
//! - No rendering (visuals are requested through events)
//! - No IO beyond loading config files
//! - No system randomness (one seeded RNG per game)
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Headless runs for scenario testing and balance batches
//! - Replays from a seed and an input log
//! - Determinism testing via [`game::Game::state_hash`]
//!
//! ## Crate Structure
//!
//! - [`game`] - Game controller, phases and player actions
//! - [`events`] - Event bus and the event catalog
//! - [`waves`] - Round spawning and creep ownership
//! - [`creep`] - Creeps, status effects and path walking
//! - [`tower`] - Towers, targeting and firing
//! - [`combat`] - Projectiles and hit resolution
//! - [`economy`] - Gold balance
//! - [`augments`] - Between-round modifiers
//! - [`worker`] - Gold-mining workers
//! - [`config`] - Tunable game data
//! - [`entity`] - Entity ids, storage and lifecycle
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod augments;
pub mod combat;
pub mod config;
pub mod creep;
pub mod economy;
pub mod entity;
pub mod error;
pub mod events;
pub mod game;
pub mod math;
pub mod projectile;
pub mod tower;
pub mod waves;
pub mod worker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::augments::Augment;
    pub use crate::config::GameConfig;
    pub use crate::creep::{CreepId, CreepType, StatusEffect};
    pub use crate::entity::{EntityId, SimEntity, VisualHandle};
    pub use crate::error::{ConfigError, GameError, Result};
    pub use crate::events::{EventBus, EventKind, GameEvent, GameOutcome, MeshKind};
    pub use crate::game::{Game, GamePhase, GameQueries, TowerView};
    pub use crate::math::{percent, Fixed, Vec3Fixed};
    pub use crate::tower::{TowerId, TowerType};
    pub use crate::worker::{WorkerId, WorkerView};
}
