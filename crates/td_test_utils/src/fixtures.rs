//! Test fixtures and helpers.
//!
//! Pre-built configs and small drivers for consistent testing.

use std::collections::BTreeMap;

use fixed::types::I32F32;
use td_core::config::{GameConfig, PathDefinition, RoundDefinition};
use td_core::creep::CreepType;
use td_core::game::Game;
use td_core::math::{percent, Vec3Fixed};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// The standard tick delta used by tests: 100 ms.
#[must_use]
pub fn step() -> I32F32 {
    percent(10)
}

/// Default config with short countdowns and a deep purse.
#[must_use]
pub fn quick_config() -> GameConfig {
    GameConfig {
        starting_gold: 10_000,
        first_round_delay: fixed(1),
        inter_round_delay: fixed(1),
        ..GameConfig::default()
    }
}

/// A single straight path from x = -10 to x = 10 and one round of
/// `count` creeps of `creep_type`.
#[must_use]
pub fn lane_config(creep_type: CreepType, count: u32) -> GameConfig {
    GameConfig {
        max_rounds: 1,
        paths: vec![PathDefinition {
            spawn: Vec3Fixed::from_ints(-10, 0, 0),
            waypoints: vec![Vec3Fixed::from_ints(10, 0, 0)],
        }],
        rounds: BTreeMap::from([(
            1,
            RoundDefinition {
                creep_type,
                difficulty: 1,
                count,
                spawn_interval: fixed(1),
                path: None,
            },
        )]),
        tower_slots: vec![
            Vec3Fixed::from_ints(0, 0, 2),
            Vec3Fixed::from_ints(-5, 0, 2),
            Vec3Fixed::from_ints(5, 0, 2),
        ],
        ..quick_config()
    }
}

/// Build and start a game.
///
/// # Panics
///
/// Panics if the config is invalid.
#[must_use]
pub fn started_game(config: GameConfig) -> Game {
    let mut game = Game::new(config).expect("fixture config should be valid");
    game.start();
    game
}

/// Tick the game for `seconds` seconds of simulated time.
pub fn run_seconds(game: &mut Game, seconds: u32) {
    for _ in 0..seconds * 10 {
        game.tick(step());
    }
}

/// Tick until `done` holds or `max_ticks` pass. Returns ticks taken.
pub fn run_until(game: &mut Game, max_ticks: u64, mut done: impl FnMut(&Game) -> bool) -> Option<u64> {
    for tick in 0..max_ticks {
        if done(game) {
            return Some(tick);
        }
        game.tick(step());
    }
    done(game).then_some(max_ticks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_are_valid() {
        assert!(quick_config().validate().is_ok());
        assert!(lane_config(CreepType::Swarm, 3).validate().is_ok());
    }

    #[test]
    fn test_step_is_a_tenth() {
        assert!(step() <= fixed_f(0.1));
        assert!(step() > fixed_f(0.0999));
    }
}
