//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a game produces identical results
//! given the same config and the same scripted player actions.
//!
//! # Testing Strategy
//!
//! Replays and balance batches rely on a game being a pure function of its
//! seed and inputs. Sources of non-determinism include:
//!
//! - **Floating-point math**: We use fixed-point arithmetic via
//!   [`td_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Entities are always updated in sorted id order.
//!
//! - **System randomness**: Path choice, crit rolls and augment offers all
//!   draw from the game's seeded RNG.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Each subsystem in isolation
//! 2. **Property tests**: Random action scripts still replay identically
//! 3. **Parallel tests**: Running N games on separate threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use td_core::augments::Augment;
use td_core::config::GameConfig;
use td_core::game::{Game, GameQueries};
use td_core::tower::{TowerId, TowerType};

use crate::fixtures::step;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Assert that the runs matched.
    ///
    /// # Panics
    ///
    /// Panics if any run produced a different hash.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let mut unique = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Game is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// A scripted player input applied at a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedAction {
    /// Build a tower on a slot.
    Build {
        /// Slot index.
        slot: usize,
        /// Tower type.
        tower_type: TowerType,
    },
    /// Upgrade the n-th live tower (wrapping).
    Upgrade(usize),
    /// Sell the n-th live tower (wrapping).
    Sell(usize),
    /// Hire a worker.
    HireWorker,
    /// Skip the countdown.
    NextRound,
    /// Pick the n-th offered augment (wrapping).
    ChooseAugment(usize),
    /// Pause then resume.
    PauseResume,
}

fn nth_tower(game: &Game, index: usize) -> Option<TowerId> {
    let towers = game.all_towers();
    if towers.is_empty() {
        return None;
    }
    Some(towers[index % towers.len()].id)
}

/// Apply an action, ignoring rejections.
pub fn apply_action(game: &mut Game, action: ScriptedAction) {
    // Rejected actions are part of normal play and leave state unchanged.
    match action {
        ScriptedAction::Build { slot, tower_type } => {
            let _ = game.build_tower(slot, tower_type);
        }
        ScriptedAction::Upgrade(index) => {
            if let Some(id) = nth_tower(game, index) {
                let _ = game.upgrade_tower(id);
            }
        }
        ScriptedAction::Sell(index) => {
            if let Some(id) = nth_tower(game, index) {
                let _ = game.sell_tower(id);
            }
        }
        ScriptedAction::HireWorker => {
            let _ = game.hire_worker();
        }
        ScriptedAction::NextRound => {
            let _ = game.start_next_round();
        }
        ScriptedAction::ChooseAugment(index) => {
            let offered: Vec<Augment> = game.augments().offered().to_vec();
            if !offered.is_empty() {
                let _ = game.choose_augment(offered[index % offered.len()]);
            }
        }
        ScriptedAction::PauseResume => {
            let _ = game.pause();
            let _ = game.resume();
        }
    }
}

/// Run one game: start it, then for each tick apply any actions scheduled
/// for it and advance by the standard step. Returns the hash after every tick.
///
/// # Panics
///
/// Panics if the config is invalid.
#[must_use]
pub fn hash_trace(config: &GameConfig, script: &[(u64, ScriptedAction)], ticks: u64) -> Vec<u64> {
    let mut game = Game::new(config.clone()).expect("config should be valid");
    game.start();
    let mut trace = Vec::with_capacity(ticks as usize);
    for tick in 0..ticks {
        for &(_, action) in script.iter().filter(|(at, _)| *at == tick) {
            apply_action(&mut game, action);
        }
        game.tick(step());
        trace.push(game.state_hash());
    }
    trace
}

/// Run a game multiple times and verify determinism.
///
/// # Example
///
/// ```ignore
/// use td_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(3, 600, &GameConfig::default(), &[]);
/// result.assert_deterministic();
/// ```
#[must_use]
pub fn verify_determinism(
    runs: usize,
    ticks: u64,
    config: &GameConfig,
    script: &[(u64, ScriptedAction)],
) -> DeterminismResult {
    let hashes: Vec<u64> = (0..runs)
        .map(|_| hash_trace(config, script, ticks).last().copied().unwrap_or_default())
        .collect();
    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run N games on scoped threads and collect their final hashes.
///
/// # Panics
///
/// Panics if a worker thread panics.
#[must_use]
pub fn run_parallel_games(config: &GameConfig, num_games: usize, ticks: u64) -> DeterminismResult {
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_games)
            .map(|_| {
                s.spawn(|| {
                    hash_trace(config, &[], ticks)
                        .last()
                        .copied()
                        .unwrap_or_default()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("game thread panicked"))
            .collect()
    });
    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Compare two runs tick-by-tick, finding the first divergence.
///
/// `None` if the runs match, `Some(tick)` if they differ from that tick.
#[must_use]
pub fn find_first_divergence(
    a: &GameConfig,
    b: &GameConfig,
    script: &[(u64, ScriptedAction)],
    ticks: u64,
) -> Option<u64> {
    let left = hash_trace(a, script, ticks);
    let right = hash_trace(b, script, ticks);
    left.iter()
        .zip(&right)
        .position(|(l, r)| l != r)
        .map(|tick| tick as u64)
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
pub mod strategies {
    use proptest::prelude::*;
    use td_core::tower::TowerType;

    use super::ScriptedAction;

    /// Any tower type.
    pub fn arb_tower_type() -> impl Strategy<Value = TowerType> {
        prop_oneof![
            Just(TowerType::Basic),
            Just(TowerType::Frost),
            Just(TowerType::Fire),
        ]
    }

    /// Any scripted action. Slot indices may be out of range.
    pub fn arb_action() -> impl Strategy<Value = ScriptedAction> {
        prop_oneof![
            3 => (0usize..10, arb_tower_type())
                .prop_map(|(slot, tower_type)| ScriptedAction::Build { slot, tower_type }),
            2 => (0usize..8).prop_map(ScriptedAction::Upgrade),
            1 => (0usize..8).prop_map(ScriptedAction::Sell),
            1 => Just(ScriptedAction::HireWorker),
            1 => Just(ScriptedAction::NextRound),
            1 => (0usize..3).prop_map(ScriptedAction::ChooseAugment),
            1 => Just(ScriptedAction::PauseResume),
        ]
    }

    /// A script of actions at ticks below `max_tick`.
    pub fn arb_script(
        max_len: usize,
        max_tick: u64,
    ) -> impl Strategy<Value = Vec<(u64, ScriptedAction)>> {
        proptest::collection::vec((0..max_tick, arb_action()), 0..max_len)
    }

    /// A seed for the simulation RNG.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }
}
