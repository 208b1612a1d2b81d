//! Round scheduling, spawning and creep bookkeeping.
//!
//! Per round the system moves through:
//!
//! ```text
//! Idle -> Spawning -> Draining -> Idle
//! ```
//!
//! Spawning is a scheduler driven purely by the delta passed to
//! [`WaveSystem::update`]: no timer exists outside that call, so pausing
//! only has to stop calling it (and clear the partial interval).

use std::collections::BTreeMap;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{CreepArchetype, GameConfig, PathDefinition, RoundDefinition};
use crate::creep::{Creep, CreepId, CreepSnapshot, CreepState, CreepType};
use crate::entity::{EntityStorage, SimEntity, SimRng, TickContext, VisualHandle};
use crate::error::{ConfigError, GameError, Result};
use crate::events::{EventBus, EventHandler, GameEvent, MeshKind};
use crate::math::{interval_elapsed, percent, Fixed, Vec3Fixed};

/// Phase of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WavePhase {
    /// No round running.
    Idle,
    /// Creeps still to spawn.
    Spawning,
    /// All spawned; waiting for the field to clear.
    Draining,
}

/// Counters for the running round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundProgress {
    /// Round number.
    pub round: u32,
    /// Creeps the round will spawn.
    pub total: u32,
    /// Creeps spawned so far.
    pub spawned: u32,
    /// Creeps killed.
    pub killed: u32,
    /// Creeps that reached the king.
    pub reached_goal: u32,
}

#[derive(Debug, Clone)]
struct ActiveRound {
    definition: RoundDefinition,
    archetype: CreepArchetype,
    health_scale: Fixed,
    progress: RoundProgress,
    spawn_timer: Fixed,
}

/// Owner of paths, round definitions and the live creeps.
#[derive(Debug, Clone)]
pub struct WaveSystem {
    paths: Vec<PathDefinition>,
    rounds: BTreeMap<u32, RoundDefinition>,
    archetypes: BTreeMap<CreepType, CreepArchetype>,
    difficulty_health_percent: u32,
    waypoint_epsilon: Fixed,
    creeps: EntityStorage<Creep>,
    phase: WavePhase,
    active: Option<ActiveRound>,
}

impl WaveSystem {
    /// Build from the game config.
    #[must_use]
    pub fn new(config: &GameConfig) -> Self {
        Self {
            paths: config.paths.clone(),
            rounds: config.rounds.clone(),
            archetypes: config.creeps.clone(),
            difficulty_health_percent: config.difficulty_health_percent,
            waypoint_epsilon: config.waypoint_epsilon,
            creeps: EntityStorage::new(),
            phase: WavePhase::Idle,
            active: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> WavePhase {
        self.phase
    }

    /// Whether a round is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase != WavePhase::Idle
    }

    /// Counters of the running round.
    #[must_use]
    pub fn progress(&self) -> Option<RoundProgress> {
        self.active.as_ref().map(|a| a.progress)
    }

    /// Number of creeps on the field.
    #[must_use]
    pub fn creep_count(&self) -> usize {
        self.creeps.len()
    }

    /// Look up a live creep.
    #[must_use]
    pub fn creep(&self, id: CreepId) -> Option<&Creep> {
        self.creeps.get(id)
    }

    /// Creeps in id order.
    pub fn creeps(&self) -> impl Iterator<Item = &Creep> {
        self.creeps.iter_sorted()
    }

    /// Path table.
    #[must_use]
    pub fn paths(&self) -> &[PathDefinition] {
        &self.paths
    }

    /// Target feed: every live creep, in id order.
    ///
    /// Filtering and ranking are the tower's business.
    #[must_use]
    pub fn snapshots(&self) -> Vec<CreepSnapshot> {
        self.creeps
            .iter_sorted()
            .filter(|c| c.is_alive())
            .map(Creep::snapshot)
            .collect()
    }

    /// Health multiplier for a difficulty level.
    #[must_use]
    pub fn health_scale(&self, difficulty: u32) -> Fixed {
        let levels = difficulty.saturating_sub(1);
        Fixed::ONE + percent(self.difficulty_health_percent) * Fixed::from_num(levels)
    }

    /// Start round `round`.
    ///
    /// The first creep spawns immediately. Fails if a round is running or a
    /// definition the round needs is missing.
    pub fn start_round(&mut self, round: u32, bus: &mut EventBus, rng: &mut SimRng) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(GameError::RoundAlreadyActive(active.progress.round));
        }
        let definition = self
            .rounds
            .get(&round)
            .cloned()
            .ok_or(ConfigError::MissingRound(round))?;
        let archetype = *self
            .archetypes
            .get(&definition.creep_type)
            .ok_or_else(|| ConfigError::MissingCreepType(definition.creep_type.name().to_string()))?;
        match definition.path {
            Some(path) if path >= self.paths.len() => return Err(ConfigError::MissingPath(path).into()),
            None if self.paths.is_empty() => return Err(ConfigError::MissingPath(0).into()),
            _ => {}
        }

        info!(
            round,
            creep_type = %definition.creep_type,
            count = definition.count,
            "Round started"
        );
        bus.publish(GameEvent::RoundStarted {
            round,
            creep_type: definition.creep_type,
            count: definition.count,
        });

        let health_scale = self.health_scale(definition.difficulty);
        self.active = Some(ActiveRound {
            progress: RoundProgress {
                round,
                total: definition.count,
                spawned: 0,
                killed: 0,
                reached_goal: 0,
            },
            definition,
            archetype,
            health_scale,
            spawn_timer: Fixed::ZERO,
        });
        self.phase = WavePhase::Spawning;
        self.spawn_next(bus, rng);
        Ok(())
    }

    /// Clear the partial spawn interval. Counters are untouched.
    pub fn pause(&mut self) {
        if let Some(active) = &mut self.active {
            active.spawn_timer = Fixed::ZERO;
        }
    }

    /// Stop the running round without completing it.
    pub fn abort(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(round = active.progress.round, "Round aborted");
        }
        self.phase = WavePhase::Idle;
    }

    /// Advance spawning, move creeps, then sweep resolved ones.
    pub fn update(&mut self, delta: Fixed, bus: &mut EventBus, rng: &mut SimRng) {
        if self.phase == WavePhase::Spawning {
            if let Some(active) = &mut self.active {
                active.spawn_timer += delta;
            }
            while self.spawn_due() {
                if let Some(active) = &mut self.active {
                    active.spawn_timer -= active.definition.spawn_interval;
                }
                self.spawn_next(bus, rng);
            }
        }

        {
            let mut ctx = TickContext {
                delta,
                bus: &mut *bus,
                rng: &mut *rng,
                creeps: &[],
            };
            for id in self.creeps.sorted_ids() {
                if let Some(creep) = self.creeps.get_mut(id) {
                    creep.update(&mut ctx);
                }
            }
        }

        self.sweep(bus);
    }

    fn spawn_due(&self) -> bool {
        self.phase == WavePhase::Spawning
            && self.active.as_ref().is_some_and(|a| {
                interval_elapsed(a.spawn_timer, a.definition.spawn_interval)
                    && a.progress.spawned < a.progress.total
            })
    }

    fn spawn_next(&mut self, bus: &mut EventBus, rng: &mut SimRng) {
        let Some(active) = &mut self.active else {
            return;
        };

        if active.progress.spawned < active.progress.total {
            let path_index = active
                .definition
                .path
                .unwrap_or_else(|| rng.gen_range(0..self.paths.len()));
            if let Some(path) = self.paths.get(path_index) {
                let creep_type = active.definition.creep_type;
                let visual = bus.request_visual(MeshKind::Creep { creep_type });
                let archetype = active.archetype;
                let scale = active.health_scale;
                let epsilon = self.waypoint_epsilon;
                let id = self.creeps.insert_with(|id| {
                    Creep::new(id, creep_type, &archetype, scale, path_index, path, visual, epsilon)
                });
                active.progress.spawned += 1;
                debug!(
                    creep = %id,
                    round = active.progress.round,
                    spawned = active.progress.spawned,
                    path = path_index,
                    "Creep spawned"
                );
                bus.publish(GameEvent::AddToScene {
                    handle: visual,
                    position: path.spawn,
                });
                bus.publish(GameEvent::CreepSpawned {
                    creep: id,
                    creep_type,
                    path: path_index,
                });
            }
        }

        if active.progress.spawned >= active.progress.total {
            self.phase = WavePhase::Draining;
        }
    }

    /// Remove resolved creeps, count them and check for round completion.
    pub fn sweep(&mut self, bus: &mut EventBus) {
        for mut creep in self.creeps.drain_where(|c| !c.is_alive()) {
            if let Some(active) = &mut self.active {
                match creep.state() {
                    CreepState::Killed => active.progress.killed += 1,
                    CreepState::ReachedGoal => active.progress.reached_goal += 1,
                    CreepState::Alive => {}
                }
            }
            creep.destroy(bus);
        }
        self.check_completion(bus);
    }

    fn check_completion(&mut self, bus: &mut EventBus) {
        if self.phase != WavePhase::Draining || !self.creeps.is_empty() {
            return;
        }
        let Some(active) = &self.active else {
            return;
        };
        let p = active.progress;
        if p.spawned != p.killed + p.reached_goal {
            return;
        }

        info!(
            round = p.round,
            killed = p.killed,
            reached_goal = p.reached_goal,
            "Round completed"
        );
        self.active = None;
        self.phase = WavePhase::Idle;
        bus.publish(GameEvent::RoundCompleted {
            round: p.round,
            spawned: p.spawned,
            killed: p.killed,
            reached_goal: p.reached_goal,
        });
    }

    /// Visual handles and positions of creeps in id order.
    pub fn visual_positions(&self) -> impl Iterator<Item = (VisualHandle, Vec3Fixed)> + '_ {
        self.creeps
            .iter_sorted()
            .map(|c| (c.visual(), c.position()))
    }

    /// Feed wave state into a state hash.
    pub fn hash_state<H: std::hash::Hasher>(&self, hasher: &mut H) {
        use std::hash::Hash;
        self.phase.hash(hasher);
        if let Some(active) = &self.active {
            active.progress.round.hash(hasher);
            active.progress.spawned.hash(hasher);
            active.progress.killed.hash(hasher);
            active.progress.reached_goal.hash(hasher);
            active.spawn_timer.to_bits().hash(hasher);
        }
        for creep in self.creeps.iter_sorted() {
            creep.hash_state(hasher);
        }
    }
}

impl EventHandler for WaveSystem {
    fn handle(&mut self, event: &GameEvent, bus: &mut EventBus) {
        if let GameEvent::CreepHit {
            creep,
            damage,
            effect,
            ..
        } = event
        {
            let Some(target) = self.creeps.get_mut(*creep) else {
                return;
            };
            if target.apply_hit(*damage, *effect, bus) {
                self.sweep(bus);
            }
        }
    }
}
