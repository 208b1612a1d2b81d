//! The game controller: round cycle, king health, towers and slots.
//!
//! [`Game`] is the composition root. It builds the event bus and every
//! subsystem, drives them in a fixed order each tick, and routes queued
//! events to their owners until the queue is empty.
//!
//! ## Phases
//!
//! ```text
//! Setup -> InterRound <-> RoundActive -> Victory | Defeat
//!               ^              |
//!               |              v
//!               +---- AwaitingAugment
//! ```
//!
//! `paused` is orthogonal: it freezes the countdown, spawning and every
//! entity update. An augment offer pauses the game until a choice is made.
//!
//! ## Tick order
//!
//! 1. Inter-round countdown (may start a round)
//! 2. Waves: spawning, creep movement, burns
//! 3. Towers: targeting and firing
//! 4. Combat: projectile flight and impacts
//! 5. Workers: mining
//!
//! Events are routed after every step, so a creep killed by a projectile in
//! step 4 is rewarded and counted before step 5 runs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::augments::{Augment, AugmentSystem};
use crate::combat::CombatSystem;
use crate::config::GameConfig;
use crate::economy::Economy;
use crate::entity::{EntityStorage, SimEntity, SimRng, TickContext, VisualHandle};
use crate::error::{ConfigError, GameError, Result};
use crate::events::{EventBus, EventHandler, GameEvent, GameOutcome, GoldReason, MeshKind};
use crate::math::{fixed_serde, Fixed, Vec3Fixed, TIME_EPSILON};
use crate::tower::{Tower, TowerId, TowerType};
use crate::waves::WaveSystem;
use crate::worker::{WorkerCrew, WorkerId, WorkerView};

/// Top-level game phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    /// Built but not started.
    Setup,
    /// Counting down to the next round.
    InterRound,
    /// A round is running.
    RoundActive,
    /// Waiting for the player to pick an augment.
    AwaitingAugment,
    /// All rounds cleared.
    Victory,
    /// The king fell.
    Defeat,
}

impl GamePhase {
    /// Whether the game has ended.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Victory | Self::Defeat)
    }
}

/// A fixed build location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TowerSlot {
    /// Where a tower on this slot stands.
    pub position: Vec3Fixed,
    /// Tower on the slot, if any.
    pub occupant: Option<TowerId>,
    /// Slot marker visual, once the game has started.
    pub visual: Option<VisualHandle>,
}

impl TowerSlot {
    /// Whether a tower stands here.
    #[must_use]
    pub const fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

/// Read-only view of a tower for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TowerView {
    /// Tower id.
    pub id: TowerId,
    /// Tower type.
    pub tower_type: TowerType,
    /// Current rank.
    pub rank: u8,
    /// Slot index.
    pub slot: usize,
    /// Position.
    pub position: Vec3Fixed,
    /// Damage in effect.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
    /// Attack interval in effect.
    #[serde(with = "fixed_serde")]
    pub attack_interval: Fixed,
    /// Range in effect.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Gold invested.
    pub invested: u32,
    /// Gold a sale would return.
    pub sell_value: u32,
    /// Price of the next rank, `None` at max rank.
    pub upgrade_cost: Option<u32>,
}

/// Typed reads exposed to the UI.
pub trait GameQueries {
    /// Round in progress, or last started.
    fn current_round(&self) -> u32;
    /// Gold balance.
    fn gold(&self) -> u32;
    /// King health.
    fn king_health(&self) -> u32;
    /// Rounds to clear for victory.
    fn max_rounds(&self) -> u32;
    /// Seconds left on the inter-round countdown.
    fn inter_round_timer(&self) -> Fixed;
    /// Every tower in id order.
    fn all_towers(&self) -> Vec<TowerView>;
    /// Number of towers.
    fn tower_count(&self) -> usize;
    /// Every worker in id order.
    fn workers(&self) -> Vec<WorkerView>;
    /// Whether a round is running.
    fn is_round_active(&self) -> bool;
    /// Active augments in selection order.
    fn active_augments(&self) -> Vec<Augment>;
}

fn rejected(action: &'static str) -> impl FnOnce(GameError) -> GameError {
    move |err| {
        debug!(action, error = %err, "Action rejected");
        err
    }
}

/// One tower-defense session.
#[derive(Debug)]
pub struct Game {
    config: GameConfig,
    bus: EventBus,
    rng: SimRng,
    tick: u64,
    phase: GamePhase,
    paused: bool,
    king_health: u32,
    current_round: u32,
    inter_round_timer: Fixed,
    displayed_second: Option<i64>,
    economy: Economy,
    waves: WaveSystem,
    combat: CombatSystem,
    augments: AugmentSystem,
    towers: EntityStorage<Tower>,
    slots: Vec<TowerSlot>,
    crew: WorkerCrew,
    selected: Option<TowerId>,
}

impl Game {
    /// Build a game from a validated config.
    pub fn new(config: GameConfig) -> Result<Self> {
        config.validate()?;
        let slots = config
            .tower_slots
            .iter()
            .map(|&position| TowerSlot {
                position,
                occupant: None,
                visual: None,
            })
            .collect();

        Ok(Self {
            bus: EventBus::new(),
            rng: SimRng::seed_from_u64(config.seed),
            tick: 0,
            phase: GamePhase::Setup,
            paused: false,
            king_health: config.king_max_health,
            current_round: 0,
            inter_round_timer: Fixed::ZERO,
            displayed_second: None,
            economy: Economy::new(config.starting_gold, config.round_clear_bonus),
            waves: WaveSystem::new(&config),
            combat: CombatSystem::new(config.combat),
            augments: AugmentSystem::new(config.augments.clone()),
            towers: EntityStorage::new(),
            slots,
            crew: WorkerCrew::new(config.workers.clone()),
            selected: None,
            config,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The event bus, for subscribing.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// The config the game was built from.
    #[must_use]
    pub const fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Whether the game is paused.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Ticks simulated so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Final outcome, once the game has ended.
    #[must_use]
    pub const fn outcome(&self) -> Option<GameOutcome> {
        match self.phase {
            GamePhase::Victory => Some(GameOutcome::Victory),
            GamePhase::Defeat => Some(GameOutcome::Defeat),
            _ => None,
        }
    }

    /// Build slots.
    #[must_use]
    pub fn slots(&self) -> &[TowerSlot] {
        &self.slots
    }

    /// Look up a tower.
    #[must_use]
    pub fn tower(&self, id: TowerId) -> Option<&Tower> {
        self.towers.get(id)
    }

    /// Currently selected tower.
    #[must_use]
    pub const fn selected_tower(&self) -> Option<TowerId> {
        self.selected
    }

    /// Wave system, for inspection.
    #[must_use]
    pub const fn waves(&self) -> &WaveSystem {
        &self.waves
    }

    /// Combat system, for inspection.
    #[must_use]
    pub const fn combat(&self) -> &CombatSystem {
        &self.combat
    }

    /// Economy, for inspection.
    #[must_use]
    pub const fn economy(&self) -> &Economy {
        &self.economy
    }

    /// Augment system, for inspection.
    #[must_use]
    pub const fn augments(&self) -> &AugmentSystem {
        &self.augments
    }

    /// Cost of the next worker hire.
    #[must_use]
    pub fn next_worker_cost(&self) -> u32 {
        self.crew.next_cost()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.phase.is_finished() {
            Err(GameError::GameOver)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Announce the initial state and start the first countdown.
    ///
    /// Subscribe to the bus before calling this to see slot visuals and the
    /// initial notifications.
    pub fn start(&mut self) {
        if self.phase != GamePhase::Setup {
            return;
        }
        for slot in &mut self.slots {
            let handle = self.bus.request_visual(MeshKind::TowerSlot);
            slot.visual = Some(handle);
            self.bus.publish(GameEvent::AddToScene {
                handle,
                position: slot.position,
            });
        }
        self.bus.publish(GameEvent::KingHealthChanged {
            health: self.king_health,
            max_health: self.config.king_max_health,
        });
        self.bus.publish(GameEvent::TowerCountChanged {
            count: self.towers.len(),
        });
        info!(
            seed = self.config.seed,
            max_rounds = self.config.max_rounds,
            gold = self.economy.gold(),
            "Game started"
        );
        self.begin_countdown(self.config.first_round_delay);
        self.route_events();
    }

    /// Advance the simulation by `delta` seconds.
    ///
    /// The delta is clamped to `[0, max_tick_delta]`. Nothing happens before
    /// [`Game::start`], after the game ends, or while paused.
    pub fn tick(&mut self, delta: Fixed) {
        let delta = delta.clamp(Fixed::ZERO, self.config.max_tick_delta);
        if self.phase == GamePhase::Setup || self.phase.is_finished() || self.paused {
            return;
        }
        self.tick += 1;

        // 1. Countdown
        if self.phase == GamePhase::InterRound {
            self.advance_countdown(delta);
            self.route_events();
        }

        // 2. Waves
        self.waves.update(delta, &mut self.bus, &mut self.rng);
        self.route_events();
        if self.phase.is_finished() {
            return;
        }

        // 3. Towers
        let creeps = self.waves.snapshots();
        {
            let mut ctx = TickContext {
                delta,
                bus: &mut self.bus,
                rng: &mut self.rng,
                creeps: &creeps,
            };
            for id in self.towers.sorted_ids() {
                if let Some(tower) = self.towers.get_mut(id) {
                    tower.update(&mut ctx);
                }
            }
        }
        self.route_events();

        // 4. Combat
        let creeps = self.waves.snapshots();
        {
            let mut ctx = TickContext {
                delta,
                bus: &mut self.bus,
                rng: &mut self.rng,
                creeps: &creeps,
            };
            self.combat.update(&mut ctx);
        }
        self.route_events();
        if self.phase.is_finished() {
            return;
        }

        // 5. Workers
        {
            let mut ctx = TickContext {
                delta,
                bus: &mut self.bus,
                rng: &mut self.rng,
                creeps: &[],
            };
            self.crew.update(&mut ctx);
        }
        self.route_events();

        #[cfg(feature = "debug-validation")]
        self.check_invariants();
    }

    fn begin_countdown(&mut self, seconds: Fixed) {
        self.phase = GamePhase::InterRound;
        self.inter_round_timer = seconds;
        self.displayed_second = None;
        self.publish_timer();
    }

    fn publish_timer(&mut self) {
        let second = self.inter_round_timer.ceil().to_num::<i64>();
        if self.displayed_second != Some(second) {
            self.displayed_second = Some(second);
            self.bus.publish(GameEvent::InterRoundTimerUpdated {
                remaining: self.inter_round_timer,
            });
        }
    }

    fn advance_countdown(&mut self, delta: Fixed) {
        self.inter_round_timer -= delta;
        if self.inter_round_timer <= TIME_EPSILON {
            self.inter_round_timer = Fixed::ZERO;
        }
        self.publish_timer();
        if self.inter_round_timer == Fixed::ZERO {
            self.begin_round(self.current_round + 1);
        }
    }

    fn begin_round(&mut self, round: u32) {
        match self.waves.start_round(round, &mut self.bus, &mut self.rng) {
            Ok(()) => {
                self.current_round = round;
                self.phase = GamePhase::RoundActive;
                self.inter_round_timer = Fixed::ZERO;
            }
            Err(err) => {
                error!(round, error = %err, "Round could not start");
                self.begin_countdown(self.config.inter_round_delay);
            }
        }
    }

    /// Skip the rest of the countdown and start the next round now.
    pub fn start_next_round(&mut self) -> Result<u32> {
        let result = self.try_start_next_round();
        self.route_events();
        result.map_err(rejected("start_next_round"))
    }

    fn try_start_next_round(&mut self) -> Result<u32> {
        self.ensure_running()?;
        if self.paused {
            return Err(GameError::Paused);
        }
        if self.phase != GamePhase::InterRound {
            return Err(GameError::NotBetweenRounds);
        }
        let round = self.current_round + 1;
        self.waves.start_round(round, &mut self.bus, &mut self.rng)?;
        self.current_round = round;
        self.phase = GamePhase::RoundActive;
        self.inter_round_timer = Fixed::ZERO;
        Ok(round)
    }

    /// Freeze timers, spawning and entity updates.
    pub fn pause(&mut self) -> Result<()> {
        let result = self.try_pause();
        self.route_events();
        result.map_err(rejected("pause"))
    }

    fn try_pause(&mut self) -> Result<()> {
        self.ensure_running()?;
        if self.paused {
            return Err(GameError::Paused);
        }
        self.paused = true;
        self.waves.pause();
        info!(tick = self.tick, "Game paused");
        self.bus.publish(GameEvent::GamePaused);
        Ok(())
    }

    /// Resume after [`Game::pause`].
    pub fn resume(&mut self) -> Result<()> {
        let result = self.try_resume();
        self.route_events();
        result.map_err(rejected("resume"))
    }

    fn try_resume(&mut self) -> Result<()> {
        self.ensure_running()?;
        if self.phase == GamePhase::AwaitingAugment {
            return Err(GameError::AugmentPending);
        }
        if !self.paused {
            return Err(GameError::NotPaused);
        }
        self.paused = false;
        info!(tick = self.tick, "Game resumed");
        self.bus.publish(GameEvent::GameResumed);
        Ok(())
    }

    // ========================================================================
    // Event routing
    // ========================================================================

    /// Deliver queued events to their owning subsystems until none remain.
    fn route_events(&mut self) {
        while let Some(event) = self.bus.pop_pending() {
            // No gold moves once the game is decided.
            if !self.phase.is_finished() {
                self.economy.handle(&event, &mut self.bus);
            }
            self.waves.handle(&event, &mut self.bus);
            self.combat.handle(&event, &mut self.bus);
            self.on_routed(&event);
        }
    }

    fn on_routed(&mut self, event: &GameEvent) {
        match event {
            GameEvent::CreepReachedGoal { creep, damage } => {
                if self.phase.is_finished() {
                    return;
                }
                self.king_health = self.king_health.saturating_sub(*damage);
                debug!(creep = %creep, damage, health = self.king_health, "Creep reached the king");
                self.bus.publish(GameEvent::KingHealthChanged {
                    health: self.king_health,
                    max_health: self.config.king_max_health,
                });
                if self.king_health == 0 {
                    self.finish(GameOutcome::Defeat);
                }
            }
            GameEvent::RoundCompleted { round, .. } => {
                if self.phase != GamePhase::RoundActive {
                    return;
                }
                self.on_round_completed(*round);
            }
            _ => {}
        }
    }

    fn on_round_completed(&mut self, round: u32) {
        for tower in self.towers.values_mut() {
            self.augments.reset_round_scoped(tower);
        }

        if round >= self.config.max_rounds {
            self.finish(GameOutcome::Victory);
            return;
        }

        let next = round + 1;
        if self.augments.should_offer_before(next) {
            self.augments.offer(&mut self.rng, &mut self.bus);
            self.phase = GamePhase::AwaitingAugment;
            self.paused = true;
            self.waves.pause();
            self.bus.publish(GameEvent::GamePaused);
        } else {
            self.begin_countdown(self.config.inter_round_delay);
        }
    }

    fn finish(&mut self, outcome: GameOutcome) {
        self.waves.abort();
        self.phase = match outcome {
            GameOutcome::Victory => GamePhase::Victory,
            GameOutcome::Defeat => GamePhase::Defeat,
        };
        info!(?outcome, round = self.current_round, tick = self.tick, "Game over");
        self.bus.publish(GameEvent::GameOver {
            outcome,
            round: self.current_round,
        });
    }

    // ========================================================================
    // Augments
    // ========================================================================

    /// Pick an augment from the pending offer and resume play.
    pub fn choose_augment(&mut self, augment: Augment) -> Result<()> {
        let result = self.try_choose_augment(augment);
        self.route_events();
        result.map_err(rejected("choose_augment"))
    }

    fn try_choose_augment(&mut self, augment: Augment) -> Result<()> {
        self.ensure_running()?;
        if self.phase != GamePhase::AwaitingAugment {
            return Err(GameError::AugmentNotOffered(augment.name()));
        }
        self.augments.choose(augment, &mut self.bus)?;
        for tower in self.towers.values_mut() {
            augment.apply_to_tower(tower);
        }
        self.paused = false;
        self.bus.publish(GameEvent::GameResumed);
        self.begin_countdown(self.config.inter_round_delay);
        Ok(())
    }

    // ========================================================================
    // Towers
    // ========================================================================

    /// Build a rank-1 tower on an empty slot.
    pub fn build_tower(&mut self, slot: usize, tower_type: TowerType) -> Result<TowerId> {
        let result = self.try_build_tower(slot, tower_type);
        self.route_events();
        result.map_err(rejected("build_tower"))
    }

    fn try_build_tower(&mut self, slot: usize, tower_type: TowerType) -> Result<TowerId> {
        self.ensure_running()?;
        let position = match self.slots.get(slot) {
            None => return Err(GameError::UnknownSlot(slot)),
            Some(s) if s.is_occupied() => return Err(GameError::SlotOccupied(slot)),
            Some(s) => s.position,
        };
        let definition = self.config.tower(tower_type)?;
        let cost = definition
            .rank(1)
            .map(|stats| stats.cost)
            .ok_or(ConfigError::MissingTower(tower_type))?;
        self.economy
            .try_spend(cost, GoldReason::TowerBuilt, &mut self.bus)?;

        let visual = self.bus.request_visual(MeshKind::Tower {
            tower_type,
            rank: 1,
        });
        let id = self
            .towers
            .try_insert_with(|id| Tower::new(id, tower_type, definition, slot, position, visual))
            .ok_or(ConfigError::MissingTower(tower_type))?;
        if let Some(tower) = self.towers.get_mut(id) {
            self.augments.apply_active(tower);
        }
        self.slots[slot].occupant = Some(id);

        info!(tower = %id, slot, %tower_type, cost, "Tower built");
        self.bus.publish(GameEvent::AddToScene {
            handle: visual,
            position,
        });
        self.bus.publish(GameEvent::TowerBuilt {
            tower: id,
            slot,
            tower_type,
            cost,
        });
        self.bus.publish(GameEvent::TowerCountChanged {
            count: self.towers.len(),
        });
        Ok(id)
    }

    /// Upgrade a tower by one rank. Returns the new rank.
    pub fn upgrade_tower(&mut self, id: TowerId) -> Result<u8> {
        let result = self.try_upgrade_tower(id);
        self.route_events();
        result.map_err(rejected("upgrade_tower"))
    }

    fn try_upgrade_tower(&mut self, id: TowerId) -> Result<u8> {
        self.ensure_running()?;
        let tower = self.towers.get(id).ok_or(GameError::UnknownTower(id.raw()))?;
        let tower_type = tower.tower_type();
        let definition = self.config.tower(tower_type)?;
        let cost = tower.upgrade_cost(definition).ok_or(GameError::MaxRank {
            tower: id.raw(),
            rank: tower.rank(),
        })?;
        self.economy
            .try_spend(cost, GoldReason::TowerUpgraded, &mut self.bus)?;

        let Some(tower) = self.towers.get_mut(id) else {
            return Err(GameError::UnknownTower(id.raw()));
        };
        tower.upgrade(definition);
        self.augments.apply_active(tower);
        let rank = tower.rank();
        let handle = tower.visual();

        info!(tower = %id, rank, cost, "Tower upgraded");
        self.bus.publish(GameEvent::TowerUpgraded {
            tower: id,
            handle,
            tower_type,
            rank,
            cost,
        });
        Ok(rank)
    }

    /// Sell a tower. Returns the refund.
    pub fn sell_tower(&mut self, id: TowerId) -> Result<u32> {
        let result = self.try_sell_tower(id);
        self.route_events();
        result.map_err(rejected("sell_tower"))
    }

    fn try_sell_tower(&mut self, id: TowerId) -> Result<u32> {
        self.ensure_running()?;
        let mut tower = self
            .towers
            .remove(id)
            .ok_or(GameError::UnknownTower(id.raw()))?;
        let refund = tower.refund(self.config.sell_refund_percent);
        let slot = tower.slot();
        if let Some(s) = self.slots.get_mut(slot) {
            s.occupant = None;
        }
        tower.destroy(&mut self.bus);
        self.economy
            .grant(refund, GoldReason::TowerSold, &mut self.bus);

        info!(tower = %id, slot, refund, "Tower sold");
        self.bus.publish(GameEvent::TowerSold {
            tower: id,
            slot,
            refund,
        });
        self.bus.publish(GameEvent::TowerCountChanged {
            count: self.towers.len(),
        });
        if self.selected == Some(id) {
            self.selected = None;
            self.bus.publish(GameEvent::TowerSelected { tower: None });
        }
        Ok(refund)
    }

    /// Select a tower, or clear the selection with `None`.
    pub fn select_tower(&mut self, id: Option<TowerId>) -> Result<()> {
        let result = self.try_select_tower(id);
        self.route_events();
        result.map_err(rejected("select_tower"))
    }

    fn try_select_tower(&mut self, id: Option<TowerId>) -> Result<()> {
        if let Some(id) = id {
            if !self.towers.contains(id) {
                return Err(GameError::UnknownTower(id.raw()));
            }
        }
        self.selected = id;
        self.bus.publish(GameEvent::TowerSelected { tower: id });
        Ok(())
    }

    // ========================================================================
    // Workers
    // ========================================================================

    /// Hire a worker for the next free resource node.
    pub fn hire_worker(&mut self) -> Result<WorkerId> {
        let result = self.try_hire_worker();
        self.route_events();
        result.map_err(rejected("hire_worker"))
    }

    fn try_hire_worker(&mut self) -> Result<WorkerId> {
        self.ensure_running()?;
        let node = self.crew.check_hire()?;
        let cost = self.crew.next_cost();
        self.economy
            .try_spend(cost, GoldReason::WorkerHired, &mut self.bus)?;
        let worker = self.crew.spawn(node, &mut self.bus)?;
        info!(worker = %worker, node, cost, "Worker hired");
        self.bus.publish(GameEvent::WorkerHired { worker, node, cost });
        Ok(worker)
    }

    /// Dismiss a worker and free its resource node.
    pub fn remove_worker(&mut self, id: WorkerId) -> Result<()> {
        let result = self.try_remove_worker(id);
        self.route_events();
        result.map_err(rejected("remove_worker"))
    }

    fn try_remove_worker(&mut self, id: WorkerId) -> Result<()> {
        self.ensure_running()?;
        self.crew.remove(id, &mut self.bus)?;
        info!(worker = %id, "Worker removed");
        self.bus.publish(GameEvent::WorkerRemoved { worker: id });
        Ok(())
    }

    // ========================================================================
    // Renderer sync and determinism
    // ========================================================================

    /// Current position of every moving visual, for the renderer to copy.
    #[must_use]
    pub fn visual_positions(&self) -> Vec<(VisualHandle, Vec3Fixed)> {
        self.waves
            .visual_positions()
            .chain(self.combat.visual_positions())
            .chain(self.crew.visual_positions())
            .collect()
    }

    /// Hash of the simulation state.
    ///
    /// Two games built from the same config and fed the same inputs hash
    /// identically on the same build.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.phase.hash(&mut hasher);
        self.paused.hash(&mut hasher);
        self.king_health.hash(&mut hasher);
        self.current_round.hash(&mut hasher);
        self.inter_round_timer.to_bits().hash(&mut hasher);
        self.economy.gold().hash(&mut hasher);
        self.augments.active().hash(&mut hasher);
        self.rng.get_word_pos().hash(&mut hasher);
        for tower in self.towers.iter_sorted() {
            tower.hash_state(&mut hasher);
        }
        self.waves.hash_state(&mut hasher);
        self.combat.hash_state(&mut hasher);
        self.crew.hash_state(&mut hasher);
        hasher.finish()
    }

    #[cfg(feature = "debug-validation")]
    fn check_invariants(&self) {
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(id) = slot.occupant {
                if self.towers.get(id).map(Tower::slot) != Some(index) {
                    error!(slot = index, tower = %id, "Slot points at a missing or misplaced tower");
                }
            }
        }
        if let Some(progress) = self.waves.progress() {
            if progress.spawned > progress.total
                || progress.killed + progress.reached_goal > progress.spawned
            {
                error!(?progress, "Round accounting out of balance");
            }
        }
    }
}

impl GameQueries for Game {
    fn current_round(&self) -> u32 {
        self.current_round
    }

    fn gold(&self) -> u32 {
        self.economy.gold()
    }

    fn king_health(&self) -> u32 {
        self.king_health
    }

    fn max_rounds(&self) -> u32 {
        self.config.max_rounds
    }

    fn inter_round_timer(&self) -> Fixed {
        self.inter_round_timer
    }

    fn all_towers(&self) -> Vec<TowerView> {
        self.towers
            .iter_sorted()
            .map(|tower| {
                let upgrade_cost = self
                    .config
                    .towers
                    .get(&tower.tower_type())
                    .and_then(|definition| tower.upgrade_cost(definition));
                TowerView {
                    id: tower.id(),
                    tower_type: tower.tower_type(),
                    rank: tower.rank(),
                    slot: tower.slot(),
                    position: tower.position(),
                    damage: tower.stats.damage,
                    attack_interval: tower.effective_interval(),
                    range: tower.stats.range,
                    invested: tower.invested(),
                    sell_value: tower.refund(self.config.sell_refund_percent),
                    upgrade_cost,
                }
            })
            .collect()
    }

    fn tower_count(&self) -> usize {
        self.towers.len()
    }

    fn workers(&self) -> Vec<WorkerView> {
        self.crew.views()
    }

    fn is_round_active(&self) -> bool {
        self.phase == GamePhase::RoundActive
    }

    fn active_augments(&self) -> Vec<Augment> {
        self.augments.active().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::RoundDefinition;
    use crate::creep::CreepType;
    use crate::math::percent;

    fn config() -> GameConfig {
        let mut config = GameConfig::default();
        config.starting_gold = 1000;
        config.first_round_delay = Fixed::ONE;
        config.inter_round_delay = Fixed::ONE;
        config
    }

    fn started(config: GameConfig) -> Game {
        let mut game = Game::new(config).expect("valid config");
        game.start();
        game
    }

    fn run(game: &mut Game, seconds: u32) {
        for _ in 0..seconds * 10 {
            game.tick(percent(10));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GameConfig::default();
        config.paths.clear();
        assert!(matches!(
            Game::new(config),
            Err(GameError::Config(crate::error::ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_tick_before_start_is_noop() {
        let mut game = Game::new(config()).expect("valid");
        game.tick(Fixed::ONE);
        assert_eq!(game.tick_count(), 0);
        assert_eq!(game.phase(), GamePhase::Setup);
    }

    #[test]
    fn test_countdown_starts_first_round() {
        let mut game = started(config());
        assert_eq!(game.phase(), GamePhase::InterRound);
        run(&mut game, 2);
        assert_eq!(game.phase(), GamePhase::RoundActive);
        assert_eq!(game.current_round(), 1);
        assert!(game.is_round_active());
    }

    #[test]
    fn test_one_second_countdown_takes_ten_tenth_steps() {
        let mut game = started(config());
        for _ in 0..9 {
            game.tick(percent(10));
        }
        assert_eq!(game.phase(), GamePhase::InterRound);
        game.tick(percent(10));
        assert_eq!(game.phase(), GamePhase::RoundActive);
        assert_eq!(game.current_round(), 1);
    }

    #[test]
    fn test_delta_is_clamped() {
        let mut game = started(config());
        game.tick(Fixed::from_num(100));
        assert_eq!(game.phase(), GamePhase::InterRound);
        assert_eq!(game.inter_round_timer(), Fixed::ONE - percent(10));
    }

    #[test]
    fn test_build_and_reject_occupied_slot() {
        let mut game = started(config());
        let id = game.build_tower(0, TowerType::Basic).expect("build");
        assert_eq!(game.gold(), 950);
        assert_eq!(game.tower_count(), 1);
        assert!(game.slots()[0].is_occupied());
        assert!(matches!(
            game.build_tower(0, TowerType::Frost),
            Err(GameError::SlotOccupied(0))
        ));
        assert!(matches!(
            game.build_tower(99, TowerType::Frost),
            Err(GameError::UnknownSlot(99))
        ));
        assert_eq!(game.gold(), 950);
        assert_eq!(game.all_towers()[0].id, id);
    }

    #[test]
    fn test_upgrade_without_gold_changes_nothing() {
        let mut cfg = config();
        cfg.starting_gold = 60;
        let mut game = started(cfg);
        let id = game.build_tower(0, TowerType::Basic).expect("build");
        let before = game.all_towers()[0];

        assert!(matches!(
            game.upgrade_tower(id),
            Err(GameError::InsufficientGold {
                required: 40,
                available: 10
            })
        ));
        assert_eq!(game.all_towers()[0], before);
        assert_eq!(game.gold(), 10);
    }

    #[test]
    fn test_sell_after_two_upgrades_refunds_half() {
        let mut game = started(config());
        let id = game.build_tower(2, TowerType::Frost).expect("build");
        game.upgrade_tower(id).expect("rank 2");
        game.upgrade_tower(id).expect("rank 3");
        let invested = game.all_towers()[0].invested;
        assert_eq!(invested, 200);

        let gold_before = game.gold();
        let refund = game.sell_tower(id).expect("sell");
        assert_eq!(refund, invested / 2);
        assert_eq!(game.gold(), gold_before + refund);
        assert!(!game.slots()[2].is_occupied());
        assert!(game.tower(id).is_none());
        assert!(matches!(game.sell_tower(id), Err(GameError::UnknownTower(_))));
    }

    #[test]
    fn test_max_rank_rejected() {
        let mut game = started(config());
        let id = game.build_tower(0, TowerType::Basic).expect("build");
        for _ in 1..crate::tower::MAX_RANK {
            game.upgrade_tower(id).expect("upgrade");
        }
        assert!(matches!(
            game.upgrade_tower(id),
            Err(GameError::MaxRank { rank: 5, .. })
        ));
    }

    #[test]
    fn test_pause_resume_rules() {
        let mut game = started(config());
        assert!(matches!(game.resume(), Err(GameError::NotPaused)));
        game.pause().expect("pause");
        assert!(matches!(game.pause(), Err(GameError::Paused)));
        let hash = game.state_hash();
        run(&mut game, 3);
        assert_eq!(game.state_hash(), hash);
        game.resume().expect("resume");
        assert!(!game.is_paused());
    }

    #[test]
    fn test_start_next_round_early() {
        let mut game = started(config());
        assert_eq!(game.start_next_round().expect("start"), 1);
        assert!(matches!(
            game.start_next_round(),
            Err(GameError::NotBetweenRounds)
        ));
    }

    #[test]
    fn test_missing_round_keeps_counting_down() {
        let mut cfg = config();
        cfg.rounds = BTreeMap::from([(
            2,
            RoundDefinition {
                creep_type: CreepType::Swarm,
                difficulty: 1,
                count: 1,
                spawn_interval: Fixed::ONE,
                path: None,
            },
        )]);
        let mut game = started(cfg);
        assert!(matches!(
            game.start_next_round(),
            Err(GameError::Config(crate::error::ConfigError::MissingRound(1)))
        ));
        run(&mut game, 2);
        assert_eq!(game.phase(), GamePhase::InterRound);
        assert_eq!(game.current_round(), 0);
    }

    #[test]
    fn test_select_unknown_tower_rejected() {
        let mut game = started(config());
        assert!(matches!(
            game.select_tower(Some(TowerId::from_raw(42))),
            Err(GameError::UnknownTower(42))
        ));
        game.select_tower(None).expect("clear selection");
    }

    #[test]
    fn test_hire_and_remove_worker() {
        let mut game = started(config());
        let worker = game.hire_worker().expect("hire");
        assert_eq!(game.gold(), 950);
        assert_eq!(game.next_worker_cost(), 75);
        assert_eq!(game.workers().len(), 1);
        game.remove_worker(worker).expect("remove");
        assert!(game.workers().is_empty());
    }
}
