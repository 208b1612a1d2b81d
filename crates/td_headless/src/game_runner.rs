//! Run a scenario to completion without a controller.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use td_core::error::GameError;
use td_core::events::{GameEvent, GameOutcome, GoldReason};
use td_core::game::{Game, GamePhase, GameQueries};
use td_core::math::from_millis;
use tracing::{debug, info};

use crate::scenario::{Scenario, ScenarioAction};

/// Counters gathered from the event stream of one game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetrics {
    /// Creeps spawned.
    pub creeps_spawned: u32,
    /// Creeps killed.
    pub creeps_killed: u32,
    /// Creeps that reached the king.
    pub creeps_leaked: u32,
    /// Rounds completed.
    pub rounds_completed: u32,
    /// Towers built.
    pub towers_built: u32,
    /// Tower upgrades bought.
    pub upgrades: u32,
    /// Gold earned from kills.
    pub kill_gold: u64,
    /// Gold earned by workers.
    pub mined_gold: u64,
    /// Gold earned from round bonuses and interest.
    pub round_gold: u64,
    /// Gold spent.
    pub gold_spent: u64,
}

impl GameMetrics {
    /// Fold one event into the counters.
    pub fn record(&mut self, event: &GameEvent) {
        match event {
            GameEvent::CreepSpawned { .. } => self.creeps_spawned += 1,
            GameEvent::CreepKilled { .. } => self.creeps_killed += 1,
            GameEvent::CreepReachedGoal { .. } => self.creeps_leaked += 1,
            GameEvent::RoundCompleted { .. } => self.rounds_completed += 1,
            GameEvent::TowerBuilt { .. } => self.towers_built += 1,
            GameEvent::TowerUpgraded { .. } => self.upgrades += 1,
            GameEvent::GoldChanged { delta, reason, .. } => {
                let amount = delta.unsigned_abs();
                match reason {
                    _ if *delta < 0 => self.gold_spent += amount,
                    GoldReason::CreepKilled => self.kill_gold += amount,
                    GoldReason::Mining => self.mined_gold += amount,
                    GoldReason::RoundBonus | GoldReason::Interest => self.round_gold += amount,
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Seed used.
    pub seed: u64,
    /// Final outcome, `None` if the tick limit was hit first.
    pub outcome: Option<GameOutcome>,
    /// Last round started.
    pub final_round: u32,
    /// Ticks simulated.
    pub ticks: u64,
    /// King health at the end.
    pub king_health: u32,
    /// Gold at the end.
    pub gold: u32,
    /// Scripted actions the game rejected.
    pub rejected_actions: u32,
    /// Event counters.
    pub metrics: GameMetrics,
    /// Final state hash.
    pub final_state_hash: u64,
}

fn apply(game: &mut Game, action: ScenarioAction) -> Result<(), GameError> {
    let on_slot = |game: &Game, slot: usize| {
        game.slots()
            .get(slot)
            .and_then(|s| s.occupant)
            .ok_or(GameError::UnknownSlot(slot))
    };
    match action {
        ScenarioAction::Build { slot, tower_type } => game.build_tower(slot, tower_type).map(drop),
        ScenarioAction::Upgrade { slot } => {
            let tower = on_slot(game, slot)?;
            game.upgrade_tower(tower).map(drop)
        }
        ScenarioAction::Sell { slot } => {
            let tower = on_slot(game, slot)?;
            game.sell_tower(tower).map(drop)
        }
        ScenarioAction::HireWorker => game.hire_worker().map(drop),
        ScenarioAction::NextRound => game.start_next_round().map(drop),
    }
}

/// Run a scenario with `seed` replacing the scenario's own seed.
pub fn run_scenario(scenario: &Scenario, seed: u64) -> Result<RunSummary, GameError> {
    let started = Instant::now();
    let mut config = scenario.config.clone();
    config.seed = seed;
    let mut game = Game::new(config)?;

    let metrics = Rc::new(RefCell::new(GameMetrics::default()));
    let sink = Rc::clone(&metrics);
    game.bus_mut().subscribe_all(move |event| {
        sink.borrow_mut().record(event);
        Ok(())
    });
    game.start();

    let delta = from_millis(scenario.tick_ms);
    let mut actions = scenario.actions.clone();
    actions.sort_by_key(|a| a.tick);
    let mut next_action = 0;
    let mut rejected_actions = 0;
    let mut ticks = 0;

    while ticks < scenario.max_ticks && !game.phase().is_finished() {
        while let Some(timed) = actions.get(next_action).filter(|a| a.tick <= ticks) {
            if let Err(err) = apply(&mut game, timed.action) {
                debug!(tick = ticks, action = ?timed.action, error = %err, "Scripted action rejected");
                rejected_actions += 1;
            }
            next_action += 1;
        }

        if game.phase() == GamePhase::AwaitingAugment && scenario.auto_augment {
            if let Some(&augment) = game.augments().offered().first() {
                game.choose_augment(augment)?;
            }
        }

        game.tick(delta);
        ticks += 1;
    }

    let summary = RunSummary {
        scenario: scenario.name.clone(),
        seed,
        outcome: game.outcome(),
        final_round: game.current_round(),
        ticks,
        king_health: game.king_health(),
        gold: game.gold(),
        rejected_actions,
        metrics: *metrics.borrow(),
        final_state_hash: game.state_hash(),
    };
    info!(
        scenario = %summary.scenario,
        seed,
        outcome = ?summary.outcome,
        round = summary.final_round,
        ticks,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Scenario finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use td_core::config::{PathDefinition, RoundDefinition};
    use td_core::creep::CreepType;
    use td_core::math::{Fixed, Vec3Fixed};
    use td_core::tower::TowerType;

    use super::*;
    use crate::scenario::TimedAction;

    fn lane(creep_type: CreepType, count: u32) -> Scenario {
        let mut scenario = Scenario::default();
        let config = &mut scenario.config;
        config.starting_gold = 1000;
        config.max_rounds = 1;
        config.first_round_delay = Fixed::ONE;
        config.paths = vec![PathDefinition {
            spawn: Vec3Fixed::from_ints(-10, 0, 0),
            waypoints: vec![Vec3Fixed::from_ints(10, 0, 0)],
        }];
        config.rounds = BTreeMap::from([(
            1,
            RoundDefinition {
                creep_type,
                difficulty: 1,
                count,
                spawn_interval: Fixed::ONE,
                path: None,
            },
        )]);
        config.tower_slots = vec![Vec3Fixed::from_ints(0, 0, 2), Vec3Fixed::from_ints(-5, 0, 2)];
        scenario.max_ticks = 1000;
        scenario
    }

    #[test]
    fn test_undefended_lane_leaks_everything() {
        let summary = run_scenario(&lane(CreepType::Swarm, 4), 1).unwrap();
        assert_eq!(summary.outcome, Some(GameOutcome::Victory));
        assert_eq!(summary.metrics.creeps_spawned, 4);
        assert_eq!(summary.metrics.creeps_leaked, 4);
        assert_eq!(summary.king_health, 16);
    }

    #[test]
    fn test_scripted_towers_kill_and_earn() {
        let mut scenario = lane(CreepType::Swarm, 4);
        scenario.actions = vec![
            TimedAction {
                tick: 0,
                action: ScenarioAction::Build { slot: 0, tower_type: TowerType::Basic },
            },
            TimedAction {
                tick: 0,
                action: ScenarioAction::Build { slot: 1, tower_type: TowerType::Basic },
            },
            TimedAction {
                tick: 1,
                action: ScenarioAction::Upgrade { slot: 5 },
            },
        ];
        let summary = run_scenario(&scenario, 1).unwrap();
        assert_eq!(summary.metrics.towers_built, 2);
        assert_eq!(summary.rejected_actions, 1);
        assert_eq!(summary.metrics.gold_spent, 100);
        assert!(summary.metrics.creeps_killed > 0);
        assert_eq!(
            summary.metrics.creeps_killed + summary.metrics.creeps_leaked,
            summary.metrics.creeps_spawned
        );
    }

    #[test]
    fn test_same_seed_same_summary() {
        let scenario = Scenario::standard_defence();
        let mut short = scenario.clone();
        short.max_ticks = 600;
        assert_eq!(run_scenario(&short, 3).unwrap(), run_scenario(&short, 3).unwrap());
    }
}
