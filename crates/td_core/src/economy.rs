//! Gold balance and the modifiers augments place on it.

use serde::Serialize;
use tracing::debug;

use crate::error::{GameError, Result};
use crate::events::{EventBus, EventHandler, GameEvent, GoldReason};

/// Economy-wide modifiers. Augments raise these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EconomyModifiers {
    /// Extra gold per kill.
    pub kill_bonus: u32,
    /// Round-end interest on the balance, in percent.
    pub interest_percent: u32,
    /// Maximum interest per round.
    pub interest_cap: u32,
    /// Extra mining yield, in percent.
    pub mining_bonus_percent: u32,
}

/// Owner of the gold balance.
///
/// Every change publishes [`GameEvent::GoldChanged`].
#[derive(Debug, Clone)]
pub struct Economy {
    gold: u32,
    round_clear_bonus: u32,
    modifiers: EconomyModifiers,
}

impl Economy {
    /// Create with a starting balance.
    #[must_use]
    pub fn new(starting_gold: u32, round_clear_bonus: u32) -> Self {
        Self {
            gold: starting_gold,
            round_clear_bonus,
            modifiers: EconomyModifiers::default(),
        }
    }

    /// Current balance.
    #[must_use]
    pub const fn gold(&self) -> u32 {
        self.gold
    }

    /// Current modifiers.
    #[must_use]
    pub const fn modifiers(&self) -> &EconomyModifiers {
        &self.modifiers
    }

    /// Mutable modifiers, for augments.
    pub fn modifiers_mut(&mut self) -> &mut EconomyModifiers {
        &mut self.modifiers
    }

    /// Check affordability.
    #[must_use]
    pub const fn can_afford(&self, cost: u32) -> bool {
        self.gold >= cost
    }

    /// Spend gold, or fail without changing the balance.
    pub fn try_spend(&mut self, cost: u32, reason: GoldReason, bus: &mut EventBus) -> Result<()> {
        if !self.can_afford(cost) {
            debug!(cost, gold = self.gold, ?reason, "Insufficient gold");
            return Err(GameError::InsufficientGold {
                required: cost,
                available: self.gold,
            });
        }
        self.gold -= cost;
        if cost > 0 {
            bus.publish(GameEvent::GoldChanged {
                gold: self.gold,
                delta: -i64::from(cost),
                reason,
            });
        }
        Ok(())
    }

    /// Add gold.
    pub fn grant(&mut self, amount: u32, reason: GoldReason, bus: &mut EventBus) {
        if amount == 0 {
            return;
        }
        self.gold = self.gold.saturating_add(amount);
        bus.publish(GameEvent::GoldChanged {
            gold: self.gold,
            delta: i64::from(amount),
            reason,
        });
    }

    /// Interest due on the current balance.
    #[must_use]
    pub fn interest(&self) -> u32 {
        let raw = u64::from(self.gold) * u64::from(self.modifiers.interest_percent) / 100;
        u32::try_from(raw)
            .unwrap_or(u32::MAX)
            .min(self.modifiers.interest_cap)
    }

    /// Gold for a kill worth `gold_value`.
    #[must_use]
    pub fn kill_reward(&self, gold_value: u32) -> u32 {
        gold_value.saturating_add(self.modifiers.kill_bonus)
    }

    /// Gold for one mining cycle yielding `amount`.
    #[must_use]
    pub fn mining_yield(&self, amount: u32) -> u32 {
        let bonus = u64::from(amount) * u64::from(self.modifiers.mining_bonus_percent) / 100;
        amount.saturating_add(u32::try_from(bonus).unwrap_or(u32::MAX))
    }
}

impl EventHandler for Economy {
    fn handle(&mut self, event: &GameEvent, bus: &mut EventBus) {
        match event {
            GameEvent::CreepKilled { gold_value, .. } => {
                let reward = self.kill_reward(*gold_value);
                self.grant(reward, GoldReason::CreepKilled, bus);
            }
            GameEvent::GoldMined { amount, .. } => {
                let reward = self.mining_yield(*amount);
                self.grant(reward, GoldReason::Mining, bus);
            }
            GameEvent::RoundCompleted { .. } => {
                let interest = self.interest();
                self.grant(self.round_clear_bonus, GoldReason::RoundBonus, bus);
                self.grant(interest, GoldReason::Interest, bus);
            }
            GameEvent::AugmentSelected { augment } => {
                augment.apply_to_economy(&mut self.modifiers);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augments::Augment;
    use crate::creep::CreepId;
    use crate::math::Vec3Fixed;
    use crate::worker::WorkerId;

    fn gold_deltas(bus: &mut EventBus) -> Vec<i64> {
        std::iter::from_fn(|| bus.pop_pending())
            .filter_map(|e| match e {
                GameEvent::GoldChanged { delta, .. } => Some(delta),
                _ => None,
            })
            .collect()
    }

    fn kill(gold_value: u32) -> GameEvent {
        GameEvent::CreepKilled {
            creep: CreepId::from_raw(1),
            gold_value,
            position: Vec3Fixed::ZERO,
        }
    }

    #[test]
    fn test_spend_rejects_without_change() {
        let mut economy = Economy::new(30, 0);
        let mut bus = EventBus::new();
        assert!(matches!(
            economy.try_spend(50, GoldReason::TowerBuilt, &mut bus),
            Err(GameError::InsufficientGold {
                required: 50,
                available: 30
            })
        ));
        assert_eq!(economy.gold(), 30);
        assert!(gold_deltas(&mut bus).is_empty());
    }

    #[test]
    fn test_spend_and_grant_publish() {
        let mut economy = Economy::new(100, 0);
        let mut bus = EventBus::new();
        economy
            .try_spend(40, GoldReason::TowerBuilt, &mut bus)
            .expect("affordable");
        economy.grant(15, GoldReason::TowerSold, &mut bus);
        assert_eq!(economy.gold(), 75);
        assert_eq!(gold_deltas(&mut bus), vec![-40, 15]);
    }

    #[test]
    fn test_bounty_adds_one_per_kill() {
        let mut economy = Economy::new(0, 0);
        let mut bus = EventBus::new();
        economy.handle(&kill(5), &mut bus);
        economy.handle(
            &GameEvent::AugmentSelected {
                augment: Augment::Bounty,
            },
            &mut bus,
        );
        economy.handle(&kill(5), &mut bus);
        assert_eq!(gold_deltas(&mut bus), vec![5, 6]);
    }

    #[test]
    fn test_interest_capped() {
        let mut economy = Economy::new(1000, 20);
        let mut bus = EventBus::new();
        economy.handle(
            &GameEvent::AugmentSelected {
                augment: Augment::Interest,
            },
            &mut bus,
        );
        assert_eq!(economy.interest(), 50);
        economy.handle(
            &GameEvent::RoundCompleted {
                round: 1,
                spawned: 0,
                killed: 0,
                reached_goal: 0,
            },
            &mut bus,
        );
        assert_eq!(gold_deltas(&mut bus), vec![20, 50]);
    }

    #[test]
    fn test_prospecting_raises_mining_yield() {
        let mut economy = Economy::new(0, 0);
        let mut bus = EventBus::new();
        Augment::Prospecting.apply_to_economy(economy.modifiers_mut());
        economy.handle(
            &GameEvent::GoldMined {
                worker: WorkerId::from_raw(1),
                amount: 5,
            },
            &mut bus,
        );
        assert_eq!(economy.gold(), 7);
    }
}
