//! Augments: session-long modifiers chosen by the player between rounds.
//!
//! The catalog is a closed enum. Each variant says what it does to a tower,
//! to the economy, and (if it stacks within a round) how to undo that
//! stacking at round end.

use std::fmt;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AugmentConfig;
use crate::economy::EconomyModifiers;
use crate::entity::SimRng;
use crate::error::{GameError, Result};
use crate::events::{EventBus, GameEvent};
use crate::math::{percent, Fixed};
use crate::tower::Tower;

/// Interest cap set by the interest augment.
pub const INTEREST_CAP: u32 = 50;

/// Every augment in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Augment {
    /// +25% tower damage.
    SharpenedTips,
    /// -15% attack interval.
    RapidFire,
    /// +20% range.
    LongSight,
    /// +10% crit chance on every tower.
    LuckyStrikes,
    /// Each attack stacks -4% attack interval, up to 10 stacks, per round.
    Frenzy,
    /// +1 gold per kill.
    Bounty,
    /// 10% round-end interest, capped.
    Interest,
    /// +50% worker yield.
    Prospecting,
}

impl Augment {
    /// The full catalog.
    pub const ALL: [Self; 8] = [
        Self::SharpenedTips,
        Self::RapidFire,
        Self::LongSight,
        Self::LuckyStrikes,
        Self::Frenzy,
        Self::Bounty,
        Self::Interest,
        Self::Prospecting,
    ];

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SharpenedTips => "Sharpened Tips",
            Self::RapidFire => "Rapid Fire",
            Self::LongSight => "Long Sight",
            Self::LuckyStrikes => "Lucky Strikes",
            Self::Frenzy => "Frenzy",
            Self::Bounty => "Bounty",
            Self::Interest => "Interest",
            Self::Prospecting => "Prospecting",
        }
    }

    /// One-line description for the offer screen.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::SharpenedTips => "Towers deal 25% more damage.",
            Self::RapidFire => "Towers attack 15% faster.",
            Self::LongSight => "Towers gain 20% range.",
            Self::LuckyStrikes => "Every tower gains 10% critical chance.",
            Self::Frenzy => "Each attack speeds the tower up by 4%, up to 10 times per round.",
            Self::Bounty => "Kills grant 1 extra gold.",
            Self::Interest => "Earn 10% interest at round end, up to 50 gold.",
            Self::Prospecting => "Workers mine 50% more gold.",
        }
    }

    /// Whether the effect accumulates during a round and resets after it.
    #[must_use]
    pub const fn is_round_scoped(self) -> bool {
        matches!(self, Self::Frenzy)
    }

    /// Whether the effect lands on towers.
    #[must_use]
    pub const fn affects_towers(self) -> bool {
        matches!(
            self,
            Self::SharpenedTips | Self::RapidFire | Self::LongSight | Self::LuckyStrikes | Self::Frenzy
        )
    }

    /// Apply the tower effect once. No-op for economy augments.
    pub fn apply_to_tower(self, tower: &mut Tower) {
        let stats = &mut tower.stats;
        match self {
            Self::SharpenedTips => stats.damage *= percent(125),
            Self::RapidFire => stats.attack_interval *= percent(85),
            Self::LongSight => stats.range *= percent(120),
            Self::LuckyStrikes => {
                stats.crit_chance = (stats.crit_chance + percent(10)).min(Fixed::ONE);
            }
            Self::Frenzy => tower.frenzy_enabled = true,
            Self::Bounty | Self::Interest | Self::Prospecting => {}
        }
    }

    /// Apply the economy effect once. No-op for tower augments.
    pub fn apply_to_economy(self, modifiers: &mut EconomyModifiers) {
        match self {
            Self::Bounty => modifiers.kill_bonus += 1,
            Self::Interest => {
                modifiers.interest_percent += 10;
                modifiers.interest_cap = INTEREST_CAP;
            }
            Self::Prospecting => modifiers.mining_bonus_percent += 50,
            Self::SharpenedTips
            | Self::RapidFire
            | Self::LongSight
            | Self::LuckyStrikes
            | Self::Frenzy => {}
        }
    }

    /// Undo round-scoped stacking on a tower.
    pub fn reset_tower(self, tower: &mut Tower) {
        if self == Self::Frenzy {
            tower.frenzy_stacks = 0;
        }
    }
}

impl fmt::Display for Augment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Active augments and the pending offer.
#[derive(Debug, Clone)]
pub struct AugmentSystem {
    config: AugmentConfig,
    active: Vec<Augment>,
    offered: Vec<Augment>,
}

impl AugmentSystem {
    /// Create with nothing active.
    #[must_use]
    pub fn new(config: AugmentConfig) -> Self {
        Self {
            config,
            active: Vec::new(),
            offered: Vec::new(),
        }
    }

    /// Active augments in selection order.
    #[must_use]
    pub fn active(&self) -> &[Augment] {
        &self.active
    }

    /// The current offer, empty when none is pending.
    #[must_use]
    pub fn offered(&self) -> &[Augment] {
        &self.offered
    }

    /// Whether an offer is waiting for a choice.
    #[must_use]
    pub fn has_pending_offer(&self) -> bool {
        !self.offered.is_empty()
    }

    fn available(&self) -> Vec<Augment> {
        Augment::ALL
            .into_iter()
            .filter(|a| !self.active.contains(a))
            .collect()
    }

    /// Whether an offer precedes `round`.
    #[must_use]
    pub fn should_offer_before(&self, round: u32) -> bool {
        self.config.offer_rounds.contains(&round)
            && self.active.len() < self.config.max_active
            && !self.available().is_empty()
    }

    /// Draw a random offer of not-yet-active augments and publish it.
    pub fn offer(&mut self, rng: &mut SimRng, bus: &mut EventBus) -> Vec<Augment> {
        let mut choices = self.available();
        choices.shuffle(rng);
        choices.truncate(self.config.offer_size);
        debug!(?choices, "Offering augments");
        self.offered.clone_from(&choices);
        bus.publish(GameEvent::AugmentsOffered {
            choices: choices.clone(),
        });
        choices
    }

    /// Activate an augment from the current offer.
    ///
    /// The caller applies the tower effect; the economy effect follows from
    /// the published [`GameEvent::AugmentSelected`].
    pub fn choose(&mut self, augment: Augment, bus: &mut EventBus) -> Result<()> {
        if self.active.contains(&augment) {
            return Err(GameError::AugmentAlreadyActive(augment.name()));
        }
        if self.active.len() >= self.config.max_active {
            return Err(GameError::AugmentLimitReached(self.config.max_active));
        }
        if !self.offered.contains(&augment) {
            return Err(GameError::AugmentNotOffered(augment.name()));
        }
        self.active.push(augment);
        self.offered.clear();
        info!(augment = augment.name(), active = self.active.len(), "Augment selected");
        bus.publish(GameEvent::AugmentSelected { augment });
        Ok(())
    }

    /// Apply every active tower effect to a new or freshly upgraded tower.
    pub fn apply_active(&self, tower: &mut Tower) {
        for augment in &self.active {
            augment.apply_to_tower(tower);
        }
    }

    /// Reset round-scoped effects on a tower.
    pub fn reset_round_scoped(&self, tower: &mut Tower) {
        for augment in self.active.iter().filter(|a| a.is_round_scoped()) {
            augment.reset_tower(tower);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::config::GameConfig;
    use crate::entity::VisualHandle;
    use crate::math::Vec3Fixed;
    use crate::tower::{TowerId, TowerType};

    fn tower(tower_type: TowerType) -> Tower {
        let config = GameConfig::default();
        Tower::new(
            TowerId::from_raw(1),
            tower_type,
            &config.towers[&tower_type],
            0,
            Vec3Fixed::ZERO,
            VisualHandle(1),
        )
        .expect("tower")
    }

    fn system() -> AugmentSystem {
        AugmentSystem::new(AugmentConfig {
            offer_rounds: vec![2, 4, 6, 8],
            max_active: 3,
            offer_size: 3,
        })
    }

    #[test]
    fn test_offer_excludes_active_and_respects_size() {
        let mut augments = system();
        let mut rng = SimRng::seed_from_u64(11);
        let mut bus = EventBus::new();

        let first = augments.offer(&mut rng, &mut bus);
        assert_eq!(first.len(), 3);
        augments.choose(first[0], &mut bus).expect("offered");

        for _ in 0..20 {
            let next = augments.offer(&mut rng, &mut bus);
            assert!(!next.contains(&first[0]));
        }
    }

    #[test]
    fn test_choose_requires_offer() {
        let mut augments = system();
        let mut bus = EventBus::new();
        assert!(matches!(
            augments.choose(Augment::Bounty, &mut bus),
            Err(GameError::AugmentNotOffered(_))
        ));
    }

    #[test]
    fn test_limit_stops_offers() {
        let mut augments = system();
        let mut rng = SimRng::seed_from_u64(5);
        let mut bus = EventBus::new();
        for _ in 0..3 {
            let offer = augments.offer(&mut rng, &mut bus);
            augments.choose(offer[0], &mut bus).expect("choose");
        }
        assert_eq!(augments.active().len(), 3);
        assert!(!augments.should_offer_before(4));
    }

    #[test]
    fn test_offer_only_on_designated_rounds() {
        let augments = system();
        assert!(augments.should_offer_before(2));
        assert!(!augments.should_offer_before(3));
    }

    #[test]
    fn test_tower_effects() {
        let mut basic = tower(TowerType::Basic);
        let base = basic.stats;
        Augment::SharpenedTips.apply_to_tower(&mut basic);
        Augment::LongSight.apply_to_tower(&mut basic);
        Augment::LuckyStrikes.apply_to_tower(&mut basic);
        assert_eq!(basic.stats.damage, base.damage * percent(125));
        assert_eq!(basic.stats.range, base.range * percent(120));
        assert_eq!(basic.stats.crit_chance, percent(10));
        // Economy augments leave towers alone.
        let before = basic.stats;
        Augment::Bounty.apply_to_tower(&mut basic);
        assert_eq!(basic.stats, before);
    }

    #[test]
    fn test_frenzy_reset_clears_stacks() {
        let mut augments = system();
        let mut bus = EventBus::new();
        augments.offered = vec![Augment::Frenzy];
        augments.choose(Augment::Frenzy, &mut bus).expect("choose");

        let mut t = tower(TowerType::Frost);
        augments.apply_active(&mut t);
        assert!(t.frenzy_enabled);
        t.frenzy_stacks = 7;
        augments.reset_round_scoped(&mut t);
        assert_eq!(t.frenzy_stacks, 0);
        assert!(t.frenzy_enabled);
    }
}
