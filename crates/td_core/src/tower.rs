//! Towers: attack timing, targeting, crits and rank upgrades.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::{RankStats, TowerDefinition};
use crate::creep::{CreepId, CreepSnapshot};
use crate::entity::{EntityId, SimEntity, TickContext, VisualHandle};
use crate::events::{GameEvent, ShotRequest};
use crate::math::{interval_elapsed, percent, Fixed, Vec3Fixed};

/// Typed id of a tower.
pub type TowerId = EntityId<Tower>;

/// Highest rank a tower table may define.
pub const MAX_RANK: u8 = 5;

/// Damage fraction dealt by a basic tower's second projectile, in percent.
pub const SECONDARY_DAMAGE_PERCENT: u32 = 50;

/// Attack interval reduction per frenzy stack, in percent.
pub const FRENZY_PERCENT_PER_STACK: u32 = 4;

/// Frenzy stack cap.
pub const FRENZY_MAX_STACKS: u8 = 10;

/// Tower types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TowerType {
    /// Fires at two targets, the second for half damage.
    Basic,
    /// Slows its target.
    Frost,
    /// Crits, and burns on a crit.
    Fire,
}

impl TowerType {
    /// Every tower type.
    pub const ALL: [Self; 3] = [Self::Basic, Self::Frost, Self::Fire];

    /// Lowercase name used in config files and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Frost => "frost",
            Self::Fire => "fire",
        }
    }

    /// How many targets one attack hits.
    #[must_use]
    pub const fn max_targets(self) -> usize {
        match self {
            Self::Basic => 2,
            Self::Frost | Self::Fire => 1,
        }
    }
}

impl fmt::Display for TowerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Combat stats in effect for a tower (rank table plus augments).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TowerStats {
    /// Damage per projectile.
    pub damage: Fixed,
    /// Seconds between attacks.
    pub attack_interval: Fixed,
    /// Targeting radius.
    pub range: Fixed,
    /// Slow applied on hit.
    pub slow_amount: Fixed,
    /// Chance to crit per shot.
    pub crit_chance: Fixed,
    /// Damage multiplier on a crit.
    pub crit_multiplier: Fixed,
    /// Projectile travel speed.
    pub projectile_speed: Fixed,
}

impl TowerStats {
    /// Baseline stats for one rank.
    #[must_use]
    pub fn from_rank(definition: &TowerDefinition, stats: &RankStats) -> Self {
        Self {
            damage: stats.damage,
            attack_interval: stats.attack_interval,
            range: stats.range,
            slow_amount: stats.slow_amount,
            crit_chance: stats.crit_chance,
            crit_multiplier: definition.crit_multiplier,
            projectile_speed: definition.projectile_speed,
        }
    }
}

/// A player-built tower on a slot.
#[derive(Debug, Clone)]
pub struct Tower {
    id: TowerId,
    tower_type: TowerType,
    rank: u8,
    slot: usize,
    position: Vec3Fixed,
    visual: VisualHandle,
    /// Stats in effect. Augments modify these directly.
    pub stats: TowerStats,
    attack_timer: Fixed,
    invested: u32,
    /// Whether the frenzy augment applies to this tower.
    pub frenzy_enabled: bool,
    /// Current frenzy stacks.
    pub frenzy_stacks: u8,
}

impl Tower {
    /// Build a rank-1 tower from its definition.
    #[must_use]
    pub fn new(
        id: TowerId,
        tower_type: TowerType,
        definition: &TowerDefinition,
        slot: usize,
        position: Vec3Fixed,
        visual: VisualHandle,
    ) -> Option<Self> {
        let base = definition.rank(1)?;
        Some(Self {
            id,
            tower_type,
            rank: 1,
            slot,
            position,
            visual,
            stats: TowerStats::from_rank(definition, base),
            attack_timer: Fixed::ZERO,
            invested: base.cost,
            frenzy_enabled: false,
            frenzy_stacks: 0,
        })
    }

    /// Tower id.
    #[must_use]
    pub const fn id(&self) -> TowerId {
        self.id
    }

    /// Tower type.
    #[must_use]
    pub const fn tower_type(&self) -> TowerType {
        self.tower_type
    }

    /// Current rank.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        self.rank
    }

    /// Slot the tower stands on.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Total gold spent on this tower.
    #[must_use]
    pub const fn invested(&self) -> u32 {
        self.invested
    }

    /// Time accumulated toward the next attack.
    #[must_use]
    pub const fn attack_timer(&self) -> Fixed {
        self.attack_timer
    }

    /// Price of the next rank, or `None` at max rank.
    #[must_use]
    pub fn upgrade_cost(&self, definition: &TowerDefinition) -> Option<u32> {
        let next = self.rank.checked_add(1)?;
        definition.rank(next).map(|stats| stats.cost)
    }

    /// Raise the rank by one and replace stats from the new rank's row.
    ///
    /// Augments must be re-applied by the caller afterwards. Returns `false`
    /// if the definition has no next rank.
    pub fn upgrade(&mut self, definition: &TowerDefinition) -> bool {
        let Some(next) = self.rank.checked_add(1) else {
            return false;
        };
        let Some(stats) = definition.rank(next) else {
            return false;
        };
        self.rank = next;
        self.stats = TowerStats::from_rank(definition, stats);
        self.invested = self.invested.saturating_add(stats.cost);
        true
    }

    /// Gold returned when sold: `floor(invested * percent / 100)`.
    #[must_use]
    pub fn refund(&self, refund_percent: u32) -> u32 {
        let refund = u64::from(self.invested) * u64::from(refund_percent) / 100;
        u32::try_from(refund).unwrap_or(u32::MAX)
    }

    /// Attack interval after frenzy stacks.
    #[must_use]
    pub fn effective_interval(&self) -> Fixed {
        if !self.frenzy_enabled || self.frenzy_stacks == 0 {
            return self.stats.attack_interval;
        }
        let reduction = percent(FRENZY_PERCENT_PER_STACK * u32::from(self.frenzy_stacks));
        self.stats.attack_interval * (Fixed::ONE - reduction)
    }

    /// Pick targets from the feed in priority order.
    ///
    /// In-range creeps are ranked by path progress (highest first), then by
    /// distance left to their next waypoint, then by id.
    #[must_use]
    pub fn select_targets(&self, creeps: &[CreepSnapshot]) -> Vec<CreepId> {
        let range_sq = self.stats.range * self.stats.range;
        let mut candidates: Vec<&CreepSnapshot> = creeps
            .iter()
            .filter(|c| self.position.distance_squared(c.position) <= range_sq)
            .collect();
        candidates.sort_by(|a, b| {
            b.progress
                .cmp(&a.progress)
                .then(a.distance_to_next.cmp(&b.distance_to_next))
                .then(a.id.cmp(&b.id))
        });
        candidates
            .into_iter()
            .take(self.tower_type.max_targets())
            .map(|c| c.id)
            .collect()
    }

    /// Feed the simulation-relevant fields into a state hash.
    pub fn hash_state<H: std::hash::Hasher>(&self, hasher: &mut H) {
        use std::hash::Hash;
        self.id.hash(hasher);
        self.rank.hash(hasher);
        self.attack_timer.to_bits().hash(hasher);
        self.invested.hash(hasher);
        self.stats.damage.to_bits().hash(hasher);
        self.stats.attack_interval.to_bits().hash(hasher);
        self.frenzy_stacks.hash(hasher);
    }

    fn fire(&mut self, targets: &[CreepId], ctx: &mut TickContext<'_>) {
        for (index, &target) in targets.iter().enumerate() {
            let mut damage = self.stats.damage;
            if index > 0 {
                damage *= percent(SECONDARY_DAMAGE_PERCENT);
            }

            let is_critical = self.stats.crit_chance > Fixed::ZERO && {
                let roll = Fixed::from_bits(i64::from(ctx.rng.gen::<u32>()));
                roll < self.stats.crit_chance
            };
            if is_critical {
                damage *= self.stats.crit_multiplier;
            }

            trace!(
                tower = %self.id,
                creep = %target,
                damage = %damage,
                is_critical,
                "Tower fired"
            );

            ctx.bus.publish(GameEvent::ProjectileRequested(ShotRequest {
                tower: self.id,
                tower_type: self.tower_type,
                rank: self.rank,
                origin: self.position,
                target,
                damage,
                is_critical,
                slow_amount: self.stats.slow_amount,
                speed: self.stats.projectile_speed,
            }));
        }
    }
}

impl SimEntity for Tower {
    fn visual(&self) -> VisualHandle {
        self.visual
    }

    fn position(&self) -> Vec3Fixed {
        self.position
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) {
        self.attack_timer += ctx.delta;
        if !interval_elapsed(self.attack_timer, self.effective_interval()) {
            return;
        }

        let targets = self.select_targets(ctx.creeps);
        if !targets.is_empty() {
            self.fire(&targets, ctx);
            if self.frenzy_enabled && self.frenzy_stacks < FRENZY_MAX_STACKS {
                self.frenzy_stacks += 1;
            }
        }
        // Overflow past the interval is dropped.
        self.attack_timer = Fixed::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::config::GameConfig;
    use crate::entity::SimRng;
    use crate::events::EventBus;

    fn definition(tower_type: TowerType) -> TowerDefinition {
        GameConfig::default().towers[&tower_type].clone()
    }

    fn tower(tower_type: TowerType) -> Tower {
        Tower::new(
            TowerId::from_raw(1),
            tower_type,
            &definition(tower_type),
            0,
            Vec3Fixed::ZERO,
            VisualHandle(1),
        )
        .expect("rank 1 exists")
    }

    fn snapshot(id: u64, x: i32, progress_percent: u32, distance: i32) -> CreepSnapshot {
        CreepSnapshot {
            id: CreepId::from_raw(id),
            position: Vec3Fixed::from_ints(x, 0, 0),
            progress: percent(progress_percent),
            distance_to_next: Fixed::from_num(distance),
        }
    }

    fn shots(bus: &mut EventBus) -> Vec<ShotRequest> {
        std::iter::from_fn(|| bus.pop_pending())
            .filter_map(|event| match event {
                GameEvent::ProjectileRequested(shot) => Some(shot),
                _ => None,
            })
            .collect()
    }

    fn tick(tower: &mut Tower, creeps: &[CreepSnapshot], delta: Fixed, bus: &mut EventBus) {
        let mut rng = SimRng::seed_from_u64(3);
        let mut ctx = TickContext {
            delta,
            bus,
            rng: &mut rng,
            creeps,
        };
        tower.update(&mut ctx);
    }

    #[test]
    fn test_targets_sorted_by_progress_then_distance() {
        let t = tower(TowerType::Basic);
        let creeps = [
            snapshot(1, 1, 20, 3),
            snapshot(2, 2, 60, 5),
            snapshot(3, 3, 60, 2),
            snapshot(4, 50, 90, 1), // out of range
        ];
        let ids = t.select_targets(&creeps);
        assert_eq!(ids, vec![CreepId::from_raw(3), CreepId::from_raw(2)]);
    }

    #[test]
    fn test_basic_second_target_half_damage() {
        let mut t = tower(TowerType::Basic);
        let mut bus = EventBus::new();
        let creeps = [snapshot(1, 1, 25, 1), snapshot(2, 2, 75, 1)];
        tick(&mut t, &creeps, Fixed::ONE, &mut bus);

        let fired = shots(&mut bus);
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].target, CreepId::from_raw(2));
        assert_eq!(fired[0].damage, t.stats.damage);
        assert_eq!(fired[1].damage, Fixed::from_num(5));
    }

    #[test]
    fn test_single_target_types() {
        let mut t = tower(TowerType::Frost);
        let mut bus = EventBus::new();
        let creeps = [snapshot(1, 1, 25, 1), snapshot(2, 2, 75, 1)];
        tick(&mut t, &creeps, Fixed::from_num(2), &mut bus);
        let fired = shots(&mut bus);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].slow_amount, percent(20));
    }

    #[test]
    fn test_timer_resets_without_target_and_drops_overflow() {
        let mut t = tower(TowerType::Basic);
        let mut bus = EventBus::new();
        tick(&mut t, &[], Fixed::from_num(3), &mut bus);
        assert_eq!(t.attack_timer(), Fixed::ZERO);
        assert!(shots(&mut bus).is_empty());

        tick(&mut t, &[], percent(50), &mut bus);
        assert_eq!(t.attack_timer(), percent(50));
    }

    #[test]
    fn test_fires_on_the_tenth_tenth_second_step() {
        let mut t = tower(TowerType::Basic);
        let mut bus = EventBus::new();
        let creeps = [snapshot(1, 1, 10, 1)];
        for _ in 0..9 {
            tick(&mut t, &creeps, percent(10), &mut bus);
        }
        assert!(shots(&mut bus).is_empty());
        tick(&mut t, &creeps, percent(10), &mut bus);
        assert_eq!(shots(&mut bus).len(), 1);
    }

    #[test]
    fn test_no_crits_without_chance() {
        let mut t = tower(TowerType::Basic);
        let mut bus = EventBus::new();
        for _ in 0..20 {
            tick(&mut t, &[snapshot(1, 1, 10, 1)], Fixed::ONE, &mut bus);
        }
        assert!(shots(&mut bus).iter().all(|s| !s.is_critical));
    }

    #[test]
    fn test_guaranteed_crit_multiplies_damage() {
        let mut t = tower(TowerType::Fire);
        t.stats.crit_chance = Fixed::ONE;
        let mut bus = EventBus::new();
        tick(&mut t, &[snapshot(1, 1, 10, 1)], Fixed::from_num(2), &mut bus);
        let fired = shots(&mut bus);
        assert!(fired[0].is_critical);
        assert_eq!(fired[0].damage, Fixed::from_num(30));
    }

    #[test]
    fn test_upgrade_replaces_stats_and_tracks_investment() {
        let def = definition(TowerType::Basic);
        let mut t = tower(TowerType::Basic);
        t.stats.damage = Fixed::from_num(999);
        assert_eq!(t.upgrade_cost(&def), Some(40));
        assert!(t.upgrade(&def));
        assert_eq!(t.rank(), 2);
        assert_eq!(t.stats.damage, Fixed::from_num(14));
        assert_eq!(t.invested(), 90);
    }

    #[test]
    fn test_upgrade_stops_at_max_rank() {
        let def = definition(TowerType::Fire);
        let mut t = tower(TowerType::Fire);
        while t.upgrade(&def) {}
        assert_eq!(t.rank(), MAX_RANK);
        assert_eq!(t.upgrade_cost(&def), None);
    }

    #[test]
    fn test_refund_floors() {
        let def = definition(TowerType::Frost);
        let mut t = tower(TowerType::Frost);
        t.upgrade(&def);
        t.upgrade(&def);
        // 75 + 50 + 75 = 200
        assert_eq!(t.refund(50), 100);
        let mut odd = tower(TowerType::Frost);
        odd.invested = 75;
        assert_eq!(odd.refund(50), 37);
    }

    #[test]
    fn test_frenzy_shortens_interval() {
        let mut t = tower(TowerType::Basic);
        t.frenzy_enabled = true;
        t.frenzy_stacks = 10;
        assert_eq!(
            t.effective_interval(),
            t.stats.attack_interval * (Fixed::ONE - percent(40))
        );
    }
}
