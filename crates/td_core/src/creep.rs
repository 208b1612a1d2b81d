//! Creeps: path movement, status effects and resolution.
//!
//! A creep is resolved exactly once, either killed or arrived at the goal.
//! [`CreepState`] carries that fact so every later update or hit is a no-op.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::{CreepArchetype, PathDefinition};
use crate::entity::{EntityId, SimEntity, TickContext, VisualHandle};
use crate::events::{EventBus, GameEvent};
use crate::math::{fixed_serde, interval_elapsed, Fixed, Vec3Fixed};

/// Typed id of a creep.
pub type CreepId = EntityId<Creep>;

/// Creep archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreepType {
    /// Quick and fragile.
    Fast,
    /// Slow and tough.
    Armored,
    /// Weak but numerous.
    Swarm,
    /// One very tough creep.
    Boss,
}

impl CreepType {
    /// Every archetype.
    pub const ALL: [Self; 4] = [Self::Fast, Self::Armored, Self::Swarm, Self::Boss];

    /// Lowercase name used in config files and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Armored => "armored",
            Self::Swarm => "swarm",
            Self::Boss => "boss",
        }
    }
}

impl fmt::Display for CreepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A status carried by a projectile hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEffect {
    /// Reduce speed by `amount` (a fraction) for `duration` seconds.
    Slow {
        /// Fraction of base speed removed.
        #[serde(with = "fixed_serde")]
        amount: Fixed,
        /// Seconds the slow lasts.
        #[serde(with = "fixed_serde")]
        duration: Fixed,
        /// Rank of the tower that applied it; one entry per rank.
        source_rank: u8,
    },
    /// Deal `dps` once per elapsed whole second for `duration` seconds.
    Burn {
        /// Damage per tick.
        #[serde(with = "fixed_serde")]
        dps: Fixed,
        /// Seconds the burn lasts.
        #[serde(with = "fixed_serde")]
        duration: Fixed,
    },
}

/// Resolution state of a creep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreepState {
    /// On the field.
    Alive,
    /// Health reached zero.
    Killed,
    /// Walked past the final waypoint.
    ReachedGoal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlowEntry {
    amount: Fixed,
    remaining: Fixed,
    source_rank: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BurnEntry {
    dps: Fixed,
    remaining: Fixed,
    accumulator: Fixed,
}

/// Read-only view of a live creep handed to towers and projectiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreepSnapshot {
    /// Creep id.
    pub id: CreepId,
    /// Current position.
    pub position: Vec3Fixed,
    /// Path progress in `[0, 1]`.
    pub progress: Fixed,
    /// Distance left to the waypoint the creep is walking toward.
    pub distance_to_next: Fixed,
}

/// A creep walking its path toward the king.
#[derive(Debug, Clone)]
pub struct Creep {
    id: CreepId,
    creep_type: CreepType,
    visual: VisualHandle,
    position: Vec3Fixed,
    health: Fixed,
    max_health: Fixed,
    base_speed: Fixed,
    current_speed: Fixed,
    damage_to_king: u32,
    gold_value: u32,
    path: usize,
    waypoints: Vec<Vec3Fixed>,
    waypoint_index: usize,
    progress: Fixed,
    waypoint_epsilon: Fixed,
    slows: Vec<SlowEntry>,
    burn: Option<BurnEntry>,
    state: CreepState,
}

impl Creep {
    /// Create a creep at the spawn point of `path`.
    ///
    /// `health_scale` multiplies the archetype's base health.
    #[must_use]
    pub fn new(
        id: CreepId,
        creep_type: CreepType,
        archetype: &CreepArchetype,
        health_scale: Fixed,
        path_index: usize,
        path: &PathDefinition,
        visual: VisualHandle,
        waypoint_epsilon: Fixed,
    ) -> Self {
        let health = archetype.health * health_scale;
        Self {
            id,
            creep_type,
            visual,
            position: path.spawn,
            health,
            max_health: health,
            base_speed: archetype.speed,
            current_speed: archetype.speed,
            damage_to_king: archetype.damage_to_king,
            gold_value: archetype.gold_value,
            path: path_index,
            waypoints: path.waypoints.clone(),
            waypoint_index: 0,
            progress: Fixed::ZERO,
            waypoint_epsilon,
            slows: Vec::new(),
            burn: None,
            state: CreepState::Alive,
        }
    }

    /// Creep id.
    #[must_use]
    pub const fn id(&self) -> CreepId {
        self.id
    }

    /// Archetype.
    #[must_use]
    pub const fn creep_type(&self) -> CreepType {
        self.creep_type
    }

    /// Current health.
    #[must_use]
    pub const fn health(&self) -> Fixed {
        self.health
    }

    /// Health at spawn.
    #[must_use]
    pub const fn max_health(&self) -> Fixed {
        self.max_health
    }

    /// Speed after slows.
    #[must_use]
    pub const fn current_speed(&self) -> Fixed {
        self.current_speed
    }

    /// Speed before slows.
    #[must_use]
    pub const fn base_speed(&self) -> Fixed {
        self.base_speed
    }

    /// Path index the creep walks.
    #[must_use]
    pub const fn path(&self) -> usize {
        self.path
    }

    /// Path progress in `[0, 1]`.
    #[must_use]
    pub const fn progress(&self) -> Fixed {
        self.progress
    }

    /// Resolution state.
    #[must_use]
    pub const fn state(&self) -> CreepState {
        self.state
    }

    /// Whether the creep is still on the field.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state == CreepState::Alive
    }

    /// Whether a burn is active.
    #[must_use]
    pub const fn is_burning(&self) -> bool {
        self.burn.is_some()
    }

    /// Number of active slow entries.
    #[must_use]
    pub fn slow_count(&self) -> usize {
        self.slows.len()
    }

    /// Speed multiplier from slows: one minus the strongest active slow.
    #[must_use]
    pub fn speed_multiplier(&self) -> Fixed {
        let strongest = self
            .slows
            .iter()
            .map(|slow| slow.amount)
            .max()
            .unwrap_or(Fixed::ZERO);
        (Fixed::ONE - strongest).max(Fixed::ZERO)
    }

    /// Snapshot for the target feed.
    #[must_use]
    pub fn snapshot(&self) -> CreepSnapshot {
        let distance_to_next = self
            .waypoints
            .get(self.waypoint_index)
            .map_or(Fixed::ZERO, |next| self.position.distance(*next));
        CreepSnapshot {
            id: self.id,
            position: self.position,
            progress: self.progress,
            distance_to_next,
        }
    }

    /// Feed the simulation-relevant fields into a state hash.
    pub fn hash_state<H: std::hash::Hasher>(&self, hasher: &mut H) {
        use std::hash::Hash;
        self.id.hash(hasher);
        self.health.to_bits().hash(hasher);
        self.position.hash(hasher);
        self.current_speed.to_bits().hash(hasher);
        self.waypoint_index.hash(hasher);
        self.state.hash(hasher);
        self.slows.len().hash(hasher);
        if let Some(burn) = &self.burn {
            burn.remaining.to_bits().hash(hasher);
            burn.accumulator.to_bits().hash(hasher);
        }
    }

    /// Apply a projectile hit.
    ///
    /// Damage lands first; the status applies only if the creep survives.
    /// Returns `true` if this hit killed the creep.
    pub fn apply_hit(
        &mut self,
        damage: Fixed,
        effect: Option<StatusEffect>,
        bus: &mut EventBus,
    ) -> bool {
        if !self.is_alive() {
            return false;
        }
        if self.take_damage(damage, bus) {
            return true;
        }
        if let Some(effect) = effect {
            self.apply_status(effect);
        }
        false
    }

    /// Apply a status effect.
    ///
    /// A slow from the same source rank refreshes that entry; a new burn
    /// replaces the old one.
    pub fn apply_status(&mut self, effect: StatusEffect) {
        match effect {
            StatusEffect::Slow {
                amount,
                duration,
                source_rank,
            } => {
                if let Some(entry) = self.slows.iter_mut().find(|s| s.source_rank == source_rank) {
                    entry.amount = amount;
                    entry.remaining = duration;
                } else {
                    self.slows.push(SlowEntry {
                        amount,
                        remaining: duration,
                        source_rank,
                    });
                }
                self.refresh_speed();
            }
            StatusEffect::Burn { dps, duration } => {
                self.burn = Some(BurnEntry {
                    dps,
                    remaining: duration,
                    accumulator: Fixed::ZERO,
                });
            }
        }
    }

    fn refresh_speed(&mut self) {
        self.current_speed = self.base_speed * self.speed_multiplier();
    }

    /// Subtract health; on death publish `CreepKilled`. Returns `true` on death.
    fn take_damage(&mut self, amount: Fixed, bus: &mut EventBus) -> bool {
        self.health -= amount;
        if self.health > Fixed::ZERO {
            return false;
        }
        self.state = CreepState::Killed;
        bus.publish(GameEvent::CreepKilled {
            creep: self.id,
            gold_value: self.gold_value,
            position: self.position,
        });
        true
    }

    fn tick_statuses(&mut self, delta: Fixed, bus: &mut EventBus) {
        if !self.slows.is_empty() {
            for slow in &mut self.slows {
                slow.remaining -= delta;
            }
            self.slows.retain(|slow| slow.remaining > Fixed::ZERO);
            self.refresh_speed();
        }

        if let Some(mut burn) = self.burn.take() {
            burn.accumulator += delta;
            burn.remaining -= delta;
            let tick_due = interval_elapsed(burn.accumulator, Fixed::ONE);
            if tick_due {
                burn.accumulator = Fixed::ZERO;
            }
            if burn.remaining > Fixed::ZERO {
                self.burn = Some(burn);
            }
            if tick_due {
                trace!(creep = %self.id, dps = %burn.dps, "Burn tick");
                self.take_damage(burn.dps, bus);
            }
        }
    }

    fn walk(&mut self, delta: Fixed, bus: &mut EventBus) {
        let Some(&next) = self.waypoints.get(self.waypoint_index) else {
            self.arrive(bus);
            return;
        };

        self.position = self
            .position
            .move_towards(next, self.current_speed * delta);

        if self.position.distance(next) > self.waypoint_epsilon {
            return;
        }

        self.waypoint_index += 1;
        let segments = self.waypoints.len().saturating_sub(1);
        self.progress = if segments == 0 {
            Fixed::ONE
        } else {
            (Fixed::from_num(self.waypoint_index) / Fixed::from_num(segments)).min(Fixed::ONE)
        };

        if self.waypoint_index >= self.waypoints.len() {
            self.arrive(bus);
        }
    }

    fn arrive(&mut self, bus: &mut EventBus) {
        if !self.is_alive() {
            return;
        }
        self.state = CreepState::ReachedGoal;
        self.progress = Fixed::ONE;
        bus.publish(GameEvent::CreepReachedGoal {
            creep: self.id,
            damage: self.damage_to_king,
        });
    }
}

impl SimEntity for Creep {
    fn visual(&self) -> VisualHandle {
        self.visual
    }

    fn position(&self) -> Vec3Fixed {
        self.position
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) {
        if !self.is_alive() {
            return;
        }
        self.tick_statuses(ctx.delta, ctx.bus);
        if !self.is_alive() {
            return;
        }
        self.walk(ctx.delta, ctx.bus);
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::entity::SimRng;
    use crate::math::percent;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn archetype(health: i32, speed: i32) -> CreepArchetype {
        CreepArchetype {
            health: fixed(health),
            speed: fixed(speed),
            damage_to_king: 3,
            gold_value: 7,
        }
    }

    fn straight_path() -> PathDefinition {
        PathDefinition {
            spawn: Vec3Fixed::ZERO,
            waypoints: vec![Vec3Fixed::from_ints(2, 0, 0), Vec3Fixed::from_ints(4, 0, 0)],
        }
    }

    fn creep(health: i32, speed: i32) -> Creep {
        Creep::new(
            CreepId::from_raw(1),
            CreepType::Fast,
            &archetype(health, speed),
            Fixed::ONE,
            0,
            &straight_path(),
            VisualHandle(9),
            percent(10),
        )
    }

    fn step(creep: &mut Creep, bus: &mut EventBus, delta: Fixed) {
        let mut rng = SimRng::seed_from_u64(0);
        let mut ctx = TickContext {
            delta,
            bus,
            rng: &mut rng,
            creeps: &[],
        };
        creep.update(&mut ctx);
    }

    fn drain(bus: &mut EventBus) -> Vec<GameEvent> {
        std::iter::from_fn(|| bus.pop_pending()).collect()
    }

    #[test]
    fn test_strongest_slow_wins() {
        let mut c = creep(100, 4);
        c.apply_status(StatusEffect::Slow {
            amount: percent(30),
            duration: fixed(5),
            source_rank: 1,
        });
        c.apply_status(StatusEffect::Slow {
            amount: percent(50),
            duration: fixed(5),
            source_rank: 3,
        });
        assert_eq!(c.speed_multiplier(), percent(50));
        assert_eq!(c.current_speed(), fixed(2));
    }

    #[test]
    fn test_same_rank_slow_refreshes() {
        let mut c = creep(100, 4);
        for _ in 0..3 {
            c.apply_status(StatusEffect::Slow {
                amount: percent(30),
                duration: fixed(5),
                source_rank: 2,
            });
        }
        assert_eq!(c.slow_count(), 1);
    }

    #[test]
    fn test_slow_expires() {
        let mut bus = EventBus::new();
        let mut c = creep(100, 1);
        c.apply_status(StatusEffect::Slow {
            amount: percent(50),
            duration: Fixed::ONE,
            source_rank: 1,
        });
        step(&mut c, &mut bus, Fixed::ONE);
        assert_eq!(c.slow_count(), 0);
        assert_eq!(c.current_speed(), c.base_speed());
    }

    #[test]
    fn test_burn_ticks_once_per_whole_second() {
        let mut bus = EventBus::new();
        let mut c = creep(100, 0);
        c.apply_status(StatusEffect::Burn {
            dps: fixed(10),
            duration: fixed(3),
        });
        let delta = percent(40);
        for _ in 0..3 {
            step(&mut c, &mut bus, delta);
        }
        assert_eq!(c.health(), fixed(90));
    }

    #[test]
    fn test_burn_at_tenth_second_steps_ticks_for_full_duration() {
        let mut bus = EventBus::new();
        let mut c = creep(100, 0);
        c.apply_status(StatusEffect::Burn {
            dps: fixed(10),
            duration: fixed(3),
        });
        for _ in 0..40 {
            step(&mut c, &mut bus, percent(10));
        }
        assert_eq!(c.health(), fixed(70));
    }

    #[test]
    fn test_hit_kills_and_skips_status() {
        let mut bus = EventBus::new();
        let mut c = creep(10, 1);
        let killed = c.apply_hit(
            fixed(10),
            Some(StatusEffect::Slow {
                amount: percent(50),
                duration: fixed(5),
                source_rank: 1,
            }),
            &mut bus,
        );
        assert!(killed);
        assert_eq!(c.state(), CreepState::Killed);
        assert_eq!(c.slow_count(), 0);
        assert!(matches!(
            drain(&mut bus).as_slice(),
            [GameEvent::CreepKilled { gold_value: 7, .. }]
        ));
        // Dead creeps ignore further hits.
        assert!(!c.apply_hit(fixed(10), None, &mut bus));
        assert!(drain(&mut bus).is_empty());
    }

    #[test]
    fn test_walks_path_and_reaches_goal_once() {
        let mut bus = EventBus::new();
        let mut c = creep(100, 2);

        step(&mut c, &mut bus, Fixed::ONE);
        assert_eq!(c.progress(), Fixed::ONE);
        assert!(c.is_alive());

        step(&mut c, &mut bus, Fixed::ONE);
        assert_eq!(c.state(), CreepState::ReachedGoal);

        step(&mut c, &mut bus, Fixed::ONE);
        let goals = drain(&mut bus)
            .into_iter()
            .filter(|e| matches!(e, GameEvent::CreepReachedGoal { damage: 3, .. }))
            .count();
        assert_eq!(goals, 1);
    }

    #[test]
    fn test_progress_halfway() {
        let mut bus = EventBus::new();
        let path = PathDefinition {
            spawn: Vec3Fixed::ZERO,
            waypoints: vec![
                Vec3Fixed::from_ints(1, 0, 0),
                Vec3Fixed::from_ints(2, 0, 0),
                Vec3Fixed::from_ints(3, 0, 0),
            ],
        };
        let mut c = Creep::new(
            CreepId::from_raw(1),
            CreepType::Swarm,
            &archetype(10, 1),
            Fixed::ONE,
            0,
            &path,
            VisualHandle(1),
            percent(10),
        );
        step(&mut c, &mut bus, Fixed::ONE);
        assert_eq!(c.progress(), percent(50));
    }

    #[test]
    fn test_single_waypoint_path_progress() {
        let mut bus = EventBus::new();
        let path = PathDefinition {
            spawn: Vec3Fixed::ZERO,
            waypoints: vec![Vec3Fixed::from_ints(1, 0, 0)],
        };
        let mut c = Creep::new(
            CreepId::from_raw(1),
            CreepType::Boss,
            &archetype(10, 5),
            Fixed::ONE,
            0,
            &path,
            VisualHandle(1),
            percent(10),
        );
        step(&mut c, &mut bus, Fixed::ONE);
        assert_eq!(c.state(), CreepState::ReachedGoal);
        assert_eq!(c.progress(), Fixed::ONE);
    }
}
