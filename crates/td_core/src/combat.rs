//! Combat resolution: projectile flight, impacts and hit effects.
//!
//! Combat never decides damage. Towers roll crits and scale damage; combat
//! carries the decided value to the target and describes the hit in a
//! [`GameEvent::CreepHit`] for the creep's owner to apply.

use tracing::trace;

use crate::config::CombatConfig;
use crate::creep::StatusEffect;
use crate::entity::{EntityStorage, SimEntity, TickContext, VisualHandle};
use crate::events::{EventBus, EventHandler, GameEvent, MeshKind, ShotRequest};
use crate::math::{percent, Fixed, Vec3Fixed};
use crate::projectile::{Projectile, ProjectileState};
use crate::tower::TowerType;

/// A fire-and-forget visual that the core removes after its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EffectStub {
    handle: VisualHandle,
    remaining: Fixed,
}

/// Owner of live projectiles and effect stubs.
#[derive(Debug, Clone)]
pub struct CombatSystem {
    config: CombatConfig,
    projectiles: EntityStorage<Projectile>,
    effects: Vec<EffectStub>,
}

impl CombatSystem {
    /// Create an empty combat system.
    #[must_use]
    pub fn new(config: CombatConfig) -> Self {
        Self {
            config,
            projectiles: EntityStorage::new(),
            effects: Vec::new(),
        }
    }

    /// Number of projectiles in flight.
    #[must_use]
    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    /// Number of effect stubs still in the scene.
    #[must_use]
    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    /// Launch a projectile for a tower's shot.
    pub fn launch(&mut self, shot: ShotRequest, bus: &mut EventBus) {
        let visual = bus.request_visual(MeshKind::Projectile {
            tower_type: shot.tower_type,
        });
        let epsilon = self.config.impact_epsilon;
        let id = self
            .projectiles
            .insert_with(|id| Projectile::new(id, shot, visual, epsilon));
        trace!(projectile = %id, tower = %shot.tower, creep = %shot.target, "Projectile launched");
        bus.publish(GameEvent::AddToScene {
            handle: visual,
            position: shot.origin,
        });
    }

    /// Status a resolved shot applies to a surviving target.
    #[must_use]
    pub fn hit_effect(&self, shot: &ShotRequest) -> Option<StatusEffect> {
        match shot.tower_type {
            TowerType::Frost if shot.slow_amount > Fixed::ZERO => Some(StatusEffect::Slow {
                amount: shot.slow_amount,
                duration: self.config.slow_duration,
                source_rank: shot.rank,
            }),
            TowerType::Fire if shot.is_critical => Some(StatusEffect::Burn {
                dps: shot.damage * percent(self.config.burn_percent),
                duration: self.config.burn_duration,
            }),
            _ => None,
        }
    }

    /// Advance projectiles and effect stubs by one tick.
    pub fn update(&mut self, ctx: &mut TickContext<'_>) {
        self.age_effects(ctx.delta, ctx.bus);

        for id in self.projectiles.sorted_ids() {
            if let Some(projectile) = self.projectiles.get_mut(id) {
                projectile.update(ctx);
            }
        }

        for mut projectile in self.projectiles.drain_where(Projectile::is_resolved) {
            if projectile.state() == ProjectileState::Impact {
                self.resolve_impact(&projectile, ctx.bus);
            } else {
                trace!(projectile = %projectile.id(), "Projectile lost its target");
            }
            projectile.destroy(ctx.bus);
        }
    }

    fn resolve_impact(&mut self, projectile: &Projectile, bus: &mut EventBus) {
        let shot = projectile.shot();
        let position = projectile.position();

        bus.publish(GameEvent::CreepHit {
            creep: shot.target,
            damage: shot.damage,
            is_critical: shot.is_critical,
            effect: self.hit_effect(shot),
        });

        let handle = bus.allocate_visual();
        let impact = match shot.tower_type {
            TowerType::Frost => GameEvent::FrostImpact { handle, position },
            TowerType::Fire if shot.is_critical => GameEvent::FireCritical { handle, position },
            _ => GameEvent::BasicImpact { handle, position },
        };
        bus.publish(impact);
        self.effects.push(EffectStub {
            handle,
            remaining: self.config.impact_lifetime,
        });

        let handle = bus.allocate_visual();
        bus.publish(GameEvent::FloatingDamage {
            handle,
            position,
            amount: shot.damage,
            is_critical: shot.is_critical,
        });
        self.effects.push(EffectStub {
            handle,
            remaining: self.config.floating_text_lifetime,
        });
    }

    fn age_effects(&mut self, delta: Fixed, bus: &mut EventBus) {
        for effect in &mut self.effects {
            effect.remaining -= delta;
        }
        self.effects.retain(|effect| {
            if effect.remaining > Fixed::ZERO {
                return true;
            }
            bus.publish(GameEvent::RemoveFromScene {
                handle: effect.handle,
            });
            false
        });
    }

    /// Visual handles and positions of projectiles in id order.
    pub fn visual_positions(&self) -> impl Iterator<Item = (VisualHandle, Vec3Fixed)> + '_ {
        self.projectiles
            .iter_sorted()
            .map(|p| (p.visual(), p.position()))
    }

    /// Feed projectile state into a state hash.
    pub fn hash_state<H: std::hash::Hasher>(&self, hasher: &mut H) {
        use std::hash::Hash;
        for projectile in self.projectiles.iter_sorted() {
            projectile.id().hash(hasher);
            projectile.position().hash(hasher);
            projectile.shot().target.hash(hasher);
            projectile.shot().damage.to_bits().hash(hasher);
        }
        self.effects.len().hash(hasher);
    }
}

impl EventHandler for CombatSystem {
    fn handle(&mut self, event: &GameEvent, bus: &mut EventBus) {
        if let GameEvent::ProjectileRequested(shot) = event {
            self.launch(*shot, bus);
        }
    }
}
