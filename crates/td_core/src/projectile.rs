//! Homing projectiles.

use crate::entity::{EntityId, SimEntity, TickContext, VisualHandle};
use crate::events::ShotRequest;
use crate::math::{Fixed, Vec3Fixed};

/// Typed id of a projectile.
pub type ProjectileId = EntityId<Projectile>;

/// Flight state of a projectile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectileState {
    /// Still travelling.
    InFlight,
    /// Reached its target this tick.
    Impact,
    /// Lost its target; resolves with no effect.
    Fizzled,
}

/// A projectile homing in on one creep.
///
/// The target is held by id only. Steering is recomputed from the target's
/// current position every tick.
#[derive(Debug, Clone)]
pub struct Projectile {
    id: ProjectileId,
    visual: VisualHandle,
    position: Vec3Fixed,
    shot: ShotRequest,
    impact_epsilon: Fixed,
    state: ProjectileState,
}

impl Projectile {
    /// Launch from the shot's origin.
    #[must_use]
    pub fn new(
        id: ProjectileId,
        shot: ShotRequest,
        visual: VisualHandle,
        impact_epsilon: Fixed,
    ) -> Self {
        Self {
            id,
            visual,
            position: shot.origin,
            shot,
            impact_epsilon,
            state: ProjectileState::InFlight,
        }
    }

    /// Projectile id.
    #[must_use]
    pub const fn id(&self) -> ProjectileId {
        self.id
    }

    /// The shot this projectile carries.
    #[must_use]
    pub const fn shot(&self) -> &ShotRequest {
        &self.shot
    }

    /// Flight state.
    #[must_use]
    pub const fn state(&self) -> ProjectileState {
        self.state
    }

    /// Whether the projectile has impacted or fizzled.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state != ProjectileState::InFlight
    }
}

impl SimEntity for Projectile {
    fn visual(&self) -> VisualHandle {
        self.visual
    }

    fn position(&self) -> Vec3Fixed {
        self.position
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) {
        if self.is_resolved() {
            return;
        }

        // The feed is in id order.
        let target = ctx
            .creeps
            .binary_search_by_key(&self.shot.target, |c| c.id)
            .ok()
            .map(|index| ctx.creeps[index].position);
        let Some(target) = target else {
            self.state = ProjectileState::Fizzled;
            return;
        };

        self.position = self
            .position
            .move_towards(target, self.shot.speed * ctx.delta);
        if self.position.distance(target) < self.impact_epsilon {
            self.state = ProjectileState::Impact;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::creep::{CreepId, CreepSnapshot};
    use crate::entity::SimRng;
    use crate::events::EventBus;
    use crate::math::percent;
    use crate::tower::{TowerId, TowerType};

    fn shot(target: u64) -> ShotRequest {
        ShotRequest {
            tower: TowerId::from_raw(1),
            tower_type: TowerType::Basic,
            rank: 1,
            origin: Vec3Fixed::ZERO,
            target: CreepId::from_raw(target),
            damage: Fixed::from_num(10),
            is_critical: false,
            slow_amount: Fixed::ZERO,
            speed: Fixed::from_num(10),
        }
    }

    fn creep_at(id: u64, x: i32) -> CreepSnapshot {
        CreepSnapshot {
            id: CreepId::from_raw(id),
            position: Vec3Fixed::from_ints(x, 0, 0),
            progress: Fixed::ZERO,
            distance_to_next: Fixed::ZERO,
        }
    }

    fn step(projectile: &mut Projectile, creeps: &[CreepSnapshot]) {
        let mut bus = EventBus::new();
        let mut rng = SimRng::seed_from_u64(0);
        let mut ctx = TickContext {
            delta: percent(10),
            bus: &mut bus,
            rng: &mut rng,
            creeps,
        };
        projectile.update(&mut ctx);
    }

    #[test]
    fn test_homes_in_and_impacts() {
        let mut p = Projectile::new(ProjectileId::from_raw(1), shot(2), VisualHandle(1), percent(50));
        let creeps = [creep_at(1, -5), creep_at(2, 3)];

        step(&mut p, &creeps);
        assert_eq!(p.state(), ProjectileState::InFlight);

        for _ in 0..3 {
            step(&mut p, &creeps);
        }
        assert_eq!(p.state(), ProjectileState::Impact);
    }

    #[test]
    fn test_follows_moving_target() {
        let mut p = Projectile::new(ProjectileId::from_raw(1), shot(1), VisualHandle(1), percent(50));
        step(&mut p, &[creep_at(1, 10)]);
        assert!(p.position().x > Fixed::ZERO);
        step(&mut p, &[creep_at(1, -10)]);
        assert!(p.position().x < Fixed::ONE);
    }

    #[test]
    fn test_fizzles_when_target_gone() {
        let mut p = Projectile::new(ProjectileId::from_raw(1), shot(9), VisualHandle(1), percent(50));
        step(&mut p, &[creep_at(1, 3)]);
        assert_eq!(p.state(), ProjectileState::Fizzled);
        assert!(p.is_resolved());
    }
}
