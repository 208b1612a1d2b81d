//! Workers: hired units that walk to a resource node and mine gold.
//!
//! A worker's state machine is short:
//!
//! ```text
//! MovingToResource(node) -> Mining(node)
//! ```
//!
//! Every resource node is claimed by at most one worker. Removing a worker
//! releases its claim.

use serde::Serialize;
use tracing::debug;

use crate::config::WorkerConfig;
use crate::entity::{EntityId, EntityStorage, SimEntity, TickContext, VisualHandle};
use crate::error::{GameError, Result};
use crate::events::{EventBus, GameEvent, MeshKind};
use crate::math::{interval_elapsed, Fixed, Vec3Fixed};

/// Typed id of a worker.
pub type WorkerId = EntityId<Worker>;

/// What a worker is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "state", content = "node", rename_all = "snake_case")]
pub enum WorkerState {
    /// Walking to the claimed resource node.
    MovingToResource(usize),
    /// Mining at the claimed resource node.
    Mining(usize),
}

/// A hired worker.
#[derive(Debug, Clone)]
pub struct Worker {
    id: WorkerId,
    visual: VisualHandle,
    position: Vec3Fixed,
    node: usize,
    node_position: Vec3Fixed,
    speed: Fixed,
    state: WorkerState,
    mining_timer: Fixed,
    mining_interval: Fixed,
    gold_per_cycle: u32,
}

impl Worker {
    /// Spawn a worker heading for `node`.
    #[must_use]
    pub fn new(
        id: WorkerId,
        visual: VisualHandle,
        node: usize,
        node_position: Vec3Fixed,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            id,
            visual,
            position: config.spawn_point,
            node,
            node_position,
            speed: config.speed,
            state: WorkerState::MovingToResource(node),
            mining_timer: Fixed::ZERO,
            mining_interval: config.mining_interval,
            gold_per_cycle: config.gold_per_cycle,
        }
    }

    /// Worker id.
    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    /// Claimed resource node.
    #[must_use]
    pub const fn node(&self) -> usize {
        self.node
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> WorkerState {
        self.state
    }

    /// Feed the simulation-relevant fields into a state hash.
    pub fn hash_state<H: std::hash::Hasher>(&self, hasher: &mut H) {
        use std::hash::Hash;
        self.id.hash(hasher);
        self.position.hash(hasher);
        self.state.hash(hasher);
        self.mining_timer.to_bits().hash(hasher);
    }
}

impl SimEntity for Worker {
    fn visual(&self) -> VisualHandle {
        self.visual
    }

    fn position(&self) -> Vec3Fixed {
        self.position
    }

    fn update(&mut self, ctx: &mut TickContext<'_>) {
        match self.state {
            WorkerState::MovingToResource(node) => {
                self.position = self
                    .position
                    .move_towards(self.node_position, self.speed * ctx.delta);
                if self.position == self.node_position {
                    debug!(worker = %self.id, node, "Worker started mining");
                    self.state = WorkerState::Mining(node);
                }
            }
            WorkerState::Mining(_) => {
                self.mining_timer += ctx.delta;
                while interval_elapsed(self.mining_timer, self.mining_interval) {
                    self.mining_timer -= self.mining_interval;
                    ctx.bus.publish(GameEvent::GoldMined {
                        worker: self.id,
                        amount: self.gold_per_cycle,
                    });
                }
            }
        }
    }
}

/// Read-only view of a worker for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerView {
    /// Worker id.
    pub id: WorkerId,
    /// Claimed node.
    pub node: usize,
    /// Current position.
    pub position: Vec3Fixed,
    /// Current state.
    pub state: WorkerState,
}

/// All workers and the resource node claims.
#[derive(Debug, Clone)]
pub struct WorkerCrew {
    config: WorkerConfig,
    workers: EntityStorage<Worker>,
    claims: Vec<Option<WorkerId>>,
}

impl WorkerCrew {
    /// Create an empty crew.
    #[must_use]
    pub fn new(config: WorkerConfig) -> Self {
        let claims = vec![None; config.resource_nodes.len()];
        Self {
            config,
            workers: EntityStorage::new(),
            claims,
        }
    }

    /// Number of workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether there are no workers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Maximum number of workers.
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    /// Cost of the next hire: base plus increment per existing worker.
    #[must_use]
    pub fn next_cost(&self) -> u32 {
        let count = u32::try_from(self.workers.len()).unwrap_or(u32::MAX);
        self.config
            .base_cost
            .saturating_add(self.config.cost_increment.saturating_mul(count))
    }

    /// Lowest-index unclaimed resource node.
    #[must_use]
    pub fn free_node(&self) -> Option<usize> {
        self.claims.iter().position(Option::is_none)
    }

    /// Check that a hire is possible and return the node it would claim.
    pub fn check_hire(&self) -> Result<usize> {
        if self.workers.len() >= self.config.max_workers {
            return Err(GameError::WorkerLimitReached(self.config.max_workers));
        }
        self.free_node().ok_or(GameError::NoFreeResource)
    }

    /// Spawn a worker claiming `node`. Payment is the caller's job.
    pub fn spawn(&mut self, node: usize, bus: &mut EventBus) -> Result<WorkerId> {
        let Some(&node_position) = self.config.resource_nodes.get(node) else {
            return Err(GameError::NoFreeResource);
        };
        if self.claims.get(node).copied().flatten().is_some() {
            return Err(GameError::NoFreeResource);
        }

        let visual = bus.request_visual(MeshKind::Worker);
        let config = &self.config;
        let id = self
            .workers
            .insert_with(|id| Worker::new(id, visual, node, node_position, config));
        self.claims[node] = Some(id);
        bus.publish(GameEvent::AddToScene {
            handle: visual,
            position: self.config.spawn_point,
        });
        Ok(id)
    }

    /// Dismiss a worker, releasing its node.
    pub fn remove(&mut self, id: WorkerId, bus: &mut EventBus) -> Result<()> {
        let mut worker = self
            .workers
            .remove(id)
            .ok_or(GameError::UnknownWorker(id.raw()))?;
        if let Some(claim) = self.claims.get_mut(worker.node) {
            *claim = None;
        }
        worker.destroy(bus);
        Ok(())
    }

    /// Advance every worker.
    pub fn update(&mut self, ctx: &mut TickContext<'_>) {
        for id in self.workers.sorted_ids() {
            if let Some(worker) = self.workers.get_mut(id) {
                worker.update(ctx);
            }
        }
    }

    /// Views in id order.
    #[must_use]
    pub fn views(&self) -> Vec<WorkerView> {
        self.workers
            .iter_sorted()
            .map(|w| WorkerView {
                id: w.id,
                node: w.node,
                position: w.position,
                state: w.state,
            })
            .collect()
    }

    /// Visual handles and positions in id order.
    pub fn visual_positions(&self) -> impl Iterator<Item = (VisualHandle, Vec3Fixed)> + '_ {
        self.workers.iter_sorted().map(|w| (w.visual, w.position))
    }

    /// Feed every worker into a state hash.
    pub fn hash_state<H: std::hash::Hasher>(&self, hasher: &mut H) {
        for worker in self.workers.iter_sorted() {
            worker.hash_state(hasher);
        }
    }
}
