//! Event bus and the complete event vocabulary of the simulation.
//!
//! The bus is the only channel between subsystems and between the core and
//! its collaborators (renderer, UI). Publishing does two things:
//!
//! 1. Delivers the event synchronously, in subscription order, to every
//!    external handler registered for its [`EventKind`] (or for all kinds).
//!    A failing handler is logged and skipped; the rest still run.
//! 2. Queues the event for internal routing. The game controller drains the
//!    queue within the same tick and hands each event to the subsystem that
//!    owns the affected state (see [`EventHandler`]).
//!
//! Nothing here is global: the game builds one bus and passes it by
//! reference into every subsystem call.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::augments::Augment;
use crate::creep::{CreepId, CreepType, StatusEffect};
use crate::entity::VisualHandle;
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::tower::{TowerId, TowerType};
use crate::worker::WorkerId;

/// Error type returned by failing handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for event handlers.
pub type HandlerResult = std::result::Result<(), HandlerError>;

type Handler = Box<dyn FnMut(&GameEvent) -> HandlerResult>;

/// What the renderer should build for a newly requested visual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeshKind {
    /// A creep of the given archetype.
    Creep {
        /// Creep archetype.
        creep_type: CreepType,
    },
    /// A tower at a given rank.
    Tower {
        /// Tower type.
        tower_type: TowerType,
        /// Tower rank.
        rank: u8,
    },
    /// A projectile fired by a tower type.
    Projectile {
        /// Source tower type.
        tower_type: TowerType,
    },
    /// A worker.
    Worker,
    /// An empty build slot marker.
    TowerSlot,
}

/// Why the gold balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoldReason {
    /// Reward for killing a creep.
    CreepKilled,
    /// Worker mining yield.
    Mining,
    /// Flat bonus for clearing a round.
    RoundBonus,
    /// Round-end interest from an augment.
    Interest,
    /// Spent on a new tower.
    TowerBuilt,
    /// Spent on a tower upgrade.
    TowerUpgraded,
    /// Refund from selling a tower.
    TowerSold,
    /// Spent on hiring a worker.
    WorkerHired,
}

/// Final result of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcome {
    /// All rounds cleared with the king alive.
    Victory,
    /// The king's health reached zero.
    Defeat,
}

/// A tower's request to launch one projectile.
///
/// Damage and critical status are decided by the tower; combat only
/// resolves the already-decided value against the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotRequest {
    /// Firing tower.
    pub tower: TowerId,
    /// Firing tower's type.
    pub tower_type: TowerType,
    /// Firing tower's rank at the moment of the shot.
    pub rank: u8,
    /// Launch position.
    pub origin: Vec3Fixed,
    /// Creep the projectile homes in on.
    pub target: CreepId,
    /// Damage to deal on impact.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
    /// Whether the tower rolled a critical hit.
    pub is_critical: bool,
    /// Slow magnitude carried by frost projectiles (zero otherwise).
    #[serde(with = "fixed_serde")]
    pub slow_amount: Fixed,
    /// Projectile travel speed in units per second.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
}

/// Every event that crosses the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    // ------------------------------------------------------------------
    // Scene boundary
    // ------------------------------------------------------------------
    /// Build a visual for `handle`.
    CreateMesh {
        /// Handle the core will use for this visual.
        handle: VisualHandle,
        /// What to build.
        mesh: MeshKind,
    },
    /// Attach a visual to the scene at a position.
    AddToScene {
        /// Visual handle.
        handle: VisualHandle,
        /// Initial position.
        position: Vec3Fixed,
    },
    /// Detach a visual from the scene.
    RemoveFromScene {
        /// Visual handle.
        handle: VisualHandle,
    },
    /// Frost projectile impact effect.
    FrostImpact {
        /// Effect handle.
        handle: VisualHandle,
        /// Impact position.
        position: Vec3Fixed,
    },
    /// Fire critical impact effect.
    FireCritical {
        /// Effect handle.
        handle: VisualHandle,
        /// Impact position.
        position: Vec3Fixed,
    },
    /// Plain impact effect.
    BasicImpact {
        /// Effect handle.
        handle: VisualHandle,
        /// Impact position.
        position: Vec3Fixed,
    },
    /// Floating damage number.
    FloatingDamage {
        /// Effect handle.
        handle: VisualHandle,
        /// Where to show the number.
        position: Vec3Fixed,
        /// Damage dealt.
        #[serde(with = "fixed_serde")]
        amount: Fixed,
        /// Whether the hit was critical.
        is_critical: bool,
    },

    // ------------------------------------------------------------------
    // State-change notifications
    // ------------------------------------------------------------------
    /// Gold balance changed.
    GoldChanged {
        /// New balance.
        gold: u32,
        /// Signed change.
        delta: i64,
        /// Cause of the change.
        reason: GoldReason,
    },
    /// King health changed.
    KingHealthChanged {
        /// Current health.
        health: u32,
        /// Maximum health.
        max_health: u32,
    },
    /// Number of built towers changed.
    TowerCountChanged {
        /// Current tower count.
        count: usize,
    },
    /// The inter-round countdown moved to a new displayed value.
    InterRoundTimerUpdated {
        /// Seconds remaining.
        #[serde(with = "fixed_serde")]
        remaining: Fixed,
    },
    /// A round began spawning.
    RoundStarted {
        /// Round number (1-based).
        round: u32,
        /// Creep archetype of the round.
        creep_type: CreepType,
        /// Creeps scheduled.
        count: u32,
    },
    /// Every creep of the round has been killed or reached the goal.
    RoundCompleted {
        /// Round number.
        round: u32,
        /// Creeps spawned.
        spawned: u32,
        /// Creeps killed.
        killed: u32,
        /// Creeps that reached the king.
        reached_goal: u32,
    },
    /// The game ended.
    GameOver {
        /// Victory or defeat.
        outcome: GameOutcome,
        /// Round in progress or last cleared.
        round: u32,
    },
    /// Timers and spawning froze.
    GamePaused,
    /// Timers and spawning resumed.
    GameResumed,
    /// The player is offered a choice of augments.
    AugmentsOffered {
        /// Augments to choose from.
        choices: Vec<Augment>,
    },
    /// An augment became active.
    AugmentSelected {
        /// The chosen augment.
        augment: Augment,
    },
    /// A tower was built on a slot.
    TowerBuilt {
        /// New tower.
        tower: TowerId,
        /// Slot index.
        slot: usize,
        /// Tower type.
        tower_type: TowerType,
        /// Build cost paid.
        cost: u32,
    },
    /// A tower gained a rank; the renderer rebuilds its visual.
    TowerUpgraded {
        /// Tower id.
        tower: TowerId,
        /// Visual to rebuild.
        handle: VisualHandle,
        /// Tower type.
        tower_type: TowerType,
        /// New rank.
        rank: u8,
        /// Upgrade price paid.
        cost: u32,
    },
    /// A tower was sold and its slot freed.
    TowerSold {
        /// Tower id.
        tower: TowerId,
        /// Freed slot.
        slot: usize,
        /// Gold refunded.
        refund: u32,
    },
    /// Tower selection changed.
    TowerSelected {
        /// Selected tower, if any.
        tower: Option<TowerId>,
    },
    /// A worker was hired.
    WorkerHired {
        /// New worker.
        worker: WorkerId,
        /// Claimed resource node index.
        node: usize,
        /// Hire cost paid.
        cost: u32,
    },
    /// A worker was dismissed.
    WorkerRemoved {
        /// Worker id.
        worker: WorkerId,
    },

    // ------------------------------------------------------------------
    // Simulation routing
    // ------------------------------------------------------------------
    /// A creep entered the field.
    CreepSpawned {
        /// New creep.
        creep: CreepId,
        /// Archetype.
        creep_type: CreepType,
        /// Path index.
        path: usize,
    },
    /// A creep died. Never published together with `CreepReachedGoal`.
    CreepKilled {
        /// Dead creep.
        creep: CreepId,
        /// Gold reward before modifiers.
        gold_value: u32,
        /// Where it died.
        position: Vec3Fixed,
    },
    /// A creep reached the king.
    CreepReachedGoal {
        /// Creep id.
        creep: CreepId,
        /// Damage to the king.
        damage: u32,
    },
    /// A tower fired.
    ProjectileRequested(ShotRequest),
    /// A projectile struck a creep.
    CreepHit {
        /// Target creep.
        creep: CreepId,
        /// Damage to apply.
        #[serde(with = "fixed_serde")]
        damage: Fixed,
        /// Whether the hit was critical.
        is_critical: bool,
        /// Status to apply if the creep survives the damage.
        effect: Option<StatusEffect>,
    },
    /// A worker finished a mining cycle.
    GoldMined {
        /// Mining worker.
        worker: WorkerId,
        /// Base gold yield.
        amount: u32,
    },
}

/// Topic of an event, used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum EventKind {
    CreateMesh,
    AddToScene,
    RemoveFromScene,
    FrostImpact,
    FireCritical,
    BasicImpact,
    FloatingDamage,
    GoldChanged,
    KingHealthChanged,
    TowerCountChanged,
    InterRoundTimerUpdated,
    RoundStarted,
    RoundCompleted,
    GameOver,
    GamePaused,
    GameResumed,
    AugmentsOffered,
    AugmentSelected,
    TowerBuilt,
    TowerUpgraded,
    TowerSold,
    TowerSelected,
    WorkerHired,
    WorkerRemoved,
    CreepSpawned,
    CreepKilled,
    CreepReachedGoal,
    ProjectileRequested,
    CreepHit,
    GoldMined,
}

impl GameEvent {
    /// The subscription topic of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CreateMesh { .. } => EventKind::CreateMesh,
            Self::AddToScene { .. } => EventKind::AddToScene,
            Self::RemoveFromScene { .. } => EventKind::RemoveFromScene,
            Self::FrostImpact { .. } => EventKind::FrostImpact,
            Self::FireCritical { .. } => EventKind::FireCritical,
            Self::BasicImpact { .. } => EventKind::BasicImpact,
            Self::FloatingDamage { .. } => EventKind::FloatingDamage,
            Self::GoldChanged { .. } => EventKind::GoldChanged,
            Self::KingHealthChanged { .. } => EventKind::KingHealthChanged,
            Self::TowerCountChanged { .. } => EventKind::TowerCountChanged,
            Self::InterRoundTimerUpdated { .. } => EventKind::InterRoundTimerUpdated,
            Self::RoundStarted { .. } => EventKind::RoundStarted,
            Self::RoundCompleted { .. } => EventKind::RoundCompleted,
            Self::GameOver { .. } => EventKind::GameOver,
            Self::GamePaused => EventKind::GamePaused,
            Self::GameResumed => EventKind::GameResumed,
            Self::AugmentsOffered { .. } => EventKind::AugmentsOffered,
            Self::AugmentSelected { .. } => EventKind::AugmentSelected,
            Self::TowerBuilt { .. } => EventKind::TowerBuilt,
            Self::TowerUpgraded { .. } => EventKind::TowerUpgraded,
            Self::TowerSold { .. } => EventKind::TowerSold,
            Self::TowerSelected { .. } => EventKind::TowerSelected,
            Self::WorkerHired { .. } => EventKind::WorkerHired,
            Self::WorkerRemoved { .. } => EventKind::WorkerRemoved,
            Self::CreepSpawned { .. } => EventKind::CreepSpawned,
            Self::CreepKilled { .. } => EventKind::CreepKilled,
            Self::CreepReachedGoal { .. } => EventKind::CreepReachedGoal,
            Self::ProjectileRequested(_) => EventKind::ProjectileRequested,
            Self::CreepHit { .. } => EventKind::CreepHit,
            Self::GoldMined { .. } => EventKind::GoldMined,
        }
    }
}

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    topic: Option<EventKind>,
    handler: Handler,
}

/// Synchronous publish/subscribe hub.
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    pending: VecDeque<GameEvent>,
    next_subscription: u64,
    next_visual: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("pending", &self.pending.len())
            .field("next_visual", &self.next_visual)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            pending: VecDeque::new(),
            next_subscription: 1,
            next_visual: 1,
        }
    }

    /// Register a handler for one topic.
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) -> HandlerResult + 'static,
    {
        self.add_subscriber(Some(kind), Box::new(handler))
    }

    /// Register a handler for every topic.
    pub fn subscribe_all<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) -> HandlerResult + 'static,
    {
        self.add_subscriber(None, Box::new(handler))
    }

    fn add_subscriber(&mut self, topic: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push(Subscriber { id, topic, handler });
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|sub| sub.id != id);
        self.subscribers.len() != before
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver an event to every matching handler and queue it for routing.
    pub fn publish(&mut self, event: GameEvent) {
        let kind = event.kind();
        let mut delivered = 0usize;

        for sub in &mut self.subscribers {
            if sub.topic.is_some_and(|topic| topic != kind) {
                continue;
            }
            delivered += 1;
            if let Err(err) = (sub.handler)(&event) {
                warn!(subscription = sub.id.0, ?kind, error = %err, "Event handler failed");
            }
        }

        if delivered == 0 {
            trace!(?kind, "Published with no subscribers");
        }

        self.pending.push_back(event);
    }

    /// Take the oldest event still waiting for internal routing.
    pub fn pop_pending(&mut self) -> Option<GameEvent> {
        self.pending.pop_front()
    }

    /// Whether events are waiting for internal routing.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Allocate a visual handle and ask the renderer to build it.
    pub fn request_visual(&mut self, mesh: MeshKind) -> VisualHandle {
        let handle = self.allocate_visual();
        self.publish(GameEvent::CreateMesh { handle, mesh });
        handle
    }

    /// Allocate a handle for a fire-and-forget effect.
    pub fn allocate_visual(&mut self) -> VisualHandle {
        let handle = VisualHandle(self.next_visual);
        self.next_visual += 1;
        handle
    }
}

/// A subsystem that owns state changed by routed events.
pub trait EventHandler {
    /// React to one routed event. May publish follow-up events.
    fn handle(&mut self, event: &GameEvent, bus: &mut EventBus);
}
