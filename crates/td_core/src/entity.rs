//! Entity identity, arena storage and the shared entity lifecycle.
//!
//! Every simulated object (creep, tower, projectile, worker) lives in an
//! [`EntityStorage`] owned by exactly one subsystem and is referred to from
//! anywhere else by its typed [`EntityId`]. A reference that outlives its
//! entity simply stops resolving; nothing dangles.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::creep::CreepSnapshot;
use crate::events::{EventBus, GameEvent};
use crate::math::{Fixed, Vec3Fixed};

/// Seeded random number generator shared by the simulation.
pub type SimRng = ChaCha8Rng;

/// Stable identifier for an entity of type `T`.
///
/// The type parameter keeps a creep id from being used where a tower id is
/// expected. Ids are never reused within one storage.
pub struct EntityId<T> {
    raw: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EntityId<T> {
    /// Wrap a raw id.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// The raw numeric id.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.raw
    }
}

impl<T> Clone for EntityId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntityId<T> {}

impl<T> PartialEq for EntityId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for EntityId<T> {}

impl<T> PartialOrd for EntityId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for EntityId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for EntityId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.raw)
    }
}

impl<T> fmt::Display for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl<T> Serialize for EntityId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for EntityId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Self::from_raw)
    }
}

/// Opaque handle to a visual owned by the rendering collaborator.
///
/// The core never looks inside; it only hands the handle back in scene
/// events so the renderer can find its own object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisualHandle(pub u64);

/// Arena storage for one entity type.
///
/// Uses a `HashMap` for O(1) lookup by id, with deterministic iteration via
/// sorted keys when updating.
#[derive(Debug, Clone)]
pub struct EntityStorage<T> {
    entities: HashMap<EntityId<T>, T>,
    next_id: u64,
}

impl<T> Default for EntityStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntityStorage<T> {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    /// Reserve the next id and insert the entity built from it.
    pub fn insert_with(&mut self, build: impl FnOnce(EntityId<T>) -> T) -> EntityId<T> {
        let id = EntityId::from_raw(self.next_id);
        self.next_id += 1;
        let entity = build(id);
        self.entities.insert(id, entity);
        id
    }

    /// Like [`EntityStorage::insert_with`], but the builder may decline.
    ///
    /// A declined build does not consume an id.
    pub fn try_insert_with(
        &mut self,
        build: impl FnOnce(EntityId<T>) -> Option<T>,
    ) -> Option<EntityId<T>> {
        let id = EntityId::from_raw(self.next_id);
        let entity = build(id)?;
        self.next_id += 1;
        self.entities.insert(id, entity);
        Some(id)
    }

    /// Remove an entity by id.
    pub fn remove(&mut self, id: EntityId<T>) -> Option<T> {
        self.entities.remove(&id)
    }

    /// Get an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId<T>) -> Option<&T> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by id.
    pub fn get_mut(&mut self, id: EntityId<T>) -> Option<&mut T> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId<T>) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get sorted ids for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId<T>> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Entities in id order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = &T> {
        self.sorted_ids()
            .into_iter()
            .filter_map(move |id| self.entities.get(&id))
    }

    /// Iterate mutably over all entities (not in deterministic order).
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entities.values_mut()
    }

    /// Remove and return every entity matching `predicate`, in id order.
    pub fn drain_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
        let doomed: Vec<_> = self
            .sorted_ids()
            .into_iter()
            .filter(|id| self.entities.get(id).is_some_and(&mut predicate))
            .collect();
        doomed
            .into_iter()
            .filter_map(|id| self.entities.remove(&id))
            .collect()
    }
}

/// Everything an entity may touch during its per-tick update.
pub struct TickContext<'a> {
    /// Clamped frame delta in seconds.
    pub delta: Fixed,
    /// Event bus for anything the entity needs to announce.
    pub bus: &'a mut EventBus,
    /// Shared seeded RNG.
    pub rng: &'a mut SimRng,
    /// Live creeps as seen at the start of this update.
    pub creeps: &'a [CreepSnapshot],
}

/// Lifecycle shared by every simulated entity.
pub trait SimEntity {
    /// Handle of the visual that represents this entity.
    fn visual(&self) -> VisualHandle;

    /// Current world position.
    fn position(&self) -> Vec3Fixed;

    /// Advance the entity by one tick.
    fn update(&mut self, ctx: &mut TickContext<'_>);

    /// Detach the entity's visual from the scene.
    ///
    /// Called exactly once, right before the owner drops the entity.
    fn destroy(&mut self, bus: &mut EventBus) {
        bus.publish(GameEvent::RemoveFromScene {
            handle: self.visual(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Dummy {
        id: EntityId<Dummy>,
        value: u32,
    }

    #[test]
    fn test_storage_assigns_increasing_ids() {
        let mut storage = EntityStorage::new();
        let a = storage.insert_with(|id| Dummy { id, value: 1 });
        let b = storage.insert_with(|id| Dummy { id, value: 2 });
        assert!(a < b);
        assert_eq!(storage.get(a).map(|d| d.id), Some(a));
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn test_removed_id_stops_resolving() {
        let mut storage = EntityStorage::new();
        let a = storage.insert_with(|id| Dummy { id, value: 1 });
        assert!(storage.remove(a).is_some());
        assert!(storage.get(a).is_none());
        // Ids are not reused.
        let b = storage.insert_with(|id| Dummy { id, value: 2 });
        assert_ne!(a, b);
    }

    #[test]
    fn test_drain_where_returns_matches_in_id_order() {
        let mut storage = EntityStorage::new();
        for value in [5, 1, 6, 2] {
            storage.insert_with(|id| Dummy { id, value });
        }
        let drained = storage.drain_where(|d| d.value > 4);
        assert_eq!(
            drained.iter().map(|d| d.value).collect::<Vec<_>>(),
            vec![5, 6]
        );
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn test_entity_id_serializes_as_number() {
        let id: EntityId<Dummy> = EntityId::from_raw(42);
        assert_eq!(ron::to_string(&id).expect("serialize"), "42");
    }
}
