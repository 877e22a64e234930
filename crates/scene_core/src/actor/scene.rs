//! Scene state: the exclusively-owned entity table.

use crate::aoi::AoiGrid;
use crate::config::SceneConfig;
use crate::error::CoreError;
use crate::types::{EntityId, Position, SceneId, SceneKind, SceneState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

/// One entity's state inside its owning scene.
///
/// Only the owning scene actor ever holds a mutable reference; every
/// other component refers to the entity by id.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub position: Position,
    /// Small set of synchronized attributes, shipped in appear packets
    pub attributes: HashMap<String, Value>,
}

/// Point-in-time view of a scene, answered by `QueryScene`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub id: SceneId,
    pub name: String,
    pub kind: SceneKind,
    pub state: SceneState,
    pub entity_count: usize,
}

/// A scene's identity, configuration and entity table.
///
/// Owned by exactly one [`SceneActor`](super::SceneActor); behaviors
/// receive `&mut Scene` through their context and may mutate freely,
/// since the actor serializes all access.
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub kind: SceneKind,
    pub config: SceneConfig,
    pub(super) state: SceneState,
    entities: HashMap<EntityId, Entity>,
    pub(super) aoi: AoiGrid,
    pub(super) created_at: Instant,
}

impl Scene {
    pub(crate) fn new(
        id: SceneId,
        name: String,
        kind: SceneKind,
        config: SceneConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let aoi = AoiGrid::new(config.aoi.clone())?;
        Ok(Self {
            id,
            name,
            kind,
            config,
            state: SceneState::Creating,
            entities: HashMap::new(),
            aoi,
            created_at: Instant::now(),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SceneState {
        self.state
    }

    /// Number of entities currently in the scene.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Whether the scene holds no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up an entity.
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Mutable entity access, for behaviors.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Iterates over all entities.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Ids of all entities, collected.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Snapshot of what an entity currently sees, from the AOI index.
    pub fn visible_set(&self, id: EntityId) -> Option<Vec<EntityId>> {
        self.aoi.visible_set(id)
    }

    /// Who currently sees the given entity.
    pub fn observers_of(&self, id: EntityId) -> Vec<EntityId> {
        self.aoi.observers_of(id)
    }

    /// Time since the scene object was constructed.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub(super) fn insert_entity(&mut self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    pub(super) fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub(super) fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            state: self.state,
            entity_count: self.entities.len(),
        }
    }
}
