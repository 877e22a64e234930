//! Typed messages delivered through a scene mailbox.

use super::scene::SceneSnapshot;
use crate::types::{EntityId, Position};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// A message addressed to one scene.
///
/// Messages are applied in send order by the owning actor. Queries carry
/// a oneshot reply channel; the reply is sent from inside the actor's
/// execution context so it observes a consistent scene state.
#[derive(Debug)]
pub enum SceneMessage {
    /// Admit an entity into the scene at the given position.
    EnterEntity {
        id: EntityId,
        position: Position,
        attributes: HashMap<String, Value>,
    },
    /// Remove an entity from the scene.
    LeaveEntity { id: EntityId },
    /// Commit a new position for an entity. AOI evaluation of the move is
    /// coalesced: only the final position within an AOI update interval
    /// is evaluated.
    MoveEntity { id: EntityId, position: Position },
    /// Update one synchronized attribute of an entity.
    SetAttribute {
        id: EntityId,
        key: String,
        value: Value,
    },
    /// Fan a payload out to every entity currently in the scene.
    Broadcast { event: String, payload: Value },
    /// Business command forwarded to the scene behavior's `on_command`.
    Command { name: String, payload: Value },
    /// Snapshot of what an entity currently sees, answered from the AOI
    /// index (staleness bounded by the AOI update interval).
    QueryVisible {
        id: EntityId,
        reply: oneshot::Sender<Option<Vec<EntityId>>>,
    },
    /// Snapshot of scene identity, state and population.
    QueryScene {
        reply: oneshot::Sender<SceneSnapshot>,
    },
}

impl SceneMessage {
    /// Short message-type name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SceneMessage::EnterEntity { .. } => "enter_entity",
            SceneMessage::LeaveEntity { .. } => "leave_entity",
            SceneMessage::MoveEntity { .. } => "move_entity",
            SceneMessage::SetAttribute { .. } => "set_attribute",
            SceneMessage::Broadcast { .. } => "broadcast",
            SceneMessage::Command { .. } => "command",
            SceneMessage::QueryVisible { .. } => "query_visible",
            SceneMessage::QueryScene { .. } => "query_scene",
        }
    }
}
