//! # Core Type Definitions
//!
//! Fundamental types used throughout the scene core. These provide the
//! building blocks for scene identity, entity identity and spatial
//! positioning.
//!
//! ## Key Types
//!
//! - [`SceneId`] - Unique identifier for a running scene
//! - [`EntityId`] - Unique identifier for an entity within the world
//! - [`Position`] - 3D position representation with double precision
//! - [`SceneKind`] - The closed set of scene categories
//! - [`SceneState`] - The scene lifecycle state machine
//!
//! ## Design Principles
//!
//! - **Type safety**: wrapper types prevent id confusion (SceneId vs EntityId)
//! - **Precision**: double-precision floats for large-world positioning
//! - **Serialization**: all types serialize to JSON for sync payloads

use serde::{Deserialize, Serialize};

/// Unique identifier for a scene.
///
/// A wrapper around a numeric id that provides type safety and ensures
/// scene ids cannot be confused with entity ids. Ids are allocated by the
/// [`SceneManager`](crate::SceneManager) and are never reused for a live
/// scene once the previous holder reached `Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneId(pub u64);

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scene-{}", self.0)
    }
}

/// Unique identifier for an entity in the game world.
///
/// Entities are scoped to exactly one scene at a time; only the owning
/// scene holds the entity's mutable state, every other component holds
/// only this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity-{}", self.0)
    }
}

/// Represents a 3D position in the game world.
///
/// Uses double-precision floating point for accurate positioning in large
/// worlds. AOI visibility uses the horizontal (x, y) plane; `z` is carried
/// for sync payloads but does not affect cell assignment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate (typically east-west axis)
    pub x: f64,
    /// Y coordinate (typically north-south axis)
    pub y: f64,
    /// Z coordinate (typically vertical axis)
    pub z: f64,
}

impl Position {
    /// Creates a new position with the specified coordinates.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Calculates the Euclidean distance to another position on the
    /// horizontal plane.
    ///
    /// AOI view distance is defined on the plane; vertical separation is
    /// intentionally ignored so flying/falling entities stay visible to
    /// ground observers.
    pub fn plane_distance(&self, other: Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Calculates the full 3D Euclidean distance to another position.
    pub fn distance(&self, other: Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// The closed set of scene categories.
///
/// The kind selects a default [`SceneConfig`](crate::config::SceneConfig)
/// at creation time and decides whether the scene is shared (main city,
/// field) or instanced per group (dungeon, battlefield, arena, instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneKind {
    /// Persistent shared hub scene
    MainCity,
    /// Open-world field scene
    Field,
    /// Instanced PvE scene with a time limit
    Dungeon,
    /// Instanced large-scale PvP scene with a time limit
    Battlefield,
    /// Small instanced PvP scene
    Arena,
    /// Generic instanced scene
    Instance,
}

impl std::fmt::Display for SceneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SceneKind::MainCity => "main_city",
            SceneKind::Field => "field",
            SceneKind::Dungeon => "dungeon",
            SceneKind::Battlefield => "battlefield",
            SceneKind::Arena => "arena",
            SceneKind::Instance => "instance",
        };
        f.write_str(name)
    }
}

/// Scene lifecycle state machine.
///
/// Transitions are strictly `Creating -> Running -> Destroying ->
/// Destroyed`; no transition may be skipped. A scene whose creation
/// callback failed moves to `Failed` and is reported to the manager
/// instead of being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneState {
    /// Scene object exists, `on_create` has not completed yet
    Creating,
    /// Scene is ticking and accepting messages
    Running,
    /// Shutdown requested, mailbox is being drained
    Destroying,
    /// `on_destroy` has completed; the id is retired
    Destroyed,
    /// `on_create` failed; the scene never ran
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_distance_ignores_z() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 100.0);
        assert_eq!(a.plane_distance(b), 5.0);
        assert!(a.distance(b) > 100.0);
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(SceneKind::MainCity.to_string(), "main_city");
        assert_eq!(SceneKind::Dungeon.to_string(), "dungeon");
    }
}
