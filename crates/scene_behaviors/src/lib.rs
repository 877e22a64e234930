//! # Stock Scene Behaviors
//!
//! Ready-made [`SceneBehavior`] implementations for the common scene
//! kinds:
//!
//! - [`MainCityBehavior`] - persistent social hub with periodic
//!   announcements
//! - [`FieldBehavior`] - open world area with a monster respawn cycle
//! - [`DungeonBehavior`] - instanced run with stage progression and a
//!   completion broadcast
//!
//! All of them are plain structs holding their own state; the owning
//! actor serializes every callback, so no locking appears here. They
//! double as worked examples for writing game-specific behaviors.

mod city;
mod dungeon;
mod field;

pub use city::MainCityBehavior;
pub use dungeon::DungeonBehavior;
pub use field::FieldBehavior;

use scene_core::{SceneBehavior, SceneKind};

/// Default behavior for a scene kind. Kinds without a stock behavior
/// get a "no gameplay" behavior that only relies on the core's entity
/// and AOI handling.
pub fn behavior_for(kind: SceneKind) -> Box<dyn SceneBehavior> {
    match kind {
        SceneKind::MainCity => Box::new(MainCityBehavior::new()),
        SceneKind::Field => Box::new(FieldBehavior::new()),
        SceneKind::Dungeon => Box::new(DungeonBehavior::new(3)),
        _ => Box::new(Passive),
    }
}

/// Behavior with no gameplay of its own.
pub struct Passive;

impl SceneBehavior for Passive {}
