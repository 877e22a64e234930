//! # Scene Actor
//!
//! The scheduling core: each scene is owned by exactly one actor running
//! on its own tokio task. All entity mutation is linearized through the
//! scene's bounded mailbox, so no per-entity locks exist anywhere in the
//! core. The actor drains messages in FIFO order, ticks the scene's
//! behavior on a fixed interval, feeds movement through the AOI engine on
//! the configured cadence, and converts visibility deltas into sync
//! packets for observers.
//!
//! Behavior callbacks run strictly inside the actor's execution context;
//! a panicking callback is caught and logged, never fatal to the actor.

mod behavior;
mod handle;
mod message;
mod runner;
mod scene;

pub use behavior::{BehaviorResult, SceneBehavior, SceneContext};
pub use handle::SceneHandle;
pub use message::SceneMessage;
pub use runner::{SceneActor, SceneServices};
pub use scene::{Entity, Scene, SceneSnapshot};
