//! # Scene Core - Simulation Backbone
//!
//! The concurrency and data-consistency core of the Meridian game server.
//! It manages many concurrently running scenes (instances of a game world:
//! cities, battlefields, dungeons), each hosting thousands of mobile
//! entities that are updated on a fixed tick, know which other entities
//! they can see, and receive events and deferred actions without
//! cross-scene lock contention.
//!
//! ## Design Philosophy
//!
//! The core contains **no game logic** - business rules live in
//! scene-type-specific behaviors implementing [`SceneBehavior`]. The core
//! provides four tightly coupled subsystems:
//!
//! * **Scene actors** - each scene is owned by exactly one task; all
//!   entity mutation is linearized through a bounded mailbox, so the core
//!   has no per-entity locks at all
//! * **AOI engine** - a nine-grid spatial index with a radius-accurate
//!   distance filter computing enter/leave/move visibility deltas
//! * **Timer wheel** - O(1) scheduling and cancellation for the thousands
//!   of short-lived timers a scene accumulates (cooldowns, buffs)
//! * **Event bus** - a pre-allocated ring of reusable slots for
//!   in-process publish/subscribe with backpressure instead of loss
//!
//! ## Architecture Overview
//!
//! External callers send [`SceneMessage`]s into a scene's mailbox through
//! the [`SceneManager`]. The owning actor drains its mailbox in FIFO
//! order, mutates entity state, feeds movement through the AOI engine on
//! the configured cadence, and converts visibility deltas into
//! [`SyncPacket`]s handed to the [`SyncSink`] supplied by the network
//! layer. Scheduled game logic re-enters the scene through timer-wheel
//! callbacks that re-inject mailbox messages; cross-cutting systems react
//! to domain events published on the bus.
//!
//! ## Thread Safety
//!
//! Scene entity state is exclusively owned by its actor and never shared.
//! The timer wheel and the event bus are the only structures touched by
//! multiple producers; the wheel uses bucket-local locks and the bus a
//! single compare-and-swap on its sequence counter, so contention is
//! limited to one bucket or one claim per operation.
//!
//! ## Error Handling
//!
//! Capacity errors (mailbox full, scene limit, bus backpressure) surface
//! synchronously as [`CoreError`] rejections - nothing is silently
//! dropped. Behavior callback panics are caught per message / per tick,
//! logged with scene context, and never terminate an actor.

pub use actor::{
    BehaviorResult, Entity, Scene, SceneActor, SceneBehavior, SceneContext, SceneHandle,
    SceneMessage, SceneServices, SceneSnapshot,
};
pub use aoi::{AoiDelta, AoiGrid, AoiStats};
pub use bus::{BusEvent, BusStats, EventBus, SubscriptionHandle};
pub use config::{
    AoiConfig, CoreConfig, EmptyTimeout, EventBusConfig, LoadBalanceStrategy, ManagerConfig,
    SceneConfig, TimerWheelConfig,
};
pub use error::CoreError;
pub use manager::{ManagerStats, SceneManager};
pub use sync::{ChannelSync, NullSync, SyncPacket, SyncSink};
pub use timer::{TimerHandle, TimerWheel, TimerWheelStats};
pub use types::{EntityId, Position, SceneId, SceneKind, SceneState};

pub mod actor;
pub mod aoi;
pub mod bus;
pub mod config;
pub mod error;
pub mod manager;
pub mod sync;
pub mod timer;
pub mod types;

mod util;
