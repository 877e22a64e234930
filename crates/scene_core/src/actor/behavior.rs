//! Scene lifecycle hooks and the context they run against.

use super::message::SceneMessage;
use super::runner::SceneServices;
use super::scene::Scene;
use crate::error::CoreError;
use crate::sync::SyncPacket;
use crate::timer::TimerHandle;
use crate::types::{EntityId, Position};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Result of a fallible lifecycle hook.
pub type BehaviorResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Scene-type-specific behavior: the business-logic collaborator.
///
/// Every hook is invoked strictly inside the owning actor's execution
/// context: implementations may freely read and write scene state through
/// the context without synchronization, but must not block (no I/O, no
/// waiting), since that stalls the entire scene.
///
/// A panic inside any hook is caught per message / per tick, logged with
/// scene context, and does not terminate the actor. `on_destroy` is still
/// invoked exactly once during shutdown regardless of earlier failures.
pub trait SceneBehavior: Send + 'static {
    /// Runs once before the scene starts ticking. An error leaves the
    /// scene in the `Failed` state, reported to the manager rather than
    /// retried.
    fn on_create(&mut self, _ctx: &mut SceneContext<'_>) -> BehaviorResult {
        Ok(())
    }

    /// Runs exactly once during shutdown, after the mailbox is drained.
    fn on_destroy(&mut self, _ctx: &mut SceneContext<'_>) {}

    /// Runs once per actor tick with the wall-clock time since the
    /// previous tick. Clock drift is tolerated: a slow tick is logged by
    /// the actor, never compensated with catch-up ticks.
    fn on_tick(&mut self, _ctx: &mut SceneContext<'_>, _delta: Duration) {}

    /// An entity was admitted into the scene.
    fn on_entity_enter(&mut self, _ctx: &mut SceneContext<'_>, _id: EntityId, _position: Position) {
    }

    /// An entity left the scene.
    fn on_entity_leave(&mut self, _ctx: &mut SceneContext<'_>, _id: EntityId) {}

    /// An entity's move was committed through AOI.
    fn on_entity_move(
        &mut self,
        _ctx: &mut SceneContext<'_>,
        _id: EntityId,
        _old: Position,
        _new: Position,
    ) {
    }

    /// A business command arrived through the mailbox.
    fn on_command(&mut self, _ctx: &mut SceneContext<'_>, _name: &str, _payload: &Value) {}
}

/// What a behavior can touch while one of its hooks runs.
///
/// Borrowed mutably for the duration of a single callback; the scene
/// state is exclusively the actor's, so no locking is involved.
pub struct SceneContext<'a> {
    /// The scene's entity table and configuration
    pub scene: &'a mut Scene,
    pub(super) services: &'a SceneServices,
    pub(super) timers: &'a mut Vec<TimerHandle>,
}

impl<'a> SceneContext<'a> {
    /// Publishes a domain event on the process-wide event bus.
    ///
    /// Backpressure from the bus is surfaced to the behavior, which
    /// decides whether the event is droppable or worth retrying next
    /// tick.
    pub fn publish(&self, event_type: &str, payload: Value) -> Result<u64, CoreError> {
        self.services.bus.publish(event_type, payload)
    }

    /// Schedules a message back into this scene's own mailbox after
    /// `delay`, via the timer wheel.
    ///
    /// The returned handle can cancel the delivery; all handles created
    /// here are also cancelled automatically when the scene is destroyed,
    /// so a timer can never fire into a dead scene.
    pub fn schedule_message(&mut self, delay: Duration, message: SceneMessage) -> TimerHandle {
        let tx = self.services.self_tx.clone();
        let scene_id = self.scene.id;
        let slot = std::sync::Mutex::new(Some(message));
        let handle = self.services.timer.schedule(delay, move || {
            if let Some(msg) = slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
                if tx.try_send(msg).is_err() {
                    warn!("⏰ {scene_id}: dropped scheduled message, mailbox full or closed");
                }
            }
        });
        self.timers.push(handle.clone());
        handle
    }

    /// Schedules a repeating mailbox command, cancelled automatically at
    /// scene teardown.
    pub fn schedule_repeating_command(
        &mut self,
        delay: Duration,
        period: Duration,
        name: &str,
        payload: Value,
    ) -> TimerHandle {
        let tx = self.services.self_tx.clone();
        let scene_id = self.scene.id;
        let name = name.to_string();
        let handle = self.services.timer.schedule_repeating(delay, period, move || {
            let msg = SceneMessage::Command {
                name: name.clone(),
                payload: payload.clone(),
            };
            if tx.try_send(msg).is_err() {
                warn!("⏰ {scene_id}: dropped repeating command, mailbox full or closed");
            }
        });
        self.timers.push(handle.clone());
        handle
    }

    /// Delivers a sync packet to one observer through the outbound sink.
    pub fn deliver(&self, observer: EntityId, packet: SyncPacket) {
        self.services.sink.deliver(observer, packet);
    }

    /// Fans a broadcast packet out to every entity in the scene.
    pub fn broadcast(&self, event: &str, payload: Value) {
        let packet = SyncPacket::SceneBroadcast {
            scene: self.scene.id,
            event: event.to_string(),
            payload,
        };
        for entity in self.scene.entities() {
            self.services.sink.deliver(entity.id, packet.clone());
        }
    }
}
