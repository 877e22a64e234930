//! The per-scene actor task: mailbox drain, tick loop, AOI flushes and
//! teardown.

use super::behavior::{SceneBehavior, SceneContext};
use super::handle::{Occupancy, SceneHandle, ShutdownSignal};
use super::message::SceneMessage;
use super::scene::{Entity, Scene};
use crate::bus::EventBus;
use crate::config::SceneConfig;
use crate::error::CoreError;
use crate::sync::{SyncPacket, SyncSink};
use crate::timer::{TimerHandle, TimerWheel};
use crate::types::{EntityId, Position, SceneId, SceneKind, SceneState};
use crate::util::panic_message;
use crossbeam::atomic::AtomicCell;
use serde_json::json;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Shared services a scene actor talks to, plus its own mailbox sender
/// for timer re-injection.
#[derive(Clone)]
pub struct SceneServices {
    /// Process-wide timer wheel
    pub timer: TimerWheel,
    /// Process-wide event bus
    pub bus: EventBus,
    /// Outbound sink for sync packets
    pub sink: Arc<dyn SyncSink>,
    /// The owning scene's own mailbox, for scheduled re-injection
    pub(crate) self_tx: mpsc::Sender<SceneMessage>,
}

/// Spawns scene actors. The actor owns its scene exclusively; the
/// returned [`SceneHandle`] is the only external surface.
pub struct SceneActor;

impl SceneActor {
    /// Validates the configuration, builds the scene and spawns its actor
    /// task. The actor runs `on_create` first; on failure the scene parks
    /// in `Failed` and a `scene_create_failed` event is published for the
    /// manager.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        id: SceneId,
        name: impl Into<String>,
        kind: SceneKind,
        config: SceneConfig,
        behavior: Box<dyn SceneBehavior>,
        timer: TimerWheel,
        bus: EventBus,
        sink: Arc<dyn SyncSink>,
        slot: usize,
    ) -> Result<SceneHandle, CoreError> {
        let name = name.into();
        let scene = Scene::new(id, name.clone(), kind, config.clone())?;
        let (tx, rx) = mpsc::channel(config.mailbox_size);
        let state = Arc::new(AtomicCell::new(SceneState::Creating));
        let shutdown = Arc::new(ShutdownSignal::default());
        let occupancy = Arc::new(Occupancy::new());

        let handle = SceneHandle {
            id,
            kind,
            name,
            tx: tx.clone(),
            state: state.clone(),
            shutdown: shutdown.clone(),
            occupancy: occupancy.clone(),
            empty_timeout: config.empty_timeout,
            slot,
        };

        let runner = Runner {
            scene,
            behavior,
            rx,
            services: SceneServices {
                timer,
                bus,
                sink,
                self_tx: tx,
            },
            timers: Vec::new(),
            shutdown,
            state,
            occupancy,
            pending_moves: HashMap::new(),
        };
        tokio::spawn(runner.run());
        Ok(handle)
    }
}

struct Runner {
    scene: Scene,
    behavior: Box<dyn SceneBehavior>,
    rx: mpsc::Receiver<SceneMessage>,
    services: SceneServices,
    /// Timers owned by this scene, cancelled wholesale at teardown
    timers: Vec<TimerHandle>,
    shutdown: Arc<ShutdownSignal>,
    state: Arc<AtomicCell<SceneState>>,
    occupancy: Arc<Occupancy>,
    /// Coalesced moves awaiting the next AOI pass: target position only,
    /// the AOI index still holds the last-committed one
    pending_moves: HashMap<EntityId, Position>,
}

impl Runner {
    async fn run(mut self) {
        let id = self.scene.id;
        info!("🎬 {id} '{}' creating ({})", self.scene.name, self.scene.kind);

        if !self.invoke_create() {
            self.scene.state = SceneState::Failed;
            self.state.store(SceneState::Failed);
            self.publish_event(
                "scene_create_failed",
                json!({ "scene": id, "kind": self.scene.kind }),
            );
            return;
        }
        self.scene.state = SceneState::Running;
        self.state.store(SceneState::Running);
        self.publish_event(
            "scene_created",
            json!({ "scene": id, "kind": self.scene.kind, "name": self.scene.name }),
        );

        if let Some(limit) = self.scene.config.time_limit {
            let shutdown = self.shutdown.clone();
            let handle = self.services.timer.schedule(limit, move || {
                shutdown.trigger();
            });
            self.timers.push(handle);
            debug!("🎬 {id}: time limit {limit:?} armed");
        }

        let tick_interval = self.scene.config.tick_interval;
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + tick_interval, tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let aoi_interval = self.scene.config.aoi.update_interval;
        let mut aoi_ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + aoi_interval, aoi_interval);
        aoi_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = self.shutdown.clone();
        let mut last_tick = Instant::now();
        loop {
            if shutdown.is_requested() {
                break;
            }
            tokio::select! {
                _ = shutdown.notify.notified() => break,
                _ = ticker.tick() => {
                    self.drain(self.scene.config.batch_size);
                    let now = Instant::now();
                    let delta = now - last_tick;
                    last_tick = now;
                    if delta > tick_interval * 2 {
                        warn!("🐌 {id}: slow tick, {delta:?} since previous (interval {tick_interval:?})");
                    }
                    self.invoke_tick(delta);
                }
                _ = aoi_ticker.tick() => {
                    self.flush_moves();
                }
                message = self.rx.recv() => match message {
                    Some(message) => {
                        self.handle_message(message);
                        self.drain(self.scene.config.batch_size.saturating_sub(1));
                    }
                    None => break,
                },
            }
        }

        self.teardown();
    }

    /// Drains up to `limit` already-queued messages, preserving FIFO
    /// order.
    fn drain(&mut self, limit: usize) {
        for _ in 0..limit {
            match self.rx.try_recv() {
                Ok(message) => self.handle_message(message),
                Err(_) => break,
            }
        }
    }

    fn handle_message(&mut self, message: SceneMessage) {
        let kind = message.kind();
        match message {
            SceneMessage::EnterEntity {
                id,
                position,
                attributes,
            } => self.handle_enter(id, position, attributes),
            SceneMessage::LeaveEntity { id } => self.handle_leave(id),
            SceneMessage::MoveEntity { id, position } => {
                if let Some(entity) = self.scene.entity_mut(id) {
                    // Commit to the entity table immediately; AOI sees
                    // only the final position at the next flush.
                    entity.position = position;
                    self.pending_moves.insert(id, position);
                } else {
                    debug!("🎬 {}: move for unknown {id}", self.scene.id);
                }
            }
            SceneMessage::SetAttribute { id, key, value } => {
                if let Some(entity) = self.scene.entity_mut(id) {
                    entity.attributes.insert(key, value);
                }
            }
            SceneMessage::Broadcast { event, payload } => {
                let packet = SyncPacket::SceneBroadcast {
                    scene: self.scene.id,
                    event,
                    payload,
                };
                for entity_id in self.scene.entity_ids() {
                    self.services.sink.deliver(entity_id, packet.clone());
                }
            }
            SceneMessage::Command { name, payload } => {
                let scene_id = self.scene.id;
                if let Err(panic) = self.invoke(|behavior, ctx| {
                    behavior.on_command(ctx, &name, &payload);
                }) {
                    error!("💥 {scene_id}: on_command('{name}') panicked: {panic}");
                }
            }
            SceneMessage::QueryVisible { id, reply } => {
                let _ = reply.send(self.scene.visible_set(id));
            }
            SceneMessage::QueryScene { reply } => {
                let _ = reply.send(self.scene.snapshot());
            }
        }
        debug!("🎬 {}: handled {kind}", self.scene.id);
    }

    fn handle_enter(
        &mut self,
        id: EntityId,
        position: Position,
        attributes: HashMap<String, serde_json::Value>,
    ) {
        let scene_id = self.scene.id;
        if self.scene.entity_count() >= self.scene.config.max_entities {
            warn!(
                "🚫 {scene_id}: entity {id} rejected, scene at capacity ({})",
                self.scene.config.max_entities
            );
            self.publish_event(
                "entity_enter_rejected",
                json!({ "scene": scene_id, "entity": id }),
            );
            return;
        }
        if self.scene.entity(id).is_some() {
            warn!("🚫 {scene_id}: entity {id} already present");
            return;
        }

        self.scene.insert_entity(Entity {
            id,
            position,
            attributes: attributes.clone(),
        });
        let visible = self.scene.aoi.add(id, position);
        self.occupancy.set_count(self.scene.entity_count());

        if let Err(panic) = self.invoke(|behavior, ctx| {
            behavior.on_entity_enter(ctx, id, position);
        }) {
            error!("💥 {scene_id}: on_entity_enter({id}) panicked: {panic}");
        }

        // The newcomer learns about everyone in range; everyone in range
        // learns about the newcomer.
        for other in visible {
            if let Some(entity) = self.scene.entity(other) {
                self.services.sink.deliver(
                    id,
                    SyncPacket::EntityAppeared {
                        scene: scene_id,
                        id: other,
                        position: entity.position,
                        attributes: entity.attributes.clone(),
                    },
                );
            }
            self.services.sink.deliver(
                other,
                SyncPacket::EntityAppeared {
                    scene: scene_id,
                    id,
                    position,
                    attributes: attributes.clone(),
                },
            );
        }
        debug!("➕ {scene_id}: entity {id} entered at ({}, {})", position.x, position.y);
    }

    fn handle_leave(&mut self, id: EntityId) {
        let scene_id = self.scene.id;
        self.pending_moves.remove(&id);
        if self.scene.entity(id).is_none() {
            debug!("🎬 {scene_id}: leave for unknown {id}");
            return;
        }
        let observers = self.scene.aoi.remove(id);
        self.scene.remove_entity(id);
        self.occupancy.set_count(self.scene.entity_count());

        if let Err(panic) = self.invoke(|behavior, ctx| {
            behavior.on_entity_leave(ctx, id);
        }) {
            error!("💥 {scene_id}: on_entity_leave({id}) panicked: {panic}");
        }

        for observer in observers {
            self.services.sink.deliver(
                observer,
                SyncPacket::EntityVanished {
                    scene: scene_id,
                    id,
                },
            );
        }
        debug!("➖ {scene_id}: entity {id} left");
    }

    /// Evaluates every coalesced move: commits the final position to the
    /// AOI index, fires `on_entity_move`, and converts the delta into
    /// sync packets for the mover and its observers.
    fn flush_moves(&mut self) {
        if self.pending_moves.is_empty() {
            return;
        }
        let scene_id = self.scene.id;
        let moves: Vec<(EntityId, Position)> = self.pending_moves.drain().collect();
        for (id, new_position) in moves {
            let Some(old_position) = self.scene.aoi.position_of(id) else {
                continue;
            };
            let delta = self.scene.aoi.update(id, new_position);

            if let Err(panic) = self.invoke(|behavior, ctx| {
                behavior.on_entity_move(ctx, id, old_position, new_position);
            }) {
                error!("💥 {scene_id}: on_entity_move({id}) panicked: {panic}");
            }

            let mover_attrs = self
                .scene
                .entity(id)
                .map(|e| e.attributes.clone())
                .unwrap_or_default();

            for &entered in &delta.entered {
                if let Some(entity) = self.scene.entity(entered) {
                    self.services.sink.deliver(
                        id,
                        SyncPacket::EntityAppeared {
                            scene: scene_id,
                            id: entered,
                            position: entity.position,
                            attributes: entity.attributes.clone(),
                        },
                    );
                }
                self.services.sink.deliver(
                    entered,
                    SyncPacket::EntityAppeared {
                        scene: scene_id,
                        id,
                        position: new_position,
                        attributes: mover_attrs.clone(),
                    },
                );
            }
            for &left in &delta.left {
                self.services.sink.deliver(
                    id,
                    SyncPacket::EntityVanished {
                        scene: scene_id,
                        id: left,
                    },
                );
                self.services.sink.deliver(
                    left,
                    SyncPacket::EntityVanished {
                        scene: scene_id,
                        id,
                    },
                );
            }
            // Observers that saw the mover before and still do get the
            // movement itself.
            for observer in self.scene.aoi.observers_of(id) {
                if !delta.entered.contains(&observer) {
                    self.services.sink.deliver(
                        observer,
                        SyncPacket::EntityMoved {
                            scene: scene_id,
                            id,
                            from: old_position,
                            to: new_position,
                        },
                    );
                }
            }
        }
    }

    fn teardown(&mut self) {
        let scene_id = self.scene.id;
        info!("🛑 {scene_id}: destroying");
        self.scene.state = SceneState::Destroying;
        self.state.store(SceneState::Destroying);

        // Drain whatever was queued before the shutdown request; senders
        // holding the handle get SceneNotFound afterwards.
        self.rx.close();
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message);
        }
        self.flush_moves();

        // Cancel every timer the scene owns so nothing fires into freed
        // state.
        for handle in self.timers.drain(..) {
            handle.cancel();
        }

        if let Err(panic) = {
            let mut ctx = SceneContext {
                scene: &mut self.scene,
                services: &self.services,
                timers: &mut self.timers,
            };
            catch_unwind(AssertUnwindSafe(|| self.behavior.on_destroy(&mut ctx)))
                .map_err(|p| panic_message(&*p))
        } {
            error!("💥 {scene_id}: on_destroy panicked: {panic}");
        }
        // Timers a behavior armed during on_destroy die with the scene.
        for handle in self.timers.drain(..) {
            handle.cancel();
        }

        self.scene.state = SceneState::Destroyed;
        self.state.store(SceneState::Destroyed);
        self.publish_event("scene_destroyed", json!({ "scene": scene_id }));
        info!("🛑 {scene_id}: destroyed");
    }

    /// Runs one behavior callback with panic containment, returning the
    /// panic message on failure.
    fn invoke<R>(
        &mut self,
        f: impl FnOnce(&mut Box<dyn SceneBehavior>, &mut SceneContext<'_>) -> R,
    ) -> Result<R, String> {
        let mut ctx = SceneContext {
            scene: &mut self.scene,
            services: &self.services,
            timers: &mut self.timers,
        };
        catch_unwind(AssertUnwindSafe(|| f(&mut self.behavior, &mut ctx)))
            .map_err(|p| panic_message(&*p))
    }

    fn invoke_create(&mut self) -> bool {
        let scene_id = self.scene.id;
        match self.invoke(|behavior, ctx| behavior.on_create(ctx)) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("💥 {scene_id}: on_create failed: {e}");
                false
            }
            Err(panic) => {
                error!("💥 {scene_id}: on_create panicked: {panic}");
                false
            }
        }
    }

    fn invoke_tick(&mut self, delta: std::time::Duration) {
        let scene_id = self.scene.id;
        if let Err(panic) = self.invoke(|behavior, ctx| behavior.on_tick(ctx, delta)) {
            error!("💥 {scene_id}: on_tick panicked: {panic}");
        }
    }

    fn publish_event(&self, event_type: &str, payload: serde_json::Value) {
        if let Err(e) = self.services.bus.publish(event_type, payload) {
            warn!("🚌 {}: dropped '{event_type}': {e}", self.scene.id);
        }
    }
}
