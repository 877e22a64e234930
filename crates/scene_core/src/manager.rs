//! Scene creation, routing, load balancing and garbage collection.
//!
//! The manager owns the registry of live scenes, binds each new scene to
//! a logical worker slot chosen by the load-balance policy, routes
//! messages by scene id, and runs the periodic cleanup sweep that
//! destroys scenes left empty beyond the configured timeout and retires
//! handles of destroyed or failed scenes.

use crate::actor::{SceneActor, SceneBehavior, SceneHandle, SceneMessage, SceneSnapshot};
use crate::bus::EventBus;
use crate::config::{CoreConfig, EmptyTimeout, LoadBalanceStrategy, SceneConfig};
use crate::error::CoreError;
use crate::sync::SyncSink;
use crate::timer::TimerWheel;
use crate::types::{EntityId, SceneId, SceneKind, SceneState};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Point-in-time view of the manager, for monitoring and admin surfaces.
#[derive(Debug, Clone)]
pub struct ManagerStats {
    /// Live scenes (any state except retired)
    pub scene_count: usize,
    /// Live scenes per kind
    pub scenes_by_kind: HashMap<SceneKind, usize>,
    /// Entities across all live scenes
    pub total_entities: usize,
    /// Scenes per worker slot
    pub slot_loads: Vec<usize>,
}

/// Creates, tracks, routes to and garbage-collects scene actors.
///
/// Cloning shares the same registry.
#[derive(Clone)]
pub struct SceneManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: CoreConfig,
    timer: TimerWheel,
    bus: EventBus,
    sink: Arc<dyn SyncSink>,
    scenes: DashMap<SceneId, SceneHandle>,
    /// Reserved-slot counter backing the `max_scenes` limit; incremented
    /// by a successful reservation in `create_scene_with_config` and
    /// released when the handle is retired
    live_scenes: AtomicUsize,
    /// Monotone id source; ids are never reused for live scenes
    next_scene_id: AtomicU64,
    /// Scenes currently bound to each worker slot
    slot_loads: Vec<AtomicUsize>,
    round_robin: AtomicUsize,
    sweeping: AtomicBool,
}

impl SceneManager {
    /// Builds the manager plus the shared timer wheel and event bus it
    /// hands to every scene. Fails fast on invalid configuration.
    ///
    /// The timer wheel starts advancing immediately; call
    /// [`SceneManager::start_cleanup_sweep`] to arm the empty-scene
    /// collector.
    pub fn new(config: CoreConfig, sink: Arc<dyn SyncSink>) -> Result<Self, CoreError> {
        config.validate()?;
        let timer = TimerWheel::new(config.timer.clone())?;
        timer.start();
        let bus = EventBus::new(config.bus.clone())?;
        let slot_loads = (0..config.manager.worker_slots)
            .map(|_| AtomicUsize::new(0))
            .collect();
        info!(
            "🌍 Scene manager ready: max {} scenes over {} worker slots ({:?})",
            config.manager.max_scenes, config.manager.worker_slots, config.manager.strategy
        );
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                timer,
                bus,
                sink,
                scenes: DashMap::new(),
                live_scenes: AtomicUsize::new(0),
                next_scene_id: AtomicU64::new(1),
                slot_loads,
                round_robin: AtomicUsize::new(0),
                sweeping: AtomicBool::new(false),
            }),
        })
    }

    /// The shared event bus, for cross-scene subscribers.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// The shared timer wheel.
    pub fn timer(&self) -> &TimerWheel {
        &self.inner.timer
    }

    /// Creates a scene of the given kind with the kind's default
    /// configuration.
    pub fn create_scene(
        &self,
        kind: SceneKind,
        name: impl Into<String>,
        behavior: Box<dyn SceneBehavior>,
    ) -> Result<SceneId, CoreError> {
        self.create_scene_with_config(kind, name, behavior, SceneConfig::for_kind(kind))
    }

    /// Creates a scene with an explicit configuration.
    ///
    /// Rejects with [`CoreError::SceneLimitReached`] above `max_scenes`
    /// and with [`CoreError::InvalidConfig`] on bad thresholds. The
    /// scene's `on_create` runs asynchronously on the actor; a failure
    /// there parks the scene in `Failed`, publishes a
    /// `scene_create_failed` bus event and leaves removal to the sweep.
    pub fn create_scene_with_config(
        &self,
        kind: SceneKind,
        name: impl Into<String>,
        behavior: Box<dyn SceneBehavior>,
        config: SceneConfig,
    ) -> Result<SceneId, CoreError> {
        let inner = &self.inner;
        config.validate()?;
        inner.reserve_scene_slot()?;

        let id = SceneId(inner.next_scene_id.fetch_add(1, Ordering::Relaxed));
        let slot = inner.pick_slot();
        let handle = match SceneActor::spawn(
            id,
            name,
            kind,
            config,
            behavior,
            inner.timer.clone(),
            inner.bus.clone(),
            inner.sink.clone(),
            slot,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                inner.live_scenes.fetch_sub(1, Ordering::AcqRel);
                return Err(e);
            }
        };
        inner.slot_loads[slot].fetch_add(1, Ordering::AcqRel);
        info!("🌍 Created {id} ({kind}) on worker slot {slot}");
        inner.scenes.insert(id, handle);
        Ok(id)
    }

    /// Routes a message to a scene's mailbox.
    pub fn send_to_scene(&self, id: SceneId, message: SceneMessage) -> Result<(), CoreError> {
        let handle = self
            .inner
            .scenes
            .get(&id)
            .ok_or(CoreError::SceneNotFound(id))?;
        match handle.state() {
            SceneState::Creating | SceneState::Running => handle.send(message),
            _ => Err(CoreError::SceneNotFound(id)),
        }
    }

    /// Picks a running scene of the given kind, preferring the most
    /// populated (fills instances before opening new ones). Entry into a
    /// full scene is still rejected by the scene itself.
    pub fn select_scene(&self, kind: SceneKind) -> Option<SceneId> {
        self.inner
            .scenes
            .iter()
            .filter(|entry| {
                let h = entry.value();
                h.kind() == kind && h.state() == SceneState::Running
            })
            .max_by_key(|entry| entry.value().entity_count())
            .map(|entry| entry.value().id())
    }

    /// Resolves a scene of the given kind, creating one when no running
    /// instance exists. The behavior factory is only invoked on creation.
    pub fn select_or_create_scene<F>(
        &self,
        kind: SceneKind,
        name: impl Into<String>,
        behavior: F,
    ) -> Result<SceneId, CoreError>
    where
        F: FnOnce() -> Box<dyn SceneBehavior>,
    {
        if let Some(id) = self.select_scene(kind) {
            return Ok(id);
        }
        self.create_scene(kind, name, behavior())
    }

    /// Snapshot of what an entity currently sees, answered by the owning
    /// actor (bounded AOI staleness applies).
    pub async fn query_visible(
        &self,
        scene: SceneId,
        entity: EntityId,
    ) -> Result<Option<Vec<EntityId>>, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.send_to_scene(scene, SceneMessage::QueryVisible { id: entity, reply })?;
        rx.await.map_err(|_| CoreError::SceneNotFound(scene))
    }

    /// Snapshot of a scene's identity and population.
    pub async fn query_scene(&self, scene: SceneId) -> Result<SceneSnapshot, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.send_to_scene(scene, SceneMessage::QueryScene { reply })?;
        rx.await.map_err(|_| CoreError::SceneNotFound(scene))
    }

    /// Requests cooperative shutdown of one scene. The handle is retired
    /// by the next sweep (or [`SceneManager::retire_finished`]).
    pub fn destroy_scene(&self, id: SceneId) -> Result<(), CoreError> {
        let handle = self
            .inner
            .scenes
            .get(&id)
            .ok_or(CoreError::SceneNotFound(id))?;
        handle.shutdown();
        Ok(())
    }

    /// Whether a scene id is still registered (any state).
    pub fn contains(&self, id: SceneId) -> bool {
        self.inner.scenes.contains_key(&id)
    }

    /// Number of registered scenes.
    pub fn scene_count(&self) -> usize {
        self.inner.scenes.len()
    }

    /// Spawns the periodic cleanup sweep. Idempotent.
    pub fn start_cleanup_sweep(&self) {
        if self.inner.sweeping.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = self.inner.clone();
        let interval = inner.config.manager.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + interval,
                interval,
            );
            while inner.sweeping.load(Ordering::Acquire) {
                ticker.tick().await;
                inner.sweep();
            }
        });
        info!(
            "🧹 Cleanup sweep armed: every {:?}, empty timeout {:?}",
            self.inner.config.manager.cleanup_interval,
            self.inner.config.manager.empty_scene_timeout
        );
    }

    /// Runs one sweep immediately. Exposed for tests and admin triggers.
    pub fn sweep_now(&self) {
        self.inner.sweep();
    }

    /// Retires handles of destroyed and failed scenes without waiting for
    /// the next timed sweep.
    pub fn retire_finished(&self) {
        self.inner.retire_finished();
    }

    /// Requests shutdown of every scene and stops the sweep and the
    /// timer wheel. Actors finish their teardown asynchronously.
    pub fn shutdown_all(&self) {
        info!("🌍 Shutting down all {} scenes", self.inner.scenes.len());
        self.inner.sweeping.store(false, Ordering::Release);
        for entry in self.inner.scenes.iter() {
            entry.value().shutdown();
        }
        self.inner.timer.shutdown();
    }

    /// Snapshot of manager-level counters.
    pub fn stats(&self) -> ManagerStats {
        let mut scenes_by_kind: HashMap<SceneKind, usize> = HashMap::new();
        let mut total_entities = 0;
        for entry in self.inner.scenes.iter() {
            *scenes_by_kind.entry(entry.value().kind()).or_default() += 1;
            total_entities += entry.value().entity_count();
        }
        ManagerStats {
            scene_count: self.inner.scenes.len(),
            scenes_by_kind,
            total_entities,
            slot_loads: self
                .inner
                .slot_loads
                .iter()
                .map(|l| l.load(Ordering::Acquire))
                .collect(),
        }
    }
}

impl ManagerInner {
    /// Claims one slot under `max_scenes`, or rejects. Compare-and-swap so
    /// two concurrent creations at the limit cannot both pass.
    fn reserve_scene_slot(&self) -> Result<(), CoreError> {
        let max = self.config.manager.max_scenes;
        let mut count = self.live_scenes.load(Ordering::Acquire);
        loop {
            if count >= max {
                return Err(CoreError::SceneLimitReached(max));
            }
            match self.live_scenes.compare_exchange_weak(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => count = actual,
            }
        }
    }

    fn pick_slot(&self) -> usize {
        match self.config.manager.strategy {
            LoadBalanceStrategy::LeastLoaded => self
                .slot_loads
                .iter()
                .enumerate()
                .min_by_key(|(_, load)| load.load(Ordering::Acquire))
                .map(|(idx, _)| idx)
                .unwrap_or(0),
            LoadBalanceStrategy::RoundRobin => {
                self.round_robin.fetch_add(1, Ordering::Relaxed) % self.slot_loads.len()
            }
        }
    }

    /// One garbage-collection pass: retire finished scenes, then request
    /// shutdown of scenes empty beyond their timeout.
    fn sweep(&self) {
        self.retire_finished();

        for entry in self.scenes.iter() {
            let handle = entry.value();
            if handle.state() != SceneState::Running || handle.is_shutting_down() {
                continue;
            }
            let timeout = match handle.empty_timeout {
                EmptyTimeout::Never => continue,
                EmptyTimeout::Inherit => self.config.manager.empty_scene_timeout,
                EmptyTimeout::After(d) => d,
            };
            match handle.occupancy.empty_for() {
                Some(empty_for) if empty_for >= timeout => {
                    info!(
                        "🧹 {}: empty for {empty_for:?} (timeout {timeout:?}), destroying",
                        handle.id()
                    );
                    handle.shutdown();
                }
                _ => {}
            }
        }
    }

    fn retire_finished(&self) {
        let finished: Vec<SceneId> = self
            .scenes
            .iter()
            .filter(|entry| {
                matches!(
                    entry.value().state(),
                    SceneState::Destroyed | SceneState::Failed
                )
            })
            .map(|entry| entry.value().id())
            .collect();
        for id in finished {
            if let Some((_, handle)) = self.scenes.remove(&id) {
                self.slot_loads[handle.slot].fetch_sub(1, Ordering::AcqRel);
                self.live_scenes.fetch_sub(1, Ordering::AcqRel);
                if handle.state() == SceneState::Failed {
                    warn!("🧹 Retired failed scene {id}");
                } else {
                    debug!("🧹 Retired destroyed scene {id}");
                }
            }
        }
    }
}
