//! External handle to a running scene actor.

use super::message::SceneMessage;
use crate::config::EmptyTimeout;
use crate::error::CoreError;
use crate::types::{SceneId, SceneKind, SceneState};
use crossbeam::atomic::AtomicCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
// tokio's Instant so paused-clock tests can drive the emptiness timeout.
use tokio::time::Instant;
use tokio::sync::Notify;

/// Shared shutdown signal: a flag plus a wakeup, so shutdown can never be
/// rejected by a full mailbox.
#[derive(Debug, Default)]
pub(super) struct ShutdownSignal {
    pub(super) requested: AtomicBool,
    pub(super) notify: Notify,
}

impl ShutdownSignal {
    pub(super) fn trigger(&self) {
        self.requested.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(super) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Occupancy the actor maintains and the manager's cleanup sweep reads.
#[derive(Debug)]
pub(crate) struct Occupancy {
    pub(crate) entity_count: AtomicUsize,
    /// `Some(when)` while the scene holds no entities
    pub(crate) empty_since: Mutex<Option<Instant>>,
}

impl Occupancy {
    pub(crate) fn new() -> Self {
        Self {
            entity_count: AtomicUsize::new(0),
            // A fresh scene is empty until its first entity enters.
            empty_since: Mutex::new(Some(Instant::now())),
        }
    }

    pub(super) fn set_count(&self, count: usize) {
        self.entity_count.store(count, Ordering::Release);
        let mut empty_since = self.empty_since.lock().unwrap_or_else(|e| e.into_inner());
        if count == 0 {
            if empty_since.is_none() {
                *empty_since = Some(Instant::now());
            }
        } else {
            *empty_since = None;
        }
    }

    pub(crate) fn empty_for(&self) -> Option<std::time::Duration> {
        self.empty_since
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|since| since.elapsed())
    }
}

/// Routing handle to one scene: the only way external code reaches a
/// scene's state.
///
/// [`SceneHandle::send`] is the single synchronous operation the core
/// exposes per scene; everything else is an asynchronous outcome of the
/// actor's own loop.
#[derive(Clone)]
pub struct SceneHandle {
    pub(crate) id: SceneId,
    pub(crate) kind: SceneKind,
    pub(crate) name: String,
    pub(crate) tx: mpsc::Sender<SceneMessage>,
    pub(crate) state: Arc<AtomicCell<SceneState>>,
    pub(super) shutdown: Arc<ShutdownSignal>,
    pub(crate) occupancy: Arc<Occupancy>,
    /// Emptiness-collection policy the manager sweep applies
    pub(crate) empty_timeout: EmptyTimeout,
    /// Worker slot the scene is bound to, released by the manager sweep
    pub(crate) slot: usize,
}

impl SceneHandle {
    /// The scene's id.
    pub fn id(&self) -> SceneId {
        self.id
    }

    /// The scene's kind.
    pub fn kind(&self) -> SceneKind {
        self.kind
    }

    /// The scene's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state, as last published by the actor.
    pub fn state(&self) -> SceneState {
        self.state.load()
    }

    /// Entities currently in the scene.
    pub fn entity_count(&self) -> usize {
        self.occupancy.entity_count.load(Ordering::Acquire)
    }

    /// Enqueues a message for the actor.
    ///
    /// Fails with [`CoreError::MailboxFull`] when the bounded mailbox is
    /// at capacity (the caller applies backpressure or its own drop
    /// policy) and with [`CoreError::SceneNotFound`] once the actor has
    /// stopped receiving.
    pub fn send(&self, message: SceneMessage) -> Result<(), CoreError> {
        use mpsc::error::TrySendError;
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(CoreError::MailboxFull(self.id)),
            Err(TrySendError::Closed(_)) => Err(CoreError::SceneNotFound(self.id)),
        }
    }

    /// Requests cooperative shutdown: the actor drains its mailbox, runs
    /// `on_destroy` once, cancels the scene's timers and exits.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_requested()
    }
}

impl std::fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("state", &self.state.load())
            .field("entities", &self.entity_count())
            .finish()
    }
}
