//! Error types and handling for the scene core.
//!
//! Errors fall into the three buckets the core distinguishes: capacity
//! rejections (reported synchronously to the caller so it can apply
//! backpressure), configuration errors (fail fast at construction), and
//! callback failures (contained inside the owning actor and only visible
//! through logs).

use crate::types::SceneId;

/// Errors surfaced by the scene core to its callers.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The target scene's mailbox is at capacity; the message was not
    /// enqueued and the caller may retry, queue, or drop.
    #[error("mailbox full for {0}")]
    MailboxFull(SceneId),

    /// No live scene with the given id is registered.
    #[error("scene {0} not found")]
    SceneNotFound(SceneId),

    /// Scene creation was rejected because the configured `max_scenes`
    /// population is already reached.
    #[error("scene limit reached ({0} scenes)")]
    SceneLimitReached(usize),

    /// The event bus could not claim a slot without overwriting one the
    /// slowest subscriber has not consumed yet.
    #[error("event bus backpressure: ring is full")]
    Backpressure,

    /// A configuration value failed validation at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// Whether this error is a transient capacity rejection that the
    /// caller may reasonably retry.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            CoreError::MailboxFull(_) | CoreError::SceneLimitReached(_) | CoreError::Backpressure
        )
    }
}
