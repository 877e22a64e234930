//! Subscriber cursors and the per-subscription consumer task.

use super::ring::{BusEvent, BusInner};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type Handler = Box<dyn Fn(BusEvent) + Send + Sync>;

/// Per-subscriber state shared between the consumer task, the handle and
/// the publisher gating logic.
pub(super) struct SubscriberState {
    pub(super) id: u64,
    event_type: Arc<str>,
    /// Next sequence this subscriber will consume
    cursor: AtomicU64,
    /// Sequence the subscription started at
    start: u64,
    closed: AtomicBool,
    delivered: AtomicU64,
    handler: Handler,
}

impl SubscriberState {
    pub(super) fn new(id: u64, event_type: &str, start: u64, handler: Handler) -> Self {
        Self {
            id,
            event_type: Arc::from(event_type),
            cursor: AtomicU64::new(start),
            start,
            closed: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            handler,
        }
    }

    pub(super) fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    fn matches(&self, event_type: &str) -> bool {
        &*self.event_type == "*" || &*self.event_type == event_type
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Handle to one bus subscription.
///
/// Dropping the handle keeps the subscription alive; call
/// [`SubscriptionHandle::unsubscribe`] to detach. A detached subscriber's
/// cursor no longer gates publishers.
pub struct SubscriptionHandle {
    state: Arc<SubscriberState>,
    inner: Arc<BusInner>,
}

impl SubscriptionHandle {
    pub(super) fn new(state: Arc<SubscriberState>, inner: Arc<BusInner>) -> Self {
        Self { state, inner }
    }

    /// The bus-assigned subscription id, for logging.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Number of events the cursor has moved past, matching or not.
    pub fn consumed(&self) -> u64 {
        self.state.cursor() - self.state.start
    }

    /// Number of events actually delivered to the handler.
    pub fn delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::Relaxed)
    }

    /// Detaches the subscription: the consumer task exits and the cursor
    /// stops gating publishers.
    pub fn unsubscribe(self) {
        self.state.closed.store(true, Ordering::Release);
        self.inner.remove_subscriber(self.state.id);
    }
}

/// Consumer loop for one subscription.
///
/// Reads slots in sequence order; the cursor is advanced *before* the
/// handler runs, so a published event is never delivered ahead of the
/// cursor update and a lagging handler only delays its own stream.
pub(super) async fn run_consumer(inner: Arc<BusInner>, state: Arc<SubscriberState>) {
    loop {
        if state.is_closed() {
            break;
        }
        let expected = state.cursor.load(Ordering::Acquire);

        // Register for wakeups before checking the slot so a publish
        // landing between check and await cannot be missed.
        let notified = inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        match inner.read_slot(expected) {
            Some(event) => {
                state.cursor.store(expected + 1, Ordering::Release);
                if state.matches(&event.event_type) {
                    state.delivered.fetch_add(1, Ordering::Relaxed);
                    (state.handler)(event);
                }
            }
            None => notified.await,
        }
    }
    debug!("🚌 Consumer task for subscriber {} finished", state.id);
}
