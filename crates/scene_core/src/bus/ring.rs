//! The slot ring and publish path.

use super::subscriber::{SubscriberState, SubscriptionHandle};
use crate::config::EventBusConfig;
use crate::error::CoreError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, info};

/// One event as seen by subscribers.
///
/// Cheap to clone: the event type is a shared string and the payload a
/// shared JSON document.
#[derive(Debug, Clone)]
pub struct BusEvent {
    /// Position of this event in the global stream
    pub sequence: u64,
    /// Publisher-chosen event type, used for subscription filtering
    pub event_type: Arc<str>,
    /// Publisher-owned payload; the bus does not interpret it
    pub payload: Arc<serde_json::Value>,
    /// When `publish` wrote the slot
    pub published_at: Instant,
}

impl BusEvent {
    /// Time this event spent in the ring before the subscriber saw it.
    pub fn queueing_latency(&self) -> std::time::Duration {
        self.published_at.elapsed()
    }
}

/// Counters exposed for monitoring the bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusStats {
    /// Events published so far (equals the next sequence to claim)
    pub published: u64,
    /// Live subscribers
    pub subscribers: usize,
    /// Cursor of the slowest live subscriber, if any
    pub slowest_cursor: Option<u64>,
}

/// In-process publish/subscribe bus over a reusable slot ring.
///
/// The ring is allocated once; slots are overwritten, never freed, so the
/// steady state performs no per-event allocation beyond the payload the
/// publisher already built. Multiple producers contend only on one
/// compare-and-swap of the sequence counter plus the single slot lock
/// they claimed.
///
/// Cloning shares the same ring.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

pub(super) struct BusInner {
    config: EventBusConfig,
    mask: u64,
    /// Reusable slots; `None` until first written
    slots: Vec<Mutex<Option<BusEvent>>>,
    /// Next sequence to claim
    next_seq: AtomicU64,
    /// Live subscriber cursors, keyed by subscription id
    pub(super) subscribers: DashMap<u64, Arc<SubscriberState>>,
    next_sub_id: AtomicU64,
    /// Wakes subscriber tasks after a publish
    pub(super) notify: Notify,
}

impl EventBus {
    /// Creates a bus from the given configuration, pre-allocating the
    /// slot ring. Fails fast on a non-power-of-two ring size.
    pub fn new(config: EventBusConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let slots = (0..config.ring_size).map(|_| Mutex::new(None)).collect();
        let mask = config.ring_size as u64 - 1;
        info!("🚌 Event bus created: {} slots", config.ring_size);
        Ok(Self {
            inner: Arc::new(BusInner {
                config,
                mask,
                slots,
                next_seq: AtomicU64::new(0),
                subscribers: DashMap::new(),
                next_sub_id: AtomicU64::new(1),
                notify: Notify::new(),
            }),
        })
    }

    /// Publishes one event, returning its sequence number.
    ///
    /// If the slot about to be claimed still holds an event the slowest
    /// live subscriber has not consumed, the call spins up to the
    /// configured limit waiting for that cursor to advance and then
    /// returns [`CoreError::Backpressure`]. The caller decides whether to
    /// retry, queue, or shed load; the bus never overwrites undelivered
    /// events.
    pub fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<u64, CoreError> {
        let inner = &self.inner;
        let ring = inner.config.ring_size as u64;
        let mut spins = 0u32;
        let seq = loop {
            let seq = inner.next_seq.load(Ordering::Acquire);
            if let Some(min) = inner.min_cursor() {
                if seq >= min + ring {
                    spins += 1;
                    if spins > inner.config.publish_spin_limit {
                        debug!("🚌 Publish rejected at seq {seq}: slowest cursor at {min}");
                        return Err(CoreError::Backpressure);
                    }
                    std::hint::spin_loop();
                    std::thread::yield_now();
                    continue;
                }
            }
            if inner
                .next_seq
                .compare_exchange(seq, seq + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break seq;
            }
        };

        let event = BusEvent {
            sequence: seq,
            event_type: Arc::from(event_type),
            payload: Arc::new(payload),
            published_at: Instant::now(),
        };
        let idx = (seq & inner.mask) as usize;
        *inner.slots[idx].lock().unwrap_or_else(|e| e.into_inner()) = Some(event);
        inner.notify.notify_waiters();
        Ok(seq)
    }

    /// Registers a subscriber for events whose type equals `event_type`
    /// (`"*"` matches everything) and spawns its consumer task.
    ///
    /// The new subscriber starts at the current head of the stream; it
    /// does not replay events published before subscription. Its cursor
    /// immediately participates in publisher gating, and is always
    /// advanced *before* the handler runs.
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> SubscriptionHandle
    where
        F: Fn(BusEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let start = self.inner.next_seq.load(Ordering::Acquire);
        let state = Arc::new(SubscriberState::new(id, event_type, start, Box::new(handler)));
        self.inner.subscribers.insert(id, state.clone());
        debug!("🚌 Subscriber {id} registered for '{event_type}' from seq {start}");

        let inner = self.inner.clone();
        tokio::spawn(super::subscriber::run_consumer(inner, state.clone()));
        SubscriptionHandle::new(state, self.inner.clone())
    }

    /// Sequence number the next publish will claim.
    pub fn head_sequence(&self) -> u64 {
        self.inner.next_seq.load(Ordering::Acquire)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Snapshot of the bus counters.
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.head_sequence(),
            subscribers: self.subscriber_count(),
            slowest_cursor: self.inner.min_cursor(),
        }
    }
}

impl BusInner {
    /// Cursor of the slowest live subscriber, `None` when nobody is
    /// subscribed (publishers are then unconstrained).
    fn min_cursor(&self) -> Option<u64> {
        self.subscribers
            .iter()
            .map(|entry| entry.value().cursor())
            .min()
    }

    pub(super) fn read_slot(&self, seq: u64) -> Option<BusEvent> {
        let idx = (seq & self.mask) as usize;
        let slot = self.slots[idx].lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(ev) if ev.sequence == seq => Some(ev.clone()),
            _ => None,
        }
    }

    pub(super) fn remove_subscriber(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            debug!("🚌 Subscriber {id} removed");
            // Wake the consumer task so it observes the closed flag, and
            // any gated publisher logic re-reads the cursor set.
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn small_bus() -> EventBus {
        EventBus::new(EventBusConfig {
            ring_size: 8,
            publish_spin_limit: 4,
        })
        .expect("valid config")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delivers_matching_events_in_order() {
        let bus = small_bus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = bus.subscribe("entity_entered", move |ev| {
            s.lock().unwrap().push(ev.sequence);
        });

        for _ in 0..5 {
            bus.publish("entity_entered", serde_json::json!({"id": 1})).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn type_filter_skips_but_advances() {
        let bus = small_bus();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let sub = bus.subscribe("wanted", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish("ignored", serde_json::json!(null)).unwrap();
        bus.publish("wanted", serde_json::json!(null)).unwrap();
        bus.publish("ignored", serde_json::json!(null)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Cursor moved past every event, matching or not.
        assert_eq!(sub.consumed(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn publish_without_subscribers_is_unconstrained() {
        let bus = small_bus();
        for i in 0..100u64 {
            assert_eq!(bus.publish("x", serde_json::json!(i)).unwrap(), i);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_subscriber_causes_backpressure_not_loss() {
        let bus = small_bus();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        // Handler stalls long enough for the ring (8 slots) to fill.
        let _sub = bus.subscribe("*", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
        });

        let mut accepted = 0usize;
        let mut rejected = 0usize;
        for i in 0..64 {
            match bus.publish("x", serde_json::json!(i)) {
                Ok(_) => accepted += 1,
                Err(CoreError::Backpressure) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(rejected > 0, "ring of 8 must gate 64 rapid publishes");

        // Every accepted event is eventually delivered; none lost.
        tokio::time::timeout(Duration::from_secs(10), async {
            while seen.load(Ordering::SeqCst) < accepted {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("all accepted events delivered");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unsubscribe_releases_the_gate() {
        let bus = small_bus();
        let sub = bus.subscribe("*", |_| {
            std::thread::sleep(Duration::from_millis(200));
        });
        // Saturate the ring against the stalled subscriber.
        let mut rejected = false;
        for i in 0..64 {
            if bus.publish("x", serde_json::json!(i)).is_err() {
                rejected = true;
                break;
            }
        }
        assert!(rejected);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
        for i in 0..32 {
            bus.publish("x", serde_json::json!(i)).expect("no gate without subscribers");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn records_publish_timestamp() {
        let bus = small_bus();
        let latency = Arc::new(Mutex::new(None));
        let l = latency.clone();
        let _sub = bus.subscribe("*", move |ev| {
            *l.lock().unwrap() = Some(ev.queueing_latency());
        });

        bus.publish("x", serde_json::json!(null)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(latency.lock().unwrap().is_some());
    }
}
