//! Timer task entries and cancellation handles.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Callback invoked when a timer fires. Runs on the wheel's worker task,
/// outside any bucket lock; it must not block.
pub(crate) type TimerCallback = Box<dyn Fn() + Send>;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle to one scheduled timer task.
///
/// Cloneable and cheap; holds only the shared task state. Dropping the
/// handle does not cancel the task.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    /// PENDING until exactly one of `cancel` / the fire sweep claims it.
    /// A repeating task stays PENDING across fires so it can still be
    /// cancelled.
    state: Arc<AtomicU8>,
}

impl TimerHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// The wheel-assigned task id, for logging.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancels the task, returning `true` if it was still pending.
    ///
    /// Cancellation and the fire sweep compete for the same pending state
    /// with a compare-and-swap, so exactly one wins: a cancel that
    /// returns `true` guarantees the callback never runs, even when the
    /// wheel is concurrently advancing into the task's bucket. For a
    /// repeating task, "pending" means it had not been cancelled before.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Whether the task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCELLED
    }

    /// Whether a one-shot task has already fired. Repeating tasks never
    /// report fired.
    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }

    /// Claims the pending state for the fire sweep. Loses to a concurrent
    /// `cancel` that got there first.
    pub(crate) fn claim_fire(&self) -> bool {
        self.state
            .compare_exchange(PENDING, FIRED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// One task resident in a wheel bucket (or the pending queue).
pub(crate) struct TimerEntry {
    /// Absolute wheel tick at which the task is due
    pub deadline_tick: u64,
    /// Revolutions left before the task is due when its bucket is swept
    pub rounds: u64,
    /// Re-fire period in wheel ticks, for repeating tasks
    pub period_ticks: Option<u64>,
    /// Shared handle flags; checked at fire time
    pub handle: TimerHandle,
    pub callback: TimerCallback,
}

impl TimerEntry {
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }
}

impl std::fmt::Debug for TimerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEntry")
            .field("id", &self.handle.id())
            .field("deadline_tick", &self.deadline_tick)
            .field("rounds", &self.rounds)
            .field("repeating", &self.period_ticks.is_some())
            .finish()
    }
}
