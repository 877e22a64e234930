//! The hashed wheel itself and its advance worker.

use super::task::{TimerCallback, TimerEntry, TimerHandle};
use crate::config::TimerWheelConfig;
use crate::error::CoreError;
use crate::util::panic_message;
use crossbeam::queue::SegQueue;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Counters exposed for monitoring the wheel.
#[derive(Debug, Clone, Default)]
pub struct TimerWheelStats {
    /// Tasks accepted by `schedule` / `schedule_repeating`
    pub scheduled: u64,
    /// Callbacks actually executed
    pub fired: u64,
    /// Tasks discarded by the sweep because they were cancelled
    pub discarded: u64,
    /// Current wheel tick
    pub current_tick: u64,
}

/// Hashed timer wheel with O(1) schedule and cancel.
///
/// A power-of-two ring of buckets is advanced one bucket per
/// `tick_duration` by a worker task. A task lands in the bucket
/// `deadline & mask` with a rounds counter for deadlines more than one
/// revolution away; each sweep of that bucket decrements the counter and
/// fires the task when it reaches zero.
///
/// Scheduling from any task/thread goes through a lock-free pending queue
/// that the worker drains at the start of every advance, so producers
/// never contend with the sweep. Callbacks execute after the bucket lock
/// is released; a slow callback delays subsequent callbacks of the same
/// tick but never blocks concurrent scheduling.
///
/// Cloning shares the same wheel.
#[derive(Clone)]
pub struct TimerWheel {
    inner: Arc<Inner>,
}

struct Inner {
    config: TimerWheelConfig,
    mask: u64,
    buckets: Vec<Mutex<Vec<TimerEntry>>>,
    /// Entries scheduled but not yet transferred into a bucket
    pending: SegQueue<TimerEntry>,
    tick: AtomicU64,
    next_id: AtomicU64,
    running: AtomicBool,
    /// Set once by `shutdown`; submissions after this are refused
    stopped: AtomicBool,
    scheduled: AtomicU64,
    fired: AtomicU64,
    discarded: AtomicU64,
}

impl TimerWheel {
    /// Creates a wheel from the given configuration.
    ///
    /// Fails fast with [`CoreError::InvalidConfig`] if the resolution is
    /// zero or the bucket count is not a power of two. The wheel does not
    /// advance until [`TimerWheel::start`] is called.
    pub fn new(config: TimerWheelConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let buckets = (0..config.wheel_size).map(|_| Mutex::new(Vec::new())).collect();
        let mask = config.wheel_size as u64 - 1;
        info!(
            "⏱️ Timer wheel created: {} buckets, {:?} resolution",
            config.wheel_size, config.tick_duration
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                mask,
                buckets,
                pending: SegQueue::new(),
                tick: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                scheduled: AtomicU64::new(0),
                fired: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        })
    }

    /// Starts the advance worker. Idempotent.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.tick_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First interval tick completes immediately; skip it so tick 1
            // lands one full resolution after start.
            ticker.tick().await;
            while inner.running.load(Ordering::Acquire) {
                ticker.tick().await;
                inner.advance();
            }
            inner.drain_all();
            debug!("⏱️ Timer wheel worker exited");
        });
    }

    /// Stops the worker and discards all pending tasks. Later schedule
    /// calls are refused with an already-cancelled handle.
    pub fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        if self.inner.running.swap(false, Ordering::AcqRel) {
            info!("⏱️ Timer wheel shutting down");
        }
    }

    /// Schedules a one-shot callback after `delay`.
    ///
    /// Delays shorter than one wheel tick are rounded up to one tick.
    /// Returns a handle whose [`TimerHandle::cancel`] guarantees the
    /// callback never runs.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: Fn() + Send + 'static,
    {
        self.inner.submit(delay, None, Box::new(callback))
    }

    /// Schedules a repeating callback: first fire after `delay`, then
    /// every `period` until cancelled.
    pub fn schedule_repeating<F>(&self, delay: Duration, period: Duration, callback: F) -> TimerHandle
    where
        F: Fn() + Send + 'static,
    {
        let period_ticks = self.inner.ticks_for(period);
        self.inner.submit(delay, Some(period_ticks), Box::new(callback))
    }

    /// The number of wheel advances since start.
    pub fn current_tick(&self) -> u64 {
        self.inner.tick.load(Ordering::Acquire)
    }

    /// Snapshot of the wheel counters.
    pub fn stats(&self) -> TimerWheelStats {
        TimerWheelStats {
            scheduled: self.inner.scheduled.load(Ordering::Relaxed),
            fired: self.inner.fired.load(Ordering::Relaxed),
            discarded: self.inner.discarded.load(Ordering::Relaxed),
            current_tick: self.current_tick(),
        }
    }
}

impl Inner {
    fn ticks_for(&self, delay: Duration) -> u64 {
        let ticks = delay.as_nanos() / self.config.tick_duration.as_nanos().max(1);
        (ticks as u64).max(1)
    }

    fn submit(&self, delay: Duration, period_ticks: Option<u64>, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = TimerHandle::new(id);
        if self.stopped.load(Ordering::Acquire) {
            warn!("⏱️ Timer task {id} refused: wheel is shut down");
            handle.cancel();
            return handle;
        }
        let deadline_tick = self.tick.load(Ordering::Acquire) + self.ticks_for(delay);
        self.pending.push(TimerEntry {
            deadline_tick,
            rounds: 0,
            period_ticks,
            handle: handle.clone(),
            callback,
        });
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        handle
    }

    /// One wheel advance: transfer pending entries, sweep the current
    /// bucket, then run due callbacks outside the bucket lock.
    fn advance(&self) {
        let now = self.tick.fetch_add(1, Ordering::AcqRel) + 1;

        let mut due = Vec::new();
        while let Some(entry) = self.pending.pop() {
            self.place(entry, now, &mut due);
        }

        let bucket_idx = (now & self.mask) as usize;
        {
            let mut bucket = self.buckets[bucket_idx].lock().unwrap_or_else(|e| e.into_inner());
            if !bucket.is_empty() {
                let entries = std::mem::take(&mut *bucket);
                for mut entry in entries {
                    if entry.is_cancelled() {
                        self.discarded.fetch_add(1, Ordering::Relaxed);
                    } else if entry.rounds == 0 {
                        due.push(entry);
                    } else {
                        entry.rounds -= 1;
                        bucket.push(entry);
                    }
                }
            }
        }

        for entry in due {
            self.fire(entry, now);
        }
    }

    /// Inserts an entry into its bucket, or queues it as due when its
    /// deadline already passed.
    fn place(&self, mut entry: TimerEntry, now: u64, due: &mut Vec<TimerEntry>) {
        if entry.is_cancelled() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if entry.deadline_tick <= now {
            due.push(entry);
            return;
        }
        let remaining = entry.deadline_tick - now;
        entry.rounds = (remaining - 1) / self.buckets.len() as u64;
        let idx = (entry.deadline_tick & self.mask) as usize;
        self.buckets[idx].lock().unwrap_or_else(|e| e.into_inner()).push(entry);
    }

    /// Runs one due entry. The task state is claimed here, at fire time,
    /// so a cancel racing the sweep has exactly one winner.
    fn fire(&self, entry: TimerEntry, now: u64) {
        let live = match entry.period_ticks {
            None => entry.handle.claim_fire(),
            Some(_) => !entry.is_cancelled(),
        };
        if !live {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.fired.fetch_add(1, Ordering::Relaxed);
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (entry.callback)())) {
            error!(
                "💥 Timer task {} panicked: {}",
                entry.handle.id(),
                panic_message(&panic)
            );
        }
        if let Some(period) = entry.period_ticks {
            if !entry.is_cancelled() {
                let mut due = Vec::new();
                let reinserted = TimerEntry {
                    deadline_tick: now + period,
                    rounds: 0,
                    period_ticks: Some(period),
                    handle: entry.handle,
                    callback: entry.callback,
                };
                self.place(reinserted, now, &mut due);
                // period >= 1 tick, so the new deadline is always ahead
                debug_assert!(due.is_empty());
            }
        }
    }

    fn drain_all(&self) {
        while self.pending.pop().is_some() {}
        for bucket in &self.buckets {
            bucket.lock().unwrap_or_else(|e| e.into_inner()).clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn small_wheel() -> TimerWheel {
        TimerWheel::new(TimerWheelConfig {
            tick_duration: Duration::from_millis(10),
            wheel_size: 8,
        })
        .expect("valid config")
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_once() {
        let wheel = small_wheel();
        wheel.start();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = wheel.schedule(Duration::from_millis(30), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(handle.has_fired());
        assert!(!handle.cancel(), "firing consumed the task");
        wheel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn delay_beyond_one_revolution_uses_rounds() {
        // 8 buckets x 10ms = one revolution every 80ms; 250ms needs rounds.
        let wheel = small_wheel();
        wheel.start();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        wheel.schedule(Duration::from_millis(250), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "must not fire early");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        wheel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_fires() {
        let wheel = small_wheel();
        wheel.start();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = wheel.schedule(Duration::from_millis(50), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.cancel(), "task was pending");
        assert!(!handle.cancel(), "second cancel is a no-op");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(wheel.stats().fired, 0);
        wheel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_racing_the_sweep_wins() {
        // Cancel exactly on the tick boundary the task is due at; whichever
        // side wins the race, the callback must not run after cancel()
        // returned true.
        let wheel = small_wheel();
        wheel.start();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = wheel.schedule(Duration::from_millis(20), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(19)).await;
        let was_pending = handle.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;
        if was_pending {
            assert_eq!(count.load(Ordering::SeqCst), 0, "cancel won, callback must not run");
        }
        wheel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_fire_have_a_single_winner_per_task() {
        let wheel = small_wheel();
        wheel.start();
        let fired = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let f = fired.clone();
            handles.push(wheel.schedule(Duration::from_millis(20), move || {
                f.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // Cancel right at the due boundary; each task must end up either
        // cancelled or fired, never both and never neither.
        tokio::time::sleep(Duration::from_millis(19)).await;
        let cancelled = handles.iter().filter(|h| h.cancel()).count();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cancelled + fired.load(Ordering::SeqCst), 32);
        for handle in &handles {
            assert_ne!(handle.has_fired(), handle.is_cancelled());
        }
        wheel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_after_shutdown_is_refused() {
        let wheel = small_wheel();
        wheel.start();
        wheel.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = wheel.schedule(Duration::from_millis(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(handle.is_cancelled(), "handle comes back already cancelled");
        assert!(!handle.cancel());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(wheel.stats().scheduled, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_task_fires_until_cancelled() {
        let wheel = small_wheel();
        wheel.start();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = wheel.schedule_repeating(
            Duration::from_millis(20),
            Duration::from_millis(20),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(110)).await;
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 3, "expected several fires, saw {seen}");

        assert!(handle.cancel());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen, "no fires after cancel");
        wheel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_does_not_kill_the_wheel() {
        let wheel = small_wheel();
        wheel.start();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        wheel.schedule(Duration::from_millis(20), || panic!("boom"));
        wheel.schedule(Duration::from_millis(40), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "wheel survived the panic");
        wheel.shutdown();
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(TimerWheel::new(TimerWheelConfig {
            tick_duration: Duration::from_millis(0),
            wheel_size: 8,
        })
        .is_err());
        assert!(TimerWheel::new(TimerWheelConfig {
            tick_duration: Duration::from_millis(10),
            wheel_size: 7,
        })
        .is_err());
    }
}
