//! # Hashed Timer Wheel
//!
//! O(1) scheduling and cancellation for large numbers of short-lived
//! timers (skill cooldowns, buff expirations, respawns). A fixed ring of
//! buckets is advanced one bucket per tick by a dedicated worker task;
//! tasks carry a rounds counter for delays beyond one full revolution.
//!
//! Cancellation is a flag checked at fire time, so a cancel that races the
//! sweep is always resolved in favor of not firing.

mod task;
mod wheel;

pub use task::TimerHandle;
pub use wheel::{TimerWheel, TimerWheelStats};
