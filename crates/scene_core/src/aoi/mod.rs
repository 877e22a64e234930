//! # Area-of-Interest Engine
//!
//! Per-scene spatial index answering "who can see whom". The scene's
//! coordinate plane is partitioned into uniform square cells; candidates
//! come from the 3×3 block of cells around an entity ("nine-grid") and a
//! secondary Euclidean filter trims corner false positives so results are
//! radius-accurate, not just cell-accurate.
//!
//! The engine is a plain data structure with no interior locking: it is
//! exclusively owned by one scene actor, which serializes all access
//! through its mailbox.

mod grid;

pub use grid::{AoiDelta, AoiGrid, AoiStats};
