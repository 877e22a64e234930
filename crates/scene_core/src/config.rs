//! Configuration types and defaults for the scene core.
//!
//! All tunables are explicit structs passed to constructors rather than
//! process-wide globals, so per-scene behavior stays deterministic and
//! testable in isolation. Every struct validates at construction time;
//! invalid thresholds fail fast with [`CoreError::InvalidConfig`].

use crate::error::CoreError;
use crate::types::SceneKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the scene core.
///
/// Bundles the per-subsystem configuration structs. The [`Default`] values
/// suit a mid-sized world (hundreds of scenes, thousands of entities per
/// scene) and match the tick rates the server was tuned for in production.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    /// Scene manager limits and sweep cadence
    pub manager: ManagerConfig,
    /// Timer wheel resolution and bucket count
    pub timer: TimerWheelConfig,
    /// Event bus ring sizing
    pub bus: EventBusConfig,
}

impl CoreConfig {
    /// Validates every subsystem config, failing fast on the first error.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.manager.validate()?;
        self.timer.validate()?;
        self.bus.validate()?;
        Ok(())
    }
}

/// Load-balancing policy used when binding a new scene to a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalanceStrategy {
    /// Pick the slot currently hosting the fewest scenes (default)
    LeastLoaded,
    /// Rotate through slots regardless of load
    RoundRobin,
}

impl Default for LoadBalanceStrategy {
    fn default() -> Self {
        Self::LeastLoaded
    }
}

/// Scene manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of live scenes; creation beyond this is rejected
    pub max_scenes: usize,
    /// Number of logical worker slots scenes are balanced across
    pub worker_slots: usize,
    /// Policy used to pick a worker slot for a new scene
    pub strategy: LoadBalanceStrategy,
    /// How often the cleanup sweep looks for empty scenes
    pub cleanup_interval: Duration,
    /// How long a scene may stay empty before the sweep destroys it;
    /// individual scenes override this via [`SceneConfig::empty_timeout`]
    pub empty_scene_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_scenes: 100,
            worker_slots: 4,
            strategy: LoadBalanceStrategy::default(),
            cleanup_interval: Duration::from_secs(5 * 60),
            empty_scene_timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl ManagerConfig {
    /// Checks limits and intervals, failing fast on non-positive values.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_scenes == 0 {
            return Err(CoreError::InvalidConfig("max_scenes must be > 0".into()));
        }
        if self.worker_slots == 0 {
            return Err(CoreError::InvalidConfig("worker_slots must be > 0".into()));
        }
        if self.cleanup_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "cleanup_interval must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Emptiness-collection policy for one scene.
///
/// The cleanup sweep destroys any running scene that has stayed empty
/// beyond its timeout; this chooses where that timeout comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum EmptyTimeout {
    /// Use the manager's `empty_scene_timeout` (default)
    #[default]
    Inherit,
    /// Exempt the scene from emptiness collection
    Never,
    /// Destroy after the scene has been empty this long
    After(Duration),
}

/// Per-scene configuration, chosen by the manager from the scene kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Maximum entities the scene will admit
    pub max_entities: usize,
    /// Mailbox capacity; sends beyond this are rejected with MailboxFull
    pub mailbox_size: usize,
    /// Messages drained per actor loop iteration
    pub batch_size: usize,
    /// Actor tick interval
    pub tick_interval: Duration,
    /// Optional hard time limit after which the scene destroys itself
    pub time_limit: Option<Duration>,
    /// When the cleanup sweep may destroy the scene for sitting empty
    pub empty_timeout: EmptyTimeout,
    /// AOI tuning for this scene
    pub aoi: AoiConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            max_entities: 2000,
            mailbox_size: 1024,
            batch_size: 100,
            tick_interval: Duration::from_millis(100),
            time_limit: None,
            empty_timeout: EmptyTimeout::default(),
            aoi: AoiConfig::default(),
        }
    }
}

impl SceneConfig {
    /// Default configuration for a scene kind.
    ///
    /// Instanced kinds get smaller entity caps and, for timed content, a
    /// hard time limit; the shared hub kinds get larger caps and no limit.
    /// The main city additionally opts out of emptiness collection so the
    /// hub stays up through quiet hours.
    pub fn for_kind(kind: SceneKind) -> Self {
        let base = Self::default();
        match kind {
            SceneKind::MainCity => Self {
                max_entities: 5000,
                empty_timeout: EmptyTimeout::Never,
                ..base
            },
            SceneKind::Field => Self {
                max_entities: 3000,
                ..base
            },
            SceneKind::Dungeon => Self {
                max_entities: 100,
                time_limit: Some(Duration::from_secs(30 * 60)),
                ..base
            },
            SceneKind::Battlefield => Self {
                max_entities: 500,
                time_limit: Some(Duration::from_secs(20 * 60)),
                ..base
            },
            SceneKind::Arena => Self {
                max_entities: 20,
                time_limit: Some(Duration::from_secs(10 * 60)),
                ..base
            },
            SceneKind::Instance => Self {
                max_entities: 200,
                ..base
            },
        }
    }

    /// Checks sizes and intervals, failing fast on non-positive values.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_entities == 0 {
            return Err(CoreError::InvalidConfig("max_entities must be > 0".into()));
        }
        if self.mailbox_size == 0 {
            return Err(CoreError::InvalidConfig("mailbox_size must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(CoreError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(CoreError::InvalidConfig(
                "tick_interval must be > 0".into(),
            ));
        }
        self.aoi.validate()
    }
}

/// AOI engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AoiConfig {
    /// Side length of one grid cell
    pub grid_size: f64,
    /// Visibility radius; must not exceed `grid_size * 1.5` or the
    /// nine-grid scan would miss candidates
    pub view_distance: f64,
    /// How often coalesced moves are evaluated by the actor
    pub update_interval: Duration,
}

impl Default for AoiConfig {
    fn default() -> Self {
        Self {
            grid_size: 100.0,
            view_distance: 150.0,
            update_interval: Duration::from_millis(200),
        }
    }
}

impl AoiConfig {
    /// Checks distances for positivity and the nine-grid coverage bound.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.grid_size <= 0.0 {
            return Err(CoreError::InvalidConfig("grid_size must be > 0".into()));
        }
        if self.view_distance <= 0.0 {
            return Err(CoreError::InvalidConfig(
                "view_distance must be > 0".into(),
            ));
        }
        // Nine-grid covers at most 1.5 cells from the center cell's middle;
        // a larger radius would need a wider scan than 3x3.
        if self.view_distance > self.grid_size * 1.5 {
            return Err(CoreError::InvalidConfig(format!(
                "view_distance {} exceeds nine-grid coverage for grid_size {}",
                self.view_distance, self.grid_size
            )));
        }
        Ok(())
    }
}

/// Timer wheel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerWheelConfig {
    /// Duration of one wheel tick (timer resolution)
    pub tick_duration: Duration,
    /// Number of buckets in the ring; must be a power of two
    pub wheel_size: usize,
}

impl Default for TimerWheelConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(100),
            wheel_size: 512,
        }
    }
}

impl TimerWheelConfig {
    /// Checks the resolution and the power-of-two bucket-count invariant.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.tick_duration.is_zero() {
            return Err(CoreError::InvalidConfig(
                "timer tick_duration must be > 0".into(),
            ));
        }
        if self.wheel_size == 0 || !self.wheel_size.is_power_of_two() {
            return Err(CoreError::InvalidConfig(
                "wheel_size must be a power of two".into(),
            ));
        }
        Ok(())
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Number of reusable slots in the ring; must be a power of two
    pub ring_size: usize,
    /// How many times a gated publish spins before giving up with
    /// a backpressure rejection
    pub publish_spin_limit: u32,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            ring_size: 1024,
            publish_spin_limit: 64,
        }
    }
}

impl EventBusConfig {
    /// Checks the power-of-two ring-size invariant.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.ring_size == 0 || !self.ring_size.is_power_of_two() {
            return Err(CoreError::InvalidConfig(
                "ring_size must be a power of two".into(),
            ));
        }
        Ok(())
    }
}
