//! Configuration management for the Meridian scene server.
//!
//! Handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use scene_core::{CoreConfig, LoadBalanceStrategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

fn default_max_scenes() -> usize {
    100
}

fn default_worker_slots() -> usize {
    num_cpus::get()
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_empty_scene_timeout_secs() -> u64 {
    600
}

fn default_timer_tick_ms() -> u64 {
    100
}

fn default_wheel_size() -> usize {
    512
}

fn default_ring_size() -> usize {
    1024
}

fn default_spin_limit() -> u32 {
    64
}

fn default_strategy() -> String {
    "least-loaded".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_demo_fields() -> usize {
    2
}

fn default_demo_dungeons() -> usize {
    1
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Simulation core settings
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Demo scene settings
    #[serde(default)]
    pub demo: DemoSettings,
}

/// Settings for the scene manager, timer wheel and event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Maximum number of concurrent scenes
    #[serde(default = "default_max_scenes")]
    pub max_scenes: usize,
    /// Logical worker slots scenes are balanced over
    #[serde(default = "default_worker_slots")]
    pub worker_slots: usize,
    /// Scene placement strategy: "least-loaded" or "round-robin"
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Seconds between cleanup sweeps
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Seconds an instanced scene may stay empty before destruction
    #[serde(default = "default_empty_scene_timeout_secs")]
    pub empty_scene_timeout_secs: u64,
    /// Timer wheel resolution in milliseconds
    #[serde(default = "default_timer_tick_ms")]
    pub timer_tick_ms: u64,
    /// Timer wheel bucket count (power of two)
    #[serde(default = "default_wheel_size")]
    pub wheel_size: usize,
    /// Event bus ring capacity (power of two)
    #[serde(default = "default_ring_size")]
    pub event_ring_size: usize,
    /// Publish attempts before reporting backpressure
    #[serde(default = "default_spin_limit")]
    pub publish_spin_limit: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            max_scenes: default_max_scenes(),
            worker_slots: default_worker_slots(),
            strategy: default_strategy(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            empty_scene_timeout_secs: default_empty_scene_timeout_secs(),
            timer_tick_ms: default_timer_tick_ms(),
            wheel_size: default_wheel_size(),
            event_ring_size: default_ring_size(),
            publish_spin_limit: default_spin_limit(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to emit JSON-formatted logs
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

/// Demo scene wiring spawned at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSettings {
    /// Whether to spawn demo scenes at all
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Field scenes to spawn
    #[serde(default = "default_demo_fields")]
    pub fields: usize,
    /// Dungeon instances to spawn
    #[serde(default = "default_demo_dungeons")]
    pub dungeons: usize,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            enabled: None,
            fields: default_demo_fields(),
            dungeons: default_demo_dungeons(),
        }
    }
}

impl DemoSettings {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

impl AppConfig {
    /// Loads configuration from the given path, writing out a default
    /// file when none exists yet.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }
        self.parse_strategy()?;
        // Structural checks (power-of-two sizes, non-zero counts) live in
        // the core; run them here so bad files fail before startup.
        self.to_core_config()?
            .validate()
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn parse_strategy(&self) -> Result<LoadBalanceStrategy, String> {
        match self.simulation.strategy.as_str() {
            "least-loaded" => Ok(LoadBalanceStrategy::LeastLoaded),
            "round-robin" => Ok(LoadBalanceStrategy::RoundRobin),
            other => Err(format!(
                "Invalid strategy: {other}. Must be \"least-loaded\" or \"round-robin\""
            )),
        }
    }

    /// Converts the TOML-based settings into the core's configuration
    /// types.
    pub fn to_core_config(&self) -> Result<CoreConfig, String> {
        let mut core = CoreConfig::default();
        core.manager.max_scenes = self.simulation.max_scenes;
        core.manager.worker_slots = self.simulation.worker_slots;
        core.manager.strategy = self.parse_strategy()?;
        core.manager.cleanup_interval = Duration::from_secs(self.simulation.cleanup_interval_secs);
        core.manager.empty_scene_timeout =
            Duration::from_secs(self.simulation.empty_scene_timeout_secs);
        core.timer.tick_duration = Duration::from_millis(self.simulation.timer_tick_ms);
        core.timer.wheel_size = self.simulation.wheel_size;
        core.bus.ring_size = self.simulation.event_ring_size;
        core.bus.publish_spin_limit = self.simulation.publish_spin_limit;
        Ok(core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let core = config.to_core_config().unwrap();
        assert_eq!(core.manager.max_scenes, 100);
        assert_eq!(core.timer.wheel_size, 512);
        assert_eq!(core.bus.ring_size, 1024);
    }

    #[test]
    fn rejects_unknown_strategy() {
        let mut config = AppConfig::default();
        config.simulation.strategy = "random".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_power_of_two_wheel() {
        let mut config = AppConfig::default();
        config.simulation.wheel_size = 500;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn partial_toml_fills_in_defaults() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), "[simulation]\nmax_scenes = 7\n")
            .await
            .unwrap();

        let config = AppConfig::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.simulation.max_scenes, 7);
        assert_eq!(config.simulation.wheel_size, 512);
        assert_eq!(config.logging.level, "info");
    }

    #[tokio::test]
    async fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meridian.toml");
        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());
        assert!(config.validate().is_ok());
    }
}
