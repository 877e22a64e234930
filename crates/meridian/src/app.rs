//! Main application logic and lifecycle management.
//!
//! Wires the scene manager, the stock behaviors and the demo traffic
//! together, then waits for a shutdown signal.

use crate::{cli::CliArgs, config::AppConfig, logging::display_banner, signals::wait_for_shutdown};
use scene_behaviors::{DungeonBehavior, FieldBehavior, MainCityBehavior};
use scene_core::{ChannelSync, EntityId, Position, SceneKind, SceneManager, SceneMessage};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Orchestrates startup, demo wiring and graceful shutdown.
pub struct Application {
    config: AppConfig,
    manager: SceneManager,
}

impl Application {
    /// Loads configuration, applies CLI overrides and builds the scene
    /// manager. Outbound sync packets go to a drain task that logs them,
    /// standing in for a client transport.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if let Some(max_scenes) = args.max_scenes {
            config.simulation.max_scenes = max_scenes;
        }
        if args.no_demo {
            config.demo.enabled = Some(false);
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let (sink, mut packets) = ChannelSync::new();
        tokio::spawn(async move {
            let mut delivered: u64 = 0;
            while let Some((observer, packet)) = packets.recv().await {
                delivered += 1;
                debug!("📨 -> {observer}: {packet:?}");
                if delivered % 10_000 == 0 {
                    info!("📨 {delivered} sync packets delivered so far");
                }
            }
        });

        let core_config = config.to_core_config()?;
        let manager = SceneManager::new(core_config, Arc::new(sink))?;

        // Surface every bus event in the log. Dropping the handle keeps
        // the subscription alive for the process lifetime.
        drop(manager.bus().subscribe("*", |event| {
            debug!(
                "🚌 {} seq={} latency={:?}",
                event.event_type,
                event.sequence,
                event.queueing_latency()
            );
        }));

        info!(
            "🚀 Meridian v{} | scenes <= {} | slots {} | strategy {}",
            env!("CARGO_PKG_VERSION"),
            config.simulation.max_scenes,
            config.simulation.worker_slots,
            config.simulation.strategy
        );

        Ok(Self { config, manager })
    }

    /// Runs until a termination signal arrives, then drains every scene.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.manager.start_cleanup_sweep();

        if self.config.demo.is_enabled() {
            self.spawn_demo_scenes()?;
        }

        wait_for_shutdown().await?;

        let stats = self.manager.stats();
        let bus = self.manager.bus().stats();
        info!(
            "📊 Final: {} scenes, {} entities, slot loads {:?}, {} bus events",
            stats.scene_count, stats.total_entities, stats.slot_loads, bus.published
        );

        self.manager.shutdown_all();
        // Give actors a moment to finish their teardown callbacks.
        tokio::time::sleep(Duration::from_millis(500)).await;
        info!("👋 Shutdown complete");
        Ok(())
    }

    /// Spawns the demo world: one main city, open fields, a couple of
    /// dungeon runs, and a wanderer task that generates AOI traffic.
    fn spawn_demo_scenes(&self) -> Result<(), Box<dyn std::error::Error>> {
        let city = self.manager.create_scene(
            SceneKind::MainCity,
            "capital",
            Box::new(MainCityBehavior::new()),
        )?;

        for i in 0..self.config.demo.fields {
            self.manager.create_scene(
                SceneKind::Field,
                format!("field-{i}"),
                Box::new(FieldBehavior::new()),
            )?;
        }
        for i in 0..self.config.demo.dungeons {
            self.manager.create_scene(
                SceneKind::Dungeon,
                format!("dungeon-{i}"),
                Box::new(DungeonBehavior::new(3)),
            )?;
        }
        info!(
            "🌍 Demo world up: city + {} fields + {} dungeons",
            self.config.demo.fields, self.config.demo.dungeons
        );

        // A handful of wanderers walking circles around the city keeps
        // the AOI and sync paths visibly busy.
        let manager = self.manager.clone();
        tokio::spawn(async move {
            for i in 0..8u64 {
                let enter = SceneMessage::EnterEntity {
                    id: EntityId(i + 1),
                    position: Position::new((i * 40) as f64, 0.0, 0.0),
                    attributes: HashMap::from([("demo".to_string(), json!(true))]),
                };
                if let Err(e) = manager.send_to_scene(city, enter) {
                    warn!("🌍 demo enter failed: {e}");
                }
            }

            let mut ticker = tokio::time::interval(Duration::from_millis(500));
            let mut step: u64 = 0;
            loop {
                ticker.tick().await;
                step += 1;
                for i in 0..8u64 {
                    let angle = (step as f64 / 20.0) + (i as f64);
                    let target = Position::new(
                        200.0 + 150.0 * angle.cos(),
                        200.0 + 150.0 * angle.sin(),
                        0.0,
                    );
                    let moved = manager.send_to_scene(
                        city,
                        SceneMessage::MoveEntity {
                            id: EntityId(i + 1),
                            position: target,
                        },
                    );
                    if moved.is_err() {
                        return;
                    }
                }
            }
        });
        Ok(())
    }
}
