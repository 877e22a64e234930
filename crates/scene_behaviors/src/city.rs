//! The persistent main city: welcomes arrivals and runs a periodic
//! announcement loop.

use scene_core::{
    BehaviorResult, EntityId, Position, SceneBehavior, SceneContext, SyncPacket,
};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the city broadcasts its population announcement.
const ANNOUNCE_PERIOD: Duration = Duration::from_secs(60);

pub struct MainCityBehavior {
    arrivals: u64,
}

impl MainCityBehavior {
    pub fn new() -> Self {
        Self { arrivals: 0 }
    }
}

impl Default for MainCityBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneBehavior for MainCityBehavior {
    fn on_create(&mut self, ctx: &mut SceneContext<'_>) -> BehaviorResult {
        info!("🏙️ {} '{}' open for business", ctx.scene.id, ctx.scene.name);
        ctx.schedule_repeating_command(ANNOUNCE_PERIOD, ANNOUNCE_PERIOD, "announce", json!(null));
        Ok(())
    }

    fn on_entity_enter(&mut self, ctx: &mut SceneContext<'_>, id: EntityId, _position: Position) {
        self.arrivals += 1;
        ctx.deliver(
            id,
            SyncPacket::SceneBroadcast {
                scene: ctx.scene.id,
                event: "welcome".to_string(),
                payload: json!({
                    "city": ctx.scene.name,
                    "population": ctx.scene.entity_count(),
                }),
            },
        );
    }

    fn on_command(&mut self, ctx: &mut SceneContext<'_>, name: &str, payload: &serde_json::Value) {
        match name {
            "announce" => {
                if ctx.scene.is_empty() {
                    return;
                }
                ctx.broadcast(
                    "city_announcement",
                    json!({
                        "population": ctx.scene.entity_count(),
                        "arrivals": self.arrivals,
                    }),
                );
                debug!(
                    "🏙️ {}: announced to {} entities",
                    ctx.scene.id,
                    ctx.scene.entity_count()
                );
            }
            "broadcast" => {
                // Admin-triggered city-wide message.
                ctx.broadcast("city_notice", payload.clone());
            }
            other => warn!("🏙️ {}: unknown command '{other}'", ctx.scene.id),
        }
    }
}
