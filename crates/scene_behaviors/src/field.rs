//! Open-world field: keeps a monster population topped up on a respawn
//! cycle.

use scene_core::{BehaviorResult, EntityId, Position, SceneBehavior, SceneContext};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const RESPAWN_PERIOD: Duration = Duration::from_secs(30);

pub struct FieldBehavior {
    /// Monsters the field wants alive at any time
    target_monsters: usize,
    /// Ids handed to spawned monsters, disjoint from player ids by
    /// convention (high bit set)
    next_monster_id: u64,
}

impl FieldBehavior {
    pub fn new() -> Self {
        Self {
            target_monsters: 20,
            next_monster_id: 1 << 62,
        }
    }

    pub fn with_target(target_monsters: usize) -> Self {
        Self {
            target_monsters,
            ..Self::new()
        }
    }

    fn monster_count(&self, ctx: &SceneContext<'_>) -> usize {
        ctx.scene
            .entities()
            .filter(|e| e.attributes.get("monster").is_some())
            .count()
    }
}

impl Default for FieldBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneBehavior for FieldBehavior {
    fn on_create(&mut self, ctx: &mut SceneContext<'_>) -> BehaviorResult {
        info!(
            "🌾 {} '{}': respawn cycle every {RESPAWN_PERIOD:?}",
            ctx.scene.id, ctx.scene.name
        );
        ctx.schedule_repeating_command(Duration::ZERO, RESPAWN_PERIOD, "respawn", json!(null));
        Ok(())
    }

    fn on_command(&mut self, ctx: &mut SceneContext<'_>, name: &str, _payload: &serde_json::Value) {
        if name != "respawn" {
            return;
        }
        let alive = self.monster_count(ctx);
        let missing = self.target_monsters.saturating_sub(alive);
        if missing == 0 {
            return;
        }
        // Spawns go through the mailbox like any other entry, so they
        // respect the capacity limit and feed the AOI index normally.
        for i in 0..missing {
            let id = EntityId(self.next_monster_id);
            self.next_monster_id += 1;
            let x = ((self.next_monster_id % 37) * 50) as f64;
            let y = ((self.next_monster_id % 23) * 50) as f64;
            ctx.schedule_message(
                Duration::from_millis(i as u64 * 10),
                scene_core::SceneMessage::EnterEntity {
                    id,
                    position: Position::new(x, y, 0.0),
                    attributes: [("monster".to_string(), json!(true))].into_iter().collect(),
                },
            );
        }
        debug!("🌾 {}: respawning {missing} monsters", ctx.scene.id);
    }

    fn on_entity_leave(&mut self, ctx: &mut SceneContext<'_>, id: EntityId) {
        debug!("🌾 {}: {id} left the field", ctx.scene.id);
    }
}
