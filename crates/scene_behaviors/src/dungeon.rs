//! Instanced dungeon run: linear stage progression with a completion
//! broadcast. The core enforces the run's time limit; this behavior
//! only tracks progress.

use scene_core::{BehaviorResult, EntityId, Position, SceneBehavior, SceneContext};
use serde_json::json;
use tracing::{debug, info, warn};

pub struct DungeonBehavior {
    stage: usize,
    total_stages: usize,
    completed: bool,
}

impl DungeonBehavior {
    pub fn new(total_stages: usize) -> Self {
        Self {
            stage: 0,
            total_stages: total_stages.max(1),
            completed: false,
        }
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn advance(&mut self, ctx: &mut SceneContext<'_>) {
        if self.completed {
            return;
        }
        self.stage += 1;
        debug!(
            "⚔️ {}: stage {}/{}",
            ctx.scene.id, self.stage, self.total_stages
        );
        ctx.broadcast(
            "stage_cleared",
            json!({ "stage": self.stage, "total": self.total_stages }),
        );
        if self.stage >= self.total_stages {
            self.completed = true;
            info!("⚔️ {}: dungeon complete", ctx.scene.id);
            ctx.broadcast("dungeon_complete", json!({ "stages": self.total_stages }));
            if let Err(e) = ctx.publish(
                "dungeon_completed",
                json!({ "scene": ctx.scene.id, "stages": self.total_stages }),
            ) {
                warn!("⚔️ {}: completion event dropped: {e}", ctx.scene.id);
            }
        }
    }
}

impl SceneBehavior for DungeonBehavior {
    fn on_create(&mut self, ctx: &mut SceneContext<'_>) -> BehaviorResult {
        info!(
            "⚔️ {} '{}': {} stages, limit {:?}",
            ctx.scene.id, ctx.scene.name, self.total_stages, ctx.scene.config.time_limit
        );
        Ok(())
    }

    fn on_entity_enter(&mut self, ctx: &mut SceneContext<'_>, id: EntityId, _position: Position) {
        // Late joiners need to know where the run stands.
        ctx.deliver(
            id,
            scene_core::SyncPacket::SceneBroadcast {
                scene: ctx.scene.id,
                event: "dungeon_state".to_string(),
                payload: json!({
                    "stage": self.stage,
                    "total": self.total_stages,
                    "completed": self.completed,
                }),
            },
        );
    }

    fn on_command(&mut self, ctx: &mut SceneContext<'_>, name: &str, _payload: &serde_json::Value) {
        match name {
            "stage_cleared" => self.advance(ctx),
            other => debug!("⚔️ {}: ignoring command '{other}'", ctx.scene.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_core::{
        CoreConfig, EntityId, NullSync, Position, SceneKind, SceneManager, SceneMessage,
    };
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn stage_commands_drive_completion() {
        let manager = SceneManager::new(CoreConfig::default(), Arc::new(NullSync)).unwrap();
        let scene = manager
            .create_scene(
                SceneKind::Dungeon,
                "test-run",
                Box::new(DungeonBehavior::new(2)),
            )
            .unwrap();

        let events = manager.bus().subscribe("dungeon_completed", |_event| {});

        manager
            .send_to_scene(
                scene,
                SceneMessage::EnterEntity {
                    id: EntityId(1),
                    position: Position::new(0.0, 0.0, 0.0),
                    attributes: HashMap::new(),
                },
            )
            .unwrap();
        for _ in 0..2 {
            manager
                .send_to_scene(
                    scene,
                    SceneMessage::Command {
                        name: "stage_cleared".into(),
                        payload: serde_json::json!(null),
                    },
                )
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(events.delivered(), 1);
        events.unsubscribe();
        manager.shutdown_all();
    }
}
