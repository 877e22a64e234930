//! Scene actor behavior: message ordering, backpressure, panic
//! containment and teardown guarantees.

use scene_core::{
    AoiConfig, BehaviorResult, ChannelSync, EntityId, NullSync, Position, SceneActor,
    SceneBehavior, SceneConfig, SceneContext, SceneId, SceneKind, SceneMessage, SceneState,
    SyncPacket, TimerWheel, TimerWheelConfig,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Behavior double that records every hook invocation.
#[derive(Default)]
struct Recording {
    log: Arc<Mutex<Vec<String>>>,
    destroys: Arc<AtomicUsize>,
    fail_create: bool,
    panic_ticks: bool,
}

impl SceneBehavior for Recording {
    fn on_create(&mut self, _ctx: &mut SceneContext<'_>) -> BehaviorResult {
        if self.fail_create {
            return Err("creation refused".into());
        }
        self.log.lock().unwrap().push("create".into());
        Ok(())
    }

    fn on_destroy(&mut self, _ctx: &mut SceneContext<'_>) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("destroy".into());
    }

    fn on_tick(&mut self, _ctx: &mut SceneContext<'_>, _delta: Duration) {
        if self.panic_ticks {
            panic!("tick exploded");
        }
    }

    fn on_entity_enter(&mut self, _ctx: &mut SceneContext<'_>, id: EntityId, _position: Position) {
        self.log.lock().unwrap().push(format!("enter:{}", id.0));
    }

    fn on_entity_leave(&mut self, _ctx: &mut SceneContext<'_>, id: EntityId) {
        self.log.lock().unwrap().push(format!("leave:{}", id.0));
    }

    fn on_command(&mut self, _ctx: &mut SceneContext<'_>, name: &str, _payload: &serde_json::Value) {
        self.log.lock().unwrap().push(format!("cmd:{name}"));
    }
}

fn wheel() -> TimerWheel {
    let wheel = TimerWheel::new(TimerWheelConfig::default()).unwrap();
    wheel.start();
    wheel
}

fn bus() -> scene_core::EventBus {
    scene_core::EventBus::new(scene_core::EventBusConfig::default()).unwrap()
}

fn small_scene_config() -> SceneConfig {
    SceneConfig {
        max_entities: 100,
        mailbox_size: 64,
        batch_size: 16,
        tick_interval: Duration::from_millis(20),
        time_limit: None,
        empty_timeout: scene_core::EmptyTimeout::Inherit,
        aoi: AoiConfig {
            grid_size: 100.0,
            view_distance: 150.0,
            update_interval: Duration::from_millis(20),
        },
    }
}

#[tokio::test(start_paused = true)]
async fn messages_are_processed_in_send_order() {
    let behavior = Recording::default();
    let log = behavior.log.clone();
    let handle = SceneActor::spawn(
        SceneId(1),
        "fifo",
        SceneKind::Field,
        small_scene_config(),
        Box::new(behavior),
        wheel(),
        bus(),
        Arc::new(NullSync),
        0,
    )
    .unwrap();

    for i in 0..10 {
        handle
            .send(SceneMessage::Command {
                name: format!("c{i}"),
                payload: json!(null),
            })
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let log = log.lock().unwrap().clone();
    let commands: Vec<&String> = log.iter().filter(|e| e.starts_with("cmd:")).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("cmd:c{i}")).collect();
    assert_eq!(commands, expected.iter().collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn full_mailbox_rejects_then_accepts_after_drain() {
    let mut config = small_scene_config();
    config.mailbox_size = 10;
    let handle = SceneActor::spawn(
        SceneId(2),
        "full",
        SceneKind::Field,
        config,
        Box::new(Recording::default()),
        wheel(),
        bus(),
        Arc::new(NullSync),
        0,
    )
    .unwrap();

    // Give the actor time to finish on_create and block on its mailbox;
    // after this the test holds the only thread, so nothing drains.
    tokio::time::sleep(Duration::from_millis(50)).await;

    for i in 0..10 {
        handle
            .send(SceneMessage::Command {
                name: format!("fill{i}"),
                payload: json!(null),
            })
            .expect("mailbox has room");
    }
    let overflow = handle.send(SceneMessage::Command {
        name: "overflow".into(),
        payload: json!(null),
    });
    assert!(
        matches!(overflow, Err(scene_core::CoreError::MailboxFull(SceneId(2)))),
        "11th send must be rejected, got {overflow:?}"
    );

    // One tick drains a batch; the retried send then succeeds.
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle
        .send(SceneMessage::Command {
            name: "retry".into(),
            payload: json!(null),
        })
        .expect("retried send succeeds after drain");
}

#[tokio::test(start_paused = true)]
async fn enter_move_leave_produce_sync_packets() {
    let (sink, mut rx) = ChannelSync::new();
    let handle = SceneActor::spawn(
        SceneId(3),
        "sync",
        SceneKind::Field,
        small_scene_config(),
        Box::new(Recording::default()),
        wheel(),
        bus(),
        Arc::new(sink),
        0,
    )
    .unwrap();

    let a = EntityId(1);
    let b = EntityId(2);
    handle
        .send(SceneMessage::EnterEntity {
            id: a,
            position: Position::new(0.0, 0.0, 0.0),
            attributes: HashMap::new(),
        })
        .unwrap();
    handle
        .send(SceneMessage::EnterEntity {
            id: b,
            position: Position::new(50.0, 0.0, 0.0),
            attributes: HashMap::new(),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // B's entry announced both ways.
    let mut appeared = Vec::new();
    while let Ok((observer, packet)) = rx.try_recv() {
        if let SyncPacket::EntityAppeared { id, .. } = packet {
            appeared.push((observer, id));
        }
    }
    assert!(appeared.contains(&(a, b)));
    assert!(appeared.contains(&(b, a)));

    // A walks out of range; both sides receive vanish packets.
    handle
        .send(SceneMessage::MoveEntity {
            id: a,
            position: Position::new(500.0, 0.0, 0.0),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut vanished = Vec::new();
    while let Ok((observer, packet)) = rx.try_recv() {
        if let SyncPacket::EntityVanished { id, .. } = packet {
            vanished.push((observer, id));
        }
    }
    assert!(vanished.contains(&(a, b)));
    assert!(vanished.contains(&(b, a)));
}

#[tokio::test(start_paused = true)]
async fn visible_query_tracks_aoi() {
    let handle = SceneActor::spawn(
        SceneId(4),
        "query",
        SceneKind::Field,
        small_scene_config(),
        Box::new(Recording::default()),
        wheel(),
        bus(),
        Arc::new(NullSync),
        0,
    )
    .unwrap();

    for (id, x) in [(1u64, 0.0), (2, 100.0), (3, 900.0)] {
        handle
            .send(SceneMessage::EnterEntity {
                id: EntityId(id),
                position: Position::new(x, 0.0, 0.0),
                attributes: HashMap::new(),
            })
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (reply, rx) = tokio::sync::oneshot::channel();
    handle
        .send(SceneMessage::QueryVisible {
            id: EntityId(1),
            reply,
        })
        .unwrap();
    let visible = rx.await.unwrap().expect("entity registered");
    assert_eq!(visible, vec![EntityId(2)]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_runs_on_destroy_exactly_once() {
    let behavior = Recording::default();
    let destroys = behavior.destroys.clone();
    let handle = SceneActor::spawn(
        SceneId(5),
        "teardown",
        SceneKind::Dungeon,
        small_scene_config(),
        Box::new(behavior),
        wheel(),
        bus(),
        Arc::new(NullSync),
        0,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown();
    handle.shutdown(); // second request is a no-op
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(handle.state(), SceneState::Destroyed);
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_tick_does_not_kill_the_actor() {
    let behavior = Recording {
        panic_ticks: true,
        ..Recording::default()
    };
    let log = behavior.log.clone();
    let destroys = behavior.destroys.clone();
    let handle = SceneActor::spawn(
        SceneId(6),
        "panicky",
        SceneKind::Field,
        small_scene_config(),
        Box::new(behavior),
        wheel(),
        bus(),
        Arc::new(NullSync),
        0,
    )
    .unwrap();

    // Let several ticks panic, then verify the actor still processes
    // messages and still tears down cleanly.
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle
        .send(SceneMessage::Command {
            name: "alive".into(),
            payload: json!(null),
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(log.lock().unwrap().iter().any(|e| e == "cmd:alive"));

    handle.shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.state(), SceneState::Destroyed);
    assert_eq!(destroys.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_create_parks_the_scene() {
    let behavior = Recording {
        fail_create: true,
        ..Recording::default()
    };
    let destroys = behavior.destroys.clone();
    let handle = SceneActor::spawn(
        SceneId(7),
        "doomed",
        SceneKind::Dungeon,
        small_scene_config(),
        Box::new(behavior),
        wheel(),
        bus(),
        Arc::new(NullSync),
        0,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.state(), SceneState::Failed);
    assert_eq!(destroys.load(Ordering::SeqCst), 0, "a failed scene never ran");
}

#[tokio::test(start_paused = true)]
async fn time_limited_scene_destroys_itself() {
    let mut config = small_scene_config();
    config.time_limit = Some(Duration::from_millis(300));
    let handle = SceneActor::spawn(
        SceneId(8),
        "timed",
        SceneKind::Arena,
        config,
        Box::new(Recording::default()),
        wheel(),
        bus(),
        Arc::new(NullSync),
        0,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(handle.state(), SceneState::Running);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(handle.state(), SceneState::Destroyed);
}

#[tokio::test(start_paused = true)]
async fn scheduled_message_is_cancelled_with_the_scene() {
    /// Arms a delayed self-command during creation.
    struct Scheduler {
        fired: Arc<AtomicUsize>,
    }

    impl SceneBehavior for Scheduler {
        fn on_create(&mut self, ctx: &mut SceneContext<'_>) -> BehaviorResult {
            ctx.schedule_message(
                Duration::from_millis(500),
                SceneMessage::Command {
                    name: "delayed".into(),
                    payload: json!(null),
                },
            );
            Ok(())
        }

        fn on_command(&mut self, _ctx: &mut SceneContext<'_>, name: &str, _p: &serde_json::Value) {
            if name == "delayed" {
                self.fired.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    let fired = Arc::new(AtomicUsize::new(0));
    let handle = SceneActor::spawn(
        SceneId(9),
        "scheduler",
        SceneKind::Field,
        small_scene_config(),
        Box::new(Scheduler {
            fired: fired.clone(),
        }),
        wheel(),
        bus(),
        Arc::new(NullSync),
        0,
    )
    .unwrap();

    // Destroy the scene before the timer is due; it must never fire.
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.shutdown();
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0, "timer fired into a dead scene");
}
