//! Visibility synchronization glue.
//!
//! Turns AOI deltas into observer-facing packets and hands them to an
//! outbound sink supplied by the network layer. The wire format itself is
//! out of scope; packets are plain serializable structs the serialization
//! layer can encode however it likes.

use crate::types::{EntityId, Position, SceneId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One synchronization packet addressed to a single observer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncPacket {
    /// An entity became visible to the observer
    EntityAppeared {
        scene: SceneId,
        id: EntityId,
        position: Position,
        attributes: HashMap<String, Value>,
    },
    /// An entity stopped being visible to the observer
    EntityVanished { scene: SceneId, id: EntityId },
    /// A visible entity moved
    EntityMoved {
        scene: SceneId,
        id: EntityId,
        from: Position,
        to: Position,
    },
    /// Scene-wide broadcast payload
    SceneBroadcast {
        scene: SceneId,
        event: String,
        payload: Value,
    },
}

/// Outbound sink for sync packets, implemented by the network /
/// serialization layer.
///
/// Called from inside scene actor loops: implementations must be cheap
/// and non-blocking (queue and return). A sink that cannot keep up should
/// shed internally; the core does not retry.
pub trait SyncSink: Send + Sync + 'static {
    /// Queues one packet for the given observer.
    fn deliver(&self, observer: EntityId, packet: SyncPacket);
}

/// Sink that discards everything. Useful for headless tests and tools.
#[derive(Debug, Default)]
pub struct NullSync;

impl SyncSink for NullSync {
    fn deliver(&self, _observer: EntityId, _packet: SyncPacket) {}
}

/// Sink that forwards packets over an unbounded channel, used by tests
/// and by the demo wiring to observe what clients would receive.
#[derive(Debug)]
pub struct ChannelSync {
    tx: tokio::sync::mpsc::UnboundedSender<(EntityId, SyncPacket)>,
}

impl ChannelSync {
    /// Creates the sink and the receiving half.
    pub fn new() -> (
        Self,
        tokio::sync::mpsc::UnboundedReceiver<(EntityId, SyncPacket)>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SyncSink for ChannelSync {
    fn deliver(&self, observer: EntityId, packet: SyncPacket) {
        // Receiver dropped means nobody is listening; nothing to do.
        let _ = self.tx.send((observer, packet));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packets_serialize_with_type_tag() {
        let packet = SyncPacket::EntityVanished {
            scene: SceneId(7),
            id: EntityId(42),
        };
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["type"], "entity_vanished");
        assert_eq!(json["id"], 42);
    }

    #[tokio::test]
    async fn channel_sync_forwards_packets() {
        let (sink, mut rx) = ChannelSync::new();
        sink.deliver(
            EntityId(1),
            SyncPacket::EntityVanished {
                scene: SceneId(1),
                id: EntityId(2),
            },
        );
        let (observer, packet) = rx.recv().await.unwrap();
        assert_eq!(observer, EntityId(1));
        assert!(matches!(packet, SyncPacket::EntityVanished { .. }));
    }
}
