//! Background task that consumes the simulation's entity stream and turns
//! it into published [`WorldSnapshot`]s.
//!
//! The simulation streams one frame per room per tick. A new `world_time`
//! marks the start of the next tick, at which point the accumulated frames
//! form a complete snapshot of the previous one.

use std::{collections::HashMap, time::Duration};

use tracing::{debug, warn};

use hexgate_common::{
    room::{Axial, RoomId},
    world::{Entity, EntityKind},
};

use crate::{
    queen::{proto, QueenBackend, QueenChannel},
    world::{WorldSnapshot, WorldState},
};

use std::sync::Arc;

const RECONNECT_BASE_MS: u64 = 500;
const RECONNECT_MAX_MS: u64 = 5_000;

/// Drive the entity feed until the process shuts down.
pub async fn run_feed(queen: QueenBackend, world: Arc<WorldState>) {
    match queen {
        QueenBackend::Grpc(channel) => run_grpc_feed(channel, world).await,
        QueenBackend::Memory(_) => {
            debug!("in-memory queen has no entity stream; world feed is idle");
        }
    }
}

async fn run_grpc_feed(channel: QueenChannel, world: Arc<WorldState>) {
    let mut backoff_ms = RECONNECT_BASE_MS;

    loop {
        match stream_entities(&channel, &world).await {
            Ok(()) => {
                warn!("queen entity stream ended; reconnecting");
            }
            Err(status) => {
                warn!(%status, "queen entity stream failed; reconnecting");
            }
        }

        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(RECONNECT_MAX_MS);
    }
}

async fn stream_entities(
    channel: &QueenChannel,
    world: &Arc<WorldState>,
) -> Result<(), tonic::Status> {
    let mut stream = channel.world_client().entities(proto::Empty {}).await?.into_inner();
    let mut builder = SnapshotBuilder::default();

    while let Some(frame) = stream.message().await? {
        if let Some(snapshot) = builder.push(frame) {
            debug!(time = snapshot.time, rooms = snapshot.room_count(), "publishing snapshot");
            world.publish(snapshot);
        }
    }

    Ok(())
}

/// Accumulates per-room frames into whole-tick snapshots.
#[derive(Debug, Default)]
struct SnapshotBuilder {
    time: Option<i64>,
    rooms: HashMap<RoomId, Vec<Entity>>,
}

impl SnapshotBuilder {
    /// Fold one frame in. Returns the completed snapshot of the previous
    /// tick when the frame opens a new one.
    fn push(&mut self, frame: proto::RoomEntities) -> Option<WorldSnapshot> {
        let completed = match self.time {
            Some(time) if time != frame.world_time => {
                let rooms = std::mem::take(&mut self.rooms);
                Some(WorldSnapshot::new(time, rooms))
            }
            _ => None,
        };
        self.time = Some(frame.world_time);

        let room_pos = frame.room_id.unwrap_or_default();
        let room_id = RoomId { q: room_pos.q, r: room_pos.r };
        self.rooms.insert(room_id, collect_entities(&frame));

        completed
    }
}

fn collect_entities(frame: &proto::RoomEntities) -> Vec<Entity> {
    let position = |pos: Option<proto::Axial>| {
        let pos = pos.unwrap_or_default();
        Axial { q: pos.q, r: pos.r }
    };

    let mut entities =
        Vec::with_capacity(frame.bots.len() + frame.structures.len() + frame.resources.len());
    entities.extend(frame.bots.iter().map(|bot| Entity {
        id: bot.id,
        kind: EntityKind::Bot,
        pos: position(bot.pos),
    }));
    entities.extend(frame.structures.iter().map(|structure| Entity {
        id: structure.id,
        kind: EntityKind::Structure,
        pos: position(structure.pos),
    }));
    entities.extend(frame.resources.iter().map(|resource| Entity {
        id: resource.id,
        kind: EntityKind::Resource,
        pos: position(resource.pos),
    }));
    entities
}
