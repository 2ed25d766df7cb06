use std::collections::HashMap;

use hexgate_common::{room::RoomId, world::Entity};

/// A complete world-state observation at one simulation tick, grouped by
/// room for fan-out.
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    pub time: i64,
    rooms: HashMap<RoomId, Vec<Entity>>,
}

impl WorldSnapshot {
    pub fn new(time: i64, rooms: HashMap<RoomId, Vec<Entity>>) -> Self {
        Self { time, rooms }
    }

    /// Entities inside the given room; empty for rooms the snapshot does
    /// not cover.
    pub fn entities_in_room(&self, room_id: RoomId) -> Vec<Entity> {
        self.rooms.get(&room_id).cloned().unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
