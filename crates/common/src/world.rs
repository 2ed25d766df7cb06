// World DTOs shared between the gateway REST/WebSocket surfaces and clients.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::room::{Axial, RoomId};

/// Terrain tile variants, in wire order.
///
/// Terrain payloads carry the raw discriminants, one per layout cell; the
/// `tile-enum` endpoint serves the index-to-name mapping below.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Empty,
    Plain,
    Wall,
    Bridge,
}

impl TileKind {
    pub const ALL: [TileKind; 4] =
        [TileKind::Empty, TileKind::Plain, TileKind::Wall, TileKind::Bridge];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Plain => "plain",
            Self::Wall => "wall",
            Self::Bridge => "bridge",
        }
    }

    pub const fn index(self) -> i32 {
        self as i32
    }
}

/// What kind of game object an [`Entity`] is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Bot,
    Structure,
    Resource,
}

/// One game object inside a room, as streamed to WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub id: u64,
    pub kind: EntityKind,
    pub pos: Axial,
}

/// One entry of the room directory served by `GET /v1/world/rooms`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomListEntry {
    pub room_id: RoomId,
    pub radius: u32,
}

/// A simulation-side user, as reported by the queen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimUser {
    pub user_id: Uuid,
    pub level: u32,
}

#[cfg(test)]
mod tests {
    use super::{Entity, EntityKind, TileKind};
    use crate::room::Axial;

    #[test]
    fn tile_kind_indices_are_contiguous() {
        for (expected, tile) in TileKind::ALL.into_iter().enumerate() {
            assert_eq!(tile.index(), expected as i32);
        }
    }

    #[test]
    fn entities_serialize_with_snake_case_kind() {
        let entity = Entity { id: 7, kind: EntityKind::Structure, pos: Axial::new(1, -2) };
        let value = serde_json::to_value(&entity).expect("entity should serialize");
        assert_eq!(value["kind"], "structure");
        assert_eq!(value["pos"]["q"], 1);
        assert_eq!(value["pos"]["r"], -2);
    }
}
