// WebSocket message types for the world object stream.
//
// Frames are JSON objects tagged by a `ty` field. Clients send `room_id`
// frames to change their room subscription; the server pushes `terrain`,
// `entities` and `error` frames.

use serde::{Deserialize, Serialize};

use crate::world::Entity;

/// All message types of the object-stream WebSocket protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "ty", rename_all = "snake_case")]
pub enum WsMessage {
    /// Client -> Server: subscribe to a room, e.g. `{"ty":"room_id","room_id":"15;12"}`.
    RoomId { room_id: String },

    /// Server -> Client: terrain of the subscribed room, one tile value per
    /// layout cell (see the room-terrain-layout endpoint for cell order).
    Terrain { terrain: Vec<i32> },

    /// Server -> Client: the entities currently in the subscribed room.
    Entities { entities: Vec<Entity> },

    /// Server -> Client: a recoverable error, e.g. a malformed room id.
    Error { error: String },
}

#[cfg(test)]
mod tests {
    use super::WsMessage;
    use crate::room::Axial;
    use crate::world::{Entity, EntityKind};

    #[test]
    fn frames_are_tagged_with_ty() {
        let samples = [
            (WsMessage::RoomId { room_id: "15;12".into() }, "room_id"),
            (WsMessage::Terrain { terrain: vec![0, 1, 2] }, "terrain"),
            (
                WsMessage::Entities {
                    entities: vec![Entity {
                        id: 1,
                        kind: EntityKind::Bot,
                        pos: Axial::new(0, 0),
                    }],
                },
                "entities",
            ),
            (WsMessage::Error { error: "Failed to parse roomId".into() }, "error"),
        ];

        for (message, expected_ty) in samples {
            let value = serde_json::to_value(&message).expect("frame should serialize");
            assert_eq!(value["ty"], expected_ty);
        }
    }

    #[test]
    fn decodes_room_id_frames() {
        let decoded: WsMessage =
            serde_json::from_str(r#"{"ty":"room_id","room_id":"1;1"}"#).expect("should decode");
        assert_eq!(decoded, WsMessage::RoomId { room_id: "1;1".into() });
    }

    #[test]
    fn rejects_unknown_ty_tags() {
        assert!(serde_json::from_str::<WsMessage>(r#"{"ty":"bogus"}"#).is_err());
    }

    #[test]
    fn rejects_untagged_objects() {
        assert!(serde_json::from_str::<WsMessage>(r#"{"room_id":"1;1"}"#).is_err());
    }
}
