//! WebSocket endpoint streaming world state to game clients.
//!
//! A client connects, names its room with a `room_id` frame, and from then
//! on receives a terrain frame followed by entity frames as the simulation
//! ticks. Frames the gateway cannot decode close the connection.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use hexgate_common::{protocol::ws::WsMessage, room::RoomId};

use crate::{
    metrics,
    queen::QueenError,
    world::{terrain::TerrainCache, WorldState},
    ws::{
        protocol::{decode_message, send_ws_message},
        registry::OUTBOUND_BUFFER_FRAMES,
    },
};

pub const PARSE_ERROR_MESSAGE: &str = "Failed to parse roomId";
pub const TERRAIN_NOT_FOUND_MESSAGE: &str = "Room terrain was not found";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Clone)]
pub struct WsState {
    pub world: Arc<WorldState>,
    pub terrain: Arc<TerrainCache>,
}

pub fn router(state: WsState) -> Router {
    Router::new().route("/world/object-stream", get(object_stream_upgrade)).with_state(state)
}

async fn object_stream_upgrade(
    State(state): State<WsState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: WsState, mut socket: WebSocket) {
    let client_id = Uuid::new_v4();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<WsMessage>(OUTBOUND_BUFFER_FRAMES);

    // Registered from the first byte so a snapshot published before the
    // room choice arrives cannot observe a half-initialized client.
    state.world.registry().register(client_id, None, -1, outbound_tx.clone());
    metrics::ws_client_connected();
    info!(%client_id, "world stream client connected");

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                if send_ws_message(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(raw))) => {
                        let message = match decode_message(&raw) {
                            Ok(message) => message,
                            Err(error) => {
                                debug!(%client_id, %error, "closing client over malformed frame");
                                metrics::increment_ws_protocol_violations();
                                break;
                            }
                        };

                        match message {
                            WsMessage::RoomId { room_id } => {
                                let replies = handle_room_change(
                                    &state,
                                    client_id,
                                    &outbound_tx,
                                    &mut outbound_rx,
                                    &room_id,
                                )
                                .await;
                                let mut failed = false;
                                for reply in &replies {
                                    if send_ws_message(&mut socket, reply).await.is_err() {
                                        failed = true;
                                        break;
                                    }
                                }
                                if failed {
                                    break;
                                }
                            }
                            // Server-to-client frames arriving inbound are
                            // protocol violations.
                            WsMessage::Terrain { .. }
                            | WsMessage::Entities { .. }
                            | WsMessage::Error { .. } => {
                                debug!(%client_id, "closing client over unexpected frame type");
                                metrics::increment_ws_protocol_violations();
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        debug!(%client_id, %error, "world stream socket error");
                        break;
                    }
                }
            }
        }
    }

    state.world.registry().unregister(client_id);
    metrics::ws_client_disconnected();
    info!(%client_id, "world stream client disconnected");
}

/// Process a room change request and return the frames to send back, in
/// order.
///
/// A request that fails to parse leaves the client's existing subscription
/// untouched. A valid request drops any frames still queued for the old
/// room and re-subscribes the client: terrain (or a lookup error) first,
/// then the current entities for the room if a snapshot exists.
async fn handle_room_change(
    state: &WsState,
    client_id: Uuid,
    outbound: &mpsc::Sender<WsMessage>,
    outbound_rx: &mut mpsc::Receiver<WsMessage>,
    raw_room_id: &str,
) -> Vec<WsMessage> {
    let room_id: RoomId = match raw_room_id.parse() {
        Ok(room_id) => room_id,
        Err(error) => {
            debug!(%client_id, %error, raw_room_id, "rejecting malformed room id");
            return vec![WsMessage::Error { error: PARSE_ERROR_MESSAGE.to_owned() }];
        }
    };

    let registry = state.world.registry();
    registry.unregister(client_id);

    // Frames queued for the previous room are stale once the client moves.
    while outbound_rx.try_recv().is_ok() {}

    let mut replies = Vec::with_capacity(2);
    match state.terrain.room_terrain(room_id).await {
        Ok(tiles) => replies.push(WsMessage::Terrain { terrain: tiles.as_ref().clone() }),
        Err(QueenError::NotFound) => {
            replies.push(WsMessage::Error { error: TERRAIN_NOT_FOUND_MESSAGE.to_owned() });
        }
        Err(QueenError::Call(status)) => {
            tracing::error!(%client_id, %status, "terrain lookup failed");
            replies.push(WsMessage::Error { error: INTERNAL_ERROR_MESSAGE.to_owned() });
        }
    }

    let mut last_seen = -1;
    if let Some(snapshot) = state.world.current() {
        replies.push(WsMessage::Entities { entities: snapshot.entities_in_room(room_id) });
        last_seen = snapshot.time;
    }

    registry.register(client_id, Some(room_id), last_seen, outbound.clone());
    replies
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use tokio::sync::mpsc;
    use uuid::Uuid;

    use hexgate_common::{
        protocol::ws::WsMessage,
        room::{Axial, RoomId},
        world::{Entity, EntityKind},
    };

    use crate::{
        queen::{MemoryQueen, QueenBackend},
        world::{terrain::TerrainCache, WorldSnapshot, WorldState},
        ws::registry::{ClientRegistry, OUTBOUND_BUFFER_FRAMES},
    };

    use super::{
        handle_room_change, WsState, INTERNAL_ERROR_MESSAGE, PARSE_ERROR_MESSAGE,
        TERRAIN_NOT_FOUND_MESSAGE,
    };

    fn test_state(queen: Arc<MemoryQueen>) -> WsState {
        let backend = QueenBackend::Memory(queen);
        WsState {
            world: Arc::new(WorldState::new(Arc::new(ClientRegistry::default()))),
            terrain: Arc::new(TerrainCache::new(backend)),
        }
    }

    fn connected_client(
        state: &WsState,
    ) -> (Uuid, mpsc::Sender<WsMessage>, mpsc::Receiver<WsMessage>) {
        let client_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(OUTBOUND_BUFFER_FRAMES);
        state.world.registry().register(client_id, None, -1, sender.clone());
        (client_id, sender, receiver)
    }

    #[tokio::test]
    async fn valid_room_change_sends_terrain_then_entities() {
        let queen = Arc::new(MemoryQueen::default());
        let room = RoomId::new(1, 1);
        queen.seed_terrain(room, vec![0, 1, 2]);
        let state = test_state(queen);
        let (client_id, sender, mut receiver) = connected_client(&state);

        let mut rooms = HashMap::new();
        rooms.insert(
            room,
            vec![Entity { id: 5, kind: EntityKind::Bot, pos: Axial::new(0, 0) }],
        );
        state.world.publish(WorldSnapshot::new(12, rooms));

        let replies = handle_room_change(&state, client_id, &sender, &mut receiver, "1;1").await;

        assert_eq!(replies.len(), 2);
        assert!(matches!(&replies[0], WsMessage::Terrain { terrain } if *terrain == vec![0, 1, 2]));
        assert!(matches!(&replies[1], WsMessage::Entities { entities } if entities.len() == 1));
        assert_eq!(state.world.registry().last_seen(client_id), Some(12));
    }

    #[tokio::test]
    async fn parse_failure_keeps_the_existing_subscription() {
        let queen = Arc::new(MemoryQueen::default());
        let previous_room = RoomId::new(4, 4);
        queen.seed_terrain(previous_room, vec![1]);
        let state = test_state(queen);
        let (client_id, sender, mut receiver) = connected_client(&state);

        handle_room_change(&state, client_id, &sender, &mut receiver, "4;4").await;
        let replies =
            handle_room_change(&state, client_id, &sender, &mut receiver, "not-a-room").await;

        assert_eq!(replies.len(), 1);
        assert!(
            matches!(&replies[0], WsMessage::Error { error } if error == PARSE_ERROR_MESSAGE)
        );
        assert_eq!(state.world.registry().snapshot()[0].room, Some(previous_room));
    }

    #[tokio::test]
    async fn room_change_drops_frames_queued_for_the_previous_room() {
        let queen = Arc::new(MemoryQueen::default());
        queen.seed_terrain(RoomId::new(5, 5), vec![1, 1]);
        let state = test_state(queen);
        let (client_id, sender, mut receiver) = connected_client(&state);

        // A broadcast for the old room landed on the channel just before the
        // client asked to move.
        sender
            .try_send(WsMessage::Entities {
                entities: vec![Entity { id: 1, kind: EntityKind::Bot, pos: Axial::new(0, 0) }],
            })
            .unwrap();

        let replies = handle_room_change(&state, client_id, &sender, &mut receiver, "5;5").await;

        assert!(matches!(&replies[0], WsMessage::Terrain { .. }));
        assert!(
            matches!(receiver.try_recv(), Err(mpsc::error::TryRecvError::Empty)),
            "stale frames should be drained on a room change"
        );
    }

    #[tokio::test]
    async fn unknown_room_reports_missing_terrain_but_still_subscribes() {
        let state = test_state(Arc::new(MemoryQueen::default()));
        let (client_id, sender, mut receiver) = connected_client(&state);

        let replies = handle_room_change(&state, client_id, &sender, &mut receiver, "7;7").await;

        assert_eq!(replies.len(), 1);
        assert!(
            matches!(&replies[0], WsMessage::Error { error } if error == TERRAIN_NOT_FOUND_MESSAGE)
        );
        assert_eq!(state.world.registry().snapshot()[0].room, Some(RoomId::new(7, 7)));
    }

    #[tokio::test]
    async fn unknown_room_with_a_snapshot_still_gets_an_entities_frame() {
        let state = test_state(Arc::new(MemoryQueen::default()));
        let (client_id, sender, mut receiver) = connected_client(&state);

        let room = RoomId::new(7, 7);
        let mut rooms = HashMap::new();
        rooms.insert(
            room,
            vec![Entity { id: 8, kind: EntityKind::Structure, pos: Axial::new(1, 0) }],
        );
        state.world.publish(WorldSnapshot::new(3, rooms));

        let replies = handle_room_change(&state, client_id, &sender, &mut receiver, "7;7").await;

        assert_eq!(replies.len(), 2);
        assert!(
            matches!(&replies[0], WsMessage::Error { error } if error == TERRAIN_NOT_FOUND_MESSAGE)
        );
        assert!(matches!(&replies[1], WsMessage::Entities { entities } if entities.len() == 1));
        assert_eq!(state.world.registry().last_seen(client_id), Some(3));
    }

    #[tokio::test]
    async fn no_snapshot_means_no_entities_frame() {
        let queen = Arc::new(MemoryQueen::default());
        queen.seed_terrain(RoomId::new(2, 3), vec![0]);
        let state = test_state(queen);
        let (client_id, sender, mut receiver) = connected_client(&state);

        let replies = handle_room_change(&state, client_id, &sender, &mut receiver, "2;3").await;

        assert_eq!(replies.len(), 1);
        assert!(matches!(&replies[0], WsMessage::Terrain { .. }));
        assert_eq!(state.world.registry().last_seen(client_id), Some(-1));
    }

    #[test]
    fn error_messages_match_the_wire_contract() {
        assert_eq!(PARSE_ERROR_MESSAGE, "Failed to parse roomId");
        assert_eq!(TERRAIN_NOT_FOUND_MESSAGE, "Room terrain was not found");
        assert_eq!(INTERNAL_ERROR_MESSAGE, "Internal server error");
    }
}

#[cfg(test)]
mod socket_tests {
    use std::{collections::HashMap, sync::Arc, time::Duration};

    use futures_util::{SinkExt, StreamExt};
    use serde_json::Value;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message as WireMessage;

    use hexgate_common::{
        room::{Axial, RoomId},
        world::{Entity, EntityKind},
    };

    use crate::{
        queen::{MemoryQueen, QueenBackend},
        world::{terrain::TerrainCache, WorldSnapshot, WorldState},
        ws::registry::ClientRegistry,
    };

    use super::{router, WsState};

    async fn serve(state: WsState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener should bind");
        let addr = listener.local_addr().expect("listener has a local addr");
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.expect("test server should run");
        });
        format!("ws://{addr}/world/object-stream")
    }

    type ClientSocket =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn next_json(socket: &mut ClientSocket) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame should arrive in time")
            .expect("stream should stay open")
            .expect("frame should be readable");
        let text = frame.into_text().expect("frame should be text");
        serde_json::from_str(&text).expect("frame should be json")
    }

    #[tokio::test]
    async fn room_change_streams_terrain_then_live_entities() {
        let queen = Arc::new(MemoryQueen::default());
        let room = RoomId::new(1, 1);
        queen.seed_terrain(room, vec![0, 1, 1, 2]);

        let world = Arc::new(WorldState::new(Arc::new(ClientRegistry::default())));
        let state = WsState {
            world: Arc::clone(&world),
            terrain: Arc::new(TerrainCache::new(QueenBackend::Memory(queen))),
        };
        let url = serve(state).await;

        let (mut socket, _) =
            tokio_tungstenite::connect_async(&url).await.expect("client should connect");
        socket
            .send(WireMessage::text(r#"{"ty":"room_id","room_id":"1;1"}"#))
            .await
            .expect("room change frame should send");

        let terrain = next_json(&mut socket).await;
        assert_eq!(terrain["ty"], "terrain");
        assert_eq!(terrain["terrain"], serde_json::json!([0, 1, 1, 2]));

        let mut rooms = HashMap::new();
        rooms.insert(
            room,
            vec![Entity { id: 42, kind: EntityKind::Bot, pos: Axial::new(0, 1) }],
        );
        rooms.insert(
            RoomId::new(2, 2),
            vec![Entity { id: 99, kind: EntityKind::Resource, pos: Axial::new(0, 0) }],
        );
        world.publish(WorldSnapshot::new(1, rooms));

        let entities = next_json(&mut socket).await;
        assert_eq!(entities["ty"], "entities");
        let listed = entities["entities"].as_array().expect("entities is an array");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["id"], 42);
    }

    #[tokio::test]
    async fn malformed_frames_close_the_connection_and_unregister() {
        let world = Arc::new(WorldState::new(Arc::new(ClientRegistry::default())));
        let state = WsState {
            world: Arc::clone(&world),
            terrain: Arc::new(TerrainCache::new(QueenBackend::in_memory())),
        };
        let url = serve(state).await;

        let (mut socket, _) =
            tokio_tungstenite::connect_async(&url).await.expect("client should connect");
        socket
            .send(WireMessage::text(r#"{"ty":"shout","volume":11}"#))
            .await
            .expect("frame should send");

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match socket.next().await {
                    Some(Ok(WireMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "server should close the connection");

        let emptied = tokio::time::timeout(Duration::from_secs(5), async {
            while !world.registry().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(emptied.is_ok(), "server should unregister the closed client");
    }

    #[tokio::test]
    async fn malformed_room_id_reports_an_error_and_keeps_the_stream() {
        let world = Arc::new(WorldState::new(Arc::new(ClientRegistry::default())));
        let state = WsState {
            world,
            terrain: Arc::new(TerrainCache::new(QueenBackend::in_memory())),
        };
        let url = serve(state).await;

        let (mut socket, _) =
            tokio_tungstenite::connect_async(&url).await.expect("client should connect");
        socket
            .send(WireMessage::text(r#"{"ty":"room_id","room_id":"nonsense"}"#))
            .await
            .expect("frame should send");

        let error = next_json(&mut socket).await;
        assert_eq!(error["ty"], "error");
        assert_eq!(error["error"], "Failed to parse roomId");

        // The stream survives a bad room id; a follow-up frame still works.
        socket
            .send(WireMessage::text(r#"{"ty":"room_id","room_id":"3;3"}"#))
            .await
            .expect("frame should send");
        let missing = next_json(&mut socket).await;
        assert_eq!(missing["ty"], "error");
        assert_eq!(missing["error"], "Room terrain was not found");
    }
}
