//! Client layer for the simulation server ("queen").
//!
//! [`QueenBackend`] abstracts over a real gRPC channel and an in-process
//! in-memory stand-in used by tests and by deployments without a running
//! simulation.

pub mod proto;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use anyhow::Context;
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use uuid::Uuid;

use hexgate_common::{
    room::{Axial, RoomId},
    world::{RoomListEntry, SimUser},
};

use proto::{CommandClient, HealthClient, UsersClient, WorldClient};

#[derive(Debug, Error)]
pub enum QueenError {
    #[error("not found upstream")]
    NotFound,
    #[error("queen call failed: {0}")]
    Call(tonic::Status),
}

impl From<tonic::Status> for QueenError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::NotFound => Self::NotFound,
            _ => Self::Call(status),
        }
    }
}

/// Simulation server backend. Cloning is cheap; the gRPC variant shares
/// one HTTP/2 channel across clones.
#[derive(Debug, Clone)]
pub enum QueenBackend {
    Grpc(QueenChannel),
    Memory(Arc<MemoryQueen>),
}

impl QueenBackend {
    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(MemoryQueen::default()))
    }

    pub async fn room_layout(&self, radius: u32) -> Result<Vec<Axial>, QueenError> {
        match self {
            Self::Grpc(channel) => {
                let response = channel
                    .world_client()
                    .get_room_layout(proto::GetRoomLayoutMsg { radius })
                    .await?
                    .into_inner();
                Ok(response
                    .positions
                    .into_iter()
                    .map(|pos| Axial { q: pos.q, r: pos.r })
                    .collect())
            }
            Self::Memory(queen) => queen.room_layout(radius),
        }
    }

    pub async fn room_terrain(&self, room_id: RoomId) -> Result<Vec<i32>, QueenError> {
        match self {
            Self::Grpc(channel) => {
                let response = channel
                    .world_client()
                    .get_room_terrain(proto::Axial { q: room_id.q, r: room_id.r })
                    .await?
                    .into_inner();
                Ok(response.tiles)
            }
            Self::Memory(queen) => queen.room_terrain(room_id),
        }
    }

    pub async fn room_list(&self) -> Result<Vec<RoomListEntry>, QueenError> {
        match self {
            Self::Grpc(channel) => {
                let response =
                    channel.world_client().get_room_list(proto::Empty {}).await?.into_inner();
                Ok(response
                    .rooms
                    .into_iter()
                    .map(|room| {
                        let pos = room.room_id.unwrap_or_default();
                        RoomListEntry {
                            room_id: RoomId { q: pos.q, r: pos.r },
                            radius: room.radius,
                        }
                    })
                    .collect())
            }
            Self::Memory(queen) => queen.room_list(),
        }
    }

    pub async fn sim_users(&self) -> Result<Vec<SimUser>, QueenError> {
        match self {
            Self::Grpc(channel) => {
                let mut stream =
                    channel.users().list_users(proto::Empty {}).await?.into_inner();
                let mut users = Vec::new();
                while let Some(info) = stream.message().await? {
                    users.push(sim_user_from_proto(info)?);
                }
                Ok(users)
            }
            Self::Memory(queen) => queen.sim_users(),
        }
    }

    pub async fn sim_user(&self, user_id: Uuid) -> Result<SimUser, QueenError> {
        match self {
            Self::Grpc(channel) => {
                let info = channel
                    .users()
                    .get_user_info(proto::UuidMsg { data: user_id.as_bytes().to_vec() })
                    .await?
                    .into_inner();
                sim_user_from_proto(info)
            }
            Self::Memory(queen) => queen.sim_user(user_id),
        }
    }

    pub async fn register_user(&self, user_id: Uuid, level: u32) -> Result<(), QueenError> {
        match self {
            Self::Grpc(channel) => {
                channel
                    .command()
                    .register_user(proto::RegisterUserMsg {
                        user_id: Some(proto::UuidMsg { data: user_id.as_bytes().to_vec() }),
                        level,
                    })
                    .await?;
                Ok(())
            }
            Self::Memory(queen) => queen.register_user(user_id, level),
        }
    }

    pub async fn ping(&self) -> Result<(), QueenError> {
        match self {
            Self::Grpc(channel) => {
                channel.health().ping(proto::Empty {}).await?;
                Ok(())
            }
            Self::Memory(_) => Ok(()),
        }
    }
}

fn sim_user_from_proto(info: proto::UserInfo) -> Result<SimUser, QueenError> {
    let raw = info.user_id.unwrap_or_default();
    let user_id = Uuid::from_slice(&raw.data)
        .map_err(|_| QueenError::Call(tonic::Status::internal("malformed uuid from queen")))?;
    Ok(SimUser { user_id, level: info.level })
}

/// Lazily-connected gRPC channel to the simulation server.
#[derive(Debug, Clone)]
pub struct QueenChannel {
    channel: Channel,
}

impl QueenChannel {
    /// Build the channel without dialing; the first RPC triggers the
    /// actual connection attempt.
    pub fn connect_lazy(url: &str) -> anyhow::Result<Self> {
        let channel = Endpoint::from_shared(url.to_owned())
            .with_context(|| format!("invalid queen endpoint url '{url}'"))?
            .connect_lazy();
        Ok(Self { channel })
    }

    pub(crate) fn world_client(&self) -> WorldClient {
        WorldClient::new(self.channel.clone())
    }

    fn users(&self) -> UsersClient {
        UsersClient::new(self.channel.clone())
    }

    fn command(&self) -> CommandClient {
        CommandClient::new(self.channel.clone())
    }

    fn health(&self) -> HealthClient {
        HealthClient::new(self.channel.clone())
    }
}

/// In-memory simulation stand-in.
///
/// Rooms and terrain are seeded explicitly; layouts are generated as the
/// standard hexagon of the requested radius. Call counters let tests
/// observe how often the backend was actually hit.
#[derive(Debug, Default)]
pub struct MemoryQueen {
    layouts: RwLock<HashMap<u32, Vec<Axial>>>,
    terrain: RwLock<HashMap<RoomId, Vec<i32>>>,
    rooms: RwLock<Vec<RoomListEntry>>,
    users: RwLock<HashMap<Uuid, SimUser>>,
    layout_calls: AtomicU64,
    terrain_calls: AtomicU64,
}

impl MemoryQueen {
    pub fn seed_terrain(&self, room_id: RoomId, tiles: Vec<i32>) {
        let mut terrain = self.terrain.write().expect("terrain map lock poisoned");
        terrain.insert(room_id, tiles);
    }

    pub fn seed_room(&self, room_id: RoomId, radius: u32) {
        let mut rooms = self.rooms.write().expect("room list lock poisoned");
        rooms.push(RoomListEntry { room_id, radius });
    }

    pub fn seed_user(&self, user: SimUser) {
        let mut users = self.users.write().expect("user map lock poisoned");
        users.insert(user.user_id, user);
    }

    pub fn layout_calls(&self) -> u64 {
        self.layout_calls.load(Ordering::SeqCst)
    }

    pub fn terrain_calls(&self) -> u64 {
        self.terrain_calls.load(Ordering::SeqCst)
    }

    fn room_layout(&self, radius: u32) -> Result<Vec<Axial>, QueenError> {
        self.layout_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(layout) = self.layouts.read().expect("layout map lock poisoned").get(&radius)
        {
            return Ok(layout.clone());
        }

        let layout = hexagon_layout(radius);
        self.layouts
            .write()
            .expect("layout map lock poisoned")
            .insert(radius, layout.clone());
        Ok(layout)
    }

    fn room_terrain(&self, room_id: RoomId) -> Result<Vec<i32>, QueenError> {
        self.terrain_calls.fetch_add(1, Ordering::SeqCst);
        self.terrain
            .read()
            .expect("terrain map lock poisoned")
            .get(&room_id)
            .cloned()
            .ok_or(QueenError::NotFound)
    }

    fn room_list(&self) -> Result<Vec<RoomListEntry>, QueenError> {
        Ok(self.rooms.read().expect("room list lock poisoned").clone())
    }

    fn sim_users(&self) -> Result<Vec<SimUser>, QueenError> {
        let users = self.users.read().expect("user map lock poisoned");
        Ok(users.values().cloned().collect())
    }

    fn sim_user(&self, user_id: Uuid) -> Result<SimUser, QueenError> {
        self.users
            .read()
            .expect("user map lock poisoned")
            .get(&user_id)
            .cloned()
            .ok_or(QueenError::NotFound)
    }

    fn register_user(&self, user_id: Uuid, level: u32) -> Result<(), QueenError> {
        self.seed_user(SimUser { user_id, level });
        Ok(())
    }
}

/// Axial coordinates of a hexagonal room of the given radius, in
/// row-major (q, then r) order.
fn hexagon_layout(radius: u32) -> Vec<Axial> {
    let radius = radius as i32;
    let mut positions = Vec::new();
    for q in -radius..=radius {
        let r_min = (-radius).max(-q - radius);
        let r_max = radius.min(-q + radius);
        for r in r_min..=r_max {
            positions.push(Axial { q, r });
        }
    }
    positions
}
