//! Wire messages and clients for the simulation server's gRPC surface.
//!
//! The messages are written out by hand with prost derives and the clients
//! drive `tonic::client::Grpc` directly, so no protoc invocation is needed
//! at build time.

use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UuidMsg {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Axial {
    #[prost(sint32, tag = "1")]
    pub q: i32,
    #[prost(sint32, tag = "2")]
    pub r: i32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GetRoomLayoutMsg {
    #[prost(uint32, tag = "1")]
    pub radius: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RoomLayout {
    #[prost(message, repeated, tag = "1")]
    pub positions: Vec<Axial>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RoomTerrain {
    #[prost(message, optional, tag = "1")]
    pub room_id: Option<Axial>,
    /// Tile kinds in layout order.
    #[prost(int32, repeated, tag = "2")]
    pub tiles: Vec<i32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Room {
    #[prost(message, optional, tag = "1")]
    pub room_id: Option<Axial>,
    #[prost(uint32, tag = "2")]
    pub radius: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RoomList {
    #[prost(message, repeated, tag = "1")]
    pub rooms: Vec<Room>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Bot {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, optional, tag = "2")]
    pub pos: Option<Axial>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Structure {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, optional, tag = "2")]
    pub pos: Option<Axial>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Resource {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, optional, tag = "2")]
    pub pos: Option<Axial>,
}

/// One room's worth of entities at a given simulation tick.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RoomEntities {
    #[prost(message, optional, tag = "1")]
    pub room_id: Option<Axial>,
    #[prost(int64, tag = "2")]
    pub world_time: i64,
    #[prost(message, repeated, tag = "3")]
    pub bots: Vec<Bot>,
    #[prost(message, repeated, tag = "4")]
    pub structures: Vec<Structure>,
    #[prost(message, repeated, tag = "5")]
    pub resources: Vec<Resource>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserInfo {
    #[prost(message, optional, tag = "1")]
    pub user_id: Option<UuidMsg>,
    #[prost(uint32, tag = "2")]
    pub level: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterUserMsg {
    #[prost(message, optional, tag = "1")]
    pub user_id: Option<UuidMsg>,
    #[prost(uint32, tag = "2")]
    pub level: u32,
}

fn not_ready(error: tonic::transport::Error) -> tonic::Status {
    tonic::Status::unknown(format!("queen channel is not ready: {error}"))
}

#[derive(Debug, Clone)]
pub struct WorldClient {
    inner: tonic::client::Grpc<Channel>,
}

impl WorldClient {
    pub fn new(channel: Channel) -> Self {
        Self { inner: tonic::client::Grpc::new(channel) }
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner.ready().await.map_err(not_ready)
    }

    pub async fn get_room_layout(
        &mut self,
        request: GetRoomLayoutMsg,
    ) -> Result<tonic::Response<RoomLayout>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<GetRoomLayoutMsg, RoomLayout> = ProstCodec::default();
        let path = PathAndQuery::from_static("/queen.World/GetRoomLayout");
        self.inner.unary(tonic::Request::new(request), path, codec).await
    }

    pub async fn get_room_terrain(
        &mut self,
        request: Axial,
    ) -> Result<tonic::Response<RoomTerrain>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<Axial, RoomTerrain> = ProstCodec::default();
        let path = PathAndQuery::from_static("/queen.World/GetRoomTerrain");
        self.inner.unary(tonic::Request::new(request), path, codec).await
    }

    pub async fn get_room_list(
        &mut self,
        request: Empty,
    ) -> Result<tonic::Response<RoomList>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<Empty, RoomList> = ProstCodec::default();
        let path = PathAndQuery::from_static("/queen.World/GetRoomList");
        self.inner.unary(tonic::Request::new(request), path, codec).await
    }

    /// Server-streaming feed of per-room entity frames, one batch per tick.
    pub async fn entities(
        &mut self,
        request: Empty,
    ) -> Result<tonic::Response<tonic::Streaming<RoomEntities>>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<Empty, RoomEntities> = ProstCodec::default();
        let path = PathAndQuery::from_static("/queen.World/Entities");
        self.inner.server_streaming(tonic::Request::new(request), path, codec).await
    }
}

#[derive(Debug, Clone)]
pub struct UsersClient {
    inner: tonic::client::Grpc<Channel>,
}

impl UsersClient {
    pub fn new(channel: Channel) -> Self {
        Self { inner: tonic::client::Grpc::new(channel) }
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner.ready().await.map_err(not_ready)
    }

    pub async fn get_user_info(
        &mut self,
        request: UuidMsg,
    ) -> Result<tonic::Response<UserInfo>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<UuidMsg, UserInfo> = ProstCodec::default();
        let path = PathAndQuery::from_static("/queen.Users/GetUserInfo");
        self.inner.unary(tonic::Request::new(request), path, codec).await
    }

    pub async fn list_users(
        &mut self,
        request: Empty,
    ) -> Result<tonic::Response<tonic::Streaming<UserInfo>>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<Empty, UserInfo> = ProstCodec::default();
        let path = PathAndQuery::from_static("/queen.Users/ListUsers");
        self.inner.server_streaming(tonic::Request::new(request), path, codec).await
    }
}

#[derive(Debug, Clone)]
pub struct CommandClient {
    inner: tonic::client::Grpc<Channel>,
}

impl CommandClient {
    pub fn new(channel: Channel) -> Self {
        Self { inner: tonic::client::Grpc::new(channel) }
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner.ready().await.map_err(not_ready)
    }

    pub async fn register_user(
        &mut self,
        request: RegisterUserMsg,
    ) -> Result<tonic::Response<Empty>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<RegisterUserMsg, Empty> = ProstCodec::default();
        let path = PathAndQuery::from_static("/queen.Command/RegisterUser");
        self.inner.unary(tonic::Request::new(request), path, codec).await
    }
}

#[derive(Debug, Clone)]
pub struct HealthClient {
    inner: tonic::client::Grpc<Channel>,
}

impl HealthClient {
    pub fn new(channel: Channel) -> Self {
        Self { inner: tonic::client::Grpc::new(channel) }
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner.ready().await.map_err(not_ready)
    }

    pub async fn ping(
        &mut self,
        request: Empty,
    ) -> Result<tonic::Response<Empty>, tonic::Status> {
        self.ready().await?;
        let codec: ProstCodec<Empty, Empty> = ProstCodec::default();
        let path = PathAndQuery::from_static("/queen.Health/Ping");
        self.inner.unary(tonic::Request::new(request), path, codec).await
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::{Axial, RoomEntities, RoomTerrain};

    #[test]
    fn room_terrain_round_trips_through_prost() {
        let terrain = RoomTerrain {
            room_id: Some(Axial { q: -3, r: 7 }),
            tiles: vec![0, 1, 1, 2, 3],
        };

        let mut buffer = Vec::new();
        terrain.encode(&mut buffer).expect("encoding into a Vec cannot fail");
        let decoded = RoomTerrain::decode(buffer.as_slice()).expect("buffer should decode");

        assert_eq!(decoded, terrain);
    }

    #[test]
    fn room_entities_defaults_are_empty() {
        let frame = RoomEntities::default();
        assert!(frame.room_id.is_none());
        assert_eq!(frame.world_time, 0);
        assert!(frame.bots.is_empty());
        assert!(frame.structures.is_empty());
        assert!(frame.resources.is_empty());
    }
}
