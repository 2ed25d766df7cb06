//! Read-only REST surface over the simulation's world data.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use hexgate_common::world::{RoomListEntry, SimUser, TileKind};

use crate::{
    error::{ErrorCode, GatewayError},
    queen::{QueenBackend, QueenError},
    world::terrain::TerrainCache,
};

#[derive(Clone)]
pub struct WorldApiState {
    pub queen: QueenBackend,
    pub terrain: Arc<TerrainCache>,
}

pub fn router(state: WorldApiState) -> Router {
    Router::new()
        .route("/v1/world/rooms", get(list_rooms))
        .route("/v1/world/room-terrain-layout", get(room_terrain_layout))
        .route("/v1/world/tile-enum", get(tile_enum))
        .route("/v1/world/users", get(list_sim_users))
        .route("/v1/world/user", get(get_sim_user))
        .with_state(state)
}

fn map_queen_error(error: QueenError) -> GatewayError {
    match error {
        QueenError::NotFound => GatewayError::from_code(ErrorCode::NotFound),
        QueenError::Call(status) => {
            error!(%status, "queen call failed");
            GatewayError::from_code(ErrorCode::QueenUnavailable)
        }
    }
}

async fn list_rooms(
    State(state): State<WorldApiState>,
) -> Result<Json<Vec<RoomListEntry>>, GatewayError> {
    let rooms = state.queen.room_list().await.map_err(map_queen_error)?;
    Ok(Json(rooms))
}

#[derive(Debug, Deserialize)]
struct LayoutQuery {
    radius: u32,
}

async fn room_terrain_layout(
    State(state): State<WorldApiState>,
    Query(query): Query<LayoutQuery>,
) -> Result<Json<Vec<(i32, i32)>>, GatewayError> {
    let layout = state.terrain.layout(query.radius).await.map_err(map_queen_error)?;
    Ok(Json(layout.iter().map(|pos| (pos.q, pos.r)).collect()))
}

async fn tile_enum() -> Json<HashMap<i32, &'static str>> {
    Json(TileKind::ALL.into_iter().map(|tile| (tile.index(), tile.as_str())).collect())
}

async fn list_sim_users(
    State(state): State<WorldApiState>,
) -> Result<Json<Vec<SimUser>>, GatewayError> {
    let users = state.queen.sim_users().await.map_err(map_queen_error)?;
    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
struct SimUserQuery {
    user_id: Uuid,
}

async fn get_sim_user(
    State(state): State<WorldApiState>,
    Query(query): Query<SimUserQuery>,
) -> Result<Json<SimUser>, GatewayError> {
    let user = state.queen.sim_user(query.user_id).await.map_err(map_queen_error)?;
    Ok(Json(user))
}
