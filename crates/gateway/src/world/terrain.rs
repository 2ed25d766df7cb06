//! Memoizing reads of room layouts and terrain from the simulation server.
//!
//! Terrain is immutable for the lifetime of a world, so successful reads
//! are cached forever. The cache is best-effort: concurrent misses for the
//! same key may each hit the backend once, and the last write wins. Errors
//! are never cached.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use hexgate_common::room::{Axial, RoomId};

use crate::queen::{QueenBackend, QueenError};

pub struct TerrainCache {
    queen: QueenBackend,
    layouts: RwLock<HashMap<u32, Arc<Vec<Axial>>>>,
    rooms: RwLock<HashMap<RoomId, Arc<Vec<i32>>>>,
}

impl TerrainCache {
    pub fn new(queen: QueenBackend) -> Self {
        Self {
            queen,
            layouts: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub async fn layout(&self, radius: u32) -> Result<Arc<Vec<Axial>>, QueenError> {
        if let Some(layout) = self.layouts.read().expect("layout cache lock poisoned").get(&radius)
        {
            return Ok(Arc::clone(layout));
        }

        let layout = Arc::new(self.queen.room_layout(radius).await?);
        self.layouts
            .write()
            .expect("layout cache lock poisoned")
            .insert(radius, Arc::clone(&layout));
        Ok(layout)
    }

    pub async fn room_terrain(&self, room_id: RoomId) -> Result<Arc<Vec<i32>>, QueenError> {
        if let Some(tiles) = self.rooms.read().expect("terrain cache lock poisoned").get(&room_id)
        {
            return Ok(Arc::clone(tiles));
        }

        let tiles = Arc::new(self.queen.room_terrain(room_id).await?);
        self.rooms
            .write()
            .expect("terrain cache lock poisoned")
            .insert(room_id, Arc::clone(&tiles));
        Ok(tiles)
    }
}
