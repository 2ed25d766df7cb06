//! Connected-client bookkeeping for the world object stream.
//!
//! The registry maps connection ids to their current room subscription and
//! the bounded outbound channel feeding their socket. The broadcast path
//! reads a point-in-time snapshot of the table and never holds the lock
//! across an await.

use std::{
    collections::HashMap,
    sync::RwLock,
};

use tokio::sync::mpsc;
use uuid::Uuid;

use hexgate_common::{protocol::ws::WsMessage, room::RoomId};

/// Capacity of each client's outbound frame buffer. A client that cannot
/// drain this many frames is considered dead and dropped by the dispatcher.
pub const OUTBOUND_BUFFER_FRAMES: usize = 128;

#[derive(Debug, Clone)]
struct ClientRecord {
    room: Option<RoomId>,
    last_seen: i64,
    outbound: mpsc::Sender<WsMessage>,
}

/// One entry of a broadcast snapshot.
#[derive(Debug, Clone)]
pub struct BroadcastTarget {
    pub client_id: Uuid,
    pub room: Option<RoomId>,
    pub outbound: mpsc::Sender<WsMessage>,
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<Uuid, ClientRecord>>,
}

impl ClientRegistry {
    pub fn register(
        &self,
        client_id: Uuid,
        room: Option<RoomId>,
        last_seen: i64,
        outbound: mpsc::Sender<WsMessage>,
    ) {
        let mut clients = self.clients.write().expect("client registry lock poisoned");
        clients.insert(client_id, ClientRecord { room, last_seen, outbound });
    }

    /// Removing an absent client is a no-op; disconnect paths race with
    /// the broadcast sweep.
    pub fn unregister(&self, client_id: Uuid) {
        let mut clients = self.clients.write().expect("client registry lock poisoned");
        clients.remove(&client_id);
    }

    pub fn snapshot(&self) -> Vec<BroadcastTarget> {
        let clients = self.clients.read().expect("client registry lock poisoned");
        clients
            .iter()
            .map(|(client_id, record)| BroadcastTarget {
                client_id: *client_id,
                room: record.room,
                outbound: record.outbound.clone(),
            })
            .collect()
    }

    pub fn record_delivery(&self, client_id: Uuid, world_time: i64) {
        let mut clients = self.clients.write().expect("client registry lock poisoned");
        if let Some(record) = clients.get_mut(&client_id) {
            record.last_seen = world_time;
        }
    }

    pub fn last_seen(&self, client_id: Uuid) -> Option<i64> {
        let clients = self.clients.read().expect("client registry lock poisoned");
        clients.get(&client_id).map(|record| record.last_seen)
    }

    pub fn len(&self) -> usize {
        self.clients.read().expect("client registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, client_id: Uuid) -> bool {
        self.clients.read().expect("client registry lock poisoned").contains_key(&client_id)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use hexgate_common::room::RoomId;

    use super::{ClientRegistry, OUTBOUND_BUFFER_FRAMES};

    #[test]
    fn register_and_snapshot_round_trip() {
        let registry = ClientRegistry::default();
        let client_id = Uuid::new_v4();
        let (sender, _receiver) = mpsc::channel(OUTBOUND_BUFFER_FRAMES);

        registry.register(client_id, Some(RoomId::new(1, 2)), -1, sender);

        let targets = registry.snapshot();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].client_id, client_id);
        assert_eq!(targets[0].room, Some(RoomId::new(1, 2)));
    }

    #[test]
    fn re_register_replaces_the_previous_record() {
        let registry = ClientRegistry::default();
        let client_id = Uuid::new_v4();
        let (sender, _receiver) = mpsc::channel(OUTBOUND_BUFFER_FRAMES);

        registry.register(client_id, None, -1, sender.clone());
        registry.register(client_id, Some(RoomId::new(3, 4)), 17, sender);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].room, Some(RoomId::new(3, 4)));
        assert_eq!(registry.last_seen(client_id), Some(17));
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ClientRegistry::default();
        let client_id = Uuid::new_v4();
        let (sender, _receiver) = mpsc::channel(OUTBOUND_BUFFER_FRAMES);

        registry.register(client_id, None, -1, sender);
        registry.unregister(client_id);
        registry.unregister(client_id);

        assert!(registry.is_empty());
        assert!(!registry.contains(client_id));
    }

    #[test]
    fn record_delivery_updates_last_seen() {
        let registry = ClientRegistry::default();
        let client_id = Uuid::new_v4();
        let (sender, _receiver) = mpsc::channel(OUTBOUND_BUFFER_FRAMES);

        registry.register(client_id, Some(RoomId::new(0, 0)), -1, sender);
        registry.record_delivery(client_id, 42);

        assert_eq!(registry.last_seen(client_id), Some(42));
        // Deliveries to unknown clients are dropped silently.
        registry.record_delivery(Uuid::new_v4(), 99);
    }
}
