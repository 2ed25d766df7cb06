//! Shared world state and the broadcast fan-out.

pub mod feed;
pub mod snapshot;
pub mod terrain;

use std::sync::{Arc, RwLock};

use tracing::debug;

use hexgate_common::protocol::ws::WsMessage;

use crate::{
    metrics,
    ws::registry::ClientRegistry,
};

pub use snapshot::WorldSnapshot;

/// The latest world snapshot plus the clients subscribed to it.
pub struct WorldState {
    registry: Arc<ClientRegistry>,
    current: RwLock<Option<Arc<WorldSnapshot>>>,
}

impl WorldState {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry, current: RwLock::new(None) }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn current(&self) -> Option<Arc<WorldSnapshot>> {
        self.current.read().expect("world state lock poisoned").clone()
    }

    /// Install a new snapshot and fan it out to subscribed clients on a
    /// separate task. The feed loop is never blocked by slow consumers.
    pub fn publish(self: &Arc<Self>, snapshot: WorldSnapshot) {
        {
            let mut current = self.current.write().expect("world state lock poisoned");
            *current = Some(Arc::new(snapshot));
        }

        let state = Arc::clone(self);
        tokio::spawn(async move {
            state.broadcast();
        });
    }

    /// One fan-out pass over the registry. Frames go through each client's
    /// bounded outbound channel with `try_send`; a full or closed channel
    /// marks the client dead and it is swept from the registry afterwards.
    fn broadcast(&self) {
        let Some(snapshot) = self.current() else {
            return;
        };

        let mut dead_clients = Vec::new();
        for target in self.registry.snapshot() {
            let Some(room) = target.room else {
                continue;
            };

            let frame = WsMessage::Entities { entities: snapshot.entities_in_room(room) };
            match target.outbound.try_send(frame) {
                Ok(()) => {
                    self.registry.record_delivery(target.client_id, snapshot.time);
                    metrics::increment_entity_frames_sent();
                }
                Err(_) => dead_clients.push(target.client_id),
            }
        }

        for client_id in dead_clients {
            debug!(%client_id, "dropping client with full or closed outbound channel");
            self.registry.unregister(client_id);
            metrics::increment_send_failures();
        }

        metrics::increment_broadcast_passes();
    }
}
