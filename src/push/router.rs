use super::listener::UpdateListener;
use super::message::{ClientMessage, PushMessage};
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A push client's subscription information.
pub struct ClientSubscription {
    /// Callback IDs the client wants to hear about.
    pub callback_ids: HashSet<String>,
    /// Channel to send messages to the client.
    pub tx: mpsc::UnboundedSender<String>,
}

/// Routes view notifications to the clients subscribed to each callback ID.
pub struct UpdateRouter {
    /// Client subscriptions keyed by client ID.
    pub clients: DashMap<Uuid, ClientSubscription>,
    /// Callback ID -> set of client IDs.
    rooms: DashMap<String, HashSet<Uuid>>,
}

impl UpdateRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new client.
    pub fn register(&self, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let client_id = Uuid::new_v4();
        self.clients.insert(
            client_id,
            ClientSubscription {
                callback_ids: HashSet::new(),
                tx,
            },
        );
        debug!("Push client {} registered", client_id);
        client_id
    }

    /// Unregister a client and remove it from all rooms.
    pub fn unregister(&self, client_id: Uuid) {
        if let Some((_, subscription)) = self.clients.remove(&client_id) {
            for id in subscription.callback_ids {
                self.leave_room(&id, client_id);
            }
        }
    }

    fn leave_room(&self, callback_id: &str, client_id: Uuid) {
        if let Some(mut room) = self.rooms.get_mut(callback_id) {
            room.remove(&client_id);
        }
        self.rooms.remove_if(callback_id, |_, room| room.is_empty());
    }

    /// Returns the IDs that were newly subscribed.
    pub fn subscribe(&self, client_id: Uuid, callback_ids: &[String]) -> Vec<String> {
        let mut subscribed = Vec::new();

        if let Some(mut client) = self.clients.get_mut(&client_id) {
            for id in callback_ids {
                if client.callback_ids.insert(id.clone()) {
                    subscribed.push(id.clone());
                    self.rooms.entry(id.clone()).or_default().insert(client_id);
                }
            }
        }

        subscribed
    }

    /// Returns the IDs that were removed.
    pub fn unsubscribe(&self, client_id: Uuid, callback_ids: &[String]) -> Vec<String> {
        let mut unsubscribed = Vec::new();

        if let Some(mut client) = self.clients.get_mut(&client_id) {
            for id in callback_ids {
                if client.callback_ids.remove(id) {
                    unsubscribed.push(id.clone());
                    self.leave_room(id, client_id);
                }
            }
        }

        unsubscribed
    }

    /// Apply a client's JSON request and reply on its channel.
    pub fn handle_message(&self, client_id: Uuid, text: &str) {
        let response = match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Subscribe { callback_ids }) => PushMessage::Subscribed {
                callback_ids: self.subscribe(client_id, &callback_ids),
            },
            Ok(ClientMessage::Unsubscribe { callback_ids }) => PushMessage::Unsubscribed {
                callback_ids: self.unsubscribe(client_id, &callback_ids),
            },
            Err(e) => {
                warn!("Invalid push message from {}: {}", client_id, e);
                PushMessage::Error {
                    error: format!("Invalid message: {}", e),
                }
            }
        };
        self.send(client_id, &response);
    }

    fn send(&self, client_id: Uuid, message: &PushMessage) {
        if let (Some(client), Some(json)) = (self.clients.get(&client_id), message.to_json()) {
            let _ = client.tx.send(json);
        }
    }

    /// Clients subscribed to a callback ID.
    pub fn subscribers(&self, callback_id: &str) -> Vec<Uuid> {
        self.rooms
            .get(callback_id)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get the number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Get the number of callback IDs with at least one subscriber.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for UpdateRouter {
    fn default() -> Self {
        Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
        }
    }
}

impl UpdateListener for UpdateRouter {
    /// Each subscribed client gets one message listing the IDs it cares about.
    fn items_updated(&self, callback_ids: &[String]) {
        let mut per_client: HashMap<Uuid, BTreeSet<String>> = HashMap::new();
        for id in callback_ids {
            for client_id in self.subscribers(id) {
                per_client.entry(client_id).or_default().insert(id.clone());
            }
        }
        for (client_id, ids) in per_client {
            self.send(
                client_id,
                &PushMessage::Updated {
                    callback_ids: ids.into_iter().collect(),
                },
            );
        }
    }
}
