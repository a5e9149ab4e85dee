use std::sync::Arc;
use tokio::sync::broadcast;

/// Told which items changed after each view call. Callback IDs are opaque;
/// the listener only forwards them.
pub trait UpdateListener: Send + Sync {
    fn items_updated(&self, callback_ids: &[String]);

    fn item_updated(&self, callback_id: &str) {
        self.items_updated(&[callback_id.to_string()]);
    }
}

/// Fans callback IDs out to any number of in-process receivers.
pub struct BroadcastListener {
    tx: broadcast::Sender<String>,
}

impl BroadcastListener {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity);
        Arc::new(Self { tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl UpdateListener for BroadcastListener {
    fn items_updated(&self, callback_ids: &[String]) {
        for id in callback_ids {
            // no receivers is fine
            let _ = self.tx.send(id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_every_id() {
        let listener = BroadcastListener::new(16);
        let mut rx = listener.subscribe();
        listener.items_updated(&["a".to_string(), "b".to_string()]);
        listener.item_updated("c");
        assert_eq!(rx.recv().await.unwrap(), "a");
        assert_eq!(rx.recv().await.unwrap(), "b");
        assert_eq!(rx.recv().await.unwrap(), "c");
    }

    #[test]
    fn test_send_without_receivers() {
        let listener = BroadcastListener::new(4);
        listener.item_updated("nobody");
        assert_eq!(listener.receiver_count(), 0);
    }
}
