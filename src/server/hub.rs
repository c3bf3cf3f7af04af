//! Change notifications between WebSocket sessions.
//!
//! Sessions that have opened a list subscribe to it; after a batch lands on
//! a list every other subscriber is told to re-read it. Notifications carry
//! no item data, so a lagging receiver only needs one re-read to catch up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};

/// Buffered notifications per list before slow receivers start lagging.
const CHANNEL_CAPACITY: usize = 16;

/// Session id used for changes that did not come from a WebSocket session.
pub const NO_SESSION: u64 = 0;

/// A list's items changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListChanged {
    pub list_id: String,
    /// Session whose batch caused the change.
    pub origin: u64,
}

/// Tracks subscribers per list id.
pub struct ListHub {
    channels: RwLock<HashMap<String, broadcast::Sender<ListChanged>>>,
    next_session: AtomicU64,
}

impl ListHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_session: AtomicU64::new(NO_SESSION + 1),
        }
    }

    /// Allocates an id for a new session.
    pub fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Subscribes to changes of one list.
    pub async fn subscribe(&self, list_id: &str) -> broadcast::Receiver<ListChanged> {
        let mut channels = self.channels.write().await;

        // Drop channels whose sessions have all gone away
        channels.retain(|_, sender| sender.receiver_count() > 0);

        if let Some(sender) = channels.get(list_id) {
            sender.subscribe()
        } else {
            let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
            channels.insert(list_id.to_string(), sender);
            receiver
        }
    }

    /// Notifies every subscriber of `list_id`.
    pub async fn broadcast(&self, list_id: &str, origin: u64) {
        let channels = self.channels.read().await;

        if let Some(sender) = channels.get(list_id) {
            // Ignore send errors (no subscribers)
            let _ = sender.send(ListChanged {
                list_id: list_id.to_string(),
                origin,
            });
        }
    }

    #[cfg(test)]
    async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for ListHub {
    fn default() -> Self {
        Self::new()
    }
}
