//! Live change notifications, fanned out to every connected browser.

use crate::models::{Location, MediaItem, MediaType, RegistryItem};
use log::debug;
use serde_json::{json, Value};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    PhotoUpdated {
        id: String,
        url: String,
        location: Location,
        media_type: MediaType,
    },
    PhotoDeleted {
        id: String,
        url: String,
    },
    RegistryItemAdded {
        item: String,
        is_bought: bool,
    },
    RegistryUpdated {
        item: String,
        is_bought: bool,
    },
    RegistryItemDeleted {
        item: String,
    },
}

impl LiveEvent {
    pub fn photo_updated(item: &MediaItem) -> Self {
        LiveEvent::PhotoUpdated {
            id: item.id.clone(),
            url: item.url.clone(),
            location: item.location,
            media_type: item.media_type,
        }
    }

    pub fn registry_added(item: &RegistryItem) -> Self {
        LiveEvent::RegistryItemAdded {
            item: item.item.clone(),
            is_bought: item.is_bought,
        }
    }

    pub fn registry_updated(item: &RegistryItem) -> Self {
        LiveEvent::RegistryUpdated {
            item: item.item.clone(),
            is_bought: item.is_bought,
        }
    }

    /// SSE event name the front end listens for.
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::PhotoUpdated { .. } => "photo-updated",
            LiveEvent::PhotoDeleted { .. } => "photo-deleted",
            LiveEvent::RegistryItemAdded { .. } => "registry-item-added",
            LiveEvent::RegistryUpdated { .. } => "registry-updated",
            LiveEvent::RegistryItemDeleted { .. } => "registry-item-deleted",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            LiveEvent::PhotoUpdated {
                id,
                url,
                location,
                media_type,
            } => json!({
                "_id": id,
                "url": url,
                "location": location,
                "mediaType": media_type,
            }),
            LiveEvent::PhotoDeleted { id, url } => json!({ "photoId": id, "url": url }),
            LiveEvent::RegistryItemAdded { item, is_bought }
            | LiveEvent::RegistryUpdated { item, is_bought } => {
                json!({ "key": item, "isBought": is_bought })
            }
            LiveEvent::RegistryItemDeleted { item } => json!(item),
        }
    }
}

/// Broadcast channel shared through Rocket's managed state.
pub struct Notifier {
    sender: broadcast::Sender<LiveEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }

    /// Sends `event` to every subscriber. Nobody listening is not an error.
    pub fn publish(&self, event: LiveEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => debug!("Sent {} to {} listeners", name, receivers),
            Err(_) => debug!("No listeners for {}", name),
        }
    }
}
