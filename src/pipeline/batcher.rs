//! Records successful uploads in one batch write.

use super::UploadContext;
use crate::models::{MediaItem, MediaType, NewMediaItem};
use crate::store::MediaStore;
use chrono::Utc;
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;

/// An uploaded object waiting to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDraft {
    /// 0-based position of the file in the request.
    pub position: usize,
    pub url: String,
    pub media_type: MediaType,
    pub file_name: String,
    pub format: String,
}

/// A remote object with no metadata record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedObject {
    #[serde(skip)]
    pub position: usize,
    pub file_name: String,
    pub url: String,
}

/// The uploads succeeded but their metadata could not be written. The listed
/// objects exist remotely and need manual reconciliation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("uploaded files could not be recorded: {reason}")]
pub struct BatchPersistError {
    pub reason: String,
    pub orphaned: Vec<OrphanedObject>,
}

pub struct MetadataBatcher {
    store: Arc<dyn MediaStore>,
}

impl MetadataBatcher {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self { store }
    }

    /// Persists `drafts` in a single store call. An empty list is a no-op.
    pub async fn persist(
        &self,
        drafts: Vec<MediaDraft>,
        context: &UploadContext,
    ) -> Result<Vec<MediaItem>, BatchPersistError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let uploaded_at = Utc::now();
        let records = drafts
            .iter()
            .map(|draft| NewMediaItem {
                url: draft.url.clone(),
                media_type: draft.media_type,
                location: context.location,
                uploaded_at,
                uploaded_by: context.username.clone(),
            })
            .collect();

        match self.store.insert_media(records).await {
            Ok(items) => {
                info!("Recorded {} media items", items.len());
                Ok(items)
            }
            Err(e) => {
                let orphaned: Vec<OrphanedObject> = drafts
                    .into_iter()
                    .map(|draft| OrphanedObject {
                        position: draft.position,
                        file_name: draft.file_name,
                        url: draft.url,
                    })
                    .collect();
                error!(
                    "Failed to record {} uploaded media items, they are now orphaned: {}",
                    orphaned.len(),
                    e
                );
                for object in &orphaned {
                    error!("Orphaned object {} ({})", object.url, object.file_name);
                }
                Err(BatchPersistError {
                    reason: e.to_string(),
                    orphaned,
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Location;
    use crate::store::{Collections, Database, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A store whose writes always fail, counting attempts.
    #[derive(Default)]
    pub(crate) struct UnreachableStore {
        pub(crate) calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaStore for UnreachableStore {
        async fn insert_media(
            &self,
            _items: Vec<NewMediaItem>,
        ) -> Result<Vec<MediaItem>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "metadata store unreachable",
            )))
        }
    }

    fn context() -> UploadContext {
        UploadContext::new(Location::Australia, Some("Ana".to_string()))
    }

    fn draft(n: usize) -> MediaDraft {
        MediaDraft {
            position: n,
            url: format!("/media/{}.jpg", n),
            media_type: MediaType::Image,
            file_name: format!("{}.jpg", n),
            format: "jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_does_not_touch_store() {
        let store = Arc::new(UnreachableStore::default());
        let batcher = MetadataBatcher::new(store.clone());

        assert_eq!(batcher.persist(Vec::new(), &context()).await, Ok(Vec::new()));
        assert_eq!(batcher.persist(Vec::new(), &context()).await, Ok(Vec::new()));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_persist_stamps_context() {
        let db = Arc::new(Database::in_memory(Collections::default()));
        let batcher = MetadataBatcher::new(db.clone());

        let items = batcher.persist(vec![draft(1), draft(2)], &context()).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.location == Location::Australia));
        assert!(items.iter().all(|i| i.uploaded_by == "Ana"));
        assert_eq!(db.read(|c| c.media.len()).await, 2);
    }

    #[tokio::test]
    async fn test_failed_write_names_every_orphan() {
        let store = Arc::new(UnreachableStore::default());
        let batcher = MetadataBatcher::new(store.clone());

        let drafts: Vec<MediaDraft> = (0..10).map(draft).collect();
        let err = batcher.persist(drafts, &context()).await.unwrap_err();

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.orphaned.len(), 10);
        assert_eq!(err.orphaned[9].url, "/media/9.jpg");
        assert_eq!(err.orphaned[9].position, 9);
        assert!(err.reason.contains("unreachable"));
    }
}
