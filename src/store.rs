//! JSON document store.
//!
//! All collections live in one document that is loaded at startup and
//! rewritten atomically on every change. A failed write leaves both the file
//! and the in-memory state untouched.

use crate::models::{Event, Invite, MediaItem, NewMediaItem, RegistryItem, Vendor};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("document store serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Every collection of the site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collections {
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default)]
    pub invites: Vec<Invite>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub registry: Vec<RegistryItem>,
    #[serde(default)]
    pub vendors: Vec<Vendor>,
}

pub struct Database {
    path: Option<PathBuf>,
    data: Mutex<Collections>,
}

impl Database {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = if fs::try_exists(&path).await? {
            let contents = fs::read_to_string(&path).await?;
            serde_json::from_str(&contents)?
        } else {
            info!("No document store at {}, starting fresh", path.display());
            Collections::default()
        };

        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(data: Collections) -> Self {
        Self {
            path: None,
            data: Mutex::new(data),
        }
    }

    pub async fn read<R>(&self, f: impl FnOnce(&Collections) -> R) -> R {
        let data = self.data.lock().await;
        f(&data)
    }

    /// Applies `f` to a copy of the collections and commits it once it is on disk.
    pub async fn write<R>(&self, f: impl FnOnce(&mut Collections) -> R) -> Result<R, StoreError> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let result = f(&mut next);

        if let Some(path) = &self.path {
            save_to_file(path, &next).await?;
        }

        *data = next;
        Ok(result)
    }

    /// Like [`Database::write`], but nothing is saved or committed when `f` fails.
    pub async fn try_write<R, E>(
        &self,
        f: impl FnOnce(&mut Collections) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let result = f(&mut next)?;

        if let Some(path) = &self.path {
            save_to_file(path, &next).await.map_err(E::from)?;
        }

        *data = next;
        Ok(result)
    }
}

/// Writes to a temp file first, then renames over the target.
async fn save_to_file(path: &Path, data: &Collections) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(data)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let temp_file = path.with_extension("json.tmp");
    fs::write(&temp_file, &json).await?;

    if let Err(e) = fs::rename(&temp_file, path).await {
        warn!("Failed to rename document store into place: {}", e);
        let _ = fs::remove_file(&temp_file).await;
        return Err(e.into());
    }

    Ok(())
}

/// Batch insertion of media records; the seam the upload pipeline persists through.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn insert_media(&self, items: Vec<NewMediaItem>) -> Result<Vec<MediaItem>, StoreError>;
}

#[async_trait]
impl MediaStore for Database {
    async fn insert_media(&self, items: Vec<NewMediaItem>) -> Result<Vec<MediaItem>, StoreError> {
        let records: Vec<MediaItem> = items
            .into_iter()
            .map(|item| MediaItem {
                id: crate::models::new_id(),
                url: item.url,
                media_type: item.media_type,
                location: item.location,
                uploaded_at: item.uploaded_at,
                uploaded_by: item.uploaded_by,
            })
            .collect();

        let inserted = records.clone();
        self.write(move |c| c.media.extend(records)).await?;
        Ok(inserted)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Location, MediaType};
    use chrono::Utc;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path =
            std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), nanos));
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    fn new_item(url: &str) -> NewMediaItem {
        NewMediaItem {
            url: url.to_string(),
            media_type: MediaType::Image,
            location: Location::Canada,
            uploaded_at: Utc::now(),
            uploaded_by: "Guest".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_media_survives_reopen() {
        let base = unique_temp_dir("wedding_store");
        let path = base.join("nested").join("wedding.json");

        let db = Database::open(&path).await.unwrap();
        let inserted = db
            .insert_media(vec![new_item("/media/a.jpg"), new_item("/media/b.jpg")])
            .await
            .unwrap();
        assert_eq!(inserted.len(), 2);
        assert_ne!(inserted[0].id, inserted[1].id);

        let reopened = Database::open(&path).await.unwrap();
        let urls = reopened
            .read(|c| c.media.iter().map(|m| m.url.clone()).collect::<Vec<_>>())
            .await;
        assert_eq!(urls, vec!["/media/a.jpg", "/media/b.jpg"]);
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(base).unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_untouched() {
        let base = unique_temp_dir("wedding_store_fail");
        // A directory where the file should be makes the rename fail.
        let path = base.join("wedding.json");
        std::fs::create_dir_all(path.join("blocker")).unwrap();

        let db = Database {
            path: Some(path),
            data: Mutex::new(Collections::default()),
        };
        let result = db.insert_media(vec![new_item("/media/a.jpg")]).await;
        assert!(result.is_err());
        assert_eq!(db.read(|c| c.media.len()).await, 0);

        std::fs::remove_dir_all(base).unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_store_write_and_read() {
        let db = Database::in_memory(Collections::default());
        db.write(|c| {
            c.registry.push(RegistryItem {
                id: "1".into(),
                item: "Toaster".into(),
                is_bought: false,
            })
        })
        .await
        .unwrap();
        assert_eq!(db.read(|c| c.registry.len()).await, 1);
    }

    #[tokio::test]
    async fn test_try_write_discards_failed_changes() {
        let base = unique_temp_dir("wedding_store_try");
        let path = base.join("wedding.json");
        let db = Database::open(&path).await.unwrap();

        let result: Result<(), StoreError> = db
            .try_write(|c| {
                c.media.push(MediaItem {
                    id: "x".into(),
                    url: "/media/x.jpg".into(),
                    media_type: MediaType::Image,
                    location: Location::Canada,
                    uploaded_at: Utc::now(),
                    uploaded_by: "Guest".into(),
                });
                Err(StoreError::Io(std::io::Error::other("rejected")))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(db.read(|c| c.media.len()).await, 0);
        assert!(!path.exists());

        std::fs::remove_dir_all(base).unwrap();
    }
}
