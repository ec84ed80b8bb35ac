//! Periodic audit for stored objects that no media record points at.
//! Orphans are only reported, never removed.

use crate::object_store::{ObjectStore, UploadError};
use crate::store::Database;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Start of the window in which an object may still be waiting for its batch
/// write.
pub fn grace_cutoff(grace: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(grace)
        .ok()
        .and_then(|grace| Utc::now().checked_sub_signed(grace))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// URLs present in the object store but missing from the media collection.
/// Objects written after `settled_before` are skipped.
pub async fn find_orphans(
    objects: &dyn ObjectStore,
    db: &Database,
    settled_before: DateTime<Utc>,
) -> Result<Vec<String>, UploadError> {
    let stored = objects.list().await?;
    let recorded: HashSet<String> = db
        .read(|c| c.media.iter().map(|m| m.url.clone()).collect())
        .await;

    Ok(stored
        .into_iter()
        .filter(|o| o.modified.map_or(true, |m| m <= settled_before))
        .filter(|o| !recorded.contains(&o.url))
        .map(|o| o.url)
        .collect())
}

async fn run_scan(objects: &dyn ObjectStore, db: &Database, grace: Duration) {
    info!("Running orphan audit...");
    match find_orphans(objects, db, grace_cutoff(grace)).await {
        Ok(orphans) if orphans.is_empty() => info!("Orphan audit complete: no orphaned objects"),
        Ok(orphans) => {
            for url in &orphans {
                warn!("Orphaned object (no media record): {}", url);
            }
            warn!("Orphan audit complete: {} orphaned objects", orphans.len());
        }
        Err(e) => warn!("Orphan audit failed: {}", e),
    }
}

/// Spawns the background audit, which runs every `interval` until `shutdown`.
pub fn spawn_orphan_scan(
    objects: Arc<dyn ObjectStore>,
    db: Arc<Database>,
    interval: Duration,
    grace: Duration,
    shutdown: CancellationToken,
) {
    if interval.is_zero() {
        info!("Orphan audit disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => run_scan(objects.as_ref(), &db, grace).await,
            }
        }
        info!("Orphan audit stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, MediaType, NewMediaItem};
    use crate::object_store::{LocalObjectStore, ObjectBody, UploadObject};
    use crate::store::{tests::unique_temp_dir, Collections, MediaStore};

    async fn store_with_one_recorded(
        prefix: &str,
    ) -> (std::path::PathBuf, LocalObjectStore, Database) {
        let base = unique_temp_dir(prefix);
        let objects = LocalObjectStore::new(base.clone(), "/media".to_string());
        let db = Database::in_memory(Collections::default());

        let mut urls = Vec::new();
        for key in ["wedding/a.jpg", "wedding/b.jpg"] {
            let stored = objects
                .upload(UploadObject {
                    key: key.to_string(),
                    content_type: "image/jpeg".to_string(),
                    body: ObjectBody::Bytes(b"jpeg".to_vec()),
                })
                .await
                .unwrap();
            urls.push(stored.url);
        }
        db.insert_media(vec![NewMediaItem {
            url: urls[0].clone(),
            media_type: MediaType::Image,
            location: Location::Canada,
            uploaded_at: Utc::now(),
            uploaded_by: "Guest".to_string(),
        }])
        .await
        .unwrap();
        (base, objects, db)
    }

    #[tokio::test]
    async fn test_find_orphans_lists_unrecorded_objects_only() {
        let (base, objects, db) = store_with_one_recorded("wedding_orphans").await;

        let later = Utc::now() + chrono::Duration::minutes(1);
        let orphans = find_orphans(&objects, &db, later).await.unwrap();
        assert_eq!(orphans, vec!["/media/wedding/b.jpg".to_string()]);

        std::fs::remove_dir_all(base).unwrap();
    }

    #[tokio::test]
    async fn test_recent_uploads_are_not_orphans_yet() {
        let (base, objects, db) = store_with_one_recorded("wedding_orphans_recent").await;

        let orphans = find_orphans(&objects, &db, grace_cutoff(Duration::from_secs(3600)))
            .await
            .unwrap();
        assert!(orphans.is_empty());

        std::fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn test_grace_cutoff() {
        let cutoff = grace_cutoff(Duration::from_secs(600));
        let expected = Utc::now() - chrono::Duration::seconds(600);
        assert!((cutoff - expected).num_seconds().abs() <= 1);
        assert!(grace_cutoff(Duration::MAX) < Utc::now());
    }
}
