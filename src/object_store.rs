//! Remote object storage for uploaded media.

use crate::config::StorageBackend;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use glob::glob;
use log::{debug, info};
use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    #[error("storage rejected the upload: {0}")]
    Storage(String),
    #[error("upload timed out after {0} seconds")]
    Timeout(u64),
    #[error("upload cancelled")]
    Cancelled,
    #[error("invalid object key '{0}'")]
    InvalidKey(String),
    #[error("'{0}' is not an object of this store")]
    ForeignUrl(String),
}

/// Contents of an object, held in memory or left where the request spooled it.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBody {
    Bytes(Vec<u8>),
    Spooled { path: PathBuf, len: u64 },
}

impl ObjectBody {
    pub fn len(&self) -> u64 {
        match self {
            ObjectBody::Bytes(bytes) => bytes.len() as u64,
            ObjectBody::Spooled { len, .. } => *len,
        }
    }

    /// Whole contents. Reads a spooled file synchronously, so call it off the
    /// async workers.
    pub fn read_blocking(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            ObjectBody::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
            ObjectBody::Spooled { path, .. } => std::fs::read(path).map(Cow::Owned),
        }
    }
}

/// One object to create.
#[derive(Debug, Clone)]
pub struct UploadObject {
    pub key: String,
    pub content_type: String,
    pub body: ObjectBody,
}

/// An object found when listing the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedObject {
    pub url: String,
    /// Last write, when the backend reports one.
    pub modified: Option<DateTime<Utc>>,
}

/// Where an uploaded object is reachable.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub url: String,
    /// Format of the stored object, e.g. `jpg` or `mp4`.
    pub format: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, object: UploadObject) -> Result<StoredObject, UploadError>;

    async fn delete(&self, url: &str) -> Result<(), UploadError>;

    /// Every stored object, sorted by URL.
    async fn list(&self) -> Result<Vec<ListedObject>, UploadError>;
}

/// Builds the store selected by configuration.
pub async fn connect(backend: &StorageBackend) -> Arc<dyn ObjectStore> {
    match backend {
        StorageBackend::Local { root, public_base } => {
            info!("Storing media on disk below {}", root.display());
            Arc::new(LocalObjectStore::new(root.clone(), public_base.clone()))
        }
        StorageBackend::S3 {
            bucket,
            region,
            endpoint_url,
            public_base,
        } => {
            info!("Storing media in bucket {}", bucket);
            Arc::new(
                S3ObjectStore::new(
                    bucket.clone(),
                    region.clone(),
                    endpoint_url.clone(),
                    public_base.clone(),
                )
                .await,
            )
        }
    }
}

fn format_of(key: &str) -> String {
    Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Keys must be relative paths without `..` so they cannot escape the root.
fn validate_key(key: &str) -> Result<(), UploadError> {
    let path = Path::new(key);
    let is_clean = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if is_clean {
        Ok(())
    } else {
        Err(UploadError::InvalidKey(key.to_string()))
    }
}

/// Stores objects as files below `root`, reachable at `{public_base}/{key}`.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: String,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, public_base: String) -> Self {
        Self {
            root,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    fn key_for<'u>(&self, url: &'u str) -> Result<&'u str, UploadError> {
        url.strip_prefix(&self.public_base)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| UploadError::ForeignUrl(url.to_string()))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, object: UploadObject) -> Result<StoredObject, UploadError> {
        validate_key(&object.key)?;
        let path = self.root.join(&object.key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| UploadError::Storage(e.to_string()))?;
        }
        let written = match &object.body {
            ObjectBody::Bytes(bytes) => fs::write(&path, bytes).await,
            ObjectBody::Spooled { path: spooled, .. } => fs::copy(spooled, &path).await.map(|_| ()),
        };
        written.map_err(|e| UploadError::Storage(e.to_string()))?;

        debug!("Stored {} ({} bytes)", path.display(), object.body.len());
        Ok(StoredObject {
            url: self.url_for(&object.key),
            format: format_of(&object.key),
        })
    }

    async fn delete(&self, url: &str) -> Result<(), UploadError> {
        let key = self.key_for(url)?;
        validate_key(key)?;
        fs::remove_file(self.root.join(key))
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))
    }

    async fn list(&self) -> Result<Vec<ListedObject>, UploadError> {
        let pattern = format!("{}/**/*", self.root.display());
        let entries = glob(&pattern).map_err(|e| UploadError::Storage(e.to_string()))?;

        let mut objects = Vec::new();
        for path in entries.flatten() {
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };
            if metadata.is_dir() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect::<Vec<_>>()
                .join("/");
            objects.push(ListedObject {
                url: self.url_for(&key),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        objects.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(objects)
    }
}

/// Stores objects in an S3 bucket.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    public_base: String,
}

impl S3ObjectStore {
    /// `endpoint_url` selects an S3-compatible provider and switches to
    /// path-style addressing. Credentials come from the standard AWS chain.
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        public_base: Option<String>,
    ) -> Self {
        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let client = match &endpoint_url {
            Some(endpoint) => {
                let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                Client::from_conf(s3_config)
            }
            None => Client::new(&shared_config),
        };

        let public_base = public_base.unwrap_or_else(|| match &endpoint_url {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", bucket, region),
        });

        Self {
            client,
            bucket,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    fn key_for<'u>(&self, url: &'u str) -> Result<&'u str, UploadError> {
        url.strip_prefix(&self.public_base)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| UploadError::ForeignUrl(url.to_string()))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, object: UploadObject) -> Result<StoredObject, UploadError> {
        validate_key(&object.key)?;
        let size = object.body.len();
        let body = match object.body {
            ObjectBody::Bytes(bytes) => ByteStream::from(bytes),
            ObjectBody::Spooled { path, .. } => ByteStream::from_path(&path)
                .await
                .map_err(|e| UploadError::Storage(e.to_string()))?,
        };

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object.key)
            .content_type(&object.content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Storage(DisplayErrorContext(&e).to_string()))?;

        debug!("Put s3://{}/{} ({} bytes)", self.bucket, object.key, size);
        Ok(StoredObject {
            url: self.url_for(&object.key),
            format: format_of(&object.key),
        })
    }

    async fn delete(&self, url: &str) -> Result<(), UploadError> {
        let key = self.key_for(url)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| UploadError::Storage(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ListedObject>, UploadError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| UploadError::Storage(DisplayErrorContext(&e).to_string()))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    let modified = object
                        .last_modified()
                        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()));
                    objects.push(ListedObject {
                        url: self.url_for(key),
                        modified,
                    });
                }
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::unique_temp_dir;

    fn object(key: &str) -> UploadObject {
        UploadObject {
            key: key.to_string(),
            content_type: "image/jpeg".to_string(),
            body: ObjectBody::Bytes(b"jpeg".to_vec()),
        }
    }

    fn urls(listed: Vec<ListedObject>) -> Vec<String> {
        listed.into_iter().map(|o| o.url).collect()
    }

    #[tokio::test]
    async fn test_local_upload_list_and_delete() {
        let base = unique_temp_dir("wedding_objects");
        let store = LocalObjectStore::new(base.clone(), "/media/".to_string());

        let stored = store.upload(object("wedding/2025-08-23/ana_1.jpg")).await.unwrap();
        assert_eq!(stored.url, "/media/wedding/2025-08-23/ana_1.jpg");
        assert_eq!(stored.format, "jpg");
        assert!(base.join("wedding/2025-08-23/ana_1.jpg").exists());

        let listed = store.list().await.unwrap();
        assert!(listed[0].modified.is_some());
        assert_eq!(urls(listed), vec![stored.url.clone()]);

        store.delete(&stored.url).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());

        std::fs::remove_dir_all(base).unwrap();
    }

    #[tokio::test]
    async fn test_local_upload_copies_spooled_file() {
        let base = unique_temp_dir("wedding_objects_spooled");
        let spool = base.join("spool.tmp");
        std::fs::write(&spool, b"video-bytes").unwrap();
        let store = LocalObjectStore::new(base.join("media"), "/media".to_string());

        let stored = store
            .upload(UploadObject {
                key: "wedding/clip.mp4".to_string(),
                content_type: "video/mp4".to_string(),
                body: ObjectBody::Spooled {
                    path: spool.clone(),
                    len: 11,
                },
            })
            .await
            .unwrap();

        assert_eq!(stored.format, "mp4");
        assert_eq!(
            std::fs::read(base.join("media/wedding/clip.mp4")).unwrap(),
            b"video-bytes"
        );
        assert!(spool.exists());

        std::fs::remove_dir_all(base).unwrap();
    }

    #[test]
    fn test_body_reads_from_memory_or_disk() {
        let base = unique_temp_dir("wedding_objects_body");
        let spool = base.join("part");
        std::fs::write(&spool, b"abc").unwrap();

        let memory = ObjectBody::Bytes(b"xyz".to_vec());
        assert_eq!(memory.len(), 3);
        assert_eq!(&*memory.read_blocking().unwrap(), b"xyz");

        let spooled = ObjectBody::Spooled { path: spool, len: 3 };
        assert_eq!(&*spooled.read_blocking().unwrap(), b"abc");

        std::fs::remove_dir_all(base).unwrap();
    }

    #[tokio::test]
    async fn test_local_rejects_escaping_keys_and_foreign_urls() {
        let base = unique_temp_dir("wedding_objects_keys");
        let store = LocalObjectStore::new(base.clone(), "/media".to_string());

        assert_eq!(
            store.upload(object("../outside.jpg")).await,
            Err(UploadError::InvalidKey("../outside.jpg".to_string()))
        );
        assert_eq!(
            store.delete("https://elsewhere.example/a.jpg").await,
            Err(UploadError::ForeignUrl("https://elsewhere.example/a.jpg".to_string()))
        );

        std::fs::remove_dir_all(base).unwrap();
    }
}
