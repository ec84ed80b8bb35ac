//! Multi-file media upload pipeline.
//!
//! validate -> recompress oversized images -> upload with a bounded pool ->
//! record metadata in one batch -> report per-file outcomes.

pub mod batcher;
pub mod normalizer;
pub mod report;
pub mod validator;
pub mod worker_pool;

use crate::config::PipelineConfig;
use crate::models::{Location, MediaType};
use crate::object_store::{ObjectBody, ObjectStore, UploadError, UploadObject};
use crate::store::MediaStore;
use batcher::{BatchPersistError, MediaDraft, MetadataBatcher};
use chrono::Utc;
use log::{info, warn};
use report::{FailureKind, FileFailure, ProgressTracker, UploadReport};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use validator::ValidFile;
use worker_pool::WorkerPool;

const DEFAULT_UPLOADER: &str = "Guest";

/// A file as received from the uploader.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: String,
    /// MIME type declared by the client, if any.
    pub content_type: Option<String>,
    pub body: ObjectBody,
}

impl MediaFile {
    pub fn size(&self) -> u64 {
        self.body.len()
    }
}

/// Who uploaded a batch and which celebration it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadContext {
    pub location: Location,
    pub username: String,
}

impl UploadContext {
    pub fn new(location: Location, username: Option<String>) -> Self {
        let username = username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_UPLOADER.to_string());
        Self { location, username }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No files uploaded.")]
    EmptyBatch,
    #[error("batch too large: {count} files, at most {max} can be uploaded at a time")]
    BatchTooLarge { count: usize, max: usize },
    #[error("{error}")]
    BatchPersist {
        error: BatchPersistError,
        report: UploadReport,
    },
}

fn slug(value: &str) -> String {
    let mut out = String::new();
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
        if out.len() >= 32 {
            break;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "guest".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `wedding/{date}/{uploader}_{n}_{random}.{ext}`, unique per upload.
fn object_key(uploader: &str, position: usize, file_name: &str, media_type: MediaType) -> String {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| match media_type {
            MediaType::Image => "jpg".to_string(),
            MediaType::Video => "mp4".to_string(),
        });
    let random = uuid::Uuid::new_v4().simple().to_string();

    format!(
        "wedding/{}/{}_{}_{}.{}",
        Utc::now().format("%Y-%m-%d"),
        slug(uploader),
        position + 1,
        &random[..8],
        extension
    )
}

fn content_type_for(file: &MediaFile, media_type: MediaType) -> String {
    let declared = file
        .content_type
        .as_deref()
        .filter(|ct| ct.starts_with(&format!("{}/", media_type.as_str())));
    match declared {
        Some(ct) => ct.to_string(),
        None => mime_guess::from_path(&file.file_name)
            .first_or_octet_stream()
            .to_string(),
    }
}

pub struct UploadPipeline {
    config: PipelineConfig,
    objects: Arc<dyn ObjectStore>,
    batcher: MetadataBatcher,
}

impl UploadPipeline {
    pub fn new(
        config: PipelineConfig,
        objects: Arc<dyn ObjectStore>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            config,
            objects,
            batcher: MetadataBatcher::new(media),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one batch through every stage.
    ///
    /// Per-file problems end up in the report. Only a failed metadata write is
    /// an error for the whole batch.
    pub async fn run(
        &self,
        files: Vec<MediaFile>,
        context: &UploadContext,
        cancel: &CancellationToken,
    ) -> Result<UploadReport, PipelineError> {
        let total = files.len();
        let validated = validator::validate_batch(files, &self.config)?;
        info!(
            "Upload from {} ({}): {} files, {} rejected by validation",
            context.username,
            context.location,
            total,
            validated.rejected.len()
        );

        let tracker = Arc::new(ProgressTracker::new(total));
        for failure in validated.rejected {
            tracker.record_failure(failure).await;
        }

        let (to_normalize, mut ready): (Vec<ValidFile>, Vec<ValidFile>) = validated
            .accepted
            .into_iter()
            .partition(|f| f.needs_normalization);

        ready.extend(self.normalize_all(to_normalize, cancel, &tracker).await);
        let drafts = self.upload_all(ready, context, cancel, &tracker).await;

        match self.batcher.persist(drafts, context).await {
            Ok(items) => {
                let report = tracker.report(items).await;
                info!("Upload from {} finished: {}", context.username, report.summary);
                Ok(report)
            }
            Err(error) => {
                for orphan in &error.orphaned {
                    tracker
                        .record_failure(FileFailure::new(
                            orphan.position,
                            &orphan.file_name,
                            FailureKind::Persist,
                            format!("Uploaded to {} but not recorded: {}", orphan.url, error.reason),
                        ))
                        .await;
                }
                let report = tracker.report(Vec::new()).await;
                warn!("Upload from {} not recorded: {}", context.username, report.summary);
                Err(PipelineError::BatchPersist { error, report })
            }
        }
    }

    /// Recompresses oversized images. Failures are recorded and dropped.
    async fn normalize_all(
        &self,
        files: Vec<ValidFile>,
        cancel: &CancellationToken,
        tracker: &Arc<ProgressTracker>,
    ) -> Vec<ValidFile> {
        if files.is_empty() {
            return Vec::new();
        }

        let submitted: Vec<(usize, String)> =
            files.iter().map(|f| (f.index, f.file.file_name.clone())).collect();
        let config = self.config.clone();
        let work_tracker = tracker.clone();

        let drained = WorkerPool::new(self.config.normalize_workers)
            .run(files, cancel, move |_, valid: ValidFile| {
                let config = config.clone();
                let tracker = work_tracker.clone();
                async move {
                    let ValidFile {
                        index,
                        file,
                        media_type,
                        ..
                    } = valid;
                    let name = file.file_name.clone();

                    match normalizer::normalize(file, config).await {
                        Ok(file) => Some(ValidFile {
                            index,
                            file,
                            media_type,
                            needs_normalization: false,
                        }),
                        Err(e) => {
                            warn!("Could not recompress {}: {}", name, e);
                            tracker
                                .record_failure(FileFailure::new(
                                    index,
                                    &name,
                                    FailureKind::Normalization,
                                    e.to_string(),
                                ))
                                .await;
                            None
                        }
                    }
                }
            })
            .await;

        self.record_leftovers(
            &submitted,
            drained.unaccounted(submitted.len()),
            drained.cancelled.iter().map(|(p, _)| *p),
            cancel,
            tracker,
        )
        .await;

        drained.completed.into_iter().filter_map(|(_, f)| f).collect()
    }

    /// Pushes every file through the object store, at most
    /// `upload_workers` at a time.
    async fn upload_all(
        &self,
        files: Vec<ValidFile>,
        context: &UploadContext,
        cancel: &CancellationToken,
        tracker: &Arc<ProgressTracker>,
    ) -> Vec<MediaDraft> {
        if files.is_empty() {
            return Vec::new();
        }

        let submitted: Vec<(usize, String)> =
            files.iter().map(|f| (f.index, f.file.file_name.clone())).collect();
        let objects = self.objects.clone();
        let timeout = self.config.upload_timeout;
        let uploader = context.username.clone();
        let work_cancel = cancel.clone();
        let work_tracker = tracker.clone();

        let drained = WorkerPool::new(self.config.upload_workers)
            .run(files, cancel, move |_, valid: ValidFile| {
                let objects = objects.clone();
                let cancel = work_cancel.clone();
                let tracker = work_tracker.clone();
                let uploader = uploader.clone();
                async move {
                    let name = valid.file.file_name.clone();
                    let object = UploadObject {
                        key: object_key(&uploader, valid.index, &name, valid.media_type),
                        content_type: content_type_for(&valid.file, valid.media_type),
                        body: valid.file.body,
                    };

                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => Err(UploadError::Cancelled),
                        result = tokio::time::timeout(timeout, objects.upload(object)) => {
                            result.unwrap_or(Err(UploadError::Timeout(timeout.as_secs())))
                        }
                    };

                    match outcome {
                        Ok(stored) => {
                            tracker.record_success(&name);
                            Some(MediaDraft {
                                position: valid.index,
                                url: stored.url,
                                media_type: valid.media_type,
                                file_name: name,
                                format: stored.format,
                            })
                        }
                        Err(e) => {
                            warn!("Upload of {} failed: {}", name, e);
                            let kind = match e {
                                UploadError::Cancelled => FailureKind::Cancelled,
                                _ => FailureKind::Upload,
                            };
                            tracker
                                .record_failure(FileFailure::new(
                                    valid.index,
                                    &name,
                                    kind,
                                    e.to_string(),
                                ))
                                .await;
                            None
                        }
                    }
                }
            })
            .await;

        self.record_leftovers(
            &submitted,
            drained.unaccounted(submitted.len()),
            drained.cancelled.iter().map(|(p, _)| *p),
            cancel,
            tracker,
        )
        .await;

        drained.completed.into_iter().filter_map(|(_, d)| d).collect()
    }

    /// Reports files a stage never finished so none vanish silently.
    async fn record_leftovers(
        &self,
        submitted: &[(usize, String)],
        unaccounted: Vec<usize>,
        unstarted: impl Iterator<Item = usize>,
        cancel: &CancellationToken,
        tracker: &ProgressTracker,
    ) {
        for position in unstarted {
            let (index, name) = &submitted[position];
            let (kind, message) = if cancel.is_cancelled() {
                (FailureKind::Cancelled, "Upload cancelled before it started.")
            } else {
                (FailureKind::Upload, "Upload was interrupted before it started.")
            };
            tracker
                .record_failure(FileFailure::new(*index, name, kind, message.to_string()))
                .await;
        }

        for position in unaccounted {
            let (index, name) = &submitted[position];
            tracker
                .record_failure(FileFailure::new(
                    *index,
                    name,
                    FailureKind::Upload,
                    "Processing stopped unexpectedly.".to_string(),
                ))
                .await;
        }
    }
}
