//! Per-file outcomes and the summary shown to the uploader.

use crate::models::MediaItem;
use log::info;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Validation,
    Normalization,
    Upload,
    Cancelled,
    /// Uploaded, but its metadata could not be recorded.
    Persist,
}

/// Why one file did not make it into the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    /// 1-based position of the file in the request.
    pub index: usize,
    pub file_name: String,
    pub kind: FailureKind,
    pub message: String,
}

impl FileFailure {
    /// `position` is the 0-based index of the file in the request.
    pub fn new(position: usize, file_name: &str, kind: FailureKind, message: String) -> Self {
        Self {
            index: position + 1,
            file_name: file_name.to_string(),
            kind,
            message,
        }
    }
}

/// Running counts shared by every stage and worker of one upload.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    completed: AtomicUsize,
    failures: Mutex<Vec<FileFailure>>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Files that reached a final state so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn advance(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_success(&self, file_name: &str) {
        let done = self.advance();
        info!("Uploaded {}/{}: {}", done, self.total, file_name);
    }

    pub async fn record_failure(&self, failure: FileFailure) {
        self.advance();
        self.failures.lock().await.push(failure);
    }

    pub async fn failure_count(&self) -> usize {
        self.failures.lock().await.len()
    }

    /// Builds the final report around the items that were persisted.
    pub async fn report(&self, succeeded: Vec<MediaItem>) -> UploadReport {
        let failures = self.failures.lock().await.clone();
        UploadReport::new(self.total, succeeded, failures)
    }
}

/// Outcome of one upload request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub total: usize,
    pub summary: String,
    pub succeeded: Vec<MediaItem>,
    /// Sorted by index, whatever order the workers finished in.
    pub failures: Vec<FileFailure>,
}

impl UploadReport {
    pub fn new(total: usize, succeeded: Vec<MediaItem>, mut failures: Vec<FileFailure>) -> Self {
        failures.sort_by(|a, b| a.index.cmp(&b.index));
        let summary = format!("{} succeeded, {} failed", succeeded.len(), failures.len());
        Self {
            total,
            summary,
            succeeded,
            failures,
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.failures.is_empty()
    }

    /// Names of the files that failed, in request order.
    pub fn failed_file_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.file_name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracker_counts_and_sorts_out_of_order_failures() {
        let tracker = ProgressTracker::new(4);
        tracker
            .record_failure(FileFailure::new(3, "d.exe", FailureKind::Validation, "bad".into()))
            .await;
        tracker.record_success("b.jpg");
        tracker
            .record_failure(FileFailure::new(0, "a.jpg", FailureKind::Upload, "503".into()))
            .await;

        assert_eq!(tracker.completed(), 3);
        assert_eq!(tracker.failure_count().await, 2);

        let report = tracker.report(vec![]).await;
        assert_eq!(report.total, 4);
        assert_eq!(report.failed_file_names(), vec!["a.jpg", "d.exe"]);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.summary, "0 succeeded, 2 failed");
    }

    #[test]
    fn test_failure_serializes_kind_lowercase() {
        let failure = FileFailure::new(1, "clip.mov", FailureKind::Normalization, "x".into());
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["kind"], "normalization");
        assert_eq!(value["fileName"], "clip.mov");
        assert_eq!(value["index"], 2);

        let unrecorded = FileFailure::new(0, "a.jpg", FailureKind::Persist, "x".into());
        assert_eq!(serde_json::to_value(&unrecorded).unwrap()["kind"], "persist");
    }
}
