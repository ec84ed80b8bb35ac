//! Configuration for the wedding server.
//! Every setting can be overridden via a `WEDDING_*` environment variable.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Where uploaded objects end up.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    /// Files written below a local directory and served by the app itself.
    Local { root: PathBuf, public_base: String },
    /// An S3 (or S3-compatible) bucket.
    S3 {
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        public_base: Option<String>,
    },
}

/// Limits and knobs of the upload pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Most files accepted in one upload request.
    pub max_batch_files: usize,
    /// Concurrent in-flight uploads.
    pub upload_workers: usize,
    /// Concurrent image recompressions.
    pub normalize_workers: usize,
    /// Timeout applied to each individual upload call.
    pub upload_timeout: Duration,
    /// Images above this size are recompressed before upload.
    pub compression_threshold_bytes: u64,
    /// Hard ceiling for an image as it is uploaded.
    pub max_image_bytes: u64,
    /// Images above this size are not even decoded.
    pub max_image_input_bytes: u64,
    pub max_video_bytes: u64,
    /// Ceiling for a whole multipart request, whatever the per-file limits add up to.
    pub max_request_bytes: u64,
    /// Longer edge of a recompressed image.
    pub target_max_dimension: u32,
    /// Size recompression aims for.
    pub target_max_bytes: u64,
    /// Starting JPEG quality of recompression.
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_files: 200,
            upload_workers: 3,
            normalize_workers: 2,
            upload_timeout: Duration::from_secs(60),
            compression_threshold_bytes: 10 * MIB,
            max_image_bytes: 20 * MIB,
            max_image_input_bytes: 100 * MIB,
            max_video_bytes: 2 * GIB,
            max_request_bytes: 8 * GIB,
            target_max_dimension: 3840,
            target_max_bytes: 10 * MIB,
            jpeg_quality: 85,
        }
    }
}

impl PipelineConfig {
    /// Reads pipeline settings, falling back to the defaults above.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_batch_files: env_parse("WEDDING_MAX_BATCH_FILES", defaults.max_batch_files),
            upload_workers: env_parse("WEDDING_UPLOAD_WORKERS", defaults.upload_workers).max(1),
            normalize_workers: env_parse("WEDDING_NORMALIZE_WORKERS", defaults.normalize_workers)
                .max(1),
            upload_timeout: Duration::from_secs(env_parse(
                "WEDDING_UPLOAD_TIMEOUT_SECS",
                defaults.upload_timeout.as_secs(),
            )),
            compression_threshold_bytes: env_parse(
                "WEDDING_COMPRESSION_THRESHOLD_BYTES",
                defaults.compression_threshold_bytes,
            ),
            max_image_bytes: env_parse("WEDDING_MAX_IMAGE_BYTES", defaults.max_image_bytes),
            max_image_input_bytes: env_parse(
                "WEDDING_MAX_IMAGE_INPUT_BYTES",
                defaults.max_image_input_bytes,
            ),
            max_video_bytes: env_parse("WEDDING_MAX_VIDEO_BYTES", defaults.max_video_bytes),
            max_request_bytes: env_parse("WEDDING_MAX_REQUEST_BYTES", defaults.max_request_bytes),
            target_max_dimension: env_parse(
                "WEDDING_TARGET_MAX_DIMENSION",
                defaults.target_max_dimension,
            ),
            target_max_bytes: env_parse("WEDDING_TARGET_MAX_BYTES", defaults.target_max_bytes),
            jpeg_quality: env_parse("WEDDING_JPEG_QUALITY", defaults.jpeg_quality).clamp(1, 100),
        }
    }

    /// Largest single multipart file Rocket should accept.
    pub fn max_file_bytes(&self) -> u64 {
        self.max_video_bytes.max(self.max_image_input_bytes)
    }

    /// Largest multipart request Rocket should accept.
    pub fn max_form_bytes(&self) -> u64 {
        let batch = self
            .max_file_bytes()
            .saturating_mul(self.max_batch_files.max(1) as u64);
        batch.min(self.max_request_bytes.max(self.max_file_bytes()))
    }
}

/// Application-wide settings, loaded once at startup and managed by Rocket.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the JSON document store.
    /// Set via `WEDDING_DATA_FILE`, defaults to `data/wedding.json`.
    pub data_file: PathBuf,
    pub storage: StorageBackend,
    /// Bearer token for admin routes. Admin routes are closed when unset.
    pub admin_token: Option<String>,
    /// Origins allowed to call the API from a browser.
    pub allowed_origins: Vec<String>,
    /// Public address of the guest site, used for invite links.
    pub site_url: String,
    /// Title used for calendar entries.
    pub wedding_title: String,
    /// Interval between orphan audits.
    pub orphan_scan_interval: Duration,
    /// Objects younger than this may still be waiting for their batch write
    /// and are left out of orphan audits.
    pub orphan_grace: Duration,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let storage = match env_string("WEDDING_STORAGE", "local").to_lowercase().as_str() {
            "s3" => StorageBackend::S3 {
                bucket: env_string("WEDDING_S3_BUCKET", "wedding-media"),
                region: env_string("WEDDING_S3_REGION", "us-east-1"),
                endpoint_url: env_optional("WEDDING_S3_ENDPOINT"),
                public_base: env_optional("WEDDING_S3_PUBLIC_BASE"),
            },
            _ => StorageBackend::Local {
                root: PathBuf::from(env_string("WEDDING_MEDIA_DIR", "static/media")),
                public_base: env_string("WEDDING_MEDIA_URL", "/media"),
            },
        };

        Self {
            data_file: PathBuf::from(env_string("WEDDING_DATA_FILE", "data/wedding.json")),
            storage,
            admin_token: env_optional("WEDDING_ADMIN_TOKEN"),
            allowed_origins: parse_origins(&env_string(
                "WEDDING_ALLOWED_ORIGINS",
                "http://localhost:3000",
            )),
            site_url: env_string("WEDDING_SITE_URL", "http://localhost:3000"),
            wedding_title: env_string("WEDDING_TITLE", "Our Wedding"),
            orphan_scan_interval: Duration::from_secs(env_parse(
                "WEDDING_ORPHAN_SCAN_SECS",
                3600,
            )),
            orphan_grace: Duration::from_secs(env_parse("WEDDING_ORPHAN_GRACE_SECS", 2 * 3600)),
            pipeline: PipelineConfig::from_env(),
        }
    }

    /// Link a guest follows to open their invite.
    pub fn invite_url(&self, invite_id: &str) -> String {
        format!("{}/invite/{}", self.site_url.trim_end_matches('/'), invite_id)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins_trims_and_drops_empty() {
        let origins = parse_origins(" http://localhost:3000/ ,,https://example.web.app ");
        assert_eq!(
            origins,
            vec![
                "http://localhost:3000".to_string(),
                "https://example.web.app".to_string()
            ]
        );
    }

    #[test]
    fn test_default_pipeline_limits() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_batch_files, 200);
        assert_eq!(config.upload_workers, 3);
        assert_eq!(config.max_image_bytes, 20 * MIB);
        assert_eq!(config.max_file_bytes(), 2 * GIB);
    }

    #[test]
    fn test_form_limit_is_capped_per_request() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_form_bytes(), 8 * GIB);

        let small = PipelineConfig {
            max_batch_files: 2,
            ..PipelineConfig::default()
        };
        assert_eq!(small.max_form_bytes(), 4 * GIB);

        let tight = PipelineConfig {
            max_request_bytes: MIB,
            ..PipelineConfig::default()
        };
        assert_eq!(tight.max_form_bytes(), tight.max_file_bytes());
    }

    #[test]
    fn test_invite_url_strips_trailing_slash() {
        let mut config = AppConfig::from_env();
        config.site_url = "https://example.web.app/".to_string();
        assert_eq!(config.invite_url("abc"), "https://example.web.app/invite/abc");
    }
}
