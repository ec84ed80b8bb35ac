//! Classifies incoming files and enforces batch and size limits.

use super::report::{FailureKind, FileFailure};
use super::{MediaFile, PipelineError};
use crate::config::PipelineConfig;
use crate::models::MediaType;
use log::{debug, warn};
use mime_guess::mime;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Unsupported file type ({0}). Only photos and videos can be uploaded.")]
    Unsupported(String),
    #[error("The file is empty.")]
    Empty,
    #[error("This video is {size}, larger than the {max} limit. Trim it or share it with us directly.")]
    VideoTooLarge { size: String, max: String },
    #[error("This photo is {size}, larger than the {max} limit. Export a smaller copy and try again.")]
    ImageTooLarge { size: String, max: String },
}

/// A file that passed validation.
#[derive(Debug, Clone)]
pub struct ValidFile {
    /// Position of the file in the original request, 0-based.
    pub index: usize,
    pub file: MediaFile,
    pub media_type: MediaType,
    /// True when the image must be recompressed before upload.
    pub needs_normalization: bool,
}

#[derive(Debug, Default)]
pub struct Validated {
    pub accepted: Vec<ValidFile>,
    pub rejected: Vec<FileFailure>,
}

/// Formats a byte count the way people read file sizes.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn media_type_of(m: &mime::Mime) -> Option<MediaType> {
    let kind = m.type_();
    if kind == mime::IMAGE {
        Some(MediaType::Image)
    } else if kind == mime::VIDEO {
        Some(MediaType::Video)
    } else {
        None
    }
}

/// Decides whether a file is an image, a video, or unsupported.
///
/// A known extension wins over the declared MIME type, so `setup.exe` sent as
/// `image/png` is still rejected. Files without a recognised extension fall
/// back to the declared type.
pub fn classify(file_name: &str, content_type: Option<&str>) -> Result<MediaType, ValidationError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    if let Some(ext) = extension.as_deref() {
        if let Some(guessed) = mime_guess::from_ext(ext).first() {
            return media_type_of(&guessed)
                .ok_or_else(|| ValidationError::Unsupported(format!(".{}", ext)));
        }
    }

    let declared = content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .and_then(|ct| ct.parse::<mime::Mime>().ok());

    match declared {
        Some(m) => media_type_of(&m).ok_or_else(|| ValidationError::Unsupported(m.to_string())),
        None => Err(ValidationError::Unsupported(
            extension
                .map(|e| format!(".{}", e))
                .unwrap_or_else(|| "unknown".to_string()),
        )),
    }
}

/// Checks one classified file against the size limits.
/// Returns whether the file needs recompression.
pub fn check_size(
    size: u64,
    media_type: MediaType,
    config: &PipelineConfig,
) -> Result<bool, ValidationError> {
    if size == 0 {
        return Err(ValidationError::Empty);
    }

    match media_type {
        MediaType::Video if size > config.max_video_bytes => Err(ValidationError::VideoTooLarge {
            size: human_size(size),
            max: human_size(config.max_video_bytes),
        }),
        MediaType::Video => Ok(false),
        MediaType::Image if size > config.max_image_input_bytes => {
            Err(ValidationError::ImageTooLarge {
                size: human_size(size),
                max: human_size(config.max_image_input_bytes),
            })
        }
        MediaType::Image => Ok(size > config.compression_threshold_bytes),
    }
}

/// Re-checks an image after recompression.
pub fn check_normalized(size: u64, config: &PipelineConfig) -> Result<(), ValidationError> {
    if size == 0 {
        return Err(ValidationError::Empty);
    }
    if size > config.max_image_bytes {
        return Err(ValidationError::ImageTooLarge {
            size: human_size(size),
            max: human_size(config.max_image_bytes),
        });
    }
    Ok(())
}

/// Splits a batch into files that may proceed and per-file rejections.
pub fn validate_batch(
    files: Vec<MediaFile>,
    config: &PipelineConfig,
) -> Result<Validated, PipelineError> {
    if files.is_empty() {
        return Err(PipelineError::EmptyBatch);
    }
    if files.len() > config.max_batch_files {
        return Err(PipelineError::BatchTooLarge {
            count: files.len(),
            max: config.max_batch_files,
        });
    }

    let mut validated = Validated::default();
    for (index, file) in files.into_iter().enumerate() {
        let checked = classify(&file.file_name, file.content_type.as_deref()).and_then(|media_type| {
            check_size(file.size(), media_type, config).map(|needs| (media_type, needs))
        });

        match checked {
            Ok((media_type, needs_normalization)) => {
                debug!(
                    "Accepted {} as {} (recompress: {})",
                    file.file_name, media_type, needs_normalization
                );
                validated.accepted.push(ValidFile {
                    index,
                    file,
                    media_type,
                    needs_normalization,
                });
            }
            Err(e) => {
                warn!("Rejected {}: {}", file.file_name, e);
                validated.rejected.push(FileFailure::new(
                    index,
                    &file.file_name,
                    FailureKind::Validation,
                    e.to_string(),
                ));
            }
        }
    }

    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::ObjectBody;

    fn file(name: &str, content_type: Option<&str>, size: usize) -> MediaFile {
        MediaFile {
            file_name: name.to_string(),
            content_type: content_type.map(str::to_string),
            body: ObjectBody::Bytes(vec![0u8; size]),
        }
    }

    #[test]
    fn test_classify_by_extension_then_mime() {
        assert_eq!(classify("IMG_0001.JPG", None), Ok(MediaType::Image));
        assert_eq!(classify("clip.mp4", Some("application/octet-stream")), Ok(MediaType::Video));
        assert_eq!(classify("blob", Some("video/quicktime")), Ok(MediaType::Video));
        assert_eq!(
            classify("setup.exe", Some("image/png")),
            Err(ValidationError::Unsupported(".exe".to_string()))
        );
        assert!(classify("notes", None).is_err());
        assert!(classify("notes", Some("text/plain")).is_err());
    }

    #[test]
    fn test_check_size_limits() {
        let config = PipelineConfig {
            compression_threshold_bytes: 100,
            max_image_input_bytes: 1_000,
            max_video_bytes: 500,
            ..PipelineConfig::default()
        };

        assert_eq!(check_size(0, MediaType::Image, &config), Err(ValidationError::Empty));
        assert_eq!(check_size(50, MediaType::Image, &config), Ok(false));
        assert_eq!(check_size(101, MediaType::Image, &config), Ok(true));
        assert!(check_size(1_001, MediaType::Image, &config).is_err());
        assert_eq!(check_size(500, MediaType::Video, &config), Ok(false));
        assert!(matches!(
            check_size(501, MediaType::Video, &config),
            Err(ValidationError::VideoTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_batch_partitions_without_blocking_valid_files() {
        let files = vec![
            file("a.jpg", Some("image/jpeg"), 10),
            file("virus.exe", Some("application/x-msdownload"), 10),
            file("b.mov", None, 10),
            file("empty.png", None, 0),
            file("c.webp", None, 10),
        ];

        let validated = validate_batch(files, &PipelineConfig::default()).unwrap();
        let accepted: Vec<_> = validated
            .accepted
            .iter()
            .map(|f| (f.index, f.file.file_name.as_str()))
            .collect();
        assert_eq!(accepted, vec![(0, "a.jpg"), (2, "b.mov"), (4, "c.webp")]);

        let rejected: Vec<_> = validated
            .rejected
            .iter()
            .map(|f| (f.index, f.file_name.as_str()))
            .collect();
        assert_eq!(rejected, vec![(2, "virus.exe"), (4, "empty.png")]);
        assert!(validated
            .rejected
            .iter()
            .all(|f| f.kind == FailureKind::Validation));
    }

    #[test]
    fn test_validate_batch_limits() {
        let config = PipelineConfig::default();
        assert!(matches!(
            validate_batch(vec![], &config),
            Err(PipelineError::EmptyBatch)
        ));

        let too_many = (0..201).map(|i| file(&format!("{}.jpg", i), None, 1)).collect();
        assert!(matches!(
            validate_batch(too_many, &config),
            Err(PipelineError::BatchTooLarge { count: 201, max: 200 })
        ));

        let exactly_max = (0..200).map(|i| file(&format!("{}.jpg", i), None, 1)).collect();
        assert_eq!(validate_batch(exactly_max, &config).unwrap().accepted.len(), 200);
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(25 * 1024 * 1024), "25.0 MB");
        assert_eq!(human_size(2 * 1024 * 1024 * 1024), "2.0 GB");
    }
}
