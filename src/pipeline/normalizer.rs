//! Recompresses oversized images to a bounded resolution and size.

use super::validator::{check_normalized, ValidationError};
use super::MediaFile;
use crate::config::PipelineConfig;
use crate::object_store::ObjectBody;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use log::debug;
use std::path::Path;

const MIN_JPEG_QUALITY: u8 = 40;
const QUALITY_STEP: u8 = 10;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    #[error("Could not read this photo to shrink it: {0}")]
    Decode(String),
    #[error("Could not recompress this photo: {0}")]
    Encode(String),
    #[error("{0}")]
    StillTooLarge(ValidationError),
    #[error("Recompression was interrupted: {0}")]
    Interrupted(String),
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, NormalizationError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| NormalizationError::Encode(e.to_string()))?;
    Ok(buf)
}

fn jpeg_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("photo");
    format!("{}.jpg", stem)
}

/// Downscales and re-encodes one image as JPEG.
///
/// Quality steps down from `jpeg_quality` until the output fits
/// `target_max_bytes` or the quality floor is reached; the result must then
/// fit `max_image_bytes`. Blocks while a spooled file is read.
pub fn normalize_image(
    file: &MediaFile,
    config: &PipelineConfig,
) -> Result<MediaFile, NormalizationError> {
    let bytes = file
        .body
        .read_blocking()
        .map_err(|e| NormalizationError::Decode(e.to_string()))?;
    let mut img =
        image::load_from_memory(&bytes).map_err(|e| NormalizationError::Decode(e.to_string()))?;
    drop(bytes);

    let max_dim = config.target_max_dimension.max(1);
    if img.width().max(img.height()) > max_dim {
        img = img.resize(max_dim, max_dim, FilterType::Lanczos3);
    }

    let mut quality = config.jpeg_quality.clamp(MIN_JPEG_QUALITY, 100);
    let mut encoded = encode_jpeg(&img, quality)?;
    while encoded.len() as u64 > config.target_max_bytes && quality > MIN_JPEG_QUALITY {
        quality = quality.saturating_sub(QUALITY_STEP).max(MIN_JPEG_QUALITY);
        encoded = encode_jpeg(&img, quality)?;
    }

    check_normalized(encoded.len() as u64, config).map_err(NormalizationError::StillTooLarge)?;

    debug!(
        "Recompressed {} from {} to {} bytes ({}x{}, quality {})",
        file.file_name,
        file.size(),
        encoded.len(),
        img.width(),
        img.height(),
        quality
    );

    Ok(MediaFile {
        file_name: jpeg_name(&file.file_name),
        content_type: Some("image/jpeg".to_string()),
        body: ObjectBody::Bytes(encoded),
    })
}

/// Runs [`normalize_image`] on the blocking pool.
pub async fn normalize(
    file: MediaFile,
    config: PipelineConfig,
) -> Result<MediaFile, NormalizationError> {
    tokio::task::spawn_blocking(move || normalize_image(&file, &config))
        .await
        .map_err(|e| NormalizationError::Interrupted(e.to_string()))?
}
