//! Gallery, uploads and media administration.

use super::parse_location;
use crate::auth::Admin;
use crate::config::AppConfig;
use crate::error::{ApiError, ApiResult, Message};
use crate::models::{Location, MediaItem, MediaType, NewMediaItem};
use crate::notifier::{LiveEvent, Notifier};
use crate::object_store::{ObjectBody, ObjectStore};
use crate::orphans::{find_orphans, grace_cutoff};
use crate::pipeline::batcher::OrphanedObject;
use crate::pipeline::report::UploadReport;
use crate::pipeline::{MediaFile, PipelineError, UploadContext, UploadPipeline};
use crate::store::{Database, MediaStore};
use chrono::Utc;
use log::{error, info, warn};
use rand::seq::SliceRandom;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

const DEFAULT_RANDOM_COUNT: usize = 4;
const MAX_RANDOM_COUNT: usize = 30;

/// Images visible to a viewer at `viewer`; every image when no location is given.
fn gallery(media: &[MediaItem], viewer: Option<Location>) -> Vec<&MediaItem> {
    media
        .iter()
        .filter(|m| m.media_type == MediaType::Image)
        .filter(|m| viewer.map_or(true, |v| m.location.visible_at(v)))
        .collect()
}

#[get("/photos?<location>")]
async fn list_photos(
    db: &State<Arc<Database>>,
    location: Option<String>,
) -> ApiResult<Json<Vec<MediaItem>>> {
    let viewer = parse_location(location.as_deref())?;
    let photos: Vec<MediaItem> = db
        .read(|c| gallery(&c.media, viewer).into_iter().cloned().collect())
        .await;
    Ok(Json(photos))
}

#[get("/photos/random?<count>&<location>")]
async fn random_photos(
    db: &State<Arc<Database>>,
    count: Option<usize>,
    location: Option<String>,
) -> ApiResult<Json<Vec<MediaItem>>> {
    let viewer = parse_location(location.as_deref())?;
    let count = count.unwrap_or(DEFAULT_RANDOM_COUNT).min(MAX_RANDOM_COUNT);
    let photos: Vec<MediaItem> = db
        .read(|c| {
            gallery(&c.media, viewer)
                .choose_multiple(&mut rand::thread_rng(), count)
                .map(|m| (*m).clone())
                .collect()
        })
        .await;
    Ok(Json(photos))
}

#[derive(Debug, FromForm)]
struct UploadForm<'r> {
    #[field(default = Vec::new())]
    files: Vec<TempFile<'r>>,
    location: Option<String>,
    username: Option<String>,
}

/// The bare file name the browser sent, without any directories.
fn upload_name(file: &TempFile<'_>, position: usize) -> String {
    file.raw_name()
        .map(|n| n.dangerous_unsafe_unsanitized_raw().as_str())
        .and_then(|raw| raw.rsplit(|c| c == '/' || c == '\\').next())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("file-{}", position + 1))
}

/// Refers to the part where Rocket spooled it; only parts Rocket kept in
/// memory are copied. The spool file lives as long as the form.
async fn read_upload(file: &TempFile<'_>, position: usize) -> std::io::Result<MediaFile> {
    let body = match file.path() {
        Some(path) => ObjectBody::Spooled {
            path: path.to_path_buf(),
            len: file.len(),
        },
        None => {
            let mut bytes = Vec::with_capacity(file.len() as usize);
            let reader = file.open().await?;
            tokio::pin!(reader);
            reader.read_to_end(&mut bytes).await?;
            ObjectBody::Bytes(bytes)
        }
    };

    Ok(MediaFile {
        file_name: upload_name(file, position),
        content_type: file.content_type().map(|ct| ct.to_string()),
        body,
    })
}

/// Body of a 500 reply when uploads landed but could not be recorded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnrecordedUpload {
    message: String,
    orphaned: Vec<OrphanedObject>,
    report: UploadReport,
}

enum UploadReply {
    Finished(UploadReport),
    Rejected(ApiError),
    Unrecorded(UnrecordedUpload),
}

impl<'r> Responder<'r, 'static> for UploadReply {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        match self {
            UploadReply::Finished(report) => {
                let status = if report.succeeded.is_empty() {
                    Status::UnprocessableEntity
                } else {
                    Status::Created
                };
                (status, Json(report)).respond_to(req)
            }
            UploadReply::Rejected(e) => e.respond_to(req),
            UploadReply::Unrecorded(body) => {
                (Status::InternalServerError, Json(body)).respond_to(req)
            }
        }
    }
}

/// Runs a multipart batch through the upload pipeline.
///
/// Dropping the request (client gone) cancels uploads that have not started.
#[post("/upload-media", data = "<form>")]
async fn upload_media(
    pipeline: &State<UploadPipeline>,
    notifier: &State<Notifier>,
    form: Form<UploadForm<'_>>,
) -> UploadReply {
    let form = form.into_inner();
    let location = match parse_location(form.location.as_deref()) {
        Ok(location) => location.unwrap_or(Location::Canada),
        Err(e) => return UploadReply::Rejected(e),
    };
    let context = UploadContext::new(location, form.username);

    let mut files = Vec::with_capacity(form.files.len());
    for (position, file) in form.files.iter().enumerate() {
        match read_upload(file, position).await {
            Ok(file) => files.push(file),
            Err(e) => {
                error!("Could not read uploaded file {}: {}", position + 1, e);
                return UploadReply::Rejected(ApiError::Internal(
                    "Could not read the uploaded files.".to_string(),
                ));
            }
        }
    }

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match pipeline.run(files, &context, &cancel).await {
        Ok(report) => {
            for item in &report.succeeded {
                notifier.publish(LiveEvent::photo_updated(item));
            }
            UploadReply::Finished(report)
        }
        Err(PipelineError::BatchPersist { error, report }) => {
            UploadReply::Unrecorded(UnrecordedUpload {
                message: error.to_string(),
                orphaned: error.orphaned,
                report,
            })
        }
        Err(e) => UploadReply::Rejected(ApiError::BadRequest(e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaReference {
    url: String,
    media_type: MediaType,
}

#[derive(Debug, Deserialize)]
struct MediaMetadataBatch {
    #[serde(default)]
    media: Vec<MediaReference>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Serialize)]
struct SavedMedia {
    message: String,
    media: Vec<MediaItem>,
}

/// Records media that the browser already uploaded on its own.
#[post("/save-media-metadata", data = "<batch>")]
async fn save_media_metadata(
    db: &State<Arc<Database>>,
    pipeline: &State<UploadPipeline>,
    notifier: &State<Notifier>,
    batch: Json<MediaMetadataBatch>,
) -> ApiResult<(Status, Json<SavedMedia>)> {
    let batch = batch.into_inner();
    let max = pipeline.config().max_batch_files;
    if batch.media.is_empty() {
        return Err(ApiError::BadRequest("No media metadata provided.".to_string()));
    }
    if batch.media.len() > max {
        return Err(ApiError::BadRequest(format!(
            "Cannot save metadata for more than {} files at once.",
            max
        )));
    }

    let context = UploadContext::new(batch.location.unwrap_or(Location::Canada), batch.username);
    let uploaded_at = Utc::now();
    let records = batch
        .media
        .into_iter()
        .map(|m| NewMediaItem {
            url: m.url,
            media_type: m.media_type,
            location: context.location,
            uploaded_at,
            uploaded_by: context.username.clone(),
        })
        .collect();

    let saved = db.insert_media(records).await?;
    info!("Saved metadata for {} media items", saved.len());
    for item in &saved {
        notifier.publish(LiveEvent::photo_updated(item));
    }

    Ok((
        Status::Created,
        Json(SavedMedia {
            message: format!("Successfully saved metadata for {} files", saved.len()),
            media: saved,
        }),
    ))
}

#[delete("/photos/<id>")]
async fn delete_photo(
    _admin: Admin,
    db: &State<Arc<Database>>,
    objects: &State<Arc<dyn ObjectStore>>,
    notifier: &State<Notifier>,
    id: &str,
) -> ApiResult<Json<Message>> {
    let removed = db
        .try_write(|c| {
            let position = c
                .media
                .iter()
                .position(|m| m.id == id)
                .ok_or_else(|| ApiError::NotFound("Photo not found".to_string()))?;
            Ok::<_, ApiError>(c.media.remove(position))
        })
        .await?;

    if let Err(e) = objects.delete(&removed.url).await {
        warn!("Deleted record {} but not its object {}: {}", removed.id, removed.url, e);
    }

    notifier.publish(LiveEvent::PhotoDeleted {
        id: removed.id,
        url: removed.url,
    });
    Ok(Message::new("Photo deleted successfully"))
}

#[derive(Debug, Serialize)]
struct OrphanReport {
    count: usize,
    urls: Vec<String>,
}

#[get("/admin/orphans")]
async fn list_orphans(
    _admin: Admin,
    config: &State<AppConfig>,
    db: &State<Arc<Database>>,
    objects: &State<Arc<dyn ObjectStore>>,
) -> ApiResult<Json<OrphanReport>> {
    let settled_before = grace_cutoff(config.orphan_grace);
    let urls = find_orphans(objects.inner().as_ref(), db, settled_before)
        .await
        .map_err(|e| {
            error!("Orphan audit failed: {}", e);
            ApiError::Internal("Could not list stored objects.".to_string())
        })?;
    Ok(Json(OrphanReport {
        count: urls.len(),
        urls,
    }))
}

pub fn routes() -> Vec<Route> {
    routes![
        list_photos,
        random_photos,
        upload_media,
        save_media_metadata,
        delete_photo,
        list_orphans
    ]
}
