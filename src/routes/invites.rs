//! Invites, RSVPs and their exports.

use crate::auth::Admin;
use crate::calendar::event_ics;
use crate::config::AppConfig;
use crate::error::{ApiError, ApiResult, Message};
use crate::models::{Invite, Location};
use crate::rsvp::{self, ExportScope, NewInvite, RsvpError, RsvpSubmission, RsvpSummary};
use crate::store::Database;
use chrono::Utc;
use log::info;
use rocket::http::{ContentType, Header, Status};
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Serialize;
use std::sync::Arc;

impl From<RsvpError> for ApiError {
    fn from(e: RsvpError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

fn invite_not_found() -> ApiError {
    ApiError::NotFound("Invite not found".to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteCheck {
    is_valid: bool,
}

#[get("/check-invite/<id>")]
async fn check_invite(db: &State<Arc<Database>>, id: &str) -> Json<InviteCheck> {
    let is_valid = db.read(|c| c.invites.iter().any(|i| i.id == id)).await;
    Json(InviteCheck { is_valid })
}

#[get("/all-invites")]
async fn all_invites(_admin: Admin, db: &State<Arc<Database>>) -> Json<Vec<Invite>> {
    Json(db.read(|c| c.invites.clone()).await)
}

#[get("/rsvp-summary")]
async fn rsvp_summary(_admin: Admin, db: &State<Arc<Database>>) -> Json<RsvpSummary> {
    Json(db.read(|c| rsvp::summarize(&c.invites)).await)
}

#[get("/invites/<id>")]
async fn get_invite(db: &State<Arc<Database>>, id: &str) -> ApiResult<Json<Invite>> {
    db.read(|c| c.invites.iter().find(|i| i.id == id).cloned())
        .await
        .map(Json)
        .ok_or_else(invite_not_found)
}

/// Records the guests' answers. Anyone holding the invite link may RSVP.
#[put("/invites/<id>", data = "<submission>")]
async fn submit_rsvp(
    db: &State<Arc<Database>>,
    id: &str,
    submission: Json<RsvpSubmission>,
) -> ApiResult<Json<Invite>> {
    let submission = submission.into_inner();
    let invite = db
        .try_write(|c| {
            let invite = c
                .invites
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or_else(invite_not_found)?;
            rsvp::apply_rsvp(invite, submission, Utc::now())?;
            Ok::<_, ApiError>(invite.clone())
        })
        .await?;

    info!("RSVP received for invite {}", invite.id);
    Ok(Json(invite))
}

#[post("/invites", data = "<invite>")]
async fn create_invite(
    _admin: Admin,
    db: &State<Arc<Database>>,
    invite: Json<NewInvite>,
) -> ApiResult<(Status, Json<Invite>)> {
    let invite = invite.into_inner().into_invite(Utc::now())?;
    let created = invite.clone();
    db.write(move |c| c.invites.push(invite)).await?;
    Ok((Status::Created, Json(created)))
}

#[delete("/invites/<id>")]
async fn delete_invite(
    _admin: Admin,
    db: &State<Arc<Database>>,
    id: &str,
) -> ApiResult<Json<Message>> {
    db.try_write(|c| {
        let position = c
            .invites
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(invite_not_found)?;
        c.invites.remove(position);
        Ok::<_, ApiError>(())
    })
    .await?;
    Ok(Message::new("Invite deleted successfully"))
}

/// A file the browser should save rather than display.
#[derive(Responder)]
pub struct Download {
    body: String,
    content_type: ContentType,
    disposition: Header<'static>,
}

impl Download {
    fn new(body: String, content_type: ContentType, file_name: &str) -> Self {
        Self {
            body,
            content_type,
            disposition: Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", file_name),
            ),
        }
    }
}

#[get("/export-rsvp-csv/<scope>")]
async fn export_rsvp_csv(
    _admin: Admin,
    db: &State<Arc<Database>>,
    scope: &str,
) -> ApiResult<Download> {
    let scope: ExportScope = scope
        .parse()
        .map_err(|e: rsvp::UnknownScope| ApiError::BadRequest(e.to_string()))?;

    let csv = db
        .read(|c| rsvp::export_csv(&c.invites, scope))
        .await
        .ok_or_else(|| ApiError::NotFound("No invites found for the specified location".to_string()))?;

    Ok(Download::new(
        csv,
        ContentType::new("text", "csv"),
        &rsvp::csv_filename(scope, Utc::now().date_naive()),
    ))
}

#[get("/download-ics/<location>?<invite>")]
async fn download_ics(
    db: &State<Arc<Database>>,
    config: &State<AppConfig>,
    location: Location,
    invite: Option<String>,
) -> ApiResult<Download> {
    let (event, invite_known) = db
        .read(|c| {
            let event = c.events.iter().find(|e| e.location == location).cloned();
            let known = invite
                .as_deref()
                .map(|id| c.invites.iter().any(|i| i.id == id));
            (event, known)
        })
        .await;

    if invite_known == Some(false) {
        return Err(invite_not_found());
    }
    let event =
        event.ok_or_else(|| ApiError::NotFound("No events found for this location".to_string()))?;

    let invite_url = invite.as_deref().map(|id| config.invite_url(id));
    let ics = event_ics(&event, &config.wedding_title, invite_url.as_deref(), Utc::now());
    let file_name = format!("wedding-{}.ics", location.as_str().to_lowercase());

    Ok(Download::new(ics, ContentType::new("text", "calendar"), &file_name))
}

pub fn routes() -> Vec<Route> {
    routes![
        check_invite,
        all_invites,
        rsvp_summary,
        get_invite,
        submit_rsvp,
        create_invite,
        delete_invite,
        export_rsvp_csv,
        download_ics
    ]
}
