use crate::auth::Admin;
use crate::error::{ApiError, ApiResult};
use crate::models::{new_id, Event, Location, ScheduleEntry, Venue};
use crate::store::Database;
use chrono::{DateTime, Utc};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use std::sync::Arc;

#[get("/events")]
async fn list_events(db: &State<Arc<Database>>) -> Json<Vec<Event>> {
    Json(db.read(|c| c.events.clone()).await)
}

#[get("/events/<location>")]
async fn events_at(db: &State<Arc<Database>>, location: Location) -> ApiResult<Json<Vec<Event>>> {
    let events: Vec<Event> = db
        .read(|c| {
            c.events
                .iter()
                .filter(|e| e.location == location)
                .cloned()
                .collect()
        })
        .await;

    if events.is_empty() {
        return Err(ApiError::NotFound(
            "No events found for this location".to_string(),
        ));
    }
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewEvent {
    location: Location,
    date: DateTime<Utc>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    venue: Venue,
    #[serde(default)]
    schedule: Vec<ScheduleEntry>,
}

#[post("/events", data = "<event>")]
async fn create_event(
    _admin: Admin,
    db: &State<Arc<Database>>,
    event: Json<NewEvent>,
) -> ApiResult<(Status, Json<Event>)> {
    let event = event.into_inner();
    if event.location == Location::Both {
        return Err(ApiError::BadRequest(
            "An event takes place in either Canada or Australia.".to_string(),
        ));
    }
    if event.end_date.is_some_and(|end| end <= event.date) {
        return Err(ApiError::BadRequest(
            "An event must end after it starts.".to_string(),
        ));
    }

    let event = Event {
        id: new_id(),
        location: event.location,
        date: event.date,
        end_date: event.end_date,
        venue: event.venue,
        schedule: event.schedule,
    };
    let created = event.clone();
    db.write(move |c| c.events.push(event)).await?;
    Ok((Status::Created, Json(created)))
}

pub fn routes() -> Vec<Route> {
    routes![list_events, events_at, create_event]
}
