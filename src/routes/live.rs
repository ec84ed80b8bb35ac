//! Server-sent events for photo and registry changes.

use crate::notifier::Notifier;
use log::warn;
use rocket::response::stream::{Event, EventStream};
use rocket::tokio::select;
use rocket::tokio::sync::broadcast::error::RecvError;
use rocket::{Route, Shutdown, State};

#[get("/live")]
fn live(notifier: &State<Notifier>, mut end: Shutdown) -> EventStream![] {
    let mut rx = notifier.subscribe();
    EventStream! {
        loop {
            let event = select! {
                received = rx.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Live listener fell behind, skipped {} events", skipped);
                        continue;
                    }
                },
                _ = &mut end => break,
            };
            yield Event::json(&event.payload()).event(event.name());
        }
    }
}

pub fn routes() -> Vec<Route> {
    routes![live]
}

#[cfg(test)]
mod tests {
    use super::super::testing::site;
    use crate::store::Collections;
    use rocket::http::{ContentType, Status};

    #[rocket::async_test]
    async fn test_live_is_an_event_stream() {
        let site = site(Collections::default()).await;
        let response = site.client.get("/api/live").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(ContentType::EventStream));
        site.client.rocket().shutdown().notify();
    }
}
