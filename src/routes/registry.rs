//! Gift registry. Guests mark items bought; changes go out live.

use crate::auth::Admin;
use crate::error::{ApiError, ApiResult, Message};
use crate::models::{new_id, RegistryItem};
use crate::notifier::{LiveEvent, Notifier};
use crate::store::Database;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use std::sync::Arc;

fn item_not_found() -> ApiError {
    ApiError::NotFound("Registry item not found".to_string())
}

#[get("/registry")]
async fn list_registry(db: &State<Arc<Database>>) -> Json<Vec<RegistryItem>> {
    Json(db.read(|c| c.registry.clone()).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewRegistryItem {
    item: String,
    #[serde(default)]
    is_bought: bool,
}

#[post("/registry", data = "<item>")]
async fn add_item(
    _admin: Admin,
    db: &State<Arc<Database>>,
    notifier: &State<Notifier>,
    item: Json<NewRegistryItem>,
) -> ApiResult<(Status, Json<RegistryItem>)> {
    let new = item.into_inner();
    let name = new.item.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("A registry item needs a name.".to_string()));
    }

    let item = db
        .try_write(|c| {
            if c.registry.iter().any(|r| r.item == name) {
                return Err(ApiError::BadRequest(format!(
                    "'{}' is already on the registry.",
                    name
                )));
            }
            let item = RegistryItem {
                id: new_id(),
                item: name.clone(),
                is_bought: new.is_bought,
            };
            c.registry.push(item.clone());
            Ok(item)
        })
        .await?;

    notifier.publish(LiveEvent::registry_added(&item));
    Ok((Status::Created, Json(item)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoughtUpdate {
    is_bought: bool,
}

#[put("/registry/<item>", data = "<update>")]
async fn mark_item(
    db: &State<Arc<Database>>,
    notifier: &State<Notifier>,
    item: &str,
    update: Json<BoughtUpdate>,
) -> ApiResult<Json<RegistryItem>> {
    let is_bought = update.is_bought;
    let updated = db
        .try_write(|c| {
            let entry = c
                .registry
                .iter_mut()
                .find(|r| r.item == item)
                .ok_or_else(item_not_found)?;
            entry.is_bought = is_bought;
            Ok::<_, ApiError>(entry.clone())
        })
        .await?;

    notifier.publish(LiveEvent::registry_updated(&updated));
    Ok(Json(updated))
}

#[delete("/registry/<item>")]
async fn remove_item(
    _admin: Admin,
    db: &State<Arc<Database>>,
    notifier: &State<Notifier>,
    item: &str,
) -> ApiResult<Json<Message>> {
    let removed = db
        .try_write(|c| {
            let position = c
                .registry
                .iter()
                .position(|r| r.item == item)
                .ok_or_else(item_not_found)?;
            Ok::<_, ApiError>(c.registry.remove(position))
        })
        .await?;

    notifier.publish(LiveEvent::RegistryItemDeleted { item: removed.item });
    Ok(Message::new("Registry item deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![list_registry, add_item, mark_item, remove_item]
}

#[cfg(test)]
mod tests {
    use super::super::testing::{admin_header, site, ADMIN_TOKEN};
    use super::*;
    use crate::store::Collections;
    use rocket::http::{ContentType, Header};

    #[rocket::async_test]
    async fn test_registry_lifecycle_broadcasts_each_change() {
        let site = site(Collections::default()).await;
        let notifier = site.client.rocket().state::<Notifier>().unwrap();
        let mut events = notifier.subscribe();

        let added = site
            .client
            .post("/api/registry")
            .header(admin_header())
            .header(ContentType::JSON)
            .body(r#"{"item":"Stand Mixer"}"#)
            .dispatch()
            .await;
        assert_eq!(added.status(), Status::Created);

        let duplicate = site
            .client
            .post("/api/registry")
            .header(admin_header())
            .header(ContentType::JSON)
            .body(r#"{"item":"Stand Mixer"}"#)
            .dispatch()
            .await;
        assert_eq!(duplicate.status(), Status::BadRequest);

        let bought = site
            .client
            .put("/api/registry/Stand%20Mixer")
            .header(ContentType::JSON)
            .body(r#"{"isBought":true}"#)
            .dispatch()
            .await;
        assert_eq!(bought.status(), Status::Ok);
        let bought: RegistryItem = bought.into_json().await.unwrap();
        assert!(bought.is_bought);

        let anonymous = site.client.delete("/api/registry/Stand%20Mixer").dispatch().await;
        assert_eq!(anonymous.status(), Status::Forbidden);
        let near_miss = ADMIN_TOKEN.replace('t', "T");
        let wrong_token = site
            .client
            .delete("/api/registry/Stand%20Mixer")
            .header(Header::new("Authorization", format!("Bearer {}", near_miss)))
            .dispatch()
            .await;
        assert_eq!(wrong_token.status(), Status::Forbidden);
        let removed = site
            .client
            .delete("/api/registry/Stand%20Mixer")
            .header(admin_header())
            .dispatch()
            .await;
        assert_eq!(removed.status(), Status::Ok);

        let names: Vec<&str> = vec![
            events.recv().await.unwrap().name(),
            events.recv().await.unwrap().name(),
            events.recv().await.unwrap().name(),
        ];
        assert_eq!(
            names,
            vec!["registry-item-added", "registry-updated", "registry-item-deleted"]
        );
        assert!(events.try_recv().is_err());
    }

    #[rocket::async_test]
    async fn test_marking_unknown_item_is_not_found() {
        let site = site(Collections::default()).await;
        let response = site
            .client
            .put("/api/registry/Nothing")
            .header(ContentType::JSON)
            .body(r#"{"isBought":true}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }
}
