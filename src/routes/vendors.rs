//! Wedding vendors and how to reach them.

use super::parse_location;
use crate::auth::Admin;
use crate::error::{ApiError, ApiResult, Message};
use crate::models::{new_id, Location, Vendor};
use crate::store::Database;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;
use std::sync::Arc;

fn vendor_not_found() -> ApiError {
    ApiError::NotFound("Vendor not found".to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[get("/vendors?<location>")]
async fn list_vendors(
    db: &State<Arc<Database>>,
    location: Option<String>,
) -> ApiResult<Json<Vec<Vendor>>> {
    let location = parse_location(location.as_deref())?;
    let vendors: Vec<Vendor> = db
        .read(|c| {
            c.vendors
                .iter()
                .filter(|v| location.is_none() || v.location == location)
                .cloned()
                .collect()
        })
        .await;
    Ok(Json(vendors))
}

#[derive(Debug, Default, Deserialize)]
struct VendorFields {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    contact: Option<String>,
}

#[post("/vendors", data = "<vendor>")]
async fn add_vendor(
    _admin: Admin,
    db: &State<Arc<Database>>,
    vendor: Json<VendorFields>,
) -> ApiResult<(Status, Json<Vendor>)> {
    let fields = vendor.into_inner();
    let (Some(role), Some(name)) = (non_empty(fields.role), non_empty(fields.name)) else {
        return Err(ApiError::BadRequest(
            "A vendor needs both a role and a name.".to_string(),
        ));
    };

    let vendor = Vendor {
        id: new_id(),
        role,
        name,
        location: fields.location,
        contact: non_empty(fields.contact),
    };
    let created = vendor.clone();
    db.write(move |c| c.vendors.push(vendor)).await?;
    Ok((Status::Created, Json(created)))
}

/// Updates the vendor currently named `previous_name`; blank fields are left alone.
#[put("/vendors/<previous_name>", data = "<update>")]
async fn update_vendor(
    _admin: Admin,
    db: &State<Arc<Database>>,
    previous_name: &str,
    update: Json<VendorFields>,
) -> ApiResult<Json<Vendor>> {
    let fields = update.into_inner();
    let updated = db
        .try_write(|c| {
            let vendor = c
                .vendors
                .iter_mut()
                .find(|v| v.name == previous_name)
                .ok_or_else(vendor_not_found)?;
            if let Some(role) = non_empty(fields.role) {
                vendor.role = role;
            }
            if let Some(name) = non_empty(fields.name) {
                vendor.name = name;
            }
            if let Some(location) = fields.location {
                vendor.location = Some(location);
            }
            if let Some(contact) = non_empty(fields.contact) {
                vendor.contact = Some(contact);
            }
            Ok::<_, ApiError>(vendor.clone())
        })
        .await?;
    Ok(Json(updated))
}

#[delete("/vendors/<role>")]
async fn remove_vendor(
    _admin: Admin,
    db: &State<Arc<Database>>,
    role: &str,
) -> ApiResult<Json<Message>> {
    db.try_write(|c| {
        let position = c
            .vendors
            .iter()
            .position(|v| v.role == role)
            .ok_or_else(vendor_not_found)?;
        c.vendors.remove(position);
        Ok::<_, ApiError>(())
    })
    .await?;
    Ok(Message::new("Vendor deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![list_vendors, add_vendor, update_vendor, remove_vendor]
}
