//! Records kept in the document store and the closed vocabularies they use.

use chrono::{DateTime, Utc};
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a guest is invited to, or where a photo was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    #[serde(rename = "Canada")]
    Canada,
    #[serde(rename = "Australia")]
    Australia,
    #[serde(rename = "Both Australia and Canada")]
    Both,
}

impl Location {
    pub fn as_str(self) -> &'static str {
        match self {
            Location::Canada => "Canada",
            Location::Australia => "Australia",
            Location::Both => "Both Australia and Canada",
        }
    }

    /// True when content tagged with `self` should be shown to a viewer at `viewer`.
    pub fn visible_at(self, viewer: Location) -> bool {
        match (self, viewer) {
            (Location::Both, _) | (_, Location::Both) => true,
            (tag, viewer) => tag == viewer,
        }
    }

    /// True when this location includes the Australian celebration.
    pub fn includes_australia(self) -> bool {
        matches!(self, Location::Australia | Location::Both)
    }

    /// True when this location includes the Canadian celebration.
    pub fn includes_canada(self) -> bool {
        matches!(self, Location::Canada | Location::Both)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown location '{0}'")]
pub struct UnknownLocation(pub String);

impl FromStr for Location {
    type Err = UnknownLocation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "canada" => Ok(Location::Canada),
            "australia" => Ok(Location::Australia),
            "both" | "both australia and canada" => Ok(Location::Both),
            _ => Err(UnknownLocation(trimmed.to_string())),
        }
    }
}

impl<'a> FromParam<'a> for Location {
    type Error = UnknownLocation;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse()
    }
}

/// A guest's answer to their invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttendingStatus {
    #[default]
    #[serde(rename = "")]
    Pending,
    #[serde(rename = "Canada Only")]
    CanadaOnly,
    #[serde(rename = "Australia Only")]
    AustraliaOnly,
    #[serde(rename = "Both Australia and Canada")]
    Both,
    #[serde(rename = "Not Attending")]
    NotAttending,
}

impl AttendingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendingStatus::Pending => "",
            AttendingStatus::CanadaOnly => "Canada Only",
            AttendingStatus::AustraliaOnly => "Australia Only",
            AttendingStatus::Both => "Both Australia and Canada",
            AttendingStatus::NotAttending => "Not Attending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A photo or video that has been uploaded and recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub url: String,
    pub media_type: MediaType,
    pub location: Location,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: String,
}

/// A media record about to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMediaItem {
    pub url: String,
    pub media_type: MediaType,
    pub location: Location,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub dietary_requirements: String,
    #[serde(default)]
    pub attending_status: AttendingStatus,
}

impl Guest {
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref().map(str::trim) {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    #[serde(rename = "_id")]
    pub id: String,
    pub guests: Vec<Guest>,
    #[serde(rename = "hasRSVPd")]
    pub has_rsvpd: bool,
    pub given_plus_one: bool,
    pub invited_location: Location,
    #[serde(default)]
    pub rsvp_submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_guests_on_bus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_guests_morning_breakfast: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_accommodation_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_accommodation_local_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub google_maps_link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub time: String,
    pub description: String,
}

/// One celebration: a location, a date, a venue and its running order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "_id")]
    pub id: String,
    pub location: Location,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub venue: Venue,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub item: String,
    pub is_bought: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    #[serde(rename = "_id")]
    pub id: String,
    pub role: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

/// New record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
