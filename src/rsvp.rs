//! RSVP rules, the admin summary and CSV export.

use crate::models::{new_id, AttendingStatus, Guest, Invite, Location};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RsvpError {
    #[error("Invalid RSVP status for {0}. They can only RSVP to events they're invited to.")]
    InvalidStatus(String),
    #[error("Every guest needs a first name.")]
    MissingName,
    #[error("An invite needs at least one guest.")]
    NoGuests,
    #[error("Every invited guest must be included in the RSVP.")]
    GuestRemoved,
    #[error("This invite does not include a plus one.")]
    PlusOneNotGiven,
    #[error("Only one additional guest can be added to an invite.")]
    TooManyGuests,
}

/// Whether a guest of an invite to `invited` may answer `status`.
pub fn status_allowed(invited: Location, status: AttendingStatus) -> bool {
    if status == AttendingStatus::NotAttending {
        return true;
    }
    match invited {
        Location::Both => true,
        Location::Canada => status == AttendingStatus::CanadaOnly,
        Location::Australia => status == AttendingStatus::AustraliaOnly,
    }
}

fn check_names(guests: &[Guest]) -> Result<(), RsvpError> {
    if guests.iter().any(|g| g.first_name.trim().is_empty()) {
        return Err(RsvpError::MissingName);
    }
    Ok(())
}

/// Body of `PUT /api/invites/<id>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpSubmission {
    pub guests: Vec<Guest>,
    #[serde(default)]
    pub num_guests_on_bus: Option<u32>,
    #[serde(default)]
    pub num_guests_morning_breakfast: Option<u32>,
    #[serde(default)]
    pub guest_accommodation_address: Option<String>,
    #[serde(default)]
    pub guest_accommodation_local_name: Option<String>,
}

/// Records a guest's RSVP on `invite`.
///
/// Nothing is changed when the submission is rejected.
pub fn apply_rsvp(
    invite: &mut Invite,
    submission: RsvpSubmission,
    now: DateTime<Utc>,
) -> Result<(), RsvpError> {
    check_names(&submission.guests)?;
    for guest in &submission.guests {
        if !status_allowed(invite.invited_location, guest.attending_status) {
            return Err(RsvpError::InvalidStatus(guest.first_name.clone()));
        }
    }

    let invited = invite.guests.len();
    let answered = submission.guests.len();
    let adds_plus_one = if answered < invited {
        return Err(RsvpError::GuestRemoved);
    } else if answered == invited {
        false
    } else if answered == invited + 1 {
        if !invite.given_plus_one {
            return Err(RsvpError::PlusOneNotGiven);
        }
        true
    } else {
        return Err(RsvpError::TooManyGuests);
    };

    invite.guests = submission.guests;
    invite.has_rsvpd = true;
    invite.rsvp_submitted_at = Some(now);
    invite.updated_at = now;
    if adds_plus_one {
        invite.given_plus_one = false;
    }

    if let Some(n) = submission.num_guests_on_bus {
        invite.num_guests_on_bus = Some(n);
    }
    if let Some(n) = submission.num_guests_morning_breakfast {
        invite.num_guests_morning_breakfast = Some(n);
    }
    if let Some(address) = submission.guest_accommodation_address {
        invite.guest_accommodation_address = Some(address);
    }
    if let Some(name) = submission.guest_accommodation_local_name {
        invite.guest_accommodation_local_name = Some(name);
    }
    Ok(())
}

/// Body of `POST /api/invites`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvite {
    pub guests: Vec<Guest>,
    #[serde(default)]
    pub given_plus_one: bool,
    pub invited_location: Location,
}

impl NewInvite {
    pub fn into_invite(self, now: DateTime<Utc>) -> Result<Invite, RsvpError> {
        if self.guests.is_empty() {
            return Err(RsvpError::NoGuests);
        }
        check_names(&self.guests)?;

        Ok(Invite {
            id: new_id(),
            guests: self.guests,
            has_rsvpd: false,
            given_plus_one: self.given_plus_one,
            invited_location: self.invited_location,
            rsvp_submitted_at: None,
            num_guests_on_bus: None,
            num_guests_morning_breakfast: None,
            guest_accommodation_address: None,
            guest_accommodation_local_name: None,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestSummary {
    pub name: String,
    pub invite_id: String,
    pub status: AttendingStatus,
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RsvpSummary {
    #[serde(rename = "Yes")]
    pub yes: Vec<GuestSummary>,
    #[serde(rename = "No")]
    pub no: Vec<GuestSummary>,
    #[serde(rename = "Not Responded")]
    pub not_responded: Vec<GuestSummary>,
}

pub fn summarize(invites: &[Invite]) -> RsvpSummary {
    let mut summary = RsvpSummary::default();
    for invite in invites {
        for guest in &invite.guests {
            let entry = GuestSummary {
                name: guest.full_name(),
                invite_id: invite.id.clone(),
                status: guest.attending_status,
                location: invite.invited_location,
            };
            let bucket = match guest.attending_status {
                _ if !invite.has_rsvpd => &mut summary.not_responded,
                AttendingStatus::NotAttending => &mut summary.no,
                AttendingStatus::CanadaOnly
                | AttendingStatus::AustraliaOnly
                | AttendingStatus::Both => &mut summary.yes,
                AttendingStatus::Pending => &mut summary.not_responded,
            };
            bucket.push(entry);
        }
    }
    summary
}

/// Which invites a CSV export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    All,
    Australia,
    Canada,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid location parameter. Use 'all', 'australia', or 'canada'")]
pub struct UnknownScope;

impl ExportScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportScope::All => "all",
            ExportScope::Australia => "australia",
            ExportScope::Canada => "canada",
        }
    }

    pub fn includes(self, invited: Location) -> bool {
        match self {
            ExportScope::All => true,
            ExportScope::Australia => invited.includes_australia(),
            ExportScope::Canada => invited.includes_canada(),
        }
    }
}

impl fmt::Display for ExportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportScope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ExportScope::All),
            "australia" => Ok(ExportScope::Australia),
            "canada" => Ok(ExportScope::Canada),
            _ => Err(UnknownScope),
        }
    }
}

const BASE_COLUMNS: [&str; 8] = [
    "Invite ID",
    "First Name",
    "Last Name",
    "Dietary Requirements",
    "Attending Status",
    "Invited Location",
    "Has RSVPd",
    "RSVP Submitted At",
];

const AUSTRALIA_COLUMNS: [&str; 6] = [
    "Num Guests On Bus",
    "Num Guests Morning Breakfast",
    "Guest Accommodation Address",
    "Guest Accommodation Local Name",
    "Total Num Guests on Bus",
    "Total Num Guests Breakfast",
];

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn optional_count(value: Option<u32>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

/// Builds the export for `scope`, or `None` when no invite matches.
///
/// The Canada export leaves out the Australian logistics. Every other scope
/// ends with a `TOTALS` row summing bus and breakfast counts of invites that
/// include Australia.
pub fn export_csv(invites: &[Invite], scope: ExportScope) -> Option<String> {
    let selected: Vec<&Invite> = invites
        .iter()
        .filter(|i| scope.includes(i.invited_location))
        .collect();
    if selected.is_empty() {
        return None;
    }

    let with_logistics = scope != ExportScope::Canada;
    let mut header: Vec<&str> = BASE_COLUMNS.to_vec();
    if with_logistics {
        header.extend(AUSTRALIA_COLUMNS);
    }

    let mut csv = header.join(",");
    csv.push('\n');

    for invite in &selected {
        for guest in &invite.guests {
            let mut row = vec![
                invite.id.clone(),
                quoted(&guest.first_name),
                quoted(guest.last_name.as_deref().unwrap_or_default()),
                quoted(&guest.dietary_requirements),
                quoted(guest.attending_status.as_str()),
                quoted(invite.invited_location.as_str()),
                if invite.has_rsvpd { "Yes" } else { "No" }.to_string(),
                invite
                    .rsvp_submitted_at
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                    .unwrap_or_default(),
            ];
            if with_logistics {
                row.extend([
                    optional_count(invite.num_guests_on_bus),
                    optional_count(invite.num_guests_morning_breakfast),
                    quoted(invite.guest_accommodation_address.as_deref().unwrap_or_default()),
                    quoted(
                        invite
                            .guest_accommodation_local_name
                            .as_deref()
                            .unwrap_or_default(),
                    ),
                    String::new(),
                    String::new(),
                ]);
            }
            csv.push_str(&row.join(","));
            csv.push('\n');
        }
    }

    if with_logistics {
        let australian = selected
            .iter()
            .filter(|i| i.invited_location.includes_australia());
        let (bus, breakfast) = australian.fold((0u64, 0u64), |(bus, breakfast), i| {
            (
                bus + u64::from(i.num_guests_on_bus.unwrap_or(0)),
                breakfast + u64::from(i.num_guests_morning_breakfast.unwrap_or(0)),
            )
        });

        let mut totals = vec![String::new(); header.len()];
        totals[0] = "TOTALS".to_string();
        totals[header.len() - 2] = bus.to_string();
        totals[header.len() - 1] = breakfast.to_string();
        csv.push_str(&totals.join(","));
        csv.push('\n');
    }

    Some(csv)
}

pub fn csv_filename(scope: ExportScope, date: NaiveDate) -> String {
    format!("rsvp-data-{}-{}.csv", scope, date.format("%Y-%m-%d"))
}
