//! iCalendar export of a celebration.

use crate::models::Event;
use chrono::{DateTime, Duration, Utc};

const DEFAULT_LENGTH_HOURS: i64 = 6;
const REMINDER_MINUTES: u32 = 120;
const MAX_LINE_OCTETS: usize = 75;

/// Escapes TEXT values per RFC 5545.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Folds a content line into 75-octet chunks without splitting characters.
fn fold_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out.push_str("\r\n");
    out
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Calendar invite for `event`, with a reminder two hours before it starts.
pub fn event_ics(event: &Event, title: &str, invite_url: Option<&str>, now: DateTime<Utc>) -> String {
    let end = event
        .end_date
        .unwrap_or(event.date + Duration::hours(DEFAULT_LENGTH_HOURS));

    let mut description = format!("Join us to celebrate {}!", title);
    if let Some(url) = invite_url {
        description.push_str(&format!("\n\nLink to invite: {}", url));
    }

    let venue = [event.venue.name.trim(), event.venue.address.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//wedding-server//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@wedding-server", uuid::Uuid::new_v4()),
        format!("DTSTAMP:{}", timestamp(now)),
        format!("DTSTART:{}", timestamp(event.date)),
        format!("DTEND:{}", timestamp(end)),
        format!("SUMMARY:{}", escape_text(title)),
        format!("DESCRIPTION:{}", escape_text(&description)),
    ];
    if !venue.is_empty() {
        lines.push(format!("LOCATION:{}", escape_text(&venue)));
    }
    if let Some(url) = invite_url {
        lines.push(format!("URL:{}", url));
    }
    lines.extend([
        "STATUS:CONFIRMED".to_string(),
        "TRANSP:OPAQUE".to_string(),
        "X-MICROSOFT-CDO-BUSYSTATUS:BUSY".to_string(),
        "BEGIN:VALARM".to_string(),
        "ACTION:DISPLAY".to_string(),
        format!("TRIGGER:-PT{}M", REMINDER_MINUTES),
        format!("DESCRIPTION:{}", escape_text(&format!("Reminder: {}", title))),
        "END:VALARM".to_string(),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ]);

    lines.iter().map(|l| fold_line(l)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, Venue};
    use chrono::TimeZone;

    fn event(end_date: Option<DateTime<Utc>>) -> Event {
        Event {
            id: "e1".into(),
            location: Location::Canada,
            date: Utc.with_ymd_and_hms(2025, 8, 23, 21, 0, 0).unwrap(),
            end_date,
            venue: Venue {
                name: "Sheraton Parkway".into(),
                address: "600 Hwy 7, Richmond Hill".into(),
                google_maps_link: String::new(),
            },
            schedule: vec![],
        }
    }

    #[test]
    fn test_ics_contains_times_alarm_and_link() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let ics = event_ics(&event(None), "Ana & Ben's Wedding", Some("https://w.example/invite/i1"), now);

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains("DTSTART:20250823T210000Z\r\n"));
        assert!(ics.contains("DTEND:20250824T030000Z\r\n"));
        assert!(ics.contains("TRIGGER:-PT120M\r\n"));
        assert!(ics.contains("URL:https://w.example/invite/i1\r\n"));
        assert!(ics.contains("LOCATION:Sheraton Parkway\\, 600 Hwy 7\\, Richmond Hill\r\n"));
        assert!(ics.lines().all(|l| l.len() <= MAX_LINE_OCTETS + 1));
    }

    #[test]
    fn test_ics_uses_end_date_and_omits_missing_link() {
        let end = Utc.with_ymd_and_hms(2025, 8, 24, 4, 0, 0).unwrap();
        let ics = event_ics(&event(Some(end)), "Wedding", None, Utc::now());
        assert!(ics.contains("DTEND:20250824T040000Z\r\n"));
        assert!(!ics.contains("URL:"));
    }

    #[test]
    fn test_escape_and_fold() {
        assert_eq!(escape_text("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");

        let long = format!("DESCRIPTION:{}", "x".repeat(100));
        let folded = fold_line(&long);
        let parts: Vec<&str> = folded.trim_end_matches("\r\n").split("\r\n").collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 75);
        assert!(parts[1].starts_with(' '));
        assert_eq!(folded.replace("\r\n ", ""), format!("{}\r\n", long));
    }
}
