//! Provider-neutral records from the events API, and the typed rows
//! written to tabular sinks.
//!
//! The source deserializes API responses into these types, and the sync
//! machinery works exclusively with them. Each sink destination has a fixed
//! row schema (`COLUMNS` + `to_row`) so a column-order regression is a
//! compile-time visible change, not a runtime surprise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An event as returned by the events API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEvent {
    pub id: String,
    pub name: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    /// Hosts ride along with the event payload; there is no separate
    /// host-listing endpoint.
    #[serde(default)]
    pub hosts: Vec<ApiHost>,
}

/// An event host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHost {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

/// A guest registration for an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiGuest {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    /// e.g. "approved", "pending_approval", "declined"
    pub approval_status: String,
    pub registered_at: Option<DateTime<Utc>>,
    pub checked_in_at: Option<DateTime<Utc>>,
}

fn fmt_time(t: &Option<DateTime<Utc>>) -> String {
    t.map(|dt| dt.to_rfc3339()).unwrap_or_default()
}

/// Row schema for the events destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub event_id: String,
    pub name: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub location: String,
    pub url: String,
    pub host_names: String,
}

impl EventRow {
    pub const COLUMNS: &'static [&'static str] = &[
        "event_id", "name", "start_at", "end_at", "location", "url", "hosts",
    ];

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.event_id.clone(),
            self.name.clone(),
            self.start_at.to_rfc3339(),
            fmt_time(&self.end_at),
            self.location.clone(),
            self.url.clone(),
            self.host_names.clone(),
        ]
    }
}

impl From<&ApiEvent> for EventRow {
    fn from(event: &ApiEvent) -> Self {
        let host_names: Vec<&str> = event.hosts.iter().map(|h| h.name.as_str()).collect();
        EventRow {
            event_id: event.id.clone(),
            name: event.name.clone(),
            start_at: event.start_at,
            end_at: event.end_at,
            location: event.location.clone().unwrap_or_default(),
            url: event.url.clone().unwrap_or_default(),
            host_names: host_names.join(", "),
        }
    }
}

/// Row schema for the guests destination.
///
/// Buffered in `SyncState` between flushes, so it must serialize cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestRow {
    pub guest_id: String,
    pub event_id: String,
    pub name: String,
    pub email: String,
    pub approval_status: String,
    pub registered_at: Option<DateTime<Utc>>,
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl GuestRow {
    pub const COLUMNS: &'static [&'static str] = &[
        "guest_id",
        "event_id",
        "name",
        "email",
        "approval_status",
        "registered_at",
        "checked_in_at",
    ];

    pub fn from_api(guest: &ApiGuest, event_id: &str) -> Self {
        GuestRow {
            guest_id: guest.id.clone(),
            event_id: event_id.to_string(),
            name: guest.name.clone().unwrap_or_default(),
            email: guest.email.clone(),
            approval_status: guest.approval_status.clone(),
            registered_at: guest.registered_at,
            checked_in_at: guest.checked_in_at,
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.guest_id.clone(),
            self.event_id.clone(),
            self.name.clone(),
            self.email.clone(),
            self.approval_status.clone(),
            fmt_time(&self.registered_at),
            fmt_time(&self.checked_in_at),
        ]
    }
}

/// Row schema for the hosts destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRow {
    pub host_id: String,
    pub event_id: String,
    pub name: String,
    pub email: String,
}

impl HostRow {
    pub const COLUMNS: &'static [&'static str] = &["host_id", "event_id", "name", "email"];

    pub fn from_api(host: &ApiHost, event_id: &str) -> Self {
        HostRow {
            host_id: host.id.clone(),
            event_id: event_id.to_string(),
            name: host.name.clone(),
            email: host.email.clone().unwrap_or_default(),
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.host_id.clone(),
            self.event_id.clone(),
            self.name.clone(),
            self.email.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_row_column_order_matches_schema() {
        let event = ApiEvent {
            id: "evt_1".to_string(),
            name: "Launch Party".to_string(),
            start_at: Utc.with_ymd_and_hms(2025, 3, 20, 18, 0, 0).unwrap(),
            end_at: None,
            url: Some("https://example.com/evt_1".to_string()),
            location: None,
            description: None,
            hosts: vec![ApiHost {
                id: "hst_1".to_string(),
                name: "Ada".to_string(),
                email: None,
            }],
        };

        let row = EventRow::from(&event).to_row();
        assert_eq!(row.len(), EventRow::COLUMNS.len());
        assert_eq!(row[0], "evt_1");
        assert_eq!(row[3], ""); // end_at absent
        assert_eq!(row[6], "Ada");
    }

    #[test]
    fn guest_row_carries_parent_event() {
        let guest = ApiGuest {
            id: "gst_1".to_string(),
            name: None,
            email: "ada@example.com".to_string(),
            approval_status: "approved".to_string(),
            registered_at: None,
            checked_in_at: None,
        };

        let row = GuestRow::from_api(&guest, "evt_9");
        assert_eq!(row.event_id, "evt_9");
        assert_eq!(row.to_row().len(), GuestRow::COLUMNS.len());
    }
}
