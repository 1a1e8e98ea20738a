//! Paginated source reader for the events API.
//!
//! The API paginates with opaque cursors: every listing response carries
//! `next_cursor` and `has_more`. Callers persist those two fields to make a
//! walk restartable; a resumed walk must keep the same `after`/`before`
//! filter it started with, since cursors are only valid within one filter
//! scope. `has_more == false` is terminal for that walk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::RateLimitedClient;
use crate::error::{SyncError, SyncResult};
use crate::model::{ApiEvent, ApiGuest};

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Parameters for one event-listing walk.
///
/// `after`/`before` are fixed for the lifetime of the walk; only `cursor`
/// changes between pages.
#[derive(Debug, Clone)]
pub struct EventListQuery {
    pub sort_field: String,
    pub sort_direction: SortDirection,
    pub cursor: Option<String>,
    pub page_size: u32,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl EventListQuery {
    pub fn new(page_size: u32, after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Self {
        EventListQuery {
            sort_field: "start_at".to_string(),
            sort_direction: SortDirection::Asc,
            cursor: None,
            page_size,
            after,
            before,
        }
    }
}

/// The events API, reduced to the two listings the sync machinery needs.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn list_events(&self, query: &EventListQuery) -> SyncResult<Page<ApiEvent>>;

    async fn list_guests(
        &self,
        event_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> SyncResult<Page<ApiGuest>>;
}

/// Wire envelope for listing endpoints.
#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    entries: Vec<T>,
    next_cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

impl<T> From<ListResponse<T>> for Page<T> {
    fn from(response: ListResponse<T>) -> Self {
        Page {
            items: response.entries,
            next_cursor: response.next_cursor,
            has_more: response.has_more,
        }
    }
}

/// `EventSource` backed by the HTTP API via the rate-limited client.
pub struct HttpEventSource {
    client: RateLimitedClient,
    base_url: Url,
}

impl HttpEventSource {
    pub fn new(client: RateLimitedClient, base_url: &str) -> SyncResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::Config(format!("Invalid API base URL: {e}")))?;
        Ok(HttpEventSource { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Config("API base URL cannot be a base".into()))?
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn list_events(&self, query: &EventListQuery) -> SyncResult<Page<ApiEvent>> {
        let mut url = self.endpoint(&["events"])?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("sort_field", &query.sort_field);
            params.append_pair("sort_direction", query.sort_direction.as_str());
            params.append_pair("limit", &query.page_size.to_string());
            if let Some(cursor) = &query.cursor {
                params.append_pair("cursor", cursor);
            }
            if let Some(after) = &query.after {
                params.append_pair("after", &after.to_rfc3339());
            }
            if let Some(before) = &query.before {
                params.append_pair("before", &before.to_rfc3339());
            }
        }

        let response: ListResponse<ApiEvent> = self.client.get_json(url).await?;
        Ok(response.into())
    }

    async fn list_guests(
        &self,
        event_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> SyncResult<Page<ApiGuest>> {
        let mut url = self.endpoint(&["events", event_id, "guests"])?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("limit", &page_size.to_string());
            if let Some(cursor) = cursor {
                params.append_pair("cursor", cursor);
            }
        }

        let response: ListResponse<ApiGuest> = self.client.get_json(url).await?;
        Ok(response.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_response_maps_to_page() {
        let json = r#"{
            "entries": [{"id": "gst_1", "email": "a@example.com", "approval_status": "approved"}],
            "next_cursor": "abc",
            "has_more": true
        }"#;

        let response: ListResponse<ApiGuest> = serde_json::from_str(json).unwrap();
        let page: Page<ApiGuest> = response.into();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
        assert!(page.has_more);
    }

    #[test]
    fn missing_has_more_defaults_to_terminal() {
        let json = r#"{"entries": [], "next_cursor": null}"#;
        let response: ListResponse<ApiGuest> = serde_json::from_str(json).unwrap();
        assert!(!response.has_more);
    }
}
