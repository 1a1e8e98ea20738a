//! Durable sync state.
//!
//! `SyncState` is the single persisted aggregate: everything the sync
//! machinery needs to resume after a crash lives here, including the
//! guest rows that have been fetched but not yet flushed. It is always
//! read-modify-written as a whole; the driver guarantees only one work
//! unit is in flight at a time.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::model::GuestRow;

/// Phase of the sync run. Only moves forward; `reset` is the one way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Events,
    Guests,
    Completed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::Events => "events",
            Stage::Guests => "guests",
            Stage::Completed => "completed",
        };
        write!(f, "{label}")
    }
}

/// Pagination position within the guest listing of one event.
///
/// Present only while that event's guest pages are being drained; the
/// event it names is always `pending_event_ids[last_processed_index]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestCursor {
    pub event_id: String,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub processed_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub last_sync_time: DateTime<Utc>,
    pub stage: Stage,
    /// Event ids discovered from the source listing, in source order.
    /// Append-only during the events stage, fixed thereafter.
    #[serde(default)]
    pub pending_event_ids: Vec<String>,
    /// Low-water mark: events below this index have fully drained guest
    /// pages. Monotonically non-decreasing within a run.
    #[serde(default)]
    pub last_processed_index: usize,
    /// Events that errored. Recorded, not fatal.
    #[serde(default)]
    pub failed_event_ids: Vec<String>,
    #[serde(default)]
    pub guest_cursor: Option<GuestCursor>,
    /// Fetched-but-unflushed guest rows. Lives in durable state, not
    /// process memory, so a restart loses nothing.
    #[serde(default)]
    pub guest_buffer: Vec<GuestRow>,
    /// Every guest id buffered this run. Dedup checks this set rather than
    /// the buffer alone, so an id that was already flushed is still
    /// dropped when a later page repeats it.
    #[serde(default)]
    pub seen_guest_ids: HashSet<String>,
    /// Whether the guest destination has had its one overwrite this run.
    #[serde(default)]
    pub sink_initialized: bool,
    /// Outer event-listing pagination; only meaningful during `Events`.
    #[serde(default)]
    pub event_page_cursor: Option<String>,
    #[serde(default)]
    pub has_more_event_pages: bool,
    /// The filter the run started with. Cursors are only valid within this
    /// fixed scope, so it is persisted alongside them.
    #[serde(default)]
    pub after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState {
            last_sync_time: Utc::now(),
            stage: Stage::Events,
            pending_event_ids: Vec::new(),
            last_processed_index: 0,
            failed_event_ids: Vec::new(),
            guest_cursor: None,
            guest_buffer: Vec::new(),
            seen_guest_ids: HashSet::new(),
            sink_initialized: false,
            event_page_cursor: None,
            has_more_event_pages: true,
            after: None,
            before: None,
        }
    }
}

impl SyncState {
    pub fn touch(&mut self) {
        self.last_sync_time = Utc::now();
    }

    /// The event currently being drained, if any remain.
    pub fn current_event_id(&self) -> Option<&str> {
        self.pending_event_ids
            .get(self.last_processed_index)
            .map(String::as_str)
    }

    pub fn is_drained(&self) -> bool {
        self.last_processed_index >= self.pending_event_ids.len()
    }

    pub fn record_failure(&mut self, event_id: String) {
        if !self.failed_event_ids.contains(&event_id) {
            self.failed_event_ids.push(event_id);
        }
    }
}

/// JSON persistence for `SyncState`.
///
/// Created lazily on first read; saved atomically via temp file + rename.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StateStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted state, or the initial state if none exists yet.
    pub fn load(&self) -> SyncResult<SyncState> {
        if !self.path.exists() {
            return Ok(SyncState::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| {
            SyncError::State(format!(
                "Failed to parse sync state at {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Save state atomically (temp file + rename).
    pub fn save(&self, state: &SyncState) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(state)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        let temp = self.path.with_extension("json.tmp");
        std::fs::write(&temp, contents)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }

    /// Remove the persisted state entirely.
    pub fn cleanup(&self) -> SyncResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_loads_initial_state() {
        let (_dir, store) = store();
        let state = store.load().unwrap();
        assert_eq!(state.stage, Stage::Events);
        assert!(state.pending_event_ids.is_empty());
        assert!(state.has_more_event_pages);
    }

    #[test]
    fn save_load_round_trip() {
        let (_dir, store) = store();

        let mut state = SyncState::default();
        state.stage = Stage::Guests;
        state.pending_event_ids = vec!["evt_1".into(), "evt_2".into()];
        state.last_processed_index = 1;
        state.guest_cursor = Some(GuestCursor {
            event_id: "evt_2".into(),
            next_cursor: Some("c2".into()),
            has_more: true,
            processed_count: 20,
        });
        state.seen_guest_ids.insert("gst_1".into());
        state.sink_initialized = true;

        store.save(&state).unwrap();
        let restored = store.load().unwrap();

        assert_eq!(restored.stage, Stage::Guests);
        assert_eq!(restored.last_processed_index, 1);
        assert_eq!(
            restored.guest_cursor.as_ref().unwrap().next_cursor.as_deref(),
            Some("c2")
        );
        assert!(restored.seen_guest_ids.contains("gst_1"));
        assert!(restored.sink_initialized);
    }

    #[test]
    fn cleanup_removes_state_file() {
        let (_dir, store) = store();
        store.save(&SyncState::default()).unwrap();
        assert!(store.path().exists());

        store.cleanup().unwrap();
        assert!(!store.path().exists());

        // And a fresh load starts over.
        assert_eq!(store.load().unwrap().stage, Stage::Events);
    }

    #[test]
    fn current_event_tracks_the_index() {
        let mut state = SyncState::default();
        state.pending_event_ids = vec!["evt_1".into(), "evt_2".into()];
        assert_eq!(state.current_event_id(), Some("evt_1"));

        state.last_processed_index = 2;
        assert_eq!(state.current_event_id(), None);
        assert!(state.is_drained());
    }

    #[test]
    fn record_failure_deduplicates() {
        let mut state = SyncState::default();
        state.record_failure("evt_1".into());
        state.record_failure("evt_1".into());
        assert_eq!(state.failed_event_ids.len(), 1);
    }
}
