//! The resumable sync state machine.
//!
//! A run walks three stages: `Events` (drain the event listing, write the
//! event sheet once), `Guests` (drain each event's guest pages, buffering
//! and flushing rows), `Completed`. All position lives in the persisted
//! `SyncState`, so a restart picks up exactly where the last unit of work
//! left off.
//!
//! `tick` performs one bounded unit of work per call and returns; it is
//! meant to be driven repeatedly by an external loop. The driver must not
//! overlap calls - state is read-modify-written as a whole.

use tracing::{debug, info, warn};

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::model::{ApiEvent, EventRow, GuestRow, HostRow};
use crate::sink::{BatchWriter, RecordSink, TabularSink, WriteMode};
use crate::source::{EventListQuery, EventSource};
use crate::state::{GuestCursor, Stage, StateStore, SyncState};
use crate::status::SyncStatus;

/// Tabular destination names for the three row kinds.
#[derive(Debug, Clone)]
pub struct Destinations {
    pub events: String,
    pub guests: String,
    pub hosts: String,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub destinations: Destinations,
    pub flush_threshold: usize,
    pub page_size: u32,
    pub sync_hosts: bool,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        SyncOptions {
            destinations: Destinations {
                events: config.sink.events_destination.clone(),
                guests: config.sink.guests_destination.clone(),
                hosts: config.sink.hosts_destination.clone(),
            },
            flush_threshold: config.sync.flush_threshold,
            page_size: config.api.page_size,
            sync_hosts: config.sync.sync_hosts,
        }
    }
}

pub struct Syncer {
    source: Box<dyn EventSource>,
    tabular: Box<dyn TabularSink>,
    records: Option<Box<dyn RecordSink>>,
    writer: BatchWriter,
    store: StateStore,
    options: SyncOptions,
}

impl Syncer {
    pub fn new(
        source: Box<dyn EventSource>,
        tabular: Box<dyn TabularSink>,
        records: Option<Box<dyn RecordSink>>,
        writer: BatchWriter,
        store: StateStore,
        options: SyncOptions,
    ) -> Self {
        Syncer {
            source,
            tabular,
            records,
            writer,
            store,
            options,
        }
    }

    /// Begin a new run: drain the event listing to exhaustion, write the
    /// full event-row set in one overwrite, and queue every event id for
    /// guest draining.
    ///
    /// Errors here abort the whole call - there is no safe partial state
    /// mid-listing, so a failed `start` is retried from scratch.
    pub async fn start(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> SyncResult<SyncStatus> {
        info!(?after, ?before, "starting sync run");

        let mut state = SyncState::default();
        state.after = after;
        state.before = before;

        let mut query = EventListQuery::new(self.options.page_size, after, before);
        let mut events: Vec<ApiEvent> = Vec::new();

        loop {
            let page = self.source.list_events(&query).await?;
            state
                .pending_event_ids
                .extend(page.items.iter().map(|e| e.id.clone()));
            events.extend(page.items);
            state.event_page_cursor = page.next_cursor.clone();
            state.has_more_event_pages = page.has_more;
            state.touch();
            self.store.save(&state)?;

            if !page.has_more {
                break;
            }
            // A page claiming more without a cursor to follow is terminal;
            // refetching the same page would loop forever.
            let Some(cursor) = page.next_cursor else {
                break;
            };
            query.cursor = Some(cursor);
        }

        let rows: Vec<Vec<String>> = events.iter().map(|e| EventRow::from(e).to_row()).collect();
        self.writer
            .write(
                self.tabular.as_ref(),
                &self.options.destinations.events,
                EventRow::COLUMNS,
                &rows,
                WriteMode::Overwrite,
            )
            .await?;

        if let Some(records) = &self.records {
            for event in &events {
                let value = serde_json::to_value(event)
                    .map_err(|e| SyncError::Serialization(e.to_string()))?;
                records.upsert("events", &event.id, &value).await?;
            }
        }

        if self.options.sync_hosts {
            self.write_hosts(&events).await?;
        }

        state.stage = Stage::Guests;
        state.touch();
        self.store.save(&state)?;

        info!(total_events = state.pending_event_ids.len(), "queued events");
        Ok(SyncStatus::from_state(&state))
    }

    /// Hosts ride along with the event payload, so they are written once
    /// here rather than getting their own stage.
    async fn write_hosts(&self, events: &[ApiEvent]) -> SyncResult<()> {
        let host_rows: Vec<HostRow> = events
            .iter()
            .flat_map(|event| {
                event
                    .hosts
                    .iter()
                    .map(|host| HostRow::from_api(host, &event.id))
            })
            .collect();

        let rows: Vec<Vec<String>> = host_rows.iter().map(|h| h.to_row()).collect();
        self.writer
            .write(
                self.tabular.as_ref(),
                &self.options.destinations.hosts,
                HostRow::COLUMNS,
                &rows,
                WriteMode::Overwrite,
            )
            .await?;

        if let Some(records) = &self.records {
            for host in &host_rows {
                let key = format!("{}:{}", host.host_id, host.event_id);
                let value = serde_json::to_value(host)
                    .map_err(|e| SyncError::Serialization(e.to_string()))?;
                records.upsert("hosts", &key, &value).await?;
            }
        }

        Ok(())
    }

    /// Perform one bounded unit of work: a single guest page of the
    /// current event, or a stage transition. Returns the status after the
    /// unit completes.
    ///
    /// Per-event errors are recorded in `failed_event_ids` and the run
    /// moves on; flush errors propagate so the driver retries the flush on
    /// its next call.
    pub async fn tick(&self) -> SyncResult<SyncStatus> {
        let mut state = self.store.load()?;

        match state.stage {
            Stage::Events => {
                debug!("no run in progress; call start first");
                return Ok(SyncStatus::from_state(&state));
            }
            Stage::Completed => return Ok(SyncStatus::from_state(&state)),
            Stage::Guests => {}
        }

        if state.is_drained() {
            self.finalize(&mut state).await?;
            return Ok(SyncStatus::from_state(&state));
        }

        let event_id = match state.current_event_id() {
            Some(id) => id.to_string(),
            None => {
                self.finalize(&mut state).await?;
                return Ok(SyncStatus::from_state(&state));
            }
        };

        let cursor = state
            .guest_cursor
            .as_ref()
            .filter(|c| c.event_id == event_id)
            .and_then(|c| c.next_cursor.clone());

        match self
            .source
            .list_guests(&event_id, cursor.as_deref(), self.options.page_size)
            .await
        {
            Ok(page) => {
                let fetched = page.items.len();
                let mut added = 0usize;
                for guest in &page.items {
                    let row = GuestRow::from_api(guest, &event_id);
                    // Dedup against everything buffered this run, flushed
                    // or not; duplicates are dropped, not double-counted.
                    if state.seen_guest_ids.insert(row.guest_id.clone()) {
                        state.guest_buffer.push(row);
                        added += 1;
                    }
                }
                debug!(event = %event_id, fetched, added, "drained guest page");

                let processed = state
                    .guest_cursor
                    .as_ref()
                    .filter(|c| c.event_id == event_id)
                    .map(|c| c.processed_count)
                    .unwrap_or(0)
                    + fetched;

                // A cursor-less page is terminal even if it claims more;
                // without one the next fetch could only repeat this page.
                if page.has_more && page.next_cursor.is_some() {
                    state.guest_cursor = Some(GuestCursor {
                        event_id: event_id.clone(),
                        next_cursor: page.next_cursor,
                        has_more: true,
                        processed_count: processed,
                    });
                } else {
                    state.guest_cursor = None;
                    state.last_processed_index += 1;
                }
                state.touch();

                if state.guest_buffer.len() >= self.options.flush_threshold {
                    self.flush(&mut state).await?;
                } else {
                    self.store.save(&state)?;
                }

                if state.is_drained() {
                    self.finalize(&mut state).await?;
                }
            }
            Err(e) => {
                warn!(event = %event_id, error = %e, "event failed; recording and moving on");
                state.record_failure(event_id);
                state.guest_cursor = None;
                state.last_processed_index += 1;
                state.touch();
                self.store.save(&state)?;

                if state.is_drained() {
                    self.finalize(&mut state).await?;
                }
            }
        }

        Ok(SyncStatus::from_state(&state))
    }

    /// Flush buffered guest rows to the sink.
    ///
    /// The buffer is detached and persisted empty *before* the write, so a
    /// resumed drive never re-buffers rows that are in flight. On failure
    /// the detached rows are re-merged at the front of the buffer and the
    /// error propagates - nothing is silently dropped.
    async fn flush(&self, state: &mut SyncState) -> SyncResult<()> {
        if state.guest_buffer.is_empty() {
            return Ok(());
        }

        let detached = std::mem::take(&mut state.guest_buffer);
        state.touch();
        self.store.save(state)?;

        let mode = if state.sink_initialized {
            WriteMode::Append
        } else {
            WriteMode::Overwrite
        };

        match self.write_guests(&detached, mode).await {
            Ok(()) => {
                state.sink_initialized = true;
                state.touch();
                self.store.save(state)?;
                info!(rows = detached.len(), mode = ?mode, "flushed guest rows");
                Ok(())
            }
            Err(e) => {
                let mut restored = detached;
                restored.append(&mut state.guest_buffer);
                state.guest_buffer = restored;
                state.touch();
                self.store.save(state)?;
                Err(e)
            }
        }
    }

    async fn write_guests(&self, detached: &[GuestRow], mode: WriteMode) -> SyncResult<()> {
        // Upserts first: they are idempotent, so replaying them after a
        // tabular failure is harmless, while the reverse order could lose
        // relational rows.
        if let Some(records) = &self.records {
            for row in detached {
                let value = serde_json::to_value(row)
                    .map_err(|e| SyncError::Serialization(e.to_string()))?;
                records.upsert("guests", &row.guest_id, &value).await?;
            }
        }

        let rows: Vec<Vec<String>> = detached.iter().map(|r| r.to_row()).collect();
        self.writer
            .write(
                self.tabular.as_ref(),
                &self.options.destinations.guests,
                GuestRow::COLUMNS,
                &rows,
                mode,
            )
            .await
    }

    /// Final flush, then mark the run completed.
    async fn finalize(&self, state: &mut SyncState) -> SyncResult<()> {
        self.flush(state).await?;
        state.stage = Stage::Completed;
        state.touch();
        self.store.save(state)?;
        info!(
            total_events = state.pending_event_ids.len(),
            failed_events = state.failed_event_ids.len(),
            "sync completed"
        );
        Ok(())
    }

    /// Hard stop: no further work units will run. The buffer is left
    /// unflushed - this is an abort, not a graceful finalize.
    pub async fn stop(&self) -> SyncResult<SyncStatus> {
        let mut state = self.store.load()?;
        state.stage = Stage::Completed;
        state.last_processed_index = state.pending_event_ids.len();
        state.guest_cursor = None;
        state.touch();
        self.store.save(&state)?;
        info!("sync stopped");
        Ok(SyncStatus::from_state(&state))
    }

    /// Reinitialize state to its empty form.
    pub fn reset(&self) -> SyncResult<SyncStatus> {
        let state = SyncState::default();
        self.store.save(&state)?;
        info!("sync state reset");
        Ok(SyncStatus::from_state(&state))
    }

    /// Remove the persisted state entirely; no stale cursors or buffers
    /// survive.
    pub fn cleanup(&self) -> SyncResult<()> {
        self.store.cleanup()?;
        info!("sync state cleaned up");
        Ok(())
    }

    /// Read-only view of the run's progress.
    pub fn status(&self) -> SyncResult<SyncStatus> {
        Ok(SyncStatus::from_state(&self.store.load()?))
    }
}
