//! In-memory tabular sink for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{SyncError, SyncResult};
use crate::sink::TabularSink;

#[derive(Debug, Default, Clone)]
struct Table {
    header: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
    capacity_rows: usize,
    capacity_cols: usize,
    clear_calls: usize,
    append_calls: usize,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Table>,
    pending_failures: usize,
}

/// A `TabularSink` held entirely in memory.
///
/// Clones share the same storage, so a test can keep a handle while the
/// syncer owns another. `fail_appends(n)` makes the next `n` `append_rows`
/// calls fail with a transient error, for exercising retry and
/// buffer-restoration paths.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` append calls fail with a transient error.
    pub fn fail_appends(&self, n: usize) {
        self.inner.lock().unwrap().pending_failures = n;
    }

    pub fn header(&self, destination: &str) -> Option<Vec<String>> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(destination)
            .and_then(|t| t.header.clone())
    }

    pub fn rows(&self, destination: &str) -> Vec<Vec<String>> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(destination)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn clear_calls(&self, destination: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(destination)
            .map(|t| t.clear_calls)
            .unwrap_or(0)
    }

    pub fn append_calls(&self, destination: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(destination)
            .map(|t| t.append_calls)
            .unwrap_or(0)
    }
}

#[async_trait]
impl TabularSink for MemorySink {
    async fn clear(&self, destination: &str) -> SyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let table = inner.tables.entry(destination.to_string()).or_default();
        table.header = None;
        table.rows.clear();
        table.clear_calls += 1;
        Ok(())
    }

    async fn write_header(&self, destination: &str, columns: &[&str]) -> SyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let table = inner.tables.entry(destination.to_string()).or_default();
        table.header = Some(columns.iter().map(|c| c.to_string()).collect());
        Ok(())
    }

    async fn append_rows(&self, destination: &str, rows: &[Vec<String>]) -> SyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pending_failures > 0 {
            inner.pending_failures -= 1;
            return Err(SyncError::TransientNetwork(
                "injected append failure".into(),
            ));
        }

        let table = inner.tables.entry(destination.to_string()).or_default();
        table.rows.extend(rows.iter().cloned());
        table.append_calls += 1;
        Ok(())
    }

    async fn resize(&self, destination: &str, min_rows: usize, min_cols: usize) -> SyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let table = inner.tables.entry(destination.to_string()).or_default();
        table.capacity_rows = table.capacity_rows.max(min_rows);
        table.capacity_cols = table.capacity_cols.max(min_cols);
        Ok(())
    }

    async fn row_count(&self, destination: &str) -> SyncResult<usize> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tables
            .get(destination)
            .map(|t| t.rows.len() + usize::from(t.header.is_some()))
            .unwrap_or(0))
    }
}
