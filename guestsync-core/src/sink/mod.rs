//! Sink abstractions and implementations.
//!
//! Two kinds of sink exist: the tabular sink (spreadsheet-like, ordered
//! rows, overwrite/append semantics) and the relational record sink
//! (idempotent upserts, no ordering constraints). The batch writer sits on
//! top of `TabularSink` and handles sub-batching, retries, and the
//! overwrite/append distinction.

pub mod batch;
pub mod csv;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::SyncResult;

pub use batch::BatchWriter;
pub use csv::CsvSink;
pub use memory::MemorySink;
pub use sqlite::SqliteSink;

/// Write mode for a tabular destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Clear all prior content, write headers, then rows.
    Overwrite,
    /// Write rows after the existing content.
    Append,
}

/// A spreadsheet-like destination. Row write order is preserved.
///
/// Implementations enforce their own rate limits; the batch writer
/// respects them via sub-batching and inter-batch delays.
#[async_trait]
pub trait TabularSink: Send + Sync {
    async fn clear(&self, destination: &str) -> SyncResult<()>;

    async fn write_header(&self, destination: &str, columns: &[&str]) -> SyncResult<()>;

    async fn append_rows(&self, destination: &str, rows: &[Vec<String>]) -> SyncResult<()>;

    /// Grow the destination's capacity if it is below the given bounds.
    /// Sinks without a capacity concept may no-op.
    async fn resize(&self, destination: &str, min_rows: usize, min_cols: usize) -> SyncResult<()>;

    /// Current extent (rows written so far, header included).
    async fn row_count(&self, destination: &str) -> SyncResult<usize>;
}

/// A database-like destination with idempotent upserts.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Insert or update `record` keyed by `key` in `table`.
    async fn upsert(&self, table: &str, key: &str, record: &serde_json::Value) -> SyncResult<()>;
}
