//! Batched writes to a tabular sink.
//!
//! Rows are split into bounded sub-batches with a fixed inter-batch delay
//! so sink-side rate limits are respected. Each sub-batch gets its own
//! retry budget; when that is exhausted the whole write fails with the
//! destination name and the absolute row range that did not land.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::SinkConfig;
use crate::error::{SyncError, SyncResult};
use crate::sink::{TabularSink, WriteMode};

/// Extra rows requested when resizing a destination for an overwrite.
const RESIZE_MARGIN: usize = 10;

const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_WRITE_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct BatchWriter {
    batch_size: usize,
    batch_delay: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl BatchWriter {
    pub fn new(batch_size: usize, batch_delay: Duration) -> Self {
        BatchWriter {
            batch_size,
            batch_delay,
            max_retries: MAX_WRITE_RETRIES,
            retry_delay: BASE_RETRY_DELAY,
        }
    }

    pub fn from_config(sink: &SinkConfig) -> Self {
        Self::new(sink.batch_size, Duration::from_millis(sink.batch_delay_ms))
    }

    /// Override the per-sub-batch retry budget and backoff base.
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Write `rows` to `destination`.
    ///
    /// `Overwrite` clears the destination, resizes it to fit, and writes the
    /// header before the rows. `Append` reads the current extent and writes
    /// after it. Callers are responsible for restoring any buffered rows if
    /// the write fails partway (see the syncer's flush contract).
    pub async fn write(
        &self,
        sink: &dyn TabularSink,
        destination: &str,
        columns: &[&str],
        rows: &[Vec<String>],
        mode: WriteMode,
    ) -> SyncResult<()> {
        let start_row = match mode {
            WriteMode::Overwrite => {
                sink.clear(destination).await?;
                sink.resize(destination, rows.len() + 1 + RESIZE_MARGIN, columns.len())
                    .await?;
                sink.write_header(destination, columns).await?;
                1
            }
            WriteMode::Append => sink.row_count(destination).await?,
        };

        for (batch_index, batch) in rows.chunks(self.batch_size).enumerate() {
            if batch_index > 0 && !self.batch_delay.is_zero() {
                sleep(self.batch_delay).await;
            }

            let first_row = start_row + batch_index * self.batch_size;
            self.write_batch(sink, destination, batch, first_row).await?;

            debug!(
                destination,
                batch_index,
                rows = batch.len(),
                "wrote sub-batch"
            );
        }

        Ok(())
    }

    async fn write_batch(
        &self,
        sink: &dyn TabularSink,
        destination: &str,
        batch: &[Vec<String>],
        first_row: usize,
    ) -> SyncResult<()> {
        let mut attempt: u32 = 0;
        loop {
            match sink.append_rows(destination, batch).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_delay * 2u32.pow(attempt);
                    warn!(destination, attempt, error = %e, "retrying sub-batch write");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(SyncError::SinkWrite {
                        destination: destination.to_string(),
                        first_row,
                        last_row: first_row + batch.len(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn rows(n: usize) -> Vec<Vec<String>> {
        (0..n).map(|i| vec![format!("row-{i}")]).collect()
    }

    fn fast_writer(batch_size: usize) -> BatchWriter {
        BatchWriter::new(batch_size, Duration::ZERO)
            .with_retry_policy(MAX_WRITE_RETRIES, Duration::ZERO)
    }

    #[tokio::test]
    async fn overwrite_writes_header_then_rows() {
        let sink = MemorySink::new();
        let writer = fast_writer(500);

        writer
            .write(&sink, "events", &["id"], &rows(3), WriteMode::Overwrite)
            .await
            .unwrap();

        assert_eq!(sink.header("events"), Some(vec!["id".to_string()]));
        assert_eq!(sink.rows("events").len(), 3);
        assert_eq!(sink.clear_calls("events"), 1);
    }

    #[tokio::test]
    async fn append_preserves_existing_rows() {
        let sink = MemorySink::new();
        let writer = fast_writer(500);

        writer
            .write(&sink, "guests", &["id"], &rows(2), WriteMode::Overwrite)
            .await
            .unwrap();
        writer
            .write(&sink, "guests", &["id"], &rows(2), WriteMode::Append)
            .await
            .unwrap();

        assert_eq!(sink.rows("guests").len(), 4);
        assert_eq!(sink.clear_calls("guests"), 1);
    }

    #[tokio::test]
    async fn splits_into_sub_batches() {
        let sink = MemorySink::new();
        let writer = fast_writer(2);

        writer
            .write(&sink, "guests", &["id"], &rows(5), WriteMode::Overwrite)
            .await
            .unwrap();

        assert_eq!(sink.rows("guests").len(), 5);
        assert_eq!(sink.append_calls("guests"), 3); // 2 + 2 + 1
    }

    #[tokio::test]
    async fn exhausted_retries_report_row_range() {
        let sink = MemorySink::new();
        sink.fail_appends(usize::MAX);
        let writer = fast_writer(500);

        let err = writer
            .write(&sink, "guests", &["id"], &rows(4), WriteMode::Overwrite)
            .await
            .unwrap_err();

        match err {
            SyncError::SinkWrite {
                destination,
                first_row,
                last_row,
                ..
            } => {
                assert_eq!(destination, "guests");
                assert_eq!(first_row, 1); // header occupies row 0
                assert_eq!(last_row, 5);
            }
            other => panic!("expected SinkWrite, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_failure_then_success_retries_through() {
        let sink = MemorySink::new();
        sink.fail_appends(1);
        let writer = fast_writer(500);

        writer
            .write(&sink, "guests", &["id"], &rows(2), WriteMode::Overwrite)
            .await
            .unwrap();

        assert_eq!(sink.rows("guests").len(), 2);
    }
}
