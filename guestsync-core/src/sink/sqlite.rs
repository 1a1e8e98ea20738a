//! Relational record sink backed by sqlite.
//!
//! Records are stored as JSON documents keyed by their source id, one
//! table per record kind. Upserts are idempotent, so the syncer can replay
//! them freely on retries.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, params};
use tokio::sync::Mutex;

use crate::error::{SyncError, SyncResult};
use crate::sink::RecordSink;

pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    pub fn open(path: &Path) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(SqliteSink {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(SqliteSink {
            conn: Mutex::new(conn),
        })
    }

    fn ensure_table(conn: &Connection, table: &str) -> SyncResult<()> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    record TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )"
            ),
            [],
        )
        .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Table names are interpolated into SQL, so they must stay identifiers.
fn validate_table_name(table: &str) -> SyncResult<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SyncError::Database(format!(
            "invalid table name: '{table}'"
        )))
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    async fn upsert(&self, table: &str, key: &str, record: &serde_json::Value) -> SyncResult<()> {
        validate_table_name(table)?;
        let conn = self.conn.lock().await;
        Self::ensure_table(&conn, table)?;

        conn.execute(
            &format!(
                "INSERT INTO {table} (id, record, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    record = excluded.record,
                    updated_at = excluded.updated_at"
            ),
            params![key, record.to_string(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let sink = SqliteSink::open_in_memory().unwrap();

        sink.upsert("guests", "gst_1", &json!({"email": "a@example.com"}))
            .await
            .unwrap();
        sink.upsert("guests", "gst_1", &json!({"email": "b@example.com"}))
            .await
            .unwrap();

        let conn = sink.conn.lock().await;
        let (count, record): (i64, String) = conn
            .query_row(
                "SELECT COUNT(*), MAX(record) FROM guests",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert!(record.contains("b@example.com"));
    }

    #[test]
    fn rejects_non_identifier_table_names() {
        assert!(validate_table_name("guests").is_ok());
        assert!(validate_table_name("guests; DROP TABLE x").is_err());
        assert!(validate_table_name("").is_err());
    }
}
