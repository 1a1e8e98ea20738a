//! Local CSV file sink.
//!
//! Each destination maps to `<output_dir>/<destination>.csv`. Writes go
//! through a temp file and an atomic rename, the same pattern the state
//! store uses, so a crash never leaves a half-written file behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{SyncError, SyncResult};
use crate::sink::TabularSink;

pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvSink { dir: dir.into() }
    }

    fn file_path(&self, destination: &str) -> PathBuf {
        self.dir.join(format!("{destination}.csv"))
    }

    fn read_lines(&self, path: &Path) -> SyncResult<Vec<String>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(contents.lines().map(String::from).collect())
    }

    fn write_lines(&self, path: &Path, lines: &[String]) -> SyncResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let temp = path.with_extension("csv.tmp");
        let mut contents = lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        std::fs::write(&temp, contents)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn to_line(row: &[String]) -> String {
    row.iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl TabularSink for CsvSink {
    async fn clear(&self, destination: &str) -> SyncResult<()> {
        let path = self.file_path(destination);
        if path.exists() {
            std::fs::remove_file(&path).map_err(SyncError::Io)?;
        }
        Ok(())
    }

    async fn write_header(&self, destination: &str, columns: &[&str]) -> SyncResult<()> {
        let path = self.file_path(destination);
        let mut lines = self.read_lines(&path)?;
        let header: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        lines.insert(0, to_line(&header));
        self.write_lines(&path, &lines)
    }

    async fn append_rows(&self, destination: &str, rows: &[Vec<String>]) -> SyncResult<()> {
        let path = self.file_path(destination);
        let mut lines = self.read_lines(&path)?;
        lines.extend(rows.iter().map(|r| to_line(r)));
        self.write_lines(&path, &lines)
    }

    async fn resize(&self, _destination: &str, _min_rows: usize, _min_cols: usize) -> SyncResult<()> {
        // Files grow on demand.
        Ok(())
    }

    async fn row_count(&self, destination: &str) -> SyncResult<usize> {
        let path = self.file_path(destination);
        Ok(self.read_lines(&path)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::WriteMode;
    use crate::sink::batch::BatchWriter;
    use std::time::Duration;

    #[tokio::test]
    async fn overwrite_then_append_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let writer = BatchWriter::new(500, Duration::ZERO);

        writer
            .write(
                &sink,
                "guests",
                &["id", "email"],
                &[vec!["g1".into(), "a@example.com".into()]],
                WriteMode::Overwrite,
            )
            .await
            .unwrap();
        writer
            .write(
                &sink,
                "guests",
                &["id", "email"],
                &[vec!["g2".into(), "b,with comma".into()]],
                WriteMode::Append,
            )
            .await
            .unwrap();

        let contents = std::fs::read_to_string(dir.path().join("guests.csv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "id,email");
        assert_eq!(lines[1], "g1,a@example.com");
        assert_eq!(lines[2], "g2,\"b,with comma\"");
    }

    #[test]
    fn fields_with_quotes_are_escaped() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
