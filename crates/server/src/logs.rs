use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tagarela_messaging::Record;
use tokio::sync::Mutex;
use tracing::warn;

use crate::ServerError;

/// An append-only, line-delimited JSON record log.
///
/// Both the request loop and the replica listener append, so each write
/// happens under a mutex and covers a whole line. Records are never
/// rewritten; readers must tolerate a torn final line.
#[derive(Debug)]
pub struct RecordLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RecordLog {
    /// Open (creating if needed) the log at `path` for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one record as a single JSON line.
    pub async fn append(&self, record: &Record) -> Result<(), ServerError> {
        let line = serde_json::to_string(record)?;
        let mut file = self.file.lock().await;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Number of lines currently in the log.
    pub async fn len(&self) -> Result<usize, ServerError> {
        let _guard = self.file.lock().await;
        Ok(read_lines(&self.path)?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, ServerError> {
        Ok(self.len().await? == 0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every parseable record from a log file.
///
/// Unparsable lines (a torn tail from a crashed writer) are skipped
/// with a warning; the log is forensic data, not a source of truth.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>, ServerError> {
    let mut records = Vec::new();
    for line in read_lines(path.as_ref())? {
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(error = %e, "skipping unparsable log line"),
        }
    }
    Ok(records)
}

fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    reader.lines().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagarela_messaging::PublishRecord;

    fn sample(clock: u64) -> Record {
        Record::Publish(PublishRecord {
            origin: "srv1".into(),
            channel: "general".into(),
            user: "alice".into(),
            message: format!("msg {clock}"),
            timestamp: "2026-08-01T12:00:00.000000Z".into(),
            clock,
        })
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecordLog::open(dir.path().join("publications.jsonl")).unwrap();

        log.append(&sample(1)).await.unwrap();
        log.append(&sample(2)).await.unwrap();

        assert_eq!(log.len().await.unwrap(), 2);
        let records = read_records(log.path()).unwrap();
        assert_eq!(records, vec![sample(1), sample(2)]);
    }

    #[tokio::test]
    async fn torn_final_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.jsonl");
        let log = RecordLog::open(&path).unwrap();
        log.append(&sample(1)).await.unwrap();

        // Simulate a crash mid-write.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            write!(file, "{{\"type\":\"publish\",\"orig").unwrap();
        }

        let records = read_records(&path).unwrap();
        assert_eq!(records, vec![sample(1)]);
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let records = read_records(dir.path().join("nope.jsonl")).unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_keep_line_granularity() {
        let dir = tempfile::tempdir().unwrap();
        let log = std::sync::Arc::new(
            RecordLog::open(dir.path().join("publications.jsonl")).unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..4u64 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..25 {
                    log.append(&sample(i * 100 + j)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every line parses: no interleaved partial writes.
        assert_eq!(read_records(log.path()).unwrap().len(), 100);
    }
}
