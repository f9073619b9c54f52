//! Store backends: the JSONL file store and an in-memory double for tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

use super::{Event, EventStore, RawRecord, ReadOutcome};

/// Append-only store over a newline-delimited JSON file.
///
/// Each append is one `write_all` of a single line against a file opened in
/// append mode, which is the atomicity unit the design relies on: concurrent
/// short-lived processes may interleave appends in any order, and derived
/// state is recomputed from scratch on every read.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store handle for the given log path. The file is not touched
    /// until the first append; a missing file reads as empty.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventStore for FileStore {
    async fn append(&self, event: &Event) -> StoreResult<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::Append {
                message: format!("{}: {}", self.path.display(), e),
            })?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), kind = event.kind(), "Appended event");
        Ok(())
    }

    async fn read_all(&self) -> StoreResult<ReadOutcome> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            // Never-initialized store reads as empty, not as an error.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReadOutcome::default())
            }
            Err(e) => return Err(e.into()),
        };
        parse_store_text(&text, &self.path.display().to_string())
    }
}

/// In-memory store used by tests and short-lived embedders.
#[derive(Debug, Default)]
pub struct MemoryStore {
    lines: Mutex<Vec<String>>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a raw line, bypassing event serialization. Lets tests seed
    /// legacy and malformed records exactly as they would sit on disk.
    pub async fn seed_line(&self, line: impl Into<String>) {
        self.lines.lock().await.push(line.into());
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, event: &Event) -> StoreResult<()> {
        let line = serde_json::to_string(event)?;
        self.lines.lock().await.push(line);
        Ok(())
    }

    async fn read_all(&self) -> StoreResult<ReadOutcome> {
        let text = self.lines.lock().await.join("\n");
        parse_store_text(&text, "<memory>")
    }
}

/// Shared line-format parsing for both backends.
///
/// A store whose first non-whitespace byte is `[` is the legacy bulk-array
/// shape and gets its own diagnostic, distinct from per-line parse failures.
/// A store with lines but not one parseable record is corrupt, never
/// silently empty.
fn parse_store_text(text: &str, label: &str) -> StoreResult<ReadOutcome> {
    if text.trim_start().starts_with('[') {
        return Err(StoreError::ArrayShaped {
            path: label.to_string(),
        });
    }

    let mut records: Vec<RawRecord> = Vec::new();
    let mut skipped = 0usize;
    let mut nonempty = 0usize;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        nonempty += 1;
        match serde_json::from_str::<RawRecord>(line) {
            Ok(value) if value.is_object() => records.push(value),
            Ok(_) | Err(_) => skipped += 1,
        }
    }

    if records.is_empty() && nonempty > 0 {
        return Err(StoreError::Corrupt {
            path: label.to_string(),
            lines: nonempty,
            parsed: 0,
        });
    }

    if skipped > 0 {
        warn!(store = label, skipped, "Skipped unparseable store lines");
    }

    Ok(ReadOutcome {
        records,
        skipped_lines: skipped,
    })
}
