//! Append-only audit trail stored as JSON lines

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{AuditQuery, AuditStore, StoreError};
use crate::models::AuditLogEntry;

/// One JSON object per line; the file is only ever opened for append
#[derive(Debug)]
pub struct JsonLinesAuditStore {
    path: PathBuf,
    /// Serializes writers so lines never interleave
    write_lock: Mutex<()>,
}

impl JsonLinesAuditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditStore for JsonLinesAuditStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut matched = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditLogEntry>(line) {
                Ok(entry) if query.matches(&entry) => matched.push(entry),
                Ok(_) => {}
                Err(e) => {
                    // A torn final line from a crashed writer should not hide the rest of the trail
                    tracing::warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        error = %e,
                        "Skipping unreadable audit line"
                    );
                }
            }
        }

        matched.sort_by_key(|e| e.timestamp);
        Ok(matched)
    }
}
