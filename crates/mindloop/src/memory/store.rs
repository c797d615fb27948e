//! Durable JSON file backing the memory engine
//!
//! The whole store is rewritten on every change through [`write_atomic`]:
//! bytes go to a temporary file in the same directory, are synced, and the
//! temporary file is renamed over the target. A crash at any point leaves
//! either the previous file or the new one, never a partial write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::memory::types::{MemoryError, MemoryRecord};

/// Current on-disk format version
pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct StoreFileOut<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    records: Vec<&'a MemoryRecord>,
}

#[derive(Debug, Deserialize)]
struct StoreFileIn {
    version: u32,
    #[serde(default)]
    records: Vec<MemoryRecord>,
}

/// Location and format of the durable memory file
#[derive(Debug, Clone)]
pub struct MemoryFile {
    path: PathBuf,
}

impl MemoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records; a missing file is an empty store
    pub async fn load(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No memory file at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(MemoryError::Load(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let file: StoreFileIn = serde_json::from_slice(&bytes)
            .map_err(|e| MemoryError::Load(format!("{}: {}", self.path.display(), e)))?;
        if file.version > STORE_VERSION {
            return Err(MemoryError::Load(format!(
                "{}: unsupported store version {} (newest supported is {})",
                self.path.display(),
                file.version,
                STORE_VERSION
            )));
        }
        Ok(file.records)
    }

    /// Serialize a full record set
    pub fn encode<'a, I>(&self, records: I) -> Result<Vec<u8>, MemoryError>
    where
        I: IntoIterator<Item = &'a MemoryRecord>,
    {
        let file = StoreFileOut {
            version: STORE_VERSION,
            saved_at: Utc::now(),
            records: records.into_iter().collect(),
        };
        serde_json::to_vec_pretty(&file).map_err(|e| MemoryError::Write(e.to_string()))
    }

    /// Atomically replace the file contents
    pub async fn write(&self, bytes: &[u8]) -> Result<(), MemoryError> {
        write_atomic(&self.path, bytes)
            .await
            .map_err(|e| MemoryError::Write(format!("{}: {}", self.path.display(), e)))
    }
}

/// Write `bytes` to `path` via a synced temporary file and a rename
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::MemoryEntry;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let file = MemoryFile::new(dir.path().join("memories.json"));
        assert!(file.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_load() {
        let dir = tempdir().unwrap();
        let file = MemoryFile::new(dir.path().join("nested").join("memories.json"));
        let records = vec![
            MemoryRecord::active(MemoryEntry::observation("first")),
            MemoryRecord::active(MemoryEntry::reflection("second")),
        ];

        let bytes = file.encode(records.iter()).unwrap();
        file.write(&bytes).await.unwrap();

        let loaded = file.load().await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn test_write_leaves_no_temporary_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memories.json");
        write_atomic(&path, b"{}").await.unwrap();
        write_atomic(&path, b"{\"version\":1}").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["memories.json".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memories.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = MemoryFile::new(&path).load().await.unwrap_err();
        assert!(matches!(err, MemoryError::Load(_)));
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memories.json");
        std::fs::write(&path, r#"{"version": 99, "records": []}"#).unwrap();

        let err = MemoryFile::new(&path).load().await.unwrap_err();
        assert!(err.to_string().contains("unsupported store version"));
    }

    #[tokio::test]
    async fn test_failed_rename_keeps_previous_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memories.json");
        std::fs::create_dir(&path).unwrap();

        assert!(write_atomic(&path, b"data").await.is_err());
        assert!(path.is_dir());
        // The temporary file is cleaned up
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
