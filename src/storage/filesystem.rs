//! File System State Store
//!
//! Information Hiding:
//! - File naming and directory management hidden behind the trait
//! - Keys are sanitized into file names; values are written verbatim

use super::StateStore;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Each key is stored as {base_path}/{sanitized key}.json
pub struct FileSystemStore {
    base_path: PathBuf,
}

impl FileSystemStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| EngineError::Storage(format!("cannot create {:?}: {}", base_path, e)))?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_path.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl StateStore for FileSystemStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);

        match fs::read_to_string(&path).await {
            Ok(raw) => {
                tracing::debug!("[FileSystemStore] Read '{}' from {:?}", key, path);
                Ok(Some(raw))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Storage(format!("cannot read {:?}: {}", path, e))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(key);
        fs::write(&path, value)
            .await
            .map_err(|e| EngineError::Storage(format!("cannot write {:?}: {}", path, e)))?;

        tracing::debug!("[FileSystemStore] Wrote {} bytes for '{}' to {:?}", value.len(), key, path);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Storage(format!("cannot delete {:?}: {}", path, e))),
        }
    }
}
