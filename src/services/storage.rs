use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::utils::validation::is_safe_name;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid staged file name: {0:?}")]
    InvalidName(String),

    #[error("Staged file not found: {0}")]
    NotFound(String),

    #[error("Staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedRole {
    Input,
    Output,
}

/// A file the pipeline owns for the duration of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub role: StagedRole,
}

impl StagedFile {
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: StagedRole::Input,
        }
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: StagedRole::Output,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagedMetadata {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Flat, name-keyed transient storage shared by all requests.
///
/// Names are single path components. There is no locking: callers keep
/// names unique instead.
#[async_trait]
pub trait StagingStore: Send + Sync {
    async fn put(&self, name: &str, data: Vec<u8>) -> StoreResult<()>;
    async fn put_stream<'a>(
        &self,
        name: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> StoreResult<u64>;
    async fn get(&self, name: &str) -> StoreResult<Vec<u8>>;
    /// Removing a missing entry succeeds.
    async fn delete(&self, name: &str) -> StoreResult<()>;
    async fn exists(&self, name: &str) -> bool;
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
    async fn metadata(&self, name: &str) -> StoreResult<StagedMetadata>;
}

fn check_name(name: &str) -> StoreResult<()> {
    if is_safe_name(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Staging store backed by a directory on local disk
pub struct LocalStagingStore {
    root: PathBuf,
}

impl LocalStagingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> StoreResult<PathBuf> {
        check_name(name)?;
        Ok(self.root.join(name))
    }

    fn not_found(name: &str, e: std::io::Error) -> StoreError {
        if e.kind() == ErrorKind::NotFound {
            StoreError::NotFound(name.to_string())
        } else {
            StoreError::Io(e)
        }
    }
}

#[async_trait]
impl StagingStore for LocalStagingStore {
    async fn put(&self, name: &str, data: Vec<u8>) -> StoreResult<()> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn put_stream<'a>(
        &self,
        name: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> StoreResult<u64> {
        let path = self.path_for(name)?;
        let mut file = tokio::fs::File::create(&path).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        Ok(written)
    }

    async fn get(&self, name: &str) -> StoreResult<Vec<u8>> {
        let path = self.path_for(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Self::not_found(name, e))
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> bool {
        match self.path_for(name) {
            Ok(path) => tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn metadata(&self, name: &str) -> StoreResult<StagedMetadata> {
        let path = self.path_for(name)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Self::not_found(name, e))?;

        Ok(StagedMetadata {
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

struct MemoryEntry {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-process staging store, used by tests and embedders without a disk
#[derive(Default)]
pub struct MemoryStagingStore {
    files: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, name: &str, data: Vec<u8>, modified: DateTime<Utc>) {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), MemoryEntry { data, modified });
    }

    /// Inserts an entry with an explicit modification time
    pub fn put_with_modified(
        &self,
        name: &str,
        data: Vec<u8>,
        modified: DateTime<Utc>,
    ) -> StoreResult<()> {
        check_name(name)?;
        self.insert(name, data, modified);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StagingStore for MemoryStagingStore {
    async fn put(&self, name: &str, data: Vec<u8>) -> StoreResult<()> {
        self.put_with_modified(name, data, Utc::now())
    }

    async fn put_stream<'a>(
        &self,
        name: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> StoreResult<u64> {
        check_name(name)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let size = data.len() as u64;
        self.insert(name, data, Utc::now());
        Ok(size)
    }

    async fn get(&self, name: &str) -> StoreResult<Vec<u8>> {
        check_name(name)?;
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        check_name(name)?;
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> bool {
        is_safe_name(name)
            && self
                .files
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains_key(name)
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn metadata(&self, name: &str) -> StoreResult<StagedMetadata> {
        check_name(name)?;
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|entry| StagedMetadata {
                size: entry.data.len() as u64,
                modified: Some(entry.modified),
            })
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}
