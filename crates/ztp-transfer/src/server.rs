//! Transfer server seam and in-memory implementation

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{RwLock, PoisonError};

use crate::error::{Result, TransferError};

/// Read access to the file server switches boot from
#[async_trait]
pub trait TransferServer: Send + Sync {
    /// Names of the entries in `dir`
    async fn list_files(&self, dir: &str) -> Result<Vec<String>>;

    /// Full contents of the file at `path`
    async fn download_file(&self, path: &str) -> Result<Bytes>;

    /// Download a text file as lines, with carriage returns removed
    async fn download_lines(&self, path: &str) -> Result<Vec<String>> {
        let data = self.download_file(path).await?;
        Ok(String::from_utf8_lossy(&data)
            .replace('\r', "")
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Transfer server backed by an in-memory file map
#[derive(Debug, Default)]
pub struct MemoryTransferServer {
    files: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryTransferServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn add_file(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), data.into());
    }

    /// Append to a file, creating it if needed
    pub fn append(&self, path: &str, data: &[u8]) {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        let mut contents = files.get(path).map(|b| b.to_vec()).unwrap_or_default();
        contents.extend_from_slice(data);
        files.insert(path.to_string(), Bytes::from(contents));
    }
}

#[async_trait]
impl TransferServer for MemoryTransferServer {
    async fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        let names: Vec<String> = files
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        Ok(names)
    }

    async fn download_file(&self, path: &str) -> Result<Bytes> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(path.to_string()))
    }
}
