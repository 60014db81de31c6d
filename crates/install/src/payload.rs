//! Where package bytes come from

use async_trait::async_trait;
use sideload_errors::{Error, InstallError};
use sideload_platform::PayloadStream;
use sideload_types::ItemId;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Supplies the payload streamed into an install session
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn open(&self, item: &ItemId) -> Result<PayloadStream, Error>;
}

/// Reads `<root>/<item-id>.apk`
#[derive(Debug, Clone)]
pub struct DirectoryPayloadSource {
    root: PathBuf,
}

impl DirectoryPayloadSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, item: &ItemId) -> PathBuf {
        self.root.join(format!("{item}.apk"))
    }
}

#[async_trait]
impl PayloadSource for DirectoryPayloadSource {
    async fn open(&self, item: &ItemId) -> Result<PayloadStream, Error> {
        let path = self.path_for(item);
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(InstallError::PayloadNotFound {
                item: item.to_string(),
                path: path.display().to_string(),
            }
            .into()),
            Err(e) => Err(Error::io_with_path(&e, &path)),
        }
    }
}

/// Payloads held in memory; items without an entry get the fallback bytes
#[derive(Debug, Clone, Default)]
pub struct MemoryPayloadSource {
    payloads: HashMap<ItemId, Arc<[u8]>>,
    fallback: Option<Arc<[u8]>>,
}

impl MemoryPayloadSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_payload(mut self, item: impl Into<ItemId>, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.payloads.insert(item.into(), bytes.into());
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.fallback = Some(bytes.into());
        self
    }
}

#[async_trait]
impl PayloadSource for MemoryPayloadSource {
    async fn open(&self, item: &ItemId) -> Result<PayloadStream, Error> {
        let bytes = self
            .payloads
            .get(item)
            .or(self.fallback.as_ref())
            .ok_or_else(|| InstallError::PayloadNotFound {
                item: item.to_string(),
                path: "<memory>".to_string(),
            })?;
        Ok(Box::new(Cursor::new(bytes.to_vec())))
    }
}
