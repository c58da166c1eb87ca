//! Blob storage: an abstract key → bytes store rooted under a base path,
//! with local-filesystem and S3-compatible backings.

mod artifact;
mod local;
mod s3;

pub use artifact::ArtifactManager;
pub use local::LocalBlobStore;
pub use s3::S3BlobStore;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeekExt, ReadBuf, SeekFrom};

use crate::config::StorageConfig;
use crate::error::Result;

/// Metadata about a stored key.
#[derive(Debug, Clone)]
pub struct BlobStat {
    pub size: i64,
    pub modified_unix: i64,
    pub is_dir: bool,
}

/// A readable blob body. Local blobs are seekable files; object-store
/// blobs are plain streams and report seek as unsupported so callers can
/// fall back to full-body responses.
pub enum BlobReader {
    File {
        file: tokio::fs::File,
        size: i64,
    },
    Stream {
        stream: Box<dyn AsyncRead + Send + Unpin>,
        size: i64,
    },
}

impl BlobReader {
    pub fn size(&self) -> i64 {
        match self {
            BlobReader::File { size, .. } | BlobReader::Stream { size, .. } => *size,
        }
    }

    /// Attempts to seek to an absolute offset. Returns false when the
    /// underlying reader cannot seek.
    pub async fn seek_start(&mut self, offset: u64) -> std::io::Result<bool> {
        match self {
            BlobReader::File { file, .. } => {
                file.seek(SeekFrom::Start(offset)).await?;
                Ok(true)
            }
            BlobReader::Stream { .. } => Ok(false),
        }
    }

    pub async fn read_to_end(mut self) -> std::io::Result<Vec<u8>> {
        use tokio::io::AsyncReadExt;
        let mut buf = Vec::new();
        match &mut self {
            BlobReader::File { file, .. } => {
                file.read_to_end(&mut buf).await?;
            }
            BlobReader::Stream { stream, .. } => {
                stream.read_to_end(&mut buf).await?;
            }
        }
        Ok(buf)
    }
}

impl AsyncRead for BlobReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            BlobReader::File { file, .. } => Pin::new(file).poll_read(cx, buf),
            BlobReader::Stream { stream, .. } => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

/// BlobStore defines the storage backend interface.
///
/// Keys are forward-slash relative paths; implementations join them to
/// their configured base after validation.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `size` bytes from the reader at `key`, creating intermediate
    /// directories or key prefixes. Overwrites an existing key.
    async fn put(
        &self,
        key: &str,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        size: i64,
    ) -> Result<()>;

    /// Opens the blob at `key` for reading.
    async fn get(&self, key: &str) -> Result<BlobReader>;

    /// Returns true if `key` exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Removes `key`; for hierarchical backends this removes the whole
    /// subtree rooted at `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Recursively enumerates keys under `prefix`, relative to the base.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Returns size/mtime metadata for `key`.
    async fn stat(&self, key: &str) -> Result<BlobStat>;

    /// True when the backend is the local filesystem. Storage
    /// reconciliation is only offered for local backings.
    fn is_local(&self) -> bool {
        false
    }
}

/// Builds a blob store from server configuration.
pub async fn create_store(cfg: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    match cfg {
        StorageConfig::Local { path } => Ok(Arc::new(LocalBlobStore::new(path).await?)),
        StorageConfig::S3 {
            endpoint,
            access_key,
            secret_key,
            bucket,
            base_prefix,
            use_tls,
        } => Ok(Arc::new(
            S3BlobStore::new(
                endpoint,
                access_key,
                secret_key,
                bucket,
                base_prefix.as_deref().unwrap_or(""),
                *use_tls,
            )
            .await?,
        )),
    }
}
