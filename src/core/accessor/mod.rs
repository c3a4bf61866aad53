//! Byte storage behind a location.
//!
//! Resources are moved as streams so a component never has to fit in
//! memory.

mod disk;
#[cfg(feature = "s3")]
mod s3;

use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

pub use disk::DiskAccessor;
#[cfg(feature = "s3")]
pub use s3::{S3Accessor, S3Presigner};

/// Chunk size for streamed reads.
pub const BUFFER_SIZE: usize = 128 * 1024;

/// A resource opened for reading.
pub type ResourceReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum AccessorError {
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("I/O error on {resource}: {source}")]
    Io {
        resource: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Operation not supported by {0} accessor")]
    Unsupported(&'static str),
}

/// Reads and writes resources addressed by a resource identifier.
#[async_trait]
pub trait Accessor: Send + Sync {
    /// Short name for logs ("disk", "s3").
    fn kind(&self) -> &'static str;

    async fn exists(&self, resource_identifier: &str) -> Result<bool, AccessorError>;

    async fn open_read(&self, resource_identifier: &str) -> Result<ResourceReader, AccessorError>;

    /// Stream `reader` into the resource, replacing any existing content.
    /// Returns the number of bytes written.
    async fn write_from(
        &self,
        resource_identifier: &str,
        reader: ResourceReader,
    ) -> Result<u64, AccessorError>;

    async fn remove(&self, resource_identifier: &str) -> Result<(), AccessorError>;

    /// A URL the resource can be fetched from.
    async fn get_url(&self, resource_identifier: &str) -> Result<String, AccessorError> {
        let _ = resource_identifier;
        Err(AccessorError::Unsupported(self.kind()))
    }

    /// Write a small in-memory payload.
    async fn write_bytes(
        &self,
        resource_identifier: &str,
        data: Vec<u8>,
    ) -> Result<u64, AccessorError> {
        self.write_from(resource_identifier, Box::pin(io::Cursor::new(data)))
            .await
    }
}

/// Produces time-limited retrieval URLs for resource keys.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, AccessorError>;
}

/// Feeds every byte read through a shared BLAKE3 hasher.
pub struct HashingReader<R> {
    inner: R,
    hasher: Arc<Mutex<blake3::Hasher>>,
}

impl<R> HashingReader<R> {
    pub fn new(inner: R) -> (Self, Arc<Mutex<blake3::Hasher>>) {
        let hasher = Arc::new(Mutex::new(blake3::Hasher::new()));
        (
            Self {
                inner,
                hasher: hasher.clone(),
            },
            hasher,
        )
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.hasher
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .update(&buf.filled()[before..]);
        }
        poll
    }
}

/// BLAKE3 of a resource, read in chunks.
pub async fn hash_resource(
    accessor: &dyn Accessor,
    resource_identifier: &str,
) -> Result<blake3::Hash, AccessorError> {
    let mut reader = accessor.open_read(resource_identifier).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .await
            .map_err(|source| AccessorError::Io {
                resource: resource_identifier.to_string(),
                source,
            })?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hasher.finalize())
}
