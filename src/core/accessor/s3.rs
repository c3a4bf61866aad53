use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::{Accessor, AccessorError, ResourceReader, UrlSigner};

/// Lifetime of URLs handed out by [`S3Accessor::get_url`].
const URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Objects at least this large are uploaded in parts of this size. S3
/// rejects parts under 5 MiB other than the last.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Stores resources as objects in one bucket.
pub struct S3Accessor {
    client: Client,
    bucket: String,
    signer: Arc<dyn UrlSigner>,
}

impl S3Accessor {
    /// Accessor whose URLs are S3 presigned GET requests.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let signer = Arc::new(S3Presigner::new(client.clone(), bucket.clone()));
        Self {
            client,
            bucket,
            signer,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn UrlSigner>) -> Self {
        self.signer = signer;
        self
    }

    /// Build a client for an S3-compatible endpoint using the ambient AWS
    /// credential chain.
    pub async fn connect(endpoint: &str, bucket: impl Into<String>) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .load()
            .await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();
        Self::new(Client::from_conf(config), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        reader: &mut ResourceReader,
    ) -> Result<u64, AccessorError> {
        let mut parts = Vec::new();
        let mut size = 0u64;
        let mut part = first;
        let mut part_number = 1i32;

        while !part.is_empty() {
            let last = part.len() < PART_SIZE;
            size += part.len() as u64;
            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(backend)?;
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            if last {
                break;
            }
            part_number += 1;
            part = read_part(reader).await.map_err(|source| AccessorError::Io {
                resource: key.to_string(),
                source,
            })?;
        }

        let parts_count = parts.len();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(backend)?;
        debug!(key, bytes = size, parts = parts_count, "Completed multipart upload");
        Ok(size)
    }
}

/// Read up to [`PART_SIZE`] bytes; a shorter result means end of stream.
async fn read_part(reader: &mut ResourceReader) -> std::io::Result<Vec<u8>> {
    let mut part = Vec::with_capacity(PART_SIZE);
    let mut limited = (&mut *reader).take(PART_SIZE as u64);
    limited.read_to_end(&mut part).await?;
    Ok(part)
}

fn backend<E: std::fmt::Display>(e: E) -> AccessorError {
    AccessorError::Backend(e.to_string())
}

#[async_trait]
impl Accessor for S3Accessor {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn exists(&self, resource_identifier: &str) -> Result<bool, AccessorError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(resource_identifier)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(backend(service))
                }
            }
        }
    }

    async fn open_read(&self, resource_identifier: &str) -> Result<ResourceReader, AccessorError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(resource_identifier)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    AccessorError::NotFound(resource_identifier.to_string())
                } else {
                    backend(service)
                }
            })?;
        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn write_from(
        &self,
        resource_identifier: &str,
        mut reader: ResourceReader,
    ) -> Result<u64, AccessorError> {
        let io_failed = |source: std::io::Error| AccessorError::Io {
            resource: resource_identifier.to_string(),
            source,
        };

        let first = read_part(&mut reader).await.map_err(io_failed)?;
        if first.len() < PART_SIZE {
            let size = first.len() as u64;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(resource_identifier)
                .body(ByteStream::from(first))
                .send()
                .await
                .map_err(backend)?;
            return Ok(size);
        }

        let upload = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(resource_identifier)
            .send()
            .await
            .map_err(backend)?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| AccessorError::Backend("Multipart upload has no id".into()))?
            .to_string();

        match self
            .upload_parts(resource_identifier, &upload_id, first, &mut reader)
            .await
        {
            Ok(size) => Ok(size),
            Err(e) => {
                warn!(key = resource_identifier, error = %e, "Aborting multipart upload");
                let _ = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(resource_identifier)
                    .upload_id(&upload_id)
                    .send()
                    .await;
                Err(e)
            }
        }
    }

    async fn remove(&self, resource_identifier: &str) -> Result<(), AccessorError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(resource_identifier)
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_url(&self, resource_identifier: &str) -> Result<String, AccessorError> {
        self.signer.signed_url(resource_identifier, URL_EXPIRY).await
    }
}

/// Signs GET requests for objects in a bucket.
pub struct S3Presigner {
    client: Client,
    bucket: String,
}

impl S3Presigner {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl UrlSigner for S3Presigner {
    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, AccessorError> {
        let config = PresigningConfig::expires_in(expires_in).map_err(backend)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(backend)?;
        let url = request.uri().to_string();
        info!(key, "Issued presigned URL");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSigner;

    #[async_trait]
    impl UrlSigner for FixedSigner {
        async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, AccessorError> {
            Ok(format!("https://signed.example/{}?ttl={}", key, expires_in.as_secs()))
        }
    }

    fn offline_client() -> Client {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .build();
        Client::from_conf(config)
    }

    #[tokio::test]
    async fn get_url_delegates_to_injected_signer() {
        let accessor = S3Accessor::new(offline_client(), "proj").with_signer(Arc::new(FixedSigner));
        let url = accessor.get_url("show/main.exr").await.unwrap();
        assert_eq!(url, "https://signed.example/show/main.exr?ttl=3600");
        assert_eq!(accessor.bucket(), "proj");
    }

    #[tokio::test]
    async fn parts_are_cut_at_part_size() {
        let data = vec![3u8; PART_SIZE + 10];
        let mut reader: ResourceReader = Box::pin(std::io::Cursor::new(data));

        assert_eq!(read_part(&mut reader).await.unwrap().len(), PART_SIZE);
        assert_eq!(read_part(&mut reader).await.unwrap().len(), 10);
        assert!(read_part(&mut reader).await.unwrap().is_empty());
    }
}
