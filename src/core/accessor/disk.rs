use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component as PathComponent, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use super::{Accessor, AccessorError, BUFFER_SIZE, ResourceReader};

/// Stores resources as files below a prefix directory.
#[derive(Debug, Clone)]
pub struct DiskAccessor {
    prefix: PathBuf,
    /// Whether to fsync each file after writing (safer but slower)
    sync_files: bool,
}

impl DiskAccessor {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            sync_files: true,
        }
    }

    pub fn with_sync(mut self, sync_files: bool) -> Self {
        self.sync_files = sync_files;
        self
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Map a resource identifier to a path, refusing anything that would
    /// escape the prefix.
    fn full_path(&self, resource_identifier: &str) -> Result<PathBuf, AccessorError> {
        let relative = Path::new(resource_identifier);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                PathComponent::ParentDir | PathComponent::RootDir | PathComponent::Prefix(_)
            )
        });
        if escapes || resource_identifier.is_empty() {
            return Err(AccessorError::Backend(format!(
                "Invalid resource identifier: {}",
                resource_identifier
            )));
        }
        Ok(self.prefix.join(relative))
    }
}

/// Sibling temp file unique to one write, e.g. `main.exr.partial-<uuid>`.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".partial-{}", uuid::Uuid::now_v7()));
    path.with_file_name(name)
}

fn io_error(resource: &str, e: std::io::Error) -> AccessorError {
    if e.kind() == ErrorKind::NotFound {
        AccessorError::NotFound(resource.to_string())
    } else {
        AccessorError::Io {
            resource: resource.to_string(),
            source: e,
        }
    }
}

#[async_trait]
impl Accessor for DiskAccessor {
    fn kind(&self) -> &'static str {
        "disk"
    }

    async fn exists(&self, resource_identifier: &str) -> Result<bool, AccessorError> {
        let path = self.full_path(resource_identifier)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| io_error(resource_identifier, e))
    }

    async fn open_read(&self, resource_identifier: &str) -> Result<ResourceReader, AccessorError> {
        let path = self.full_path(resource_identifier)?;
        let file = File::open(&path)
            .await
            .map_err(|e| io_error(resource_identifier, e))?;
        Ok(Box::pin(BufReader::with_capacity(BUFFER_SIZE, file)))
    }

    async fn write_from(
        &self,
        resource_identifier: &str,
        mut reader: ResourceReader,
    ) -> Result<u64, AccessorError> {
        let path = self.full_path(resource_identifier)?;
        let failed = |e: std::io::Error| AccessorError::Io {
            resource: resource_identifier.to_string(),
            source: e,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(failed)?;
        }

        // Readers never see a partially written resource: write a sibling
        // temp file and rename it into place.
        let tmp = partial_path(&path);
        let written = async {
            let file = File::create(&tmp).await?;
            let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
            let written = tokio::io::copy(&mut reader, &mut writer).await?;
            writer.flush().await?;
            let file = writer.into_inner();
            if self.sync_files {
                file.sync_all().await?;
            }
            drop(file);
            fs::rename(&tmp, &path).await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        match written {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes, "Wrote resource");
                Ok(bytes)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                Err(failed(e))
            }
        }
    }

    async fn remove(&self, resource_identifier: &str) -> Result<(), AccessorError> {
        let path = self.full_path(resource_identifier)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| io_error(resource_identifier, e))
    }

    async fn get_url(&self, resource_identifier: &str) -> Result<String, AccessorError> {
        let path = self.full_path(resource_identifier)?;
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accessor::hash_resource;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn write_then_read_creates_parent_directories() {
        let temp = tempdir().unwrap();
        let accessor = DiskAccessor::new(temp.path());

        let written = accessor
            .write_bytes("show/sq010/main.exr", b"pixels".to_vec())
            .await
            .unwrap();
        assert_eq!(written, 6);

        assert!(accessor.exists("show/sq010/main.exr").await.unwrap());
        let mut read = Vec::new();
        accessor
            .open_read("show/sq010/main.exr")
            .await
            .unwrap()
            .read_to_end(&mut read)
            .await
            .unwrap();
        assert_eq!(read, b"pixels");

        let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("show/sq010"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn streams_resources_larger_than_one_buffer() {
        let temp = tempdir().unwrap();
        let source = DiskAccessor::new(temp.path().join("a"));
        let target = DiskAccessor::new(temp.path().join("b")).with_sync(false);
        let data: Vec<u8> = (0..BUFFER_SIZE * 3 + 7).map(|i| (i % 251) as u8).collect();
        source.write_bytes("plate.exr", data.clone()).await.unwrap();

        let reader = source.open_read("plate.exr").await.unwrap();
        let written = target.write_from("copy/plate.exr", reader).await.unwrap();

        assert_eq!(written, data.len() as u64);
        assert_eq!(
            hash_resource(&target, "copy/plate.exr").await.unwrap(),
            blake3::hash(&data)
        );
    }

    #[tokio::test]
    async fn concurrent_writes_with_same_stem_do_not_collide() {
        let temp = tempdir().unwrap();
        let accessor = DiskAccessor::new(temp.path());
        let exr = vec![1u8; BUFFER_SIZE * 4];
        let dpx = vec![2u8; BUFFER_SIZE * 4];

        let (a, b) = tokio::join!(
            accessor.write_bytes("v001/main.exr", exr.clone()),
            accessor.write_bytes("v001/main.dpx", dpx.clone()),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(std::fs::read(temp.path().join("v001/main.exr")).unwrap(), exr);
        assert_eq!(std::fs::read(temp.path().join("v001/main.dpx")).unwrap(), dpx);
        assert_eq!(std::fs::read_dir(temp.path().join("v001")).unwrap().count(), 2);
    }

    #[test]
    fn partial_path_keeps_the_full_file_name() {
        let tmp = partial_path(Path::new("/vault/v001/main.exr"));
        let name = tmp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("main.exr.partial-"));
        assert_eq!(tmp.parent(), Some(Path::new("/vault/v001")));
    }

    #[tokio::test]
    async fn missing_resource_maps_to_not_found() {
        let temp = tempdir().unwrap();
        let accessor = DiskAccessor::new(temp.path());

        let err = accessor.open_read("nope.exr").await.err().unwrap();
        assert!(matches!(err, AccessorError::NotFound(_)));
        assert!(!accessor.exists("nope.exr").await.unwrap());
    }

    #[tokio::test]
    async fn refuses_identifiers_outside_prefix() {
        let temp = tempdir().unwrap();
        let accessor = DiskAccessor::new(temp.path());

        assert!(accessor.open_read("../etc/passwd").await.is_err());
        assert!(accessor.write_bytes("/abs/path", Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn url_points_at_file() {
        let accessor = DiskAccessor::new("/mnt/vault");
        let url = accessor.get_url("a/b.exr").await.unwrap();
        assert_eq!(url, "file:///mnt/vault/a/b.exr");
    }
}
