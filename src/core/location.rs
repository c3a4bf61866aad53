//! Configured storage locations and the component copy between them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::accessor::{Accessor, AccessorError, HashingReader, hash_resource};
use crate::core::catalog::{EntityCatalog, QueryError};
use crate::core::models::{Component, LocationRecord};
use crate::core::structure::Structure;

/// A catalog location together with the session-side configuration that
/// makes it usable: how bytes are stored and how resources are named.
#[derive(Clone)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
    pub priority: i64,
    pub accessor: Option<Arc<dyn Accessor>>,
    pub structure: Option<Arc<dyn Structure>>,
}

impl Location {
    pub fn from_record(record: LocationRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            label: record.label,
            priority: i64::MAX,
            accessor: None,
            structure: None,
        }
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("accessor", &self.accessor.as_ref().map(|a| a.kind()))
            .finish()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Session-wide table of configured locations, keyed by location id.
#[derive(Clone, Default)]
pub struct LocationRegistry {
    inner: Arc<RwLock<HashMap<String, Location>>>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a catalog location, replacing any earlier configuration.
    pub async fn configure(
        &self,
        record: LocationRecord,
        accessor: Arc<dyn Accessor>,
        structure: Arc<dyn Structure>,
        priority: i64,
    ) -> Location {
        let mut location = Location::from_record(record);
        location.accessor = Some(accessor);
        location.structure = Some(structure);
        location.priority = priority;

        let mut map = self.inner.write().await;
        map.insert(location.id.clone(), location.clone());
        info!(
            location = %location.name,
            priority,
            "Configured location"
        );
        location
    }

    pub async fn get(&self, id: &str) -> Option<Location> {
        let map = self.inner.read().await;
        map.get(id).cloned()
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Location> {
        let map = self.inner.read().await;
        map.values().find(|l| l.name == name).cloned()
    }

    /// Configured locations, lowest priority value first.
    pub async fn all(&self) -> Vec<Location> {
        let map = self.inner.read().await;
        let mut locations: Vec<Location> = map.values().cloned().collect();
        locations.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        locations
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("Component {component} already exists in location {location}")]
    ComponentInLocation { component: String, location: String },
    #[error("Component {component} is not present in location {location}")]
    ComponentNotInLocation { component: String, location: String },
    #[error("Location error: {0}")]
    Location(String),
    /// The catalog failed while the copy was looked up or recorded. Never
    /// tolerated by the ignore flags.
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Copies components between locations.
#[async_trait]
pub trait LocationService: Send + Sync {
    /// Copy `component` from `source` into `target` and record its presence
    /// in `target`.
    async fn add_component(
        &self,
        catalog: &dyn EntityCatalog,
        component: &Component,
        source: &Location,
        target: &Location,
    ) -> Result<(), LocationError>;
}

/// [`LocationService`] that moves bytes through the locations' accessors.
#[derive(Debug, Clone)]
pub struct AccessorTransfer {
    /// Re-read the written resource and compare BLAKE3 hashes.
    pub verify: bool,
}

impl Default for AccessorTransfer {
    fn default() -> Self {
        Self { verify: true }
    }
}

fn accessor_of(location: &Location) -> Result<&Arc<dyn Accessor>, LocationError> {
    location
        .accessor
        .as_ref()
        .ok_or_else(|| LocationError::Location(format!("No accessor configured for {}", location)))
}

#[async_trait]
impl LocationService for AccessorTransfer {
    async fn add_component(
        &self,
        catalog: &dyn EntityCatalog,
        component: &Component,
        source: &Location,
        target: &Location,
    ) -> Result<(), LocationError> {
        if catalog
            .resource_identifier(&component.id, &target.id)
            .await?
            .is_some()
        {
            return Err(LocationError::ComponentInLocation {
                component: component.id.clone(),
                location: target.name.clone(),
            });
        }

        let not_in_source = || LocationError::ComponentNotInLocation {
            component: component.id.clone(),
            location: source.name.clone(),
        };

        let source_resource = catalog
            .resource_identifier(&component.id, &source.id)
            .await?
            .ok_or_else(not_in_source)?;

        let source_accessor = accessor_of(source)?;
        let target_accessor = accessor_of(target)?;
        let structure = target.structure.as_ref().ok_or_else(|| {
            LocationError::Location(format!("No structure configured for {}", target))
        })?;

        let path = catalog.component_path(&component.id).await?;
        let target_resource = structure.resource_identifier(component, &path);

        debug!(
            component = %component.id,
            from = %source_resource,
            to = %target_resource,
            "Copying component"
        );

        let reader = source_accessor
            .open_read(&source_resource)
            .await
            .map_err(|e| match e {
                AccessorError::NotFound(_) => not_in_source(),
                other => LocationError::Location(other.to_string()),
            })?;
        let (reader, source_hash) = HashingReader::new(reader);

        let size = target_accessor
            .write_from(&target_resource, Box::pin(reader))
            .await
            .map_err(|e| LocationError::Location(e.to_string()))?;

        if self.verify {
            let expected = source_hash
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .finalize();
            let written = hash_resource(target_accessor.as_ref(), &target_resource)
                .await
                .map_err(|e| LocationError::Location(e.to_string()))?;
            if written != expected {
                return Err(LocationError::Location(format!(
                    "Checksum mismatch after copying {} to {}",
                    component.id, target.name
                )));
            }
        }

        catalog
            .add_component_location(&component.id, &target.id, &target_resource)
            .await?;

        debug!(component = %component.id, bytes = size, "Component copied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accessor::DiskAccessor;
    use crate::core::catalog::MemoryCatalog;
    use crate::core::structure::StandardStructure;
    use tempfile::tempdir;

    async fn disk_location(
        registry: &LocationRegistry,
        catalog: &MemoryCatalog,
        id: &str,
        root: &std::path::Path,
        priority: i64,
    ) -> Location {
        let record = catalog.add_location(id, id);
        registry
            .configure(
                record,
                Arc::new(DiskAccessor::new(root)),
                Arc::new(StandardStructure::new()),
                priority,
            )
            .await
    }

    fn seeded() -> (MemoryCatalog, Component) {
        let catalog = MemoryCatalog::new();
        catalog.add_project("p1", "show");
        catalog.add_version("v1", "p1", "plate", 1);
        let component = catalog.add_component("c1", "v1", "main", ".exr");
        (catalog, component)
    }

    #[tokio::test]
    async fn copies_bytes_and_records_presence() {
        let temp = tempdir().unwrap();
        let (catalog, component) = seeded();
        let registry = LocationRegistry::new();
        let source = disk_location(&registry, &catalog, "a", &temp.path().join("a"), 1).await;
        let target = disk_location(&registry, &catalog, "b", &temp.path().join("b"), 2).await;

        std::fs::create_dir_all(temp.path().join("a/in")).unwrap();
        std::fs::write(temp.path().join("a/in/main.exr"), b"pixels").unwrap();
        catalog.set_presence("c1", "a", "in/main.exr");

        AccessorTransfer::default()
            .add_component(&catalog, &component, &source, &target)
            .await
            .unwrap();

        let copied = std::fs::read(temp.path().join("b/show/plate/v001/main.exr")).unwrap();
        assert_eq!(copied, b"pixels");
        assert!(catalog.is_present("c1", "b"));
    }

    #[tokio::test]
    async fn streams_multi_chunk_component() {
        let temp = tempdir().unwrap();
        let (catalog, component) = seeded();
        let registry = LocationRegistry::new();
        let source = disk_location(&registry, &catalog, "a", &temp.path().join("a"), 1).await;
        let target = disk_location(&registry, &catalog, "b", &temp.path().join("b"), 2).await;

        let data: Vec<u8> = (0..crate::core::accessor::BUFFER_SIZE * 5 + 3)
            .map(|i| (i % 253) as u8)
            .collect();
        std::fs::create_dir_all(temp.path().join("a/in")).unwrap();
        std::fs::write(temp.path().join("a/in/main.exr"), &data).unwrap();
        catalog.set_presence("c1", "a", "in/main.exr");

        AccessorTransfer { verify: true }
            .add_component(&catalog, &component, &source, &target)
            .await
            .unwrap();

        let copied = std::fs::read(temp.path().join("b/show/plate/v001/main.exr")).unwrap();
        assert_eq!(copied, data);
    }

    #[tokio::test]
    async fn already_present_in_target() {
        let temp = tempdir().unwrap();
        let (catalog, component) = seeded();
        let registry = LocationRegistry::new();
        let source = disk_location(&registry, &catalog, "a", &temp.path().join("a"), 1).await;
        let target = disk_location(&registry, &catalog, "b", &temp.path().join("b"), 2).await;
        catalog.set_presence("c1", "b", "whatever");

        let err = AccessorTransfer::default()
            .add_component(&catalog, &component, &source, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, LocationError::ComponentInLocation { .. }));
    }

    #[tokio::test]
    async fn missing_source_bytes_are_not_in_location() {
        let temp = tempdir().unwrap();
        let (catalog, component) = seeded();
        let registry = LocationRegistry::new();
        let source = disk_location(&registry, &catalog, "a", &temp.path().join("a"), 1).await;
        let target = disk_location(&registry, &catalog, "b", &temp.path().join("b"), 2).await;
        catalog.set_presence("c1", "a", "gone.exr");

        let err = AccessorTransfer::default()
            .add_component(&catalog, &component, &source, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, LocationError::ComponentNotInLocation { .. }));
    }

    #[tokio::test]
    async fn unconfigured_target_is_a_location_error() {
        let temp = tempdir().unwrap();
        let (catalog, component) = seeded();
        let registry = LocationRegistry::new();
        let source = disk_location(&registry, &catalog, "a", &temp.path().join("a"), 1).await;
        let target = Location::from_record(catalog.add_location("b", "b"));
        catalog.set_presence("c1", "a", "in/main.exr");

        let err = AccessorTransfer::default()
            .add_component(&catalog, &component, &source, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, LocationError::Location(_)));
    }

    #[tokio::test]
    async fn registry_sorts_by_priority() {
        let temp = tempdir().unwrap();
        let catalog = MemoryCatalog::new();
        let registry = LocationRegistry::new();
        disk_location(&registry, &catalog, "late", temp.path(), 20).await;
        disk_location(&registry, &catalog, "early", temp.path(), 1).await;

        let names: Vec<String> = registry.all().await.into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["early", "late"]);
        assert!(registry.get_by_name("late").await.is_some());
    }
}
