//! Seeded in-memory studio for trying the hooks without a catalog database.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::core::accessor::{Accessor, DiskAccessor};
use crate::core::catalog::{EntityCatalog, MemoryCatalog, MemoryConnector};
use crate::core::structure::{StandardStructure, Structure};
use crate::events::{Event, EventData, EventHandler, EventHub, Filter, Reply, Topic};
use crate::hooks::disk_locations::LOCATION_HOOK_PRIORITY;

pub const SOURCE_LOCATION: &str = "sim.source";
pub const TARGET_LOCATION: &str = "sim.target";
pub const PROJECT_ID: &str = "sim-project";

const SHOTS: [(&str, &str); 2] = [("sim-sh0010", "sh0010"), ("sim-sh0020", "sh0020")];

struct LocationSpec {
    id: &'static str,
    name: &'static str,
    dir: &'static str,
    priority: i64,
}

const LOCATIONS: [LocationSpec; 2] = [
    LocationSpec {
        id: "sim-source",
        name: SOURCE_LOCATION,
        dir: "source",
        priority: 1,
    },
    LocationSpec {
        id: "sim-target",
        name: TARGET_LOCATION,
        dir: "target",
        priority: 2,
    },
];

pub struct SimulatedStudio {
    catalog: MemoryCatalog,
    root: PathBuf,
}

impl SimulatedStudio {
    /// Build a small project under `root`: one sequence with two shots, each
    /// with a plate version holding two components present in the source
    /// location only.
    pub async fn seed(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        let catalog = MemoryCatalog::new();
        for spec in &LOCATIONS {
            catalog.add_location(spec.id, spec.name);
        }

        catalog.add_project(PROJECT_ID, "demo");
        catalog.add_context("sim-sq010", PROJECT_ID, "sq010");

        let source = DiskAccessor::new(root.join(LOCATIONS[0].dir));
        let structure = StandardStructure::new();

        for (index, (shot_id, shot_name)) in SHOTS.iter().enumerate() {
            catalog.add_context(shot_id, "sim-sq010", shot_name);
            let version_id = format!("{}-plate-v1", shot_id);
            catalog.add_version(&version_id, shot_id, "plate", 1);

            for (name, file_type) in [("main", ".exr"), ("proxy", ".mov")] {
                let component_id = format!("{}-{}", version_id, name);
                let component = catalog.add_component(&component_id, &version_id, name, file_type);
                let path = catalog.component_path(&component_id).await?;
                let resource = structure.resource_identifier(&component, &path);

                let payload = format!("{} {} frame data {}", shot_name, name, index);
                source.write_bytes(&resource, payload.into_bytes()).await?;
                catalog.set_presence(&component_id, LOCATIONS[0].id, &resource);
            }
        }

        info!(root = %root.display(), "Seeded simulated studio");
        Ok(Self { catalog, root })
    }

    pub fn catalog(&self) -> MemoryCatalog {
        self.catalog.clone()
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector::new(self.catalog.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configure the two scratch locations on every configure-location event.
    pub async fn subscribe(&self, hub: &EventHub) {
        let hook = SimulatedLocationsHook {
            root: self.root.clone(),
        };
        hub.subscribe(
            Filter::topic(Topic::ConfigureLocation),
            LOCATION_HOOK_PRIORITY,
            Arc::new(hook),
        )
        .await;
    }
}

struct SimulatedLocationsHook {
    root: PathBuf,
}

#[async_trait]
impl EventHandler for SimulatedLocationsHook {
    async fn handle(&self, event: &mut Event) -> anyhow::Result<Option<Reply>> {
        let EventData::ConfigureLocation { session } = &event.data else {
            return Ok(None);
        };

        for spec in &LOCATIONS {
            let record = session.ensure_location(spec.name).await?;
            session
                .locations()
                .configure(
                    record,
                    Arc::new(DiskAccessor::new(self.root.join(spec.dir))),
                    Arc::new(StandardStructure::new()),
                    spec.priority,
                )
                .await;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use tempfile::tempdir;

    #[tokio::test]
    async fn seeds_components_in_source_only() {
        let temp = tempdir().unwrap();
        let studio = SimulatedStudio::seed(temp.path()).await.unwrap();
        let catalog = studio.catalog();

        assert!(catalog.is_present("sim-sh0010-plate-v1-main", "sim-source"));
        assert!(!catalog.is_present("sim-sh0010-plate-v1-main", "sim-target"));
        assert!(
            temp.path()
                .join("source/demo/sq010/sh0010/plate/v001/main.exr")
                .exists()
        );
    }

    #[tokio::test]
    async fn configures_both_locations() {
        let temp = tempdir().unwrap();
        let studio = SimulatedStudio::seed(temp.path()).await.unwrap();
        let hub = EventHub::new();
        studio.subscribe(&hub).await;

        let session = Session::new("artist", Arc::new(studio.catalog()));
        session.configure_locations(&hub).await;

        let names: Vec<String> = session
            .available_locations()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec![SOURCE_LOCATION, TARGET_LOCATION]);
    }
}
