//! In-process catalog used by tests and simulation mode.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{CatalogConnector, ComponentFilter, ComponentScope, EntityCatalog, QueryError};
use crate::core::models::{Component, Job, JobStatusEntry, JobWithHistory, LocationRecord};

#[derive(Debug, Clone)]
struct ContextNode {
    name: String,
    parent_id: Option<String>,
    project_id: String,
}

#[derive(Debug, Clone)]
struct VersionNode {
    asset: String,
    version: u32,
    context_id: String,
}

#[derive(Default)]
struct State {
    locations: Vec<LocationRecord>,
    contexts: HashMap<String, ContextNode>,
    versions: HashMap<String, VersionNode>,
    components: Vec<Component>,
    presence: HashMap<(String, String), String>,
    jobs: Vec<Job>,
    history: HashMap<String, Vec<JobStatusEntry>>,
    unreachable: bool,
    component_queries_fail: bool,
}

impl State {
    fn check_reachable(&self) -> Result<(), QueryError> {
        if self.unreachable {
            return Err(QueryError::Unreachable("memory catalog offline".to_string()));
        }
        Ok(())
    }

    /// Context ids from `context_id` up to its root. Stops at the first
    /// repeated id, so a corrupt parent cycle still terminates.
    fn ancestry<'a>(&'a self, context_id: &'a str) -> Vec<(&'a str, &'a ContextNode)> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(context_id);
        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            let Some(node) = self.contexts.get(id) else {
                break;
            };
            chain.push((id, node));
            current = node.parent_id.as_deref();
        }
        chain
    }

    /// True if `context_id` is one of `ids` or has an ancestor in `ids`.
    fn context_within(&self, context_id: &str, ids: &HashSet<&str>) -> bool {
        ids.contains(context_id)
            || self
                .ancestry(context_id)
                .iter()
                .any(|(id, _)| ids.contains(id))
    }

    fn matches(&self, component: &Component, scope: &ComponentScope) -> bool {
        let owning_context = || {
            self.versions
                .get(&component.version_id)
                .map(|v| v.context_id.as_str())
        };
        match scope {
            ComponentScope::Projects(ids) => owning_context().is_some_and(|ctx| {
                ids.iter().any(|p| p == ctx)
                    || self
                        .contexts
                        .get(ctx)
                        .is_some_and(|c| ids.contains(&c.project_id))
            }),
            ComponentScope::Contexts(ids) => {
                let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
                owning_context().is_some_and(|ctx| self.context_within(ctx, &ids))
            }
            ComponentScope::Versions(ids) => ids.contains(&component.version_id),
            ComponentScope::Components(ids) => ids.contains(&component.id),
        }
    }
}

/// Catalog held entirely in memory. Clones share state, so a clone behaves
/// like another connection to the same backend.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<State>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every query fail as if the backend went away.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Make component queries fail while every other call keeps working.
    pub fn fail_component_queries(&self, fail: bool) {
        self.lock().component_queries_fail = fail;
    }

    pub fn add_location(&self, id: &str, name: &str) -> LocationRecord {
        let record = LocationRecord {
            id: id.to_string(),
            name: name.to_string(),
            label: None,
        };
        self.lock().locations.push(record.clone());
        record
    }

    pub fn add_project(&self, id: &str, name: &str) {
        self.lock().contexts.insert(
            id.to_string(),
            ContextNode {
                name: name.to_string(),
                parent_id: None,
                project_id: id.to_string(),
            },
        );
    }

    /// Add a context below `parent_id`, which is a project or another context.
    pub fn add_context(&self, id: &str, parent_id: &str, name: &str) {
        let mut state = self.lock();
        let project_id = state
            .contexts
            .get(parent_id)
            .map(|p| p.project_id.clone())
            .unwrap_or_else(|| parent_id.to_string());
        state.contexts.insert(
            id.to_string(),
            ContextNode {
                name: name.to_string(),
                parent_id: Some(parent_id.to_string()),
                project_id,
            },
        );
    }

    pub fn add_version(&self, id: &str, context_id: &str, asset: &str, version: u32) {
        self.lock().versions.insert(
            id.to_string(),
            VersionNode {
                asset: asset.to_string(),
                version,
                context_id: context_id.to_string(),
            },
        );
    }

    pub fn add_component(&self, id: &str, version_id: &str, name: &str, file_type: &str) -> Component {
        let component = Component {
            id: id.to_string(),
            name: name.to_string(),
            file_type: file_type.to_string(),
            version_id: version_id.to_string(),
            size: None,
        };
        self.lock().components.push(component.clone());
        component
    }

    pub fn set_presence(&self, component_id: &str, location_id: &str, resource_identifier: &str) {
        self.lock().presence.insert(
            (component_id.to_string(), location_id.to_string()),
            resource_identifier.to_string(),
        );
    }

    pub fn is_present(&self, component_id: &str, location_id: &str) -> bool {
        self.lock()
            .presence
            .contains_key(&(component_id.to_string(), location_id.to_string()))
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.lock().jobs.clone()
    }

    /// Committed descriptions of a job, oldest first.
    pub fn job_descriptions(&self, job_id: &str) -> Vec<String> {
        self.lock()
            .history
            .get(job_id)
            .map(|h| h.iter().map(|e| e.description.clone()).collect())
            .unwrap_or_default()
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl EntityCatalog for MemoryCatalog {
    async fn query_components(
        &self,
        filter: &ComponentFilter,
    ) -> Result<Vec<Component>, QueryError> {
        let state = self.lock();
        state.check_reachable()?;
        if state.component_queries_fail {
            return Err(QueryError::Failed("component query failed".to_string()));
        }
        Ok(state
            .components
            .iter()
            .filter(|c| state.matches(c, &filter.scope))
            .filter(|c| {
                state
                    .presence
                    .contains_key(&(c.id.clone(), filter.location_id.clone()))
            })
            .cloned()
            .collect())
    }

    async fn list_locations(&self) -> Result<Vec<LocationRecord>, QueryError> {
        let state = self.lock();
        state.check_reachable()?;
        Ok(state.locations.clone())
    }

    async fn get_location(&self, id: &str) -> Result<Option<LocationRecord>, QueryError> {
        let state = self.lock();
        state.check_reachable()?;
        Ok(state.locations.iter().find(|l| l.id == id).cloned())
    }

    async fn ensure_location(&self, name: &str) -> Result<LocationRecord, QueryError> {
        let mut state = self.lock();
        state.check_reachable()?;
        if let Some(existing) = state.locations.iter().find(|l| l.name == name) {
            return Ok(existing.clone());
        }
        let record = LocationRecord {
            id: uuid::Uuid::now_v7().to_string(),
            name: name.to_string(),
            label: None,
        };
        state.locations.push(record.clone());
        Ok(record)
    }

    async fn resource_identifier(
        &self,
        component_id: &str,
        location_id: &str,
    ) -> Result<Option<String>, QueryError> {
        let state = self.lock();
        state.check_reachable()?;
        Ok(state
            .presence
            .get(&(component_id.to_string(), location_id.to_string()))
            .cloned())
    }

    async fn add_component_location(
        &self,
        component_id: &str,
        location_id: &str,
        resource_identifier: &str,
    ) -> Result<(), QueryError> {
        let mut state = self.lock();
        state.check_reachable()?;
        state.presence.insert(
            (component_id.to_string(), location_id.to_string()),
            resource_identifier.to_string(),
        );
        Ok(())
    }

    async fn component_path(&self, component_id: &str) -> Result<Vec<String>, QueryError> {
        let state = self.lock();
        state.check_reachable()?;
        let component = state
            .components
            .iter()
            .find(|c| c.id == component_id)
            .ok_or_else(|| QueryError::NotFound {
                entity: "Component",
                id: component_id.to_string(),
            })?;
        let version = state
            .versions
            .get(&component.version_id)
            .ok_or_else(|| QueryError::NotFound {
                entity: "AssetVersion",
                id: component.version_id.clone(),
            })?;

        let mut segments: Vec<String> = state
            .ancestry(&version.context_id)
            .into_iter()
            .map(|(_, ctx)| ctx.name.clone())
            .collect();
        segments.reverse();
        segments.push(version.asset.clone());
        segments.push(format!("v{:03}", version.version));
        Ok(segments)
    }

    async fn create_job(&self, job: &Job) -> Result<(), QueryError> {
        let mut state = self.lock();
        state.check_reachable()?;
        let stamp = now();
        let mut stored = job.clone();
        stored.created_at = Some(stamp.clone());
        stored.updated_at = Some(stamp.clone());
        state.jobs.push(stored);
        state.history.entry(job.id.clone()).or_default().push(JobStatusEntry {
            status: job.status,
            description: job.description.clone(),
            created_at: stamp,
        });
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> Result<(), QueryError> {
        let mut state = self.lock();
        state.check_reachable()?;
        let stamp = now();
        let stored = state
            .jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| QueryError::NotFound {
                entity: "Job",
                id: job.id.clone(),
            })?;
        stored.status = job.status;
        stored.description = job.description.clone();
        stored.updated_at = Some(stamp.clone());
        state.history.entry(job.id.clone()).or_default().push(JobStatusEntry {
            status: job.status,
            description: job.description.clone(),
            created_at: stamp,
        });
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<JobWithHistory, QueryError> {
        let state = self.lock();
        state.check_reachable()?;
        let job = state
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| QueryError::NotFound {
                entity: "Job",
                id: id.to_string(),
            })?;
        let history = state.history.get(id).cloned().unwrap_or_default();
        Ok(JobWithHistory { job, history })
    }

    async fn list_jobs(&self, limit: u32, offset: u32) -> Result<Vec<Job>, QueryError> {
        let state = self.lock();
        state.check_reachable()?;
        Ok(state
            .jobs
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Hands out clones of one [`MemoryCatalog`] and counts connections.
#[derive(Clone)]
pub struct MemoryConnector {
    catalog: MemoryCatalog,
    connections: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(catalog: MemoryCatalog) -> Self {
        Self {
            catalog,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn EntityCatalog>, QueryError> {
        self.catalog.lock().check_reachable()?;
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.catalog.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        catalog.add_location("vault-a", "vault-a");
        catalog.add_project("p1", "show");
        catalog.add_context("seq", "p1", "sq010");
        catalog.add_context("shot", "seq", "sh0010");
        catalog.add_version("v1", "shot", "plate", 3);
        catalog.add_component("c1", "v1", "main", ".exr");
        catalog.set_presence("c1", "vault-a", "show/sq010/sh0010/plate/v003/main.exr");
        catalog
    }

    #[tokio::test]
    async fn context_scope_reaches_nested_contexts() {
        let catalog = seeded();
        let filter = ComponentFilter::new(ComponentScope::Contexts(vec!["seq".into()]), "vault-a");
        let found = catalog.query_components(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn project_scope_uses_project_membership() {
        let catalog = seeded();
        let filter = ComponentFilter::new(ComponentScope::Projects(vec!["p1".into()]), "vault-a");
        assert_eq!(catalog.query_components(&filter).await.unwrap().len(), 1);

        let elsewhere = ComponentFilter::new(ComponentScope::Projects(vec!["p1".into()]), "vault-b");
        assert!(catalog.query_components(&elsewhere).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn component_path_walks_up_to_project() {
        let catalog = seeded();
        let path = catalog.component_path("c1").await.unwrap();
        assert_eq!(path, vec!["show", "sq010", "sh0010", "plate", "v003"]);
    }

    #[tokio::test]
    async fn cyclic_parents_terminate() {
        let catalog = MemoryCatalog::new();
        catalog.add_location("vault-a", "vault-a");
        catalog.add_context("x", "y", "loop-x");
        catalog.add_context("y", "x", "loop-y");
        catalog.add_version("v1", "x", "plate", 1);
        catalog.add_component("c1", "v1", "main", ".exr");
        catalog.set_presence("c1", "vault-a", "main.exr");

        let elsewhere = ComponentFilter::new(ComponentScope::Contexts(vec!["z".into()]), "vault-a");
        assert!(catalog.query_components(&elsewhere).await.unwrap().is_empty());

        let looped = ComponentFilter::new(ComponentScope::Contexts(vec!["y".into()]), "vault-a");
        assert_eq!(catalog.query_components(&looped).await.unwrap().len(), 1);

        let path = catalog.component_path("c1").await.unwrap();
        assert_eq!(path, vec!["loop-y", "loop-x", "plate", "v001"]);
    }

    #[tokio::test]
    async fn unreachable_catalog_fails_queries() {
        let catalog = seeded();
        catalog.set_unreachable(true);
        let err = catalog.list_locations().await.unwrap_err();
        assert!(matches!(err, QueryError::Unreachable(_)));
    }

    #[tokio::test]
    async fn ensure_location_is_idempotent() {
        let catalog = MemoryCatalog::new();
        let first = catalog.ensure_location("studio.disk").await.unwrap();
        let second = catalog.ensure_location("studio.disk").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(catalog.list_locations().await.unwrap().len(), 1);
    }
}
