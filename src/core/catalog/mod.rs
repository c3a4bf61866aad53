//! Entity catalog interface.
//!
//! The catalog is the query side of the asset-management backend: locations,
//! the project/context/version/component hierarchy, per-location presence
//! records and job records. Two implementations ship with the crate:
//! [`crate::db::SqliteCatalog`] and [`MemoryCatalog`].

mod memory;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::core::models::{Component, Job, JobWithHistory, LocationRecord};

pub use memory::{MemoryCatalog, MemoryConnector};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Catalog unreachable: {0}")]
    Unreachable(String),
    #[error("Query failed: {0}")]
    Failed(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

/// Which components a filter selects, before the location constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentScope {
    /// Components whose version belongs to the projects, at any depth.
    Projects(Vec<String>),
    /// Components whose version's owning context is one of these contexts
    /// or a descendant of one.
    Contexts(Vec<String>),
    Versions(Vec<String>),
    Components(Vec<String>),
}

/// A component query constrained to components present in a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentFilter {
    pub scope: ComponentScope,
    pub location_id: String,
}

impl ComponentFilter {
    pub fn new(scope: ComponentScope, location_id: impl Into<String>) -> Self {
        Self {
            scope,
            location_id: location_id.into(),
        }
    }
}

fn quoted(ids: &[String]) -> String {
    ids.iter()
        .map(|id| format!("\"{}\"", id))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for ComponentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            ComponentScope::Projects(ids) => write!(
                f,
                "Component where (version.asset.parent.project.id in ({0}) or version.asset.parent.id in ({0}))",
                quoted(ids)
            )?,
            ComponentScope::Contexts(ids) => write!(
                f,
                "Component where (version.asset.parent.ancestors.id in ({0}) or version.asset.parent.id in ({0}))",
                quoted(ids)
            )?,
            ComponentScope::Versions(ids) => {
                write!(f, "Component where version_id in ({})", quoted(ids))?
            }
            ComponentScope::Components(ids) => {
                write!(f, "Component where id in ({})", quoted(ids))?
            }
        }
        write!(
            f,
            " and component_locations.location_id is \"{}\"",
            self.location_id
        )
    }
}

/// Typed query interface over the asset-management entities.
#[async_trait]
pub trait EntityCatalog: Send + Sync {
    /// Components matching the filter, each at most once.
    async fn query_components(&self, filter: &ComponentFilter)
    -> Result<Vec<Component>, QueryError>;

    async fn list_locations(&self) -> Result<Vec<LocationRecord>, QueryError>;

    async fn get_location(&self, id: &str) -> Result<Option<LocationRecord>, QueryError>;

    /// Return the location with this name, creating it if missing.
    async fn ensure_location(&self, name: &str) -> Result<LocationRecord, QueryError>;

    /// Resource identifier of a component in a location, `None` when the
    /// component has no presence record there.
    async fn resource_identifier(
        &self,
        component_id: &str,
        location_id: &str,
    ) -> Result<Option<String>, QueryError>;

    async fn add_component_location(
        &self,
        component_id: &str,
        location_id: &str,
        resource_identifier: &str,
    ) -> Result<(), QueryError>;

    /// Names from the project down to the version owning the component.
    async fn component_path(&self, component_id: &str) -> Result<Vec<String>, QueryError>;

    async fn create_job(&self, job: &Job) -> Result<(), QueryError>;

    /// Persist the job's current status and description in one transaction.
    async fn update_job(&self, job: &Job) -> Result<(), QueryError>;

    async fn get_job(&self, id: &str) -> Result<JobWithHistory, QueryError>;

    async fn list_jobs(&self, limit: u32, offset: u32) -> Result<Vec<Job>, QueryError>;
}

/// Opens private catalog connections, one per transfer invocation.
#[async_trait]
pub trait CatalogConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn EntityCatalog>, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_filter_renders_query_expression() {
        let filter = ComponentFilter::new(
            ComponentScope::Versions(vec!["a".into(), "b".into()]),
            "loc",
        );
        assert_eq!(
            filter.to_string(),
            r#"Component where version_id in ("a", "b") and component_locations.location_id is "loc""#
        );
    }

    #[test]
    fn project_filter_mentions_both_branches() {
        let filter = ComponentFilter::new(ComponentScope::Projects(vec!["p".into()]), "loc");
        let rendered = filter.to_string();
        assert!(rendered.contains(r#"version.asset.parent.project.id in ("p")"#));
        assert!(rendered.contains(r#"version.asset.parent.id in ("p")"#));
    }
}
