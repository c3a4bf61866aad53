//! Resolve a user selection into the components present in a location.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::core::catalog::{ComponentFilter, ComponentScope, EntityCatalog, QueryError};
use crate::core::models::{Component, EntityType, SelectionItem};

/// Selection ids grouped by entity type, in the order they were selected.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EntityGroups {
    pub projects: Vec<String>,
    pub contexts: Vec<String>,
    pub versions: Vec<String>,
    pub components: Vec<String>,
}

impl EntityGroups {
    pub fn from_selection(selection: &[SelectionItem]) -> Self {
        let mut groups = Self::default();
        for item in selection {
            debug!(entity_type = %item.entity_type, entity_id = %item.entity_id, "Processing entity");
            let bucket = match item.entity_type {
                EntityType::Project => &mut groups.projects,
                EntityType::Context => &mut groups.contexts,
                EntityType::Version => &mut groups.versions,
                EntityType::Component => &mut groups.components,
            };
            bucket.push(item.entity_id.clone());
        }
        groups
    }

    /// One filter per non-empty group.
    pub fn filters(&self, location_id: &str) -> Vec<ComponentFilter> {
        let mut filters = Vec::new();
        if !self.projects.is_empty() {
            filters.push(ComponentScope::Projects(self.projects.clone()));
        }
        if !self.contexts.is_empty() {
            filters.push(ComponentScope::Contexts(self.contexts.clone()));
        }
        if !self.versions.is_empty() {
            filters.push(ComponentScope::Versions(self.versions.clone()));
        }
        if !self.components.is_empty() {
            filters.push(ComponentScope::Components(self.components.clone()));
        }
        filters
            .into_iter()
            .map(|scope| ComponentFilter::new(scope, location_id))
            .collect()
    }
}

/// Components of `selection` that have a presence record in `location_id`,
/// each returned once, in first-seen order.
pub async fn components_in_location(
    catalog: &dyn EntityCatalog,
    selection: &[SelectionItem],
    location_id: &str,
) -> Result<Vec<Component>, QueryError> {
    let groups = EntityGroups::from_selection(selection);

    let mut seen = HashSet::new();
    let mut components = Vec::new();
    for filter in groups.filters(location_id) {
        info!(query = %filter, "Querying components");
        for component in catalog.query_components(&filter).await? {
            if seen.insert(component.id.clone()) {
                components.push(component);
            }
        }
    }

    info!(count = components.len(), "Found components in selection");
    Ok(components)
}
