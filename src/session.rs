use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::catalog::{EntityCatalog, QueryError};
use crate::core::location::{Location, LocationRegistry};
use crate::core::models::LocationRecord;
use crate::events::{Event, EventData, EventHub};

/// Per-client state shared by the hooks: who is logged in, the catalog
/// handle, and the locations configured so far.
#[derive(Clone)]
pub struct Session {
    api_user: String,
    catalog: Arc<dyn EntityCatalog>,
    locations: LocationRegistry,
}

impl Session {
    pub fn new(api_user: impl Into<String>, catalog: Arc<dyn EntityCatalog>) -> Self {
        Self {
            api_user: api_user.into(),
            catalog,
            locations: LocationRegistry::new(),
        }
    }

    pub fn api_user(&self) -> &str {
        &self.api_user
    }

    pub fn catalog(&self) -> &Arc<dyn EntityCatalog> {
        &self.catalog
    }

    pub fn locations(&self) -> &LocationRegistry {
        &self.locations
    }

    pub async fn ensure_location(&self, name: &str) -> Result<LocationRecord, QueryError> {
        self.catalog.ensure_location(name).await
    }

    /// Ask every location hook to configure its locations for this session.
    pub async fn configure_locations(&self, hub: &EventHub) {
        let event = Event::new(EventData::ConfigureLocation {
            session: self.clone(),
        })
        .from_user(self.api_user.clone(), self.api_user.clone());

        debug!(user = %self.api_user, "Requesting location configuration");
        hub.publish(event).await;

        let configured = self.locations.all().await;
        info!(count = configured.len(), "Locations configured");
    }

    /// Catalog locations that have storage configured, lowest priority
    /// value first.
    pub async fn available_locations(&self) -> Result<Vec<Location>, QueryError> {
        let records = self.catalog.list_locations().await?;
        let mut available = Vec::new();
        for record in records {
            if let Some(location) = self.locations.get(&record.id).await {
                if location.accessor.is_some() {
                    available.push(location);
                }
            }
        }
        available.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(available)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("api_user", &self.api_user)
            .finish_non_exhaustive()
    }
}
