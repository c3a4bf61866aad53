//! SQLite-backed entity catalog.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_rusqlite::{Connection, rusqlite};
use tracing::debug;

use crate::core::catalog::{CatalogConnector, ComponentFilter, EntityCatalog, QueryError};
use crate::core::models::{Component, Job, JobWithHistory, LocationRecord};

pub mod entities;
pub mod jobs;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn failed<E: fmt::Display>(e: E) -> QueryError {
    QueryError::Failed(e.to_string())
}

/// Open (creating if needed) the catalog database and apply the schema.
pub async fn init(path: &Path) -> anyhow::Result<SqliteCatalog> {
    Ok(SqliteCatalog::open(path).await?)
}

/// One connection to the catalog database.
#[derive(Clone)]
pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    pub async fn open(path: &Path) -> Result<Self, QueryError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| QueryError::Unreachable(format!("{}: {}", path.display(), e)))?;

        conn.call(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;

            let schema = include_str!("schema.sql");
            conn.execute_batch(schema)?;

            // SQLite leaves foreign keys off unless asked, per connection.
            conn.execute("PRAGMA foreign_keys = ON;", [])?;

            Ok::<(), rusqlite::Error>(())
        })
        .await
        .map_err(failed)?;

        debug!(path = %path.display(), "Opened catalog database");
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub async fn insert_location(
        &self,
        id: &str,
        name: &str,
        label: Option<&str>,
    ) -> Result<LocationRecord, QueryError> {
        entities::insert_location(&self.conn, id, name, label).await
    }

    pub async fn insert_project(&self, id: &str, name: &str) -> Result<(), QueryError> {
        entities::insert_project(&self.conn, id, name).await
    }

    /// Add a context below `parent_id`, which is a project or another context.
    pub async fn insert_context(&self, id: &str, parent_id: &str, name: &str) -> Result<(), QueryError> {
        entities::insert_context(&self.conn, id, parent_id, name).await
    }

    pub async fn insert_version(
        &self,
        id: &str,
        context_id: &str,
        asset: &str,
        version: u32,
    ) -> Result<(), QueryError> {
        entities::insert_version(&self.conn, id, context_id, asset, version).await
    }

    pub async fn insert_component(&self, component: &Component) -> Result<(), QueryError> {
        entities::insert_component(&self.conn, component).await
    }
}

#[async_trait]
impl EntityCatalog for SqliteCatalog {
    async fn query_components(
        &self,
        filter: &ComponentFilter,
    ) -> Result<Vec<Component>, QueryError> {
        entities::query_components(&self.conn, filter).await
    }

    async fn list_locations(&self) -> Result<Vec<LocationRecord>, QueryError> {
        entities::list_locations(&self.conn).await
    }

    async fn get_location(&self, id: &str) -> Result<Option<LocationRecord>, QueryError> {
        entities::get_location(&self.conn, id).await
    }

    async fn ensure_location(&self, name: &str) -> Result<LocationRecord, QueryError> {
        entities::ensure_location(&self.conn, name).await
    }

    async fn resource_identifier(
        &self,
        component_id: &str,
        location_id: &str,
    ) -> Result<Option<String>, QueryError> {
        entities::resource_identifier(&self.conn, component_id, location_id).await
    }

    async fn add_component_location(
        &self,
        component_id: &str,
        location_id: &str,
        resource_identifier: &str,
    ) -> Result<(), QueryError> {
        entities::add_component_location(&self.conn, component_id, location_id, resource_identifier)
            .await
    }

    async fn component_path(&self, component_id: &str) -> Result<Vec<String>, QueryError> {
        entities::component_path(&self.conn, component_id).await
    }

    async fn create_job(&self, job: &Job) -> Result<(), QueryError> {
        jobs::create(&self.conn, job).await
    }

    async fn update_job(&self, job: &Job) -> Result<(), QueryError> {
        jobs::update(&self.conn, job).await
    }

    async fn get_job(&self, id: &str) -> Result<JobWithHistory, QueryError> {
        jobs::get(&self.conn, id).await
    }

    async fn list_jobs(&self, limit: u32, offset: u32) -> Result<Vec<Job>, QueryError> {
        jobs::list(&self.conn, limit, offset).await
    }
}

/// Opens a fresh connection to the same database file for every transfer.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogConnector for SqliteConnector {
    async fn connect(&self) -> Result<Arc<dyn EntityCatalog>, QueryError> {
        let catalog = SqliteCatalog::open(&self.path).await?;
        Ok(Arc::new(catalog))
    }
}
