//! Batch transfer of a selection's components between two locations.
//!
//! One invocation owns one catalog connection and one job record. Components
//! are copied strictly one after another; before each copy the job
//! description is updated to "N of M" and committed, which is the only
//! progress signal observers get. Per-component failures are classified by
//! [`TransferOptions::classify`] and either tolerated or abort the batch.

mod spawner;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::core::catalog::{CatalogConnector, EntityCatalog, QueryError};
use crate::core::job::JobRecord;
use crate::core::location::{Location, LocationError, LocationService};
use crate::core::models::{JobStatus, SelectionItem};
use crate::core::selection;

pub use spawner::{TransferHandle, TransferSpawner};

/// Job description while the selection is being resolved.
pub const GATHERING_DESCRIPTION: &str = "Transfer components (Gathering...)";

pub fn progress_description(position: usize, total: usize) -> String {
    format!("Transfer components ({} of {})", position, total)
}

/// Error tolerance for a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// Skip components that are missing from the source location.
    pub ignore_missing: bool,
    /// Skip components that fail with any location error.
    pub ignore_location_errors: bool,
}

/// What the batch does with a failed component copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Already in the target; counts as done.
    AlreadyPresent,
    /// Tolerated failure; continue with the next component.
    Ignored,
    /// Stop the batch and fail the job.
    Abort,
}

impl TransferOptions {
    /// `ignore_location_errors` also covers missing components, but neither
    /// flag matters for components already in the target or for catalog
    /// failures.
    pub fn classify(&self, error: &LocationError) -> Disposition {
        match error {
            LocationError::ComponentInLocation { .. } => Disposition::AlreadyPresent,
            LocationError::ComponentNotInLocation { .. } => {
                if self.ignore_missing || self.ignore_location_errors {
                    Disposition::Ignored
                } else {
                    Disposition::Abort
                }
            }
            LocationError::Location(_) => {
                if self.ignore_location_errors {
                    Disposition::Ignored
                } else {
                    Disposition::Abort
                }
            }
            LocationError::Query(_) => Disposition::Abort,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub job_id: String,
    pub selection: Vec<SelectionItem>,
    pub source: Location,
    pub target: Location,
    pub options: TransferOptions,
    pub user_id: Option<String>,
}

impl TransferRequest {
    pub fn new(selection: Vec<SelectionItem>, source: Location, target: Location) -> Self {
        Self {
            job_id: uuid::Uuid::now_v7().to_string(),
            selection,
            source,
            target,
            options: TransferOptions::default(),
            user_id: None,
        }
    }
}

/// Counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub total: usize,
    pub copied: usize,
    pub already_present: usize,
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Failed to connect to catalog: {0}")]
    Connect(#[source] QueryError),
    #[error("Failed to resolve components: {0}")]
    Resolve(#[source] QueryError),
    #[error("Failed to update job: {0}")]
    Job(#[source] QueryError),
    #[error("Failed to transfer component {component}: {source}")]
    Location {
        component: String,
        #[source]
        source: LocationError,
    },
    #[error("Transfer cancelled")]
    Cancelled,
}

/// Runs transfer requests against a fresh catalog connection each time.
pub struct TransferEngine {
    connector: Arc<dyn CatalogConnector>,
    service: Arc<dyn LocationService>,
}

impl TransferEngine {
    pub fn new(connector: Arc<dyn CatalogConnector>, service: Arc<dyn LocationService>) -> Self {
        Self { connector, service }
    }

    /// Run one transfer to completion. All outcomes are also recorded on the
    /// job; the return value is only for the task that drives the run.
    pub async fn run(
        &self,
        request: TransferRequest,
        cancel: CancellationToken,
    ) -> Result<TransferSummary, TransferError> {
        let span = info_span!(
            "transfer",
            job_id = %request.job_id,
            from = %request.source.name,
            to = %request.target.name
        );

        self.execute(&request, &cancel).instrument(span).await
    }

    async fn execute(
        &self,
        request: &TransferRequest,
        cancel: &CancellationToken,
    ) -> Result<TransferSummary, TransferError> {
        let catalog = self.connector.connect().await.map_err(|e| {
            error!(error = %e, "Transfer could not start");
            TransferError::Connect(e)
        })?;

        let mut job = JobRecord::create(
            &*catalog,
            request.job_id.clone(),
            request.user_id.clone(),
            GATHERING_DESCRIPTION,
        )
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create job");
            TransferError::Job(e)
        })?;
        info!(user_id = ?request.user_id, "Created transfer job");

        match self
            .transfer_components(&*catalog, &mut job, request, cancel)
            .await
        {
            Ok(summary) => {
                info!(
                    total = summary.total,
                    copied = summary.copied,
                    already_present = summary.already_present,
                    skipped = summary.skipped,
                    "Transfer complete"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, description = %job.description(), "Transfer failed");
                job.rollback();
                job.set_status(JobStatus::Failed);
                if let Err(commit_err) = job.commit(&*catalog).await {
                    error!(error = %commit_err, "Failed to mark job as failed");
                }
                Err(e)
            }
        }
    }

    async fn transfer_components(
        &self,
        catalog: &dyn EntityCatalog,
        job: &mut JobRecord,
        request: &TransferRequest,
        cancel: &CancellationToken,
    ) -> Result<TransferSummary, TransferError> {
        let components =
            selection::components_in_location(catalog, &request.selection, &request.source.id)
                .await
                .map_err(TransferError::Resolve)?;

        let total = components.len();
        info!(total, "Transferring components");

        let mut summary = TransferSummary {
            total,
            ..Default::default()
        };

        for (index, component) in components.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let position = index + 1;
            info!(position, total, component = %component.id, "Transferring component");
            job.set_description(progress_description(position, total));
            job.commit(catalog).await.map_err(TransferError::Job)?;

            let result = self
                .service
                .add_component(catalog, component, &request.source, &request.target)
                .await;

            let Err(e) = result else {
                summary.copied += 1;
                continue;
            };

            match request.options.classify(&e) {
                Disposition::AlreadyPresent => {
                    info!(component = %component.id, "Component already in target location");
                    summary.already_present += 1;
                }
                Disposition::Ignored => {
                    warn!(component = %component.id, error = %e, "Failed to add component to location");
                    summary.skipped += 1;
                }
                Disposition::Abort => {
                    return Err(TransferError::Location {
                        component: component.id.clone(),
                        source: e,
                    });
                }
            }
        }

        job.set_status(JobStatus::Done);
        job.commit(catalog).await.map_err(TransferError::Job)?;
        Ok(summary)
    }
}
