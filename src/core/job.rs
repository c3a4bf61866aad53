//! Transactional handle on a single job record.

use tracing::warn;

use crate::core::catalog::{EntityCatalog, QueryError};
use crate::core::models::{Job, JobStatus};

/// Keeps the last committed state of a job next to the pending one, so a
/// failed step can be rolled back before the terminal status is written.
#[derive(Debug)]
pub struct JobRecord {
    committed: Job,
    pending: Job,
}

impl JobRecord {
    /// Create and commit a running job.
    pub async fn create(
        catalog: &dyn EntityCatalog,
        id: String,
        user_id: Option<String>,
        description: impl Into<String>,
    ) -> Result<Self, QueryError> {
        let job = Job {
            id,
            user_id,
            status: JobStatus::Running,
            description: description.into(),
            created_at: None,
            updated_at: None,
        };
        catalog.create_job(&job).await?;
        Ok(Self {
            committed: job.clone(),
            pending: job,
        })
    }

    pub fn id(&self) -> &str {
        &self.pending.id
    }

    pub fn status(&self) -> JobStatus {
        self.pending.status
    }

    pub fn description(&self) -> &str {
        &self.pending.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.pending.description = description.into();
    }

    /// Move to `status`. Returns false, leaving the job untouched, if the
    /// committed status is already terminal.
    pub fn set_status(&mut self, status: JobStatus) -> bool {
        if !self.committed.status.can_transition_to(status) {
            warn!(
                job_id = %self.pending.id,
                from = %self.committed.status,
                to = %status,
                "Refusing job status transition"
            );
            return false;
        }
        self.pending.status = status;
        true
    }

    pub async fn commit(&mut self, catalog: &dyn EntityCatalog) -> Result<(), QueryError> {
        catalog.update_job(&self.pending).await?;
        self.committed = self.pending.clone();
        Ok(())
    }

    /// Drop uncommitted changes.
    pub fn rollback(&mut self) {
        self.pending = self.committed.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::MemoryCatalog;

    #[tokio::test]
    async fn rollback_restores_committed_state() {
        let catalog = MemoryCatalog::new();
        let mut job = JobRecord::create(&catalog, "j1".into(), None, "first")
            .await
            .unwrap();

        job.set_description("second");
        job.commit(&catalog).await.unwrap();
        job.set_description("third");
        job.rollback();

        assert_eq!(job.description(), "second");
        assert_eq!(catalog.job_descriptions("j1"), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn terminal_status_is_final() {
        let catalog = MemoryCatalog::new();
        let mut job = JobRecord::create(&catalog, "j1".into(), Some("u1".into()), "x")
            .await
            .unwrap();

        assert!(job.set_status(JobStatus::Done));
        job.commit(&catalog).await.unwrap();
        assert!(!job.set_status(JobStatus::Failed));
        assert_eq!(job.status(), JobStatus::Done);

        let stored = catalog.get_job("j1").await.unwrap();
        assert_eq!(stored.job.status, JobStatus::Done);
        assert_eq!(stored.job.user_id.as_deref(), Some("u1"));
    }
}
