//! Persistence boundary for the orchestrator.
//!
//! The trait exists so the retry and ordering logic can be tested with
//! an in-memory store; production delegates straight to [`JobRepo`].

use async_trait::async_trait;
use sqlx::PgPool;

use salonpost_core::types::DbId;
use salonpost_db::models::job::{Job, SubmitJob};
use salonpost_db::repositories::job_repo::JobRepo;

/// Store-level failures as the orchestrator sees them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The target entity already has a non-terminal job.
    #[error("entity '{0}' already has an active job")]
    EntityBusy(String),

    #[error("job {0} not found")]
    NotFound(DbId),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Job persistence operations the orchestrator depends on.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    async fn create(&self, input: &SubmitJob) -> Result<Job, StoreError>;
    async fn find(&self, job_id: DbId) -> Result<Option<Job>, StoreError>;
    async fn find_active_for_entity(&self, entity_id: &str) -> Result<Option<Job>, StoreError>;
    async fn mark_running(&self, job_id: DbId) -> Result<(), StoreError>;
    async fn record_retry(
        &self,
        job_id: DbId,
        error_kind: &str,
        error_message: &str,
    ) -> Result<(), StoreError>;
    async fn update_progress(
        &self,
        job_id: DbId,
        percent: i16,
        message: Option<&str>,
    ) -> Result<(), StoreError>;
    /// Record terminal success. Returns `false` when the row was
    /// already terminal and was left untouched.
    async fn succeed(&self, job_id: DbId, result: &serde_json::Value) -> Result<bool, StoreError>;
    /// Record terminal failure. Returns `false` when the row was
    /// already terminal and was left untouched.
    async fn fail(
        &self,
        job_id: DbId,
        error_kind: &str,
        error_message: &str,
    ) -> Result<bool, StoreError>;
}

/// Production store over Postgres.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, input: &SubmitJob) -> Result<Job, StoreError> {
        JobRepo::submit(&self.pool, input).await.map_err(|err| {
            if JobRepo::is_entity_busy(&err) {
                StoreError::EntityBusy(input.target_entity_id.clone())
            } else {
                err.into()
            }
        })
    }

    async fn find(&self, job_id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::find_by_id(&self.pool, job_id).await?)
    }

    async fn find_active_for_entity(&self, entity_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::find_active_for_entity(&self.pool, entity_id).await?)
    }

    async fn mark_running(&self, job_id: DbId) -> Result<(), StoreError> {
        Ok(JobRepo::mark_running(&self.pool, job_id).await?)
    }

    async fn record_retry(
        &self,
        job_id: DbId,
        error_kind: &str,
        error_message: &str,
    ) -> Result<(), StoreError> {
        Ok(JobRepo::record_retry(&self.pool, job_id, error_kind, error_message).await?)
    }

    async fn update_progress(
        &self,
        job_id: DbId,
        percent: i16,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(JobRepo::update_progress(&self.pool, job_id, percent, message).await?)
    }

    async fn succeed(&self, job_id: DbId, result: &serde_json::Value) -> Result<bool, StoreError> {
        Ok(JobRepo::succeed(&self.pool, job_id, result).await?)
    }

    async fn fail(
        &self,
        job_id: DbId,
        error_kind: &str,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        Ok(JobRepo::fail(&self.pool, job_id, error_kind, error_message).await?)
    }
}
