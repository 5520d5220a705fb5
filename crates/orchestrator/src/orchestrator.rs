//! The attempt loop and its ordering contracts.
//!
//! Invariants enforced here:
//! - at most one non-terminal job per target entity (checked on submit,
//!   backed by the store's unique constraint against races);
//! - a bounded number of attempts, retrying only transient failures;
//! - terminal state is persisted BEFORE the terminal event is emitted;
//! - a wall-clock deadline bounds the whole attempt sequence.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;

use salonpost_core::failure::FailureKind;
use salonpost_core::payload::{JobType, PublishPayload};
use salonpost_core::types::DbId;
use salonpost_db::models::job::{Job, SubmitJob};
use salonpost_db::models::status::JobStatus;
use salonpost_events::{JobNotifier, ProgressBus};

use crate::config::OrchestratorConfig;
use crate::runner::AttemptRunner;
use crate::store::{JobStore, StoreError};

/// A job submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub owner_id: DbId,
    pub target_entity_id: String,
    pub job_type: JobType,
    pub payload: PublishPayload,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The entity already has a live job; the submission is rejected,
    /// not queued.
    #[error("entity '{0}' already has an active job")]
    EntityBusy(String),

    #[error("job {0} not found")]
    NotFound(DbId),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EntityBusy(entity) => Self::EntityBusy(entity),
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Owns job lifecycles from submission to terminal state.
pub struct Orchestrator<S: JobStore, R: AttemptRunner> {
    store: Arc<S>,
    runner: Arc<R>,
    bus: Arc<ProgressBus>,
    config: OrchestratorConfig,
    attempt_permits: Arc<Semaphore>,
}

impl<S: JobStore, R: AttemptRunner> Orchestrator<S, R> {
    pub fn new(
        store: Arc<S>,
        runner: Arc<R>,
        bus: Arc<ProgressBus>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let attempt_permits = Arc::new(Semaphore::new(config.concurrency));
        Arc::new(Self {
            store,
            runner,
            bus,
            config,
            attempt_permits,
        })
    }

    /// Accept a job, persist it as pending, and spawn its attempt
    /// sequence. Rejects when the target entity already has a
    /// non-terminal job.
    pub async fn submit(self: &Arc<Self>, request: SubmitRequest) -> Result<Job, OrchestratorError> {
        if let Some(active) = self
            .store
            .find_active_for_entity(&request.target_entity_id)
            .await?
        {
            tracing::info!(
                entity_id = %request.target_entity_id,
                active_job_id = active.id,
                "Submission rejected, entity busy"
            );
            return Err(OrchestratorError::EntityBusy(request.target_entity_id));
        }

        let input = SubmitJob {
            owner_id: request.owner_id,
            target_entity_id: request.target_entity_id.clone(),
            job_type: request.job_type.code().to_string(),
            parameters: serde_json::to_value(&request.payload)
                .map_err(|err| OrchestratorError::Store(StoreError::Backend(err.to_string())))?,
            max_attempts: self.config.max_attempts,
        };
        // The store's unique constraint closes the check-then-insert race.
        let job = self.store.create(&input).await?;

        tracing::info!(
            job_id = job.id,
            entity_id = %job.target_entity_id,
            job_type = %request.job_type,
            "Job accepted"
        );

        let this = Arc::clone(self);
        let spawned = job.clone();
        tokio::spawn(async move {
            this.run_job(spawned, request.job_type, request.payload).await;
        });

        Ok(job)
    }

    /// Current job snapshot. Monotonic by construction: the attempt
    /// task is the only writer and transitions are forward-only.
    pub async fn get_status(&self, job_id: DbId) -> Result<Job, OrchestratorError> {
        self.store
            .find(job_id)
            .await?
            .ok_or(OrchestratorError::NotFound(job_id))
    }

    /// Drive a job's whole attempt sequence under the job deadline.
    ///
    /// The deadline is enforced between attempts and passed into each
    /// attempt as its time budget; attempts are never cancelled from
    /// the outside, so the runner's session teardown always runs.
    async fn run_job(self: Arc<Self>, job: Job, job_type: JobType, payload: PublishPayload) {
        let notifier = JobNotifier::new(
            Arc::clone(&self.bus),
            job.id,
            job.owner_id,
            job.target_entity_id.clone(),
        );

        let deadline = Instant::now() + self.config.job_deadline;
        for attempt in 1..=self.config.max_attempts {
            let budget = deadline.saturating_duration_since(Instant::now());

            // Bound concurrent attempts globally; the permit is held
            // for the attempt only, never through a backoff sleep.
            let permit = match self.attempt_permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => return, // semaphore closed on shutdown
            };

            if attempt == 1 {
                if let Err(err) = self.store.mark_running(job.id).await {
                    tracing::error!(job_id = job.id, error = %err, "Failed to mark job running");
                    return;
                }
                notifier.status_changed(JobStatus::Pending.code(), JobStatus::Running.code());
            }

            notifier.begin_attempt();
            let message = format!("Attempt {attempt}/{}", self.config.max_attempts);
            if let Err(err) = self.store.update_progress(job.id, 0, Some(&message)).await {
                tracing::warn!(job_id = job.id, error = %err, "Progress persist failed");
            }
            notifier.started(message);

            let outcome = self.runner.run_attempt(job_type, &payload, &notifier, budget).await;
            drop(permit);

            match outcome {
                Ok(result) => {
                    self.finish_succeeded(&job, &notifier, &result).await;
                    return;
                }
                Err(failure) => {
                    let retryable = failure.kind.is_retryable() && attempt < self.config.max_attempts;
                    tracing::warn!(
                        job_id = job.id,
                        attempt,
                        kind = %failure.kind,
                        retryable,
                        "Attempt failed: {}",
                        failure.message
                    );

                    if !retryable {
                        self.finish_failed(&job, &notifier, failure.kind, &failure.message, attempt)
                            .await;
                        return;
                    }

                    // A retry only makes sense if its backoff still fits
                    // inside the job deadline.
                    let delay = self.config.retry_delay(job_type);
                    if Instant::now() + delay >= deadline {
                        let message = format!(
                            "job exceeded its {}s deadline after {attempt} attempt(s)",
                            self.config.job_deadline.as_secs()
                        );
                        tracing::error!(job_id = job.id, "Job deadline exceeded");
                        self.finish_failed(&job, &notifier, FailureKind::Timeout, &message, attempt)
                            .await;
                        return;
                    }

                    if let Err(err) = self
                        .store
                        .record_retry(job.id, failure.kind.code(), &failure.message)
                        .await
                    {
                        tracing::error!(job_id = job.id, error = %err, "Retry persist failed");
                        return;
                    }

                    notifier.progress(
                        0,
                        format!("Retrying in {}s ({})", delay.as_secs(), failure.kind),
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Persist success, THEN emit the terminal event.
    async fn finish_succeeded(&self, job: &Job, notifier: &JobNotifier, result: &serde_json::Value) {
        match self.store.succeed(job.id, result).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id = job.id, "Job already terminal, success not recorded");
                return;
            }
            Err(err) => {
                tracing::error!(job_id = job.id, error = %err, "Success persist failed");
                return;
            }
        }
        notifier.status_changed(JobStatus::Running.code(), JobStatus::Succeeded.code());
        notifier.completed(result.clone());
        tracing::info!(job_id = job.id, "Job succeeded");
    }

    /// Persist failure, THEN emit the terminal event.
    async fn finish_failed(
        &self,
        job: &Job,
        notifier: &JobNotifier,
        kind: FailureKind,
        message: &str,
        attempt_count: i32,
    ) {
        match self.store.fail(job.id, kind.code(), message).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id = job.id, "Job already terminal, failure not recorded");
                return;
            }
            Err(err) => {
                tracing::error!(job_id = job.id, error = %err, "Failure persist failed");
                return;
            }
        }
        notifier.status_changed(JobStatus::Running.code(), JobStatus::Failed.code());
        notifier.failed(kind, message, attempt_count);
        tracing::info!(job_id = job.id, kind = %kind, "Job failed");
    }
}
