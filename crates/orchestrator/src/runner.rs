//! One attempt = one browser session.
//!
//! The trait seam lets orchestrator tests script attempt outcomes
//! without a browser. The production runner guarantees the session is
//! torn down before the outcome is reported, success or failure.

use std::time::Duration;

use async_trait::async_trait;

use salonpost_board::{BoardConfig, BoardSession, PublishEngine};
use salonpost_core::failure::FailureKind;
use salonpost_core::payload::{JobType, PublishPayload};
use salonpost_events::JobNotifier;

/// A classified attempt failure.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl AttemptFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Executes one publishing attempt end to end.
///
/// `budget` is the time left on the job deadline. Implementations must
/// bound their own work with it and still tear down any resources they
/// hold; callers never cancel a running attempt from the outside.
#[async_trait]
pub trait AttemptRunner: Send + Sync + 'static {
    async fn run_attempt(
        &self,
        job_type: JobType,
        payload: &PublishPayload,
        notifier: &JobNotifier,
        budget: Duration,
    ) -> Result<serde_json::Value, AttemptFailure>;
}

/// Production runner driving a real browser session.
pub struct BoardAttemptRunner {
    config: BoardConfig,
}

impl BoardAttemptRunner {
    pub fn new(config: BoardConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AttemptRunner for BoardAttemptRunner {
    async fn run_attempt(
        &self,
        job_type: JobType,
        payload: &PublishPayload,
        notifier: &JobNotifier,
        budget: Duration,
    ) -> Result<serde_json::Value, AttemptFailure> {
        let session = BoardSession::start(self.config.clone())
            .await
            .map_err(|err| {
                AttemptFailure::new(
                    FailureKind::Timeout,
                    format!("browser session failed to start: {err}"),
                )
            })?;

        // The budget bounds the engine only; the session outlives the
        // bounded future, so teardown happens before the outcome is
        // reported, always.
        let mut engine = PublishEngine::new(&session, notifier);
        let outcome = tokio::time::timeout(budget, engine.run(job_type, payload)).await;
        session.close().await;

        match outcome {
            Ok(Ok(result)) => {
                serde_json::to_value(&result).map_err(|err| {
                    AttemptFailure::new(
                        FailureKind::ConfigurationError,
                        format!("outcome serialization failed: {err}"),
                    )
                })
            }
            Ok(Err(err)) => {
                tracing::warn!(kind = %err.kind, screenshot = ?err.screenshot, "Attempt failed");
                Err(AttemptFailure::new(err.kind, err.message))
            }
            Err(_) => {
                tracing::warn!(budget_secs = budget.as_secs(), "Attempt ran out of job budget");
                Err(AttemptFailure::new(
                    FailureKind::Timeout,
                    format!("attempt exceeded its {}s budget", budget.as_secs()),
                ))
            }
        }
    }
}
