//! Attempt-loop behavior tests over an in-memory store and scripted
//! attempt outcomes. Time is paused, so the fixed retry backoffs
//! auto-advance instead of really sleeping.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;

use salonpost_core::failure::FailureKind;
use salonpost_core::payload::{Credentials, JobType, PublishPayload};
use salonpost_core::types::DbId;
use salonpost_db::models::job::{Job, SubmitJob};
use salonpost_db::models::status::JobStatus;
use salonpost_events::{ProgressBus, ProgressEvent};
use salonpost_orchestrator::{
    AttemptFailure, AttemptRunner, JobStore, Orchestrator, OrchestratorConfig, OrchestratorError,
    StoreError, SubmitRequest,
};

// --- In-memory store ---

#[derive(Default)]
struct MemoryJobStore {
    jobs: tokio::sync::Mutex<HashMap<DbId, Job>>,
    next_id: AtomicI64,
}

impl MemoryJobStore {
    async fn get(&self, job_id: DbId) -> Job {
        self.jobs.lock().await.get(&job_id).cloned().expect("job exists")
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, input: &SubmitJob) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let busy = jobs.values().any(|job| {
            job.target_entity_id == input.target_entity_id
                && JobStatus::from_id(job.status_id).is_some_and(|s| !s.is_terminal())
        });
        if busy {
            return Err(StoreError::EntityBusy(input.target_entity_id.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let job = Job {
            id,
            owner_id: input.owner_id,
            target_entity_id: input.target_entity_id.clone(),
            job_type: input.job_type.clone(),
            status_id: JobStatus::Pending.id(),
            attempt_count: 0,
            max_attempts: input.max_attempts,
            parameters: input.parameters.clone(),
            result: None,
            error_kind: None,
            error_message: None,
            progress_percent: 0,
            progress_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            actual_duration_secs: None,
        };
        jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn find(&self, job_id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().await.get(&job_id).cloned())
    }

    async fn find_active_for_entity(&self, entity_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().await.values().find(|job| {
            job.target_entity_id == entity_id
                && JobStatus::from_id(job.status_id).is_some_and(|s| !s.is_terminal())
        }).cloned())
    }

    async fn mark_running(&self, job_id: DbId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        job.status_id = JobStatus::Running.id();
        job.started_at = Some(Utc::now());
        job.attempt_count += 1;
        Ok(())
    }

    async fn record_retry(
        &self,
        job_id: DbId,
        error_kind: &str,
        error_message: &str,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        job.attempt_count += 1;
        job.error_kind = Some(error_kind.to_string());
        job.error_message = Some(error_message.to_string());
        Ok(())
    }

    async fn update_progress(
        &self,
        job_id: DbId,
        percent: i16,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        job.progress_percent = percent;
        job.progress_message = message.map(ToString::to_string);
        Ok(())
    }

    async fn succeed(&self, job_id: DbId, result: &serde_json::Value) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        if JobStatus::from_id(job.status_id).is_some_and(JobStatus::is_terminal) {
            return Ok(false);
        }
        job.status_id = JobStatus::Succeeded.id();
        job.result = Some(result.clone());
        job.error_kind = None;
        job.error_message = None;
        job.progress_percent = 100;
        job.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn fail(
        &self,
        job_id: DbId,
        error_kind: &str,
        error_message: &str,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        if JobStatus::from_id(job.status_id).is_some_and(JobStatus::is_terminal) {
            return Ok(false);
        }
        job.status_id = JobStatus::Failed.id();
        job.error_kind = Some(error_kind.to_string());
        job.error_message = Some(error_message.to_string());
        job.completed_at = Some(Utc::now());
        Ok(true)
    }
}

// --- Scripted runner ---

struct ScriptedRunner {
    outcomes: tokio::sync::Mutex<VecDeque<Result<serde_json::Value, AttemptFailure>>>,
    attempts: AtomicU32,
}

impl ScriptedRunner {
    fn new(outcomes: Vec<Result<serde_json::Value, AttemptFailure>>) -> Self {
        Self {
            outcomes: tokio::sync::Mutex::new(outcomes.into()),
            attempts: AtomicU32::new(0),
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttemptRunner for ScriptedRunner {
    async fn run_attempt(
        &self,
        _job_type: JobType,
        _payload: &PublishPayload,
        _notifier: &salonpost_events::JobNotifier,
        _budget: Duration,
    ) -> Result<serde_json::Value, AttemptFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .await
            .pop_front()
            .expect("runner invoked more times than scripted")
    }
}

/// Runner whose browser work stalls past any budget. Mirrors the
/// production runner's shape: the work is bounded by the budget and
/// teardown runs after the bounded future settles, in every case.
#[derive(Default)]
struct StalledBrowserRunner {
    torn_down: AtomicBool,
}

#[async_trait]
impl AttemptRunner for StalledBrowserRunner {
    async fn run_attempt(
        &self,
        _job_type: JobType,
        _payload: &PublishPayload,
        _notifier: &salonpost_events::JobNotifier,
        budget: Duration,
    ) -> Result<serde_json::Value, AttemptFailure> {
        let stalled =
            tokio::time::timeout(budget, tokio::time::sleep(Duration::from_secs(86_400))).await;
        self.torn_down.store(true, Ordering::SeqCst);
        match stalled {
            Err(_) => Err(AttemptFailure::new(
                FailureKind::Timeout,
                "attempt exceeded its budget",
            )),
            Ok(()) => unreachable!("the budget should elapse first"),
        }
    }
}

// --- Helpers ---

fn sample_payload() -> PublishPayload {
    PublishPayload {
        title: "春の新色カラーが登場しました".into(),
        body: "本文{{image_1}}締め".into(),
        images: vec!["/tmp/1.jpg".into()],
        salon_id: Some("H000123456".into()),
        stylist_id: Some("T123456".into()),
        category_code: None,
        coupon_name: None,
        credentials: Credentials {
            login_id: "salon-user".into(),
            password: "secret".into(),
        },
    }
}

fn request(entity: &str) -> SubmitRequest {
    SubmitRequest {
        owner_id: 7,
        target_entity_id: entity.into(),
        job_type: JobType::Publish,
        payload: sample_payload(),
    }
}

fn transient(kind: FailureKind) -> AttemptFailure {
    AttemptFailure::new(kind, "scripted failure")
}

fn build<R: AttemptRunner>(
    runner: R,
    config: OrchestratorConfig,
) -> (Arc<Orchestrator<MemoryJobStore, R>>, Arc<MemoryJobStore>, Arc<ProgressBus>) {
    let store = Arc::new(MemoryJobStore::default());
    let bus = ProgressBus::start();
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::new(runner),
        Arc::clone(&bus),
        config,
    );
    (orchestrator, store, bus)
}

async fn wait_for_terminal(store: &MemoryJobStore, job_id: DbId) -> Job {
    for _ in 0..100_000 {
        let job = store.get(job_id).await;
        if JobStatus::from_id(job.status_id).is_some_and(JobStatus::is_terminal) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

// --- Tests ---

#[tokio::test(start_paused = true)]
async fn first_attempt_success() {
    let (orchestrator, store, _bus) = build(
        ScriptedRunner::new(vec![Ok(serde_json::json!({"published_url": "https://x/1"}))]),
        OrchestratorConfig::default(),
    );

    let job = orchestrator.submit(request("SB001")).await.unwrap();
    let done = wait_for_terminal(&store, job.id).await;

    assert_eq!(done.status_id, JobStatus::Succeeded.id());
    assert_eq!(done.attempt_count, 1);
    assert_eq!(done.progress_percent, 100);
    assert_eq!(
        done.result,
        Some(serde_json::json!({"published_url": "https://x/1"}))
    );
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_then_succeeds() {
    let runner = ScriptedRunner::new(vec![
        Err(transient(FailureKind::ElementMissing)),
        Ok(serde_json::json!({"published_url": "https://x/2"})),
    ]);
    let (orchestrator, store, _bus) = build(runner, OrchestratorConfig::default());

    let job = orchestrator.submit(request("SB001")).await.unwrap();
    let done = wait_for_terminal(&store, job.id).await;

    assert_eq!(done.status_id, JobStatus::Succeeded.id());
    assert_eq!(done.attempt_count, 2);
    // The transient error of the failed attempt is cleared on success.
    assert!(done.error_kind.is_none());
}

#[tokio::test(start_paused = true)]
async fn retries_exhaust_the_attempt_budget() {
    let runner = ScriptedRunner::new(vec![
        Err(transient(FailureKind::UploadTimeout)),
        Err(transient(FailureKind::UploadTimeout)),
        Err(transient(FailureKind::UploadTimeout)),
    ]);
    let (orchestrator, store, _bus) = build(runner, OrchestratorConfig::default());

    let job = orchestrator.submit(request("SB001")).await.unwrap();
    let done = wait_for_terminal(&store, job.id).await;

    assert_eq!(done.status_id, JobStatus::Failed.id());
    assert_eq!(done.attempt_count, 3);
    assert_eq!(done.error_kind.as_deref(), Some("upload_timeout"));
}

#[tokio::test(start_paused = true)]
async fn robot_detection_aborts_without_retry() {
    let runner = ScriptedRunner::new(vec![Err(transient(FailureKind::RobotDetected))]);
    let (orchestrator, store, _bus) = build(runner, OrchestratorConfig::default());

    let job = orchestrator.submit(request("SB001")).await.unwrap();
    let done = wait_for_terminal(&store, job.id).await;

    assert_eq!(done.status_id, JobStatus::Failed.id());
    assert_eq!(done.attempt_count, 1);
    assert_eq!(done.error_kind.as_deref(), Some("robot_detected"));
}

#[tokio::test(start_paused = true)]
async fn structural_failure_aborts_without_retry() {
    let runner = ScriptedRunner::new(vec![Err(transient(FailureKind::LoginFailed))]);
    let (orchestrator, store, _bus) = build(runner, OrchestratorConfig::default());

    let job = orchestrator.submit(request("SB001")).await.unwrap();
    let done = wait_for_terminal(&store, job.id).await;

    assert_eq!(done.status_id, JobStatus::Failed.id());
    assert_eq!(done.attempt_count, 1);
    assert_eq!(done.error_kind.as_deref(), Some("login_failed"));
}

#[tokio::test(start_paused = true)]
async fn busy_entity_rejects_second_submission() {
    let runner = ScriptedRunner::new(vec![
        Ok(serde_json::json!({})),
        Ok(serde_json::json!({})),
    ]);
    let (orchestrator, store, _bus) = build(runner, OrchestratorConfig::default());

    let first = orchestrator.submit(request("SB001")).await.unwrap();

    // Immediately resubmitting against the same entity is rejected.
    let err = orchestrator.submit(request("SB001")).await.unwrap_err();
    assert_matches!(err, OrchestratorError::EntityBusy(entity) if entity == "SB001");

    // A different entity is unaffected.
    orchestrator.submit(request("SB002")).await.unwrap();

    // Once the first job is terminal, the entity frees up.
    wait_for_terminal(&store, first.id).await;
    orchestrator.submit(request("SB001")).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn deadline_fails_a_wedged_job_with_timeout() {
    let config = OrchestratorConfig {
        job_deadline: Duration::from_secs(60),
        ..OrchestratorConfig::default()
    };
    let runner = Arc::new(StalledBrowserRunner::default());
    let store = Arc::new(MemoryJobStore::default());
    let bus = ProgressBus::start();
    let orchestrator = Orchestrator::new(Arc::clone(&store), Arc::clone(&runner), bus, config);

    let job = orchestrator.submit(request("SB001")).await.unwrap();
    let done = wait_for_terminal(&store, job.id).await;

    assert_eq!(done.status_id, JobStatus::Failed.id());
    assert_eq!(done.error_kind.as_deref(), Some("timeout"));
    // Only the one stalled attempt ran; no retry was started past the
    // deadline.
    assert_eq!(done.attempt_count, 1);
    // The attempt was bounded from the inside, so its teardown ran.
    assert!(runner.torn_down.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn terminal_state_is_persisted_before_the_event_fires() {
    let (orchestrator, store, bus) = build(
        ScriptedRunner::new(vec![Ok(serde_json::json!({"published_url": "https://x/9"}))]),
        OrchestratorConfig::default(),
    );

    let mut rx = bus.subscribe_entity("SB001").await;
    let job = orchestrator.submit(request("SB001")).await.unwrap();

    // Drain events until the terminal one; at that instant the store
    // must already hold the terminal state.
    loop {
        let event = rx.recv().await.expect("event stream stays open");
        if let ProgressEvent::Completed { job_id, .. } = event {
            assert_eq!(job_id, job.id);
            let snapshot = store.get(job.id).await;
            assert_eq!(snapshot.status_id, JobStatus::Succeeded.id());
            assert!(snapshot.result.is_some());
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn retry_outcome_matches_attempt_count_in_failed_event() {
    let runner = ScriptedRunner::new(vec![
        Err(transient(FailureKind::Timeout)),
        Err(transient(FailureKind::LoginFailed)),
    ]);
    let (orchestrator, store, bus) = build(runner, OrchestratorConfig::default());

    let mut rx = bus.subscribe_entity("SB001").await;
    let job = orchestrator.submit(request("SB001")).await.unwrap();
    wait_for_terminal(&store, job.id).await;

    loop {
        let event = rx.recv().await.expect("event stream stays open");
        if let ProgressEvent::Failed {
            error_kind,
            attempt_count,
            ..
        } = event
        {
            assert_eq!(error_kind, FailureKind::LoginFailed);
            assert_eq!(attempt_count, 2);
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn runner_is_not_reinvoked_after_structural_failure() {
    let runner = Arc::new(ScriptedRunner::new(vec![Err(transient(
        FailureKind::ConfigurationError,
    ))]));
    let store = Arc::new(MemoryJobStore::default());
    let bus = ProgressBus::start();
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&runner),
        bus,
        OrchestratorConfig::default(),
    );

    let job = orchestrator.submit(request("SB001")).await.unwrap();
    wait_for_terminal(&store, job.id).await;

    assert_eq!(runner.attempts(), 1);
}
