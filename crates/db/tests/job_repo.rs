use sqlx::PgPool;

use salonpost_db::models::job::SubmitJob;
use salonpost_db::models::status::JobStatus;
use salonpost_db::repositories::job_repo::JobRepo;

fn submit_input(entity: &str) -> SubmitJob {
    SubmitJob {
        owner_id: 1,
        target_entity_id: entity.to_string(),
        job_type: "publish".to_string(),
        parameters: serde_json::json!({"title": "New spring colors"}),
        max_attempts: 3,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn bootstrap(pool: PgPool) {
    salonpost_db::health_check(&pool).await.unwrap();

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_statuses")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 4);
}

#[sqlx::test(migrations = "../../migrations")]
async fn submit_and_find_round_trip(pool: PgPool) {
    let job = JobRepo::submit(&pool, &submit_input("SB001")).await.unwrap();
    assert_eq!(job.status_id, JobStatus::Pending.id());
    assert_eq!(job.attempt_count, 0);

    let found = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(found.target_entity_id, "SB001");
    assert_eq!(found.job_type, "publish");
}

#[sqlx::test(migrations = "../../migrations")]
async fn second_active_job_for_entity_is_rejected(pool: PgPool) {
    JobRepo::submit(&pool, &submit_input("SB001")).await.unwrap();

    let err = JobRepo::submit(&pool, &submit_input("SB001"))
        .await
        .expect_err("second live job for the same entity must violate the index");
    assert!(JobRepo::is_entity_busy(&err));

    // A different entity is unaffected.
    JobRepo::submit(&pool, &submit_input("SB002")).await.unwrap();
}

#[sqlx::test(migrations = "../../migrations")]
async fn terminal_job_frees_the_entity(pool: PgPool) {
    let job = JobRepo::submit(&pool, &submit_input("SB001")).await.unwrap();
    JobRepo::mark_running(&pool, job.id).await.unwrap();
    JobRepo::fail(&pool, job.id, "robot_detected", "challenge page shown")
        .await
        .unwrap();

    assert!(JobRepo::find_active_for_entity(&pool, "SB001")
        .await
        .unwrap()
        .is_none());

    // The entity accepts a fresh job once the previous one is terminal.
    JobRepo::submit(&pool, &submit_input("SB001")).await.unwrap();
}

#[sqlx::test(migrations = "../../migrations")]
async fn attempt_lifecycle_bookkeeping(pool: PgPool) {
    let job = JobRepo::submit(&pool, &submit_input("SB001")).await.unwrap();

    JobRepo::mark_running(&pool, job.id).await.unwrap();
    let running = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(running.status_id, JobStatus::Running.id());
    assert_eq!(running.attempt_count, 1);
    assert!(running.started_at.is_some());

    JobRepo::record_retry(&pool, job.id, "element_missing", "submit button not found")
        .await
        .unwrap();
    JobRepo::update_progress(&pool, job.id, 40, Some("Filling the form"))
        .await
        .unwrap();

    let retried = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(retried.status_id, JobStatus::Running.id());
    assert_eq!(retried.attempt_count, 2);
    assert_eq!(retried.error_kind.as_deref(), Some("element_missing"));
    assert_eq!(retried.progress_percent, 40);

    let transitioned = JobRepo::succeed(
        &pool,
        job.id,
        &serde_json::json!({"published_url": "https://example.test/b/1"}),
    )
    .await
    .unwrap();
    assert!(transitioned);
    let done = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(done.status_id, JobStatus::Succeeded.id());
    assert_eq!(done.progress_percent, 100);
    assert!(done.error_kind.is_none());
    assert!(done.completed_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn terminal_status_is_never_overwritten(pool: PgPool) {
    let job = JobRepo::submit(&pool, &submit_input("SB001")).await.unwrap();
    JobRepo::mark_running(&pool, job.id).await.unwrap();

    let result = serde_json::json!({"published_url": "https://example.test/b/2"});
    assert!(JobRepo::succeed(&pool, job.id, &result).await.unwrap());

    // A late failure report must not demote the succeeded row.
    let demoted = JobRepo::fail(&pool, job.id, "timeout", "deadline exceeded")
        .await
        .unwrap();
    assert!(!demoted);

    let snapshot = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(snapshot.status_id, JobStatus::Succeeded.id());
    assert!(snapshot.error_kind.is_none());
    assert_eq!(snapshot.result, Some(result.clone()));

    // Nor can a second success report rewrite a failed row.
    let other = JobRepo::submit(&pool, &submit_input("SB002")).await.unwrap();
    JobRepo::mark_running(&pool, other.id).await.unwrap();
    assert!(JobRepo::fail(&pool, other.id, "login_failed", "bad credentials")
        .await
        .unwrap());
    assert!(!JobRepo::succeed(&pool, other.id, &result).await.unwrap());

    let snapshot = JobRepo::find_by_id(&pool, other.id).await.unwrap().unwrap();
    assert_eq!(snapshot.status_id, JobStatus::Failed.id());
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_by_owner_is_newest_first(pool: PgPool) {
    for entity in ["SB001", "SB002", "SB003"] {
        JobRepo::submit(&pool, &submit_input(entity)).await.unwrap();
    }

    let jobs = JobRepo::list_by_owner(&pool, 1, None, None).await.unwrap();
    assert_eq!(jobs.len(), 3);
    assert!(jobs.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let other = JobRepo::list_by_owner(&pool, 2, None, None).await.unwrap();
    assert!(other.is_empty());
}
