//! Repository for the `jobs` table.
//!
//! Uses `JobStatus` from `models::status` for all status transitions.
//! No magic numbers in queries; every status literal is a named constant.
//!
//! Per-entity serialization is enforced at the schema level: a partial
//! unique index allows at most one non-terminal job per
//! `target_entity_id`, so a racing insert loses with a unique
//! violation instead of creating a second live job.

use sqlx::PgPool;

use salonpost_core::types::DbId;

use crate::models::job::{Job, SubmitJob};
use crate::models::status::{JobStatus, ACTIVE_STATUSES};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner_id, target_entity_id, job_type, status_id, \
    attempt_count, max_attempts, parameters, result, \
    error_kind, error_message, \
    progress_percent, progress_message, \
    created_at, started_at, completed_at, actual_duration_secs";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Name of the partial unique index guarding per-entity serialization.
const ACTIVE_ENTITY_INDEX: &str = "jobs_one_active_per_entity";

/// Provides CRUD operations for publishing jobs.
pub struct JobRepo;

impl JobRepo {
    /// Create a new pending job. Returns the inserted row.
    ///
    /// Fails with a unique violation on [`ACTIVE_ENTITY_INDEX`] when the
    /// target entity already has a non-terminal job; callers translate
    /// that into a busy-entity rejection via [`Self::is_entity_busy`].
    pub async fn submit(pool: &PgPool, input: &SubmitJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (owner_id, target_entity_id, job_type, status_id, max_attempts, parameters) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.owner_id)
            .bind(&input.target_entity_id)
            .bind(&input.job_type)
            .bind(JobStatus::Pending.id())
            .bind(input.max_attempts)
            .bind(&input.parameters)
            .fetch_one(pool)
            .await
    }

    /// Whether an error is the busy-entity unique violation from `submit`.
    pub fn is_entity_busy(error: &sqlx::Error) -> bool {
        matches!(
            error,
            sqlx::Error::Database(db) if db.constraint() == Some(ACTIVE_ENTITY_INDEX)
        )
    }

    pub async fn find_by_id(pool: &PgPool, job_id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Transition to running for the first attempt: sets `started_at`
    /// and bumps `attempt_count` to 1.
    pub async fn mark_running(pool: &PgPool, job_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, started_at = NOW(), attempt_count = attempt_count + 1 \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Bookkeeping for a retried attempt: stays running, bumps
    /// `attempt_count`, records the transient error of the attempt that
    /// just failed.
    pub async fn record_retry(
        pool: &PgPool,
        job_id: DbId,
        error_kind: &str,
        error_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET attempt_count = attempt_count + 1, error_kind = $2, error_message = $3 \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(error_kind)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Update progress percentage and optional message.
    pub async fn update_progress(
        pool: &PgPool,
        job_id: DbId,
        percent: i16,
        message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET progress_percent = $2, progress_message = $3 WHERE id = $1",
        )
        .bind(job_id)
        .bind(percent)
        .bind(message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Terminal success: stores the result payload, sets
    /// `progress_percent` to 100 and computes `actual_duration_secs`
    /// from `started_at` to now.
    ///
    /// Guarded so a terminal row is never rewritten; returns whether
    /// the transition happened.
    pub async fn succeed(
        pool: &PgPool,
        job_id: DbId,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let done = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, result = $3, error_kind = NULL, error_message = NULL, \
                 completed_at = NOW(), progress_percent = 100, \
                 actual_duration_secs = EXTRACT(EPOCH FROM NOW() - started_at)::INTEGER \
             WHERE id = $1 AND status_id = ANY($4)",
        )
        .bind(job_id)
        .bind(JobStatus::Succeeded.id())
        .bind(result)
        .bind(ACTIVE_STATUSES.to_vec())
        .execute(pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Terminal failure with the failure classification of the last
    /// attempt.
    ///
    /// Guarded so a terminal row is never rewritten; returns whether
    /// the transition happened.
    pub async fn fail(
        pool: &PgPool,
        job_id: DbId,
        error_kind: &str,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let done = sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_kind = $3, error_message = $4, \
                 completed_at = NOW(), \
                 actual_duration_secs = EXTRACT(EPOCH FROM \
                     COALESCE(NOW() - started_at, INTERVAL '0'))::INTEGER \
             WHERE id = $1 AND status_id = ANY($5)",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.id())
        .bind(error_kind)
        .bind(error_message)
        .bind(ACTIVE_STATUSES.to_vec())
        .execute(pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    /// List an owner's jobs, newest first.
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = offset.unwrap_or(0);
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE owner_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(owner_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Find the non-terminal job for a target entity, if any.
    pub async fn find_active_for_entity(
        pool: &PgPool,
        target_entity_id: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE target_entity_id = $1 AND status_id = ANY($2)"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(target_entity_id)
            .bind(ACTIVE_STATUSES.to_vec())
            .fetch_optional(pool)
            .await
    }
}
