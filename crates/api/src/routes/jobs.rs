//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use salonpost_core::compose::validate_placeholders;
use salonpost_core::payload::{Credentials, JobType, PublishPayload};
use salonpost_core::types::{DbId, Timestamp};
use salonpost_db::models::job::Job;
use salonpost_db::models::status::JobStatus;
use salonpost_db::repositories::job_repo::JobRepo;
use salonpost_orchestrator::SubmitRequest;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /        -> list_jobs
/// POST   /        -> submit_job
/// GET    /{id}    -> get_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(submit_job))
        .route("/{id}", get(get_job))
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for `POST /api/v1/jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobInput {
    pub owner_id: DbId,
    #[validate(length(min = 1, message = "target_entity_id must not be empty"))]
    pub target_entity_id: String,
    /// `generate` or `publish`.
    pub job_type: String,
    #[validate(nested)]
    pub payload: PayloadInput,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PayloadInput {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub title: String,
    #[validate(length(min = 1, message = "body must not be empty"))]
    pub body: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub salon_id: Option<String>,
    pub stylist_id: Option<String>,
    pub category_code: Option<String>,
    pub coupon_name: Option<String>,
    pub login_id: String,
    pub password: String,
}

impl PayloadInput {
    fn into_payload(self) -> PublishPayload {
        PublishPayload {
            title: self.title,
            body: self.body,
            images: self.images.into_iter().map(Into::into).collect(),
            salon_id: self.salon_id,
            stylist_id: self.stylist_id,
            category_code: self.category_code,
            coupon_name: self.coupon_name,
            credentials: Credentials {
                login_id: self.login_id,
                password: self.password,
            },
        }
    }
}

/// Response payload for an accepted submission.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: DbId,
    pub status: &'static str,
}

/// Snapshot of a job as returned by the read endpoints.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: DbId,
    pub owner_id: DbId,
    pub target_entity_id: String,
    pub job_type: String,
    pub status: &'static str,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub progress_percent: i16,
    pub progress_message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        let status = JobStatus::from_id(job.status_id)
            .map(JobStatus::code)
            .unwrap_or("unknown");
        Self {
            id: job.id,
            owner_id: job.owner_id,
            target_entity_id: job.target_entity_id,
            job_type: job.job_type,
            status,
            attempt_count: job.attempt_count,
            max_attempts: job.max_attempts,
            progress_percent: job.progress_percent,
            progress_message: job.progress_message,
            result: job.result,
            error_kind: job.error_kind,
            error_message: job.error_message,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub owner_id: DbId,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Accept a publishing job. Returns 202 with the job id; 409 when the
/// target entity already has a live job; 400 on malformed input,
/// including placeholder/image mismatches.
async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobInput>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let job_type = JobType::parse(&input.job_type)
        .ok_or_else(|| AppError::BadRequest(format!("unknown job_type '{}'", input.job_type)))?;

    // Reject placeholder/image mismatches before accepting the job;
    // the engine re-validates before each attempt.
    validate_placeholders(&input.payload.body, input.payload.images.len())
        .map_err(|err| AppError::BadRequest(err.message))?;

    let job = state
        .orchestrator
        .submit(SubmitRequest {
            owner_id: input.owner_id,
            target_entity_id: input.target_entity_id,
            job_type,
            payload: input.payload.into_payload(),
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobAccepted {
                job_id: job.id,
                status: JobStatus::Pending.code(),
            },
        }),
    ))
}

/// GET /api/v1/jobs/{id}
///
/// Point-in-time job snapshot. Terminal jobs carry either a result or
/// an error classification.
async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<JobView>>> {
    let job = state.orchestrator.get_status(job_id).await?;
    Ok(Json(DataResponse {
        data: job.into(),
    }))
}

/// GET /api/v1/jobs?owner_id=..
///
/// An owner's jobs, newest first.
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> AppResult<Json<DataResponse<Vec<JobView>>>> {
    let jobs = JobRepo::list_by_owner(&state.pool, query.owner_id, query.limit, query.offset)
        .await?
        .into_iter()
        .map(JobView::from)
        .collect();
    Ok(Json(DataResponse { data: jobs }))
}
