//! Publishing job entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use salonpost_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub owner_id: DbId,
    /// Opaque external identifier of the entity being published to.
    pub target_entity_id: String,
    pub job_type: String,
    pub status_id: StatusId,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub progress_percent: i16,
    pub progress_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub actual_duration_secs: Option<i32>,
}

/// DTO for inserting a new job.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJob {
    pub owner_id: DbId,
    pub target_entity_id: String,
    pub job_type: String,
    pub parameters: serde_json::Value,
    pub max_attempts: i32,
}
