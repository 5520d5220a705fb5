//! Typed lifecycle events delivered to live subscribers.

use chrono::{DateTime, Utc};
use salonpost_core::failure::FailureKind;
use salonpost_core::types::DbId;
use serde::{Deserialize, Serialize};

/// A job lifecycle event.
///
/// Serialized with a `type` tag matching the wire schema consumed by
/// WebSocket clients: `started | progress | completed | failed |
/// status_changed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// An attempt has started executing.
    Started {
        job_id: DbId,
        owner_id: DbId,
        entity_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Fine-grained progress within one attempt.
    ///
    /// `percent` is monotonically non-decreasing for the lifetime of a
    /// single attempt; a retried attempt may reset it.
    Progress {
        job_id: DbId,
        owner_id: DbId,
        entity_id: String,
        percent: u8,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Terminal success. Dispatched strictly after the terminal state
    /// was persisted.
    Completed {
        job_id: DbId,
        owner_id: DbId,
        entity_id: String,
        result: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    /// Terminal failure. Dispatched strictly after the terminal state
    /// was persisted.
    Failed {
        job_id: DbId,
        owner_id: DbId,
        entity_id: String,
        error_kind: FailureKind,
        message: String,
        attempt_count: i32,
        timestamp: DateTime<Utc>,
    },
    /// A persisted status transition (e.g. pending -> running).
    StatusChanged {
        job_id: DbId,
        owner_id: DbId,
        entity_id: String,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// The owner this event should be routed to.
    pub fn owner_id(&self) -> DbId {
        match self {
            ProgressEvent::Started { owner_id, .. }
            | ProgressEvent::Progress { owner_id, .. }
            | ProgressEvent::Completed { owner_id, .. }
            | ProgressEvent::Failed { owner_id, .. }
            | ProgressEvent::StatusChanged { owner_id, .. } => *owner_id,
        }
    }

    /// The target entity this event should be routed to.
    pub fn entity_id(&self) -> &str {
        match self {
            ProgressEvent::Started { entity_id, .. }
            | ProgressEvent::Progress { entity_id, .. }
            | ProgressEvent::Completed { entity_id, .. }
            | ProgressEvent::Failed { entity_id, .. }
            | ProgressEvent::StatusChanged { entity_id, .. } => entity_id,
        }
    }

    /// The job this event belongs to.
    pub fn job_id(&self) -> DbId {
        match self {
            ProgressEvent::Started { job_id, .. }
            | ProgressEvent::Progress { job_id, .. }
            | ProgressEvent::Completed { job_id, .. }
            | ProgressEvent::Failed { job_id, .. }
            | ProgressEvent::StatusChanged { job_id, .. } => *job_id,
        }
    }

    /// Whether this is a terminal (`completed`/`failed`) event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tag_matches_schema() {
        let event = ProgressEvent::Progress {
            job_id: 7,
            owner_id: 1,
            entity_id: "E42".into(),
            percent: 40,
            message: "Uploading image 1".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["job_id"], 7);
        assert_eq!(json["percent"], 40);
    }

    #[test]
    fn failed_event_carries_kind_code() {
        let event = ProgressEvent::Failed {
            job_id: 7,
            owner_id: 1,
            entity_id: "E42".into(),
            error_kind: FailureKind::RobotDetected,
            message: "CAPTCHA challenge on login".into(),
            attempt_count: 1,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["error_kind"], "robot_detected");
        assert!(event.is_terminal());
    }
}
