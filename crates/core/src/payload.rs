//! Job kinds and the immutable per-attempt publication payload.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Compose-only dry run against the authoring form (no publish).
    Generate,
    /// Full publish to the target site.
    Publish,
}

impl JobType {
    /// Stable string code used in the database and on the wire.
    pub fn code(self) -> &'static str {
        match self {
            JobType::Generate => "generate",
            JobType::Publish => "publish",
        }
    }

    /// Parse a stable string code.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "generate" => Some(JobType::Generate),
            "publish" => Some(JobType::Publish),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Decrypted credentials handed to the engine once per session start.
///
/// Encryption-at-rest and credential storage live upstream; this type
/// only ever exists in memory for the lifetime of one attempt. The
/// password never serializes, so persisting or echoing a payload
/// cannot leak it.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub login_id: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the password.
        f.debug_struct("Credentials")
            .field("login_id", &self.login_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything one automation attempt needs to publish a post.
///
/// Immutable once handed to the engine: a retried attempt receives the
/// exact same payload with a fresh browser session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishPayload {
    /// Post title; truncated to the target's limit before filling.
    pub title: String,
    /// Body text containing zero or more `{{image_k}}` tokens.
    pub body: String,
    /// Image files in index order: `images[0]` backs `{{image_1}}`.
    pub images: Vec<PathBuf>,
    /// Salon id for the multi-entity selection screen (e.g. `H000123456`).
    pub salon_id: Option<String>,
    /// Stylist value for the stylist `<select>` (e.g. `T123456`).
    pub stylist_id: Option<String>,
    /// Blog category code (e.g. `BL02`).
    pub category_code: Option<String>,
    /// Coupon label fragment for partial matching in the coupon modal.
    pub coupon_name: Option<String>,
    /// Decrypted login credentials.
    pub credentials: Credentials,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_codes_round_trip() {
        assert_eq!(JobType::parse("publish"), Some(JobType::Publish));
        assert_eq!(JobType::parse("generate"), Some(JobType::Generate));
        assert_eq!(JobType::parse("bogus"), None);
        assert_eq!(JobType::Publish.code(), "publish");
    }

    #[test]
    fn serialized_payload_never_contains_the_password() {
        let payload = PublishPayload {
            title: "title".into(),
            body: "body".into(),
            images: vec![],
            salon_id: None,
            stylist_id: None,
            category_code: None,
            coupon_name: None,
            credentials: Credentials {
                login_id: "salon-user".into(),
                password: "hunter2".into(),
            },
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["credentials"]["login_id"], "salon-user");
        assert!(value["credentials"].get("password").is_none());
        assert!(!value.to_string().contains("hunter2"));
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials {
            login_id: "salon-user".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("salon-user"));
        assert!(!rendered.contains("hunter2"));
    }
}
