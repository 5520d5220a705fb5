//! Failure taxonomy for automation attempts.
//!
//! The orchestrator is the sole place that decides retry vs terminal,
//! and it does so purely on [`FailureKind::is_retryable`]. The engine
//! only classifies; it never retries a whole attempt on its own.

use serde::{Deserialize, Serialize};

/// What went wrong during an automation attempt.
///
/// Kinds fall into four groups:
/// - transient: worth retrying with a fresh browser session;
/// - structural: broken input or configuration, retrying cannot help;
/// - policy: the target flagged us as automated traffic; repeating the
///   same flow tends to reproduce the flag, so never retried;
/// - verification: submission happened but success was not positively
///   observed; treated as failure, never success-by-default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A required page element was absent when the engine needed it.
    ElementMissing,
    /// The image upload round-trip did not complete in time.
    UploadTimeout,
    /// Generic page/network timeout.
    Timeout,
    /// Credentials rejected or the login flow never left the login page.
    LoginFailed,
    /// The requested target entity was not present in the selection screen.
    TargetSelectionFailed,
    /// A `{{image_k}}` token and its image file do not line up.
    MissingPlaceholder,
    /// Neither editing surface (widget API nor editable region) is usable.
    ConfigurationError,
    /// A CAPTCHA or interstitial robot-challenge marker was observed.
    RobotDetected,
    /// No success signal appeared after submission within the bounded wait.
    VerificationTimeout,
}

impl FailureKind {
    /// Whether the orchestrator may run another attempt for this kind.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::ElementMissing | FailureKind::UploadTimeout | FailureKind::Timeout
        )
    }

    /// Stable string code used in the database and on the wire.
    pub fn code(self) -> &'static str {
        match self {
            FailureKind::ElementMissing => "element_missing",
            FailureKind::UploadTimeout => "upload_timeout",
            FailureKind::Timeout => "timeout",
            FailureKind::LoginFailed => "login_failed",
            FailureKind::TargetSelectionFailed => "target_selection_failed",
            FailureKind::MissingPlaceholder => "missing_placeholder",
            FailureKind::ConfigurationError => "configuration_error",
            FailureKind::RobotDetected => "robot_detected",
            FailureKind::VerificationTimeout => "verification_timeout",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
