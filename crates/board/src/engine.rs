//! Publish flow state machine.
//!
//! One engine drives exactly one attempt over one [`BoardSession`].
//! Forward-only transitions:
//!
//! `SessionStarted -> LoggedIn -> [TargetSelected] -> FormReady ->
//! ContentComposed -> Confirmed -> Published`
//!
//! Any failure aborts the attempt with an [`EngineError`] carrying the
//! failure classification and, where possible, a diagnostic screenshot.

use std::path::PathBuf;
use std::time::Duration;

use salonpost_core::compose::{split_body, validate_placeholders, Segment};
use salonpost_core::failure::FailureKind;
use salonpost_core::payload::{JobType, PublishPayload};
use salonpost_core::truncate::smart_truncate;
use salonpost_events::JobNotifier;

use crate::driver::DriverError;
use crate::editor::{Editor, EditorError};
use crate::selectors;
use crate::session::{BoardSession, SessionError};
use crate::verify;

/// CMS-imposed title length in characters.
const TITLE_MAX_CHARS: usize = 25;

/// Default blog category when the payload names none.
const DEFAULT_CATEGORY: &str = "BL02";

/// Bounded wait for positive completion evidence after submit.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(20);

/// Poll interval for the completion check.
const VERIFY_POLL: Duration = Duration::from_secs(2);

/// Current position in the publish flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    SessionStarted,
    LoggedIn,
    TargetSelected,
    FormReady,
    ContentComposed,
    Confirmed,
    Published,
}

/// A failed attempt, classified for the orchestrator's retry policy.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: FailureKind,
    pub message: String,
    pub screenshot: Option<PathBuf>,
}

impl EngineError {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            screenshot: None,
        }
    }

    fn with_screenshot(mut self, screenshot: Option<PathBuf>) -> Self {
        self.screenshot = screenshot;
        self
    }
}

impl From<DriverError> for EngineError {
    fn from(err: DriverError) -> Self {
        let kind = match &err {
            DriverError::NoSuchElement(_) => FailureKind::ElementMissing,
            DriverError::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::Timeout,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<SessionError> for EngineError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::RobotDetected { marker, screenshot } => {
                Self::new(FailureKind::RobotDetected, format!("challenge via '{marker}'"))
                    .with_screenshot(screenshot)
            }
            SessionError::Driver(driver) => driver.into(),
        }
    }
}

impl From<EditorError> for EngineError {
    fn from(err: EditorError) -> Self {
        let kind = match &err {
            EditorError::NoEditor => FailureKind::ConfigurationError,
            EditorError::Upload(_) => FailureKind::UploadTimeout,
            EditorError::Script(_) => FailureKind::ElementMissing,
            EditorError::Driver(DriverError::NoSuchElement(_)) => FailureKind::ElementMissing,
            EditorError::Driver(_) => FailureKind::Timeout,
        };
        Self::new(kind, err.to_string())
    }
}

/// Result of a successful attempt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PublishOutcome {
    /// Final URL observed on the completion page.
    pub published_url: String,
    /// Title as actually filled (after truncation).
    pub title: String,
}

/// Drives one publishing attempt end to end.
pub struct PublishEngine<'a> {
    session: &'a BoardSession,
    notifier: &'a JobNotifier,
    state: EngineState,
}

impl<'a> PublishEngine<'a> {
    pub fn new(session: &'a BoardSession, notifier: &'a JobNotifier) -> Self {
        Self {
            session,
            notifier,
            state: EngineState::SessionStarted,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Run the flow. For [`JobType::Generate`] the flow stops after
    /// composition; nothing is submitted.
    pub async fn run(
        &mut self,
        job_type: JobType,
        payload: &PublishPayload,
    ) -> Result<PublishOutcome, EngineError> {
        let segments = self.validate(payload)?;

        self.login(payload).await?;
        self.select_target(payload).await?;
        self.open_form().await?;
        let title = self.compose(payload, &segments).await?;

        if job_type == JobType::Generate {
            // Dry run: the form is filled and verified composable, stop
            // short of the confirmation step.
            let url = self.session.driver().current_url().await?;
            self.notifier.progress(100, "Dry run composed");
            return Ok(PublishOutcome {
                published_url: url,
                title,
            });
        }

        self.confirm().await?;
        self.submit().await?;
        let published_url = self.verify_completion().await?;

        self.state = EngineState::Published;
        Ok(PublishOutcome {
            published_url,
            title,
        })
    }

    /// Payload sanity check before any browser traffic.
    fn validate(&self, payload: &PublishPayload) -> Result<Vec<Segment>, EngineError> {
        validate_placeholders(&payload.body, payload.images.len())
            .map_err(|err| EngineError::new(err.kind, err.message))?;
        Ok(split_body(&payload.body))
    }

    async fn login(&mut self, payload: &PublishPayload) -> Result<(), EngineError> {
        let driver = self.session.driver();
        let config = self.session.config();
        self.notifier.progress(10, "Logging in");

        driver.goto(&config.login_url()).await?;
        self.session.post_navigation().await?;

        self.fill_first(selectors::login::USER_INPUTS, &payload.credentials.login_id)
            .await
            .ok_or_else(|| {
                EngineError::new(FailureKind::ElementMissing, "user id input not found")
            })?;
        self.fill_first(selectors::login::PASSWORD_INPUTS, &payload.credentials.password)
            .await
            .ok_or_else(|| {
                EngineError::new(FailureKind::ElementMissing, "password input not found")
            })?;

        self.click_first(selectors::login::SUBMIT_BUTTONS)
            .await
            .ok_or_else(|| {
                EngineError::new(FailureKind::ElementMissing, "login button not found")
            })?;
        self.session.settle(2000).await;
        self.session.post_navigation().await?;

        // The login may bounce through an intermediate redirect page.
        for _ in 0..2 {
            if self.any_present(selectors::login::SUCCESS_MARKERS).await? {
                self.state = EngineState::LoggedIn;
                tracing::info!(login_id = %payload.credentials.login_id, "Logged in");
                return Ok(());
            }
            self.session.settle(2000).await;
        }

        if let Some(text) = self.first_error_text().await? {
            let screenshot = self.session.capture_screenshot("login_failed").await;
            return Err(
                EngineError::new(FailureKind::LoginFailed, text).with_screenshot(screenshot)
            );
        }

        if self.any_present(selectors::login::CAPTCHA_MARKERS).await? {
            let screenshot = self.session.capture_screenshot("captcha_detected").await;
            return Err(EngineError::new(
                FailureKind::RobotDetected,
                "image authentication challenge on login",
            )
            .with_screenshot(screenshot));
        }

        let url = driver.current_url().await?;
        if url.to_lowercase().contains("login") {
            let screenshot = self.session.capture_screenshot("login_failed").await;
            return Err(EngineError::new(
                FailureKind::LoginFailed,
                "still on the login page after submit",
            )
            .with_screenshot(screenshot));
        }

        self.state = EngineState::LoggedIn;
        Ok(())
    }

    /// Pick the salon on the multi-entity chooser. Skipped entirely
    /// when the chooser is not shown (single-salon accounts land on the
    /// dashboard directly).
    async fn select_target(&mut self, payload: &PublishPayload) -> Result<(), EngineError> {
        let driver = self.session.driver();

        let chooser_shown = !driver.find_all(selectors::nav::SALON_TABLE).await?.is_empty();
        if !chooser_shown {
            return Ok(());
        }

        let Some(salon_id) = payload.salon_id.as_deref() else {
            return Err(EngineError::new(
                FailureKind::TargetSelectionFailed,
                "salon chooser shown but no salon id in the payload",
            ));
        };
        self.notifier.progress(20, "Selecting salon");

        // Exact id attribute match first, href fallback second.
        let candidates = [
            format!("a[id='{salon_id}']"),
            format!("a[href*='{salon_id}']"),
        ];
        for selector in &candidates {
            let found = driver.find_all(selector).await?;
            if let Some(link) = found.first() {
                self.session.human_pause().await;
                driver.click(link).await?;
                self.session.settle(3000).await;
                self.session.post_navigation().await?;
                self.state = EngineState::TargetSelected;
                tracing::info!(salon_id, "Selected salon");
                return Ok(());
            }
        }

        let screenshot = self.session.capture_screenshot("salon_selection_failed").await;
        Err(EngineError::new(
            FailureKind::TargetSelectionFailed,
            format!("salon {salon_id} not found on the chooser"),
        )
        .with_screenshot(screenshot))
    }

    /// Navigate through publish management to a fresh blog form.
    async fn open_form(&mut self) -> Result<(), EngineError> {
        let driver = self.session.driver();
        self.notifier.progress(30, "Opening the blog form");

        for step in [
            selectors::nav::PUBLISH_MANAGE,
            selectors::nav::BLOG_MENU,
            selectors::nav::NEW_POST_BUTTON,
        ] {
            let found = driver.find_all(step).await?;
            if let Some(link) = found.first() {
                driver.click(link).await?;
                self.session.settle(1500).await;
                self.session.post_navigation().await?;
            }
        }

        if driver.find_all(selectors::form::TITLE).await?.is_empty() {
            let screenshot = self.session.capture_screenshot("form_missing").await;
            return Err(EngineError::new(
                FailureKind::ElementMissing,
                "blog form title field not found",
            )
            .with_screenshot(screenshot));
        }

        self.state = EngineState::FormReady;
        Ok(())
    }

    /// Fill the form and compose the body in document order.
    async fn compose(
        &mut self,
        payload: &PublishPayload,
        segments: &[Segment],
    ) -> Result<String, EngineError> {
        let driver = self.session.driver();
        self.notifier.progress(40, "Composing content");

        let title = smart_truncate(&payload.title, TITLE_MAX_CHARS);
        let title_field = driver.find(selectors::form::TITLE).await?;
        driver.clear(&title_field).await?;
        driver.send_keys(&title_field, &title).await?;

        if let Some(stylist_id) = payload.stylist_id.as_deref() {
            if !driver.select_by_value(selectors::form::STYLIST, stylist_id).await? {
                tracing::warn!(stylist_id, "Stylist selection failed");
            }
        }
        let category = payload.category_code.as_deref().unwrap_or(DEFAULT_CATEGORY);
        if !driver.select_by_value(selectors::form::CATEGORY, category).await? {
            tracing::warn!(category, "Category selection failed");
        }

        if let Some(coupon_name) = payload.coupon_name.as_deref() {
            self.attach_coupon(coupon_name).await?;
        }

        // Strategy is probed once here and fixed for the attempt.
        let editor = Editor::resolve(self.session).await?;
        editor.compose(segments, &payload.images).await?;

        self.state = EngineState::ContentComposed;
        self.notifier.progress(70, "Content composed");
        Ok(title)
    }

    /// Open the coupon modal and pick the first label containing the
    /// requested fragment. Best-effort: a missing coupon logs a warning
    /// and the post goes out without one.
    async fn attach_coupon(&self, coupon_name: &str) -> Result<(), EngineError> {
        let driver = self.session.driver();

        let triggers = driver.find_all(selectors::coupon::TRIGGER_BUTTON).await?;
        let Some(trigger) = triggers.first() else {
            tracing::warn!("Coupon trigger button not found");
            return Ok(());
        };
        driver.click(trigger).await?;
        self.session.settle(1000).await;

        if driver.find_all(selectors::coupon::MODAL).await?.is_empty() {
            tracing::warn!("Coupon modal did not appear");
            return Ok(());
        }

        // First label whose text contains the fragment.
        let script = "\
            const labels = Array.from(document.querySelectorAll(arguments[0])); \
            const target = labels.find(l => (l.innerText || '').includes(arguments[1])); \
            if (!target) { return false; } \
            target.click(); \
            return true;";
        let clicked = driver
            .execute(script, vec![selectors::coupon::LABELS.into(), coupon_name.into()])
            .await?
            .as_bool()
            .unwrap_or(false);
        if !clicked {
            tracing::warn!(coupon_name, "Coupon not found by partial match");
            return Ok(());
        }

        let settings = driver.find_all(selectors::coupon::SETTING_BUTTON).await?;
        if let Some(button) = settings.first() {
            driver.click(button).await?;
            self.session.settle(500).await;
            tracing::info!(coupon_name, "Coupon attached");
        }
        Ok(())
    }

    /// Advance to the confirmation page.
    async fn confirm(&mut self) -> Result<(), EngineError> {
        let driver = self.session.driver();
        self.notifier.progress(80, "Confirming");

        let buttons = driver.find_all(selectors::actions::CONFIRM_BUTTON).await?;
        let Some(button) = buttons.first() else {
            return Err(EngineError::new(
                FailureKind::ElementMissing,
                "confirm button not found",
            ));
        };
        driver.click(button).await?;
        self.session.settle(2000).await;
        self.session.post_navigation().await?;

        // Validation errors surface on the confirmation page.
        let error_elements = driver.find_all("[class*='error']").await?;
        if !error_elements.is_empty() {
            tracing::warn!(count = error_elements.len(), "Error markup on confirmation page");
        }

        self.state = EngineState::Confirmed;
        Ok(())
    }

    /// Fire the final submit (the reflect action).
    async fn submit(&mut self) -> Result<(), EngineError> {
        let driver = self.session.driver();
        self.notifier.progress(90, "Submitting");

        let buttons = driver.find_all(selectors::actions::REFLECT_BUTTON).await?;
        let Some(button) = buttons.first() else {
            return Err(EngineError::new(
                FailureKind::ElementMissing,
                "reflect button not found",
            ));
        };
        driver.click(button).await?;
        self.session.settle(2000).await;
        Ok(())
    }

    /// Wait for positive completion evidence. Never assumes success: no
    /// evidence within the bounded wait is a `VerificationTimeout`.
    async fn verify_completion(&self) -> Result<String, EngineError> {
        let driver = self.session.driver();
        let deadline = tokio::time::Instant::now() + VERIFY_TIMEOUT;

        loop {
            let url = driver.current_url().await?;
            let page_text = driver.page_text().await?;
            let mut has_affordance = false;
            for selector in selectors::complete::LIST_AFFORDANCES {
                if !driver.find_all(selector).await?.is_empty() {
                    has_affordance = true;
                    break;
                }
            }

            if verify::completion_decision(&url, &page_text, has_affordance) {
                self.session.capture_screenshot("completed").await;
                tracing::info!(url = %url, "Publication confirmed");
                return Ok(url);
            }

            if tokio::time::Instant::now() >= deadline {
                let screenshot = self.session.capture_screenshot("verification_timeout").await;
                return Err(EngineError::new(
                    FailureKind::VerificationTimeout,
                    format!("no completion evidence at {url}"),
                )
                .with_screenshot(screenshot));
            }
            tokio::time::sleep(VERIFY_POLL).await;
        }
    }

    /// Fill the first present selector from a fallback list. Returns
    /// the selector used, or `None` when nothing matched.
    async fn fill_first(&self, candidates: &[&'static str], value: &str) -> Option<&'static str> {
        let driver = self.session.driver();
        for &selector in candidates {
            let Ok(found) = driver.find_all(selector).await else {
                continue;
            };
            if let Some(element) = found.first() {
                if driver.clear(element).await.is_ok()
                    && driver.send_keys(element, value).await.is_ok()
                {
                    return Some(selector);
                }
            }
        }
        None
    }

    /// Click the first present selector from a fallback list.
    async fn click_first(&self, candidates: &[&'static str]) -> Option<&'static str> {
        let driver = self.session.driver();
        for &selector in candidates {
            let Ok(found) = driver.find_all(selector).await else {
                continue;
            };
            if let Some(element) = found.first() {
                self.session.human_pause().await;
                if driver.click(element).await.is_ok() {
                    return Some(selector);
                }
            }
        }
        None
    }

    async fn any_present(&self, candidates: &[&'static str]) -> Result<bool, DriverError> {
        for selector in candidates {
            if !self.session.driver().find_all(selector).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Text of the first visible login error message, if any.
    async fn first_error_text(&self) -> Result<Option<String>, DriverError> {
        let driver = self.session.driver();
        for selector in selectors::login::ERROR_MARKERS {
            let found = driver.find_all(selector).await?;
            if found.first().is_some() {
                let script = "\
                    const el = document.querySelector(arguments[0]); \
                    return el ? (el.innerText || '').trim() : '';";
                let text = driver
                    .execute(script, vec![(*selector).into()])
                    .await?
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                if !text.is_empty() {
                    return Ok(Some(text));
                }
            }
        }
        Ok(None)
    }
}
