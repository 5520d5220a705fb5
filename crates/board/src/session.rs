//! One browser session per publishing attempt.
//!
//! A [`BoardSession`] is an exclusive resource: started fresh for each
//! attempt, never reused, and torn down unconditionally before the
//! attempt's outcome is reported. Every navigation is followed by
//! [`BoardSession::post_navigation`], which scans for robot challenges
//! and hides overlay widgets.

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use crate::driver::{DriverError, WebDriver};
use crate::selectors;
use crate::verify;

/// Stealth script run after each navigation to mask automation markers.
const STEALTH_SCRIPT: &str = "\
    Object.defineProperty(navigator, 'webdriver', { get: () => false }); \
    Object.defineProperty(navigator, 'languages', { get: () => ['ja-JP', 'ja', 'en-US', 'en'] }); \
    if (!window.chrome) { window.chrome = { runtime: {} }; }";

/// Board automation configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development
/// against a chromedriver on its standard port.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// WebDriver endpoint (default: `http://localhost:9515`).
    pub webdriver_url: String,
    /// CMS base URL (default: `https://salonboard.com`).
    pub base_url: String,
    /// Run the browser headless (default: `true`).
    pub headless: bool,
    /// Directory for diagnostic screenshots (default: `/tmp`).
    pub screenshot_dir: PathBuf,
}

impl BoardConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                  |
    /// |----------------------|--------------------------|
    /// | `WEBDRIVER_URL`      | `http://localhost:9515`  |
    /// | `BOARD_BASE_URL`     | `https://salonboard.com` |
    /// | `BOARD_HEADLESS`     | `true`                   |
    /// | `SCREENSHOT_DIR`     | `/tmp`                   |
    pub fn from_env() -> Self {
        let webdriver_url =
            std::env::var("WEBDRIVER_URL").unwrap_or_else(|_| "http://localhost:9515".into());
        let base_url =
            std::env::var("BOARD_BASE_URL").unwrap_or_else(|_| "https://salonboard.com".into());
        let headless = std::env::var("BOARD_HEADLESS")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let screenshot_dir =
            PathBuf::from(std::env::var("SCREENSHOT_DIR").unwrap_or_else(|_| "/tmp".into()));

        Self {
            webdriver_url,
            base_url,
            headless,
            screenshot_dir,
        }
    }

    pub fn login_url(&self) -> String {
        format!("{}/login/", self.base_url.trim_end_matches('/'))
    }
}

/// Raised by [`BoardSession::post_navigation`] when the CMS serves a
/// robot challenge instead of the expected page.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("robot challenge detected via '{marker}'")]
    RobotDetected {
        marker: String,
        screenshot: Option<PathBuf>,
    },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// A live browser session bound to one attempt.
pub struct BoardSession {
    driver: WebDriver,
    config: BoardConfig,
}

impl BoardSession {
    /// Spawn a fresh browser session.
    pub async fn start(config: BoardConfig) -> Result<Self, DriverError> {
        let driver = WebDriver::new_session(&config.webdriver_url, config.headless).await?;
        Ok(Self { driver, config })
    }

    pub fn driver(&self) -> &WebDriver {
        &self.driver
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Common processing after every page navigation: mask automation
    /// markers, scan for robot challenges, hide overlay widgets.
    pub async fn post_navigation(&self) -> Result<(), SessionError> {
        if let Err(err) = self.driver.execute(STEALTH_SCRIPT, vec![]).await {
            tracing::debug!(error = %err, "Stealth script injection failed");
        }

        self.check_robot_detection().await?;
        self.hide_blockers().await;
        Ok(())
    }

    /// Scan for CAPTCHA / robot challenge markers. A hit is a policy
    /// failure; the attempt must abort without retrying.
    async fn check_robot_detection(&self) -> Result<(), SessionError> {
        let mut counts = Vec::with_capacity(selectors::ROBOT_MARKERS.len());
        for marker in selectors::ROBOT_MARKERS {
            let found = self.driver.find_all(marker).await.map(|els| els.len());
            counts.push((*marker, found.unwrap_or(0)));
        }

        if let Some(marker) = verify::matched_robot_marker(counts) {
            let screenshot = self.capture_screenshot("robot_challenge").await;
            tracing::error!(marker, ?screenshot, "Robot challenge detected");
            return Err(SessionError::RobotDetected {
                marker: marker.to_string(),
                screenshot,
            });
        }
        Ok(())
    }

    /// Inject CSS hiding chat widgets that overlay clickable elements.
    async fn hide_blockers(&self) {
        let css = format!(
            "{} {{ display: none !important; }}",
            selectors::BLOCKERS.join(", ")
        );
        let script = "\
            const style = document.createElement('style'); \
            style.textContent = arguments[0]; \
            document.head.appendChild(style);";
        if let Err(err) = self.driver.execute(script, vec![css.into()]).await {
            tracing::warn!(error = %err, "Failed to inject blocker CSS");
        }
    }

    /// Capture a diagnostic screenshot; failures are logged, not raised.
    pub async fn capture_screenshot(&self, name: &str) -> Option<PathBuf> {
        let path = self
            .config
            .screenshot_dir
            .join(format!("board_{name}_{}.png", chrono::Utc::now().timestamp()));
        match self.driver.screenshot(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Screenshot saved");
                Some(path)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to take screenshot");
                None
            }
        }
    }

    /// Short randomized pause before a click, to avoid machine-perfect
    /// action timing.
    pub async fn human_pause(&self) {
        let millis = rand::rng().random_range(500..1500);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    /// Fixed settling pause after a navigation-triggering action.
    pub async fn settle(&self, millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    /// Tear the browser down. Errors are logged and swallowed so
    /// teardown never masks the attempt outcome.
    pub async fn close(self) {
        if let Err(err) = self.driver.delete_session().await {
            tracing::warn!(error = %err, "Error closing browser session");
        }
    }
}
