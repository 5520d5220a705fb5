//! Thin W3C WebDriver client over [`reqwest`].
//!
//! Speaks to a chromedriver-compatible endpoint. One `WebDriver` value
//! corresponds to one live browser session; dropping it does NOT end
//! the session, callers must invoke [`WebDriver::delete_session`].

use std::path::Path;
use std::time::Duration;

use base64::Engine as _;

use crate::wire::{ElementRef, Locator, NewSessionValue, ValueEnvelope, WireError};

/// Per-command HTTP timeout. Long enough for slow page loads, short
/// enough that a wedged browser fails the attempt instead of the job.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(90);

/// Desktop Chrome user agent presented to the CMS.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Errors from the WebDriver layer.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("WebDriver request failed: {0}")]
    Http(reqwest::Error),

    /// A find command matched no element.
    #[error("no element matching '{0}'")]
    NoSuchElement(String),

    /// The browser did not complete the command in time.
    #[error("WebDriver command timed out: {0}")]
    Timeout(String),

    /// The session is gone or could not be created.
    #[error("WebDriver session error: {0}")]
    Session(String),

    /// Any other protocol-level failure.
    #[error("WebDriver protocol error ({error}): {message}")]
    Protocol { error: String, message: String },
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

/// Client for one WebDriver browser session.
pub struct WebDriver {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriver {
    /// Start a new headless Chrome session on the given WebDriver
    /// endpoint, configured to look like an ordinary Japanese desktop
    /// browser.
    pub async fn new_session(webdriver_url: &str, headless: bool) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .timeout(COMMAND_TIMEOUT)
            .build()?;

        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--window-size=1920,1080".to_string(),
            "--lang=ja-JP".to_string(),
            format!("--user-agent={USER_AGENT}"),
        ];
        if headless {
            args.push("--headless=new".to_string());
        }

        let body = serde_json::json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "timeouts": { "pageLoad": 60_000, "script": 30_000 },
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                    },
                },
            },
        });

        let base_url = webdriver_url.trim_end_matches('/').to_string();
        let response = client
            .post(format!("{base_url}/session"))
            .json(&body)
            .send()
            .await?;
        let value: NewSessionValue = Self::parse_value(response).await?;

        tracing::info!(session_id = %value.session_id, "WebDriver session started");
        Ok(Self {
            client,
            base_url,
            session_id: value.session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Navigate to a URL and wait for the page load to settle.
    pub async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.command_no_value("url", &serde_json::json!({ "url": url }))
            .await
    }

    pub async fn current_url(&self) -> Result<String, DriverError> {
        let response = self
            .client
            .get(self.session_url("url"))
            .send()
            .await?;
        Self::parse_value(response).await
    }

    /// Find the first element matching a CSS selector.
    pub async fn find(&self, css: &str) -> Result<ElementRef, DriverError> {
        let body = serde_json::json!({ "using": Locator::Css.using(), "value": css });
        let response = self
            .client
            .post(self.session_url("element"))
            .json(&body)
            .send()
            .await?;
        Self::parse_value(response)
            .await
            .map_err(|err| match err {
                DriverError::NoSuchElement(_) => DriverError::NoSuchElement(css.to_string()),
                other => other,
            })
    }

    /// Find all elements matching a CSS selector. An empty result is
    /// not an error.
    pub async fn find_all(&self, css: &str) -> Result<Vec<ElementRef>, DriverError> {
        let body = serde_json::json!({ "using": Locator::Css.using(), "value": css });
        let response = self
            .client
            .post(self.session_url("elements"))
            .json(&body)
            .send()
            .await?;
        Self::parse_value(response).await
    }

    pub async fn click(&self, element: &ElementRef) -> Result<(), DriverError> {
        self.command_no_value(
            &format!("element/{}/click", element.id),
            &serde_json::json!({}),
        )
        .await
    }

    pub async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        self.command_no_value(
            &format!("element/{}/value", element.id),
            &serde_json::json!({ "text": text }),
        )
        .await
    }

    pub async fn clear(&self, element: &ElementRef) -> Result<(), DriverError> {
        self.command_no_value(
            &format!("element/{}/clear", element.id),
            &serde_json::json!({}),
        )
        .await
    }

    /// Execute a synchronous script in the page. Element arguments are
    /// passed via the standard web-element reference encoding.
    pub async fn execute(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, DriverError> {
        let body = serde_json::json!({ "script": script, "args": args });
        let response = self
            .client
            .post(self.session_url("execute/sync"))
            .json(&body)
            .send()
            .await?;
        Self::parse_value(response).await
    }

    /// Set a `<select>`'s value and fire its change event.
    pub async fn select_by_value(&self, css: &str, value: &str) -> Result<bool, DriverError> {
        let script = "\
            const el = document.querySelector(arguments[0]); \
            if (!el) { return false; } \
            el.value = arguments[1]; \
            el.dispatchEvent(new Event('change', { bubbles: true })); \
            return el.value === arguments[1];";
        let result = self
            .execute(script, vec![css.into(), value.into()])
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Visible text of the whole document body.
    pub async fn page_text(&self) -> Result<String, DriverError> {
        let result = self
            .execute("return document.body ? document.body.innerText : '';", vec![])
            .await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    /// Capture a screenshot and write it as PNG to `path`.
    pub async fn screenshot(&self, path: &Path) -> Result<(), DriverError> {
        let response = self
            .client
            .get(self.session_url("screenshot"))
            .send()
            .await?;
        let encoded: String = Self::parse_value(response).await?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|err| DriverError::Protocol {
                error: "invalid screenshot".to_string(),
                message: err.to_string(),
            })?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|err| DriverError::Protocol {
                error: "screenshot write failed".to_string(),
                message: err.to_string(),
            })?;
        Ok(())
    }

    /// End the browser session.
    pub async fn delete_session(&self) -> Result<(), DriverError> {
        let response = self
            .client
            .delete(format!("{}/session/{}", self.base_url, self.session_id))
            .send()
            .await?;
        Self::check_status(response).await?;
        tracing::info!(session_id = %self.session_id, "WebDriver session closed");
        Ok(())
    }

    fn session_url(&self, command: &str) -> String {
        format!("{}/session/{}/{command}", self.base_url, self.session_id)
    }

    async fn command_no_value(
        &self,
        command: &str,
        body: &serde_json::Value,
    ) -> Result<(), DriverError> {
        let response = self
            .client
            .post(self.session_url(command))
            .json(body)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn parse_value<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriverError> {
        let status = response.status();
        if status.is_success() {
            let envelope: ValueEnvelope<T> =
                response.json().await.map_err(DriverError::from)?;
            Ok(envelope.value)
        } else {
            Err(Self::wire_error(status, response).await)
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<(), DriverError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::wire_error(status, response).await)
        }
    }

    async fn wire_error(status: reqwest::StatusCode, response: reqwest::Response) -> DriverError {
        let body = response.text().await.unwrap_or_default();
        let Ok(envelope) = serde_json::from_str::<ValueEnvelope<WireError>>(&body) else {
            return DriverError::Protocol {
                error: format!("http {status}"),
                message: body,
            };
        };
        let wire = envelope.value;
        match wire.error.as_str() {
            "no such element" => DriverError::NoSuchElement(wire.message),
            "timeout" | "script timeout" => DriverError::Timeout(wire.message),
            "invalid session id" | "session not created" => DriverError::Session(wire.message),
            _ => DriverError::Protocol {
                error: wire.error,
                message: wire.message,
            },
        }
    }
}
