//! Rich-text editor control with ordered image interleaving.
//!
//! The CMS body field is a nicEdit-style widget layered over a hidden
//! textarea. The widget strategy is probed exactly once per attempt at
//! form-ready and then used for the whole composition walk. Uploaded
//! images land at the caret, so the caret is forced to end-of-document
//! before every append and again after every upload; that is what keeps
//! segments in document order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use salonpost_core::compose::Segment;

use crate::driver::{DriverError, WebDriver};
use crate::selectors;
use crate::session::BoardSession;

/// How long to wait for the uploaded file's processed thumbnail.
const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the upload modal to accept submission.
const SUBMIT_ACTIVE_TIMEOUT: Duration = Duration::from_secs(20);

/// How long to wait for the upload modal to dismiss.
const MODAL_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the editor to report the new image.
const IMAGE_COUNT_TIMEOUT: Duration = Duration::from_secs(8);

/// Poll interval for DOM condition waits.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// In-place retries for one image upload before the attempt fails.
const UPLOAD_ATTEMPTS: u32 = 2;

/// JS helper locating the editing surface; prepended to every editor
/// script. Prefers the widget inside the blog form when several
/// contenteditable surfaces exist on the page.
const JS_FIND_EDITOR: &str = "\
    function findEditor() { \
        const preferred = [ \
            \"#blog .editWrap div.nicEdit-main[contenteditable='true']\", \
            \"#blog div.nicEdit-main[contenteditable='true']\", \
        ]; \
        for (const sel of preferred) { \
            const el = document.querySelector(sel); \
            if (el) { return el; } \
        } \
        const editors = Array.from(document.querySelectorAll(\"div.nicEdit-main[contenteditable='true']\")); \
        return editors.find(el => el.closest('#blog')) || editors[0] || null; \
    }";

/// Editor capability detected once per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorStrategy {
    /// The scripted widget API (`nicEditors.findEditor`) is available.
    WidgetApi,
    /// No widget API; manipulate the contenteditable surface directly.
    DomFallback,
}

/// Editor-level failures, classified for retry policy by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// Neither the widget API nor a contenteditable surface exists.
    /// The page shape changed; retrying the same markup cannot help.
    #[error("no usable editor found on the form page")]
    NoEditor,

    /// An upload step did not complete within its bounded wait.
    #[error("image upload failed: {0}")]
    Upload(String),

    /// An editor script reported failure.
    #[error("editor script failed: {0}")]
    Script(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Handle to the body editor for one attempt.
pub struct Editor<'a> {
    session: &'a BoardSession,
    strategy: EditorStrategy,
}

impl<'a> Editor<'a> {
    /// Probe the page for an editing capability. Called exactly once,
    /// at form-ready; the result is fixed for the whole attempt.
    pub async fn resolve(session: &'a BoardSession) -> Result<Editor<'a>, EditorError> {
        let driver = session.driver();

        let has_widget_api = driver
            .execute(
                "return typeof nicEditors !== 'undefined' \
                     && nicEditors.findEditor('blogContents') != null;",
                vec![],
            )
            .await?
            .as_bool()
            .unwrap_or(false);
        if has_widget_api {
            tracing::info!("Editor strategy: widget API");
            return Ok(Self {
                session,
                strategy: EditorStrategy::WidgetApi,
            });
        }

        let has_surface = !driver.find_all(selectors::form::EDITOR_DIV).await?.is_empty();
        if has_surface {
            tracing::info!("Editor strategy: DOM fallback");
            return Ok(Self {
                session,
                strategy: EditorStrategy::DomFallback,
            });
        }

        Err(EditorError::NoEditor)
    }

    /// Walk the segments in document order, appending text runs and
    /// uploading images at their exact positions.
    pub async fn compose(
        &self,
        segments: &[Segment],
        images: &[PathBuf],
    ) -> Result<(), EditorError> {
        self.clear().await?;
        self.mark_existing_images().await?;

        for segment in segments {
            match segment {
                Segment::Text(text) => {
                    self.cursor_to_end().await;
                    self.append_text(text).await?;
                }
                Segment::Image(index) => {
                    let Some(path) = images.get(*index) else {
                        // Payload validation rules this out before an
                        // attempt starts; treat a slip as a script bug.
                        return Err(EditorError::Script(format!(
                            "image index {index} out of range"
                        )));
                    };
                    self.insert_image(path).await?;
                }
            }
        }

        self.sync_content().await?;
        Ok(())
    }

    /// Number of `<img>` tags currently in the editor.
    pub async fn image_count(&self) -> Result<usize, EditorError> {
        let script = match self.strategy {
            EditorStrategy::WidgetApi => {
                "const content = nicEditors.findEditor('blogContents').getContent() || ''; \
                 return (content.match(/<img\\b/gi) || []).length;"
            }
            EditorStrategy::DomFallback => {
                "const editor = findEditor(); \
                 return editor ? editor.querySelectorAll('img').length : 0;"
            }
        };
        let result = self
            .session
            .driver()
            .execute(&self.with_helper(script), vec![])
            .await?;
        Ok(result.as_u64().unwrap_or(0) as usize)
    }

    /// Upload one image at the caret position, verifying it actually
    /// appeared in the editor.
    async fn insert_image(&self, path: &Path) -> Result<(), EditorError> {
        self.cursor_to_end().await;
        let before = self.image_count().await?;

        self.upload_file(path).await?;

        if !self.wait_for_image_count(before + 1).await? {
            return Err(EditorError::Upload(format!(
                "image {} did not appear in the editor",
                path.display()
            )));
        }
        self.cursor_to_end().await;
        Ok(())
    }

    /// Drive the upload modal: open, supply the file, wait for the
    /// processed thumbnail, confirm, wait for dismissal. One in-place
    /// retry before giving up.
    async fn upload_file(&self, path: &Path) -> Result<(), EditorError> {
        let mut last_error = None;

        for attempt in 1..=UPLOAD_ATTEMPTS {
            match self.upload_file_once(path).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        path = %path.display(),
                        error = %err,
                        "Image upload attempt failed"
                    );
                    last_error = Some(err);
                    self.session.settle(1000).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EditorError::Upload("upload never ran".into())))
    }

    async fn upload_file_once(&self, path: &Path) -> Result<(), EditorError> {
        let driver = self.session.driver();

        let trigger = driver
            .find(selectors::image::TRIGGER_BUTTON)
            .await
            .map_err(|_| EditorError::Upload("upload button not found".into()))?;
        driver.click(&trigger).await?;
        self.session.settle(500).await;

        let file_input = driver
            .find(selectors::image::FILE_INPUT)
            .await
            .map_err(|_| EditorError::Upload("file input not found".into()))?;
        driver
            .send_keys(&file_input, &path.display().to_string())
            .await?;

        if !self
            .wait_for_selector(selectors::image::THUMBNAIL, THUMBNAIL_TIMEOUT)
            .await?
        {
            return Err(EditorError::Upload("thumbnail did not appear".into()));
        }

        if !self
            .wait_for_selector(selectors::image::SUBMIT_BUTTON, SUBMIT_ACTIVE_TIMEOUT)
            .await?
        {
            return Err(EditorError::Upload("submit button did not become active".into()));
        }
        let submit = driver.find(selectors::image::SUBMIT_BUTTON).await?;
        driver.click(&submit).await?;

        if !self
            .wait_for_selector_gone(selectors::image::MODAL, MODAL_CLOSE_TIMEOUT)
            .await?
        {
            return Err(EditorError::Upload("image modal did not close".into()));
        }

        self.cursor_to_end().await;
        tracing::info!(path = %path.display(), "Uploaded image");
        Ok(())
    }

    /// Force the caret to end-of-document. Best-effort: a failure here
    /// degrades ordering, it does not abort composition.
    async fn cursor_to_end(&self) {
        let script = "\
            const editor = findEditor(); \
            if (!editor) { return false; } \
            editor.focus(); \
            const range = document.createRange(); \
            range.selectNodeContents(editor); \
            range.collapse(false); \
            const selection = window.getSelection(); \
            selection.removeAllRanges(); \
            selection.addRange(range); \
            return true;";
        match self
            .session
            .driver()
            .execute(&self.with_helper(script), vec![])
            .await
        {
            Ok(result) if result.as_bool() == Some(true) => {}
            Ok(_) => tracing::debug!("Cursor move reported failure"),
            Err(err) => tracing::warn!(error = %err, "Cursor move script failed"),
        }
    }

    /// Append a text run at the caret, converting newlines to `<br>`.
    async fn append_text(&self, text: &str) -> Result<(), EditorError> {
        let html = text
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .replace('\n', "<br>");
        let script = "\
            const editor = findEditor(); \
            if (!editor) { return false; } \
            const temp = document.createElement('div'); \
            temp.innerHTML = arguments[0]; \
            while (temp.firstChild) { editor.appendChild(temp.firstChild); } \
            return true;";
        let appended = self
            .session
            .driver()
            .execute(&self.with_helper(script), vec![html.into()])
            .await?
            .as_bool()
            .unwrap_or(false);
        if !appended {
            return Err(EditorError::Script("text append failed".into()));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), EditorError> {
        let script = "\
            const editor = findEditor(); \
            if (!editor) { return false; } \
            editor.innerHTML = ''; \
            return true;";
        let cleared = self
            .session
            .driver()
            .execute(&self.with_helper(script), vec![])
            .await?
            .as_bool()
            .unwrap_or(false);
        if !cleared {
            return Err(EditorError::Script("editor clear failed".into()));
        }
        Ok(())
    }

    /// Tag pre-existing images so upload verification counts only new
    /// ones.
    async fn mark_existing_images(&self) -> Result<(), EditorError> {
        let script = "\
            const editor = findEditor(); \
            if (!editor) { return false; } \
            editor.querySelectorAll('img').forEach(img => { \
                if (!img.hasAttribute('data-image-bound')) { \
                    img.setAttribute('data-image-bound', 'existing'); \
                } \
            }); \
            return true;";
        self.session
            .driver()
            .execute(&self.with_helper(script), vec![])
            .await?;
        Ok(())
    }

    /// Push the editor surface back into the underlying textarea so the
    /// form submit carries the composed content.
    async fn sync_content(&self) -> Result<(), EditorError> {
        let script = "\
            if (typeof nicEditors !== 'undefined') { \
                const instance = nicEditors.findEditor('blogContents'); \
                if (instance) { instance.saveContent(); return true; } \
            } \
            const textarea = document.querySelector('textarea#blogContents'); \
            const editor = findEditor(); \
            if (textarea && editor) { textarea.value = editor.innerHTML; return true; } \
            return false;";
        let synced = self
            .session
            .driver()
            .execute(&self.with_helper(script), vec![])
            .await?
            .as_bool()
            .unwrap_or(false);
        if !synced {
            return Err(EditorError::Script("content sync failed".into()));
        }
        Ok(())
    }

    async fn wait_for_image_count(&self, expected: usize) -> Result<bool, EditorError> {
        let deadline = tokio::time::Instant::now() + IMAGE_COUNT_TIMEOUT;
        loop {
            if self.image_count().await? >= expected {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> Result<bool, DriverError> {
        wait_until(self.session.driver(), css, timeout, true).await
    }

    async fn wait_for_selector_gone(
        &self,
        css: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        wait_until(self.session.driver(), css, timeout, false).await
    }

    fn with_helper(&self, script: &str) -> String {
        format!("{JS_FIND_EDITOR} {script}")
    }
}

/// Poll until a selector is present (or absent), bounded by `timeout`.
async fn wait_until(
    driver: &WebDriver,
    css: &str,
    timeout: Duration,
    present: bool,
) -> Result<bool, DriverError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let found = !driver.find_all(css).await?.is_empty();
        if found == present {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
