//! Browser automation against the SALON BOARD CMS.
//!
//! The CMS has no API; everything goes through a real browser session
//! driven over the W3C WebDriver protocol. [`engine::PublishEngine`]
//! owns the page-flow state machine, [`session::BoardSession`] owns the
//! browser resource for exactly one attempt, and [`editor`] handles the
//! rich-text editor with ordered image interleaving.

pub mod driver;
pub mod editor;
pub mod engine;
pub mod selectors;
pub mod session;
pub mod verify;
pub mod wire;

pub use engine::{EngineError, PublishEngine, PublishOutcome};
pub use session::{BoardConfig, BoardSession};
