//! Progress notification bus for job lifecycle events.
//!
//! One internal typed channel, context-aware publishing, and per-owner /
//! per-entity fan-out to live subscribers. Delivery is at-most-once and
//! best-effort: persisted job state is the source of truth, the bus only
//! tells watchers to go look.

pub mod bus;
pub mod event;
pub mod notifier;

pub use bus::ProgressBus;
pub use event::ProgressEvent;
pub use notifier::JobNotifier;
