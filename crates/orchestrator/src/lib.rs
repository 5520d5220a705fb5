//! Job orchestration: submission, per-entity serialization, bounded
//! retries, and the persist-before-notify ordering contract.

pub mod config;
pub mod orchestrator;
pub mod runner;
pub mod store;

pub use config::OrchestratorConfig;
pub use orchestrator::{Orchestrator, OrchestratorError, SubmitRequest};
pub use runner::{AttemptFailure, AttemptRunner, BoardAttemptRunner};
pub use store::{JobStore, PgJobStore, StoreError};
