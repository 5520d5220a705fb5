//! Per-job convenience emitter over the [`ProgressBus`].
//!
//! Owns the percent clamp: within one attempt reported percentages are
//! monotonically non-decreasing even if callers report out of order.
//! [`begin_attempt`](JobNotifier::begin_attempt) resets the floor for a
//! retried attempt.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::Utc;
use salonpost_core::failure::FailureKind;
use salonpost_core::types::DbId;

use crate::bus::ProgressBus;
use crate::event::ProgressEvent;

/// Emits lifecycle events for one job.
pub struct JobNotifier {
    bus: Arc<ProgressBus>,
    job_id: DbId,
    owner_id: DbId,
    entity_id: String,
    last_percent: AtomicU8,
}

impl JobNotifier {
    pub fn new(bus: Arc<ProgressBus>, job_id: DbId, owner_id: DbId, entity_id: String) -> Self {
        Self {
            bus,
            job_id,
            owner_id,
            entity_id,
            last_percent: AtomicU8::new(0),
        }
    }

    /// Reset the percent floor for a fresh attempt.
    pub fn begin_attempt(&self) {
        self.last_percent.store(0, Ordering::SeqCst);
    }

    /// Emit `started` for the current attempt.
    pub fn started(&self, message: impl Into<String>) {
        self.bus.publish(ProgressEvent::Started {
            job_id: self.job_id,
            owner_id: self.owner_id,
            entity_id: self.entity_id.clone(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Emit a progress update, clamped to 0..=100 and never below a
    /// percentage already reported in this attempt.
    pub fn progress(&self, percent: u8, message: impl Into<String>) {
        let clamped = percent.min(100);
        let previous = self.last_percent.fetch_max(clamped, Ordering::SeqCst);
        let effective = clamped.max(previous);

        self.bus.publish(ProgressEvent::Progress {
            job_id: self.job_id,
            owner_id: self.owner_id,
            entity_id: self.entity_id.clone(),
            percent: effective,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Emit terminal `completed`. Call only after the terminal state
    /// has been persisted.
    pub fn completed(&self, result: serde_json::Value) {
        self.bus.publish(ProgressEvent::Completed {
            job_id: self.job_id,
            owner_id: self.owner_id,
            entity_id: self.entity_id.clone(),
            result,
            timestamp: Utc::now(),
        });
    }

    /// Emit terminal `failed`. Call only after the terminal state has
    /// been persisted.
    pub fn failed(&self, error_kind: FailureKind, message: impl Into<String>, attempt_count: i32) {
        self.bus.publish(ProgressEvent::Failed {
            job_id: self.job_id,
            owner_id: self.owner_id,
            entity_id: self.entity_id.clone(),
            error_kind,
            message: message.into(),
            attempt_count,
            timestamp: Utc::now(),
        });
    }

    /// Emit a persisted status transition.
    pub fn status_changed(&self, from: impl Into<String>, to: impl Into<String>) {
        self.bus.publish(ProgressEvent::StatusChanged {
            job_id: self.job_id,
            owner_id: self.owner_id,
            entity_id: self.entity_id.clone(),
            from: from.into(),
            to: to.into(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_percents(rx: &mut tokio::sync::mpsc::Receiver<ProgressEvent>, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            match rx.recv().await.expect("event delivered") {
                ProgressEvent::Progress { percent, .. } => out.push(percent),
                other => panic!("expected progress event, got {other:?}"),
            }
        }
        out
    }

    #[tokio::test]
    async fn percent_is_monotonic_within_one_attempt() {
        let bus = ProgressBus::start();
        let mut rx = bus.subscribe_owner(1).await;
        let notifier = JobNotifier::new(bus, 10, 1, "E42".into());

        notifier.progress(10, "login");
        notifier.progress(40, "form");
        notifier.progress(30, "late report"); // must not regress
        notifier.progress(90, "verify");

        // Each publish is a separately spawned send, so arrival order
        // is not guaranteed; assert on the multiset of floors instead.
        let mut percents = collect_percents(&mut rx, 4).await;
        percents.sort_unstable();
        assert_eq!(percents, vec![10, 40, 40, 90]);
    }

    #[tokio::test]
    async fn begin_attempt_resets_the_floor() {
        let bus = ProgressBus::start();
        let mut rx = bus.subscribe_owner(1).await;
        let notifier = JobNotifier::new(bus, 10, 1, "E42".into());

        notifier.progress(80, "almost");
        notifier.begin_attempt();
        notifier.progress(5, "retrying");

        let mut percents = collect_percents(&mut rx, 2).await;
        percents.sort_unstable();
        assert_eq!(percents, vec![5, 80]);
    }

    #[tokio::test]
    async fn progress_clamps_above_100() {
        let bus = ProgressBus::start();
        let mut rx = bus.subscribe_owner(1).await;
        let notifier = JobNotifier::new(bus, 10, 1, "E42".into());

        notifier.progress(150, "overshoot");

        let percents = collect_percents(&mut rx, 1).await;
        assert_eq!(percents, vec![100]);
    }
}
