//! Context-aware pub/sub fan-out of [`ProgressEvent`]s.
//!
//! All events flow through one internal mpsc channel into a router task
//! that fans out to subscriber groups. Context detection lives entirely
//! in [`ProgressBus::publish`]; nothing else in the system branches on
//! execution context.

use std::collections::HashMap;
use std::sync::Arc;

use salonpost_core::types::DbId;
use tokio::sync::{mpsc, RwLock};

use crate::event::ProgressEvent;

/// Capacity of the internal event channel.
const BUS_CAPACITY: usize = 1024;

/// Capacity of each subscriber's delivery channel.
const SUBSCRIBER_CAPACITY: usize = 64;

/// A subscriber group: all jobs of one owner, or all watchers of one
/// target entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Owner(DbId),
    Entity(String),
}

type Groups = Arc<RwLock<HashMap<GroupKey, Vec<mpsc::Sender<ProgressEvent>>>>>;

/// In-process fan-out bus for job lifecycle events.
///
/// Safe to call from synchronous worker code and from async
/// connection-handling code alike; see [`publish`](Self::publish).
/// Delivery is at-most-once, best-effort, non-persistent: subscribers
/// that connect after an event fired must fall back to the status query.
pub struct ProgressBus {
    tx: mpsc::Sender<ProgressEvent>,
    groups: Groups,
}

impl ProgressBus {
    /// Create the bus and spawn its router task on the current runtime.
    pub fn start() -> Arc<Self> {
        let (tx, rx) = mpsc::channel(BUS_CAPACITY);
        let groups: Groups = Arc::new(RwLock::new(HashMap::new()));

        tokio::spawn(route_events(rx, Arc::clone(&groups)));

        Arc::new(Self { tx, groups })
    }

    /// Publish an event to the owner and entity groups it belongs to.
    ///
    /// Detects the calling context: from inside a Tokio runtime the send
    /// is scheduled as a fire-and-forget task (any delivery failure is
    /// caught and logged inside that task, never propagated into the
    /// caller); from a plain thread the send blocks until the router
    /// accepts the event. Either way a full or dead bus can only drop
    /// delivery; it cannot affect persisted job state.
    pub fn publish(&self, event: ProgressEvent) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let tx = self.tx.clone();
                handle.spawn(async move {
                    let job_id = event.job_id();
                    if tx.send(event).await.is_err() {
                        tracing::error!(job_id, "Progress event dropped: bus router is gone");
                    }
                });
            }
            Err(_) => {
                let job_id = event.job_id();
                if self.tx.blocking_send(event).is_err() {
                    tracing::error!(job_id, "Progress event dropped: bus router is gone");
                }
            }
        }
    }

    /// Subscribe to all events for one owner's jobs.
    pub async fn subscribe_owner(&self, owner_id: DbId) -> mpsc::Receiver<ProgressEvent> {
        self.subscribe(GroupKey::Owner(owner_id)).await
    }

    /// Subscribe to all events for one target entity.
    pub async fn subscribe_entity(&self, entity_id: &str) -> mpsc::Receiver<ProgressEvent> {
        self.subscribe(GroupKey::Entity(entity_id.to_string())).await
    }

    /// Number of live subscribers across all groups.
    pub async fn subscriber_count(&self) -> usize {
        self.groups.read().await.values().map(Vec::len).sum()
    }

    async fn subscribe(&self, key: GroupKey) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.groups.write().await.entry(key).or_default().push(tx);
        rx
    }
}

/// Router task: drain the internal channel and fan out to groups.
///
/// Exits when every bus handle has been dropped.
async fn route_events(mut rx: mpsc::Receiver<ProgressEvent>, groups: Groups) {
    while let Some(event) = rx.recv().await {
        let keys = [
            GroupKey::Owner(event.owner_id()),
            GroupKey::Entity(event.entity_id().to_string()),
        ];

        let mut map = groups.write().await;
        for key in keys {
            let Some(subscribers) = map.get_mut(&key) else {
                continue;
            };
            subscribers.retain(|sub| match sub.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Slow subscriber: drop this delivery, keep the
                    // subscription. At-most-once, best-effort.
                    tracing::warn!(job_id = event.job_id(), ?key, "Subscriber lagging, event dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
            if subscribers.is_empty() {
                map.remove(&key);
            }
        }
    }
    tracing::debug!("Progress bus router exited");
}
