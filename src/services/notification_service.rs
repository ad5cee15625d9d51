//! Pipeline notification sink.
//!
//! Fire-and-forget success/failure events for backup and restore pipelines,
//! gated by configuration flags. Subscribers receive events via
//! `tokio::sync::broadcast`; publishing is infallible so a slow or absent
//! sink can never fail the pipeline that emitted the event.

use serde::Serialize;
use tokio::sync::broadcast;

/// Which pipeline produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Backup,
    Restore,
}

/// A pipeline outcome event.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEvent {
    pub kind: PipelineKind,
    /// UUID of the backup or restore record
    pub entity_id: String,
    pub success: bool,
    pub message: String,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

/// Broadcast-based notification sink.
pub struct NotificationService {
    tx: broadcast::Sender<PipelineEvent>,
    notify_on_success: bool,
    notify_on_failure: bool,
}

impl NotificationService {
    pub fn new(capacity: usize, notify_on_success: bool, notify_on_failure: bool) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            notify_on_success,
            notify_on_failure,
        }
    }

    /// Publish a success event, if enabled. Dropped silently with no
    /// subscribers.
    pub fn notify_success(&self, kind: PipelineKind, entity_id: impl Into<String>, message: impl Into<String>) {
        if !self.notify_on_success {
            return;
        }
        self.publish(kind, entity_id.into(), true, message.into());
    }

    /// Publish a failure event, if enabled.
    pub fn notify_failure(&self, kind: PipelineKind, entity_id: impl Into<String>, message: impl Into<String>) {
        if !self.notify_on_failure {
            return;
        }
        self.publish(kind, entity_id.into(), false, message.into());
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, kind: PipelineKind, entity_id: String, success: bool, message: String) {
        let _ = self.tx.send(PipelineEvent {
            kind,
            entity_id,
            success,
            message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let sink = NotificationService::new(16, true, true);
        let mut rx = sink.subscribe();

        sink.notify_success(PipelineKind::Backup, "abc-123", "backup completed");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, PipelineKind::Backup);
        assert_eq!(event.entity_id, "abc-123");
        assert!(event.success);
    }

    #[tokio::test]
    async fn no_subscribers_does_not_panic() {
        let sink = NotificationService::new(16, true, true);
        sink.notify_failure(PipelineKind::Restore, "x", "restore failed");
    }

    #[tokio::test]
    async fn success_events_respect_gate() {
        let sink = NotificationService::new(16, false, true);
        let mut rx = sink.subscribe();

        sink.notify_success(PipelineKind::Backup, "a", "suppressed");
        sink.notify_failure(PipelineKind::Backup, "b", "delivered");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.entity_id, "b");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failure_events_respect_gate() {
        let sink = NotificationService::new(16, true, false);
        let mut rx = sink.subscribe();

        sink.notify_failure(PipelineKind::Restore, "a", "suppressed");
        assert!(rx.try_recv().is_err());
    }
}
