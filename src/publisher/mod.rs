//! Boundary adapter between the CRUD write path and the fanout layer.
//!
//! The CRUD collaborator calls [`TaskEventPublisher::on_task_committed`]
//! after a task write is durably committed. The call constructs the event
//! envelope and hands it to the broadcaster; it holds no transaction and
//! nothing it does can fail the originating mutation.

use std::sync::Arc;

use crate::events::{TaskEvent, TaskEventKind};
use crate::fanout::{DeliveryReport, EventBroadcaster};

pub struct TaskEventPublisher {
    broadcaster: Arc<EventBroadcaster>,
}

impl TaskEventPublisher {
    pub fn new(broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { broadcaster }
    }

    /// Sole entry point from the rest of the system into the fanout
    /// subsystem. Fire-and-forget: the returned report is informational
    /// and callers are free to ignore it.
    #[tracing::instrument(
        name = "publisher.on_task_committed",
        skip(self, task),
        fields(tenant_id = %tenant_id, kind = %kind)
    )]
    pub fn on_task_committed(
        &self,
        tenant_id: &str,
        task: serde_json::Value,
        kind: TaskEventKind,
    ) -> DeliveryReport {
        let event = TaskEvent::new(kind, tenant_id, task);
        let report = self.broadcaster.broadcast(&event);

        if report.dropped > 0 {
            tracing::warn!(
                delivered = report.delivered,
                dropped = report.dropped,
                "Some connections missed a task event"
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedIdentity;
    use crate::connections::{ConnectionHandle, ConnectionRegistry};
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_publish_reaches_tenant_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(EventBroadcaster::new(registry.clone()));
        let publisher = TaskEventPublisher::new(broadcaster);

        let (tx, mut rx) = mpsc::channel(8);
        let handle = Arc::new(ConnectionHandle::new(
            AuthenticatedIdentity {
                user_id: "alice".to_string(),
                tenant_id: "acme".to_string(),
                tenant_name: "Acme".to_string(),
            },
            tx,
        ));
        registry.register(handle).unwrap();

        let report = publisher.on_task_committed(
            "acme",
            json!({"id": 9, "title": "Ship it"}),
            TaskEventKind::Created,
        );
        assert_eq!(report.delivered, 1);

        let msg = rx.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "task_created");
        assert_eq!(json["message"], "New task created: Ship it");
    }

    #[test]
    fn test_publish_with_no_listeners_succeeds() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(EventBroadcaster::new(registry));
        let publisher = TaskEventPublisher::new(broadcaster);

        // Nothing connected: the mutation path still gets a clean return
        let report =
            publisher.on_task_committed("acme", json!({"id": 1}), TaskEventKind::Updated);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.dropped, 0);
    }
}
