//! Tenant-scoped fanout of task-mutation events.
//!
//! Backpressure policy: each connection's outbound channel is bounded, and
//! delivery uses a non-blocking `try_send`. When a connection's buffer is
//! full the newest event is dropped for that connection only; the
//! broadcaster never waits on any connection's I/O and never disconnects a
//! slow consumer itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;

use crate::connections::ConnectionRegistry;
use crate::events::TaskEvent;
use crate::metrics::BroadcastMetrics;
use crate::websocket::{OutboundMessage, ServerMessage};

/// Serializing once and sharing the bytes pays off past this many members
const PRESERIALIZATION_THRESHOLD: usize = 4;

/// Outcome of one broadcast call. Purely informational; a broadcast never
/// fails from the caller's point of view.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeliveryReport {
    /// Connections whose outbound buffer accepted the event
    pub delivered: usize,
    /// Connections skipped (full buffer or already closing)
    pub dropped: usize,
}

impl DeliveryReport {
    fn new(delivered: usize, dropped: usize) -> Self {
        Self { delivered, dropped }
    }
}

/// Counters for the broadcaster
#[derive(Debug, Default)]
pub struct BroadcasterStats {
    pub events_broadcast: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_dropped: AtomicU64,
}

impl BroadcasterStats {
    pub fn snapshot(&self) -> BroadcasterStatsSnapshot {
        BroadcasterStatsSnapshot {
            events_broadcast: self.events_broadcast.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_dropped: self.total_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcasterStatsSnapshot {
    pub events_broadcast: u64,
    pub total_delivered: u64,
    pub total_dropped: u64,
}

/// Delivers one event to every connection in the mutating tenant's group.
pub struct EventBroadcaster {
    registry: Arc<ConnectionRegistry>,
    stats: BroadcasterStats,
}

impl EventBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            stats: BroadcasterStats::default(),
        }
    }

    pub fn stats(&self) -> BroadcasterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Deliver `event` to every member of its tenant group at the moment
    /// of the call.
    ///
    /// Best-effort, at-most-once per connection: members that disconnect
    /// between the snapshot and delivery, or whose buffer is full, simply
    /// miss the event. Membership for other tenants is never touched.
    #[tracing::instrument(
        name = "fanout.broadcast",
        skip(self, event),
        fields(tenant_id = %event.tenant_id, kind = %event.kind)
    )]
    pub fn broadcast(&self, event: &TaskEvent) -> DeliveryReport {
        let members = self.registry.members_of(&event.tenant_id);

        self.stats.events_broadcast.fetch_add(1, Ordering::Relaxed);
        BroadcastMetrics::record_broadcast(event.kind.as_str());

        if members.is_empty() {
            tracing::debug!("No connections for tenant, event dropped");
            return DeliveryReport::new(0, 0);
        }

        let message = ServerMessage::from_event(event);
        let outbound = if members.len() >= PRESERIALIZATION_THRESHOLD {
            match OutboundMessage::preserialized(&message) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pre-serialize event, falling back to per-connection serialization");
                    OutboundMessage::Raw(message)
                }
            }
        } else {
            OutboundMessage::Raw(message)
        };

        let mut delivered = 0;
        let mut dropped = 0;

        for conn in &members {
            match conn.try_send(outbound.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    tracing::debug!(
                        connection_id = %conn.id,
                        user_id = %conn.user_id,
                        "Outbound buffer full, dropping event for connection"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    // Connection is mid-disconnect; the registry entry
                    // goes away when its pump finishes tearing down.
                    dropped += 1;
                }
            }
        }

        self.stats
            .total_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .total_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
        BroadcastMetrics::record_delivered(delivered as u64);
        BroadcastMetrics::record_dropped(dropped as u64);

        tracing::debug!(
            delivered = delivered,
            dropped = dropped,
            "Broadcast complete"
        );

        DeliveryReport::new(delivered, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedIdentity;
    use crate::connections::ConnectionHandle;
    use crate::events::TaskEventKind;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn connect(
        registry: &ConnectionRegistry,
        user_id: &str,
        tenant_id: &str,
        buffer: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        let identity = AuthenticatedIdentity {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            tenant_name: tenant_id.to_uppercase(),
        };
        let handle = Arc::new(ConnectionHandle::new(identity, tx));
        registry.register(handle.clone()).unwrap();
        (handle, rx)
    }

    fn event(kind: TaskEventKind, tenant_id: &str, title: &str) -> TaskEvent {
        TaskEvent::new(kind, tenant_id, json!({"id": 1, "title": title}))
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_tenant_members() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = EventBroadcaster::new(registry.clone());

        let (_h1, mut rx1) = connect(&registry, "alice", "acme", 8);
        let (_h2, mut rx2) = connect(&registry, "bob", "acme", 8);

        let report = broadcaster.broadcast(&event(TaskEventKind::Created, "acme", "Fix bug"));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 0);

        for rx in [&mut rx1, &mut rx2] {
            let msg = rx.recv().await.unwrap();
            let json: serde_json::Value =
                serde_json::from_str(&msg.to_json().unwrap()).unwrap();
            assert_eq!(json["type"], "task_created");
            assert_eq!(json["message"], "New task created: Fix bug");
        }
    }

    #[tokio::test]
    async fn test_broadcast_is_tenant_isolated() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = EventBroadcaster::new(registry.clone());

        let (_h1, mut acme_rx) = connect(&registry, "alice", "acme", 8);
        let (_h2, mut globex_rx) = connect(&registry, "carol", "globex", 8);

        let report = broadcaster.broadcast(&event(TaskEventKind::Created, "acme", "Fix bug"));
        assert_eq!(report.delivered, 1);

        assert!(acme_rx.recv().await.is_some());
        assert!(globex_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_preserves_order_per_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = EventBroadcaster::new(registry.clone());
        let (_h, mut rx) = connect(&registry, "alice", "acme", 8);

        broadcaster.broadcast(&event(TaskEventKind::Created, "acme", "first"));
        broadcaster.broadcast(&event(TaskEventKind::Updated, "acme", "second"));
        broadcaster.broadcast(&event(TaskEventKind::Updated, "acme", "third"));

        let titles: Vec<String> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .iter()
        .map(|m| {
            let json: serde_json::Value = serde_json::from_str(&m.to_json().unwrap()).unwrap();
            json["task"]["title"].as_str().unwrap().to_string()
        })
        .collect();

        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_newest_without_blocking() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = EventBroadcaster::new(registry.clone());
        // Buffer of one and nobody draining it
        let (_h, mut rx) = connect(&registry, "alice", "acme", 1);

        let first = broadcaster.broadcast(&event(TaskEventKind::Created, "acme", "kept"));
        let second = broadcaster.broadcast(&event(TaskEventKind::Updated, "acme", "dropped"));

        assert_eq!(first.delivered, 1);
        assert_eq!(second.delivered, 0);
        assert_eq!(second.dropped, 1);

        // Only the first event is in the buffer
        let msg = rx.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["task"]["title"], "kept");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_connection_counts_dropped_not_error() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = EventBroadcaster::new(registry.clone());
        let (_h, rx) = connect(&registry, "alice", "acme", 8);

        // Receiver gone but connection still registered: mid-disconnect
        drop(rx);
        let report = broadcaster.broadcast(&event(TaskEventKind::Updated, "acme", "missed"));

        assert_eq!(report.delivered, 0);
        assert_eq!(report.dropped, 1);
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_tenant_is_noop() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = EventBroadcaster::new(registry);

        let report = broadcaster.broadcast(&event(TaskEventKind::Created, "nobody", "x"));
        assert_eq!(report.delivered, 0);
        assert_eq!(report.dropped, 0);
    }

    #[tokio::test]
    async fn test_preserialized_fanout_payloads_match() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = EventBroadcaster::new(registry.clone());

        // Above the pre-serialization threshold
        let mut receivers = Vec::new();
        for i in 0..5 {
            let (_h, rx) = connect(&registry, &format!("user-{}", i), "acme", 8);
            receivers.push(rx);
        }

        broadcaster.broadcast(&event(TaskEventKind::Created, "acme", "Fix bug"));

        let mut payloads = Vec::new();
        for rx in &mut receivers {
            payloads.push(rx.recv().await.unwrap().to_json().unwrap());
        }
        assert!(payloads.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = EventBroadcaster::new(registry.clone());
        let (_h, _rx) = connect(&registry, "alice", "acme", 8);

        broadcaster.broadcast(&event(TaskEventKind::Created, "acme", "a"));
        broadcaster.broadcast(&event(TaskEventKind::Updated, "acme", "b"));

        let stats = broadcaster.stats();
        assert_eq!(stats.events_broadcast, 2);
        assert_eq!(stats.total_delivered, 2);
        assert_eq!(stats.total_dropped, 0);
    }
}
