//! Connection handle and related types

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::auth::AuthenticatedIdentity;
use crate::websocket::{OutboundMessage, ServerMessage};

/// Handle for a single authenticated WebSocket connection.
///
/// The connection's pump exclusively owns the receiving half of the
/// outbound channel; the registry and broadcaster only hold this handle
/// and push into the sender. The tenant association is fixed at
/// construction and never changes for the life of the connection.
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: String,
    pub tenant_id: String,
    pub tenant_name: String,
    pub sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
    /// Last inbound activity (Unix seconds) - AtomicI64 for lock-free updates
    last_activity: AtomicI64,
    closing: AtomicBool,
    close_notify: Notify,
}

impl ConnectionHandle {
    pub fn new(identity: AuthenticatedIdentity, sender: mpsc::Sender<OutboundMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: identity.user_id,
            tenant_id: identity.tenant_id,
            tenant_name: identity.tenant_name,
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            closing: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Ask the connection's pump to shut down. In-flight outbound
    /// messages are abandoned, not error-reported.
    pub fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.close_notify.notify_waiters();
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Resolves once [`close`](Self::close) has been called. Used by the
    /// pump as a cancellation branch.
    pub async fn closed(&self) {
        let notified = self.close_notify.notified();
        tokio::pin!(notified);
        // Register interest before checking the flag so a concurrent
        // close() cannot slip between the check and the await
        notified.as_mut().enable();
        if self.closing.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    /// Send a ServerMessage, waiting for buffer space. Used on the
    /// connection's own pump (acknowledgement, pong replies).
    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(OutboundMessage::Raw(message)).await
    }

    /// Non-blocking delivery used by the broadcaster: a full or closed
    /// buffer is the caller's signal to drop the event for this connection.
    pub fn try_send(
        &self,
        message: OutboundMessage,
    ) -> Result<(), mpsc::error::TrySendError<OutboundMessage>> {
        self.sender.try_send(message)
    }
}

/// Error returned when registering a connection fails.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("connection {connection_id} is already registered")]
    AlreadyRegistered { connection_id: Uuid },
}
