use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::{ConnectionHandle, RegistryError};

/// In-process table of live connections, grouped by tenant.
///
/// The only state mutated from multiple contexts: connection pumps
/// register/unregister, the broadcaster snapshots memberships, the idle
/// sweeper unregisters. Each operation is individually atomic and none
/// holds a map shard across an await point.
pub struct ConnectionRegistry {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// tenant_id -> Set<connection_id>
    tenant_index: DashMap<String, HashSet<Uuid>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            tenant_index: DashMap::new(),
        }
    }

    /// Register a connection under its tenant group.
    ///
    /// A connection id can be registered at most once for its lifetime;
    /// re-registration is rejected so a connection can never end up in
    /// two groups.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Result<(), RegistryError> {
        let connection_id = handle.id;

        match self.connections.entry(connection_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RegistryError::AlreadyRegistered { connection_id });
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(handle.clone());
            }
        }

        self.tenant_index
            .entry(handle.tenant_id.clone())
            .or_default()
            .insert(connection_id);

        tracing::info!(
            connection_id = %connection_id,
            user_id = %handle.user_id,
            tenant_id = %handle.tenant_id,
            "Connection registered"
        );

        Ok(())
    }

    /// Remove a connection from its tenant group.
    ///
    /// No-op if the connection was already removed; disconnect paths race
    /// with the idle sweeper and both may call this.
    pub fn unregister(&self, connection_id: Uuid) {
        if let Some((_, handle)) = self.connections.remove(&connection_id) {
            if let Some(mut members) = self.tenant_index.get_mut(&handle.tenant_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    drop(members);
                    self.tenant_index
                        .remove_if(&handle.tenant_id, |_, m| m.is_empty());
                }
            }

            tracing::info!(
                connection_id = %connection_id,
                user_id = %handle.user_id,
                tenant_id = %handle.tenant_id,
                "Connection unregistered"
            );
        }
    }

    /// Snapshot of the connections currently in a tenant's group.
    ///
    /// An unknown tenant yields an empty snapshot. The registry keeps
    /// mutating after this returns; the snapshot is only "members at the
    /// moment of the call".
    pub fn members_of(&self, tenant_id: &str) -> Vec<Arc<ConnectionHandle>> {
        self.tenant_index
            .get(tenant_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get connection by ID
    pub fn get_connection(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// Get statistics
    pub fn stats(&self) -> RegistryStats {
        let mut tenant_counts = std::collections::HashMap::new();
        for entry in self.tenant_index.iter() {
            tenant_counts.insert(entry.key().clone(), entry.value().len());
        }

        RegistryStats {
            total_connections: self.connections.len(),
            tenants: tenant_counts,
        }
    }

    /// Find connections with no inbound activity for longer than the timeout
    pub fn find_idle_connections(&self, timeout_secs: u64) -> Vec<Uuid> {
        let now = chrono::Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Close and unregister all connections. Each pump observes the close
    /// signal and tears its socket down.
    pub fn drain(&self) -> usize {
        let ids: Vec<Uuid> = self.connections.iter().map(|e| *e.key()).collect();
        let count = ids.len();
        for id in ids {
            if let Some(handle) = self.get_connection(id) {
                handle.close();
            }
            self.unregister(id);
        }
        count
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub tenants: std::collections::HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedIdentity;
    use crate::websocket::OutboundMessage;
    use tokio::sync::mpsc;

    fn test_handle(user_id: &str, tenant_id: &str) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let identity = AuthenticatedIdentity {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            tenant_name: tenant_id.to_uppercase(),
        };
        (Arc::new(ConnectionHandle::new(identity, tx)), rx)
    }

    #[test]
    fn test_register_adds_to_tenant_group() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = test_handle("alice", "acme");

        registry.register(handle.clone()).unwrap();

        let members = registry.members_of("acme");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, handle.id);
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = test_handle("alice", "acme");

        registry.register(handle.clone()).unwrap();
        let result = registry.register(handle.clone());

        assert!(matches!(
            result,
            Err(RegistryError::AlreadyRegistered { .. })
        ));
        // Still in exactly one group
        assert_eq!(registry.members_of("acme").len(), 1);
        assert_eq!(registry.stats().total_connections, 1);
    }

    #[test]
    fn test_unregister_removes_membership() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = test_handle("alice", "acme");
        registry.register(handle.clone()).unwrap();

        registry.unregister(handle.id);

        assert!(registry.members_of("acme").is_empty());
        assert!(registry.get_connection(handle.id).is_none());
        // Empty group is dropped from the index
        assert!(registry.stats().tenants.is_empty());
    }

    #[test]
    fn test_unregister_twice_is_noop() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = test_handle("alice", "acme");
        registry.register(handle.clone()).unwrap();

        registry.unregister(handle.id);
        registry.unregister(handle.id);

        assert_eq!(registry.stats().total_connections, 0);
    }

    #[test]
    fn test_members_of_unknown_tenant_is_empty() {
        let registry = ConnectionRegistry::new();
        assert!(registry.members_of("nobody").is_empty());
    }

    #[test]
    fn test_groups_are_tenant_scoped() {
        let registry = ConnectionRegistry::new();
        let (acme1, _rx1) = test_handle("alice", "acme");
        let (acme2, _rx2) = test_handle("bob", "acme");
        let (globex, _rx3) = test_handle("carol", "globex");

        registry.register(acme1.clone()).unwrap();
        registry.register(acme2.clone()).unwrap();
        registry.register(globex.clone()).unwrap();

        assert_eq!(registry.members_of("acme").len(), 2);
        assert_eq!(registry.members_of("globex").len(), 1);

        let stats = registry.stats();
        assert_eq!(stats.total_connections, 3);
        assert_eq!(stats.tenants.get("acme"), Some(&2));
        assert_eq!(stats.tenants.get("globex"), Some(&1));
    }

    #[test]
    fn test_drain_unregisters_everything() {
        let registry = ConnectionRegistry::new();
        let (h1, _rx1) = test_handle("alice", "acme");
        let (h2, _rx2) = test_handle("carol", "globex");
        registry.register(h1).unwrap();
        registry.register(h2).unwrap();

        assert_eq!(registry.drain(), 2);
        assert_eq!(registry.stats().total_connections, 0);
    }

    #[test]
    fn test_find_idle_connections() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = test_handle("alice", "acme");
        registry.register(handle.clone()).unwrap();

        // A fresh connection is well inside any reasonable timeout
        assert!(registry.find_idle_connections(3600).is_empty());
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let (handle, _rx) = test_handle("alice", "acme");

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.closed().await })
        };

        handle.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve after close()")
            .unwrap();
        assert!(handle.is_closing());
    }

    #[tokio::test]
    async fn test_closed_resolves_immediately_after_close() {
        let (handle, _rx) = test_handle("alice", "acme");
        handle.close();
        // Must not hang even though close() happened before the wait
        handle.closed().await;
    }
}
