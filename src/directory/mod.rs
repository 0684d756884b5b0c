//! User and tenant directory collaborator.
//!
//! Token validation resolves the authenticated user's tenant association
//! through this seam. The shipped implementation is a static table loaded
//! from configuration; a deployment against a real identity store provides
//! its own `Directory` implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DirectoryConfig;

/// A user record as known to the identity collaborator.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: String,
    /// Tenant the user belongs to. Users without a tenant exist in the
    /// directory but can never hold a real-time connection.
    pub tenant_id: Option<String>,
}

/// A tenant record as known to the identity collaborator.
#[derive(Debug, Clone)]
pub struct TenantRecord {
    pub tenant_id: String,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only lookup of users and tenants.
///
/// Lookups may fail (the backing store can be unreachable) and may return
/// `None` (record deleted after token issuance); callers treat both as an
/// authentication rejection.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, DirectoryError>;

    async fn find_tenant(&self, tenant_id: &str) -> Result<Option<TenantRecord>, DirectoryError>;
}

/// Directory backed by static records from the configuration files.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    users: HashMap<String, UserRecord>,
    tenants: HashMap<String, TenantRecord>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        let mut directory = Self::new();
        for tenant in &config.tenants {
            directory.insert_tenant(TenantRecord {
                tenant_id: tenant.id.clone(),
                name: tenant.name.clone(),
            });
        }
        for user in &config.users {
            directory.insert_user(UserRecord {
                user_id: user.id.clone(),
                tenant_id: user.tenant_id.clone(),
            });
        }
        directory
    }

    pub fn insert_user(&mut self, user: UserRecord) {
        self.users.insert(user.user_id.clone(), user);
    }

    pub fn insert_tenant(&mut self, tenant: TenantRecord) {
        self.tenants.insert(tenant.tenant_id.clone(), tenant);
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self.users.get(user_id).cloned())
    }

    async fn find_tenant(&self, tenant_id: &str) -> Result<Option<TenantRecord>, DirectoryError> {
        Ok(self.tenants.get(tenant_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TenantEntry, UserEntry};

    #[tokio::test]
    async fn test_from_config() {
        let config = DirectoryConfig {
            users: vec![
                UserEntry {
                    id: "alice".to_string(),
                    tenant_id: Some("acme".to_string()),
                },
                UserEntry {
                    id: "drifter".to_string(),
                    tenant_id: None,
                },
            ],
            tenants: vec![TenantEntry {
                id: "acme".to_string(),
                name: "Acme".to_string(),
            }],
        };

        let directory = StaticDirectory::from_config(&config);
        assert_eq!(directory.user_count(), 2);
        assert_eq!(directory.tenant_count(), 1);

        let alice = directory.find_user("alice").await.unwrap().unwrap();
        assert_eq!(alice.tenant_id.as_deref(), Some("acme"));

        let drifter = directory.find_user("drifter").await.unwrap().unwrap();
        assert!(drifter.tenant_id.is_none());

        assert!(directory.find_user("nobody").await.unwrap().is_none());

        let acme = directory.find_tenant("acme").await.unwrap().unwrap();
        assert_eq!(acme.name, "Acme");
    }
}
