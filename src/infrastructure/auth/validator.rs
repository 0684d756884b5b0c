use std::sync::Arc;

use thiserror::Error;

use crate::config::JwtConfig;
use crate::directory::Directory;

use super::JwtValidator;

/// Why a bearer token was rejected.
///
/// Every variant closes the handshake the same way (unauthorized close
/// code, no registration, no acknowledgement); the distinction exists for
/// diagnostics.
#[derive(Debug, Error)]
pub enum AuthRejection {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    Expired,

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("user {0} has no tenant association")]
    NoTenant(String),

    #[error("directory lookup failed: {0}")]
    Directory(String),
}

/// A fully resolved identity: the only principal shape that flows past
/// the handshake. There is no anonymous placeholder.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub user_id: String,
    pub tenant_id: String,
    pub tenant_name: String,
}

/// Validates a bearer token into an [`AuthenticatedIdentity`].
///
/// Verification is two steps: JWT decode/verify, then a directory lookup
/// to resolve the user's tenant. A user deleted after token issuance, or
/// one without a tenant, is rejected.
pub struct TokenValidator {
    jwt: JwtValidator,
    directory: Arc<dyn Directory>,
}

impl TokenValidator {
    pub fn new(config: &JwtConfig, directory: Arc<dyn Directory>) -> Self {
        Self {
            jwt: JwtValidator::new(config),
            directory,
        }
    }

    pub async fn validate(&self, token: &str) -> Result<AuthenticatedIdentity, AuthRejection> {
        let claims = self.jwt.validate(token)?;

        let user = self
            .directory
            .find_user(&claims.sub)
            .await
            .map_err(|e| AuthRejection::Directory(e.to_string()))?
            .ok_or_else(|| AuthRejection::UnknownUser(claims.sub.clone()))?;

        let tenant_id = user
            .tenant_id
            .ok_or_else(|| AuthRejection::NoTenant(claims.sub.clone()))?;

        let tenant = self
            .directory
            .find_tenant(&tenant_id)
            .await
            .map_err(|e| AuthRejection::Directory(e.to_string()))?
            .ok_or_else(|| AuthRejection::NoTenant(claims.sub.clone()))?;

        Ok(AuthenticatedIdentity {
            user_id: claims.sub,
            tenant_id,
            tenant_name: tenant.name,
        })
    }
}
