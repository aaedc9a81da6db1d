//! Access/refresh token issuance and the server-side refresh registry.
//!
//! Access tokens are stateless. Every refresh token has a record at
//! `auth:rt:{userId}:{jti}` holding the SHA-256 hex of the signed token; a
//! refresh token is only honoured while its record exists and matches.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::AuthError;
use super::jwt;
use crate::cache::SecretCache;
use crate::ids::new_jti;
use crate::models::auth::{AccessClaims, IssuedToken, RefreshClaims, Role, TokenKind, User};

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Key holding the hash of one refresh token.
pub fn refresh_key(user_id: Uuid, jti: &str) -> String {
    format!("auth:rt:{user_id}:{jti}")
}

/// Prefix shared by every refresh record of a user.
pub fn refresh_prefix(user_id: Uuid) -> String {
    format!("auth:rt:{user_id}:")
}

/// SHA-256 hex digest of a token string.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Secrets and lifetimes for the two token classes.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_secret: "dev_access_secret".into(),
            refresh_secret: "dev_refresh_secret".into(),
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
        }
    }
}

#[derive(Clone)]
pub struct TokenService {
    cache: Arc<dyn SecretCache>,
    settings: TokenSettings,
}

impl TokenService {
    pub fn new(cache: Arc<dyn SecretCache>, settings: TokenSettings) -> Self {
        Self { cache, settings }
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.settings.refresh_ttl_secs
    }

    pub fn sign_access_token(&self, user: &User, roles: &[Role]) -> Result<IssuedToken, AuthError> {
        let now = Utc::now().timestamp();
        let jti = new_jti();
        let claims = AccessClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
            jti: jti.clone(),
            kind: TokenKind::Access,
            exp: now + self.settings.access_ttl_secs,
            iat: now,
        };
        let token = jwt::sign(&claims, self.settings.access_secret.as_bytes())?;
        Ok(IssuedToken {
            token,
            jti,
            expires_in: self.settings.access_ttl_secs,
        })
    }

    /// Sign a refresh token and record its hash in the cache.
    pub async fn sign_refresh_token(&self, user_id: Uuid) -> Result<IssuedToken, AuthError> {
        let now = Utc::now().timestamp();
        let jti = new_jti();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            kind: TokenKind::Refresh,
            exp: now + self.settings.refresh_ttl_secs,
            iat: now,
        };
        let token = jwt::sign(&claims, self.settings.refresh_secret.as_bytes())?;
        self.cache
            .set(
                &refresh_key(user_id, &jti),
                &hash_token(&token),
                self.settings.refresh_ttl_secs.max(0) as u64,
            )
            .await?;
        Ok(IssuedToken {
            token,
            jti,
            expires_in: self.settings.refresh_ttl_secs,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims: AccessClaims = jwt::verify(token, self.settings.access_secret.as_bytes())
            .ok_or_else(|| AuthError::TokenError("invalid access token".into()))?;
        if claims.kind != TokenKind::Access {
            debug!(jti = %claims.jti, "rejected token with wrong type");
            return Err(AuthError::TokenError("invalid access token".into()));
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims: RefreshClaims = jwt::verify(token, self.settings.refresh_secret.as_bytes())
            .ok_or_else(|| AuthError::TokenError("invalid refresh token".into()))?;
        if claims.kind != TokenKind::Refresh {
            debug!(jti = %claims.jti, "rejected token with wrong type");
            return Err(AuthError::TokenError("invalid refresh token".into()));
        }
        Ok(claims)
    }

    /// Whether the stored record for `jti` matches `token`.
    pub async fn compare_refresh(
        &self,
        user_id: Uuid,
        jti: &str,
        token: &str,
    ) -> Result<bool, AuthError> {
        let stored = self.cache.get(&refresh_key(user_id, jti)).await?;
        Ok(stored.is_some_and(|h| h == hash_token(token)))
    }

    /// Remove the record for `jti` and report whether it matched `token`.
    ///
    /// Read and delete happen in one step, so two concurrent presentations of
    /// the same token can never both succeed.
    pub async fn consume_refresh(
        &self,
        user_id: Uuid,
        jti: &str,
        token: &str,
    ) -> Result<bool, AuthError> {
        let stored = self.cache.take(&refresh_key(user_id, jti)).await?;
        Ok(stored.is_some_and(|h| h == hash_token(token)))
    }

    pub async fn delete_refresh(&self, user_id: Uuid, jti: &str) -> Result<(), AuthError> {
        self.cache.delete(&refresh_key(user_id, jti)).await?;
        Ok(())
    }

    /// Delete every refresh record of a user. Returns the count removed.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<usize, AuthError> {
        Ok(self.cache.delete_prefix(&refresh_prefix(user_id)).await?)
    }
}
