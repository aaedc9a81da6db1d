//! Authentication service: registration, login, refresh rotation, logout,
//! password reset and email verification.

use std::sync::Arc;

use bazaar_core::auth::password::{hash_password, verify_password};
use bazaar_core::auth::tokens::TokenService;
use bazaar_core::cache::SecretCache;
use bazaar_core::ids::new_one_time_token;
use bazaar_core::models::auth::{NewUser, Role, User, UserStatus};
use bazaar_core::store::CredentialStore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{RegisterResponse, SessionResponse, SuccessResponse, Tokens};

/// Password reset token lifetime: 15 minutes.
const RESET_TTL_SECS: u64 = 15 * 60;

/// Email verification token lifetime: 24 hours.
const VERIFY_TTL_SECS: u64 = 24 * 60 * 60;

const MIN_PASSWORD_LEN: usize = 8;

fn reset_key(token: &str) -> String {
    format!("auth:fp:{token}")
}

fn verify_key(token: &str) -> String {
    format!("auth:verify:{token}")
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain.
fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation("email must be an email".into()))
    }
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be longer than or equal to {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".into())
}

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    cache: Arc<dyn SecretCache>,
    tokens: TokenService,
    /// Echo one-time tokens in responses when false.
    production: bool,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        cache: Arc<dyn SecretCache>,
        tokens: TokenService,
        production: bool,
    ) -> Self {
        Self {
            credentials,
            cache,
            tokens,
            production,
        }
    }

    /// Sign a fresh access/refresh pair for `user`.
    async fn issue_tokens(&self, user: &User) -> AppResult<Tokens> {
        let roles = self.credentials.user_roles(user.id).await?;
        let access = self.tokens.sign_access_token(user, &roles)?;
        let refresh = self.tokens.sign_refresh_token(user.id).await?;
        Ok(Tokens {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: access.expires_in,
        })
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> AppResult<RegisterResponse> {
        validate_email(email)?;
        validate_password(password)?;

        if self.credentials.find_user_by_email(email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".into()));
        }

        let password_hash = hash_password(password)?;
        let created = self
            .credentials
            .create_user(NewUser {
                email,
                name,
                password_hash: Some(&password_hash),
                status: UserStatus::Unverified,
            })
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict("Email already registered".into()),
                other => other,
            })?;
        let user = created.user;

        let tokens = self.issue_tokens(&user).await?;

        let verify_token = new_one_time_token();
        self.cache
            .set(&verify_key(&verify_token), &user.id.to_string(), VERIFY_TTL_SECS)
            .await?;

        info!(user_id = %user.id, "user registered");
        Ok(RegisterResponse {
            user,
            tokens,
            verify_token: (!self.production).then_some(verify_token),
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<SessionResponse> {
        let record = self
            .credentials
            .find_user_by_email(email)
            .await?
            .ok_or_else(invalid_credentials)?;
        let hash = record
            .password_hash
            .as_deref()
            .ok_or_else(invalid_credentials)?;
        if !verify_password(password, hash) {
            return Err(invalid_credentials());
        }

        let tokens = self.issue_tokens(&record.user).await?;
        debug!(user_id = %record.user.id, "login");
        Ok(SessionResponse {
            user: record.user,
            tokens,
        })
    }

    /// Rotate a refresh token. A verified token whose record is gone has
    /// already been used: every session of the subject is revoked.
    pub async fn refresh(&self, presented: Option<&str>) -> AppResult<SessionResponse> {
        let raw = presented
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing refresh token".into()))?;

        let claims = self.tokens.verify_refresh(raw)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid refresh token".into()))?;

        if !self.tokens.consume_refresh(user_id, &claims.jti, raw).await? {
            let revoked = self.tokens.revoke_all(user_id).await?;
            warn!(%user_id, jti = %claims.jti, revoked, "refresh token reuse detected");
            return Err(AppError::Unauthorized("Refresh token reuse detected".into()));
        }

        let record = self
            .credentials
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

        let tokens = self.issue_tokens(&record.user).await?;
        Ok(SessionResponse {
            user: record.user,
            tokens,
        })
    }

    /// Revoke every refresh token of `user_id`. Outstanding access tokens
    /// stay valid until they expire.
    pub async fn logout(&self, user_id: Uuid) -> AppResult<SuccessResponse> {
        let revoked = self.tokens.revoke_all(user_id).await?;
        info!(%user_id, revoked, "sessions revoked");
        Ok(SuccessResponse::ok())
    }

    /// Never reveals whether the email is registered.
    pub async fn forgot(&self, email: &str) -> AppResult<SuccessResponse> {
        let Some(record) = self.credentials.find_user_by_email(email).await? else {
            return Ok(SuccessResponse::ok());
        };
        let token = new_one_time_token();
        self.cache
            .set(&reset_key(&token), &record.user.id.to_string(), RESET_TTL_SECS)
            .await?;
        debug!(user_id = %record.user.id, "password reset requested");
        Ok(SuccessResponse {
            success: true,
            token: (!self.production).then_some(token),
        })
    }

    pub async fn reset(&self, token: &str, password: &str) -> AppResult<SuccessResponse> {
        validate_password(password)?;
        let user_id = self
            .take_one_time(&reset_key(token))
            .await?
            .ok_or_else(|| AppError::Validation("Invalid or expired token".into()))?;

        let password_hash = hash_password(password)?;
        self.credentials
            .update_password(user_id, &password_hash)
            .await?;
        let revoked = self.tokens.revoke_all(user_id).await?;
        info!(%user_id, revoked, "password reset");
        Ok(SuccessResponse::ok())
    }

    pub async fn verify_email(&self, token: &str) -> AppResult<SuccessResponse> {
        let user_id = self
            .take_one_time(&verify_key(token))
            .await?
            .ok_or_else(|| AppError::Validation("Invalid or expired token".into()))?;
        self.credentials.mark_verified(user_id).await?;
        info!(%user_id, "email verified");
        Ok(SuccessResponse::ok())
    }

    pub async fn me(&self, user_id: Uuid) -> AppResult<User> {
        self.credentials
            .find_user_by_id(user_id)
            .await?
            .map(|r| r.user)
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    /// Ensure a verified ADMIN account exists for `email`.
    pub async fn seed_admin(&self, email: &str, password: &str) -> AppResult<User> {
        validate_email(email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;
        let user = match self.credentials.find_user_by_email(email).await? {
            Some(record) => {
                self.credentials
                    .update_password(record.user.id, &password_hash)
                    .await?;
                self.credentials.mark_verified(record.user.id).await?;
                record.user
            }
            None => {
                self.credentials
                    .create_user(NewUser {
                        email,
                        name: Some("Admin"),
                        password_hash: Some(&password_hash),
                        status: UserStatus::Verified,
                    })
                    .await?
                    .user
            }
        };
        self.credentials.grant_role(user.id, Role::Admin).await?;
        info!(user_id = %user.id, "admin account seeded");
        Ok(user)
    }

    /// Consume a one-time token and parse the user id it maps to.
    async fn take_one_time(&self, key: &str) -> AppResult<Option<Uuid>> {
        Ok(self
            .cache
            .take(key)
            .await?
            .and_then(|raw| Uuid::parse_str(&raw).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("a.b+c@shop.co.th").is_ok());
        assert!(validate_email("nope").is_err());
        assert!(validate_email("@x.com").is_err());
        assert!(validate_email("a@x").is_err());
        assert!(validate_email("a@@x.com").is_err());
        assert!(validate_email("a b@x.com").is_err());
    }

    #[test]
    fn password_length() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
    }
}
