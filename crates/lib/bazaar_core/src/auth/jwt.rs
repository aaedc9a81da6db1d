//! HS256 signing and verification.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::AuthError;

/// Sign `claims` with `secret`.
pub fn sign<C: Serialize>(claims: &C, secret: &[u8]) -> Result<String, AuthError> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret))
        .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
}

/// Verify signature and expiry, returning the claims.
///
/// No leeway: a token is rejected from the second its `exp` passes.
pub fn verify<C: DeserializeOwned>(token: &str, secret: &[u8]) -> Option<C> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;
    decode::<C>(token, &key, &validation)
        .ok()
        .map(|data| data.claims)
}
