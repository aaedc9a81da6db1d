//! Refresh-token cookie.
//!
//! httpOnly, path `/`. Production adds `Secure` and tightens SameSite to
//! `Strict`.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

fn same_site(production: bool) -> SameSite {
    if production {
        SameSite::Strict
    } else {
        SameSite::Lax
    }
}

/// Build the refresh cookie, living as long as the token.
pub fn refresh_cookie(token: &str, max_age_secs: i64, production: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(production)
        .same_site(same_site(production))
        .path("/".to_string())
        .max_age(Duration::seconds(max_age_secs))
        .build()
}

/// Build an expired cookie to clear the refresh token.
pub fn clear_refresh_cookie(production: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE.to_string(), String::new()))
        .http_only(true)
        .secure(production)
        .same_site(same_site(production))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}
