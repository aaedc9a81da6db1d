//! Authentication request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::CookieJar;
use bazaar_core::models::auth::User;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ForgotRequest, LoginRequest, RefreshRequest, RegisterRequest, RegisterResponse, ResetRequest,
    SessionResponse, SuccessResponse, VerifyEmailRequest,
};
use crate::services::cookies::{REFRESH_COOKIE, clear_refresh_cookie, refresh_cookie};

fn with_refresh_cookie(state: &AppState, jar: CookieJar, token: &str) -> CookieJar {
    jar.add(refresh_cookie(
        token,
        state.config.refresh_ttl_secs,
        state.config.production,
    ))
}

/// `POST /v1/auth/register`: create an account and open a session.
pub async fn register_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(body): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<RegisterResponse>)> {
    let resp = state
        .auth
        .register(&body.email, &body.password, body.name.as_deref())
        .await?;
    let jar = with_refresh_cookie(&state, jar, &resp.tokens.refresh_token);
    Ok((StatusCode::CREATED, jar, Json(resp)))
}

/// `POST /v1/auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let resp = state.auth.login(&body.email, &body.password).await?;
    let jar = with_refresh_cookie(&state, jar, &resp.tokens.refresh_token);
    Ok((jar, Json(resp)))
}

/// `POST /v1/auth/refresh`: rotate the refresh token from the body or the
/// `refresh_token` cookie. The body may be empty.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let request: RefreshRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RefreshRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::Unprocessable(e.to_string()))?
    };
    let presented = request
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()));

    let resp = state.auth.refresh(presented.as_deref()).await?;
    let jar = with_refresh_cookie(&state, jar, &resp.tokens.refresh_token);
    Ok((jar, Json(resp)))
}

/// `POST /v1/auth/logout`: revoke every refresh token of the caller.
pub async fn logout_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<SuccessResponse>)> {
    let resp = state.auth.logout(user.user_id()?).await?;
    let jar = jar.add(clear_refresh_cookie(state.config.production));
    Ok((jar, Json(resp)))
}

/// `POST /v1/auth/forgot`: issue a password reset token.
pub async fn forgot_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<ForgotRequest>,
) -> AppResult<Json<SuccessResponse>> {
    Ok(Json(state.auth.forgot(&body.email).await?))
}

/// `POST /v1/auth/reset`: set a new password with a reset token.
pub async fn reset_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<ResetRequest>,
) -> AppResult<Json<SuccessResponse>> {
    Ok(Json(state.auth.reset(&body.token, &body.password).await?))
}

/// `POST /v1/auth/verify`: confirm an email address.
pub async fn verify_handler(
    State(state): State<AppState>,
    AppJson(body): AppJson<VerifyEmailRequest>,
) -> AppResult<Json<SuccessResponse>> {
    Ok(Json(state.auth.verify_email(&body.token).await?))
}

/// `GET /v1/auth/me`: the caller's profile.
pub async fn me_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<User>> {
    Ok(Json(state.auth.me(user.user_id()?).await?))
}
