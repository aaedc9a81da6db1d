//! Admin-only handlers.

use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::error::AppResult;
use crate::extract::parse_id;
use crate::models::SuccessResponse;

/// `POST /v1/admin/users/{id}/sessions/revoke`: sign a user out everywhere.
pub async fn revoke_sessions_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<SuccessResponse>> {
    let user_id = parse_id(&id, "User")?;
    Ok(Json(state.auth.logout(user_id).await?))
}
