//! Per-route authorization gates.
//!
//! Each gate is a plain value handed to `from_fn_with_state` on the routes
//! it protects, and must sit inside `require_auth`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Query, RawPathParams, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use bazaar_core::auth::guards::{is_admin, permissions_admit, resolve_shop_id, role_admits};
use bazaar_core::models::auth::Role;
use bazaar_core::store::StaffDirectory;
use tracing::debug;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;

/// Header carrying the shop id when the route has none.
pub const SHOP_ID_HEADER: &str = "x-shop-id";

const SHOP_ID_PARAM: &str = "shopId";

fn authenticated(user: Option<&AuthenticatedUser>) -> Result<AuthenticatedUser, AppError> {
    user
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))
}

/// Admits callers holding any of `roles` (ADMIN always passes).
#[derive(Debug, Clone, Copy)]
pub struct RoleGate {
    pub roles: &'static [Role],
}

pub async fn require_roles(
    State(gate): State<RoleGate>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticated(request.extensions().get::<AuthenticatedUser>())?;
    if !role_admits(&user.0, gate.roles) {
        debug!(sub = %user.0.sub, "role gate refused");
        return Err(AppError::Forbidden("Insufficient role".into()));
    }
    Ok(next.run(request).await)
}

/// Admits staff of the addressed shop holding every one of `permissions`
/// (ADMIN always passes).
#[derive(Clone)]
pub struct PermissionGate {
    pub staff: Arc<dyn StaffDirectory>,
    pub permissions: &'static [&'static str],
}

pub async fn require_permissions(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();
    let user = authenticated(parts.extensions.get::<AuthenticatedUser>())?;

    if !is_admin(&user.0) {
        let param = RawPathParams::from_request_parts(&mut parts, &())
            .await
            .ok()
            .and_then(|params| {
                params
                    .iter()
                    .find(|(key, _)| *key == SHOP_ID_PARAM)
                    .map(|(_, value)| value.to_string())
            });
        let header = parts
            .headers
            .get(SHOP_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.get(SHOP_ID_PARAM).cloned());

        let shop_id = resolve_shop_id(param.as_deref(), header.as_deref(), query.as_deref())
            .ok_or_else(|| AppError::Forbidden("Shop context required".into()))?;
        let membership = gate
            .staff
            .find_membership(shop_id, user.user_id()?)
            .await?
            .ok_or_else(|| AppError::Forbidden("Not a member of this shop".into()))?;
        if !permissions_admit(&membership, gate.permissions) {
            debug!(sub = %user.0.sub, %shop_id, "permission gate refused");
            return Err(AppError::Forbidden("Insufficient permissions".into()));
        }
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}
