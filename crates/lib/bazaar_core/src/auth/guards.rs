//! Authorization rules behind the route guards.
//!
//! Kept free of HTTP types so the same decisions apply to REST routes and
//! socket events.

use uuid::Uuid;

use crate::models::auth::{AccessClaims, Role};
use crate::models::chat::ShopStaff;

pub fn is_admin(claims: &AccessClaims) -> bool {
    claims.has_role(Role::Admin)
}

/// Admit when nothing is required, the caller is ADMIN, or the caller holds
/// any of `required`.
pub fn role_admits(claims: &AccessClaims, required: &[Role]) -> bool {
    required.is_empty() || is_admin(claims) || required.iter().any(|r| claims.has_role(*r))
}

/// Pick the shop id from the route parameter, then the `x-shop-id` header,
/// then the query string. The first present value wins, even if malformed.
pub fn resolve_shop_id(
    param: Option<&str>,
    header: Option<&str>,
    query: Option<&str>,
) -> Option<Uuid> {
    param
        .or(header)
        .or(query)
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
}

/// Admit iff the membership grants every permission in `required`.
pub fn permissions_admit(membership: &ShopStaff, required: &[&str]) -> bool {
    required
        .iter()
        .all(|p| membership.permissions.iter().any(|held| held == p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::TokenKind;

    fn claims(roles: &[&str]) -> AccessClaims {
        AccessClaims {
            sub: Uuid::new_v4().to_string(),
            email: "a@x.com".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            jti: "j".into(),
            kind: TokenKind::Access,
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn empty_requirement_admits_everyone() {
        assert!(role_admits(&claims(&[]), &[]));
    }

    #[test]
    fn admin_bypasses_role_requirement() {
        assert!(role_admits(&claims(&["ADMIN"]), &[Role::ShopOwner]));
    }

    #[test]
    fn role_intersection_required() {
        let c = claims(&["CUSTOMER"]);
        assert!(role_admits(&c, &[Role::Customer, Role::ShopOwner]));
        assert!(!role_admits(&c, &[Role::ShopOwner]));
    }

    #[test]
    fn shop_id_prefers_param_then_header_then_query() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (a_s, b_s, c_s) = (a.to_string(), b.to_string(), c.to_string());
        assert_eq!(
            resolve_shop_id(Some(&a_s), Some(&b_s), Some(&c_s)),
            Some(a)
        );
        assert_eq!(resolve_shop_id(None, Some(&b_s), Some(&c_s)), Some(b));
        assert_eq!(resolve_shop_id(None, None, Some(&c_s)), Some(c));
        assert_eq!(resolve_shop_id(None, None, None), None);
        assert_eq!(resolve_shop_id(Some("nope"), Some(&b_s), None), None);
    }

    #[test]
    fn permissions_must_be_superset() {
        let staff = ShopStaff {
            shop_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "agent".into(),
            permissions: vec!["chat.read".into(), "chat.write".into()],
        };
        assert!(permissions_admit(&staff, &["chat.read"]));
        assert!(permissions_admit(&staff, &["chat.read", "chat.write"]));
        assert!(!permissions_admit(&staff, &["orders.read"]));
        assert!(permissions_admit(&staff, &[]));
    }
}
