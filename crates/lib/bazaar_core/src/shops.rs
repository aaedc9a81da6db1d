//! Shop staff membership queries.
//!
//! Shops themselves are managed elsewhere; the core reads membership rows to
//! authorize sellers and permission-gated routes.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::chat::ShopStaff;
use crate::store::StoreError;

/// Look up a user's membership in a shop.
pub async fn find_membership(
    pool: &PgPool,
    shop_id: Uuid,
    user_id: Uuid,
) -> Result<Option<ShopStaff>, StoreError> {
    let row = sqlx::query_as::<_, (Uuid, Uuid, String, Vec<String>)>(
        "SELECT shop_id, user_id, role, permissions FROM shop_staff \
         WHERE shop_id = $1 AND user_id = $2",
    )
    .bind(shop_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(shop_id, user_id, role, permissions)| ShopStaff {
        shop_id,
        user_id,
        role,
        permissions,
    }))
}

/// Insert or replace a staff membership.
pub async fn add_staff(pool: &PgPool, staff: &ShopStaff) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO shop_staff (shop_id, user_id, role, permissions) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (shop_id, user_id) DO UPDATE SET role = EXCLUDED.role, \
         permissions = EXCLUDED.permissions",
    )
    .bind(staff.shop_id)
    .bind(staff.user_id)
    .bind(&staff.role)
    .bind(&staff.permissions)
    .execute(pool)
    .await?;
    Ok(())
}
