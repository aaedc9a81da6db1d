//! Auth-related database queries.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::auth::{NewUser, Role, User, UserWithPassword};
use crate::store::StoreError;

/// Row shape shared by the user lookups.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    password_hash: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserWithPassword {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserWithPassword {
            user: User {
                id: row.id,
                email: row.email,
                name: row.name,
                status: row.status.parse()?,
                created_at: row.created_at,
            },
            password_hash: row.password_hash,
        })
    }
}

const USER_COLUMNS: &str = "id, email, name, password_hash, status, created_at";

/// Fetch a user by email.
pub async fn find_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserWithPassword>, StoreError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    row.map(UserWithPassword::try_from).transpose()
}

/// Fetch a user by id.
pub async fn find_user_by_id(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserWithPassword>, StoreError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    row.map(UserWithPassword::try_from).transpose()
}

/// Create a new user with the CUSTOMER role in one transaction.
///
/// A duplicate email surfaces as `StoreError::Conflict` via the unique index.
pub async fn create_user(
    pool: &PgPool,
    new_user: NewUser<'_>,
) -> Result<UserWithPassword, StoreError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (email, name, password_hash, status) VALUES ($1, $2, $3, $4) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(new_user.email)
    .bind(new_user.name)
    .bind(new_user.password_hash)
    .bind(new_user.status.as_str())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO user_roles (user_id, role_id) \
         SELECT $1, id FROM roles WHERE name = $2 ON CONFLICT DO NOTHING",
    )
    .bind(row.id)
    .bind(Role::Customer.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    UserWithPassword::try_from(row)
}

/// Fetch role names for a user.
pub async fn get_user_roles(pool: &PgPool, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT r.name FROM user_roles ur JOIN roles r ON r.id = ur.role_id \
         WHERE ur.user_id = $1 ORDER BY r.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    names
        .iter()
        .map(|n| n.parse::<Role>().map_err(StoreError::from))
        .collect()
}

/// Grant a role to a user. Granting an already-held role is a no-op.
pub async fn grant_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO user_roles (user_id, role_id) \
         SELECT $1, id FROM roles WHERE name = $2 ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(role.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace a user's password hash.
pub async fn update_password(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<(), StoreError> {
    let result =
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(pool)
            .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("user {user_id}")));
    }
    Ok(())
}

/// Mark a user's email as verified.
pub async fn mark_verified(pool: &PgPool, user_id: Uuid) -> Result<(), StoreError> {
    let result =
        sqlx::query("UPDATE users SET status = 'VERIFIED', updated_at = now() WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("user {user_id}")));
    }
    Ok(())
}
