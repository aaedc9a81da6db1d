//! Conversation and message persistence.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::ids::uuidv7;
use crate::models::chat::{Conversation, Message, MessageRole, NewMessage};
use crate::store::StoreError;

/// Row returned by conversation queries.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ConversationRow {
    id: Uuid,
    buyer_user_id: Uuid,
    shop_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = StoreError;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: row.id,
            buyer_user_id: row.buyer_user_id,
            shop_id: row.shop_id,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Row returned by message queries.
#[derive(Debug, Clone, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_user_id: Uuid,
    role: String,
    body: String,
    attachments: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_user_id: row.sender_user_id,
            role: row.role.parse()?,
            body: row.body,
            attachments: row.attachments,
            created_at: row.created_at,
            read_at: row.read_at,
        })
    }
}

fn conversations(rows: Vec<ConversationRow>) -> Result<Vec<Conversation>, StoreError> {
    rows.into_iter().map(Conversation::try_from).collect()
}

fn messages(rows: Vec<MessageRow>) -> Result<Vec<Message>, StoreError> {
    rows.into_iter().map(Message::try_from).collect()
}

/// Find the open conversation for a (buyer, shop) pair.
pub async fn find_open_conversation(
    pool: &PgPool,
    buyer_user_id: Uuid,
    shop_id: Uuid,
) -> Result<Option<Conversation>, StoreError> {
    let row = sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT id, buyer_user_id, shop_id, status, created_at, updated_at
        FROM conversations
        WHERE buyer_user_id = $1 AND shop_id = $2 AND status = 'OPEN'
        "#,
    )
    .bind(buyer_user_id)
    .bind(shop_id)
    .fetch_optional(pool)
    .await?;
    row.map(Conversation::try_from).transpose()
}

/// Create an open conversation. A concurrent insert for the same pair loses
/// against the partial unique index and returns the winner's row instead.
pub async fn create_conversation(
    pool: &PgPool,
    buyer_user_id: Uuid,
    shop_id: Uuid,
) -> Result<Conversation, StoreError> {
    let inserted = sqlx::query_as::<_, ConversationRow>(
        r#"
        INSERT INTO conversations (id, buyer_user_id, shop_id, status)
        VALUES ($1, $2, $3, 'OPEN')
        ON CONFLICT (buyer_user_id, shop_id) WHERE status = 'OPEN' DO NOTHING
        RETURNING id, buyer_user_id, shop_id, status, created_at, updated_at
        "#,
    )
    .bind(uuidv7())
    .bind(buyer_user_id)
    .bind(shop_id)
    .fetch_optional(pool)
    .await?;

    match inserted {
        Some(row) => Conversation::try_from(row),
        None => find_open_conversation(pool, buyer_user_id, shop_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("open conversation".into())),
    }
}

/// Get a conversation by id.
pub async fn get_conversation(
    pool: &PgPool,
    conversation_id: Uuid,
) -> Result<Option<Conversation>, StoreError> {
    let row = sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT id, buyer_user_id, shop_id, status, created_at, updated_at
        FROM conversations
        WHERE id = $1
        "#,
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;
    row.map(Conversation::try_from).transpose()
}

/// List a buyer's conversations, most recently updated first.
pub async fn list_buyer_conversations(
    pool: &PgPool,
    buyer_user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Conversation>, StoreError> {
    let rows = sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT id, buyer_user_id, shop_id, status, created_at, updated_at
        FROM conversations
        WHERE buyer_user_id = $1
        ORDER BY updated_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(buyer_user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    conversations(rows)
}

/// List a shop's conversations, most recently updated first.
pub async fn list_shop_conversations(
    pool: &PgPool,
    shop_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Conversation>, StoreError> {
    let rows = sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT id, buyer_user_id, shop_id, status, created_at, updated_at
        FROM conversations
        WHERE shop_id = $1
        ORDER BY updated_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(shop_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    conversations(rows)
}

/// Insert a message and touch the conversation in one transaction.
pub async fn insert_message(pool: &PgPool, message: NewMessage) -> Result<Message, StoreError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO messages (id, conversation_id, sender_user_id, role, body, attachments)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, conversation_id, sender_user_id, role, body, attachments, created_at, read_at
        "#,
    )
    .bind(uuidv7())
    .bind(message.conversation_id)
    .bind(message.sender_user_id)
    .bind(message.role.as_str())
    .bind(&message.body)
    .bind(&message.attachments)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE conversations SET updated_at = now() WHERE id = $1")
        .bind(message.conversation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Message::try_from(row)
}

/// Get a single message by id.
pub async fn get_message(pool: &PgPool, message_id: Uuid) -> Result<Option<Message>, StoreError> {
    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT id, conversation_id, sender_user_id, role, body, attachments, created_at, read_at
        FROM messages
        WHERE id = $1
        "#,
    )
    .bind(message_id)
    .fetch_optional(pool)
    .await?;
    row.map(Message::try_from).transpose()
}

/// Page through a conversation's messages, oldest first.
pub async fn list_messages(
    pool: &PgPool,
    conversation_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Message>, StoreError> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT id, conversation_id, sender_user_id, role, body, attachments, created_at, read_at
        FROM messages
        WHERE conversation_id = $1
        ORDER BY created_at ASC, id ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(conversation_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    messages(rows)
}

/// The newest `limit` messages, returned oldest first.
pub async fn recent_messages(
    pool: &PgPool,
    conversation_id: Uuid,
    limit: i64,
) -> Result<Vec<Message>, StoreError> {
    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT * FROM (
            SELECT id, conversation_id, sender_user_id, role, body, attachments, created_at, read_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
        ) recent
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(conversation_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    messages(rows)
}

/// Bulk-mark unread messages from `sender_role` as read.
pub async fn mark_read(
    pool: &PgPool,
    conversation_id: Uuid,
    sender_role: MessageRole,
    up_to: Option<DateTime<Utc>>,
    read_at: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET read_at = $1
        WHERE conversation_id = $2
          AND role = $3
          AND read_at IS NULL
          AND ($4::timestamptz IS NULL OR created_at <= $4)
        "#,
    )
    .bind(read_at)
    .bind(conversation_id)
    .bind(sender_role.as_str())
    .bind(up_to)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
