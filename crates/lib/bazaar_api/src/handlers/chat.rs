//! Chat request handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use bazaar_core::models::chat::{Conversation, Message};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppQuery, parse_id};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    PageQuery, ReadQuery, ReadResponse, SendMessageRequest, StartConversationRequest,
};
use crate::services::chat::{DEFAULT_CONVERSATION_LIMIT, DEFAULT_MESSAGE_LIMIT};

/// `POST /v1/chat/conversations`: open (or reuse) a conversation with a shop.
pub async fn start_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppJson(body): AppJson<StartConversationRequest>,
) -> AppResult<(StatusCode, Json<Conversation>)> {
    let conversation = state.chat.start(user.user_id()?, body.shop_id).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// `GET /v1/chat/conversations`: the caller's conversations as buyer.
pub async fn list_mine_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    AppQuery(page): AppQuery<PageQuery>,
) -> AppResult<Json<Vec<Conversation>>> {
    let (limit, offset) = page.resolve(DEFAULT_CONVERSATION_LIMIT);
    Ok(Json(
        state.chat.list_mine(user.user_id()?, limit, offset).await?,
    ))
}

/// `GET /v1/chat/shops/{shopId}/conversations`: requires `chat.read`.
pub async fn list_shop_handler(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
    AppQuery(page): AppQuery<PageQuery>,
) -> AppResult<Json<Vec<Conversation>>> {
    let shop_id = parse_id(&shop_id, "Shop")?;
    let (limit, offset) = page.resolve(DEFAULT_CONVERSATION_LIMIT);
    Ok(Json(state.chat.list_shop(shop_id, limit, offset).await?))
}

/// `GET /v1/chat/conversations/{id}/messages`
pub async fn list_messages_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    AppQuery(page): AppQuery<PageQuery>,
) -> AppResult<Json<Vec<Message>>> {
    let conversation_id = parse_id(&id, "Conversation")?;
    let (limit, offset) = page.resolve(DEFAULT_MESSAGE_LIMIT);
    Ok(Json(
        state
            .chat
            .list_messages(user.user_id()?, conversation_id, limit, offset)
            .await?,
    ))
}

/// `POST /v1/chat/conversations/{id}/messages`
pub async fn send_message_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    AppJson(body): AppJson<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let conversation_id = parse_id(&id, "Conversation")?;
    if body.body.is_empty() {
        return Err(AppError::Validation("body should not be empty".into()));
    }
    let message = state
        .chat
        .send_message(user.user_id()?, conversation_id, body.body, body.attachments)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// `POST /v1/chat/conversations/{id}/read?readUpToId=`
pub async fn mark_read_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    AppQuery(query): AppQuery<ReadQuery>,
) -> AppResult<Json<ReadResponse>> {
    let conversation_id = parse_id(&id, "Conversation")?;
    let updated = state
        .chat
        .mark_read(user.user_id()?, conversation_id, query.read_up_to_id)
        .await?;
    Ok(Json(ReadResponse { updated }))
}
