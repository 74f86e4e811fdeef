use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::message::{MAX_MESSAGE_LEN, Message},
    utils::{
        db_utils::placeholders,
        pagination::{Page, PageQuery, Paginated, PaginatedMessages},
    },
};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::ToSchema;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, is_read, created_at";

#[derive(Deserialize, ToSchema)]
pub struct SendMessageReq {
    #[schema(example = 7)]
    pub receiver_id: u64,
    #[schema(example = "Can you review the deck before noon?")]
    pub content: String,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Contact {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub designation: Option<String>,
    pub unread_count: i64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Trims and bounds-checks a message body.
fn clean_content(raw: &str) -> AppResult<&str> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(AppError::bad_request("Message cannot be empty"));
    }
    if content.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::bad_request(format!(
            "Message cannot exceed {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(content)
}

#[utoipa::path(
    post,
    path = "/api/chat/messages",
    request_body = SendMessageReq,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 400, description = "Empty or too long, or sent to self"),
        (status = 404, description = "Receiver not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Chat"
)]
pub async fn send_message(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SendMessageReq>,
) -> AppResult<HttpResponse> {
    if payload.receiver_id == auth.user_id {
        return Err(AppError::bad_request("You cannot message yourself"));
    }
    let content = clean_content(&payload.content)?;

    let receiver = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(payload.receiver_id)
        .fetch_one(pool.get_ref())
        .await?;
    if receiver == 0 {
        return Err(AppError::not_found("Receiver not found"));
    }

    let result = sqlx::query("INSERT INTO messages (sender_id, receiver_id, content) VALUES (?, ?, ?)")
        .bind(auth.user_id)
        .bind(payload.receiver_id)
        .bind(content)
        .execute(pool.get_ref())
        .await?;

    let message = sqlx::query_as::<_, Message>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"
    ))
    .bind(result.last_insert_id())
    .fetch_one(pool.get_ref())
    .await?;

    debug!(from = auth.user_id, to = payload.receiver_id, "Message sent");
    Ok(HttpResponse::Created().json(message))
}

/// Conversation with another user, newest first. Returned messages
/// addressed to the caller are marked read.
#[utoipa::path(
    get,
    path = "/api/chat/conversations/{user_id}",
    params(("user_id" = u64, Path, description = "The other participant"), PageQuery),
    responses((status = 200, description = "Conversation page", body = PaginatedMessages)),
    security(("bearer_auth" = [])),
    tag = "Chat"
)]
pub async fn conversation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<PageQuery>,
) -> AppResult<HttpResponse> {
    let other = path.into_inner();
    let me = auth.user_id;
    let page = Page::from(query.into_inner());

    let between = "(sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)";

    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM messages WHERE {between}"))
        .bind(me)
        .bind(other)
        .bind(other)
        .bind(me)
        .fetch_one(pool.get_ref())
        .await?;

    let mut messages = sqlx::query_as::<_, Message>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {between} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
    ))
    .bind(me)
    .bind(other)
    .bind(other)
    .bind(me)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool.get_ref())
    .await?;

    let unread: Vec<u64> = messages
        .iter()
        .filter(|m| m.receiver_id == me && !m.is_read)
        .map(|m| m.id)
        .collect();

    if !unread.is_empty() {
        let sql = format!(
            "UPDATE messages SET is_read = TRUE WHERE receiver_id = ? AND id IN ({})",
            placeholders(unread.len())
        );
        let mut update = sqlx::query(&sql).bind(me);
        for id in &unread {
            update = update.bind(*id);
        }
        update.execute(pool.get_ref()).await?;

        for m in messages.iter_mut().filter(|m| unread.contains(&m.id)) {
            m.is_read = true;
        }
    }

    Ok(HttpResponse::Ok().json(Paginated::new(messages, page, total)))
}

#[utoipa::path(
    get,
    path = "/api/chat/contacts",
    responses((status = 200, description = "Other active users with unread counts", body = [Contact])),
    security(("bearer_auth" = [])),
    tag = "Chat"
)]
pub async fn contacts(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let me = auth.user_id;

    let rows = sqlx::query_as::<_, Contact>(
        r#"
        SELECT u.id, u.name, u.email, u.designation,
               (SELECT COUNT(*) FROM messages m
                 WHERE m.sender_id = u.id AND m.receiver_id = ? AND m.is_read = FALSE) AS unread_count,
               (SELECT MAX(m.created_at) FROM messages m
                 WHERE (m.sender_id = u.id AND m.receiver_id = ?)
                    OR (m.sender_id = ? AND m.receiver_id = u.id)) AS last_message_at
        FROM users u
        WHERE u.id <> ? AND u.status = 'active'
        ORDER BY last_message_at IS NULL, last_message_at DESC, u.name
        "#,
    )
    .bind(me)
    .bind(me)
    .bind(me)
    .bind(me)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/chat/unread",
    responses((status = 200, description = "Total unread messages", body = Object, example = json!({"unread": 3}))),
    security(("bearer_auth" = [])),
    tag = "Chat"
)]
pub async fn unread_count(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let unread = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM messages WHERE receiver_id = ? AND is_read = FALSE",
    )
    .bind(auth.user_id)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "unread": unread })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed() {
        assert_eq!(clean_content("  hi there \n").unwrap(), "hi there");
    }

    #[test]
    fn content_bounds() {
        assert!(clean_content("   ").is_err());
        assert!(clean_content(&"a".repeat(MAX_MESSAGE_LEN)).is_ok());
        assert!(clean_content(&"a".repeat(MAX_MESSAGE_LEN + 1)).is_err());
        // counted in characters, not bytes
        assert!(clean_content(&"é".repeat(MAX_MESSAGE_LEN)).is_ok());
    }
}
