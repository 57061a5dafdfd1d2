use axum::{debug_handler, extract::{Path, State}, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;

use crate::{render_markdown, AppError, AppResult, AppState, Payload};

pub const ANONYMOUS: &str = "Anonymous";

/// A validated message that has not been stamped yet. Both the live channel
/// and `POST /chat/save` go through [`Draft::new`], so they accept the same input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub room: String,
    pub sender: String,
    pub body: String,
}

impl Draft {
    pub fn new(room: Option<&str>, sender: Option<&str>, body: Option<&str>) -> AppResult<Self> {
        let room = room.map(str::trim).filter(|r| !r.is_empty());
        let Some(room) = room else {
            return Err(AppError::validation("room is required"));
        };
        let Some(body) = body.filter(|b| !b.trim().is_empty()) else {
            return Err(AppError::validation("message must not be empty"));
        };
        let sender = sender.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(ANONYMOUS);

        Ok(Draft {
            room: room.to_owned(),
            sender: sender.to_owned(),
            body: body.to_owned(),
        })
    }
}

/// Persisted history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub room: String,
    pub sender: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// What members of a room receive on the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveMessage {
    pub room: String,
    pub sender: String,
    pub message: String,
    pub html: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl LiveMessage {
    pub fn stamp(Draft { room, sender, body }: Draft, at: OffsetDateTime) -> Self {
        LiveMessage {
            html: render_markdown(&body),
            room,
            sender,
            message: body,
            timestamp: at,
        }
    }
}

#[derive(FromRow)]
struct ChatRow {
    id: i64,
    room: String,
    sender: String,
    message: String,
    created_at: i64,
}

impl TryFrom<ChatRow> for ChatMessage {
    type Error = AppError;

    fn try_from(ChatRow { id, room, sender, message, created_at }: ChatRow) -> AppResult<Self> {
        Ok(ChatMessage {
            id,
            room,
            sender,
            message,
            timestamp: OffsetDateTime::from_unix_timestamp_nanos(created_at.into())?,
        })
    }
}

fn unix_nanos(at: OffsetDateTime) -> AppResult<i64> {
    Ok(i64::try_from(at.unix_timestamp_nanos()).map_err(anyhow::Error::from)?)
}

/// Writes an already stamped message.
pub async fn save(db_pool: &SqlitePool, room: &str, sender: &str, body: &str, at: OffsetDateTime) -> AppResult<i64> {
    let result = sqlx::query("INSERT INTO chats (room,sender,message,created_at) VALUES (?,?,?,?)")
        .bind(room)
        .bind(sender)
        .bind(body)
        .bind(unix_nanos(at)?)
        .execute(db_pool)
        .await?;

    Ok(result.last_insert_rowid())
}

pub async fn append(db_pool: &SqlitePool, draft: &Draft) -> AppResult<OffsetDateTime> {
    let at = OffsetDateTime::now_utc();
    save(db_pool, &draft.room, &draft.sender, &draft.body, at).await?;
    Ok(at)
}

/// Full history of `room`, oldest first. Equal timestamps keep insertion order.
pub async fn list_by_room(db_pool: &SqlitePool, room: &str) -> AppResult<Vec<ChatMessage>> {
    sqlx::query_as::<_, ChatRow>(
        "SELECT id,room,sender,message,created_at FROM chats WHERE room=? ORDER BY created_at ASC, id ASC",
    )
    .bind(room)
    .fetch_all(db_pool)
    .await?
    .into_iter()
    .map(ChatMessage::try_from)
    .collect()
}

#[derive(Deserialize)]
pub(crate) struct SaveMessageRequest {
    room: Option<String>,
    sender: Option<String>,
    message: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn save_message(
    State(db_pool): State<SqlitePool>,
    Payload(SaveMessageRequest { room, sender, message }): Payload<SaveMessageRequest>,
) -> AppResult<impl IntoResponse> {
    let draft = Draft::new(room.as_deref(), sender.as_deref(), message.as_deref())?;
    append(&db_pool, &draft).await?;

    Ok(Json(json!({ "success": true })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn room_history(
    State(db_pool): State<SqlitePool>,
    Path(room): Path<String>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    Ok(Json(list_by_room(&db_pool, &room).await?))
}
