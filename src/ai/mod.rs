//! Study assistant backed by an external completion provider.
//!
//! The provider is optional. Without an API key, or when it times out or
//! answers badly, `POST /ai/chat` degrades to a "try again later" reply
//! instead of failing the request.

mod client;

use axum::{
    debug_handler,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;

use crate::{emergency, render_markdown, rooms::ANONYMOUS, AppError, AppResult, AppState, Payload};

pub use client::CompletionClient;

const HISTORY_LIMIT: i64 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct Material {
    pub topic: String,
    pub file_type: String,
    pub filename: String,
}

pub fn system_prompt(materials: &[Material]) -> String {
    let context = if materials.is_empty() {
        "(no materials uploaded yet)".to_owned()
    } else {
        materials
            .iter()
            .map(|m| format!("Topic: {}, Type: {}, Filename: {}", m.topic, m.file_type, m.filename))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are the study assistant of an educational platform. \
Help the student with academic questions, grounded in their uploaded materials.

Student's materials:
{context}

Explain clearly and concisely, point at the materials when they are relevant, \
use examples where they help, suggest related topics from the materials, \
and ask for clarification when the context is not enough."
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: i64,
    pub username: String,
    pub user_message: String,
    pub ai_response: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(FromRow)]
struct ConversationRow {
    id: i64,
    username: String,
    user_message: String,
    ai_response: String,
    created_at: i64,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = AppError;

    fn try_from(row: ConversationRow) -> AppResult<Self> {
        Ok(Conversation {
            id: row.id,
            username: row.username,
            user_message: row.user_message,
            ai_response: row.ai_response,
            timestamp: OffsetDateTime::from_unix_timestamp_nanos(row.created_at.into())?,
        })
    }
}

async fn save_conversation(db_pool: &SqlitePool, username: &str, question: &str, reply: &str) -> AppResult<()> {
    let created_at = i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos()).map_err(anyhow::Error::from)?;
    sqlx::query("INSERT INTO ai_conversations (username,user_message,ai_response,created_at) VALUES (?,?,?,?)")
        .bind(username)
        .bind(question)
        .bind(reply)
        .bind(created_at)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn recent_conversations(db_pool: &SqlitePool, username: &str) -> AppResult<Vec<Conversation>> {
    sqlx::query_as::<_, ConversationRow>(
        "SELECT id,username,user_message,ai_response,created_at FROM ai_conversations \
         WHERE username=? ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(username)
    .bind(HISTORY_LIMIT)
    .fetch_all(db_pool)
    .await?
    .into_iter()
    .map(Conversation::try_from)
    .collect()
}

#[derive(Deserialize)]
pub(crate) struct AskRequest {
    message: Option<String>,
    username: Option<String>,
    #[serde(default)]
    materials: Vec<Material>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn ask(
    State(db_pool): State<SqlitePool>,
    State(assistant): State<CompletionClient>,
    Payload(AskRequest { message, username, materials }): Payload<AskRequest>,
) -> AppResult<impl IntoResponse> {
    let Some(message) = message.filter(|m| !m.trim().is_empty()) else {
        return Err(AppError::validation("Message is required"));
    };
    let username = username.filter(|u| !u.trim().is_empty()).unwrap_or_else(|| ANONYMOUS.to_owned());

    let reply = assistant.complete(&system_prompt(&materials), &message).await?;

    if let Err(err) = save_conversation(&db_pool, &username, &message, &reply).await {
        tracing::error!(%username, error = %err, "assistant reply not recorded");
    }

    Ok(Json(json!({
        "success": true,
        "response": reply,
        "html": render_markdown(&reply),
        "materials_referenced": materials.len(),
    })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn history(
    State(db_pool): State<SqlitePool>,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<Conversation>>> {
    Ok(Json(recent_conversations(&db_pool, &username).await?))
}

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/chat", post(ask))
        .route_layer(middleware::from_fn_with_state(state.clone(), emergency::check_emergency_lock))
        .route("/history/{username}", get(history))
}
