//! Per-user display settings. Only the nickname is kept.

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
use sqlx::SqlitePool;

use crate::{emergency, AppError, AppResult, AppState, Payload};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub nickname: String,
}

/// Stored nickname, or the username itself when none was ever set.
pub async fn settings_for(db_pool: &SqlitePool, username: &str) -> AppResult<Settings> {
    let nickname: Option<String> = sqlx::query_scalar("SELECT nickname FROM user_profiles WHERE username=?")
        .bind(username)
        .fetch_optional(db_pool)
        .await?;

    Ok(Settings { nickname: nickname.unwrap_or_else(|| username.to_owned()) })
}

/// Returns true when an existing nickname was replaced, false when the
/// profile was created.
pub async fn set_nickname(db_pool: &SqlitePool, username: &str, nickname: &str) -> AppResult<bool> {
    let replaced = sqlx::query("UPDATE user_profiles SET nickname=? WHERE username=?")
        .bind(nickname)
        .bind(username)
        .execute(db_pool)
        .await?
        .rows_affected()
        > 0;

    if !replaced {
        sqlx::query(
            "INSERT INTO user_profiles (username,nickname) VALUES (?,?) \
             ON CONFLICT (username) DO UPDATE SET nickname=excluded.nickname",
        )
        .bind(username)
        .bind(nickname)
        .execute(db_pool)
        .await?;
    }

    Ok(replaced)
}

#[derive(Deserialize)]
pub(crate) struct UpdateRequest {
    username: Option<String>,
    nickname: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn update(
    State(db_pool): State<SqlitePool>,
    Payload(UpdateRequest { username, nickname }): Payload<UpdateRequest>,
) -> AppResult<impl IntoResponse> {
    let present = |field: Option<String>| field.map(|f| f.trim().to_owned()).filter(|f| !f.is_empty());
    let (Some(username), Some(nickname)) = (present(username), present(nickname)) else {
        return Err(AppError::validation("Missing required fields"));
    };

    let message = if set_nickname(&db_pool, &username, &nickname).await? {
        "Settings updated successfully"
    } else {
        "Settings saved successfully"
    };
    tracing::info!(%username, %nickname, "nickname set");

    Ok(Json(json!({ "success": true, "message": message })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn fetch(
    State(db_pool): State<SqlitePool>,
    Path(username): Path<String>,
) -> AppResult<impl IntoResponse> {
    let settings = settings_for(&db_pool, &username).await?;
    Ok(Json(json!({ "success": true, "settings": settings })))
}

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/update", post(update))
        .route_layer(middleware::from_fn_with_state(state.clone(), emergency::check_emergency_lock))
        .route("/get/{username}", get(fetch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn nickname_defaults_to_the_username_until_set() {
        let db_pool = db::connect("sqlite::memory:", 1).await.unwrap();
        db::init(&db_pool).await.unwrap();

        assert_eq!(settings_for(&db_pool, "student1").await.unwrap().nickname, "student1");

        assert!(!set_nickname(&db_pool, "student1", "Ada").await.unwrap());
        assert!(set_nickname(&db_pool, "student1", "Ada L.").await.unwrap());
        assert_eq!(settings_for(&db_pool, "student1").await.unwrap().nickname, "Ada L.");
    }
}
