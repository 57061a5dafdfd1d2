use axum::{debug_handler, extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{db, session::USERNAME, AppError, AppResult, AppState, Payload};

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[debug_handler(state = AppState)]
pub async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Payload(LoginRequest { username, password }): Payload<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let (Some(username), Some(password)) = (username, password) else {
        return Err(AppError::validation("username and password are required"));
    };

    let Some(user) = db::find_user_with_password(&db_pool, &username, &password).await? else {
        tracing::info!(%username, "login refused");
        return Err(AppError::not_found("Invalid credentials"));
    };

    session.insert(USERNAME, &user.username).await?;
    tracing::info!(username = %user.username, role = %user.role, "welcome");

    Ok(Json(json!({ "success": true, "user": user })))
}

/// The logged-in user, re-read so xp and level are current.
#[debug_handler(state = AppState)]
pub async fn me(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let Some(username) = session.get::<String>(USERNAME).await? else {
        return Err(AppError::not_found("Not logged in"));
    };
    let Some(user) = db::find_user(&db_pool, &username).await? else {
        return Err(AppError::not_found("User not found"));
    };

    Ok(Json(json!({ "success": true, "user": user })))
}
