use axum::{
    debug_handler,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{db, AppError, AppResult, AppState, Payload};

use super::EmergencyLock;

/// Route layer for write endpoints. Rejects with 503 while the lock is engaged.
pub async fn check_emergency_lock(
    State(lock): State<EmergencyLock>,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    if let Err(err) = lock.guard().await {
        tracing::info!(method = %request.method(), uri = %request.uri(), "write rejected by emergency lock");
        return Err(err);
    }

    Ok(next.run(request).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LockRequest {
    reason: Option<String>,
    locked_by: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UnlockRequest {
    unlocked_by: Option<String>,
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

async fn require_privileged(db_pool: &SqlitePool, username: &str) -> AppResult<()> {
    match db::find_user(db_pool, username).await? {
        Some(user) if user.role.can_toggle_lock() => Ok(()),
        Some(user) => {
            tracing::warn!(username, role = %user.role, "lock toggle refused");
            Err(AppError::Forbidden("Only moderators and heads can toggle the emergency lock".to_owned()))
        }
        None => Err(AppError::Forbidden(format!("Unknown user {username}"))),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn engage_lock(
    State(db_pool): State<SqlitePool>,
    State(lock): State<EmergencyLock>,
    Payload(LockRequest { reason, locked_by }): Payload<LockRequest>,
) -> AppResult<impl IntoResponse> {
    let (Some(reason), Some(locked_by)) = (present(reason), present(locked_by)) else {
        return Err(AppError::validation("Reason and lockedBy are required"));
    };
    require_privileged(&db_pool, &locked_by).await?;

    let lock_info = lock.engage(&reason, &locked_by).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Emergency lock activated",
        "lockInfo": lock_info,
    })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn release_lock(
    State(db_pool): State<SqlitePool>,
    State(lock): State<EmergencyLock>,
    Payload(UnlockRequest { unlocked_by }): Payload<UnlockRequest>,
) -> AppResult<impl IntoResponse> {
    let Some(unlocked_by) = present(unlocked_by) else {
        return Err(AppError::validation("unlockedBy is required"));
    };
    require_privileged(&db_pool, &unlocked_by).await?;

    let lock_info = lock.release(&unlocked_by).await;
    Ok(Json(json!({
        "success": true,
        "message": "Emergency lock deactivated",
        "lockInfo": lock_info,
    })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn status(State(lock): State<EmergencyLock>) -> impl IntoResponse {
    Json(json!({ "success": true, "lockInfo": lock.current_state().await }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lock", post(engage_lock))
        .route("/unlock", post(release_lock))
        .route("/status", get(status))
}
