use axum::{debug_handler, response::IntoResponse, Json};
use serde_json::json;
use tower_sessions::Session;

use crate::{session::USERNAME, AppResult};

#[debug_handler]
pub async fn logout(session: Session) -> AppResult<impl IntoResponse> {
    if let Some(username) = session.get::<String>(USERNAME).await? {
        tracing::info!(%username, "logged out");
    }
    session.flush().await?;
    Ok(Json(json!({ "success": true })))
}
