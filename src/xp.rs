use axum::{debug_handler, extract::State, middleware, response::IntoResponse, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{db, emergency, AppError, AppResult, AppState, Payload};

/// Awarded for a chat message that asks something.
pub const QUESTION_BONUS: i64 = 2;

pub fn level_for(xp: i64) -> i64 {
    xp.max(0) / 100 + 1
}

pub fn asks_question(body: &str) -> bool {
    body.contains('?')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XpGain {
    pub username: String,
    pub xp: i64,
    pub level: i64,
}

/// Adds `amount` to the user's xp and recomputes the level in one statement,
/// so concurrent awards for the same user cannot overwrite each other.
///
/// An award that would push the total past `i64::MAX` matches no row and is
/// refused; sqlite would otherwise store the sum as a REAL.
pub async fn add_xp(db_pool: &SqlitePool, username: &str, amount: i64) -> AppResult<XpGain> {
    if amount <= 0 {
        return Err(AppError::validation("xp must be a positive integer"));
    }

    let row: Option<(i64, i64)> = sqlx::query_as(
        "UPDATE users SET xp = xp + ?, level = (xp + ?) / 100 + 1 \
         WHERE username=? AND xp <= ? RETURNING xp,level",
    )
    .bind(amount)
    .bind(amount)
    .bind(username)
    .bind(i64::MAX - amount)
    .fetch_optional(db_pool)
    .await?;

    let Some((xp, level)) = row else {
        return match db::find_user(db_pool, username).await? {
            Some(user) => {
                tracing::warn!(username, amount, xp = user.xp, "xp award would overflow");
                Err(AppError::validation("xp award too large"))
            }
            None => Err(AppError::not_found("User not found")),
        };
    };

    tracing::debug!(username, amount, xp, level, "xp awarded");
    Ok(XpGain { username: username.to_owned(), xp, level })
}

/// Clients send the amount either as a JSON number or as a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum Amount {
    Number(i64),
    Text(String),
}

impl Amount {
    fn value(self) -> AppResult<i64> {
        match self {
            Amount::Number(amount) => Ok(amount),
            Amount::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| AppError::validation(format!("xp must be an integer, got {text:?}"))),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct AddXpRequest {
    username: Option<String>,
    xp: Option<Amount>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn add(
    State(db_pool): State<SqlitePool>,
    Payload(AddXpRequest { username, xp }): Payload<AddXpRequest>,
) -> AppResult<impl IntoResponse> {
    let (Some(username), Some(xp)) = (username.filter(|u| !u.trim().is_empty()), xp) else {
        return Err(AppError::validation("username and xp are required"));
    };

    let gain = add_xp(&db_pool, &username, xp.value()?).await?;
    Ok(Json(json!({ "success": true, "xp": gain.xp, "level": gain.level })))
}

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/add", post(add))
        .route_layer(middleware::from_fn_with_state(state.clone(), emergency::check_emergency_lock))
}
