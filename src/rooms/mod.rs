mod engine;
mod msg;
mod presence;
mod ws;

use axum::{middleware, routing::{get, post}, Router};

use crate::{emergency, AppState};

pub use engine::{ChatEngine, Submission};
pub use msg::{append, list_by_room, ChatMessage, Draft, LiveMessage, ANONYMOUS};
pub use presence::{ConnId, Membership, Outbox, Presence};
pub use ws::{handle, ClientEvent, ServerEvent};

/// History routes, mounted under `/chat`.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/save", post(msg::save_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), emergency::check_emergency_lock))
        .route("/{room}", get(msg::room_history))
}

/// The live channel, mounted at `/ws`.
pub fn live_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::live))
}
