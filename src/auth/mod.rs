mod login;
mod logout;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use login::{login, me};
pub use logout::logout;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}
