pub mod ai;
pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod emergency;
pub mod rooms;
pub mod session;
pub mod settings;
pub mod xp;

use axum::{
    extract::{FromRef, FromRequest},
    Json, Router,
};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};
pub use config::Config;

use ai::CompletionClient;
use emergency::EmergencyLock;
use rooms::{ChatEngine, Presence};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub lock: EmergencyLock,
    pub chat: ChatEngine,
    pub assistant: CompletionClient,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: &Config) -> anyhow::Result<Self> {
        let lock = EmergencyLock::new();
        let chat = ChatEngine::new(db_pool.clone(), Presence::new(), lock.clone());
        let assistant = CompletionClient::new(&config.ai)?;

        Ok(AppState { db_pool, lock, chat, assistant })
    }
}

pub fn app(state: AppState, config: &Config) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_idle_minutes)));

    Router::new()
        .nest("/auth", auth::router())
        .nest("/chat", rooms::router(&state))
        .nest("/xp", xp::router(&state))
        .nest("/emergency", emergency::router())
        .nest("/ai", ai::router(&state))
        .nest("/settings", settings::router(&state))
        .merge(rooms::live_router())
        .with_state(state)
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// `Json` body extractor whose rejections (bad syntax, wrong field types,
/// missing content type) are reported as [`AppError::Validation`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct Payload<T>(pub T);

/// Field access for JSON coming back from the completion provider.
pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
    fn get_array_field(&self, field: &str) -> AppResult<&Vec<Value>>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get_obj_field(field)?
            .as_str()
            .ok_or_else(|| AppError::upstream(format!("expected {field} in {self} to be string")))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
            .ok_or_else(|| AppError::upstream(format!("expected {field} in {self}")))
    }

    fn get_array_field(&self, field: &str) -> AppResult<&Vec<Value>> {
        self.get_obj_field(field)?
            .as_array()
            .ok_or_else(|| AppError::upstream(format!("expected {field} in {self} to be an array")))
    }
}

/// Renders chat and assistant text as HTML. Raw HTML in the source is
/// escaped rather than passed through.
pub fn render_markdown(source: &str) -> String {
    use pulldown_cmark::{Event, Options, Parser};

    let parser = Parser::new_ext(source, Options::ENABLE_MATH | Options::ENABLE_STRIKETHROUGH)
        .map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            _ => event,
        });

    let mut html_output = String::new();
    pulldown_cmark::html::push_html(&mut html_output, parser);
    html_output
}
