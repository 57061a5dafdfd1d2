//! Shared fixtures: an in-memory store with the seed users and a router
//! served through `axum_test`.
#![allow(dead_code)]

use axum_test::TestServer;
use studyhall::{app, db, AppState, Config};

pub async fn state_with(config: &Config) -> AppState {
    let db_pool = db::connect("sqlite::memory:", 1).await.unwrap();
    db::init(&db_pool).await.unwrap();
    AppState::new(db_pool, config).unwrap()
}

pub async fn state() -> AppState {
    state_with(&Config::default()).await
}

pub async fn server_with(config: Config) -> (TestServer, AppState) {
    let state = state_with(&config).await;
    let server = TestServer::new(app(state.clone(), &config)).unwrap();
    (server, state)
}

pub async fn server() -> (TestServer, AppState) {
    server_with(Config::default()).await
}
