//! HTTP surface: chat history, XP, emergency lock and login.

mod common;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use studyhall::db::{self, Role};

#[tokio::test]
async fn saved_messages_come_back_in_order() {
    let (server, _) = common::server().await;

    for (sender, message) in [("student1", "first"), ("teacher1", "second")] {
        let response = server
            .post("/chat/save")
            .json(&json!({ "room": "global", "sender": sender, "message": message }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>(), json!({ "success": true }));
    }
    server
        .post("/chat/save")
        .json(&json!({ "room": "level-30", "sender": "head1", "message": "other room" }))
        .await;

    let history: Vec<Value> = server.get("/chat/global").await.json();
    let pairs: Vec<(&str, &str)> = history
        .iter()
        .map(|m| (m["sender"].as_str().unwrap(), m["message"].as_str().unwrap()))
        .collect();
    assert_eq!(pairs, vec![("student1", "first"), ("teacher1", "second")]);
    assert!(history.iter().all(|m| m["room"] == "global" && m["timestamp"].is_string()));
}

#[tokio::test]
async fn empty_room_history_is_an_empty_array() {
    let (server, _) = common::server().await;
    let response = server.get("/chat/nobody-here").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!([]));
}

#[tokio::test]
async fn save_rejects_missing_room_and_blank_body() {
    let (server, _) = common::server().await;

    let no_room = server.post("/chat/save").json(&json!({ "sender": "alice", "message": "hi" })).await;
    assert_eq!(no_room.status_code(), StatusCode::BAD_REQUEST);

    let blank = server.post("/chat/save").json(&json!({ "room": "global", "message": "   " })).await;
    assert_eq!(blank.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(blank.json::<Value>()["success"], false);

    let history: Vec<Value> = server.get("/chat/global").await.json();
    assert!(history.is_empty());
}

#[tokio::test]
async fn save_without_sender_records_anonymous() {
    let (server, _) = common::server().await;
    server.post("/chat/save").json(&json!({ "room": "global", "message": "hello" })).await;

    let history: Vec<Value> = server.get("/chat/global").await.json();
    assert_eq!(history[0]["sender"], "Anonymous");
}

#[tokio::test]
async fn xp_add_levels_bob_up() {
    let (server, state) = common::server().await;
    db::provision_user(&state.db_pool, "bob", "bob", Role::Student, 80).await.unwrap();

    let response = server.post("/xp/add").json(&json!({ "username": "bob", "xp": 25 })).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "success": true, "xp": 105, "level": 2 }));
}

#[tokio::test]
async fn xp_add_for_unknown_user_is_success_false() {
    let (server, _) = common::server().await;
    let response = server.post("/xp/add").json(&json!({ "username": "ghost", "xp": 5 })).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "success": false, "message": "User not found" }));
}

#[tokio::test]
async fn xp_add_validates_its_input() {
    let (server, _) = common::server().await;

    let missing = server.post("/xp/add").json(&json!({ "username": "student1" })).await;
    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);

    let negative = server.post("/xp/add").json(&json!({ "username": "student1", "xp": -3 })).await;
    assert_eq!(negative.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_starts_unlocked() {
    let (server, _) = common::server().await;
    let body: Value = server.get("/emergency/status").await.json();

    assert_eq!(body["success"], true);
    assert_eq!(body["lockInfo"]["isLocked"], false);
    assert_eq!(body["lockInfo"]["lockTime"], Value::Null);
}

#[tokio::test]
async fn lock_requires_reason_and_actor() {
    let (server, _) = common::server().await;

    let response = server.post("/emergency/lock").json(&json!({ "reason": "drill" })).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = server.post("/emergency/unlock").json(&json!({})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_privileged_roles_toggle_the_lock() {
    let (server, state) = common::server().await;

    for actor in ["student1", "teacher1", "nobody"] {
        let response = server
            .post("/emergency/lock")
            .json(&json!({ "reason": "drill", "lockedBy": actor }))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN, "{actor} locked the system");
    }
    assert!(!state.lock.current_state().await.is_locked);
}

#[tokio::test]
async fn lock_gates_writes_until_released() {
    let (server, _) = common::server().await;

    let engaged = server
        .post("/emergency/lock")
        .json(&json!({ "reason": "exam in progress", "lockedBy": "moderator1" }))
        .await;
    assert_eq!(engaged.status_code(), StatusCode::OK);
    let engaged: Value = engaged.json();
    assert_eq!(engaged["lockInfo"]["isLocked"], true);
    assert_eq!(engaged["lockInfo"]["lockedBy"], "moderator1");

    let xp = server.post("/xp/add").json(&json!({ "username": "student1", "xp": 2 })).await;
    assert_eq!(xp.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let xp: Value = xp.json();
    assert_eq!(xp["success"], false);
    assert_eq!(xp["lockInfo"]["reason"], "exam in progress");
    assert_eq!(xp["lockInfo"]["lockedBy"], "moderator1");

    let save = server
        .post("/chat/save")
        .json(&json!({ "room": "global", "sender": "student1", "message": "hi" }))
        .await;
    assert_eq!(save.status_code(), StatusCode::SERVICE_UNAVAILABLE);

    // reads stay open
    assert_eq!(server.get("/chat/global").await.status_code(), StatusCode::OK);
    assert_eq!(server.get("/emergency/status").await.status_code(), StatusCode::OK);

    let released = server.post("/emergency/unlock").json(&json!({ "unlockedBy": "head1" })).await;
    assert_eq!(released.status_code(), StatusCode::OK);
    assert_eq!(released.json::<Value>()["lockInfo"]["isLocked"], false);

    let xp = server.post("/xp/add").json(&json!({ "username": "student1", "xp": 2 })).await;
    assert_eq!(xp.json::<Value>(), json!({ "success": true, "xp": 2, "level": 1 }));
}

#[tokio::test]
async fn relocking_reports_the_latest_reason() {
    let (server, _) = common::server().await;

    server.post("/emergency/lock").json(&json!({ "reason": "first", "lockedBy": "moderator1" })).await;
    server.post("/emergency/lock").json(&json!({ "reason": "second", "lockedBy": "head1" })).await;

    let status: Value = server.get("/emergency/status").await.json();
    assert_eq!(status["lockInfo"]["reason"], "second");
    assert_eq!(status["lockInfo"]["lockedBy"], "head1");
}

#[tokio::test]
async fn login_returns_the_user_and_starts_a_session() {
    let (server, _) = common::server().await;

    let response = server
        .post("/auth/login")
        .json(&json!({ "username": "monitor1", "password": "monitor1" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["user"], json!({ "username": "monitor1", "role": "monitor", "xp": 0, "level": 1 }));

    let me: Value = server.get("/auth/me").add_cookie(response.cookie("id")).await.json();
    assert_eq!(me["user"]["username"], "monitor1");
}

#[tokio::test]
async fn login_with_bad_credentials_is_success_false() {
    let (server, _) = common::server().await;
    let response = server
        .post("/auth/login")
        .json(&json!({ "username": "monitor1", "password": "wrong" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!({ "success": false, "message": "Invalid credentials" }));
}

#[tokio::test]
async fn me_without_a_session_is_success_false() {
    let (server, _) = common::server().await;
    let me: Value = server.get("/auth/me").await.json();
    assert_eq!(me["success"], false);
}

#[tokio::test]
async fn oversized_xp_award_is_refused_and_the_account_survives() {
    let (server, _) = common::server().await;

    let response = server.post("/xp/add").json(&json!({ "username": "student1", "xp": i64::MAX })).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server.post("/xp/add").json(&json!({ "username": "student1", "xp": i64::MAX })).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["success"], false);

    let response = server
        .post("/auth/login")
        .json(&json!({ "username": "student1", "password": "student1" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["user"]["xp"], i64::MAX);
}

#[tokio::test]
async fn xp_add_accepts_numeric_strings() {
    let (server, _) = common::server().await;
    let response = server.post("/xp/add").json(&json!({ "username": "student1", "xp": "25" })).await;

    assert_eq!(response.json::<Value>(), json!({ "success": true, "xp": 25, "level": 1 }));
}

#[tokio::test]
async fn malformed_bodies_are_json_validation_errors() {
    let (server, _) = common::server().await;

    let wrong_type = server.post("/xp/add").json(&json!({ "username": "student1", "xp": [25] })).await;
    let bad_json = server
        .post("/chat/save")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;
    let no_content_type = server.post("/emergency/lock").text("reason=drill&lockedBy=head1").await;

    for response in [wrong_type, bad_json, no_content_type] {
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }
}

#[tokio::test]
async fn store_failures_answer_with_a_generic_body() {
    let (server, state) = common::server().await;
    sqlx::query("DROP TABLE chats").execute(&state.db_pool).await.unwrap();

    let response = server
        .post("/chat/save")
        .json(&json!({ "room": "global", "sender": "student1", "message": "hi" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>(), json!({ "success": false, "message": "Database error" }));
}

#[tokio::test]
async fn nickname_settings_round_trip() {
    let (server, _) = common::server().await;

    let fresh: Value = server.get("/settings/get/student1").await.json();
    assert_eq!(fresh, json!({ "success": true, "settings": { "nickname": "student1" } }));

    let saved = server
        .post("/settings/update")
        .json(&json!({ "username": "student1", "nickname": "Ada" }))
        .await;
    assert_eq!(saved.json::<Value>()["message"], "Settings saved successfully");

    let updated = server
        .post("/settings/update")
        .json(&json!({ "username": "student1", "nickname": "Ada L." }))
        .await;
    assert_eq!(updated.json::<Value>()["message"], "Settings updated successfully");

    let stored: Value = server.get("/settings/get/student1").await.json();
    assert_eq!(stored["settings"]["nickname"], "Ada L.");

    let missing = server.post("/settings/update").json(&json!({ "username": "student1" })).await;
    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn nickname_updates_are_gated_by_the_lock() {
    let (server, state) = common::server().await;
    state.lock.engage("drill", "head1").await.unwrap();

    let response = server
        .post("/settings/update")
        .json(&json!({ "username": "student1", "nickname": "Ada" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(server.get("/settings/get/student1").await.status_code(), StatusCode::OK);
}
