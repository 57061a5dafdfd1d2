use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{emergency::LockInfo, xp::XpGain, AppError};

use super::{
    engine::{ChatEngine, Submission},
    msg::LiveMessage,
    presence::ConnId,
};

/// Frames sent by clients: `{"event": "joinRoom", "data": "global"}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinRoom(String),
    LeaveRoom(String),
    Message(Submission),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Message(LiveMessage),
    Locked(LockInfo),
    Xp(XpGain),
}

#[debug_handler(state = crate::AppState)]
pub async fn live(
    State(chat): State<ChatEngine>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve(chat, stream))
}

async fn serve(chat: ChatEngine, stream: WebSocket) {
    let (outbox, mut inbox) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = chat.presence().connect(outbox).await;
    tracing::info!(%conn, "live connection opened");

    let (mut sender, mut receiver) = stream.split();

    let mut forward_task = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(error = %err, "unserializable server event dropped");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };
                let Ok(event) = serde_json::from_slice::<ClientEvent>(&frame.into_data()) else {
                    continue
                };
                handle(&chat, conn, event).await;
            }
            _ = &mut forward_task => break,
        }
    }

    chat.presence().disconnect(conn).await;
    forward_task.abort();
    tracing::info!(%conn, "live connection closed");
}

pub async fn handle(chat: &ChatEngine, conn: ConnId, event: ClientEvent) {
    match event {
        ClientEvent::JoinRoom(room) => chat.presence().join(conn, &room).await,
        ClientEvent::LeaveRoom(room) => chat.presence().leave(conn, &room).await,
        ClientEvent::Message(submission) => match chat.submit(conn, submission).await {
            Ok(_) => {}
            Err(AppError::Validation(reason)) => tracing::debug!(%conn, reason = %reason, "live message dropped"),
            Err(AppError::Locked(_)) => tracing::info!(%conn, "live message refused by emergency lock"),
            Err(err) => tracing::warn!(%conn, error = %err, "live message failed"),
        },
    }
}
