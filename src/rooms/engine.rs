use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{emergency::EmergencyLock, xp, AppError, AppResult};

use super::{
    msg::{self, Draft, LiveMessage},
    presence::{ConnId, Membership, Presence},
    ws::ServerEvent,
};

/// Payload of a live `message` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Submission {
    pub room: Option<String>,
    pub sender: Option<String>,
    pub message: Option<String>,
}

/// Accepts live submissions, fans them out to the room and records them.
#[derive(Clone)]
pub struct ChatEngine {
    db_pool: SqlitePool,
    presence: Presence,
    lock: EmergencyLock,
}

impl ChatEngine {
    pub fn new(db_pool: SqlitePool, presence: Presence, lock: EmergencyLock) -> Self {
        Self { db_pool, presence, lock }
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Validates, fans out, then persists.
    ///
    /// Fan-out goes first and does not depend on the store: a failed insert is
    /// logged and the message has still reached the room. While the emergency
    /// lock is engaged the submission is refused and `origin` gets a `locked`
    /// event instead.
    pub async fn submit(&self, origin: ConnId, submission: Submission) -> AppResult<LiveMessage> {
        let room = match submission.room {
            Some(room) => Some(room),
            None => match self.presence.membership(origin).await {
                Some(Membership::Joined(room)) => Some(room),
                _ => None,
            },
        };
        let draft = Draft::new(room.as_deref(), submission.sender.as_deref(), submission.message.as_deref())?;

        if let Err(err) = self.lock.guard().await {
            if let AppError::Locked(lock_info) = &err {
                self.presence.send_to(origin, ServerEvent::Locked(lock_info.clone())).await;
            }
            return Err(err);
        }

        let (live, delivered) = self.presence.publish(draft).await;
        tracing::debug!(room = %live.room, sender = %live.sender, delivered, "message fanned out");

        if let Err(err) = msg::save(&self.db_pool, &live.room, &live.sender, &live.message, live.timestamp).await {
            tracing::error!(room = %live.room, error = %err, "message delivered but not persisted");
        }

        if xp::asks_question(&live.message) {
            self.award_question(origin, &live.sender).await;
        }

        Ok(live)
    }

    async fn award_question(&self, origin: ConnId, sender: &str) {
        match xp::add_xp(&self.db_pool, sender, xp::QUESTION_BONUS).await {
            Ok(gain) => {
                self.presence.send_to(origin, ServerEvent::Xp(gain)).await;
            }
            Err(AppError::NotFound(_)) => {
                tracing::debug!(sender, "question bonus skipped for unknown sender");
            }
            Err(err) => {
                tracing::warn!(sender, error = %err, "question bonus not recorded");
            }
        }
    }
}
