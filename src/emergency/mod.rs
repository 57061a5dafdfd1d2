//! Process-wide emergency lock.
//!
//! The gate only knows whether it is engaged. Who may engage it is decided by
//! the route handlers in [`routes`]; the gate itself never looks at roles.
//! State lives in memory and starts unlocked on every process start.

mod routes;

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::{AppError, AppResult};

pub use routes::{check_emergency_lock, router};

#[derive(Debug, Clone)]
struct Engagement {
    reason: String,
    locked_by: String,
    locked_at: OffsetDateTime,
}

/// Snapshot of the gate, detached from the live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub is_locked: bool,
    pub reason: String,
    pub locked_by: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub lock_time: Option<OffsetDateTime>,
}

impl LockInfo {
    pub fn unlocked() -> Self {
        Self {
            is_locked: false,
            reason: String::new(),
            locked_by: String::new(),
            lock_time: None,
        }
    }
}

impl From<Option<&Engagement>> for LockInfo {
    fn from(engagement: Option<&Engagement>) -> Self {
        match engagement {
            Some(Engagement { reason, locked_by, locked_at }) => Self {
                is_locked: true,
                reason: reason.clone(),
                locked_by: locked_by.clone(),
                lock_time: Some(*locked_at),
            },
            None => Self::unlocked(),
        }
    }
}

// Engaged-ness and metadata share one Option so they can only change together.
#[derive(Clone, Default)]
pub struct EmergencyLock {
    state: Arc<RwLock<Option<Engagement>>>,
}

impl EmergencyLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engages the lock. Re-engaging overwrites reason, actor and time.
    pub async fn engage(&self, reason: &str, actor: &str) -> AppResult<LockInfo> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::validation("Reason is required"));
        }

        let mut state = self.state.write().await;
        *state = Some(Engagement {
            reason: reason.to_owned(),
            locked_by: actor.to_owned(),
            locked_at: OffsetDateTime::now_utc(),
        });
        tracing::warn!(locked_by = actor, reason, "emergency lock engaged");

        Ok(LockInfo::from(state.as_ref()))
    }

    pub async fn release(&self, actor: &str) -> LockInfo {
        let mut state = self.state.write().await;
        if state.take().is_some() {
            tracing::warn!(unlocked_by = actor, "emergency lock released");
        } else {
            tracing::debug!(unlocked_by = actor, "release requested while unlocked");
        }

        LockInfo::unlocked()
    }

    pub async fn current_state(&self) -> LockInfo {
        LockInfo::from(self.state.read().await.as_ref())
    }

    /// Fails with [`AppError::Locked`] while the lock is engaged.
    pub async fn guard(&self) -> AppResult<()> {
        let state = self.state.read().await;
        match state.as_ref() {
            Some(engagement) => Err(AppError::Locked(LockInfo::from(Some(engagement)))),
            None => Ok(()),
        }
    }
}
