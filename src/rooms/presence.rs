use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use time::{Duration, OffsetDateTime};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::{
    msg::{Draft, LiveMessage},
    ws::ServerEvent,
};

pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(Uuid);

impl ConnId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Unjoined,
    Joined(String),
}

struct Connection {
    outbox: Outbox,
    membership: Membership,
}

/// Connections and their rooms. The `rooms` index mirrors each
/// connection's [`Membership`] exactly.
#[derive(Default)]
pub(crate) struct Registry {
    connections: HashMap<ConnId, Connection>,
    rooms: HashMap<String, HashSet<ConnId>>,
    last_stamp: Option<OffsetDateTime>,
}

impl Registry {
    pub(crate) fn connect(&mut self, outbox: Outbox) -> ConnId {
        let conn = ConnId::new();
        self.connections.insert(conn, Connection { outbox, membership: Membership::Unjoined });
        conn
    }

    fn unindex(&mut self, conn: ConnId, room: &str) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&conn);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    /// Returns the room that was implicitly left, if any.
    pub(crate) fn join(&mut self, conn: ConnId, room: &str) -> Option<String> {
        let connection = self.connections.get_mut(&conn)?;
        let previous = std::mem::replace(&mut connection.membership, Membership::Joined(room.to_owned()));

        let left = match previous {
            Membership::Joined(previous) if previous == room => return None,
            Membership::Joined(previous) => {
                self.unindex(conn, &previous);
                Some(previous)
            }
            Membership::Unjoined => None,
        };

        self.rooms.entry(room.to_owned()).or_default().insert(conn);
        left
    }

    /// No-op unless `conn` is currently in `room`.
    pub(crate) fn leave(&mut self, conn: ConnId, room: &str) -> bool {
        let Some(connection) = self.connections.get_mut(&conn) else {
            return false;
        };
        if connection.membership != Membership::Joined(room.to_owned()) {
            return false;
        }

        connection.membership = Membership::Unjoined;
        self.unindex(conn, room);
        true
    }

    pub(crate) fn disconnect(&mut self, conn: ConnId) -> Option<Membership> {
        let connection = self.connections.remove(&conn)?;
        if let Membership::Joined(room) = &connection.membership {
            self.unindex(conn, room);
        }
        Some(connection.membership)
    }

    pub(crate) fn membership(&self, conn: ConnId) -> Option<&Membership> {
        self.connections.get(&conn).map(|c| &c.membership)
    }

    pub(crate) fn members_of(&self, room: &str) -> Vec<ConnId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    fn send_to(&self, conn: ConnId, event: ServerEvent) -> bool {
        self.connections
            .get(&conn)
            .is_some_and(|c| c.outbox.send(event).is_ok())
    }

    /// Strictly increasing across calls, even if the wall clock stalls or
    /// steps back.
    fn next_stamp(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let at = match self.last_stamp {
            Some(last) if now <= last => last + Duration::nanoseconds(1),
            _ => now,
        };
        self.last_stamp = Some(at);
        at
    }

    /// Stamps and fans out in one step, so timestamp order is delivery order.
    pub(crate) fn publish(&mut self, draft: Draft) -> (LiveMessage, usize) {
        let live = LiveMessage::stamp(draft, self.next_stamp());
        let delivered = self.broadcast(&live.room, &ServerEvent::Message(live.clone()));
        (live, delivered)
    }

    fn broadcast(&self, room: &str, event: &ServerEvent) -> usize {
        let Some(members) = self.rooms.get(room) else {
            return 0;
        };

        members
            .iter()
            .filter(|conn| {
                let delivered = self.send_to(**conn, event.clone());
                if !delivered {
                    tracing::debug!(conn = %conn, room, "fan-out to closed connection skipped");
                }
                delivered
            })
            .count()
    }
}

/// Shared handle to the room registry.
#[derive(Clone, Default)]
pub struct Presence {
    registry: Arc<Mutex<Registry>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, outbox: Outbox) -> ConnId {
        self.registry.lock().await.connect(outbox)
    }

    pub async fn join(&self, conn: ConnId, room: &str) {
        let left = self.registry.lock().await.join(conn, room);
        match left {
            Some(left) => tracing::info!(%conn, room, left = %left, "switched room"),
            None => tracing::info!(%conn, room, "joined room"),
        }
    }

    pub async fn leave(&self, conn: ConnId, room: &str) {
        if self.registry.lock().await.leave(conn, room) {
            tracing::info!(%conn, room, "left room");
        }
    }

    pub async fn disconnect(&self, conn: ConnId) {
        if let Some(membership) = self.registry.lock().await.disconnect(conn) {
            tracing::debug!(%conn, ?membership, "connection removed from presence");
        }
    }

    pub async fn membership(&self, conn: ConnId) -> Option<Membership> {
        self.registry.lock().await.membership(conn).cloned()
    }

    pub async fn members_of(&self, room: &str) -> Vec<ConnId> {
        self.registry.lock().await.members_of(room)
    }

    pub async fn send_to(&self, conn: ConnId, event: ServerEvent) -> bool {
        self.registry.lock().await.send_to(conn, event)
    }

    /// Stamps `draft` and delivers it to every member of its room, sender
    /// included. Both happen under the registry lock, so every member observes
    /// the same order for a room and that order matches the timestamps.
    /// Returns the stamped message and how many members received it.
    pub async fn publish(&self, draft: Draft) -> (LiveMessage, usize) {
        self.registry.lock().await.publish(draft)
    }
}
