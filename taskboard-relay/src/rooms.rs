//! Room broadcaster for the relay server.
//!
//! Tracks which connections are subscribed to which project rooms and fans
//! board events out to them. Each connection is represented by the sending
//! half of its writer channel; delivery is a non-blocking channel send, so
//! `publish` never waits on a slow client.
//!
//! State is ephemeral: subscriptions are lost on restart, and events are
//! never queued for connections that join later.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use taskboard::events::{ConnectionId, EventSink};
use taskboard_proto::event::{BoardEvent, RoomId};
use taskboard_proto::socket::ServerMessage;
use tokio::sync::mpsc;

/// Errors returned by room operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The connection was never registered or has already disconnected.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}

struct Subscriber {
    sender: mpsc::UnboundedSender<ServerMessage>,
    rooms: HashSet<RoomId>,
}

#[derive(Default)]
struct Rooms {
    members: HashMap<RoomId, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, Subscriber>,
}

impl Rooms {
    fn remove_from_room(&mut self, conn: ConnectionId, room: RoomId) -> bool {
        let Some(members) = self.members.get_mut(&room) else {
            return false;
        };
        let removed = members.remove(&conn);
        if members.is_empty() {
            self.members.remove(&room);
        }
        removed
    }

    fn drop_connection(&mut self, conn: ConnectionId) -> Option<usize> {
        let subscriber = self.connections.remove(&conn)?;
        for room in &subscriber.rooms {
            self.remove_from_room(conn, *room);
        }
        Some(subscriber.rooms.len())
    }
}

/// Room → subscriber registry with origin-excluding fan-out.
///
/// All bookkeeping sits behind one [`parking_lot::Mutex`], so a join,
/// leave or disconnect is never interleaved with a half-finished publish.
#[derive(Default)]
pub struct RoomBroadcaster {
    inner: Mutex<Rooms>,
}

impl RoomBroadcaster {
    /// Creates an empty broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and the channel its events are written to.
    ///
    /// Re-registering an id replaces the channel and clears its rooms.
    pub fn connect(&self, conn: ConnectionId, sender: mpsc::UnboundedSender<ServerMessage>) {
        let mut rooms = self.inner.lock();
        if rooms.drop_connection(conn).is_some() {
            tracing::warn!(conn = %conn, "connection re-registered, previous subscriptions dropped");
        }
        rooms.connections.insert(
            conn,
            Subscriber {
                sender,
                rooms: HashSet::new(),
            },
        );
    }

    /// Subscribes `conn` to `room`. Returns `false` if it already was.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::UnknownConnection`] if `conn` is not connected.
    pub fn join(&self, conn: ConnectionId, room: RoomId) -> Result<bool, RoomError> {
        let mut guard = self.inner.lock();
        let rooms = &mut *guard;
        let subscriber = rooms
            .connections
            .get_mut(&conn)
            .ok_or(RoomError::UnknownConnection(conn))?;
        let added = subscriber.rooms.insert(room);
        rooms.members.entry(room).or_default().insert(conn);
        drop(guard);

        tracing::debug!(conn = %conn, room = %room, added, "joined room");
        Ok(added)
    }

    /// Unsubscribes `conn` from `room`. Returns `false` if it was not
    /// subscribed.
    pub fn leave(&self, conn: ConnectionId, room: RoomId) -> bool {
        let mut rooms = self.inner.lock();
        let was_member = rooms
            .connections
            .get_mut(&conn)
            .is_some_and(|s| s.rooms.remove(&room));
        rooms.remove_from_room(conn, room);
        drop(rooms);

        tracing::debug!(conn = %conn, room = %room, was_member, "left room");
        was_member
    }

    /// Forgets `conn` and every subscription it held. Returns the number
    /// of rooms it was removed from.
    pub fn disconnect(&self, conn: ConnectionId) -> usize {
        let left = self.inner.lock().drop_connection(conn).unwrap_or(0);
        tracing::debug!(conn = %conn, rooms = left, "connection removed from broadcaster");
        left
    }

    /// Returns `true` if `conn` is currently subscribed to `room`.
    #[must_use]
    pub fn is_subscribed(&self, conn: ConnectionId, room: RoomId) -> bool {
        self.inner
            .lock()
            .connections
            .get(&conn)
            .is_some_and(|s| s.rooms.contains(&room))
    }

    /// Number of subscribers of `room`.
    #[must_use]
    pub fn subscriber_count(&self, room: RoomId) -> usize {
        self.inner.lock().members.get(&room).map_or(0, HashSet::len)
    }

    /// Number of rooms with at least one subscriber.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.inner.lock().members.len()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Sends `event` to every subscriber of `room` except `origin`.
    ///
    /// Subscribers whose channel is closed are pruned; the rest still
    /// receive the event. Returns the number of successful deliveries.
    pub fn broadcast(&self, origin: Option<ConnectionId>, room: RoomId, event: &BoardEvent) -> usize {
        let mut rooms = self.inner.lock();
        let Some(members) = rooms.members.get(&room) else {
            tracing::trace!(room = %room, "publish to empty room");
            return 0;
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for conn in members.iter().copied().filter(|c| Some(*c) != origin) {
            let Some(subscriber) = rooms.connections.get(&conn) else {
                continue;
            };
            let msg = ServerMessage::Event {
                room,
                event: event.clone(),
            };
            if subscriber.sender.send(msg).is_ok() {
                delivered += 1;
            } else {
                dead.push(conn);
            }
        }

        for conn in dead {
            tracing::warn!(conn = %conn, room = %room, "subscriber channel closed, pruning");
            rooms.drop_connection(conn);
        }
        drop(rooms);

        tracing::debug!(room = %room, kind = %event.kind(), delivered, "event broadcast");
        delivered
    }
}

impl EventSink for RoomBroadcaster {
    fn publish(&self, origin: Option<ConnectionId>, room: RoomId, event: BoardEvent) {
        self.broadcast(origin, room, &event);
    }
}
