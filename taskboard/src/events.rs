//! The seam between board mutations and the realtime layer.

use std::fmt;

use taskboard_proto::event::{BoardEvent, RoomId};

/// Identifies one realtime connection for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw connection number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw connection number.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Receives committed board changes for fan-out to a project room.
///
/// Implementations must not block: `publish` is called from async
/// contexts right after a commit.
pub trait EventSink: Send + Sync {
    /// Delivers `event` to every subscriber of `room` except `origin`.
    fn publish(&self, origin: Option<ConnectionId>, room: RoomId, event: BoardEvent);
}

/// Discards every event. Used when no realtime layer is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _origin: Option<ConnectionId>, room: RoomId, event: BoardEvent) {
        tracing::trace!(room = %room, kind = %event.kind(), "no realtime sink attached, dropping event");
    }
}
