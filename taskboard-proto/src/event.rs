//! Room-scoped board events.
//!
//! A [`BoardEvent`] describes a change to a task or project and is fanned
//! out to every other subscriber of the project's [`RoomId`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::board::{Project, Task};
use crate::id::{ProjectId, TaskId};

/// Prefix of every room label.
pub const ROOM_PREFIX: &str = "project:";

/// Error returned when a room label cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid room id {0:?} (expected `project:<uuid>`)")]
pub struct RoomIdError(pub String);

/// The realtime room of one project, labelled `project:{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(ProjectId);

impl RoomId {
    /// Returns the room of the given project.
    #[must_use]
    pub const fn for_project(project: ProjectId) -> Self {
        Self(project)
    }

    /// The project this room belongs to.
    #[must_use]
    pub const fn project(&self) -> ProjectId {
        self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ROOM_PREFIX}{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(ROOM_PREFIX)
            .and_then(|id| id.parse::<ProjectId>().ok())
            .map(Self)
            .ok_or_else(|| RoomIdError(s.to_string()))
    }
}

/// A full entity carried by create and update events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    /// A task snapshot.
    Task(Task),
    /// A project snapshot.
    Project(Project),
}

impl Entity {
    /// The project this entity belongs to, if any.
    #[must_use]
    pub const fn project(&self) -> Option<ProjectId> {
        match self {
            Self::Task(t) => t.project,
            Self::Project(p) => Some(p.id),
        }
    }
}

/// Reference to a deleted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityRef {
    /// A deleted task.
    Task(TaskId),
    /// A deleted project.
    Project(ProjectId),
}

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An entity was created.
    Created,
    /// An entity was modified.
    Updated,
    /// An entity was removed.
    Deleted,
}

impl EventKind {
    /// Event name as clients know it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "entity-created",
            Self::Updated => "entity-updated",
            Self::Deleted => "entity-deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification relayed within a project room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoardEvent {
    /// An entity was created.
    Created(Entity),
    /// An entity was modified.
    Updated(Entity),
    /// An entity was removed.
    Deleted(EntityRef),
}

impl BoardEvent {
    /// The kind of change this event describes.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Created(_) => EventKind::Created,
            Self::Updated(_) => EventKind::Updated,
            Self::Deleted(_) => EventKind::Deleted,
        }
    }
}
