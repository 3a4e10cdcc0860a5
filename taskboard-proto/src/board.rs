//! Board snapshots: the project and task shapes sent to clients.
//!
//! These are read models. The server keeps its own records and renders a
//! snapshot whenever an entity is returned or broadcast.

use serde::{Deserialize, Serialize};

use crate::id::{CategoryId, ProjectId, TaskId, Timestamp, UserId};
use crate::role::MemberRole;

/// Status a new task receives when none is given.
pub const DEFAULT_TASK_STATUS: &str = "Assigned";

/// Status that marks a task as finished for overdue calculations.
pub const DONE_TASK_STATUS: &str = "Done";

/// Colour assigned to projects created without one.
pub const DEFAULT_PROJECT_COLOR: &str = "#8B5CF6";

/// A named workflow stage on a project's Kanban board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Display name, also the status string tasks in this column carry.
    pub name: String,
    /// Position from the left, starting at 0.
    pub order: u32,
}

impl Column {
    /// Creates a column.
    pub fn new(name: impl Into<String>, order: u32) -> Self {
        Self {
            name: name.into(),
            order,
        }
    }
}

/// Columns every new project starts with.
#[must_use]
pub fn default_columns() -> Vec<Column> {
    vec![
        Column::new(DEFAULT_TASK_STATUS, 0),
        Column::new("In Progress", 1),
        Column::new(DONE_TASK_STATUS, 2),
    ]
}

/// A non-owner member of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// The member's identity.
    pub user: UserId,
    /// Assigned role.
    pub role: MemberRole,
    /// When the member was added.
    pub added_at: Timestamp,
}

/// Snapshot of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project identifier.
    pub id: ProjectId,
    /// Project name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// `#RRGGBB` colour.
    pub color: String,
    /// The project's owner. Never listed in `members`.
    pub owner: UserId,
    /// Non-owner members in insertion order.
    pub members: Vec<MemberRecord>,
    /// Kanban columns ordered by `order`.
    pub columns: Vec<Column>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Whether the project is archived.
    pub is_archived: bool,
    /// When the project was archived.
    pub archived_at: Option<Timestamp>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

/// Task urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Can wait.
    Low,
    /// The default.
    #[default]
    Medium,
    /// Should be handled soon.
    High,
    /// Drop everything.
    Urgent,
}

/// Snapshot of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Task title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Owning project, or `None` for a personal task.
    pub project: Option<ProjectId>,
    /// Optional category reference.
    pub category: Option<CategoryId>,
    /// Urgency.
    pub priority: Priority,
    /// Free-text status, interpreted against the project's columns.
    pub status: String,
    /// Optional assignee.
    pub assignee: Option<UserId>,
    /// Optional due date.
    pub deadline: Option<Timestamp>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Creator; the only user with access to a personal task.
    pub created_by: UserId,
    /// Whether the task is archived.
    pub is_archived: bool,
    /// When the task was archived.
    pub archived_at: Option<Timestamp>,
    /// Position within its column.
    pub order: i64,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl Task {
    /// A personal task belongs to no project.
    #[must_use]
    pub const fn is_personal(&self) -> bool {
        self.project.is_none()
    }

    /// A task is overdue once its deadline has passed and it is not done.
    #[must_use]
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.deadline
            .is_some_and(|d| now > d && self.status != DONE_TASK_STATUS)
    }
}

/// A user's private label for tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Unique category identifier.
    pub id: CategoryId,
    /// Name, unique per owner.
    pub name: String,
    /// `#RRGGBB` colour.
    pub color: String,
    /// Free-form description.
    pub description: String,
    /// The only user who sees and uses it.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}
