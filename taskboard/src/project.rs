//! Stored project records and field validation.

use taskboard_proto::board::{Column, Project};
use taskboard_proto::id::{ProjectId, Timestamp, UserId};

use crate::roster::Roster;

/// Longest accepted project name, after trimming.
pub const MAX_PROJECT_NAME_LEN: usize = 100;

/// Longest accepted task title, after trimming.
pub const MAX_TASK_TITLE_LEN: usize = 200;

/// A project as the store keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    /// Unique identifier.
    pub id: ProjectId,
    /// Trimmed name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// `#RRGGBB` colour.
    pub color: String,
    /// Owner and members.
    pub roster: Roster,
    /// Kanban columns ordered by `order`.
    pub columns: Vec<Column>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Archived flag.
    pub is_archived: bool,
    /// When the project was archived.
    pub archived_at: Option<Timestamp>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl ProjectRecord {
    /// The project owner.
    #[must_use]
    pub fn owner(&self) -> UserId {
        self.roster.owner()
    }

    /// Renders the client-facing snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Project {
        Project {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            color: self.color.clone(),
            owner: self.roster.owner(),
            members: self.roster.member_records(),
            columns: self.columns.clone(),
            tags: self.tags.clone(),
            is_archived: self.is_archived,
            archived_at: self.archived_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Trims and checks a project name.
///
/// # Errors
///
/// Returns a message if the name is blank or too long.
pub fn validate_project_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("project name is required".to_string());
    }
    if name.chars().count() > MAX_PROJECT_NAME_LEN {
        return Err(format!(
            "project name must be at most {MAX_PROJECT_NAME_LEN} characters"
        ));
    }
    Ok(name.to_string())
}

/// Trims and checks a task title.
///
/// # Errors
///
/// Returns a message if the title is blank or too long.
pub fn validate_task_title(raw: &str) -> Result<String, String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err("task title is required".to_string());
    }
    if title.chars().count() > MAX_TASK_TITLE_LEN {
        return Err(format!(
            "task title must be at most {MAX_TASK_TITLE_LEN} characters"
        ));
    }
    Ok(title.to_string())
}

/// Checks a `#RRGGBB` colour and normalizes it to upper case.
///
/// # Errors
///
/// Returns a message if the colour is not six hex digits after `#`.
pub fn validate_color(raw: &str) -> Result<String, String> {
    let hex = raw.trim();
    match hex.strip_prefix('#') {
        Some(digits) if digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit()) => {
            Ok(hex.to_ascii_uppercase())
        }
        _ => Err(format!("invalid colour {raw:?} (expected #RRGGBB)")),
    }
}

/// Checks a column list: names non-blank and unique. Orders are reassigned
/// from the list position.
///
/// # Errors
///
/// Returns a message describing the first offending column.
pub fn normalize_columns(columns: Vec<Column>) -> Result<Vec<Column>, String> {
    let mut sorted = columns;
    sorted.sort_by_key(|c| c.order);
    let mut out: Vec<Column> = Vec::with_capacity(sorted.len());
    for (order, column) in (0u32..).zip(sorted) {
        let name = column.name.trim();
        if name.is_empty() {
            return Err("column name is required".to_string());
        }
        if out.iter().any(|c| c.name == name) {
            return Err(format!("duplicate column {name:?}"));
        }
        out.push(Column::new(name, order));
    }
    Ok(out)
}
