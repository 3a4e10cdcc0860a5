//! Request-time authorization.
//!
//! The guard is pure: it inspects a roster (or a personal task's creator)
//! and either authorizes the caller with their resolved role or refuses.
//! Looking the project up, and reporting `ProjectNotFound` when it is gone,
//! happens in the board before the guard runs.

use taskboard_proto::board::Task;
use taskboard_proto::id::UserId;
use taskboard_proto::role::Role;

use crate::error::BoardError;
use crate::roster::Roster;

/// Proof that a caller passed the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorized {
    /// The authorized identity.
    pub user: UserId,
    /// Their role on the project. Creators of personal tasks report `Owner`.
    pub role: Role,
}

/// Checks `user` against `roster`. `required == None` means any access.
///
/// # Errors
///
/// Returns [`BoardError::Forbidden`] if the user lacks access.
pub fn authorize(
    roster: &Roster,
    user: UserId,
    required: Option<Role>,
) -> Result<Authorized, BoardError> {
    match roster.resolve_role(user) {
        Some(role) if required.is_none_or(|req| role.satisfies(req)) => {
            Ok(Authorized { user, role })
        }
        Some(role) => Err(BoardError::Forbidden(format!(
            "requires {} access, caller is {role}",
            required.map_or("any", Role::as_str)
        ))),
        None => Err(BoardError::Forbidden(
            "caller has no access to this project".to_string(),
        )),
    }
}

/// What a caller wants to do with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Read it.
    View,
    /// Create, change, archive, restore or reorder it.
    Edit,
    /// Remove it for good.
    Delete,
}

impl TaskAction {
    /// Role required on the owning project.
    #[must_use]
    pub const fn required_role(self) -> Option<Role> {
        match self {
            Self::View => None,
            Self::Edit => Some(Role::Member),
            Self::Delete => Some(Role::Collaborator),
        }
    }
}

/// Authorizes access to a personal task: only its creator gets in.
///
/// # Errors
///
/// Returns [`BoardError::Forbidden`] for anyone else.
pub fn authorize_personal(task: &Task, user: UserId) -> Result<Authorized, BoardError> {
    if task.created_by == user {
        Ok(Authorized {
            user,
            role: Role::Owner,
        })
    } else {
        Err(BoardError::Forbidden(
            "personal tasks are visible to their creator only".to_string(),
        ))
    }
}
