//! Errors surfaced by board operations.

use taskboard_proto::socket::ErrorKind;

use crate::invitation::RedeemError;
use crate::roster::RosterError;
use crate::store::StoreError;

/// Errors returned by [`Board`](crate::Board) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The project does not exist.
    #[error("project not found")]
    ProjectNotFound,
    /// The task does not exist.
    #[error("task not found")]
    TaskNotFound,
    /// No invitation carries the token.
    #[error("invitation not found")]
    InvitationNotFound,
    /// The category does not exist or belongs to someone else.
    #[error("category not found")]
    CategoryNotFound,
    /// The caller already has a category with this name.
    #[error("a category with this name already exists")]
    DuplicateCategory,
    /// Tasks still reference the category.
    #[error("category is used by {tasks} task(s)")]
    CategoryInUse {
        /// How many tasks reference it.
        tasks: usize,
    },
    /// The caller lacks the required access.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// A roster rule was violated.
    #[error(transparent)]
    Roster(#[from] RosterError),
    /// A live invitation already exists for the project and address.
    #[error("a pending invitation already exists for this address")]
    DuplicateInvitation,
    /// The invitation was sent to someone else.
    #[error("invitation was sent to a different address")]
    WrongRecipient,
    /// The invitation is past its horizon.
    #[error("invitation has expired")]
    Expired,
    /// The invitation was already accepted.
    #[error("invitation has already been used")]
    AlreadyUsed,
    /// Owners cannot leave their own project.
    #[error("the owner cannot leave the project")]
    OwnerCannotLeave,
    /// The operation needs an active (non-archived) project.
    #[error("project is archived")]
    ProjectArchived,
    /// Malformed input.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The store rejected the commit.
    #[error("store error: {0}")]
    Store(StoreError),
    /// Retries were exhausted or a collaborator failed.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl BoardError {
    /// The stable category clients branch on.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ProjectNotFound
            | Self::TaskNotFound
            | Self::InvitationNotFound
            | Self::CategoryNotFound
            | Self::Roster(RosterError::MemberNotFound) => ErrorKind::NotFound,
            Self::Forbidden(_) | Self::WrongRecipient => ErrorKind::Forbidden,
            Self::Roster(_)
            | Self::DuplicateInvitation
            | Self::DuplicateCategory
            | Self::CategoryInUse { .. }
            | Self::AlreadyUsed
            | Self::OwnerCannotLeave
            | Self::ProjectArchived => ErrorKind::Conflict,
            Self::Expired => ErrorKind::Expired,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Store(_) | Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<StoreError> for BoardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateInvitation { .. } => Self::DuplicateInvitation,
            StoreError::DuplicateCategory { .. } => Self::DuplicateCategory,
            StoreError::CategoryInUse { tasks, .. } => Self::CategoryInUse { tasks },
            StoreError::MissingCategory(id) => Self::Validation(format!("category {id} does not exist")),
            other @ StoreError::Conflict(_) => Self::Store(other),
        }
    }
}

impl From<RedeemError> for BoardError {
    fn from(err: RedeemError) -> Self {
        match err {
            RedeemError::WrongRecipient => Self::WrongRecipient,
            RedeemError::Expired => Self::Expired,
            RedeemError::AlreadyUsed => Self::AlreadyUsed,
        }
    }
}
