//! Project roles and their ordering.
//!
//! Roles form a total order `Viewer < Member < Collaborator < Owner`.
//! [`Role::satisfies`] is the only access predicate; everything that gates
//! an operation on a project reduces to it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors produced when a role cannot be parsed or assigned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    /// The string does not name a role.
    #[error("unknown role: {0:?}")]
    Unknown(String),
    /// `Owner` was requested where only member roles are allowed.
    #[error("the owner role cannot be assigned to a member")]
    OwnerNotAssignable,
}

/// A rank determining which operations a user may perform on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Read-only access.
    Viewer,
    /// May create and edit tasks.
    Member,
    /// May edit the project, invite and remove members, delete tasks.
    Collaborator,
    /// The project's creator. Implicit, never assigned.
    Owner,
}

impl Role {
    /// All roles in ascending order.
    pub const ALL: [Self; 4] = [Self::Viewer, Self::Member, Self::Collaborator, Self::Owner];

    /// Numeric rank: Viewer=1, Member=2, Collaborator=3, Owner=4.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Viewer => 1,
            Self::Member => 2,
            Self::Collaborator => 3,
            Self::Owner => 4,
        }
    }

    /// Returns `true` if a holder of `self` meets the `required` role.
    #[must_use]
    pub const fn satisfies(self, required: Self) -> bool {
        self.rank() >= required.rank()
    }

    /// Canonical name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "Viewer",
            Self::Member => "Member",
            Self::Collaborator => "Collaborator",
            Self::Owner => "Owner",
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RoleError::Unknown(s.to_string()))
    }
}

/// The subset of roles that can be stored on a member record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRole {
    /// See [`Role::Viewer`].
    Viewer,
    /// See [`Role::Member`].
    Member,
    /// See [`Role::Collaborator`].
    Collaborator,
}

impl From<MemberRole> for Role {
    fn from(role: MemberRole) -> Self {
        match role {
            MemberRole::Viewer => Self::Viewer,
            MemberRole::Member => Self::Member,
            MemberRole::Collaborator => Self::Collaborator,
        }
    }
}

impl TryFrom<Role> for MemberRole {
    type Error = RoleError;

    fn try_from(role: Role) -> Result<Self, Self::Error> {
        match role {
            Role::Viewer => Ok(Self::Viewer),
            Role::Member => Ok(Self::Member),
            Role::Collaborator => Ok(Self::Collaborator),
            Role::Owner => Err(RoleError::OwnerNotAssignable),
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Role::from(*self).as_str())
    }
}

impl FromStr for MemberRole {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Role>().and_then(Self::try_from)
    }
}
