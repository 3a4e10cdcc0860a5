//! The per-project roster: who may touch a project, and in which role.
//!
//! A roster is a single ordered list of entries. The owner entry comes
//! first and always holds [`Role::Owner`]; it is reserved and can be neither
//! removed nor re-ranked. Every other entry carries a member role. One
//! identity appears at most once.
//!
//! Mutations only change the in-memory roster. Persisting it (and
//! announcing the change) is the caller's job.

use taskboard_proto::board::MemberRecord;
use taskboard_proto::id::{Timestamp, UserId};
use taskboard_proto::role::{MemberRole, Role};

/// Errors that can occur during roster mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    /// The identity is the owner or already holds a member record.
    #[error("user is already a member of this project")]
    AlreadyMember,
    /// The owner cannot be removed from their project.
    #[error("the project owner cannot be removed")]
    CannotRemoveOwner,
    /// The owner's role is fixed.
    #[error("the project owner's role cannot be changed")]
    CannotModifyOwner,
    /// No member record exists for the identity.
    #[error("member not found")]
    MemberNotFound,
}

/// One line of a roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// The member's identity.
    pub user: UserId,
    /// Effective role; `Owner` only for the owner entry.
    pub role: Role,
    /// When the entry was added.
    pub added_at: Timestamp,
}

/// Ordered membership list of one project.
///
/// The owner lives in its own slot, so a roster can never lose it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    owner: RosterEntry,
    members: Vec<RosterEntry>,
}

impl Roster {
    /// Creates a roster holding only its owner.
    #[must_use]
    pub fn new(owner: UserId, created_at: Timestamp) -> Self {
        Self {
            owner: RosterEntry {
                user: owner,
                role: Role::Owner,
                added_at: created_at,
            },
            members: Vec::new(),
        }
    }

    /// The project owner.
    #[must_use]
    pub const fn owner(&self) -> UserId {
        self.owner.user
    }

    /// Returns `true` if `user` owns the project.
    #[must_use]
    pub fn is_owner(&self, user: UserId) -> bool {
        self.owner() == user
    }

    /// The role `user` holds, or `None` if they have no access.
    #[must_use]
    pub fn resolve_role(&self, user: UserId) -> Option<Role> {
        self.entries().find(|e| e.user == user).map(|e| e.role)
    }

    /// Returns `true` if `user` has access at all (`required == None`) or
    /// holds a role satisfying `required`.
    #[must_use]
    pub fn has_access(&self, user: UserId, required: Option<Role>) -> bool {
        self.resolve_role(user)
            .is_some_and(|role| required.is_none_or(|req| role.satisfies(req)))
    }

    /// Adds a member record.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::AlreadyMember`] if `user` is the owner or
    /// already on the roster.
    pub fn add_member(
        &mut self,
        user: UserId,
        role: MemberRole,
        now: Timestamp,
    ) -> Result<(), RosterError> {
        if self.resolve_role(user).is_some() {
            return Err(RosterError::AlreadyMember);
        }
        self.members.push(RosterEntry {
            user,
            role: role.into(),
            added_at: now,
        });
        Ok(())
    }

    /// Removes a member record. Returns `false` if `user` was not on the roster.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::CannotRemoveOwner`] if `user` is the owner.
    pub fn remove_member(&mut self, user: UserId) -> Result<bool, RosterError> {
        if self.is_owner(user) {
            return Err(RosterError::CannotRemoveOwner);
        }
        let before = self.members.len();
        self.members.retain(|e| e.user != user);
        Ok(self.members.len() != before)
    }

    /// Changes a member's role.
    ///
    /// Authority to do so (owner only) is checked by the access guard.
    ///
    /// # Errors
    ///
    /// Returns [`RosterError::CannotModifyOwner`] for the owner and
    /// [`RosterError::MemberNotFound`] if `user` is not on the roster.
    pub fn change_role(&mut self, user: UserId, role: MemberRole) -> Result<(), RosterError> {
        if self.is_owner(user) {
            return Err(RosterError::CannotModifyOwner);
        }
        let entry = self
            .members
            .iter_mut()
            .find(|e| e.user == user)
            .ok_or(RosterError::MemberNotFound)?;
        entry.role = role.into();
        Ok(())
    }

    /// All entries, owner first.
    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        std::iter::once(&self.owner).chain(&self.members)
    }

    /// Non-owner entries in insertion order.
    pub fn members(&self) -> impl Iterator<Item = &RosterEntry> {
        self.members.iter()
    }

    /// Number of identities with access, owner included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len() + 1
    }

    /// A roster is never empty; it always holds its owner.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Member records as clients see them (owner excluded).
    #[must_use]
    pub fn member_records(&self) -> Vec<MemberRecord> {
        self.members()
            .filter_map(|e| {
                MemberRole::try_from(e.role).ok().map(|role| MemberRecord {
                    user: e.user,
                    role,
                    added_at: e.added_at,
                })
            })
            .collect()
    }
}
