//! Project invitations.
//!
//! An invitation is a single-use, time-bounded token that grafts the
//! invited email's owner onto a project roster. Expiry is evaluated lazily
//! against the clock: a stored `Pending` past its horizon behaves exactly
//! like `Expired`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskboard_proto::id::{ProjectId, Timestamp, UserId};
use taskboard_proto::role::MemberRole;

use crate::identity::Email;

/// How long an invitation stays redeemable unless configured otherwise.
pub const DEFAULT_INVITATION_TTL: Duration = Duration::from_secs(72 * 60 * 60);

/// Number of random bytes behind a token.
const TOKEN_BYTES: usize = 32;

/// An opaque, unguessable invitation token (64 lowercase hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvitationToken(String);

impl InvitationToken {
    /// Draws a fresh token from the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; TOKEN_BYTES] = rand::random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// The token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvitationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state. `Accepted` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvitationStatus {
    /// Waiting for the invitee.
    Pending,
    /// Redeemed; the invitee is on the roster.
    Accepted,
    /// Past its horizon.
    Expired,
}

/// Why an invitation cannot be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RedeemError {
    /// The accepting identity's email differs from the invited one.
    #[error("invitation was sent to a different address")]
    WrongRecipient,
    /// The invitation is past its horizon.
    #[error("invitation has expired")]
    Expired,
    /// The invitation was already accepted.
    #[error("invitation has already been used")]
    AlreadyUsed,
}

/// A stored invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    /// Lookup key, sent to the invitee.
    pub token: InvitationToken,
    /// Target project.
    pub project: ProjectId,
    /// Invited address.
    pub email: Email,
    /// Role granted on acceptance.
    pub role: MemberRole,
    /// Who sent it.
    pub invited_by: UserId,
    /// Stored status; see [`Invitation::effective_status`].
    pub status: InvitationStatus,
    /// End of the redeemable window.
    pub expires_at: Timestamp,
    /// Issue time.
    pub created_at: Timestamp,
}

impl Invitation {
    /// Issues a pending invitation with a fresh token.
    #[must_use]
    pub fn issue(
        project: ProjectId,
        email: Email,
        role: MemberRole,
        invited_by: UserId,
        now: Timestamp,
        ttl: Duration,
    ) -> Self {
        Self {
            token: InvitationToken::generate(),
            project,
            email,
            role,
            invited_by,
            status: InvitationStatus::Pending,
            expires_at: now.saturating_add(ttl),
            created_at: now,
        }
    }

    /// Returns `true` once the horizon has passed or the stored status says so.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.status == InvitationStatus::Expired || now > self.expires_at
    }

    /// Returns `true` for a pending invitation still inside its window.
    #[must_use]
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired(now)
    }

    /// Status as observed at `now`. Past the horizon every invitation reads
    /// as `Expired`, whatever was stored, so reads agree with redemption.
    #[must_use]
    pub fn effective_status(&self, now: Timestamp) -> InvitationStatus {
        if self.is_expired(now) {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }

    /// Checks whether `email` may redeem this invitation at `now`.
    ///
    /// Recipient is checked first, then expiry, then prior use.
    ///
    /// # Errors
    ///
    /// Returns the first [`RedeemError`] that applies.
    pub fn check_redeemable(&self, email: &Email, now: Timestamp) -> Result<(), RedeemError> {
        if &self.email != email {
            return Err(RedeemError::WrongRecipient);
        }
        if self.is_expired(now) {
            return Err(RedeemError::Expired);
        }
        if self.status != InvitationStatus::Pending {
            return Err(RedeemError::AlreadyUsed);
        }
        Ok(())
    }
}
