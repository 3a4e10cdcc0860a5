//! Outbound notifications (invitation mail and friends).
//!
//! Delivery is best effort: the board spawns the send after its commit and
//! only logs failures.

use futures_util::future::BoxFuture;
use taskboard_proto::id::Timestamp;
use taskboard_proto::role::MemberRole;

use crate::identity::Email;

/// A templated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Someone was invited to join a project.
    ProjectInvitation {
        /// Name of the project.
        project_name: String,
        /// Display name of the inviter.
        inviter_name: String,
        /// Role granted on acceptance.
        role: MemberRole,
        /// Link that carries the invitation token.
        accept_url: String,
        /// When the invitation stops being redeemable.
        expires_at: Timestamp,
    },
}

impl Notice {
    /// Template name the delivery backend renders.
    #[must_use]
    pub const fn template(&self) -> &'static str {
        match self {
            Self::ProjectInvitation { .. } => "project-invitation",
        }
    }
}

/// Errors that can occur while delivering a notice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    /// The backend refused or failed to deliver.
    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Delivers notices to addresses.
pub trait Notifier: Send + Sync {
    /// Sends `notice` to `to`.
    fn notify<'a>(&'a self, to: &'a Email, notice: Notice) -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// Writes notices to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify<'a>(&'a self, to: &'a Email, notice: Notice) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            match &notice {
                Notice::ProjectInvitation {
                    project_name,
                    inviter_name,
                    role,
                    accept_url,
                    expires_at,
                } => tracing::info!(
                    to = %to,
                    template = notice.template(),
                    project = %project_name,
                    inviter = %inviter_name,
                    role = %role,
                    accept_url = %accept_url,
                    expires_at = %expires_at,
                    "notice delivered to log"
                ),
            }
            Ok(())
        })
    }
}
