//! Invitation operations: issue, preview, accept, sweep.

use std::sync::Arc;

use taskboard_proto::board::Project;
use taskboard_proto::event::{BoardEvent, Entity};
use taskboard_proto::id::ProjectId;
use taskboard_proto::role::{MemberRole, Role};

use super::Board;
use crate::error::BoardError;
use crate::identity::{Caller, Email};
use crate::invitation::{Invitation, InvitationStatus, InvitationToken};
use crate::notify::Notice;
use crate::roster::RosterError;
use crate::store::{Commit, Expect};

impl Board {
    /// Invites `email` to a project with `role`. Requires Collaborator.
    ///
    /// The notice is sent in the background after the invitation is
    /// stored; a delivery failure is logged and does not fail the call.
    ///
    /// # Errors
    ///
    /// - [`BoardError::Validation`] for a malformed address.
    /// - [`BoardError::ProjectNotFound`] / [`BoardError::Forbidden`].
    /// - `AlreadyMember` if the address belongs to someone on the roster.
    /// - [`BoardError::DuplicateInvitation`] if a live one already exists.
    pub async fn create_invitation(
        &self,
        caller: &Caller,
        project: ProjectId,
        email: &str,
        role: MemberRole,
    ) -> Result<Invitation, BoardError> {
        let email = Email::parse(email).map_err(|e| BoardError::Validation(e.to_string()))?;
        self.register_principal(caller.principal.clone()).await;
        let invitee = self.store.user_by_email(&email).await;

        let (invitation, project_name) = with_retries!(self, "create_invitation", {
            let (record, _) = self
                .guarded_project(caller, project, Some(Role::Collaborator))
                .await?;
            if email == *caller.email()
                || invitee
                    .as_ref()
                    .is_some_and(|u| record.value.roster.has_access(u.id, None))
            {
                return Err(BoardError::Roster(RosterError::AlreadyMember));
            }
            let now = Self::now();
            let invitation = Invitation::issue(
                project,
                email.clone(),
                role,
                caller.user(),
                now,
                self.policy.invitation_ttl,
            );
            self.store
                .commit(Commit::new().insert_invitation(invitation.clone(), now))
                .await?;
            Ok((invitation, record.value.name))
        })?;

        tracing::info!(
            project_id = %project,
            email = %invitation.email,
            role = %role,
            by = %caller.user(),
            "invitation issued"
        );
        self.send_invitation_notice(&invitation, project_name, caller.principal.name.clone());
        Ok(invitation)
    }

    /// Looks an invitation up by token, reporting its status as of now.
    ///
    /// # Errors
    ///
    /// [`BoardError::InvitationNotFound`] for an unknown token.
    pub async fn resolve_invitation(&self, token: &str) -> Result<Invitation, BoardError> {
        let mut invitation = self
            .store
            .invitation(token)
            .await
            .ok_or(BoardError::InvitationNotFound)?
            .value;
        invitation.status = invitation.effective_status(Self::now());
        Ok(invitation)
    }

    /// Redeems an invitation for the caller, adding them to the roster.
    ///
    /// The roster change and the status flip commit together, so of two
    /// racing accepts exactly one succeeds and the other sees `AlreadyUsed`.
    ///
    /// # Errors
    ///
    /// In order of precedence: [`BoardError::InvitationNotFound`],
    /// [`BoardError::WrongRecipient`], [`BoardError::Expired`],
    /// [`BoardError::AlreadyUsed`]; then `ProjectNotFound` if the project
    /// is gone and `AlreadyMember` if the caller already has access (the
    /// invitation stays pending in that case).
    pub async fn accept_invitation(&self, caller: &Caller, token: &str) -> Result<Project, BoardError> {
        self.register_principal(caller.principal.clone()).await;

        let updated = with_retries!(self, "accept_invitation", {
            let (mut invitation, project) = self
                .store
                .invitation_with_project(token)
                .await
                .ok_or(BoardError::InvitationNotFound)?;
            let now = Self::now();
            invitation.value.check_redeemable(caller.email(), now)?;

            let mut project = project.ok_or(BoardError::ProjectNotFound)?;
            project
                .value
                .roster
                .add_member(caller.user(), invitation.value.role, now)?;
            project.value.updated_at = now;
            invitation.value.status = InvitationStatus::Accepted;

            self.store
                .commit(
                    Commit::new()
                        .put_project(Expect::Version(project.version), project.value.clone())
                        .put_invitation(invitation.version, invitation.value),
                )
                .await?;
            Ok(project.value)
        })?;

        tracing::info!(project_id = %updated.id, user = %caller.user(), "invitation accepted");
        let snapshot = updated.snapshot();
        self.publish(
            caller,
            updated.id,
            BoardEvent::Updated(Entity::Project(snapshot.clone())),
        );
        Ok(snapshot)
    }

    /// Drops invitations whose horizon has passed. Returns how many went.
    ///
    /// Nothing depends on this running; expiry is always evaluated lazily.
    pub async fn purge_expired_invitations(&self) -> usize {
        let now = Self::now();
        let purged = self.store.purge_invitations(|i| i.is_expired(now)).await;
        if purged > 0 {
            tracing::info!(purged, "expired invitations purged");
        }
        purged
    }

    fn send_invitation_notice(&self, invitation: &Invitation, project_name: String, inviter_name: String) {
        let notice = Notice::ProjectInvitation {
            project_name,
            inviter_name,
            role: invitation.role,
            accept_url: self.accept_link(&invitation.token),
            expires_at: invitation.expires_at,
        };
        let notifier = Arc::clone(&self.notifier);
        let to = invitation.email.clone();
        let project = invitation.project;
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&to, notice).await {
                tracing::warn!(project_id = %project, to = %to, error = %e, "failed to send invitation notice");
            }
        });
    }

    fn accept_link(&self, token: &InvitationToken) -> String {
        self.policy.accept_url.as_ref().map_or_else(
            || token.to_string(),
            |base| {
                let mut url = base.clone();
                url.query_pairs_mut().append_pair("token", token.as_str());
                url.to_string()
            },
        )
    }
}
