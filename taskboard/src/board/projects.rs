//! Project and membership operations.

use taskboard_proto::board::{Column, DEFAULT_PROJECT_COLOR, Project, Task, default_columns};
use taskboard_proto::event::{BoardEvent, Entity, EntityRef};
use taskboard_proto::id::{ProjectId, UserId};
use taskboard_proto::role::{MemberRole, Role};

use super::Board;
use crate::error::BoardError;
use crate::identity::Caller;
use crate::project::{self, ProjectRecord};
use crate::roster::Roster;
use crate::store::{Commit, Expect, Versioned};

/// Input for [`Board::create_project`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProject {
    /// Required; trimmed, at most 100 characters.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// `#RRGGBB`; defaults to violet.
    pub color: Option<String>,
    /// Kanban columns; defaults to `Assigned`, `In Progress`, `Done`.
    pub columns: Option<Vec<Column>>,
    /// Free-form tags.
    pub tags: Vec<String>,
}

impl NewProject {
    /// A project with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Field changes for [`Board::update_project`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New colour.
    pub color: Option<String>,
    /// New tag list.
    pub tags: Option<Vec<String>>,
}

/// Which projects [`Board::list_projects`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProjectScope {
    /// Every project the caller can see.
    #[default]
    All,
    /// Projects the caller owns.
    Own,
    /// Projects the caller was added to.
    Invited,
}

impl ProjectScope {
    fn includes(self, record: &ProjectRecord, user: UserId) -> bool {
        let roster = &record.roster;
        match self {
            Self::All => roster.has_access(user, None),
            Self::Own => roster.is_owner(user),
            Self::Invited => !roster.is_owner(user) && roster.has_access(user, None),
        }
    }
}

impl Board {
    /// Creates a project owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for a bad name, colour or column list.
    pub async fn create_project(
        &self,
        caller: &Caller,
        input: NewProject,
    ) -> Result<Project, BoardError> {
        let name = project::validate_project_name(&input.name).map_err(BoardError::Validation)?;
        let color = match input.color {
            Some(raw) => project::validate_color(&raw).map_err(BoardError::Validation)?,
            None => DEFAULT_PROJECT_COLOR.to_string(),
        };
        let columns = match input.columns {
            Some(columns) => project::normalize_columns(columns).map_err(BoardError::Validation)?,
            None => default_columns(),
        };
        self.register_principal(caller.principal.clone()).await;
        let now = Self::now();
        let record = ProjectRecord {
            id: ProjectId::new(),
            name,
            description: input.description.trim().to_string(),
            color,
            roster: Roster::new(caller.user(), now),
            columns,
            tags: input.tags,
            is_archived: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store
            .commit(Commit::new().put_project(Expect::Absent, record.clone()))
            .await?;

        tracing::info!(project_id = %record.id, owner = %caller.user(), name = %record.name, "project created");
        let snapshot = record.snapshot();
        self.publish(
            caller,
            record.id,
            BoardEvent::Created(Entity::Project(snapshot.clone())),
        );
        Ok(snapshot)
    }

    /// Returns a project the caller can see.
    ///
    /// # Errors
    ///
    /// [`BoardError::ProjectNotFound`] or [`BoardError::Forbidden`].
    pub async fn get_project(&self, caller: &Caller, id: ProjectId) -> Result<Project, BoardError> {
        let (project, _) = self.guarded_project(caller, id, None).await?;
        Ok(project.value.snapshot())
    }

    /// Lists the caller's projects, active or archived, newest first.
    pub async fn list_projects(
        &self,
        caller: &Caller,
        scope: ProjectScope,
        archived: bool,
    ) -> Vec<Project> {
        let user = caller.user();
        self.store
            .projects_matching(|p| p.is_archived == archived && scope.includes(p, user))
            .await
            .into_iter()
            .map(|v| v.value.snapshot())
            .collect()
    }

    /// Changes a project's descriptive fields. Requires Collaborator.
    ///
    /// # Errors
    ///
    /// Not found, forbidden, or a validation failure on any patched field.
    pub async fn update_project(
        &self,
        caller: &Caller,
        id: ProjectId,
        patch: ProjectPatch,
    ) -> Result<Project, BoardError> {
        let name = patch
            .name
            .as_deref()
            .map(project::validate_project_name)
            .transpose()
            .map_err(BoardError::Validation)?;
        let color = patch
            .color
            .as_deref()
            .map(project::validate_color)
            .transpose()
            .map_err(BoardError::Validation)?;

        let updated = with_retries!(self, "update_project", {
            let (mut project, _) = self
                .guarded_project(caller, id, Some(Role::Collaborator))
                .await?;
            let record = &mut project.value;
            if let Some(name) = &name {
                record.name.clone_from(name);
            }
            if let Some(description) = &patch.description {
                record.description = description.trim().to_string();
            }
            if let Some(color) = &color {
                record.color.clone_from(color);
            }
            if let Some(tags) = &patch.tags {
                record.tags.clone_from(tags);
            }
            record.updated_at = Self::now();
            self.store
                .commit(Commit::new().put_project(Expect::Version(project.version), record.clone()))
                .await?;
            Ok(project.value)
        })?;

        tracing::info!(project_id = %id, user = %caller.user(), "project updated");
        Ok(self.publish_project(caller, &updated))
    }

    /// Replaces a project's Kanban columns. Requires Member.
    ///
    /// Tasks keep their status strings even if no column matches any more.
    ///
    /// # Errors
    ///
    /// Not found, forbidden, or an invalid column list.
    pub async fn update_columns(
        &self,
        caller: &Caller,
        id: ProjectId,
        columns: Vec<Column>,
    ) -> Result<Project, BoardError> {
        let columns = project::normalize_columns(columns).map_err(BoardError::Validation)?;
        let updated = with_retries!(self, "update_columns", {
            let (mut project, _) = self.guarded_project(caller, id, Some(Role::Member)).await?;
            project.value.columns.clone_from(&columns);
            project.value.updated_at = Self::now();
            self.store
                .commit(Commit::new().put_project(Expect::Version(project.version), project.value.clone()))
                .await?;
            Ok(project.value)
        })?;

        tracing::info!(project_id = %id, columns = updated.columns.len(), "project columns updated");
        Ok(self.publish_project(caller, &updated))
    }

    /// Archives a project and every active task in it. Owner only.
    ///
    /// # Errors
    ///
    /// Not found or forbidden.
    pub async fn archive_project(&self, caller: &Caller, id: ProjectId) -> Result<Project, BoardError> {
        self.set_archived(caller, id, true).await
    }

    /// Restores a project and every archived task in it. Owner only.
    ///
    /// # Errors
    ///
    /// Not found or forbidden.
    pub async fn restore_project(&self, caller: &Caller, id: ProjectId) -> Result<Project, BoardError> {
        self.set_archived(caller, id, false).await
    }

    async fn set_archived(
        &self,
        caller: &Caller,
        id: ProjectId,
        archived: bool,
    ) -> Result<Project, BoardError> {
        let (updated, tasks) = with_retries!(self, "set_project_archived", {
            let (mut project, _) = self.guarded_project(caller, id, Some(Role::Owner)).await?;
            let now = Self::now();
            project.value.is_archived = archived;
            project.value.archived_at = archived.then_some(now);
            project.value.updated_at = now;

            let tasks = self.store.tasks_matching(|t| t.project == Some(id)).await;
            let mut commit = Commit::new()
                .put_project(Expect::Version(project.version), project.value.clone())
                .check_project_tasks(id, tasks.iter().map(|t| t.value.id));
            let mut cascaded: Vec<Task> = Vec::new();
            for Versioned { version, value } in tasks {
                if value.is_archived == archived {
                    continue;
                }
                let mut task = value;
                task.is_archived = archived;
                task.archived_at = archived.then_some(now);
                task.updated_at = now;
                commit = commit.put_task(Expect::Version(version), task.clone());
                cascaded.push(task);
            }
            self.store.commit(commit).await?;
            Ok((project.value, cascaded))
        })?;

        tracing::info!(
            project_id = %id,
            archived,
            tasks = tasks.len(),
            "project archive state changed"
        );
        let snapshot = self.publish_project(caller, &updated);
        for task in tasks {
            self.publish(caller, id, BoardEvent::Updated(Entity::Task(task)));
        }
        Ok(snapshot)
    }

    /// Deletes a project, its tasks and its invitations. Owner only.
    ///
    /// # Errors
    ///
    /// Not found or forbidden.
    pub async fn delete_project(&self, caller: &Caller, id: ProjectId) -> Result<(), BoardError> {
        let removed = with_retries!(self, "delete_project", {
            let (project, _) = self.guarded_project(caller, id, Some(Role::Owner)).await?;
            let tasks = self.store.tasks_matching(|t| t.project == Some(id)).await;
            let mut commit = Commit::new()
                .delete_project(id, project.version)
                .check_project_tasks(id, tasks.iter().map(|t| t.value.id));
            let mut removed = Vec::new();
            for task in tasks {
                commit = commit.delete_task(task.value.id, task.version);
                removed.push(task.value.id);
            }
            self.store.commit(commit).await?;
            Ok(removed)
        })?;
        let invitations = self.store.purge_invitations(|i| i.project == id).await;

        tracing::info!(
            project_id = %id,
            tasks = removed.len(),
            invitations,
            "project deleted"
        );
        for task in removed {
            self.publish(caller, id, BoardEvent::Deleted(EntityRef::Task(task)));
        }
        self.publish(caller, id, BoardEvent::Deleted(EntityRef::Project(id)));
        Ok(())
    }

    /// Removes the caller from a project they were added to.
    ///
    /// # Errors
    ///
    /// [`BoardError::OwnerCannotLeave`] for the owner; not found or
    /// forbidden if the caller has no access.
    pub async fn leave_project(&self, caller: &Caller, id: ProjectId) -> Result<(), BoardError> {
        let updated = with_retries!(self, "leave_project", {
            let (mut project, auth) = self.guarded_project(caller, id, None).await?;
            if auth.role == Role::Owner {
                return Err(BoardError::OwnerCannotLeave);
            }
            project.value.roster.remove_member(auth.user)?;
            project.value.updated_at = Self::now();
            self.store
                .commit(Commit::new().put_project(Expect::Version(project.version), project.value.clone()))
                .await?;
            Ok(project.value)
        })?;

        tracing::info!(project_id = %id, user = %caller.user(), "member left project");
        self.publish_project(caller, &updated);
        Ok(())
    }

    /// Removes a member. Requires Collaborator. Removing someone who is not
    /// on the roster changes nothing.
    ///
    /// # Errors
    ///
    /// [`RosterError::CannotRemoveOwner`](crate::roster::RosterError) for
    /// the owner; not found or forbidden.
    pub async fn remove_member(
        &self,
        caller: &Caller,
        id: ProjectId,
        member: UserId,
    ) -> Result<Project, BoardError> {
        let (updated, removed) = with_retries!(self, "remove_member", {
            let (mut project, _) = self
                .guarded_project(caller, id, Some(Role::Collaborator))
                .await?;
            if !project.value.roster.remove_member(member)? {
                return Ok((project.value, false));
            }
            project.value.updated_at = Self::now();
            self.store
                .commit(Commit::new().put_project(Expect::Version(project.version), project.value.clone()))
                .await?;
            Ok((project.value, true))
        })?;

        if !removed {
            tracing::debug!(project_id = %id, member = %member, "member already absent");
            return Ok(updated.snapshot());
        }
        tracing::info!(project_id = %id, member = %member, by = %caller.user(), "member removed");
        Ok(self.publish_project(caller, &updated))
    }

    /// Changes a member's role. Owner only.
    ///
    /// # Errors
    ///
    /// `CannotModifyOwner` when targeting the owner, `MemberNotFound` when
    /// the target is not on the roster; not found or forbidden.
    pub async fn change_member_role(
        &self,
        caller: &Caller,
        id: ProjectId,
        member: UserId,
        role: MemberRole,
    ) -> Result<Project, BoardError> {
        let updated = with_retries!(self, "change_member_role", {
            let (mut project, _) = self.guarded_project(caller, id, Some(Role::Owner)).await?;
            project.value.roster.change_role(member, role)?;
            project.value.updated_at = Self::now();
            self.store
                .commit(Commit::new().put_project(Expect::Version(project.version), project.value.clone()))
                .await?;
            Ok(project.value)
        })?;

        tracing::info!(project_id = %id, member = %member, role = %role, "member role changed");
        Ok(self.publish_project(caller, &updated))
    }

    fn publish_project(&self, caller: &Caller, record: &ProjectRecord) -> Project {
        let snapshot = record.snapshot();
        self.publish(
            caller,
            record.id,
            BoardEvent::Updated(Entity::Project(snapshot.clone())),
        );
        snapshot
    }
}
