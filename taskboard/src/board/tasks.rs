//! Task operations.
//!
//! A project task is guarded by its project's roster; a personal task
//! (no project) is visible and mutable only by its creator.

use taskboard_proto::board::{DEFAULT_TASK_STATUS, Priority, Task};
use taskboard_proto::event::{BoardEvent, Entity, EntityRef};
use taskboard_proto::id::{CategoryId, ProjectId, TaskId, Timestamp, UserId};

use super::Board;
use crate::error::BoardError;
use crate::guard::{self, TaskAction};
use crate::identity::Caller;
use crate::project::{self, ProjectRecord};
use crate::store::{Commit, Expect, Versioned};

/// Input for [`Board::create_task`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    /// Required; trimmed, at most 200 characters.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Owning project; `None` makes a personal task.
    pub project: Option<ProjectId>,
    /// Optional category; must be one of the caller's.
    pub category: Option<CategoryId>,
    /// Urgency.
    pub priority: Priority,
    /// Initial status; defaults to `Assigned`.
    pub status: Option<String>,
    /// Optional assignee; must have access to the project.
    pub assignee: Option<UserId>,
    /// Optional due date.
    pub deadline: Option<Timestamp>,
    /// Free-form tags.
    pub tags: Vec<String>,
}

impl NewTask {
    /// A personal task with just a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Places the task in `project`.
    #[must_use]
    pub const fn in_project(mut self, project: ProjectId) -> Self {
        self.project = Some(project);
        self
    }
}

/// Field changes for [`Board::update_task`].
///
/// The outer `Option` says whether to touch a field; for clearable fields
/// the inner `None` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New or cleared category; a new one must be the caller's.
    pub category: Option<Option<CategoryId>>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New status.
    pub status: Option<String>,
    /// New or cleared assignee.
    pub assignee: Option<Option<UserId>>,
    /// New or cleared deadline.
    pub deadline: Option<Option<Timestamp>>,
    /// New tag list.
    pub tags: Option<Vec<String>>,
}

/// Which tasks [`Board::list_tasks`] looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskScope {
    /// Tasks of one project.
    Project(ProjectId),
    /// The caller's personal tasks.
    Personal,
    /// Personal tasks plus tasks of every active project the caller can see.
    #[default]
    Dashboard,
}

/// Optional filters applied on top of a [`TaskScope`]. All given filters
/// must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Exact status.
    pub status: Option<String>,
    /// Exact category.
    pub category: Option<CategoryId>,
    /// Exact priority.
    pub priority: Option<Priority>,
    /// Exact assignee.
    pub assignee: Option<UserId>,
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
}

impl TaskFilter {
    fn matches(&self, task: &Task, needle: Option<&str>) -> bool {
        self.status.as_ref().is_none_or(|s| &task.status == s)
            && self.category.is_none_or(|c| task.category == Some(c))
            && self.priority.is_none_or(|p| task.priority == p)
            && self.assignee.is_none_or(|a| task.assignee == Some(a))
            && needle.is_none_or(|n| {
                task.title.to_lowercase().contains(n) || task.description.to_lowercase().contains(n)
            })
    }
}

/// A drag-and-drop move on the Kanban board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMove {
    /// The moved task.
    pub id: TaskId,
    /// Column (status) it lands in.
    pub status: String,
    /// New position within the column.
    pub order: i64,
}

fn validate_assignee(
    project: Option<&ProjectRecord>,
    creator: UserId,
    assignee: Option<UserId>,
) -> Result<(), BoardError> {
    let Some(assignee) = assignee else {
        return Ok(());
    };
    let allowed = project.map_or(assignee == creator, |p| p.roster.has_access(assignee, None));
    if allowed {
        Ok(())
    } else {
        Err(BoardError::Validation(format!(
            "assignee {assignee} has no access to this task's project"
        )))
    }
}

impl Board {
    /// Loads a task and checks `caller` may perform `action` on it.
    async fn guarded_task(
        &self,
        caller: &Caller,
        id: TaskId,
        action: TaskAction,
    ) -> Result<(Versioned<Task>, Option<Versioned<ProjectRecord>>), BoardError> {
        let task = self.store.task(id).await.ok_or(BoardError::TaskNotFound)?;
        match task.value.project {
            Some(project_id) => {
                let project = self
                    .store
                    .project(project_id)
                    .await
                    .ok_or(BoardError::ProjectNotFound)?;
                guard::authorize(&project.value.roster, caller.user(), action.required_role())?;
                Ok((task, Some(project)))
            }
            None => {
                guard::authorize_personal(&task.value, caller.user())?;
                Ok((task, None))
            }
        }
    }

    fn publish_task(&self, caller: &Caller, event: BoardEvent, project: Option<ProjectId>) {
        if let Some(project) = project {
            self.publish(caller, project, event);
        }
    }

    /// Creates a task. Project tasks require Member on an active project.
    ///
    /// The project's version is part of the commit, so a task never lands
    /// in a project that was archived after the check.
    ///
    /// # Errors
    ///
    /// Validation, not found, forbidden, or [`BoardError::ProjectArchived`].
    pub async fn create_task(&self, caller: &Caller, input: NewTask) -> Result<Task, BoardError> {
        let NewTask {
            title,
            description,
            project: project_id,
            category,
            priority,
            status,
            assignee,
            deadline,
            tags,
        } = input;
        let title = project::validate_task_title(&title).map_err(BoardError::Validation)?;
        let description = description.trim().to_string();
        let status = status
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TASK_STATUS.to_string());

        let task = with_retries!(self, "create_task", {
            let mut commit = Commit::new();
            let project = match project_id {
                Some(id) => {
                    let (project, _) = self
                        .guarded_project(caller, id, TaskAction::Edit.required_role())
                        .await?;
                    if project.value.is_archived {
                        return Err(BoardError::ProjectArchived);
                    }
                    commit = commit.check_project(id, project.version);
                    Some(project.value)
                }
                None => None,
            };
            validate_assignee(project.as_ref(), caller.user(), assignee)?;
            self.check_task_category(caller, category).await?;

            let now = Self::now();
            let task = Task {
                id: TaskId::new(),
                title: title.clone(),
                description: description.clone(),
                project: project_id,
                category,
                priority,
                status: status.clone(),
                assignee,
                deadline,
                tags: tags.clone(),
                created_by: caller.user(),
                is_archived: false,
                archived_at: None,
                order: 0,
                created_at: now,
                updated_at: now,
            };
            self.store
                .commit(commit.put_task(Expect::Absent, task.clone()))
                .await?;
            Ok(task)
        })?;

        tracing::info!(task_id = %task.id, project_id = ?task.project, user = %caller.user(), "task created");
        self.publish_task(caller, BoardEvent::Created(Entity::Task(task.clone())), task.project);
        Ok(task)
    }

    /// Returns a task the caller can see.
    ///
    /// # Errors
    ///
    /// Not found or forbidden.
    pub async fn get_task(&self, caller: &Caller, id: TaskId) -> Result<Task, BoardError> {
        let (task, _) = self.guarded_task(caller, id, TaskAction::View).await?;
        Ok(task.value)
    }

    /// Lists active tasks in `scope` matching `filter`, by board position
    /// then newest first.
    ///
    /// # Errors
    ///
    /// Not found or forbidden for a [`TaskScope::Project`] the caller cannot see.
    pub async fn list_tasks(
        &self,
        caller: &Caller,
        scope: TaskScope,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, BoardError> {
        let user = caller.user();
        let needle = filter.search.as_deref().map(str::to_lowercase);
        let needle = needle.as_deref();
        let tasks = match scope {
            TaskScope::Project(id) => {
                self.guarded_project(caller, id, None).await?;
                self.store
                    .tasks_matching(|t| {
                        !t.is_archived && t.project == Some(id) && filter.matches(t, needle)
                    })
                    .await
            }
            TaskScope::Personal => {
                self.store
                    .tasks_matching(|t| {
                        !t.is_archived && t.is_personal() && t.created_by == user && filter.matches(t, needle)
                    })
                    .await
            }
            TaskScope::Dashboard => {
                let visible: Vec<ProjectId> = self
                    .store
                    .projects_matching(|p| !p.is_archived && p.roster.has_access(user, None))
                    .await
                    .into_iter()
                    .map(|p| p.value.id)
                    .collect();
                self.store
                    .tasks_matching(|t| {
                        let in_scope = t.project.map_or(t.created_by == user, |p| visible.contains(&p));
                        !t.is_archived && in_scope && filter.matches(t, needle)
                    })
                    .await
            }
        };
        Ok(tasks.into_iter().map(|v| v.value).collect())
    }

    /// Lists archived tasks of every project the caller can see (archived
    /// projects included) plus their archived personal tasks, most
    /// recently archived first.
    pub async fn list_archived_tasks(&self, caller: &Caller) -> Vec<Task> {
        let user = caller.user();
        let visible: Vec<ProjectId> = self
            .store
            .projects_matching(|p| p.roster.has_access(user, None))
            .await
            .into_iter()
            .map(|p| p.value.id)
            .collect();
        let mut tasks: Vec<Task> = self
            .store
            .tasks_matching(|t| {
                t.is_archived && t.project.map_or(t.created_by == user, |p| visible.contains(&p))
            })
            .await
            .into_iter()
            .map(|v| v.value)
            .collect();
        tasks.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        tasks
    }

    /// Applies a patch. Requires Member (or the creator, for personal tasks).
    ///
    /// # Errors
    ///
    /// Validation, not found or forbidden.
    pub async fn update_task(
        &self,
        caller: &Caller,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task, BoardError> {
        let title = patch
            .title
            .as_deref()
            .map(project::validate_task_title)
            .transpose()
            .map_err(BoardError::Validation)?;

        if let Some(category) = patch.category {
            self.check_task_category(caller, category).await?;
        }

        let task = with_retries!(self, "update_task", {
            let (mut task, project) = self.guarded_task(caller, id, TaskAction::Edit).await?;
            let mut commit = Commit::new();
            let record = &mut task.value;
            if let Some(assignee) = patch.assignee {
                validate_assignee(project.as_ref().map(|p| &p.value), record.created_by, assignee)?;
                if let Some(project) = &project {
                    commit = commit.check_project(project.value.id, project.version);
                }
                record.assignee = assignee;
            }
            if let Some(title) = &title {
                record.title.clone_from(title);
            }
            if let Some(description) = &patch.description {
                record.description = description.trim().to_string();
            }
            if let Some(category) = patch.category {
                record.category = category;
            }
            if let Some(priority) = patch.priority {
                record.priority = priority;
            }
            if let Some(status) = patch.status.as_deref().filter(|s| !s.trim().is_empty()) {
                record.status = status.to_string();
            }
            if let Some(deadline) = patch.deadline {
                record.deadline = deadline;
            }
            if let Some(tags) = &patch.tags {
                record.tags.clone_from(tags);
            }
            record.updated_at = Self::now();
            self.store
                .commit(commit.put_task(Expect::Version(task.version), record.clone()))
                .await?;
            Ok(task.value)
        })?;

        tracing::debug!(task_id = %id, user = %caller.user(), "task updated");
        self.publish_task(caller, BoardEvent::Updated(Entity::Task(task.clone())), task.project);
        Ok(task)
    }

    /// Archives a task. Requires Member (or the creator).
    ///
    /// # Errors
    ///
    /// Not found or forbidden.
    pub async fn archive_task(&self, caller: &Caller, id: TaskId) -> Result<Task, BoardError> {
        let task = with_retries!(self, "archive_task", {
            let (mut task, _) = self.guarded_task(caller, id, TaskAction::Edit).await?;
            let now = Self::now();
            task.value.is_archived = true;
            task.value.archived_at = Some(now);
            task.value.updated_at = now;
            self.store
                .commit(Commit::new().put_task(Expect::Version(task.version), task.value.clone()))
                .await?;
            Ok(task.value)
        })?;

        tracing::info!(task_id = %id, user = %caller.user(), "task archived");
        self.publish_task(caller, BoardEvent::Updated(Entity::Task(task.clone())), task.project);
        Ok(task)
    }

    /// Restores an archived task. Requires Member (or the creator).
    ///
    /// Like [`Board::create_task`], the commit pins the project's version.
    ///
    /// # Errors
    ///
    /// [`BoardError::ProjectNotFound`] if the task's project was deleted,
    /// [`BoardError::ProjectArchived`] if it is archived; otherwise not
    /// found or forbidden.
    pub async fn restore_task(&self, caller: &Caller, id: TaskId) -> Result<Task, BoardError> {
        let task = with_retries!(self, "restore_task", {
            let (mut task, project) = self.guarded_task(caller, id, TaskAction::Edit).await?;
            let mut commit = Commit::new();
            if let Some(project) = project {
                if project.value.is_archived {
                    return Err(BoardError::ProjectArchived);
                }
                commit = commit.check_project(project.value.id, project.version);
            }
            task.value.is_archived = false;
            task.value.archived_at = None;
            task.value.updated_at = Self::now();
            self.store
                .commit(commit.put_task(Expect::Version(task.version), task.value.clone()))
                .await?;
            Ok(task.value)
        })?;

        tracing::info!(task_id = %id, user = %caller.user(), "task restored");
        self.publish_task(caller, BoardEvent::Updated(Entity::Task(task.clone())), task.project);
        Ok(task)
    }

    /// Deletes a task. Requires Collaborator (or the creator).
    ///
    /// # Errors
    ///
    /// Not found or forbidden.
    pub async fn delete_task(&self, caller: &Caller, id: TaskId) -> Result<(), BoardError> {
        let project = with_retries!(self, "delete_task", {
            let (task, _) = self.guarded_task(caller, id, TaskAction::Delete).await?;
            self.store
                .commit(Commit::new().delete_task(id, task.version))
                .await?;
            Ok(task.value.project)
        })?;

        tracing::info!(task_id = %id, user = %caller.user(), "task deleted");
        self.publish_task(caller, BoardEvent::Deleted(EntityRef::Task(id)), project);
        Ok(())
    }

    /// Applies a batch of board moves atomically. Every task needs Member
    /// (or creator) access.
    ///
    /// # Errors
    ///
    /// Validation for a blank status; not found or forbidden for any task,
    /// in which case nothing moves.
    pub async fn reorder_tasks(&self, caller: &Caller, moves: &[TaskMove]) -> Result<Vec<Task>, BoardError> {
        if let Some(m) = moves.iter().find(|m| m.status.trim().is_empty()) {
            return Err(BoardError::Validation(format!("task {} moved to a blank status", m.id)));
        }
        let moved = with_retries!(self, "reorder_tasks", {
            let now = Self::now();
            let mut commit = Commit::new();
            let mut moved = Vec::with_capacity(moves.len());
            for m in moves {
                let (mut task, _) = self.guarded_task(caller, m.id, TaskAction::Edit).await?;
                task.value.status = m.status.trim().to_string();
                task.value.order = m.order;
                task.value.updated_at = now;
                commit = commit.put_task(Expect::Version(task.version), task.value.clone());
                moved.push(task.value);
            }
            self.store.commit(commit).await?;
            Ok(moved)
        })?;

        tracing::debug!(count = moved.len(), user = %caller.user(), "tasks reordered");
        for task in &moved {
            self.publish_task(caller, BoardEvent::Updated(Entity::Task(task.clone())), task.project);
        }
        Ok(moved)
    }
}
