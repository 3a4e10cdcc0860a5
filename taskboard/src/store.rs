//! In-memory versioned document store.
//!
//! Every record carries a version that increments on each write. Mutations
//! are expressed as a [`Commit`]: a list of writes, each stating the version
//! it expects to replace. A commit applies atomically only if every
//! expectation still holds; otherwise nothing changes and the caller gets
//! [`StoreError::Conflict`] and re-reads.
//!
//! The store also enforces, at commit time, the rules a database would hold
//! in indexes and foreign keys: one live invitation per (project, email),
//! unique category names per owner, and no task pointing at a missing
//! category.

use std::collections::{HashMap, HashSet};

use taskboard_proto::board::{Category, Task};
use taskboard_proto::id::{CategoryId, ProjectId, TaskId, Timestamp, UserId};
use tokio::sync::RwLock;

use crate::identity::{Email, Principal};
use crate::invitation::Invitation;
use crate::project::ProjectRecord;

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Monotonic per-record version, starting at 1.
    pub version: u64,
    /// The record.
    pub value: T,
}

/// What a write expects to find in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// No record under the key.
    Absent,
    /// A record at exactly this version.
    Version(u64),
}

impl Expect {
    fn holds(self, current: Option<u64>) -> bool {
        match (self, current) {
            (Self::Absent, None) => true,
            (Self::Version(want), Some(have)) => want == have,
            _ => false,
        }
    }
}

/// Errors that can occur when committing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A record changed since it was read.
    #[error("write conflict on {0}")]
    Conflict(String),
    /// A live invitation already exists for this project and address.
    #[error("a pending invitation already exists for {email} on project {project}")]
    DuplicateInvitation {
        /// Target project.
        project: ProjectId,
        /// Invited address.
        email: Email,
    },
    /// The owner already has a category with this name.
    #[error("category {name:?} already exists")]
    DuplicateCategory {
        /// Conflicting name.
        name: String,
    },
    /// A category cannot go while tasks still reference it.
    #[error("category {category} is used by {tasks} task(s)")]
    CategoryInUse {
        /// The category.
        category: CategoryId,
        /// Tasks referencing it.
        tasks: usize,
    },
    /// A task references a category that does not exist.
    #[error("category {0} does not exist")]
    MissingCategory(CategoryId),
}

#[derive(Debug)]
enum Write {
    PutProject(Expect, ProjectRecord),
    DeleteProject(ProjectId, u64),
    CheckProject(ProjectId, u64),
    CheckProjectTasks(ProjectId, HashSet<TaskId>),
    PutTask(Expect, Task),
    DeleteTask(TaskId, u64),
    PutInvitation(Expect, Invitation),
    InsertInvitation(Invitation, Timestamp),
    PutCategory(Expect, Category),
    DeleteCategory(CategoryId, u64),
}

/// A batch of writes applied all-or-nothing.
#[derive(Debug, Default)]
#[must_use]
pub struct Commit {
    writes: Vec<Write>,
}

impl Commit {
    /// Starts an empty commit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a project record.
    pub fn put_project(mut self, expect: Expect, record: ProjectRecord) -> Self {
        self.writes.push(Write::PutProject(expect, record));
        self
    }

    /// Deletes a project read at `version`.
    pub fn delete_project(mut self, id: ProjectId, version: u64) -> Self {
        self.writes.push(Write::DeleteProject(id, version));
        self
    }

    /// Requires a project to still be at `version` without writing it.
    pub fn check_project(mut self, id: ProjectId, version: u64) -> Self {
        self.writes.push(Write::CheckProject(id, version));
        self
    }

    /// Requires the tasks of `project` to be exactly `tasks`, so a cascade
    /// cannot miss one created after it was read.
    pub fn check_project_tasks(mut self, project: ProjectId, tasks: impl IntoIterator<Item = TaskId>) -> Self {
        self.writes
            .push(Write::CheckProjectTasks(project, tasks.into_iter().collect()));
        self
    }

    /// Writes a task.
    pub fn put_task(mut self, expect: Expect, task: Task) -> Self {
        self.writes.push(Write::PutTask(expect, task));
        self
    }

    /// Deletes a task read at `version`.
    pub fn delete_task(mut self, id: TaskId, version: u64) -> Self {
        self.writes.push(Write::DeleteTask(id, version));
        self
    }

    /// Replaces an existing invitation.
    pub fn put_invitation(mut self, version: u64, invitation: Invitation) -> Self {
        self.writes
            .push(Write::PutInvitation(Expect::Version(version), invitation));
        self
    }

    /// Inserts a new invitation, failing if another one for the same
    /// project and address is still live at `now`.
    pub fn insert_invitation(mut self, invitation: Invitation, now: Timestamp) -> Self {
        self.writes.push(Write::InsertInvitation(invitation, now));
        self
    }

    /// Writes a category.
    pub fn put_category(mut self, expect: Expect, category: Category) -> Self {
        self.writes.push(Write::PutCategory(expect, category));
        self
    }

    /// Deletes a category read at `version`, failing if any task uses it.
    pub fn delete_category(mut self, id: CategoryId, version: u64) -> Self {
        self.writes.push(Write::DeleteCategory(id, version));
        self
    }

    /// Number of queued writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[derive(Debug, Default)]
struct Tables {
    projects: HashMap<ProjectId, Versioned<ProjectRecord>>,
    tasks: HashMap<TaskId, Versioned<Task>>,
    invitations: HashMap<String, Versioned<Invitation>>,
    categories: HashMap<CategoryId, Versioned<Category>>,
    users: HashMap<UserId, Principal>,
    users_by_email: HashMap<Email, UserId>,
}

impl Tables {
    fn check(&self, write: &Write) -> Result<(), StoreError> {
        match write {
            Write::PutProject(expect, record) => {
                let current = self.projects.get(&record.id).map(|v| v.version);
                if !expect.holds(current) {
                    return Err(StoreError::Conflict(format!("project {}", record.id)));
                }
            }
            Write::DeleteProject(id, version) | Write::CheckProject(id, version) => {
                let current = self.projects.get(id).map(|v| v.version);
                if !Expect::Version(*version).holds(current) {
                    return Err(StoreError::Conflict(format!("project {id}")));
                }
            }
            Write::CheckProjectTasks(project, expected) => {
                let current: HashSet<TaskId> = self
                    .tasks
                    .values()
                    .filter(|t| t.value.project == Some(*project))
                    .map(|t| t.value.id)
                    .collect();
                if &current != expected {
                    return Err(StoreError::Conflict(format!("tasks of project {project}")));
                }
            }
            Write::PutTask(expect, task) => {
                let current = self.tasks.get(&task.id).map(|v| v.version);
                if !expect.holds(current) {
                    return Err(StoreError::Conflict(format!("task {}", task.id)));
                }
                if let Some(category) = task.category.filter(|c| !self.categories.contains_key(c)) {
                    return Err(StoreError::MissingCategory(category));
                }
            }
            Write::DeleteTask(id, version) => {
                let current = self.tasks.get(id).map(|v| v.version);
                if !Expect::Version(*version).holds(current) {
                    return Err(StoreError::Conflict(format!("task {id}")));
                }
            }
            Write::PutInvitation(expect, inv) => {
                let current = self.invitations.get(inv.token.as_str()).map(|v| v.version);
                if !expect.holds(current) {
                    return Err(StoreError::Conflict(format!("invitation for {}", inv.email)));
                }
            }
            Write::InsertInvitation(inv, now) => {
                if self.invitations.contains_key(inv.token.as_str()) {
                    return Err(StoreError::Conflict(format!("invitation for {}", inv.email)));
                }
                let duplicate = self.invitations.values().any(|v| {
                    v.value.project == inv.project && v.value.email == inv.email && v.value.is_live(*now)
                });
                if duplicate {
                    return Err(StoreError::DuplicateInvitation {
                        project: inv.project,
                        email: inv.email.clone(),
                    });
                }
            }
            Write::PutCategory(expect, category) => {
                let current = self.categories.get(&category.id).map(|v| v.version);
                if !expect.holds(current) {
                    return Err(StoreError::Conflict(format!("category {}", category.id)));
                }
                let taken = self.categories.values().any(|v| {
                    v.value.id != category.id
                        && v.value.created_by == category.created_by
                        && v.value.name.to_lowercase() == category.name.to_lowercase()
                });
                if taken {
                    return Err(StoreError::DuplicateCategory {
                        name: category.name.clone(),
                    });
                }
            }
            Write::DeleteCategory(id, version) => {
                let current = self.categories.get(id).map(|v| v.version);
                if !Expect::Version(*version).holds(current) {
                    return Err(StoreError::Conflict(format!("category {id}")));
                }
                let tasks = self
                    .tasks
                    .values()
                    .filter(|t| t.value.category == Some(*id))
                    .count();
                if tasks > 0 {
                    return Err(StoreError::CategoryInUse { category: *id, tasks });
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, write: Write) {
        fn bump<K: std::hash::Hash + Eq, T>(map: &mut HashMap<K, Versioned<T>>, key: K, value: T) {
            let version = map.get(&key).map_or(1, |v| v.version + 1);
            map.insert(key, Versioned { version, value });
        }
        match write {
            Write::PutProject(_, record) => bump(&mut self.projects, record.id, record),
            Write::DeleteProject(id, _) => {
                self.projects.remove(&id);
            }
            Write::PutTask(_, task) => bump(&mut self.tasks, task.id, task),
            Write::DeleteTask(id, _) => {
                self.tasks.remove(&id);
            }
            Write::PutInvitation(_, inv) | Write::InsertInvitation(inv, _) => {
                bump(&mut self.invitations, inv.token.as_str().to_string(), inv);
            }
            Write::PutCategory(_, category) => bump(&mut self.categories, category.id, category),
            Write::DeleteCategory(id, _) => {
                self.categories.remove(&id);
            }
            Write::CheckProject(..) | Write::CheckProjectTasks(..) => {}
        }
    }
}

/// The document store shared by a [`Board`](crate::Board).
#[derive(Debug, Default)]
pub struct Store {
    tables: RwLock<Tables>,
}

impl Store {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a project.
    pub async fn project(&self, id: ProjectId) -> Option<Versioned<ProjectRecord>> {
        self.tables.read().await.projects.get(&id).cloned()
    }

    /// Reads every project matching `pred`, newest first.
    pub async fn projects_matching(
        &self,
        pred: impl Fn(&ProjectRecord) -> bool,
    ) -> Vec<Versioned<ProjectRecord>> {
        let tables = self.tables.read().await;
        let mut out: Vec<_> = tables
            .projects
            .values()
            .filter(|v| pred(&v.value))
            .cloned()
            .collect();
        drop(tables);
        out.sort_by(|a, b| b.value.created_at.cmp(&a.value.created_at).then(b.value.id.cmp(&a.value.id)));
        out
    }

    /// Reads a task.
    pub async fn task(&self, id: TaskId) -> Option<Versioned<Task>> {
        self.tables.read().await.tasks.get(&id).cloned()
    }

    /// Reads every task matching `pred`, ordered by board position then age.
    pub async fn tasks_matching(&self, pred: impl Fn(&Task) -> bool) -> Vec<Versioned<Task>> {
        let tables = self.tables.read().await;
        let mut out: Vec<_> = tables
            .tasks
            .values()
            .filter(|v| pred(&v.value))
            .cloned()
            .collect();
        drop(tables);
        out.sort_by(|a, b| {
            a.value
                .order
                .cmp(&b.value.order)
                .then(b.value.created_at.cmp(&a.value.created_at))
                .then(a.value.id.cmp(&b.value.id))
        });
        out
    }

    /// Reads a category.
    pub async fn category(&self, id: CategoryId) -> Option<Versioned<Category>> {
        self.tables.read().await.categories.get(&id).cloned()
    }

    /// Reads every category matching `pred`, by name.
    pub async fn categories_matching(
        &self,
        pred: impl Fn(&Category) -> bool,
    ) -> Vec<Versioned<Category>> {
        let tables = self.tables.read().await;
        let mut out: Vec<_> = tables
            .categories
            .values()
            .filter(|v| pred(&v.value))
            .cloned()
            .collect();
        drop(tables);
        out.sort_by(|a, b| {
            a.value
                .name
                .to_lowercase()
                .cmp(&b.value.name.to_lowercase())
                .then(a.value.id.cmp(&b.value.id))
        });
        out
    }

    /// Reads an invitation by token.
    pub async fn invitation(&self, token: &str) -> Option<Versioned<Invitation>> {
        self.tables.read().await.invitations.get(token).cloned()
    }

    /// Reads an invitation together with its project from one snapshot.
    pub async fn invitation_with_project(
        &self,
        token: &str,
    ) -> Option<(Versioned<Invitation>, Option<Versioned<ProjectRecord>>)> {
        let tables = self.tables.read().await;
        let invitation = tables.invitations.get(token)?.clone();
        let project = tables.projects.get(&invitation.value.project).cloned();
        Some((invitation, project))
    }

    /// Removes every invitation matching `pred`. Returns how many went.
    pub async fn purge_invitations(&self, pred: impl Fn(&Invitation) -> bool) -> usize {
        let mut tables = self.tables.write().await;
        let before = tables.invitations.len();
        tables.invitations.retain(|_, v| !pred(&v.value));
        before - tables.invitations.len()
    }

    /// Inserts or refreshes a directory entry.
    pub async fn upsert_user(&self, principal: Principal) {
        let mut tables = self.tables.write().await;
        if let Some(previous) = tables.users.get(&principal.id).map(|p| p.email.clone()) {
            tables.users_by_email.remove(&previous);
        }
        tables
            .users_by_email
            .insert(principal.email.clone(), principal.id);
        tables.users.insert(principal.id, principal);
    }

    /// Looks up a user by identity.
    pub async fn user(&self, id: UserId) -> Option<Principal> {
        self.tables.read().await.users.get(&id).cloned()
    }

    /// Looks up a user by (normalized) email.
    pub async fn user_by_email(&self, email: &Email) -> Option<Principal> {
        let tables = self.tables.read().await;
        tables
            .users_by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned()
    }

    /// Applies `commit` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if any expectation fails, or the
    /// matching [`StoreError`] when a uniqueness or reference rule would
    /// break. Nothing is written in any case.
    pub async fn commit(&self, commit: Commit) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for write in &commit.writes {
            tables.check(write)?;
        }
        for write in commit.writes {
            tables.apply(write);
        }
        Ok(())
    }
}
