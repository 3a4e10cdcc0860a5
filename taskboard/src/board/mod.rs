//! The board service: guarded project, membership, invitation, task and
//! category operations over the versioned store.
//!
//! Every mutation follows the same shape: read the records it depends on,
//! run the access guard, build a [`Commit`](crate::store::Commit) that
//! expects exactly the versions that were read, and apply it. A version
//! conflict means someone else got there first; the operation is re-run
//! from scratch a bounded number of times. Once a commit lands, the change
//! is published to the project's room with the caller's connection (if
//! any) excluded.

use std::sync::Arc;
use std::time::Duration;

use taskboard_proto::event::{BoardEvent, RoomId};
use taskboard_proto::id::{ProjectId, Timestamp, UserId};
use taskboard_proto::role::Role;
use url::Url;

use crate::error::BoardError;
use crate::events::{EventSink, NullSink};
use crate::guard::{self, Authorized};
use crate::identity::{Caller, Principal};
use crate::invitation::DEFAULT_INVITATION_TTL;
use crate::notify::{LogNotifier, Notifier};
use crate::project::ProjectRecord;
use crate::store::{Store, Versioned};

/// Default number of attempts for a read-check-write operation.
pub const DEFAULT_COMMIT_RETRIES: u32 = 8;

/// Link invitees open to accept, unless configured otherwise.
pub const DEFAULT_ACCEPT_URL: &str = "http://localhost:3000/invite";

/// Re-runs `$body` while the store reports a version conflict.
///
/// `$body` is an expression evaluating to `Result<_, BoardError>`; `?`
/// inside it ends the current attempt.
macro_rules! with_retries {
    ($board:expr, $op:literal, $body:expr) => {{
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result: Result<_, $crate::error::BoardError> = async { $body }.await;
            match result {
                Err($crate::error::BoardError::Store($crate::store::StoreError::Conflict(what)))
                    if attempt < $board.policy.commit_retries =>
                {
                    tracing::debug!(op = $op, attempt, conflict = %what, "version conflict, retrying");
                }
                Err($crate::error::BoardError::Store($crate::store::StoreError::Conflict(what))) => {
                    tracing::warn!(op = $op, attempts = attempt, conflict = %what, "giving up after repeated conflicts");
                    break Err($crate::error::BoardError::Unavailable(format!(
                        "{}: too many concurrent updates",
                        $op
                    )));
                }
                other => break other,
            }
        }
    }};
}

mod categories;
mod invitations;
mod projects;
mod tasks;

pub use categories::{CategoryOrder, CategoryPatch, CategoryStats, CategoryUsage, NewCategory};
pub use projects::{NewProject, ProjectPatch, ProjectScope};
pub use tasks::{NewTask, TaskFilter, TaskMove, TaskPatch, TaskScope};

/// Tunables for a [`Board`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardPolicy {
    /// Lifetime of a freshly issued invitation.
    pub invitation_ttl: Duration,
    /// Attempts per operation before a conflict becomes `Unavailable`.
    pub commit_retries: u32,
    /// Base of the link mailed to invitees; the token is appended as
    /// `?token=`. Without one, the notice carries the bare token.
    pub accept_url: Option<Url>,
}

impl Default for BoardPolicy {
    fn default() -> Self {
        Self {
            invitation_ttl: DEFAULT_INVITATION_TTL,
            commit_retries: DEFAULT_COMMIT_RETRIES,
            accept_url: Url::parse(DEFAULT_ACCEPT_URL).ok(),
        }
    }
}

/// The board service.
pub struct Board {
    store: Store,
    notifier: Arc<dyn Notifier>,
    events: Arc<dyn EventSink>,
    policy: BoardPolicy,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Creates a board over an empty store that logs notices and publishes
    /// nowhere.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Store::new(),
            notifier: Arc::new(LogNotifier),
            events: Arc::new(NullSink),
            policy: BoardPolicy::default(),
        }
    }

    /// Replaces the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replaces the realtime sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replaces the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: BoardPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> &BoardPolicy {
        &self.policy
    }

    /// Direct access to the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Records a principal in the user directory so invitations addressed
    /// to their email can be matched against rosters.
    pub async fn register_principal(&self, principal: Principal) {
        tracing::debug!(user = %principal.id, email = %principal.email, "principal registered");
        self.store.upsert_user(principal).await;
    }

    /// Returns `true` if `user` may see `project` (and so join its room).
    pub async fn can_view_project(&self, user: UserId, project: ProjectId) -> bool {
        self.store
            .project(project)
            .await
            .is_some_and(|p| p.value.roster.has_access(user, None))
    }

    /// Returns `false` once `user` has lost access to a project that still
    /// exists. A deleted project's room keeps its subscribers until the
    /// deletion events are out.
    pub async fn retains_subscriber(&self, user: UserId, project: ProjectId) -> bool {
        self.store
            .project(project)
            .await
            .is_none_or(|p| p.value.roster.has_access(user, None))
    }

    /// Loads a project and checks `caller` against it.
    async fn guarded_project(
        &self,
        caller: &Caller,
        id: ProjectId,
        required: Option<Role>,
    ) -> Result<(Versioned<ProjectRecord>, Authorized), BoardError> {
        let project = self
            .store
            .project(id)
            .await
            .ok_or(BoardError::ProjectNotFound)?;
        let auth = guard::authorize(&project.value.roster, caller.user(), required)?;
        Ok((project, auth))
    }

    /// Announces a committed change to the project's room.
    fn publish(&self, caller: &Caller, project: ProjectId, event: BoardEvent) {
        let room = RoomId::for_project(project);
        tracing::debug!(room = %room, kind = %event.kind(), user = %caller.user(), "publishing board event");
        self.events.publish(caller.origin, room, event);
    }

    fn now() -> Timestamp {
        Timestamp::now()
    }
}
