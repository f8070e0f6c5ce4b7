//! Queue-bound sessions and the save-propagation seam.
//!
//! # Responsibility
//! - Hold uncommitted object changes for one unit of work.
//! - Commit: move changes to the parent session, or write them through
//!   the coordinator for directly-bound sessions.
//!
//! # Invariants
//! - Every operation on a session runs on that session's own execution
//!   context; a child pushing into a parent schedules the merge onto the
//!   parent's context.
//! - A successful non-empty commit reports exactly one did-commit event
//!   to the registered listener; empty commits report nothing.
//! - Dropping a session unregisters it from the listener.

pub mod change;
pub mod context;

pub use change::{ChangeSet, MergePolicy, ObjectChange, ObjectId, ObjectSnapshot};
pub use context::{ContextKind, ExecutionContext};

use crate::store::{StoreCoordinator, StoreError};
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use uuid::Uuid;

/// Stable identity of a session, used for listener bookkeeping.
pub type SessionId = Uuid;

pub type SessionResult<T> = Result<T, SessionError>;

/// Failures surfaced by session commits and reads.
#[derive(Debug)]
pub enum SessionError {
    /// The session's coordinator slot is empty — mid-reset, or after a
    /// failed rebuild left the stack without a usable coordinator.
    CoordinatorUnavailable,
    Store(StoreError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CoordinatorUnavailable => {
                write!(f, "no active store coordinator is attached")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CoordinatorUnavailable => None,
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Role tag decided at creation time; replaces runtime type inspection
/// when routing commit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Persisting,
    Main,
    Worker,
    Batch,
}

impl SessionRole {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Persisting => "persisting",
            Self::Main => "main",
            Self::Worker => "worker",
            Self::Batch => "batch",
        }
    }
}

/// Result of a commit that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Changes were moved to the parent or written to the store.
    Committed,
    /// Nothing was pending; the commit was a no-op.
    NoChanges,
}

/// Shared, swappable reference to the active coordinator. The persisting
/// session and its stack hold the same slot, so a reset swap re-binds the
/// session structurally.
pub(crate) type CoordinatorSlot = Arc<Mutex<Option<StoreCoordinator>>>;

/// Typed commit-event subscription seam. The stack's router implements
/// this; sessions hold it weakly and report on their own context thread.
pub(crate) trait CommitListener: Send + Sync {
    fn session_did_commit(&self, role: SessionRole, session_id: SessionId);
    fn session_dropped(&self, session_id: SessionId);
}

/// Locks a mutex, recovering the guard from a poisoned lock instead of
/// propagating the panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A unit of object-graph work bound to one serialized execution context.
#[derive(Clone)]
pub struct Session {
    pub(crate) core: Arc<SessionCore>,
}

pub(crate) struct SessionCore {
    id: SessionId,
    role: SessionRole,
    merge_policy: MergePolicy,
    context: ExecutionContext,
    parent: Option<Session>,
    slot: Option<CoordinatorSlot>,
    pending: Mutex<ChangeSet>,
    listener: Mutex<Option<Weak<dyn CommitListener>>>,
}

impl Session {
    pub(crate) fn new(
        role: SessionRole,
        merge_policy: MergePolicy,
        context: ExecutionContext,
        parent: Option<Session>,
        slot: Option<CoordinatorSlot>,
    ) -> Self {
        let core = Arc::new(SessionCore {
            id: Uuid::new_v4(),
            role,
            merge_policy,
            context,
            parent,
            slot,
            pending: Mutex::new(ChangeSet::new()),
            listener: Mutex::new(None),
        });
        info!(
            "event=session_create module=session role={} session={} context={}",
            role.as_str(),
            core.id,
            core.context.label()
        );
        Self { core }
    }

    pub(crate) fn set_listener(&self, listener: Weak<dyn CommitListener>) {
        *lock(&self.core.listener) = Some(listener);
    }

    pub fn id(&self) -> SessionId {
        self.core.id
    }

    pub fn role(&self) -> SessionRole {
        self.core.role
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.core.merge_policy
    }

    /// Records an object upsert into this session's pending changes.
    pub fn record_upsert(&self, snapshot: ObjectSnapshot) {
        self.record(ObjectChange::Upsert(snapshot));
    }

    /// Records an object tombstone into this session's pending changes.
    pub fn record_delete(&self, id: ObjectId) {
        self.record(ObjectChange::Delete(id));
    }

    fn record(&self, change: ObjectChange) {
        let core = Arc::clone(&self.core);
        self.core.context.run(move || {
            lock(&core.pending).record(change);
        });
    }

    /// Commits this session's pending changes on its own context and
    /// delivers the result to `on_done`.
    ///
    /// A successful non-empty commit additionally reports a did-commit
    /// event to the registered listener, which is what drives the
    /// stack's save cascade. Failures are delivered to `on_done` only;
    /// they are never escalated into the cascade.
    pub fn commit<F>(&self, on_done: F)
    where
        F: FnOnce(SessionResult<CommitOutcome>) + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        self.core.context.run(move || {
            let result = core.commit_on_context();
            if matches!(result, Ok(CommitOutcome::Committed)) {
                core.notify_commit();
            }
            on_done(result);
        });
    }

    /// Resolves one object as this session sees it: its own pending
    /// changes first, then the parent chain, then the coordinator.
    pub fn fetch_object<F>(&self, id: ObjectId, on_done: F)
    where
        F: FnOnce(SessionResult<Option<ObjectSnapshot>>) + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        self.core.context.run(move || {
            on_done(core.resolve_object(id));
        });
    }

    /// Schedules an incoming committed change-set onto this session's
    /// context, merging it into the pending set under this session's
    /// policy.
    pub(crate) fn absorb(&self, incoming: ChangeSet) {
        let core = Arc::clone(&self.core);
        self.core.context.run(move || {
            let count = incoming.len();
            let conflicts = lock(&core.pending).merge_from(incoming, core.merge_policy);
            debug!(
                "event=session_absorb module=session role={} session={} changes={} conflicts={}",
                core.role.as_str(),
                core.id,
                count,
                conflicts
            );
        });
    }
}

impl SessionCore {
    fn commit_on_context(&self) -> SessionResult<CommitOutcome> {
        let changes = lock(&self.pending).take();
        if changes.is_empty() {
            debug!(
                "event=session_commit module=session role={} session={} status=noop",
                self.role.as_str(),
                self.id
            );
            return Ok(CommitOutcome::NoChanges);
        }
        let count = changes.len();

        if let Some(parent) = &self.parent {
            parent.absorb(changes);
            info!(
                "event=session_commit module=session role={} session={} status=ok changes={} target=parent",
                self.role.as_str(),
                self.id,
                count
            );
            return Ok(CommitOutcome::Committed);
        }

        let Some(slot) = &self.slot else {
            self.restore_pending(changes);
            return Err(SessionError::CoordinatorUnavailable);
        };
        let mut guard = lock(slot);
        let Some(coordinator) = guard.as_mut() else {
            drop(guard);
            self.restore_pending(changes);
            error!(
                "event=session_commit module=session role={} session={} status=error error_code=coordinator_unavailable",
                self.role.as_str(),
                self.id
            );
            return Err(SessionError::CoordinatorUnavailable);
        };

        match coordinator.apply_changes(&changes) {
            Ok(()) => {
                info!(
                    "event=session_commit module=session role={} session={} status=ok changes={} target=store",
                    self.role.as_str(),
                    self.id,
                    count
                );
                Ok(CommitOutcome::Committed)
            }
            Err(err) => {
                drop(guard);
                self.restore_pending(changes);
                error!(
                    "event=session_commit module=session role={} session={} status=error error={}",
                    self.role.as_str(),
                    self.id,
                    err
                );
                Err(SessionError::Store(err))
            }
        }
    }

    /// Puts a failed commit's changes back so a later retry can pick
    /// them up. Local edits recorded since the take (none, on a
    /// serialized context) would win the merge.
    fn restore_pending(&self, changes: ChangeSet) {
        lock(&self.pending).merge_from(changes, MergePolicy::ObjectWins);
    }

    fn notify_commit(&self) {
        let listener = lock(&self.listener).clone();
        if let Some(listener) = listener.and_then(|weak| weak.upgrade()) {
            listener.session_did_commit(self.role, self.id);
        }
    }

    fn resolve_object(&self, id: ObjectId) -> SessionResult<Option<ObjectSnapshot>> {
        let local = lock(&self.pending).get(id).cloned();
        match local {
            Some(ObjectChange::Upsert(snapshot)) => return Ok(Some(snapshot)),
            Some(ObjectChange::Delete(_)) => return Ok(None),
            None => {}
        }

        if let Some(parent) = &self.parent {
            return parent.core.resolve_object(id);
        }

        let Some(slot) = &self.slot else {
            return Err(SessionError::CoordinatorUnavailable);
        };
        let guard = lock(slot);
        let Some(coordinator) = guard.as_ref() else {
            return Err(SessionError::CoordinatorUnavailable);
        };
        coordinator.fetch_object(id).map_err(SessionError::Store)
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        let listener = lock(&self.listener).take();
        if let Some(listener) = listener.and_then(|weak| weak.upgrade()) {
            listener.session_dropped(self.id);
        }
        debug!(
            "event=session_drop module=session role={} session={}",
            self.role.as_str(),
            self.id
        );
    }
}
