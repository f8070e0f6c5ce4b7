//! Typed commit-event routing: main commits trigger the persisting
//! session, worker commits trigger the main session, persisting commits
//! are terminal. Triggered commits run on the target session's own
//! context; their failures are logged, never escalated.

use crate::session::{lock, CommitListener, Session, SessionCore, SessionId, SessionRole};
use log::{debug, error};
use std::collections::BTreeMap;
use std::sync::{Mutex, Weak};

pub(crate) struct CommitRouter {
    inner: Mutex<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    persisting: Option<(SessionId, Weak<SessionCore>)>,
    main: Option<(SessionId, Weak<SessionCore>)>,
    workers: BTreeMap<SessionId, Weak<SessionCore>>,
}

impl CommitRouter {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RouterInner::default()),
        }
    }

    pub(crate) fn register_persisting(&self, session: &Session) {
        lock(&self.inner).persisting = Some((session.id(), std::sync::Arc::downgrade(&session.core)));
    }

    pub(crate) fn register_main(&self, session: &Session) {
        lock(&self.inner).main = Some((session.id(), std::sync::Arc::downgrade(&session.core)));
    }

    pub(crate) fn register_worker(&self, session: &Session) {
        lock(&self.inner)
            .workers
            .insert(session.id(), std::sync::Arc::downgrade(&session.core));
    }

    fn trigger(target: Weak<SessionCore>, target_role: SessionRole) {
        let Some(core) = target.upgrade() else {
            return;
        };
        let session = Session { core };
        debug!(
            "event=cascade_trigger module=stack target={} session={}",
            target_role.as_str(),
            session.id()
        );
        session.commit(move |result| {
            if let Err(err) = result {
                error!(
                    "event=cascade_commit module=stack target={} status=error error={}",
                    target_role.as_str(),
                    err
                );
            }
        });
    }
}

impl CommitListener for CommitRouter {
    fn session_did_commit(&self, role: SessionRole, session_id: SessionId) {
        match role {
            SessionRole::Main => {
                let target = {
                    let inner = lock(&self.inner);
                    inner.persisting.as_ref().map(|(_, weak)| weak.clone())
                };
                if let Some(target) = target {
                    Self::trigger(target, SessionRole::Persisting);
                }
            }
            SessionRole::Worker => {
                let target = {
                    let inner = lock(&self.inner);
                    if !inner.workers.contains_key(&session_id) {
                        return;
                    }
                    inner.main.as_ref().map(|(_, weak)| weak.clone())
                };
                if let Some(target) = target {
                    Self::trigger(target, SessionRole::Main);
                }
            }
            SessionRole::Persisting | SessionRole::Batch => {}
        }
    }

    fn session_dropped(&self, session_id: SessionId) {
        let mut inner = lock(&self.inner);
        inner.workers.remove(&session_id);
        if inner
            .main
            .as_ref()
            .is_some_and(|(id, _)| *id == session_id)
        {
            inner.main = None;
        }
        if inner
            .persisting
            .as_ref()
            .is_some_and(|(id, _)| *id == session_id)
        {
            inner.persisting = None;
        }
    }
}
