//! Batch sessions: a second, independent coordinator on the same file.
//!
//! # Responsibility
//! - Build a standalone session for high-volume work that bypasses the
//!   persisting/main/worker hierarchy entirely.
//!
//! # Invariants
//! - Batch sessions are never registered with the commit router; their
//!   commits go straight to the shared file and are never cascaded.
//! - Two coordinators writing one file is an accepted hazard, guarded
//!   only by the store's busy timeout; batch writes are not merged back
//!   into live sessions.

use super::PersistenceStack;
use crate::session::{ContextKind, CoordinatorSlot, ExecutionContext, MergePolicy, Session, SessionRole};
use crate::store::{build_coordinator, StoreError, StoreResult, StoreTarget};
use log::info;
use std::sync::{Arc, Mutex};

impl PersistenceStack {
    /// Builds a batch session against this stack's store file and
    /// delivers it through `on_built`.
    ///
    /// Fails synchronously with `InvalidStoreUrl` when the stack has no
    /// backing file (in-memory stacks); the callback never fires in that
    /// case. Otherwise a brand-new coordinator is constructed against
    /// the same URL on a background thread.
    pub fn new_batch_session<F>(&self, on_built: F) -> StoreResult<()>
    where
        F: FnOnce(StoreResult<Session>) + Send + 'static,
    {
        let Some(store_url) = self.store_url.clone() else {
            return Err(StoreError::InvalidStoreUrl(
                "stack has no backing store file for batch work".to_string(),
            ));
        };

        info!(
            "event=batch_create module=stack status=start url={}",
            store_url.display()
        );
        let schema = Arc::clone(&self.schema);
        build_coordinator(schema, StoreTarget::FileBacked(store_url), move |result| {
            on_built(result.map(|coordinator| {
                let slot: CoordinatorSlot = Arc::new(Mutex::new(Some(coordinator)));
                Session::new(
                    SessionRole::Batch,
                    MergePolicy::ObjectWins,
                    ExecutionContext::new(ContextKind::Background, "strata-batch"),
                    None,
                    Some(slot),
                )
            }));
        });
        Ok(())
    }
}
