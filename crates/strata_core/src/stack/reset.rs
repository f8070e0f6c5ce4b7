//! Destroy-and-rebuild of the backing store.
//!
//! # Responsibility
//! - Detach and delete the current store file, rebuild a fresh
//!   coordinator at the same URL, and swap it into the stack.
//!
//! # Invariants
//! - The coordinator-slot lock is held for the whole window, so a commit
//!   arriving mid-reset blocks and then applies to exactly one of the
//!   old or new coordinator, never an interleaving.
//! - A detach failure restores the old coordinator; a removal or rebuild
//!   failure leaves the slot empty and the stack unusable until a new
//!   stack is constructed.

use super::PersistenceStack;
use crate::schema::Schema;
use crate::session::{lock, CoordinatorSlot};
use crate::store::{StoreCoordinator, StoreError, StoreResult};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// What a successful reset actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The store file was removed and a fresh coordinator swapped in.
    Completed,
    /// The stack has no backing file; there was nothing to reset.
    NotApplicable,
}

impl PersistenceStack {
    /// Destroys the backing store and rebuilds a fresh coordinator at
    /// the same URL, delivering the outcome through `on_done`.
    ///
    /// Stacks without a backing file report `NotApplicable` immediately.
    /// Failures are surfaced verbatim and never retried; after a removal
    /// or rebuild failure the stack has no usable coordinator and must
    /// be reconstructed.
    pub fn reset<F>(&self, on_done: F)
    where
        F: FnOnce(StoreResult<ResetOutcome>) + Send + 'static,
    {
        let Some(store_url) = self.store_url.clone() else {
            info!("event=reset module=stack status=skipped reason=no_backing_file");
            on_done(Ok(ResetOutcome::NotApplicable));
            return;
        };

        let slot = Arc::clone(&self.slot);
        let schema = Arc::clone(&self.schema);
        thread::spawn(move || {
            on_done(run_reset(&slot, schema, store_url));
        });
    }
}

fn run_reset(
    slot: &CoordinatorSlot,
    schema: Arc<Schema>,
    store_url: PathBuf,
) -> StoreResult<ResetOutcome> {
    let started_at = Instant::now();
    info!(
        "event=reset module=stack status=start url={}",
        store_url.display()
    );

    let mut guard = lock(slot);

    if let Some(old) = guard.take() {
        if let Err((old, err)) = old.close() {
            *guard = Some(old);
            error!(
                "event=reset module=stack status=error error_code=store_detach_failed error={err}"
            );
            return Err(err);
        }
    }

    if let Err(err) = std::fs::remove_file(&store_url) {
        error!(
            "event=reset module=stack status=error error_code=store_remove_failed url={} error={err}",
            store_url.display()
        );
        return Err(StoreError::FileRemoval(err));
    }

    match StoreCoordinator::attach_file(schema, store_url) {
        Ok(rebuilt) => {
            *guard = Some(rebuilt);
            info!(
                "event=reset module=stack status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(ResetOutcome::Completed)
        }
        Err(err) => {
            error!(
                "event=reset module=stack status=error error_code=store_rebuild_failed error={err}"
            );
            Err(err)
        }
    }
}
