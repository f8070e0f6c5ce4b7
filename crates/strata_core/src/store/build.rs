//! Asynchronous coordinator construction.
//!
//! # Responsibility
//! - Build coordinators without blocking the caller: in-memory attaches
//!   run inline, file-backed attaches run on a background thread.
//!
//! # Invariants
//! - The completion callback is invoked exactly once — synchronously for
//!   in-memory targets, on the build thread for file-backed targets.

use super::{StoreCoordinator, StoreResult, StoreTarget};
use crate::schema::Schema;
use log::info;
use std::sync::Arc;
use std::thread;

/// Builds a coordinator for `target` and delivers it through `on_built`.
///
/// In-memory construction completes before this function returns.
/// File-backed construction performs its I/O on a dedicated thread and
/// invokes `on_built` there.
pub fn build_coordinator<F>(schema: Arc<Schema>, target: StoreTarget, on_built: F)
where
    F: FnOnce(StoreResult<StoreCoordinator>) + Send + 'static,
{
    info!(
        "event=coordinator_build module=store status=start kind={} schema={}",
        target.kind().as_str(),
        schema.name()
    );

    match target {
        StoreTarget::InMemory => {
            on_built(StoreCoordinator::attach_in_memory(schema));
        }
        StoreTarget::FileBacked(store_url) => {
            thread::spawn(move || {
                on_built(StoreCoordinator::attach_file(schema, store_url));
            });
        }
    }
}
