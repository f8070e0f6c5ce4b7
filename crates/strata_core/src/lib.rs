//! Layered persistence session manager over a single-writer object store.
//!
//! Three cooperating work surfaces — a background persisting session, an
//! interactive main session, and on-demand worker sessions — let object
//! work happen off the interactive lane while commits converge to durable
//! storage through the parent chain. A batch carve-out attaches a second,
//! independent coordinator to the same store file, and reset tears the
//! backing store down and rebuilds it under live sessions.

pub mod logging;
pub mod schema;
pub mod session;
pub mod stack;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status};
pub use schema::{load_schema, Schema, SchemaBundle, OBJECT_GRAPH_DDL};
pub use session::{
    ChangeSet, CommitOutcome, ContextKind, ExecutionContext, MergePolicy, ObjectChange, ObjectId,
    ObjectSnapshot, Session, SessionError, SessionId, SessionResult, SessionRole,
};
pub use stack::{construct_stack, PersistenceStack, ResetOutcome, StackConfig};
pub use store::{
    build_coordinator, resolve_store_url, StoreCoordinator, StoreError, StoreKind, StoreResult,
    StoreTarget,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
