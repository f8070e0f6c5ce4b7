//! The persistence stack: composition, construction, and session factories.
//!
//! # Responsibility
//! - Wire one coordinator slot, one persisting session, and one main
//!   session into a stack; hand out worker and batch sessions on demand.
//! - Drive the save cascade through the commit router.
//!
//! # Invariants
//! - `main.parent == persisting` for the stack's lifetime.
//! - The persisting session and the stack share one coordinator slot, so
//!   a reset swap re-binds the session structurally.
//! - Construction's completion callback fires exactly once; the only
//!   synchronous failure is the `InvalidStoreUrl` precondition.

mod batch;
mod cascade;
mod reset;

pub use reset::ResetOutcome;

use crate::schema::{load_schema, Schema, SchemaBundle};
use crate::session::{
    CommitListener, ContextKind, CoordinatorSlot, ExecutionContext, MergePolicy, Session,
    SessionRole,
};
use crate::store::{
    build_coordinator, resolve_store_url, StoreCoordinator, StoreError, StoreKind, StoreResult,
    StoreTarget,
};
use cascade::CommitRouter;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Explicit construction parameters. Nothing here is resolved from
/// ambient process state; the caller-facing layer decides defaults such
/// as the platform documents directory.
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub schema_name: String,
    pub bundle: SchemaBundle,
    pub kind: StoreKind,
    /// Store filename; defaults to `{schema_name}.store`.
    pub filename: Option<String>,
    /// Store directory; required for file-backed stacks.
    pub directory: Option<PathBuf>,
}

impl StackConfig {
    pub fn in_memory(schema_name: impl Into<String>, bundle: SchemaBundle) -> Self {
        Self {
            schema_name: schema_name.into(),
            bundle,
            kind: StoreKind::InMemory,
            filename: None,
            directory: None,
        }
    }

    pub fn file_backed(
        schema_name: impl Into<String>,
        bundle: SchemaBundle,
        directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            bundle,
            kind: StoreKind::FileBacked,
            filename: None,
            directory: Some(directory.into()),
        }
    }
}

/// One coordinator, one persisting session, one main session, and the
/// factories for worker and batch sessions.
pub struct PersistenceStack {
    schema: Arc<Schema>,
    kind: StoreKind,
    store_url: Option<PathBuf>,
    slot: CoordinatorSlot,
    router: Arc<CommitRouter>,
    persisting: Session,
    main: Session,
    worker_seq: AtomicU64,
}

/// Constructs a stack and delivers it through `on_built`.
///
/// In-memory stacks are assembled synchronously — the callback runs
/// before this function returns. File-backed stacks resolve their store
/// URL up front (an unresolvable filename/directory combination fails
/// synchronously with `InvalidStoreUrl` and the callback never fires),
/// then build the coordinator on a background thread.
pub fn construct_stack<F>(config: StackConfig, on_built: F) -> StoreResult<()>
where
    F: FnOnce(StoreResult<PersistenceStack>) + Send + 'static,
{
    let StackConfig {
        schema_name,
        bundle,
        kind,
        filename,
        directory,
    } = config;

    let schema = Arc::new(load_schema(&schema_name, &bundle));
    info!(
        "event=stack_construct module=stack status=start schema={} kind={}",
        schema_name,
        kind.as_str()
    );

    match kind {
        StoreKind::InMemory => {
            build_coordinator(Arc::clone(&schema), StoreTarget::InMemory, move |result| {
                on_built(result.map(|coordinator| {
                    PersistenceStack::assemble(schema, StoreKind::InMemory, None, coordinator)
                }));
            });
            Ok(())
        }
        StoreKind::FileBacked => {
            let filename = filename.unwrap_or_else(|| format!("{schema_name}.store"));
            let directory = directory.ok_or_else(|| {
                StoreError::InvalidStoreUrl(
                    "file-backed stacks require an explicit store directory".to_string(),
                )
            })?;
            let store_url = resolve_store_url(&filename, &directory)?;
            build_coordinator(
                Arc::clone(&schema),
                StoreTarget::FileBacked(store_url.clone()),
                move |result| {
                    on_built(result.map(|coordinator| {
                        PersistenceStack::assemble(
                            schema,
                            StoreKind::FileBacked,
                            Some(store_url),
                            coordinator,
                        )
                    }));
                },
            );
            Ok(())
        }
    }
}

impl PersistenceStack {
    fn assemble(
        schema: Arc<Schema>,
        kind: StoreKind,
        store_url: Option<PathBuf>,
        coordinator: StoreCoordinator,
    ) -> Self {
        let slot: CoordinatorSlot = Arc::new(Mutex::new(Some(coordinator)));
        let router = Arc::new(CommitRouter::new());
        let listener: Weak<dyn CommitListener> = {
            let weak = Arc::downgrade(&router);
            weak
        };

        let persisting = Session::new(
            SessionRole::Persisting,
            MergePolicy::StoreWins,
            ExecutionContext::new(ContextKind::Background, "strata-persisting"),
            None,
            Some(Arc::clone(&slot)),
        );
        let main = Session::new(
            SessionRole::Main,
            MergePolicy::StoreWins,
            ExecutionContext::new(ContextKind::Interactive, "strata-main"),
            Some(persisting.clone()),
            None,
        );

        router.register_persisting(&persisting);
        router.register_main(&main);
        persisting.set_listener(listener.clone());
        main.set_listener(listener);

        info!(
            "event=stack_construct module=stack status=ok schema={} kind={} persisting={} main={}",
            schema.name(),
            kind.as_str(),
            persisting.id(),
            main.id()
        );

        Self {
            schema,
            kind,
            store_url,
            slot,
            router,
            persisting,
            main,
            worker_seq: AtomicU64::new(0),
        }
    }

    /// The interactive-context session for foreground work.
    pub fn main_session(&self) -> Session {
        self.main.clone()
    }

    /// The background root session directly bound to the coordinator.
    /// Exposed for bulk operations that need a coordinator-attached
    /// session.
    pub fn persisting_session(&self) -> Session {
        self.persisting.clone()
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn store_url(&self) -> Option<&Path> {
        self.store_url.as_deref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Creates a worker session: fresh background context, child of the
    /// main session, registered for commit-event propagation. Storage
    /// access is mediated entirely by the parent chain.
    pub fn new_worker_session(&self) -> Session {
        let ordinal = self.worker_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let worker = Session::new(
            SessionRole::Worker,
            MergePolicy::StoreWins,
            ExecutionContext::new(ContextKind::Background, format!("strata-worker-{ordinal}")),
            Some(self.main.clone()),
            None,
        );
        self.router.register_worker(&worker);
        let listener: Weak<dyn CommitListener> = {
            let weak = Arc::downgrade(&self.router);
            weak
        };
        worker.set_listener(listener);
        info!(
            "event=worker_create module=stack session={} ordinal={}",
            worker.id(),
            ordinal
        );
        worker
    }
}
