use crossbeam_channel::bounded;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{
    construct_stack, PersistenceStack, SchemaBundle, SessionRole, StackConfig, StoreError,
    StoreKind,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn build_stack(config: StackConfig) -> PersistenceStack {
    let (tx, rx) = bounded(1);
    construct_stack(config, move |result| {
        let _ = tx.send(result);
    })
    .expect("construction starts");
    rx.recv_timeout(TIMEOUT)
        .expect("construction callback fires")
        .expect("stack builds")
}

#[test]
fn in_memory_construction_is_synchronous_and_succeeds() {
    let delivered = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&delivered);

    let bundle = SchemaBundle::with_object_graph("Notes");
    construct_stack(StackConfig::in_memory("Notes", bundle), move |result| {
        assert!(result.is_ok());
        flag.store(true, Ordering::SeqCst);
    })
    .expect("construction starts");

    // The in-memory callback must have fired before construct_stack returned.
    assert!(delivered.load(Ordering::SeqCst));
}

#[test]
fn in_memory_stack_has_no_store_url() {
    let bundle = SchemaBundle::with_object_graph("Notes");
    let stack = build_stack(StackConfig::in_memory("Notes", bundle));
    assert_eq!(stack.kind(), StoreKind::InMemory);
    assert!(stack.store_url().is_none());
}

#[test]
fn file_backed_default_filename_is_schema_name_dot_store() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = SchemaBundle::with_object_graph("Notes");
    let stack = build_stack(StackConfig::file_backed("Notes", bundle, dir.path()));

    let expected = dir.path().join("Notes.store");
    assert_eq!(stack.store_url(), Some(expected.as_path()));
    assert!(expected.exists(), "store file is created on attach");
}

#[test]
fn file_backed_explicit_filename_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = SchemaBundle::with_object_graph("Notes");
    let mut config = StackConfig::file_backed("Notes", bundle, dir.path());
    config.filename = Some("journal.store".to_string());

    let stack = build_stack(config);
    let expected = dir.path().join("journal.store");
    assert_eq!(stack.store_url(), Some(expected.as_path()));
}

#[test]
fn file_backed_relative_directory_fails_synchronously() {
    let delivered = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&delivered);

    let bundle = SchemaBundle::with_object_graph("Notes");
    let mut config = StackConfig::in_memory("Notes", bundle);
    config.kind = StoreKind::FileBacked;
    config.directory = Some(PathBuf::from("relative/dir"));

    let err = construct_stack(config, move |_| {
        flag.store(true, Ordering::SeqCst);
    })
    .expect_err("relative directory is rejected");

    assert!(matches!(err, StoreError::InvalidStoreUrl(_)));
    assert!(!delivered.load(Ordering::SeqCst), "callback never fires");
}

#[test]
fn file_backed_filename_with_separator_fails_synchronously() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = SchemaBundle::with_object_graph("Notes");
    let mut config = StackConfig::file_backed("Notes", bundle, dir.path());
    config.filename = Some("nested/bad.store".to_string());

    let err = construct_stack(config, move |_| panic!("callback must not fire"))
        .expect_err("separator in filename is rejected");
    assert!(matches!(err, StoreError::InvalidStoreUrl(_)));
}

#[test]
fn file_backed_without_directory_fails_synchronously() {
    let bundle = SchemaBundle::with_object_graph("Notes");
    let mut config = StackConfig::in_memory("Notes", bundle);
    config.kind = StoreKind::FileBacked;

    let err = construct_stack(config, move |_| panic!("callback must not fire"))
        .expect_err("missing directory is rejected");
    assert!(matches!(err, StoreError::InvalidStoreUrl(_)));
}

#[test]
fn stack_exposes_tagged_main_and_persisting_sessions() {
    let bundle = SchemaBundle::with_object_graph("Notes");
    let stack = build_stack(StackConfig::in_memory("Notes", bundle));

    assert_eq!(stack.main_session().role(), SessionRole::Main);
    assert_eq!(stack.persisting_session().role(), SessionRole::Persisting);

    let worker = stack.new_worker_session();
    assert_eq!(worker.role(), SessionRole::Worker);
}
