//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `strata_core` linkage.
//! - Show the caller-facing defaults: the platform documents directory
//!   is resolved here, never inside the core.

use std::sync::mpsc;

use strata_core::{construct_stack, SchemaBundle, StackConfig};

const SMOKE_SCHEMA: &str = "Smoke";

fn main() {
    println!("strata_core version={}", strata_core::core_version());

    let documents = dirs::document_dir();
    match &documents {
        Some(dir) => println!(
            "default store url={}",
            dir.join(format!("{SMOKE_SCHEMA}.store")).display()
        ),
        None => println!("default store url=<no documents directory on this platform>"),
    }

    let bundle = SchemaBundle::with_object_graph(SMOKE_SCHEMA);
    let (tx, rx) = mpsc::channel();
    let constructed = construct_stack(StackConfig::in_memory(SMOKE_SCHEMA, bundle), move |result| {
        let _ = tx.send(result.is_ok());
    });

    // In-memory construction completes before construct_stack returns.
    let ok = constructed.is_ok() && rx.try_recv().unwrap_or(false);
    println!("in-memory stack probe={}", if ok { "ok" } else { "failed" });
}
