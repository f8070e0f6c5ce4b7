//! Named schema resources and the loader that resolves them.
//!
//! # Responsibility
//! - Map schema names to the DDL a coordinator applies when attaching
//!   a store.
//! - Keep resource resolution explicit: callers hand a `SchemaBundle` in,
//!   nothing is looked up from ambient process state.
//!
//! # Invariants
//! - A loaded `Schema` is immutable; coordinators share it via `Arc`.
//! - Schema DDL must be idempotent (`IF NOT EXISTS` forms) so re-attaching
//!   an existing store is safe.

use rusqlite::Connection;
use std::collections::BTreeMap;

/// Generic object-graph DDL shipped with the crate: one `objects` table
/// keyed by stable UUID, entity-tagged, with a JSON payload column.
pub const OBJECT_GRAPH_DDL: &str = include_str!("object_graph.sql");

/// An immutable, named schema resolved from a [`SchemaBundle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    ddl: String,
}

impl Schema {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the schema DDL to a freshly opened connection.
    pub(crate) fn apply(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(&self.ddl)
    }
}

/// An explicit set of named schema resources.
///
/// Stands in for the host platform's resource bundle: the caller decides
/// which resources exist instead of the core consulting a process-global
/// default bundle.
#[derive(Debug, Clone, Default)]
pub struct SchemaBundle {
    resources: BTreeMap<String, String>,
}

impl SchemaBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bundle containing one schema backed by the built-in
    /// object-graph DDL. Convenience for hosts without custom entities.
    pub fn with_object_graph(name: impl Into<String>) -> Self {
        let mut bundle = Self::new();
        bundle.register(name, OBJECT_GRAPH_DDL);
        bundle
    }

    /// Registers a named DDL resource. Re-registering a name replaces it.
    pub fn register(&mut self, name: impl Into<String>, ddl: impl Into<String>) {
        self.resources.insert(name.into(), ddl.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    fn resource(&self, name: &str) -> Option<&str> {
        self.resources.get(name).map(String::as_str)
    }
}

/// Resolves a named schema from the bundle.
///
/// # Panics
/// Panics when the bundle has no resource under `name`. A missing schema
/// is a packaging defect, not a runtime condition callers can recover
/// from, so it fails fast and loudly.
pub fn load_schema(name: &str, bundle: &SchemaBundle) -> Schema {
    let ddl = bundle.resource(name).unwrap_or_else(|| {
        panic!("schema `{name}` is not present in the provided resource bundle")
    });
    Schema {
        name: name.to_string(),
        ddl: ddl.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{load_schema, SchemaBundle};

    #[test]
    fn load_schema_resolves_registered_resource() {
        let bundle = SchemaBundle::with_object_graph("Notes");
        let schema = load_schema("Notes", &bundle);
        assert_eq!(schema.name(), "Notes");
    }

    #[test]
    #[should_panic(expected = "not present in the provided resource bundle")]
    fn load_schema_panics_on_missing_resource() {
        let bundle = SchemaBundle::new();
        let _ = load_schema("Missing", &bundle);
    }

    #[test]
    fn register_replaces_existing_resource() {
        let mut bundle = SchemaBundle::new();
        bundle.register("Notes", "CREATE TABLE IF NOT EXISTS a (x);");
        bundle.register("Notes", "CREATE TABLE IF NOT EXISTS b (x);");
        assert!(bundle.contains("Notes"));
        let schema = load_schema("Notes", &bundle);
        assert!(schema.ddl.contains("b"));
    }
}
