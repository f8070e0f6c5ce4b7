//! The coordinator that owns a backing store connection.
//!
//! # Responsibility
//! - Open file-backed or in-memory stores and apply the schema on attach.
//! - Apply committed change-sets transactionally; serve point reads.
//!
//! # Invariants
//! - Connection bootstrap (foreign keys, busy timeout, schema DDL) runs
//!   before any object data is touched.
//! - A change-set is applied in a single transaction: all or nothing.

use super::{StoreError, StoreKind, StoreResult};
use crate::schema::Schema;
use crate::session::change::{ChangeSet, ObjectChange, ObjectId, ObjectSnapshot};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const UPSERT_OBJECT_SQL: &str = "INSERT INTO objects (uuid, entity, payload, updated_at)
VALUES (?1, ?2, ?3, (strftime('%s', 'now') * 1000))
ON CONFLICT(uuid) DO UPDATE SET
    entity = excluded.entity,
    payload = excluded.payload,
    updated_at = excluded.updated_at;";

/// Owns one durable (or in-memory) backing store and mediates all writes
/// to it.
pub struct StoreCoordinator {
    schema: Arc<Schema>,
    kind: StoreKind,
    store_url: Option<PathBuf>,
    conn: Connection,
}

impl StoreCoordinator {
    pub(crate) fn attach_in_memory(schema: Arc<Schema>) -> StoreResult<Self> {
        Self::attach(schema, StoreKind::InMemory, None)
    }

    pub(crate) fn attach_file(schema: Arc<Schema>, store_url: PathBuf) -> StoreResult<Self> {
        Self::attach(schema, StoreKind::FileBacked, Some(store_url))
    }

    fn attach(
        schema: Arc<Schema>,
        kind: StoreKind,
        store_url: Option<PathBuf>,
    ) -> StoreResult<Self> {
        let started_at = Instant::now();
        info!(
            "event=store_attach module=store status=start kind={} schema={}",
            kind.as_str(),
            schema.name()
        );

        let opened = match &store_url {
            Some(url) => Connection::open(url),
            None => Connection::open_in_memory(),
        };
        let conn = match opened {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=store_attach module=store status=error kind={} duration_ms={} error_code=store_open_failed error={}",
                    kind.as_str(),
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        if let Err(err) = Self::bootstrap(&conn, &schema) {
            error!(
                "event=store_attach module=store status=error kind={} duration_ms={} error_code=store_bootstrap_failed error={}",
                kind.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }

        info!(
            "event=store_attach module=store status=ok kind={} duration_ms={}",
            kind.as_str(),
            started_at.elapsed().as_millis()
        );
        Ok(Self {
            schema,
            kind,
            store_url,
            conn,
        })
    }

    fn bootstrap(conn: &Connection, schema: &Schema) -> StoreResult<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        schema.apply(conn)?;
        Ok(())
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

    /// Applies one committed change-set in a single transaction.
    pub fn apply_changes(&mut self, changes: &ChangeSet) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        for change in changes.iter() {
            match change {
                ObjectChange::Upsert(snapshot) => {
                    let payload = serde_json::to_string(&snapshot.payload).map_err(|err| {
                        StoreError::InvalidData(format!(
                            "cannot encode payload for `{}`: {err}",
                            snapshot.uuid
                        ))
                    })?;
                    tx.execute(
                        UPSERT_OBJECT_SQL,
                        params![snapshot.uuid.to_string(), snapshot.entity, payload],
                    )?;
                }
                ObjectChange::Delete(id) => {
                    tx.execute("DELETE FROM objects WHERE uuid = ?1;", [id.to_string()])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Reads one object row, rejecting undecodable persisted payloads
    /// instead of masking them.
    pub fn fetch_object(&self, id: ObjectId) -> StoreResult<Option<ObjectSnapshot>> {
        let row = self
            .conn
            .query_row(
                "SELECT entity, payload FROM objects WHERE uuid = ?1;",
                [id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((entity, payload_text)) = row else {
            return Ok(None);
        };
        let payload = serde_json::from_str(&payload_text).map_err(|err| {
            StoreError::InvalidData(format!("cannot decode payload for `{id}`: {err}"))
        })?;
        Ok(Some(ObjectSnapshot {
            uuid: id,
            entity,
            payload,
        }))
    }

    /// Closes the connection, detaching the store. On failure the
    /// coordinator is handed back intact alongside the error.
    pub(crate) fn close(self) -> Result<Option<PathBuf>, (StoreCoordinator, StoreError)> {
        let Self {
            schema,
            kind,
            store_url,
            conn,
        } = self;
        match conn.close() {
            Ok(()) => Ok(store_url),
            Err((conn, err)) => Err((
                Self {
                    schema,
                    kind,
                    store_url,
                    conn,
                },
                StoreError::Coordinator(err),
            )),
        }
    }
}
