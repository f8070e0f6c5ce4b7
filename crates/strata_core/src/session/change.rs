//! Pending-change model shared between sessions and the coordinator.
//!
//! # Responsibility
//! - Define the minimal object surface the session layer exchanges with
//!   the external object-graph engine: keyed snapshots and tombstones.
//! - Resolve conflicts between incoming committed changes and a session's
//!   unsaved changes via an explicit merge policy.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another object.
//! - Within one session, later records for the same object replace
//!   earlier ones (last write wins).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable identifier for every object crossing the session boundary.
pub type ObjectId = Uuid;

/// One object's state as the session layer sees it: identity, entity tag,
/// and an opaque JSON payload owned by the object-graph engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub uuid: ObjectId,
    pub entity: String,
    pub payload: serde_json::Value,
}

impl ObjectSnapshot {
    /// Creates a snapshot with a generated stable ID.
    pub fn new(entity: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::with_id(Uuid::new_v4(), entity, payload)
    }

    /// Creates a snapshot with a caller-provided stable ID, for objects
    /// whose identity already exists externally.
    pub fn with_id(uuid: ObjectId, entity: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            uuid,
            entity: entity.into(),
            payload,
        }
    }
}

/// A single pending mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectChange {
    Upsert(ObjectSnapshot),
    Delete(ObjectId),
}

impl ObjectChange {
    pub fn object_id(&self) -> ObjectId {
        match self {
            Self::Upsert(snapshot) => snapshot.uuid,
            Self::Delete(id) => *id,
        }
    }
}

/// Tie-break rule applied when incoming committed changes collide with a
/// session's in-memory unsaved changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// The incoming, store-bound change replaces the local unsaved one.
    /// Used by the persisting/main/worker hierarchy.
    StoreWins,
    /// The local in-memory change survives. Used by batch sessions.
    ObjectWins,
}

/// A session's uncommitted work: one pending change per object, keyed for
/// deterministic iteration.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: BTreeMap<ObjectId, ObjectChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Records one change; a later record for the same object replaces
    /// any earlier one.
    pub fn record(&mut self, change: ObjectChange) {
        self.changes.insert(change.object_id(), change);
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectChange> {
        self.changes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectChange> {
        self.changes.values()
    }

    /// Takes all pending changes out, leaving this set empty.
    pub fn take(&mut self) -> ChangeSet {
        ChangeSet {
            changes: std::mem::take(&mut self.changes),
        }
    }

    /// Merges an incoming committed change-set into this one, resolving
    /// per-object conflicts with `policy`. Returns the number of
    /// conflicts that were resolved.
    pub fn merge_from(&mut self, incoming: ChangeSet, policy: MergePolicy) -> usize {
        let mut conflicts = 0;
        for (id, change) in incoming.changes {
            match self.changes.entry(id) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(change);
                }
                std::collections::btree_map::Entry::Occupied(mut slot) => {
                    conflicts += 1;
                    if policy == MergePolicy::StoreWins {
                        slot.insert(change);
                    }
                }
            }
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeSet, MergePolicy, ObjectChange, ObjectSnapshot};
    use serde_json::json;

    fn upsert(snapshot: &ObjectSnapshot) -> ObjectChange {
        ObjectChange::Upsert(snapshot.clone())
    }

    #[test]
    fn record_is_last_write_wins_per_object() {
        let snapshot = ObjectSnapshot::new("note", json!({"body": "first"}));
        let revised = ObjectSnapshot::with_id(snapshot.uuid, "note", json!({"body": "second"}));

        let mut pending = ChangeSet::new();
        pending.record(upsert(&snapshot));
        pending.record(upsert(&revised));

        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get(snapshot.uuid), Some(&upsert(&revised)));
    }

    #[test]
    fn delete_replaces_earlier_upsert() {
        let snapshot = ObjectSnapshot::new("note", json!({"body": "doomed"}));
        let mut pending = ChangeSet::new();
        pending.record(upsert(&snapshot));
        pending.record(ObjectChange::Delete(snapshot.uuid));

        assert_eq!(
            pending.get(snapshot.uuid),
            Some(&ObjectChange::Delete(snapshot.uuid))
        );
    }

    #[test]
    fn merge_store_wins_replaces_local_change() {
        let snapshot = ObjectSnapshot::new("note", json!({"body": "local"}));
        let incoming_version =
            ObjectSnapshot::with_id(snapshot.uuid, "note", json!({"body": "incoming"}));

        let mut local = ChangeSet::new();
        local.record(upsert(&snapshot));
        let mut incoming = ChangeSet::new();
        incoming.record(upsert(&incoming_version));

        let conflicts = local.merge_from(incoming, MergePolicy::StoreWins);
        assert_eq!(conflicts, 1);
        assert_eq!(local.get(snapshot.uuid), Some(&upsert(&incoming_version)));
    }

    #[test]
    fn merge_object_wins_keeps_local_change() {
        let snapshot = ObjectSnapshot::new("note", json!({"body": "local"}));
        let incoming_version =
            ObjectSnapshot::with_id(snapshot.uuid, "note", json!({"body": "incoming"}));

        let mut local = ChangeSet::new();
        local.record(upsert(&snapshot));
        let mut incoming = ChangeSet::new();
        incoming.record(upsert(&incoming_version));

        let conflicts = local.merge_from(incoming, MergePolicy::ObjectWins);
        assert_eq!(conflicts, 1);
        assert_eq!(local.get(snapshot.uuid), Some(&upsert(&snapshot)));
    }

    #[test]
    fn merge_without_conflicts_is_a_union() {
        let first = ObjectSnapshot::new("note", json!({"n": 1}));
        let second = ObjectSnapshot::new("note", json!({"n": 2}));

        let mut local = ChangeSet::new();
        local.record(upsert(&first));
        let mut incoming = ChangeSet::new();
        incoming.record(upsert(&second));

        let conflicts = local.merge_from(incoming, MergePolicy::StoreWins);
        assert_eq!(conflicts, 0);
        assert_eq!(local.len(), 2);
    }

    #[test]
    fn take_drains_the_set() {
        let mut pending = ChangeSet::new();
        pending.record(upsert(&ObjectSnapshot::new("note", json!({}))));

        let taken = pending.take();
        assert_eq!(taken.len(), 1);
        assert!(pending.is_empty());
    }
}
