//! Per-key classification across base, local and remote.
//!
//! Records are matched by key, never by position, so moving an entry around
//! in the file is not a change.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::models::{
    normalize_field, DeltaKind, FieldChange, Record, RecordDelta, RevisionTriple, ENTRY_TYPE_FIELD,
};

/// Stateless three-way set diff.
pub struct ThreeWaySetDiff;

impl ThreeWaySetDiff {
    /// Classify every key in base ∪ local ∪ remote.
    pub fn diff(triple: &RevisionTriple) -> BTreeMap<String, RecordDelta> {
        let keys: BTreeSet<&str> = triple
            .base
            .keys()
            .chain(triple.local.keys())
            .chain(triple.remote.keys())
            .collect();

        let mut deltas = BTreeMap::new();
        for key in keys {
            let base = triple.base.get(key);
            let local = triple.local.get(key);
            let remote = triple.remote.get(key);
            if let Some(delta) = classify(key, base, local, remote) {
                debug!(key, kind = %delta.kind, "classified record");
                deltas.insert(key.to_string(), delta);
            }
        }

        info!(
            keys = deltas.len(),
            changed = deltas
                .values()
                .filter(|d| d.kind != DeltaKind::Unchanged)
                .count(),
            "three-way diff complete"
        );
        deltas
    }
}

fn classify(
    key: &str,
    base: Option<&Record>,
    local: Option<&Record>,
    remote: Option<&Record>,
) -> Option<RecordDelta> {
    let kind = match (base.is_some(), local.is_some(), remote.is_some()) {
        (false, true, false) => DeltaKind::AddedLocal,
        (false, false, true) => DeltaKind::AddedRemote,
        (false, true, true) => DeltaKind::AddedBoth,
        (true, false, true) => DeltaKind::RemovedLocal,
        (true, true, false) => DeltaKind::RemovedRemote,
        (true, false, false) => DeltaKind::RemovedBoth,
        (true, true, true) => DeltaKind::Modified,
        (false, false, false) => return None,
    };

    let local_changes = field_changes(key, base, local);
    let remote_changes = field_changes(key, base, remote);
    let kind = if kind == DeltaKind::Modified && local_changes.is_empty() && remote_changes.is_empty()
    {
        DeltaKind::Unchanged
    } else {
        kind
    };

    Some(RecordDelta {
        key: key.to_string(),
        kind,
        local_changes,
        remote_changes,
    })
}

/// Changes that turn `base` into `side`, field by field. A missing record on
/// either end reads as a record with no fields and no type. Field order
/// inside a record is not a change.
pub fn field_changes(key: &str, base: Option<&Record>, side: Option<&Record>) -> Vec<FieldChange> {
    let mut names: Vec<String> = vec![ENTRY_TYPE_FIELD.to_string()];
    for record in [side, base].into_iter().flatten() {
        for field in record.fields() {
            let name = normalize_field(&field.name);
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    names
        .into_iter()
        .filter_map(|name| {
            let old = base.and_then(|r| r.value_of(&name));
            let new = side.and_then(|r| r.value_of(&name));
            (old != new).then(|| FieldChange {
                key: key.to_string(),
                base: old.map(str::to_string),
                new: new.map(str::to_string),
                field: name,
            })
        })
        .collect()
}
