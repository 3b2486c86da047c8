//! Field-level merge of one record present on both sides.

use std::collections::HashMap;

use tracing::debug;

use crate::models::{
    normalize_field, AppliedChange, ConflictUnit, FieldChange, Origin, Record, RecordDelta,
    ENTRY_TYPE_FIELD,
};

/// Merged record plus what happened to its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMergeOutcome {
    /// Conflicted fields hold their base value; a conflicted entry type with
    /// no base holds local's.
    pub record: Record,
    pub conflicts: Vec<ConflictUnit>,
    pub applied: Vec<AppliedChange>,
    /// Normalized names in output order, including conflicted fields the
    /// placeholder lacks.
    pub order: Vec<String>,
}

/// Applies the per-field rules:
///
/// - one side changed: take it
/// - both changed to the same value: take it once
/// - both changed differently: conflict, keep base
/// - neither changed: keep base
pub struct FieldMerger;

impl FieldMerger {
    /// Merge a record that exists in both local and remote. `base` is absent
    /// when both sides added the key independently.
    ///
    /// Fields come out in local's order, then fields only remote has, then
    /// base fields neither side still lists (conflict placeholders).
    pub fn merge(
        delta: &RecordDelta,
        base: Option<&Record>,
        local: &Record,
        remote: &Record,
    ) -> FieldMergeOutcome {
        let local_changes = by_field(&delta.local_changes);
        let remote_changes = by_field(&delta.remote_changes);

        let mut conflicts = Vec::new();
        let mut applied = Vec::new();

        let mut decide = |field: &str| -> Option<String> {
            let base_value = base.and_then(|r| r.value_of(field)).map(str::to_string);
            match (local_changes.get(field), remote_changes.get(field)) {
                (None, None) => base_value,
                (Some(l), None) => {
                    applied.push(AppliedChange {
                        origin: Origin::Local,
                        change: (*l).clone(),
                    });
                    l.new.clone()
                }
                (None, Some(r)) => {
                    applied.push(AppliedChange {
                        origin: Origin::Remote,
                        change: (*r).clone(),
                    });
                    r.new.clone()
                }
                (Some(l), Some(r)) if l.new == r.new => {
                    applied.push(AppliedChange {
                        origin: Origin::Both,
                        change: (*l).clone(),
                    });
                    l.new.clone()
                }
                (Some(l), Some(r)) => {
                    debug!(key = %delta.key, field, "field conflict");
                    conflicts.push(ConflictUnit::Field {
                        key: delta.key.clone(),
                        field: field.to_string(),
                        base: base_value.clone(),
                        local: l.new.clone(),
                        remote: r.new.clone(),
                    });
                    base_value
                }
            }
        };

        let entry_type = decide(ENTRY_TYPE_FIELD).unwrap_or_else(|| local.entry_type().to_string());
        let mut record = Record::new(delta.key.clone(), entry_type);

        let order = field_order(base, local, remote);
        for name in &order {
            if let Some(value) = decide(name.as_str()) {
                record.set_field(spelling(name, [Some(local), Some(remote), base]), value);
            }
        }

        // Reuse a side's record when the merge reproduces it, so its text is
        // written back unchanged.
        let record = if record == *local {
            local.clone()
        } else if record == *remote {
            remote.clone()
        } else {
            record
        };

        FieldMergeOutcome {
            record,
            conflicts,
            applied,
            order,
        }
    }
}

fn by_field(changes: &[FieldChange]) -> HashMap<&str, &FieldChange> {
    changes.iter().map(|c| (c.field.as_str(), c)).collect()
}

fn field_order(base: Option<&Record>, local: &Record, remote: &Record) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in [Some(local), Some(remote), base].into_iter().flatten() {
        for field in record.fields() {
            let name = normalize_field(&field.name);
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Output spelling of a field name: the first record that has it wins.
fn spelling(name: &str, records: [Option<&Record>; 3]) -> String {
    records
        .into_iter()
        .flatten()
        .flat_map(|r| r.fields())
        .find(|f| f.name.eq_ignore_ascii_case(name))
        .map(|f| f.name.clone())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::diff::field_changes;
    use crate::models::DeltaKind;

    fn rec(key: &str, fields: &[(&str, &str)]) -> Record {
        fields
            .iter()
            .fold(Record::new(key, "article"), |r, (n, v)| r.with_field(*n, *v))
    }

    fn merge(base: Option<&Record>, local: &Record, remote: &Record) -> FieldMergeOutcome {
        let delta = RecordDelta {
            key: local.key().to_string(),
            kind: if base.is_some() {
                DeltaKind::Modified
            } else {
                DeltaKind::AddedBoth
            },
            local_changes: field_changes(local.key(), base, Some(local)),
            remote_changes: field_changes(local.key(), base, Some(remote)),
        };
        FieldMerger::merge(&delta, base, local, remote)
    }

    #[test]
    fn test_disjoint_field_edits_combine() {
        let base = rec("a", &[("title", "T"), ("year", "1999")]);
        let local = rec("a", &[("title", "T"), ("year", "1999"), ("author", "Alice")]);
        let remote = rec("a", &[("title", "T"), ("year", "2000")]);

        let out = merge(Some(&base), &local, &remote);
        assert!(out.conflicts.is_empty());
        assert_eq!(out.record.field("author"), Some("Alice"));
        assert_eq!(out.record.field("year"), Some("2000"));
        assert_eq!(out.applied.len(), 2);
    }

    #[test]
    fn test_identical_change_applies_once() {
        let base = rec("a", &[("year", "1999")]);
        let local = rec("a", &[("year", "2001")]);
        let remote = rec("a", &[("year", "2001")]);

        let out = merge(Some(&base), &local, &remote);
        assert!(out.conflicts.is_empty());
        assert_eq!(out.record.field("year"), Some("2001"));
        assert_eq!(out.applied.len(), 1);
        assert_eq!(out.applied[0].origin, Origin::Both);
    }

    #[test]
    fn test_divergent_change_conflicts_with_base_placeholder() {
        let base = rec("a", &[("author", "base")]);
        let local = rec("a", &[("author", "author-a")]);
        let remote = rec("a", &[("author", "author-b")]);

        let out = merge(Some(&base), &local, &remote);
        assert_eq!(out.record.field("author"), Some("base"));
        assert_eq!(
            out.conflicts,
            vec![ConflictUnit::Field {
                key: "a".into(),
                field: "author".into(),
                base: Some("base".into()),
                local: Some("author-a".into()),
                remote: Some("author-b".into()),
            }]
        );
    }

    #[test]
    fn test_both_added_field_differently_without_base() {
        let base = rec("a", &[]);
        let local = rec("a", &[("author", "author-a")]);
        let remote = rec("a", &[("author", "author-b")]);

        let out = merge(Some(&base), &local, &remote);
        assert_eq!(out.conflicts.len(), 1);
        assert_eq!(out.record.field("author"), None);
    }

    #[test]
    fn test_removal_against_untouched_side_wins() {
        let base = rec("a", &[("doi", "10/x"), ("title", "T")]);
        let local = rec("a", &[("title", "T")]);
        let remote = base.clone();

        let out = merge(Some(&base), &local, &remote);
        assert!(out.conflicts.is_empty());
        assert_eq!(out.record.field("doi"), None);
    }

    #[test]
    fn test_removal_against_edit_conflicts() {
        let base = rec("a", &[("doi", "10/x")]);
        let local = rec("a", &[]);
        let remote = rec("a", &[("doi", "10/y")]);

        let out = merge(Some(&base), &local, &remote);
        assert_eq!(out.conflicts.len(), 1);
        assert_eq!(out.record.field("doi"), Some("10/x"));
    }

    #[test]
    fn test_entry_type_conflict_without_base_keeps_local_type() {
        let local = Record::new("n", "book").with_field("title", "T");
        let remote = Record::new("n", "article").with_field("title", "T");

        let out = merge(None, &local, &remote);
        assert_eq!(out.conflicts.len(), 1);
        assert_eq!(out.conflicts[0].target().to_string(), "n.#type");
        assert_eq!(out.record.entry_type(), "book");
        assert_eq!(out.record.field("title"), Some("T"));
    }

    #[test]
    fn test_real_entrytype_field_is_an_ordinary_field() {
        let base = rec("a", &[("entrytype", "custom"), ("title", "T")]);
        let local = rec("a", &[("entrytype", "custom"), ("title", "T"), ("year", "2001")]);
        let remote = base.clone();

        let out = merge(Some(&base), &local, &remote);
        assert!(out.conflicts.is_empty());
        assert_eq!(out.record.entry_type(), "article");
        assert_eq!(out.record.field("entrytype"), Some("custom"));
        assert_eq!(out.record.field("year"), Some("2001"));
        assert_eq!(out.record, local);
    }

    #[test]
    fn test_real_entrytype_field_conflicts_apart_from_the_type() {
        let base = Record::new("a", "article").with_field("entrytype", "x");
        let local = Record::new("a", "book").with_field("entrytype", "y");
        let remote = Record::new("a", "article").with_field("entrytype", "z");

        let out = merge(Some(&base), &local, &remote);
        assert_eq!(out.record.entry_type(), "book");
        assert_eq!(out.record.field("entrytype"), Some("x"));
        assert_eq!(
            out.conflicts.iter().map(|c| c.target().to_string()).collect::<Vec<_>>(),
            vec!["a.entrytype"]
        );
    }

    #[test]
    fn test_field_order_prefers_local() {
        let base = rec("a", &[("title", "T"), ("year", "1999")]);
        let local = rec("a", &[("year", "1999"), ("title", "T"), ("note", "n")]);
        let remote = rec("a", &[("title", "T"), ("year", "1999"), ("pages", "1--2")]);

        let out = merge(Some(&base), &local, &remote);
        let names: Vec<&str> = out.record.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["year", "title", "note", "pages"]);
    }

    #[test]
    fn test_merge_equal_to_local_reuses_its_source() {
        let base = rec("a", &[("title", "T")]);
        let local = rec("a", &[("title", "New")]).with_source("@article{a, title={New}}", 1);
        let remote = base.clone();

        let out = merge(Some(&base), &local, &remote);
        assert_eq!(out.record.source(), Some("@article{a, title={New}}"));
    }
}
