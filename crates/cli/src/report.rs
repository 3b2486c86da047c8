//! Tables and previews for merge output.

use std::collections::BTreeMap;

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use bibsync_core::models::{AppliedChange, ConflictUnit, DeltaKind, MergeResult, RecordDelta, Side};

use crate::style;

const MAX_CELL: usize = 60;

/// Per-kind counts of a merge.
pub fn print_summary(result: &MergeResult) {
    let s = &result.summary;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Kind", "Entries"]);
    for (label, count) in [
        ("unchanged", s.unchanged),
        ("added locally", s.added_local),
        ("added remotely", s.added_remote),
        ("added on both sides", s.added_both),
        ("removed locally", s.removed_local),
        ("removed remotely", s.removed_remote),
        ("removed on both sides", s.removed_both),
        ("modified", s.modified),
    ] {
        if count > 0 {
            table.add_row(vec![Cell::new(label), Cell::new(count)]);
        }
    }
    println!("{}", style::header("Merge summary"));
    println!("{}", table);
}

/// Conflicts with their three values.
pub fn print_conflicts(conflicts: &[ConflictUnit]) {
    if conflicts.is_empty() {
        println!("{}", style::success("No conflicts"));
        return;
    }

    println!(
        "{}",
        style::header(&format!("Conflicts ({})", conflicts.len()))
    );
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Target", "Base", "Local", "Remote"]);
    for conflict in conflicts {
        table.add_row(conflict_row(conflict).map(Cell::new));
    }
    println!("{}", table);
}

/// Changes merged without asking.
pub fn print_applied(applied: &[AppliedChange]) {
    if applied.is_empty() {
        return;
    }
    println!("{}", style::header("Applied changes"));
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Entry", "Field", "From", "Old", "New"]);
    for a in applied {
        table.add_row(vec![
            Cell::new(&a.change.key),
            Cell::new(&a.change.field),
            Cell::new(style::origin(a.origin)),
            Cell::new(display_value(a.change.base.as_deref())),
            Cell::new(display_value(a.change.new.as_deref())),
        ]);
    }
    println!("{}", table);
}

/// Per-entry classification, hiding unchanged entries unless `all`.
pub fn print_deltas(deltas: &BTreeMap<String, RecordDelta>, all: bool) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Entry", "Change", "Local fields", "Remote fields"]);

    let mut shown = 0;
    for delta in deltas.values() {
        if !all && delta.kind == DeltaKind::Unchanged {
            continue;
        }
        shown += 1;
        table.add_row(vec![
            Cell::new(&delta.key),
            Cell::new(style::delta_kind(delta.kind)),
            Cell::new(field_list(delta, Side::Local)),
            Cell::new(field_list(delta, Side::Remote)),
        ]);
    }

    if shown == 0 {
        println!("{}", style::success("No differences"));
    } else {
        println!("{}", table);
    }
}

/// Unified diff from `old` to `new`.
pub fn preview(old: &str, new: &str) -> String {
    diffy::create_patch(old, new).to_string()
}

fn field_list(delta: &RecordDelta, side: Side) -> String {
    let changes = match side {
        Side::Local => &delta.local_changes,
        _ => &delta.remote_changes,
    };
    changes
        .iter()
        .map(|c| c.field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn conflict_row(conflict: &ConflictUnit) -> [String; 4] {
    match conflict {
        ConflictUnit::Field {
            base,
            local,
            remote,
            ..
        } => [
            conflict.target().to_string(),
            display_value(base.as_deref()),
            display_value(local.as_deref()),
            display_value(remote.as_deref()),
        ],
        ConflictUnit::ModifyDelete { deleted_by, .. } => {
            let (local, remote) = if *deleted_by == Side::Local {
                ("deleted", "modified")
            } else {
                ("modified", "deleted")
            };
            [
                conflict.target().to_string(),
                "entry".to_string(),
                local.to_string(),
                remote.to_string(),
            ]
        }
        ConflictUnit::Section {
            base,
            local,
            remote,
            ..
        } => [
            conflict.target().to_string(),
            blocks(base),
            blocks(local),
            blocks(remote),
        ],
    }
}

fn blocks(list: &[String]) -> String {
    format!("{} block(s)", list.len())
}

/// Value for a table cell. Absent values show as a dash; long ones are shortened.
pub fn display_value(value: Option<&str>) -> String {
    match value {
        None => "—".to_string(),
        Some(v) => truncate(v, MAX_CELL),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(None), "—");
        assert_eq!(display_value(Some("Knuth")), "Knuth");
        let long = "x".repeat(100);
        let shown = display_value(Some(&long));
        assert_eq!(shown.chars().count(), MAX_CELL);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_conflict_row_for_field() {
        let row = conflict_row(&ConflictUnit::Field {
            key: "a".into(),
            field: "author".into(),
            base: None,
            local: Some("author-a".into()),
            remote: Some("lala".into()),
        });
        assert_eq!(row, ["a.author", "—", "author-a", "lala"].map(String::from));
    }

    #[test]
    fn test_preview_marks_changed_lines() {
        let patch = preview("a\nb\n", "a\nc\n");
        assert!(patch.contains("-b"));
        assert!(patch.contains("+c"));
    }
}
