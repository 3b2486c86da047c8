//! Domain model types used throughout bibsync.
//!
//! These types carry no merge behaviour of their own; they bridge the codec,
//! the merge engine and the sync service.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

/// Pseudo-field name under which the entry type takes part in a merge.
///
/// `#` cannot appear in a parsed field name, so a real field called
/// `entrytype` or `type` never collides with it.
pub const ENTRY_TYPE_FIELD: &str = "#type";

/// Normalize a field name for case-insensitive comparison.
pub fn normalize_field(name: &str) -> String {
    name.to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Sides and sections
// ---------------------------------------------------------------------------

/// One of the three revisions taking part in a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Base,
    Local,
    Remote,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Non-record parts of a bibliography file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// `@string`, `@preamble` and anything written before the first entry.
    Preamble,
    /// Comments and free text after the first entry.
    Trailer,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preamble => write!(f, "preamble"),
            Self::Trailer => write!(f, "trailer"),
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A single named field of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

/// A uniquely-keyed bibliography entry.
///
/// Field lookup is case-insensitive; the spelling of the first occurrence is
/// kept for output. A record parsed from content remembers its verbatim text
/// so untouched entries serialize byte-for-byte. Any mutation forgets it.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    key: String,
    entry_type: String,
    fields: Vec<Field>,
    #[serde(skip)]
    source: Option<String>,
    #[serde(skip)]
    line: usize,
}

impl Record {
    /// Create an empty record. The entry type is stored lower-case.
    pub fn new(key: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entry_type: entry_type.into().to_ascii_lowercase(),
            fields: Vec::new(),
            source: None,
            line: 0,
        }
    }

    /// Builder-style variant of [`set_field`](Self::set_field).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Attach the verbatim text and starting line this record was parsed from.
    pub fn with_source(mut self, source: impl Into<String>, line: usize) -> Self {
        self.source = Some(source.into());
        self.line = line;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn entry_type(&self) -> &str {
        &self.entry_type
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Verbatim source text, if the record is unmodified since parsing.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// 1-based line the record started on (0 when not parsed).
    pub fn line(&self) -> usize {
        self.line
    }

    /// Look up a field value by case-insensitive name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    /// Like [`field`](Self::field), but also answers [`ENTRY_TYPE_FIELD`].
    pub fn value_of(&self, name: &str) -> Option<&str> {
        if name.eq_ignore_ascii_case(ENTRY_TYPE_FIELD) {
            Some(&self.entry_type)
        } else {
            self.field(name)
        }
    }

    /// Set a field, keeping its position when it already exists.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        self.source = None;
        match self
            .fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(&name))
        {
            Some(existing) => existing.value = value,
            None => self.fields.push(Field { name, value }),
        }
    }

    /// Remove a field, returning its previous value.
    pub fn remove_field(&mut self, name: &str) -> Option<String> {
        let idx = self
            .fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))?;
        self.source = None;
        Some(self.fields.remove(idx).value)
    }

    pub fn set_entry_type(&mut self, entry_type: impl Into<String>) {
        self.entry_type = entry_type.into().to_ascii_lowercase();
        self.source = None;
    }

    /// Set or remove a value addressed by field name, including the entry type.
    ///
    /// A field the record lacks is inserted at its place in `order`
    /// (normalized names); names missing from `order` are appended.
    /// Removing the entry type is not possible; such a request is ignored.
    pub fn apply_value(&mut self, name: &str, value: Option<&str>, order: &[String]) {
        if name.eq_ignore_ascii_case(ENTRY_TYPE_FIELD) {
            if let Some(v) = value {
                self.set_entry_type(v);
            }
            return;
        }
        match value {
            Some(v) if self.field(name).is_none() => self.insert_field(name, v, order),
            Some(v) => self.set_field(name, v),
            None => {
                self.remove_field(name);
            }
        }
    }

    fn insert_field(&mut self, name: &str, value: &str, order: &[String]) {
        let rank = |n: &str| order.iter().position(|o| o.eq_ignore_ascii_case(n));
        let idx = match rank(name) {
            Some(target) => self
                .fields
                .iter()
                .position(|f| rank(&f.name).is_some_and(|r| r > target))
                .unwrap_or(self.fields.len()),
            None => self.fields.len(),
        };
        self.source = None;
        self.fields.insert(
            idx,
            Field {
                name: name.to_string(),
                value: value.to_string(),
            },
        );
    }
}

impl PartialEq for Record {
    /// Content equality: key, type and fields in order. Field names compare
    /// case-insensitively; source text is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.entry_type == other.entry_type
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name.eq_ignore_ascii_case(&b.name) && a.value == b.value)
    }
}

impl Eq for Record {}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The ordered records of one revision, indexed by key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    records: Vec<Record>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    preamble: Vec<String>,
    trailer: Vec<String>,
}

impl Snapshot {
    /// Build a snapshot, rejecting duplicate keys.
    pub fn from_records(records: Vec<Record>) -> Result<Self, ParseError> {
        let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if let Some(&first) = index.get(record.key()) {
                return Err(ParseError::DuplicateKey {
                    key: record.key().to_string(),
                    first_line: records[first].line(),
                    second_line: record.line(),
                });
            }
            index.insert(record.key().to_string(), i);
        }
        Ok(Self {
            records,
            index,
            preamble: Vec::new(),
            trailer: Vec::new(),
        })
    }

    /// Build from records whose keys are already known to be distinct, such
    /// as one merged record per key of a diff.
    pub(crate) fn from_distinct(records: Vec<Record>) -> Self {
        let index: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(i, record)| (record.key().to_string(), i))
            .collect();
        debug_assert_eq!(index.len(), records.len(), "duplicate keys in merged records");
        Self {
            records,
            index,
            preamble: Vec::new(),
            trailer: Vec::new(),
        }
    }

    /// Attach the non-record blocks of the file.
    pub fn with_blocks(mut self, preamble: Vec<String>, trailer: Vec<String>) -> Self {
        self.preamble = preamble;
        self.trailer = trailer;
        self
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Position of `key` in file order.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.key())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn preamble(&self) -> &[String] {
        &self.preamble
    }

    pub fn trailer(&self) -> &[String] {
        &self.trailer
    }

    pub fn blocks(&self, section: Section) -> &[String] {
        match section {
            Section::Preamble => &self.preamble,
            Section::Trailer => &self.trailer,
        }
    }

    pub(crate) fn set_blocks(&mut self, section: Section, blocks: Vec<String>) {
        match section {
            Section::Preamble => self.preamble = blocks,
            Section::Trailer => self.trailer = blocks,
        }
    }

    /// Replace the record stored under `key`, keeping its position.
    pub(crate) fn replace(&mut self, record: Record) -> bool {
        match self.index.get(record.key()) {
            Some(&i) => {
                self.records[i] = record;
                true
            }
            None => false,
        }
    }

    /// Remove the record stored under `key`.
    pub(crate) fn remove(&mut self, key: &str) -> Option<Record> {
        let idx = self.index.remove(key)?;
        let removed = self.records.remove(idx);
        for i in self.index.values_mut() {
            if *i > idx {
                *i -= 1;
            }
        }
        Some(removed)
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
            && self.preamble == other.preamble
            && self.trailer == other.trailer
    }
}

impl Eq for Snapshot {}

/// The three snapshots of one merge attempt.
#[derive(Debug, Clone)]
pub struct RevisionTriple {
    pub base: Snapshot,
    pub local: Snapshot,
    pub remote: Snapshot,
}

impl RevisionTriple {
    pub fn new(base: Snapshot, local: Snapshot, remote: Snapshot) -> Self {
        Self {
            base,
            local,
            remote,
        }
    }

    pub fn side(&self, side: Side) -> &Snapshot {
        match side {
            Side::Base => &self.base,
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }
}

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

/// A single field's change relative to base. `None` means "not present".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub key: String,
    pub field: String,
    pub base: Option<String>,
    pub new: Option<String>,
}

/// How a key fared across base, local and remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Unchanged,
    AddedLocal,
    AddedRemote,
    AddedBoth,
    RemovedLocal,
    RemovedRemote,
    RemovedBoth,
    Modified,
}

impl std::fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::AddedLocal => write!(f, "added_local"),
            Self::AddedRemote => write!(f, "added_remote"),
            Self::AddedBoth => write!(f, "added_both"),
            Self::RemovedLocal => write!(f, "removed_local"),
            Self::RemovedRemote => write!(f, "removed_remote"),
            Self::RemovedBoth => write!(f, "removed_both"),
            Self::Modified => write!(f, "modified"),
        }
    }
}

/// Classification of one key plus each side's field changes against base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordDelta {
    pub key: String,
    pub kind: DeltaKind,
    pub local_changes: Vec<FieldChange>,
    pub remote_changes: Vec<FieldChange>,
}

impl RecordDelta {
    /// One side deleted the record while the other side edited it.
    pub fn is_modify_delete(&self) -> bool {
        match self.kind {
            DeltaKind::RemovedLocal => !self.remote_changes.is_empty(),
            DeltaKind::RemovedRemote => !self.local_changes.is_empty(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

/// A divergence the merge rules cannot settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictUnit {
    /// Both sides set one field to different values.
    Field {
        key: String,
        field: String,
        base: Option<String>,
        local: Option<String>,
        remote: Option<String>,
    },
    /// One side deleted a record the other side modified.
    ModifyDelete {
        key: String,
        deleted_by: Side,
        base: Record,
        surviving: Record,
    },
    /// Both sides rewrote the same block list differently.
    Section {
        section: Section,
        base: Vec<String>,
        local: Vec<String>,
        remote: Vec<String>,
    },
}

impl ConflictUnit {
    pub fn target(&self) -> ConflictTarget {
        match self {
            Self::Field { key, field, .. } => ConflictTarget::Field {
                key: key.clone(),
                field: normalize_field(field),
            },
            Self::ModifyDelete { key, .. } => ConflictTarget::Record { key: key.clone() },
            Self::Section { section, .. } => ConflictTarget::Section { section: *section },
        }
    }

    /// Record key the conflict belongs to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Field { key, .. } | Self::ModifyDelete { key, .. } => Some(key),
            Self::Section { .. } => None,
        }
    }
}

/// Address of a conflict, used to match resolutions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictTarget {
    Field { key: String, field: String },
    Record { key: String },
    Section { section: Section },
}

impl std::fmt::Display for ConflictTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field { key, field } => write!(f, "{}.{}", key, field),
            Self::Record { key } => write!(f, "{}", key),
            Self::Section { section } => write!(f, "@{}", section),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge result
// ---------------------------------------------------------------------------

/// Which side an automatically applied change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Local,
    Remote,
    Both,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// An auto-applied change, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedChange {
    pub origin: Origin,
    pub change: FieldChange,
}

/// Per-kind counts over every key of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub unchanged: usize,
    pub added_local: usize,
    pub added_remote: usize,
    pub added_both: usize,
    pub removed_local: usize,
    pub removed_remote: usize,
    pub removed_both: usize,
    pub modified: usize,
    pub conflicts: usize,
}

impl MergeSummary {
    pub(crate) fn count(&mut self, kind: DeltaKind) {
        match kind {
            DeltaKind::Unchanged => self.unchanged += 1,
            DeltaKind::AddedLocal => self.added_local += 1,
            DeltaKind::AddedRemote => self.added_remote += 1,
            DeltaKind::AddedBoth => self.added_both += 1,
            DeltaKind::RemovedLocal => self.removed_local += 1,
            DeltaKind::RemovedRemote => self.removed_remote += 1,
            DeltaKind::RemovedBoth => self.removed_both += 1,
            DeltaKind::Modified => self.modified += 1,
        }
    }
}

/// Outcome of a three-way merge. Conflicts are data, not errors.
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    /// Merged records; conflicted values hold their base value as placeholder.
    pub merged: Snapshot,
    /// Conflicts in merged-record order.
    pub conflicts: Vec<ConflictUnit>,
    /// Changes applied without conflict.
    pub applied: Vec<AppliedChange>,
    pub summary: MergeSummary,
    /// Merged field order of each record with a field conflict, so resolved
    /// values land where the merge would have put them.
    #[serde(skip)]
    pub(crate) field_orders: HashMap<String, Vec<String>>,
}

impl MergeResult {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Resolutions
// ---------------------------------------------------------------------------

/// One caller-chosen answer to a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Set the field to `value`, or remove it when `None`.
    Field {
        key: String,
        field: String,
        value: Option<String>,
    },
    /// Keep the surviving record or delete it.
    Record { key: String, keep: bool },
    /// Replace a block list.
    Section {
        section: Section,
        blocks: Vec<String>,
    },
}

/// Caller-chosen values keyed by conflict target.
///
/// Serializes as a list of [`Resolution`] entries. Entries that match no
/// current conflict are ignored when applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Resolution>", into = "Vec<Resolution>")]
pub struct ResolutionMap {
    fields: BTreeMap<(String, String), Option<String>>,
    records: BTreeMap<String, bool>,
    sections: BTreeMap<Section, Vec<String>>,
}

impl ResolutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_field(
        &mut self,
        key: impl Into<String>,
        field: &str,
        value: Option<String>,
    ) -> &mut Self {
        self.fields
            .insert((key.into(), normalize_field(field)), value);
        self
    }

    pub fn keep_record(&mut self, key: impl Into<String>) -> &mut Self {
        self.records.insert(key.into(), true);
        self
    }

    pub fn delete_record(&mut self, key: impl Into<String>) -> &mut Self {
        self.records.insert(key.into(), false);
        self
    }

    pub fn resolve_section(&mut self, section: Section, blocks: Vec<String>) -> &mut Self {
        self.sections.insert(section, blocks);
        self
    }

    pub fn insert(&mut self, resolution: Resolution) -> &mut Self {
        match resolution {
            Resolution::Field { key, field, value } => self.resolve_field(key, &field, value),
            Resolution::Record { key, keep } => {
                self.records.insert(key, keep);
                self
            }
            Resolution::Section { section, blocks } => self.resolve_section(section, blocks),
        }
    }

    /// Chosen value for a field conflict; the inner `None` means "remove".
    pub fn field(&self, key: &str, field: &str) -> Option<Option<&str>> {
        self.fields
            .get(&(key.to_string(), normalize_field(field)))
            .map(|v| v.as_deref())
    }

    /// `Some(true)` keeps the record, `Some(false)` deletes it.
    pub fn record(&self, key: &str) -> Option<bool> {
        self.records.get(key).copied()
    }

    pub fn section(&self, section: Section) -> Option<&[String]> {
        self.sections.get(&section).map(|b| b.as_slice())
    }

    /// Whether this map answers `conflict`.
    pub fn covers(&self, conflict: &ConflictUnit) -> bool {
        match conflict {
            ConflictUnit::Field { key, field, .. } => self.field(key, field).is_some(),
            ConflictUnit::ModifyDelete { key, .. } => self.records.contains_key(key),
            ConflictUnit::Section { section, .. } => self.sections.contains_key(section),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.records.len() + self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Resolution>> for ResolutionMap {
    fn from(entries: Vec<Resolution>) -> Self {
        let mut map = Self::new();
        for entry in entries {
            map.insert(entry);
        }
        map
    }
}

impl From<ResolutionMap> for Vec<Resolution> {
    fn from(map: ResolutionMap) -> Self {
        let mut out = Vec::with_capacity(map.len());
        for ((key, field), value) in map.fields {
            out.push(Resolution::Field { key, field, value });
        }
        for (key, keep) in map.records {
            out.push(Resolution::Record { key, keep });
        }
        for (section, blocks) in map.sections {
            out.push(Resolution::Section { section, blocks });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup_is_case_insensitive() {
        let record = Record::new("a", "Article").with_field("Author", "Knuth");
        assert_eq!(record.entry_type(), "article");
        assert_eq!(record.field("author"), Some("Knuth"));
        assert_eq!(record.field("AUTHOR"), Some("Knuth"));
        assert_eq!(record.value_of(ENTRY_TYPE_FIELD), Some("article"));
    }

    #[test]
    fn test_set_field_keeps_position_and_drops_source() {
        let mut record = Record::new("a", "book")
            .with_field("title", "T")
            .with_field("year", "1999")
            .with_source("@book{a, title = {T}, year = 1999}", 1);
        assert!(record.source().is_some());

        record.set_field("TITLE", "New");
        assert!(record.source().is_none());
        assert_eq!(record.fields()[0].name, "title");
        assert_eq!(record.fields()[0].value, "New");
        assert_eq!(record.fields().len(), 2);
    }

    #[test]
    fn test_record_equality_ignores_source_and_name_case() {
        let a = Record::new("k", "misc").with_field("Note", "x");
        let b = Record::new("k", "misc")
            .with_field("note", "x")
            .with_source("@misc{k, note = {x}}", 4);
        assert_eq!(a, b);
        assert_ne!(a, Record::new("k", "misc").with_field("note", "y"));
    }

    #[test]
    fn test_snapshot_rejects_duplicate_keys() {
        let records = vec![
            Record::new("a", "misc").with_source("@misc{a,}", 1),
            Record::new("b", "misc").with_source("@misc{b,}", 3),
            Record::new("a", "misc").with_source("@misc{a,}", 5),
        ];
        let err = Snapshot::from_records(records).unwrap_err();
        assert_eq!(
            err,
            ParseError::DuplicateKey {
                key: "a".into(),
                first_line: 1,
                second_line: 5,
            }
        );
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let snapshot = Snapshot::from_records(vec![
            Record::new("Smith", "misc"),
            Record::new("smith", "misc"),
        ])
        .unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.position("smith"), Some(1));
    }

    #[test]
    fn test_from_distinct_indexes_every_record() {
        let snapshot = Snapshot::from_distinct(vec![
            Record::new("z", "misc"),
            Record::new("a", "misc"),
        ]);
        assert_eq!(snapshot.position("z"), Some(0));
        assert_eq!(snapshot.position("a"), Some(1));
        assert!(snapshot.preamble().is_empty());
    }

    #[test]
    fn test_snapshot_remove_reindexes() {
        let mut snapshot = Snapshot::from_records(vec![
            Record::new("a", "misc"),
            Record::new("b", "misc"),
            Record::new("c", "misc"),
        ])
        .unwrap();
        assert!(snapshot.remove("a").is_some());
        assert_eq!(snapshot.position("c"), Some(1));
        assert_eq!(snapshot.get("b").map(|r| r.key()), Some("b"));
    }

    #[test]
    fn test_modify_delete_detection() {
        let delta = RecordDelta {
            key: "a".into(),
            kind: DeltaKind::RemovedLocal,
            local_changes: Vec::new(),
            remote_changes: vec![FieldChange {
                key: "a".into(),
                field: "year".into(),
                base: Some("1999".into()),
                new: Some("2000".into()),
            }],
        };
        assert!(delta.is_modify_delete());
    }

    #[test]
    fn test_resolution_map_json_shape() {
        let mut map = ResolutionMap::new();
        map.resolve_field("a", "Author", Some("author-a".into()))
            .delete_record("b");

        let json = serde_json::to_string(&map).unwrap();
        let back: ResolutionMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.field("a", "author"), Some(Some("author-a")));
        assert_eq!(back.record("b"), Some(false));

        let parsed: ResolutionMap = serde_json::from_str(
            r#"[{"kind": "field", "key": "x", "field": "doi", "value": null}]"#,
        )
        .unwrap();
        assert_eq!(parsed.field("x", "DOI"), Some(None));
    }

    #[test]
    fn test_conflict_target_display() {
        let t = ConflictTarget::Field {
            key: "a".into(),
            field: "author".into(),
        };
        assert_eq!(t.to_string(), "a.author");
        let t = ConflictTarget::Section {
            section: Section::Trailer,
        };
        assert_eq!(t.to_string(), "@trailer");
    }
}
