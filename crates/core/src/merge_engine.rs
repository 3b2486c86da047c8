//! Merge orchestration.
//!
//! The [`MergeEngine`] drives one merge attempt through a small state
//! machine:
//!
//! 1. Extract base, local and remote into snapshots (`Loaded`).
//! 2. Classify every key with the three-way set diff (`Diffed`).
//! 3. Merge records field by field and order the result (`Resolved` or
//!    `NeedsResolution`).
//! 4. Apply caller resolutions (`Finalized`).
//!
//! Extraction failures move the engine to `Aborted`. Both `Finalized` and
//! `Aborted` are terminal; a new attempt needs a new engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bib::{BibCodec, BibtexCodec, RecordExtractor};
use crate::errors::{MergeError, ResolutionError};
use crate::merge::{FieldMerger, ResolutionApplier, ThreeWaySetDiff};
use crate::models::{
    AppliedChange, ConflictUnit, DeltaKind, FieldChange, MergeResult, MergeSummary, Origin, Record,
    ResolutionMap, RevisionTriple, Section, Side, Snapshot,
};

// ---------------------------------------------------------------------------
// Merge state machine
// ---------------------------------------------------------------------------

/// Life-cycle states of one merge attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeState {
    Init,
    Loaded,
    Diffed,
    Resolved,
    NeedsResolution,
    Finalized,
    Aborted,
}

impl MergeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Aborted)
    }
}

impl std::fmt::Display for MergeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Loaded => write!(f, "loaded"),
            Self::Diffed => write!(f, "diffed"),
            Self::Resolved => write!(f, "resolved"),
            Self::NeedsResolution => write!(f, "needs_resolution"),
            Self::Finalized => write!(f, "finalized"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives a single three-way merge from raw content to a final snapshot.
#[derive(Debug)]
pub struct MergeEngine<C = BibtexCodec> {
    extractor: RecordExtractor<C>,
    state: MergeState,
    triple: Option<RevisionTriple>,
}

impl Default for MergeEngine<BibtexCodec> {
    fn default() -> Self {
        Self::new(BibtexCodec::default())
    }
}

impl<C: BibCodec> MergeEngine<C> {
    pub fn new(codec: C) -> Self {
        Self {
            extractor: RecordExtractor::new(codec),
            state: MergeState::Init,
            triple: None,
        }
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    pub fn codec(&self) -> &C {
        self.extractor.codec()
    }

    /// Snapshots of the current attempt, once loaded.
    pub fn triple(&self) -> Option<&RevisionTriple> {
        self.triple.as_ref()
    }

    /// Extract and merge three revisions of the same file.
    ///
    /// Conflicts are returned as data on the result; only extraction
    /// failures and out-of-order calls are errors.
    pub fn submit_merge(
        &mut self,
        base: &[u8],
        local: &[u8],
        remote: &[u8],
    ) -> Result<MergeResult, MergeError> {
        self.expect_state(MergeState::Init, MergeState::Loaded)?;

        let triple = match self.extract_triple(base, local, remote) {
            Ok(triple) => triple,
            Err(e) => {
                warn!(error = %e, "extraction failed, aborting merge");
                self.state = MergeState::Aborted;
                return Err(e);
            }
        };

        self.state = MergeState::Loaded;
        Ok(self.run(triple))
    }

    /// Merge snapshots that were already extracted.
    pub fn submit_snapshots(&mut self, triple: RevisionTriple) -> Result<MergeResult, MergeError> {
        self.expect_state(MergeState::Init, MergeState::Loaded)?;
        self.state = MergeState::Loaded;
        Ok(self.run(triple))
    }

    /// Apply resolutions to the result this engine produced.
    ///
    /// A map that leaves conflicts open is rejected and the engine stays in
    /// `NeedsResolution`, so the caller can retry with a complete map.
    pub fn apply_resolutions(
        &mut self,
        result: &MergeResult,
        resolutions: &ResolutionMap,
    ) -> Result<Snapshot, ResolutionError> {
        if !matches!(
            self.state,
            MergeState::Resolved | MergeState::NeedsResolution
        ) {
            return Err(ResolutionError::InvalidStateTransition {
                from: self.state.to_string(),
                to: MergeState::Finalized.to_string(),
            });
        }

        let snapshot = ResolutionApplier::apply(result, resolutions)?;
        self.state = MergeState::Finalized;
        info!(records = snapshot.len(), "merge finalized");
        Ok(snapshot)
    }

    /// Give up on the attempt, e.g. after a backend failure outside the
    /// engine. Terminal states are left as they are.
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            debug!(from = %self.state, "merge aborted");
            self.state = MergeState::Aborted;
        }
    }

    fn extract_triple(
        &self,
        base: &[u8],
        local: &[u8],
        remote: &[u8],
    ) -> Result<RevisionTriple, MergeError> {
        let extract = |side: Side, content: &[u8]| {
            self.extractor
                .extract(content)
                .map_err(|source| MergeError::Parse { side, source })
        };
        Ok(RevisionTriple::new(
            extract(Side::Base, base)?,
            extract(Side::Local, local)?,
            extract(Side::Remote, remote)?,
        ))
    }

    fn run(&mut self, triple: RevisionTriple) -> MergeResult {
        self.state = MergeState::Diffed;
        let result = merge_triple(&triple);
        self.triple = Some(triple);
        self.state = if result.has_conflicts() {
            MergeState::NeedsResolution
        } else {
            MergeState::Resolved
        };
        result
    }

    fn expect_state(&self, expected: MergeState, to: MergeState) -> Result<(), MergeError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(MergeError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Pure merge
// ---------------------------------------------------------------------------

/// Merge three snapshots. Pure and deterministic.
pub fn merge_triple(triple: &RevisionTriple) -> MergeResult {
    let deltas = ThreeWaySetDiff::diff(triple);

    let mut summary = MergeSummary::default();
    let mut records: Vec<Record> = Vec::new();
    let mut conflicts_by_key: HashMap<String, Vec<ConflictUnit>> = HashMap::new();
    let mut applied: Vec<AppliedChange> = Vec::new();
    let mut field_orders: HashMap<String, Vec<String>> = HashMap::new();

    let tag = |origin: Origin, changes: &[FieldChange]| {
        changes
            .iter()
            .cloned()
            .map(move |change| AppliedChange { origin, change })
            .collect::<Vec<_>>()
    };

    for (key, delta) in &deltas {
        summary.count(delta.kind);
        let base = triple.base.get(key);
        let local = triple.local.get(key);
        let remote = triple.remote.get(key);

        match (delta.kind, base, local, remote) {
            (DeltaKind::Unchanged, _, Some(l), _) => records.push(l.clone()),
            (DeltaKind::AddedLocal, _, Some(l), _) => {
                records.push(l.clone());
                applied.extend(tag(Origin::Local, &delta.local_changes));
            }
            (DeltaKind::AddedRemote, _, _, Some(r)) => {
                records.push(r.clone());
                applied.extend(tag(Origin::Remote, &delta.remote_changes));
            }
            (DeltaKind::AddedBoth | DeltaKind::Modified, b, Some(l), Some(r)) => {
                let outcome = FieldMerger::merge(delta, b, l, r);
                records.push(outcome.record);
                applied.extend(outcome.applied);
                if !outcome.conflicts.is_empty() {
                    conflicts_by_key.insert(key.clone(), outcome.conflicts);
                    field_orders.insert(key.clone(), outcome.order);
                }
            }
            (DeltaKind::RemovedLocal, Some(b), _, Some(r)) if delta.is_modify_delete() => {
                debug!(key = %key, "removed locally, modified remotely");
                records.push(b.clone());
                conflicts_by_key.insert(
                    key.clone(),
                    vec![ConflictUnit::ModifyDelete {
                        key: key.clone(),
                        deleted_by: Side::Local,
                        base: b.clone(),
                        surviving: r.clone(),
                    }],
                );
            }
            (DeltaKind::RemovedRemote, Some(b), Some(l), _) if delta.is_modify_delete() => {
                debug!(key = %key, "removed remotely, modified locally");
                records.push(b.clone());
                conflicts_by_key.insert(
                    key.clone(),
                    vec![ConflictUnit::ModifyDelete {
                        key: key.clone(),
                        deleted_by: Side::Remote,
                        base: b.clone(),
                        surviving: l.clone(),
                    }],
                );
            }
            (DeltaKind::RemovedLocal | DeltaKind::RemovedBoth, ..) => {
                let origin = if delta.kind == DeltaKind::RemovedBoth {
                    Origin::Both
                } else {
                    Origin::Local
                };
                applied.extend(tag(origin, &delta.local_changes));
            }
            (DeltaKind::RemovedRemote, ..) => {
                applied.extend(tag(Origin::Remote, &delta.remote_changes));
            }
            (kind, ..) => warn!(key = %key, %kind, "delta does not match snapshots, skipping"),
        }
    }

    records.sort_by(|a, b| {
        order_rank(triple, a.key())
            .cmp(&order_rank(triple, b.key()))
            .then_with(|| a.key().cmp(b.key()))
    });

    let mut conflicts: Vec<ConflictUnit> = records
        .iter()
        .filter_map(|r| conflicts_by_key.remove(r.key()))
        .flatten()
        .collect();

    let mut blocks = HashMap::new();
    for section in [Section::Preamble, Section::Trailer] {
        let (merged, conflict) = merge_blocks(
            section,
            triple.base.blocks(section),
            triple.local.blocks(section),
            triple.remote.blocks(section),
        );
        blocks.insert(section, merged);
        conflicts.extend(conflict);
    }

    // One record per diffed key.
    let merged = Snapshot::from_distinct(records).with_blocks(
        blocks.remove(&Section::Preamble).unwrap_or_default(),
        blocks.remove(&Section::Trailer).unwrap_or_default(),
    );
    applied.sort_by(|a, b| {
        let pos = |k: &str| merged.position(k).unwrap_or(usize::MAX);
        pos(&a.change.key).cmp(&pos(&b.change.key))
    });
    summary.conflicts = conflicts.len();

    info!(
        records = merged.len(),
        conflicts = summary.conflicts,
        applied = applied.len(),
        "merge computed"
    );

    MergeResult {
        merged,
        conflicts,
        applied,
        summary,
        field_orders,
    }
}

/// Local's positions first, then remote-only records in remote order.
fn order_rank(triple: &RevisionTriple, key: &str) -> (u8, usize) {
    match triple.local.position(key) {
        Some(pos) => (0, pos),
        None => (1, triple.remote.position(key).unwrap_or(usize::MAX)),
    }
}

/// Whole-value three-way merge of a block list.
fn merge_blocks(
    section: Section,
    base: &[String],
    local: &[String],
    remote: &[String],
) -> (Vec<String>, Option<ConflictUnit>) {
    if local == remote || remote == base {
        (local.to_vec(), None)
    } else if local == base {
        (remote.to_vec(), None)
    } else {
        debug!(%section, "block list conflict");
        (
            base.to_vec(),
            Some(ConflictUnit::Section {
                section,
                base: base.to_vec(),
                local: local.to_vec(),
                remote: remote.to_vec(),
            }),
        )
    }
}
