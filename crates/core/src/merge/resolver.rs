//! Applying caller resolutions to a merge result.

use tracing::{info, warn};

use crate::errors::ResolutionError;
use crate::models::{ConflictUnit, MergeResult, ResolutionMap, Side, Snapshot};

/// Blanket strategies for answering every conflict at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    AcceptLocal,
    AcceptRemote,
}

impl Strategy {
    fn side(self) -> Side {
        match self {
            Self::AcceptLocal => Side::Local,
            Self::AcceptRemote => Side::Remote,
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "ours" => Ok(Self::AcceptLocal),
            "remote" | "theirs" => Ok(Self::AcceptRemote),
            other => Err(format!("unknown strategy '{}' (expected local or remote)", other)),
        }
    }
}

/// Fills conflict placeholders with resolved values.
pub struct ResolutionApplier;

impl ResolutionApplier {
    /// Produce the final snapshot. Every conflict must be covered; otherwise
    /// nothing is applied and the unanswered targets are reported.
    pub fn apply(
        result: &MergeResult,
        resolutions: &ResolutionMap,
    ) -> Result<Snapshot, ResolutionError> {
        let mut snapshot = result.merged.clone();
        let mut missing = Vec::new();

        for conflict in &result.conflicts {
            match conflict {
                ConflictUnit::Field { key, field, .. } => {
                    let Some(value) = resolutions.field(key, field) else {
                        missing.push(conflict.target());
                        continue;
                    };
                    match snapshot.get(key).cloned() {
                        Some(mut record) => {
                            let order = result.field_orders.get(key).map_or(&[][..], Vec::as_slice);
                            record.apply_value(field, value, order);
                            snapshot.replace(record);
                        }
                        None => warn!(key = %key, field = %field, "conflicted record missing from merge"),
                    }
                }
                ConflictUnit::ModifyDelete { key, surviving, .. } => match resolutions.record(key) {
                    Some(true) => {
                        snapshot.replace(surviving.clone());
                    }
                    Some(false) => {
                        snapshot.remove(key);
                    }
                    None => missing.push(conflict.target()),
                },
                ConflictUnit::Section { section, .. } => match resolutions.section(*section) {
                    Some(blocks) => snapshot.set_blocks(*section, blocks.to_vec()),
                    None => missing.push(conflict.target()),
                },
            }
        }

        if !missing.is_empty() {
            missing.sort();
            return Err(ResolutionError::Incomplete { missing });
        }

        info!(
            conflicts = result.conflicts.len(),
            records = snapshot.len(),
            "resolutions applied"
        );
        Ok(snapshot)
    }

    /// Resolution map answering every conflict with one side's value. A
    /// modify/delete conflict is kept unless the chosen side deleted it.
    pub fn resolve_all(result: &MergeResult, strategy: Strategy) -> ResolutionMap {
        let side = strategy.side();
        let mut map = ResolutionMap::new();
        for conflict in &result.conflicts {
            match conflict {
                ConflictUnit::Field {
                    key,
                    field,
                    local,
                    remote,
                    ..
                } => {
                    let value = if side == Side::Local { local } else { remote };
                    map.resolve_field(key.clone(), field, value.clone());
                }
                ConflictUnit::ModifyDelete {
                    key, deleted_by, ..
                } => {
                    if *deleted_by == side {
                        map.delete_record(key.clone());
                    } else {
                        map.keep_record(key.clone());
                    }
                }
                ConflictUnit::Section {
                    section,
                    local,
                    remote,
                    ..
                } => {
                    let blocks = if side == Side::Local { local } else { remote };
                    map.resolve_section(*section, blocks.clone());
                }
            }
        }
        map
    }
}
