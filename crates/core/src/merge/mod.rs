//! Semantic three-way merge of keyed records.
//!
//! The pipeline runs in three stages:
//!
//! 1. [`ThreeWaySetDiff`] classifies each key across base, local and remote.
//! 2. [`FieldMerger`] merges records both sides kept, field by field.
//! 3. [`ResolutionApplier`] fills the conflicts left over once the caller
//!    has chosen values.
//!
//! [`MergeEngine`](crate::merge_engine::MergeEngine) drives the stages.

pub mod diff;
pub mod fields;
pub mod resolver;

pub use diff::{field_changes, ThreeWaySetDiff};
pub use fields::{FieldMergeOutcome, FieldMerger};
pub use resolver::{ResolutionApplier, Strategy};
