//! bibsync core library.
//!
//! This crate provides the components for merging a shared BibTeX library
//! kept in git: the bibliography codec, the key-based three-way merge engine,
//! conflict resolution, the git backend and the sync service that ties them
//! together.

pub mod bib;
pub mod config;
pub mod errors;
pub mod git;
pub mod merge;
pub mod merge_engine;
pub mod models;
pub mod sync_service;

// Re-exports for convenience.
pub use bib::{BibCodec, BibtexCodec, RecordExtractor};
pub use config::AppConfig;
pub use merge_engine::{merge_triple, MergeEngine, MergeState};
pub use models::{ConflictUnit, MergeResult, Record, ResolutionMap, Snapshot};
pub use sync_service::{GitSyncService, PreparedMerge, SyncOutcome};
