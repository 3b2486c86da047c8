//! Error types for the bibsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! Pending merge conflicts are *not* errors: they are reported as data on
//! [`MergeResult`](crate::models::MergeResult).

use thiserror::Error;

use crate::models::{ConflictTarget, Side};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors raised while segmenting revision content into records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The content is not valid UTF-8.
    #[error("content is not valid UTF-8 (first invalid byte at offset {offset})")]
    InvalidEncoding { offset: usize },

    /// The codec could not find record boundaries.
    #[error("syntax error at line {line}, column {column}: {detail}")]
    Syntax {
        line: usize,
        column: usize,
        detail: String,
    },

    /// Two records in the same snapshot share a key.
    #[error("duplicate entry key '{key}' (lines {first_line} and {second_line})")]
    DuplicateKey {
        key: String,
        first_line: usize,
        second_line: usize,
    },
}

// ---------------------------------------------------------------------------
// Backend errors
// ---------------------------------------------------------------------------

/// Errors from the version-control backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2(#[from] git2::Error),

    /// A revision (branch, tag, SHA) could not be resolved.
    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    /// The two revisions share no history.
    #[error("no common ancestor between '{0}' and '{1}'")]
    NoCommonAncestor(String, String),

    /// The requested path does not exist at the revision.
    #[error("'{path}' does not exist at revision {revision}")]
    PathNotFound { revision: String, path: String },

    /// The path exists but is not a regular file.
    #[error("'{path}' at revision {revision} is not a file")]
    NotAFile { revision: String, path: String },

    /// Merging the parents' trees left conflicts outside the library file.
    #[error("conflicting changes outside the library: {}", paths.join(", "))]
    TreeConflict { paths: Vec<String> },

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Errors that abort a merge attempt.
#[derive(Debug, Error)]
pub enum MergeError {
    /// One of the three revisions could not be extracted.
    #[error("failed to parse {side} revision: {source}")]
    Parse {
        side: Side,
        #[source]
        source: ParseError,
    },

    /// Reading revision content failed.
    #[error("merge backend error: {0}")]
    Backend(#[from] BackendError),

    /// The merge engine was driven out of order.
    #[error("invalid merge state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

// ---------------------------------------------------------------------------
// Resolution errors
// ---------------------------------------------------------------------------

/// Errors from applying conflict resolutions.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Some conflicts have no entry in the resolution map.
    #[error("{} conflict(s) left unresolved: {}", missing.len(), format_targets(missing))]
    Incomplete { missing: Vec<ConflictTarget> },

    /// Resolutions were applied in a state that does not accept them.
    #[error("invalid merge state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// A resolution file could not be decoded.
    #[error("invalid resolution map: {0}")]
    InvalidMap(String),
}

fn format_targets(targets: &[ConflictTarget]) -> String {
    targets
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Sync service errors
// ---------------------------------------------------------------------------

/// Errors from the git-backed sync service.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("sync merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("sync resolution error: {0}")]
    Resolution(#[from] ResolutionError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ParseError::DuplicateKey {
            key: "smith2020".into(),
            first_line: 1,
            second_line: 9,
        };
        assert_eq!(
            err.to_string(),
            "duplicate entry key 'smith2020' (lines 1 and 9)"
        );

        let err = BackendError::NoCommonAncestor("main".into(), "topic".into());
        assert!(err.to_string().contains("no common ancestor"));

        let err = MergeError::Parse {
            side: Side::Remote,
            source: ParseError::Syntax {
                line: 3,
                column: 7,
                detail: "expected '='".into(),
            },
        };
        assert!(err.to_string().starts_with("failed to parse remote revision"));
    }

    #[test]
    fn test_incomplete_lists_targets() {
        let err = ResolutionError::Incomplete {
            missing: vec![
                ConflictTarget::Field {
                    key: "a".into(),
                    field: "author".into(),
                },
                ConflictTarget::Record { key: "b".into() },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 conflict(s) left unresolved"));
        assert!(msg.contains("a.author"));
        assert!(msg.contains("b"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = ParseError::InvalidEncoding { offset: 4 }.into();
        assert!(matches!(core_err, CoreError::Parse(_)));

        let core_err: CoreError = BackendError::RevisionNotFound("HEAD~9".into()).into();
        assert!(matches!(core_err, CoreError::Backend(_)));
    }
}
