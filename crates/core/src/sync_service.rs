//! Git-backed merge of the shared library file.
//!
//! The [`GitSyncService`] reads the library at the common ancestor and at
//! both tips, runs a [`MergeEngine`] over the three contents and writes the
//! serialized result back as a merge commit whose parents are the two tips.

use tracing::{debug, info, warn};

use crate::bib::{BibCodec, BibtexCodec};
use crate::config::AppConfig;
use crate::errors::{BackendError, ResolutionError, SyncError};
use crate::git::{GitClient, VcsBackend};
use crate::merge_engine::{MergeEngine, MergeState};
use crate::models::{MergeResult, ResolutionMap, RevisionTriple, Snapshot};

/// Marker embedded in commit messages written by the service.
pub const MERGE_MARKER: &str = "[bibsync]";

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A computed merge waiting to be committed.
pub struct PreparedMerge<C = BibtexCodec> {
    /// Revision names as given by the caller.
    pub local_rev: String,
    pub remote_rev: String,
    /// Resolved commit ids.
    pub local: String,
    pub remote: String,
    pub base: String,
    pub result: MergeResult,
    engine: MergeEngine<C>,
}

impl<C: BibCodec> PreparedMerge<C> {
    pub fn state(&self) -> MergeState {
        self.engine.state()
    }

    pub fn triple(&self) -> Option<&RevisionTriple> {
        self.engine.triple()
    }

    /// Apply resolutions without committing, e.g. for a dry run.
    pub fn apply(&mut self, resolutions: &ResolutionMap) -> Result<Snapshot, ResolutionError> {
        self.engine.apply_resolutions(&self.result, resolutions)
    }
}

/// Result of [`GitSyncService::merge`].
pub enum SyncOutcome<C = BibtexCodec> {
    /// Remote is already contained in local; nothing to do.
    UpToDate { commit: String },
    /// Conflict-free merge, committed.
    Merged { commit: String, result: MergeResult },
    /// Conflicts must be resolved and passed to
    /// [`GitSyncService::finalize`].
    NeedsResolution(Box<PreparedMerge<C>>),
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Merges two revisions of the library file and commits the result.
pub struct GitSyncService<B = GitClient, C = BibtexCodec> {
    backend: B,
    codec: C,
    library: String,
}

impl GitSyncService<GitClient, BibtexCodec> {
    /// Open the configured repository with the configured identity and
    /// output layout.
    pub fn from_config(config: &AppConfig) -> Result<Self, SyncError> {
        let client = GitClient::new(&config.repository.path)?
            .with_identity(&config.author.name, &config.author.email);
        Ok(Self::new(
            client,
            BibtexCodec::new(config.writer_options()),
            config.repository.library.clone(),
        ))
    }
}

impl<B: VcsBackend, C: BibCodec + Clone> GitSyncService<B, C> {
    pub fn new(backend: B, codec: C, library: impl Into<String>) -> Self {
        Self {
            backend,
            codec,
            library: library.into(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    /// Library content at `revision`. A revision without the file reads as
    /// an empty library.
    pub fn read_library(&self, revision: &str) -> Result<Vec<u8>, BackendError> {
        match self.backend.read_content(revision, &self.library) {
            Err(BackendError::PathNotFound { .. }) => {
                debug!(revision, library = %self.library, "library absent, reading as empty");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Serialize a snapshot with the service's codec.
    pub fn render(&self, snapshot: &Snapshot) -> Vec<u8> {
        self.codec.serialize(snapshot)
    }

    /// Compute the merge of `remote_rev` into `local_rev` without writing
    /// anything.
    pub fn prepare(&self, local_rev: &str, remote_rev: &str) -> Result<PreparedMerge<C>, SyncError> {
        let (local, remote, base) = self.revisions(local_rev, remote_rev)?;
        self.prepare_at(local_rev, remote_rev, local, remote, base)
    }

    /// Merge `remote_rev` into `local_rev`, committing when no conflicts
    /// remain.
    pub fn merge(&self, local_rev: &str, remote_rev: &str) -> Result<SyncOutcome<C>, SyncError> {
        let (local, remote, base) = self.revisions(local_rev, remote_rev)?;
        if base == remote {
            info!(local = %local, remote = %remote, "already up to date");
            return Ok(SyncOutcome::UpToDate { commit: local });
        }

        let mut prepared = self.prepare_at(local_rev, remote_rev, local, remote, base)?;
        if prepared.result.has_conflicts() {
            info!(
                conflicts = prepared.result.conflicts.len(),
                "merge needs resolution"
            );
            return Ok(SyncOutcome::NeedsResolution(Box::new(prepared)));
        }

        let commit = self.commit_resolved(&mut prepared, &ResolutionMap::new())?;
        Ok(SyncOutcome::Merged {
            commit,
            result: prepared.result,
        })
    }

    /// Apply resolutions to a prepared merge and commit it.
    pub fn finalize(
        &self,
        mut prepared: PreparedMerge<C>,
        resolutions: &ResolutionMap,
    ) -> Result<String, SyncError> {
        self.commit_resolved(&mut prepared, resolutions)
    }

    fn revisions(
        &self,
        local_rev: &str,
        remote_rev: &str,
    ) -> Result<(String, String, String), SyncError> {
        let local = self.backend.resolve_revision(local_rev)?;
        let remote = self.backend.resolve_revision(remote_rev)?;
        let base = self.backend.find_common_ancestor(&local, &remote)?;
        debug!(local = %local, remote = %remote, base = %base, "resolved revisions");
        Ok((local, remote, base))
    }

    fn prepare_at(
        &self,
        local_rev: &str,
        remote_rev: &str,
        local: String,
        remote: String,
        base: String,
    ) -> Result<PreparedMerge<C>, SyncError> {
        let mut engine = MergeEngine::new(self.codec.clone());

        let contents = self.read_library(&base).and_then(|b| {
            Ok((b, self.read_library(&local)?, self.read_library(&remote)?))
        });
        let (base_content, local_content, remote_content) = match contents {
            Ok(contents) => contents,
            Err(e) => {
                warn!(error = %e, "failed to read library revisions");
                engine.abort();
                return Err(e.into());
            }
        };

        let result = engine.submit_merge(&base_content, &local_content, &remote_content)?;
        Ok(PreparedMerge {
            local_rev: local_rev.to_string(),
            remote_rev: remote_rev.to_string(),
            local,
            remote,
            base,
            result,
            engine,
        })
    }

    fn commit_resolved(
        &self,
        prepared: &mut PreparedMerge<C>,
        resolutions: &ResolutionMap,
    ) -> Result<String, SyncError> {
        let conflicts = prepared.result.conflicts.len();
        let snapshot = prepared.apply(resolutions)?;
        let content = self.codec.serialize(&snapshot);

        let message = format!(
            "Merge {} into {}\n\n{} merged {}: {} entries, {} conflict(s) resolved",
            prepared.remote_rev,
            prepared.local_rev,
            MERGE_MARKER,
            self.library,
            snapshot.len(),
            conflicts,
        );
        let commit = self.backend.write_blob_and_commit(
            &self.library,
            &content,
            &[&prepared.local, &prepared.remote],
            &message,
        )?;
        info!(commit = %commit, conflicts, "merge committed");
        Ok(commit)
    }
}
