//! Version-control backend and its `git2` implementation.

use std::path::{Path, PathBuf};

use git2::{
    build::CheckoutBuilder, Commit, ErrorCode, IndexAddOption, ObjectType, Oid, Repository,
    Signature, Tree,
};
use tracing::{debug, info, instrument, warn};

use crate::errors::BackendError;

const DEFAULT_AUTHOR_NAME: &str = "bibsync";
const DEFAULT_AUTHOR_EMAIL: &str = "bibsync@localhost";

const FILE_MODE: i32 = 0o100644;
const TREE_MODE: i32 = 0o040000;

/// What the sync service needs from version control.
///
/// Revisions are anything the backend can resolve (branch, tag, commit id);
/// returned ids are full commit ids.
pub trait VcsBackend {
    /// Resolve a revision to a commit id.
    fn resolve_revision(&self, revision: &str) -> Result<String, BackendError>;

    /// File content at a revision.
    fn read_content(&self, revision: &str, path: &str) -> Result<Vec<u8>, BackendError>;

    /// Nearest common ancestor of two revisions.
    fn find_common_ancestor(&self, a: &str, b: &str) -> Result<String, BackendError>;

    /// Commit `content` at `path` on top of the parents' trees. With two
    /// parents, every other path is merged from both; a conflict outside
    /// `path` is an error.
    fn write_blob_and_commit(
        &self,
        path: &str,
        content: &[u8],
        parents: &[&str],
        message: &str,
    ) -> Result<String, BackendError>;
}

/// High-level Git client wrapping a `git2::Repository`.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
    identity: Option<(String, String)>,
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Result<Self, BackendError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| BackendError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
            identity: None,
        })
    }

    /// Create a fresh repository at `repo_path`.
    pub fn init<P: AsRef<Path>>(repo_path: P) -> Result<Self, BackendError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "initializing git repository");
        let repo = Repository::init(path)?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
            identity: None,
        })
    }

    /// Author and committer used for commits written by this client.
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Stage all changes in the working tree and commit them on HEAD.
    #[instrument(skip(self, message))]
    pub fn commit_all(&self, message: &str) -> Result<Oid, BackendError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let signature = self.signature()?;
        let parent_commit = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&Commit> = parent_commit.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!(sha = %oid, "created commit");
        Ok(oid)
    }

    /// Return the SHA of HEAD.
    pub fn get_head_sha(&self) -> Result<String, BackendError> {
        let head = self.repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Short name of the checked-out branch, if HEAD is on one.
    pub fn current_branch(&self) -> Result<Option<String>, BackendError> {
        let head = self.repo.head()?;
        Ok(if head.is_branch() {
            head.shorthand().map(str::to_string)
        } else {
            None
        })
    }

    /// Create a new branch pointing at `from_sha`.
    #[instrument(skip(self))]
    pub fn create_branch(&self, name: &str, from_sha: &str) -> Result<(), BackendError> {
        let oid = Oid::from_str(from_sha)?;
        let commit = self.repo.find_commit(oid)?;
        self.repo.branch(name, &commit, false)?;
        info!(name, from_sha, "created branch");
        Ok(())
    }

    /// Point HEAD at a local branch and force the working tree to match.
    #[instrument(skip(self))]
    pub fn checkout_branch(&self, name: &str) -> Result<(), BackendError> {
        self.repo.set_head(&format!("refs/heads/{}", name))?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;
        debug!(name, "checked out branch");
        Ok(())
    }

    fn signature(&self) -> Result<Signature<'static>, BackendError> {
        let signature = match &self.identity {
            Some((name, email)) => Signature::now(name, email)?,
            None => self
                .repo
                .signature()
                .or_else(|_| Signature::now(DEFAULT_AUTHOR_NAME, DEFAULT_AUTHOR_EMAIL))?,
        };
        Ok(signature)
    }

    fn find_commit(&self, revision: &str) -> Result<Commit<'_>, BackendError> {
        self.repo
            .revparse_single(revision)
            .and_then(|object| object.peel_to_commit())
            .map_err(|_| BackendError::RevisionNotFound(revision.to_string()))
    }

    /// Tree the new commit starts from: the first parent's tree, or for a
    /// merge the tree-level merge of the first two parents. Conflicts at
    /// `path` are dropped since the caller writes that path; conflicts
    /// anywhere else fail the commit.
    fn merged_tree<'r>(
        &'r self,
        parents: &[Commit<'r>],
        path: &str,
    ) -> Result<Option<Tree<'r>>, BackendError> {
        let (ours, theirs) = match parents {
            [] => return Ok(None),
            [only] => return Ok(Some(only.tree()?)),
            [ours, theirs, ..] => (ours, theirs),
        };

        let mut index = self.repo.merge_commits(ours, theirs, None)?;
        if index.has_conflicts() {
            // Missing conflict entries for `path` are not an error.
            let _ = index.conflict_remove(Path::new(path));
        }
        if index.has_conflicts() {
            let mut paths = Vec::new();
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
                if let Some(entry) = entry {
                    paths.push(String::from_utf8_lossy(&entry.path).into_owned());
                }
            }
            paths.sort();
            paths.dedup();
            warn!(?paths, "tree merge left conflicts outside the library");
            return Err(BackendError::TreeConflict { paths });
        }

        let tree_oid = index.write_tree_to(&self.repo)?;
        debug!(tree = %tree_oid, "merged parent trees");
        Ok(Some(self.repo.find_tree(tree_oid)?))
    }

    /// Write `blob` at `components` below `tree`, returning the new tree id.
    fn insert_blob(
        &self,
        tree: Option<&Tree<'_>>,
        components: &[&str],
        blob: Oid,
    ) -> Result<Oid, BackendError> {
        let mut builder = self.repo.treebuilder(tree)?;
        match components {
            [name] => {
                builder.insert(*name, blob, FILE_MODE)?;
            }
            [dir, rest @ ..] => {
                let subtree = match tree.and_then(|t| t.get_name(dir)) {
                    Some(entry) if entry.kind() == Some(ObjectType::Tree) => {
                        Some(self.repo.find_tree(entry.id())?)
                    }
                    _ => None,
                };
                let sub_oid = self.insert_blob(subtree.as_ref(), rest, blob)?;
                builder.insert(*dir, sub_oid, TREE_MODE)?;
            }
            [] => {
                return Err(BackendError::NotAFile {
                    revision: "new commit".to_string(),
                    path: String::new(),
                })
            }
        }
        Ok(builder.write()?)
    }
}

impl VcsBackend for GitClient {
    fn resolve_revision(&self, revision: &str) -> Result<String, BackendError> {
        Ok(self.find_commit(revision)?.id().to_string())
    }

    #[instrument(skip(self))]
    fn read_content(&self, revision: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        let commit = self.find_commit(revision)?;
        let tree = commit.tree()?;
        let entry = tree.get_path(Path::new(path)).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                BackendError::PathNotFound {
                    revision: revision.to_string(),
                    path: path.to_string(),
                }
            } else {
                e.into()
            }
        })?;
        let blob = entry
            .to_object(&self.repo)?
            .into_blob()
            .map_err(|_| BackendError::NotAFile {
                revision: revision.to_string(),
                path: path.to_string(),
            })?;
        debug!(bytes = blob.content().len(), "read content");
        Ok(blob.content().to_vec())
    }

    #[instrument(skip(self))]
    fn find_common_ancestor(&self, a: &str, b: &str) -> Result<String, BackendError> {
        let a_oid = self.find_commit(a)?.id();
        let b_oid = self.find_commit(b)?.id();
        let base = self.repo.merge_base(a_oid, b_oid).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                BackendError::NoCommonAncestor(a.to_string(), b.to_string())
            } else {
                e.into()
            }
        })?;
        debug!(base = %base, "found merge base");
        Ok(base.to_string())
    }

    /// Moves HEAD and updates the working tree only when HEAD is the first
    /// parent; otherwise the commit is written without touching any ref.
    #[instrument(skip(self, content, message))]
    fn write_blob_and_commit(
        &self,
        path: &str,
        content: &[u8],
        parents: &[&str],
        message: &str,
    ) -> Result<String, BackendError> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let blob = self.repo.blob(content)?;

        let parent_commits = parents
            .iter()
            .map(|p| self.find_commit(p))
            .collect::<Result<Vec<_>, _>>()?;
        let base_tree = self.merged_tree(&parent_commits, path)?;
        let tree_oid = self.insert_blob(base_tree.as_ref(), &components, blob)?;
        let tree = self.repo.find_tree(tree_oid)?;

        let signature = self.signature()?;
        let parent_refs: Vec<&Commit> = parent_commits.iter().collect();
        let oid = self
            .repo
            .commit(None, &signature, &signature, message, &tree, &parent_refs)?;

        let head = self.repo.head().ok().and_then(|h| h.target());
        let moves_head = head.is_some() && head == parent_commits.first().map(|c| c.id());
        if moves_head {
            // Update the working tree against the old HEAD before moving it.
            if !self.repo.is_bare() {
                let commit = self.repo.find_commit(oid)?;
                self.repo
                    .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
            }
            let mut head_ref = self.repo.head()?;
            head_ref.set_target(oid, message)?;
        }
        info!(sha = %oid, parents = parents.len(), moved_head = moves_head, "created commit");
        Ok(oid.to_string())
    }
}
