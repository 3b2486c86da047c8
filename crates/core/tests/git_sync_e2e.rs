//! End-to-end tests for merging a shared library kept in git.
//!
//! Each test builds a real repository in a temp directory with a forked
//! history, then drives the `GitSyncService` against it.

use std::path::Path;

use git2::Oid;
use tempfile::TempDir;

use bibsync_core::bib::BibtexCodec;
use bibsync_core::git::{GitClient, VcsBackend};
use bibsync_core::merge::{ResolutionApplier, Strategy};
use bibsync_core::models::{ConflictUnit, ResolutionMap};
use bibsync_core::sync_service::{GitSyncService, SyncOutcome, MERGE_MARKER};
use bibsync_core::MergeState;

// ===========================================================================
// Fixtures
// ===========================================================================

const LIBRARY: &str = "library.bib";

const INITIAL: &str = "\
@article{a,
  author = {don't know the author}
  doi = {xya},
}

@article{b,
  author = {author-b}
  doi = {xyz},
}
";

const ALICE: &str = "\
@article{a,
  author = {author-a}
  doi = {xya},
}

@article{b,
  author = {author-b}
  doi = {xyz},
}
";

const BOB: &str = "\
@article{b,
  author = {author-b}
  doi = {xyz},
}

@article{a,
  author = {lala}
  doi = {xya},
}
";

struct Fork {
    dir: TempDir,
    base: String,
    local: String,
    remote: String,
}

/// Base commit on the default branch, `local_content` committed on top of
/// it, `remote_content` committed on `bob-branch`. HEAD is left on the
/// default branch.
fn fork(local_content: &str, remote_content: &str) -> Fork {
    fork_with(local_content, remote_content, &[])
}

/// Like [`fork`], with extra files committed alongside Bob's library.
fn fork_with(local_content: &str, remote_content: &str, remote_files: &[(&str, &str)]) -> Fork {
    let dir = tempfile::tempdir().unwrap();
    let alice = GitClient::init(dir.path())
        .unwrap()
        .with_identity("Alice", "alice@example.org");

    write(dir.path(), INITIAL);
    let base = alice.commit_all("Initial commit").unwrap().to_string();
    let main = alice.current_branch().unwrap().expect("HEAD on a branch");
    alice.create_branch("bob-branch", &base).unwrap();

    write(dir.path(), local_content);
    let local = alice.commit_all("Fix author of a").unwrap().to_string();

    let bob = GitClient::new(dir.path())
        .unwrap()
        .with_identity("Bob", "bob@example.org");
    bob.checkout_branch("bob-branch").unwrap();
    write(dir.path(), remote_content);
    for (name, content) in remote_files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    let remote = bob.commit_all("Exchange a with b").unwrap().to_string();

    alice.checkout_branch(&main).unwrap();
    Fork {
        dir,
        base,
        local,
        remote,
    }
}

fn write(root: &Path, content: &str) {
    std::fs::write(root.join(LIBRARY), content).unwrap();
}

fn service(fork: &Fork) -> GitSyncService {
    let client = GitClient::new(fork.dir.path())
        .unwrap()
        .with_identity("bibsync", "bibsync@example.org");
    GitSyncService::new(client, BibtexCodec::default(), LIBRARY)
}

fn parents_of(service: &GitSyncService, sha: &str) -> Vec<String> {
    let repo = service.backend().repo();
    let commit = repo.find_commit(Oid::from_str(sha).unwrap()).unwrap();
    commit.parent_ids().map(|id| id.to_string()).collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn alice_bob_conflict_is_reported_per_field() {
    let fork = fork(ALICE, BOB);
    let service = service(&fork);

    let SyncOutcome::NeedsResolution(prepared) = service.merge("HEAD", "bob-branch").unwrap()
    else {
        panic!("expected the author conflict");
    };

    assert_eq!(prepared.base, fork.base);
    assert_eq!(prepared.local, fork.local);
    assert_eq!(prepared.remote, fork.remote);
    assert_eq!(prepared.state(), MergeState::NeedsResolution);
    assert_eq!(
        prepared.result.conflicts,
        vec![ConflictUnit::Field {
            key: "a".into(),
            field: "author".into(),
            base: Some("don't know the author".into()),
            local: Some("author-a".into()),
            remote: Some("lala".into()),
        }]
    );

    let merged = &prepared.result.merged;
    assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    let b = merged.get("b").unwrap();
    assert_eq!(b.field("author"), Some("author-b"));
    assert_eq!(b.field("doi"), Some("xyz"));
}

#[test]
fn resolved_merge_writes_two_parent_commit() {
    let fork = fork(ALICE, BOB);
    let service = service(&fork);

    let prepared = service.prepare("HEAD", "bob-branch").unwrap();
    let mut map = ResolutionMap::new();
    map.resolve_field("a", "author", Some("author-a".into()));
    let sha = service.finalize(prepared, &map).unwrap();

    assert_eq!(parents_of(&service, &sha), vec![fork.local.clone(), fork.remote.clone()]);
    assert_eq!(service.backend().get_head_sha().unwrap(), sha);

    let expected = "\
@article{a,
  author = {author-a},
  doi = {xya},
}

@article{b,
  author = {author-b}
  doi = {xyz},
}
";
    let committed = service.backend().read_content(&sha, LIBRARY).unwrap();
    assert_eq!(String::from_utf8(committed).unwrap(), expected);
    assert_eq!(
        std::fs::read_to_string(fork.dir.path().join(LIBRARY)).unwrap(),
        expected
    );

    let repo = service.backend().repo();
    let commit = repo.find_commit(Oid::from_str(&sha).unwrap()).unwrap();
    assert!(commit.message().unwrap_or("").contains(MERGE_MARKER));
}

#[test]
fn accept_remote_takes_bobs_author() {
    let fork = fork(ALICE, BOB);
    let service = service(&fork);

    let prepared = service.prepare("HEAD", "bob-branch").unwrap();
    let map = ResolutionApplier::resolve_all(&prepared.result, Strategy::AcceptRemote);
    let sha = service.finalize(prepared, &map).unwrap();

    let content = String::from_utf8(service.backend().read_content(&sha, LIBRARY).unwrap()).unwrap();
    assert!(content.contains("author = {lala}"));
    assert!(content.find("@article{a").unwrap() < content.find("@article{b").unwrap());
}

#[test]
fn disjoint_edits_merge_without_resolution() {
    let bob_edits_b = INITIAL.replace("doi = {xyz}", "doi = {xyz-2}");
    let fork = fork(ALICE, &bob_edits_b);
    let service = service(&fork);

    let SyncOutcome::Merged { commit, result } = service.merge("HEAD", "bob-branch").unwrap()
    else {
        panic!("expected a clean merge");
    };
    assert!(!result.has_conflicts());
    assert_eq!(parents_of(&service, &commit), vec![fork.local, fork.remote]);

    let content = String::from_utf8(service.backend().read_content(&commit, LIBRARY).unwrap()).unwrap();
    assert!(content.contains("author = {author-a}"));
    assert!(content.contains("doi = {xyz-2}"));
}

#[test]
fn merging_an_ancestor_is_up_to_date() {
    let fork = fork(ALICE, BOB);
    let service = service(&fork);

    let outcome = service.merge("HEAD", &fork.base).unwrap();
    assert!(matches!(outcome, SyncOutcome::UpToDate { ref commit } if *commit == fork.local));
}

#[test]
fn merge_commit_keeps_remote_changes_to_other_files() {
    let bob_edits_b = INITIAL.replace("doi = {xyz}", "doi = {xyz-2}");
    let fork = fork_with(ALICE, &bob_edits_b, &[("notes.txt", "reading list\n")]);
    let service = service(&fork);

    let SyncOutcome::Merged { commit, .. } = service.merge("HEAD", "bob-branch").unwrap() else {
        panic!("expected a clean merge");
    };
    assert_eq!(
        service.backend().read_content(&commit, "notes.txt").unwrap(),
        b"reading list\n"
    );
    assert_eq!(
        std::fs::read_to_string(fork.dir.path().join("notes.txt")).unwrap(),
        "reading list\n"
    );
}

#[test]
fn resolved_merge_keeps_remote_files_when_library_conflicts_in_git() {
    let fork = fork_with(ALICE, BOB, &[("notes.txt", "reading list\n")]);
    let service = service(&fork);

    let prepared = service.prepare("HEAD", "bob-branch").unwrap();
    let map = ResolutionApplier::resolve_all(&prepared.result, Strategy::AcceptLocal);
    let sha = service.finalize(prepared, &map).unwrap();

    assert_eq!(parents_of(&service, &sha), vec![fork.local, fork.remote]);
    assert_eq!(
        service.backend().read_content(&sha, "notes.txt").unwrap(),
        b"reading list\n"
    );
    let content = String::from_utf8(service.backend().read_content(&sha, LIBRARY).unwrap()).unwrap();
    assert!(content.contains("author = {author-a}"));
}
