//! Shared fixture-repository builder for the integration tests.
//!
//! Builds commits directly against the object database (blobs, tree
//! builders, commits) rather than shelling out to `git` or touching a
//! working tree — faster, and avoids depending on the host's `git` binary.

use git2::{Oid, Repository, RepositoryInitOptions, Signature, Time};
use tempfile::TempDir;

pub const AUTHOR_NAME: &str = "Author Name";
pub const AUTHOR_EMAIL: &str = "test@author.email";

pub const TS_2000: i64 = 946_684_800;
pub const TS_2001: i64 = 978_307_200;
pub const TS_2002: i64 = 1_009_843_200;
pub const TS_2003: i64 = 1_041_379_200;
pub const TS_2004: i64 = 1_072_915_200;

pub struct Fixture {
    pub dir: TempDir,
    pub blob_content: Oid,
    pub blob_new_content: Oid,
    pub blob_new_content_branch: Oid,
    pub blob_new_content_non_merged: Oid,
}

fn write_tree(repo: &Repository, files: &[(&str, &[u8])]) -> Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    for (name, content) in files {
        let oid = repo.blob(content).unwrap();
        builder.insert(*name, oid, 0o100_644).unwrap();
    }
    builder.write().unwrap()
}

fn sig(ts: i64) -> Signature<'static> {
    Signature::new(AUTHOR_NAME, AUTHOR_EMAIL, &Time::new(ts, 0)).unwrap()
}

/// Reproduces the six-commit, three-branch history used by the original
/// scanner's test suite: a root commit, a linear edit on `master`, a
/// divergent edit on `new_branch`, a merge back into `master` whose tree
/// exactly matches `new_branch`'s (so it introduces nothing new), and a
/// trailing edit on `non_merged_branch` that is never merged anywhere.
pub fn build() -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut init_opts = RepositoryInitOptions::new();
    init_opts.bare(true).initial_head("master");
    let repo = Repository::init_opts(dir.path(), &init_opts).unwrap();

    let blob_content = repo.blob(b"content").unwrap();
    let blob_new_content = repo.blob(b"new content").unwrap();
    let blob_new_content_branch = repo.blob(b"new content from new branch").unwrap();
    let blob_new_content_non_merged = repo.blob(b"new content from non_merged_branch").unwrap();

    let tree1 = write_tree(
        &repo,
        &[
            ("file.txt", b"content"),
            ("file.py", b"content"),
            ("prod_env.key", b""),
            ("prod_env_with_content.key", b"some_key"),
            ("file.other", b"nothing special"),
            ("test_file.cpp", b"content"),
        ],
    );
    let commit1 = repo
        .commit(
            Some("refs/heads/master"),
            &sig(TS_2000),
            &sig(TS_2000),
            "initial commit",
            &repo.find_tree(tree1).unwrap(),
            &[],
        )
        .unwrap();
    let commit1 = repo.find_commit(commit1).unwrap();

    let tree2 = write_tree(
        &repo,
        &[
            ("file.txt", b"new content"),
            ("file.py", b"content"),
            ("prod_env.key", b""),
            ("prod_env_with_content.key", b"some_key"),
            ("file.other", b"nothing special"),
            ("test_file.cpp", b"content"),
        ],
    );
    let commit2 = repo
        .commit(
            Some("refs/heads/master"),
            &sig(TS_2001),
            &sig(TS_2001),
            "edited file",
            &repo.find_tree(tree2).unwrap(),
            &[&commit1],
        )
        .unwrap();
    let commit2 = repo.find_commit(commit2).unwrap();

    repo.branch("new_branch", &commit2, false).unwrap();

    let tree3 = write_tree(
        &repo,
        &[
            ("file.txt", b"new content from new branch"),
            ("file.py", b"content"),
            ("prod_env.key", b""),
            ("prod_env_with_content.key", b"some_key"),
            ("file.other", b"nothing special"),
            ("test_file.cpp", b"content"),
        ],
    );
    let commit3 = repo
        .commit(
            Some("refs/heads/new_branch"),
            &sig(TS_2002),
            &sig(TS_2002),
            "edited file in new branch",
            &repo.find_tree(tree3).unwrap(),
            &[&commit2],
        )
        .unwrap();
    let commit3 = repo.find_commit(commit3).unwrap();

    // Merge commit whose tree equals new_branch's: it introduces nothing
    // relative to its first parent, so only the history walk (not the
    // content scan) should surface new_branch's own commit through master.
    let merge_commit = repo
        .commit(
            Some("refs/heads/master"),
            &sig(TS_2003),
            &sig(TS_2003),
            "merge from new branch",
            &repo.find_tree(tree3).unwrap(),
            &[&commit3, &commit2],
        )
        .unwrap();
    let merge_commit = repo.find_commit(merge_commit).unwrap();

    repo.branch("non_merged_branch", &merge_commit, false).unwrap();

    let tree4 = write_tree(
        &repo,
        &[
            ("file.txt", b"new content from non_merged_branch"),
            ("file.py", b"content"),
            ("prod_env.key", b""),
            ("prod_env_with_content.key", b"some_key"),
            ("file.other", b"nothing special"),
            ("test_file.cpp", b"content"),
        ],
    );
    repo.commit(
        Some("refs/heads/non_merged_branch"),
        &sig(TS_2004),
        &sig(TS_2004),
        "edited file in non_merged_branch",
        &repo.find_tree(tree4).unwrap(),
        &[&merge_commit],
    )
    .unwrap();

    repo.set_head("refs/heads/master").unwrap();

    drop(repo);
    Fixture {
        dir,
        blob_content,
        blob_new_content,
        blob_new_content_branch,
        blob_new_content_non_merged,
    }
}
