//! History traversal and parallel dispatch: the `RepositoryScanner`.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use crossbeam_channel::bounded;
use git2::{BranchType, Commit, Oid, Repository, Tree};
use serde::Serialize;

use crate::error::{RuleError, ScanError};
use crate::glob;
use crate::rules::RulesEngine;
use crate::worker::{worker_loop, CommitMeta, Job};

/// One content- or file-path-rule hit, carrying the Git provenance the bare
/// [`crate::rules::Match`] doesn't have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub rule_name: String,
    pub match_text: String,
    pub file_path: String,
    pub file_oid: String,
    pub commit_id: String,
    pub commit_message: String,
    pub author_name: String,
    pub author_email: String,
    pub commit_time: String,
}

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Orchestrates a parallel walk of repository history against a shared
/// [`RulesEngine`]. Holds no state between calls to `scan`: everything that
/// changes per scan (visited sets, the job queue, the result sink) is
/// created fresh inside `scan` and dropped when it returns.
pub struct RepositoryScanner {
    engine: RulesEngine,
    threads: Option<usize>,
    queue_capacity: usize,
}

impl Default for RepositoryScanner {
    fn default() -> Self {
        Self {
            engine: RulesEngine::new(),
            threads: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl RepositoryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_rules() -> Result<Self, RuleError> {
        Ok(Self {
            engine: RulesEngine::with_default_rules()?,
            ..Self::default()
        })
    }

    /// Overrides the worker-pool size (default: host CPU count). Mainly
    /// useful for tests, where a small fixed count makes traversal order
    /// more reproducible to reason about (though result order is still
    /// unspecified per the contract).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads.max(1));
        self
    }

    pub fn add_content_rule(
        &mut self,
        name: impl Into<String>,
        pattern: &str,
        whitelist: impl IntoIterator<Item = impl AsRef<str>>,
        blacklist: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<(), RuleError> {
        self.engine.add_content_rule(name, pattern, whitelist, blacklist)
    }

    pub fn add_file_path_rule(&mut self, name: impl Into<String>, pattern: &str) -> Result<(), RuleError> {
        self.engine.add_file_path_rule(name, pattern)
    }

    pub fn add_file_extension_to_skip(&mut self, ext: impl Into<String>) -> Result<(), RuleError> {
        self.engine.add_file_extension_to_skip(ext)
    }

    pub fn add_file_path_to_skip(&mut self, substr: impl Into<String>) -> Result<(), RuleError> {
        self.engine.add_file_path_to_skip(substr)
    }

    pub fn rules_engine(&self) -> &RulesEngine {
        &self.engine
    }

    /// Reads a single blob's raw bytes by oid. Strict: any lookup failure
    /// (empty oid, malformed oid, unknown oid) raises `ScanError::BlobNotFound`.
    pub fn get_file_content(
        &self,
        repository_path: impl AsRef<Path>,
        file_oid: &str,
    ) -> Result<Vec<u8>, ScanError> {
        let path = repository_path.as_ref();
        let repo = Repository::open(path).map_err(|source| ScanError::RepositoryOpen {
            path: path.display().to_string(),
            source,
        })?;
        let oid = Oid::from_str(file_oid).map_err(|source| ScanError::BlobNotFound {
            oid: file_oid.to_string(),
            source,
        })?;
        let blob = repo.find_blob(oid).map_err(|source| ScanError::BlobNotFound {
            oid: file_oid.to_string(),
            source,
        })?;
        Ok(blob.content().to_vec())
    }

    /// Walks every commit reachable from branches matching `branch_glob_pattern`,
    /// dispatches the files each commit introduces to a worker pool, and
    /// returns every match found. `from_timestamp` of `0` disables the
    /// author-time filter; otherwise commits authored strictly before it are
    /// excluded from the result (their ancestors are still walked).
    pub fn scan(
        &self,
        repository_path: impl AsRef<Path>,
        branch_glob_pattern: &str,
        from_timestamp: i64,
    ) -> Result<Vec<ScanResult>, ScanError> {
        let path = repository_path.as_ref().to_path_buf();
        let repo = Repository::open(&path).map_err(|source| ScanError::RepositoryOpen {
            path: path.display().to_string(),
            source,
        })?;

        let heads = resolve_branch_heads(&repo, branch_glob_pattern);
        drop(repo);
        let threads = self
            .threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("failed to build worker thread pool");

        let (job_tx, job_rx) = bounded::<Job>(self.queue_capacity);
        let visited_blobs: Mutex<HashSet<(Oid, Oid)>> = Mutex::new(HashSet::new());
        let sink: Mutex<Vec<ScanResult>> = Mutex::new(Vec::new());
        let engine = &self.engine;

        // The producer runs on its own OS thread rather than inside the
        // pool's scope: with `threads == 1` (or any undersized pool), a
        // producer task competing with workers for the pool's own threads
        // can starve forever once the bounded channel fills (the workers
        // that would drain it never get scheduled). `std::thread::scope`
        // lets it borrow `path`/`heads`/`engine` without an `Arc`.
        std::thread::scope(|thread_scope| {
            thread_scope.spawn(|| {
                if let Err(err) = produce_jobs(&path, &heads, from_timestamp, engine, job_tx) {
                    tracing::warn!(error = %err, "commit traversal ended early");
                }
            });

            pool.scope(|scope| {
                for _ in 0..threads {
                    let rx = job_rx.clone();
                    scope.spawn(|_| worker_loop(&path, rx, engine, &visited_blobs, &sink));
                }
                drop(job_rx);
            });
        });

        Ok(sink.into_inner().unwrap())
    }
}

/// Enumerates local branches matching `branch_glob_pattern`. A failure to
/// enumerate (rare, short of repository corruption) yields no heads rather
/// than aborting the scan — only `Repository::open` itself is a hard error
/// per the documented failure semantics.
fn resolve_branch_heads(repo: &Repository, branch_glob_pattern: &str) -> Vec<Oid> {
    let mut heads = Vec::new();
    let branches = match repo.branches(Some(BranchType::Local)) {
        Ok(branches) => branches,
        Err(err) => {
            tracing::warn!(error = %err, "failed to enumerate branches");
            return heads;
        }
    };

    for entry in branches {
        let (branch, _) = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read a branch reference");
                continue;
            }
        };
        let Some(name) = branch.name().ok().flatten() else {
            continue;
        };
        if !glob::matches(branch_glob_pattern, name) {
            continue;
        }
        if let Some(oid) = branch.get().target() {
            tracing::debug!(branch = %name, "selected branch for scan");
            heads.push(oid);
        }
    }
    heads
}

/// Single-threaded producer: walks history with one `git2::Revwalk` seeded
/// from every selected branch head (libgit2 marks commits as it yields them,
/// so a commit reachable from two branches is still only processed once),
/// diffs each commit against its parents, and enqueues introduced files.
///
/// Opens its own `Repository` handle rather than taking a borrowed one:
/// `git2::Repository` is not `Sync`, so it cannot be shared by reference
/// across the thread boundary this function runs behind (see `worker_loop`,
/// which makes the same choice for the same reason).
fn produce_jobs(
    repo_path: &Path,
    heads: &[Oid],
    from_timestamp: i64,
    engine: &RulesEngine,
    job_tx: crossbeam_channel::Sender<Job>,
) -> Result<(), git2::Error> {
    if heads.is_empty() {
        return Ok(());
    }

    let repo = Repository::open(repo_path)?;
    let mut revwalk = repo.revwalk()?;
    for head in heads {
        revwalk.push(*head)?;
    }

    let mut processed_commits: HashSet<Oid> = HashSet::new();

    for oid in revwalk {
        let oid = oid?;
        if !processed_commits.insert(oid) {
            continue;
        }
        let commit = repo.find_commit(oid)?;
        let introduced = introduced_files(&repo, &commit)?;
        if introduced.is_empty() {
            continue;
        }

        let author_time = commit.author().when().seconds();
        if from_timestamp != 0 && author_time < from_timestamp {
            continue;
        }

        let meta = Arc::new(commit_meta(&commit));
        for (path, blob_oid) in introduced {
            if !engine.should_scan_file_path(&path) {
                continue;
            }
            let job = Job {
                path,
                blob_oid,
                commit_oid: oid,
                meta: meta.clone(),
            };
            if job_tx.send(job).is_err() {
                // Workers gone (shouldn't happen while this function runs,
                // since the pool.scope barrier keeps them alive); stop early.
                return Ok(());
            }
        }
    }

    Ok(())
}

/// Returns every `(path, blob oid)` pair introduced by `commit`: for a root
/// commit, every blob in its tree; otherwise the intersection, across all
/// parents, of paths present in `commit` with a different oid than in that
/// parent (or absent from it).
fn introduced_files(repo: &Repository, commit: &Commit) -> Result<Vec<(String, Oid)>, git2::Error> {
    let tree = commit.tree()?;
    let parent_count = commit.parent_count();

    if parent_count == 0 {
        return all_blobs(&tree);
    }

    let mut per_parent: Vec<HashMap<String, Oid>> = Vec::with_capacity(parent_count);
    for parent in commit.parents() {
        let parent_tree = parent.tree()?;
        per_parent.push(diff_introduced(repo, &parent_tree, &tree)?);
    }

    let mut introduced = per_parent[0].clone();
    for other in &per_parent[1..] {
        introduced.retain(|path, oid| other.get(path) == Some(oid));
    }

    Ok(introduced.into_iter().collect())
}

fn diff_introduced(repo: &Repository, parent_tree: &Tree, tree: &Tree) -> Result<HashMap<String, Oid>, git2::Error> {
    let diff = repo.diff_tree_to_tree(Some(parent_tree), Some(tree), None)?;
    let mut introduced = HashMap::new();
    diff.foreach(
        &mut |delta, _| {
            let new_file = delta.new_file();
            if new_file.id().is_zero() {
                return true;
            }
            if let Some(path) = new_file.path() {
                introduced.insert(path.to_string_lossy().into_owned(), new_file.id());
            }
            true
        },
        None,
        None,
        None,
    )?;
    Ok(introduced)
}

fn all_blobs(tree: &Tree) -> Result<Vec<(String, Oid)>, git2::Error> {
    let mut blobs = Vec::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            let name = entry.name().unwrap_or_default();
            let path = if root.is_empty() {
                name.to_string()
            } else {
                format!("{}{}", root, name)
            };
            blobs.push((path, entry.id()));
        }
        git2::TreeWalkResult::Ok
    })?;
    Ok(blobs)
}

fn commit_meta(commit: &Commit) -> CommitMeta {
    let author = commit.author();
    let time = author.when();
    let commit_time = Utc
        .timestamp_opt(time.seconds(), 0)
        .single()
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default();

    CommitMeta {
        commit_id: commit.id().to_string(),
        commit_message: commit.message().unwrap_or_default().trim_end().to_string(),
        author_name: author.name().unwrap_or_default().to_string(),
        author_email: author.email().unwrap_or_default().to_string(),
        commit_time,
    }
}
