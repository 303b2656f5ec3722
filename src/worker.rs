//! Per-job blob scanning, run by the worker pool spawned from
//! [`crate::scanner::RepositoryScanner::scan`].

use std::path::Path;
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use git2::{Oid, Repository};

use crate::binary::looks_binary;
use crate::rules::RulesEngine;
use crate::scanner::ScanResult;

/// Metadata shared by every job that originates from the same commit.
/// Built once by the producer when it first processes a commit, then handed
/// to every job for that commit via a cheap `Arc` clone — this is what keeps
/// commit-metadata lookups out of the worker's hot path without needing a
/// separate mutex-guarded cache.
pub(crate) struct CommitMeta {
    pub commit_id: String,
    pub commit_message: String,
    pub author_name: String,
    pub author_email: String,
    pub commit_time: String,
}

pub(crate) struct Job {
    pub path: String,
    pub blob_oid: Oid,
    pub commit_oid: Oid,
    pub meta: Arc<CommitMeta>,
}

/// Runs on one worker thread for the lifetime of one `scan()` call: opens its
/// own repository handle (`git2::Repository` is not `Send`), then drains jobs
/// until the producer drops the sending half of the channel.
pub(crate) fn worker_loop(
    repo_path: &Path,
    jobs: Receiver<Job>,
    engine: &RulesEngine,
    visited_blobs: &Mutex<std::collections::HashSet<(Oid, Oid)>>,
    sink: &Mutex<Vec<ScanResult>>,
) {
    let repo = match Repository::open(repo_path) {
        Ok(repo) => repo,
        Err(err) => {
            tracing::warn!(error = %err, "worker failed to open repository, exiting");
            return;
        }
    };

    for job in jobs {
        {
            let mut seen = visited_blobs.lock().unwrap();
            if !seen.insert((job.commit_oid, job.blob_oid)) {
                continue;
            }
        }

        let content = match repo.find_blob(job.blob_oid) {
            Ok(blob) => {
                let bytes = blob.content();
                if looks_binary(bytes) {
                    None
                } else {
                    Some(String::from_utf8_lossy(bytes).into_owned())
                }
            }
            Err(err) => {
                tracing::warn!(
                    oid = %job.blob_oid,
                    commit = %job.commit_oid,
                    error = %err,
                    "failed to read blob, skipping job"
                );
                continue;
            }
        };

        let Some(matches) = engine.scan_file(&job.path, content.as_deref()) else {
            continue;
        };

        let mut results = sink.lock().unwrap();
        for m in matches {
            results.push(ScanResult {
                rule_name: m.rule_name,
                match_text: m.match_text,
                file_path: job.path.clone(),
                file_oid: job.blob_oid.to_string(),
                commit_id: job.meta.commit_id.clone(),
                commit_message: job.meta.commit_message.clone(),
                author_name: job.meta.author_name.clone(),
                author_email: job.meta.author_email.clone(),
                commit_time: job.meta.commit_time.clone(),
            });
        }
    }
}
