// Disaster recovery (C11): rebuild the index DB from on-disk objects alone.
// Backs up, then reinitializes the commits/trees/blobs/meshes tables so no
// stale row can survive, scans the object store directly (not via the DB,
// which is assumed corrupt or missing), re-inserts rows, and rebuilds the
// repository_state row preferring `main` when present; branch refs pointing
// at missing commits are logged, not repaired, since fixing that requires
// human judgement.

use std::fs;

use walkdir::WalkDir;

use crate::error::{IoResultExt, Result};
use crate::hash::{self, Hash};
use crate::refs;
use crate::repository::Repository;

#[derive(Debug, Default)]
pub struct RebuildReport {
    pub commits_restored: usize,
    pub trees_restored: usize,
    pub blobs_restored: usize,
    pub meshes_restored: usize,
    pub dangling_branches: Vec<String>,
}

/// Backs up the existing DB file (if any) to `forester.db.bak` unless
/// `no_backup`, then re-derives every row from the object store.
pub fn rebuild(repo: &Repository, no_backup: bool) -> Result<RebuildReport> {
    let db_path = repo.dfm_dir.join("forester.db");
    if !no_backup && db_path.exists() {
        let backup = repo.dfm_dir.join("forester.db.bak");
        fs::copy(&db_path, &backup).with_path(&backup)?;
        tracing::info!(backup = %backup.display(), "backed up index database");
    }

    repo.db.reset_object_tables()?;

    let mut report = RebuildReport::default();

    for_each_fanout_file(repo, hash::KIND_BLOBS, |hash, path| {
        if let Ok(meta) = fs::metadata(&path) {
            let _ = repo.db.add_blob(&hash, "", meta.len(), 0);
            report.blobs_restored += 1;
        }
    });

    // Representative path per blob, recovered from tree scans; diagnostic
    // only (§4.7 step 4), never used to decide reachability or identity.
    let mut blob_paths: std::collections::HashMap<Hash, String> = std::collections::HashMap::new();
    for_each_fanout_file(repo, hash::KIND_TREES, |hash, path| {
        if let Ok(tree) = repo.storage.load_tree(&hash) {
            if let Ok(json) = serde_json::to_string(&tree.entries) {
                let _ = repo.db.add_tree(&hash, &json);
                report.trees_restored += 1;
            }
            for entry in tree.entries {
                blob_paths.entry(entry.hash).or_insert(entry.path);
            }
        }
        let _ = path;
    });
    for (blob_hash, path) in &blob_paths {
        let _ = repo.db.set_blob_path(blob_hash, path);
    }

    for_each_fanout_dir(repo, hash::KIND_MESHES, |hash, _path| {
        let _ = repo.db.add_mesh(&hash, "", 0);
        report.meshes_restored += 1;
    });

    for_each_fanout_file(repo, hash::KIND_COMMITS, |hash, _path| {
        if let Ok(commit) = repo.storage.load_commit(&hash) {
            let names = commit.selected_mesh_names.clone();
            let commit_type = match commit.commit_type {
                crate::object::CommitType::Project => "project",
                crate::object::CommitType::MeshOnly => "mesh_only",
            };
            let _ = repo.db.add_commit(
                &hash,
                &commit.branch,
                commit.parent_hash.as_ref(),
                commit.timestamp,
                &commit.message,
                &commit.tree_hash,
                &commit.author,
                commit_type,
                &names,
                &commit.export_options,
            );
            report.commits_restored += 1;
        }
    });

    let mut preferred_branch = None;
    for name in refs::list_branches(&repo.dfm_dir)? {
        if let Some(hash) = refs::read_branch(&repo.dfm_dir, &name)? {
            if !repo.storage.commit_exists(&hash) {
                report.dangling_branches.push(name.clone());
                tracing::warn!(branch = %name, commit = %hash, "branch ref points at missing commit");
                continue;
            }
        }
        if name == "main" {
            preferred_branch = Some(name.clone());
        } else if preferred_branch.is_none() {
            preferred_branch = Some(name);
        }
    }

    if let Some(branch) = preferred_branch {
        let head = refs::read_branch(&repo.dfm_dir, &branch)?;
        repo.db.set_branch_and_head(&branch, head.as_ref())?;
    }

    tracing::info!(?report, "rebuild complete");
    Ok(report)
}

fn for_each_fanout_file(repo: &Repository, kind: &str, mut f: impl FnMut(Hash, std::path::PathBuf)) {
    let dir = repo.storage.root().join("objects").join(kind);
    if !dir.exists() {
        return;
    }
    for entry in WalkDir::new(&dir).min_depth(3).max_depth(3).into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(hash) = reconstruct_hash(entry.path(), &dir) {
            f(hash, entry.path().to_path_buf());
        }
    }
}

fn for_each_fanout_dir(repo: &Repository, kind: &str, mut f: impl FnMut(Hash, std::path::PathBuf)) {
    let dir = repo.storage.root().join("objects").join(kind);
    if !dir.exists() {
        return;
    }
    for entry in WalkDir::new(&dir).min_depth(3).max_depth(3).into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(hash) = reconstruct_hash(entry.path(), &dir) {
            f(hash, entry.path().to_path_buf());
        }
    }
}

fn reconstruct_hash(path: &std::path::Path, kind_dir: &std::path::Path) -> Option<Hash> {
    let rel = path.strip_prefix(kind_dir).ok()?;
    let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
    (parts.len() == 3).then(|| parts.concat())
}
