// Garbage collection (C10): mark every object reachable from branch refs,
// HEAD, and stash roots; sweep everything else. Iterative, not recursive, per
// the same REDESIGN FLAG that shaped `Repository::reachable_commits`.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{IoResultExt, Result};
use crate::hash::{self, Hash};
use crate::refs;
use crate::repository::Repository;
use crate::util::{make_xxh3_hashset, Xxh3HashSet};

#[derive(Debug, Default)]
pub struct GcStats {
    pub blobs_removed: usize,
    pub trees_removed: usize,
    pub commits_removed: usize,
    pub meshes_removed: usize,
    pub bytes_freed: u64,
}

struct Reachable {
    blobs: Xxh3HashSet<Hash>,
    trees: Xxh3HashSet<Hash>,
    commits: Xxh3HashSet<Hash>,
    meshes: Xxh3HashSet<Hash>,
}

fn mark(repo: &Repository, roots: Vec<Hash>) -> Reachable {
    let mut r = Reachable {
        blobs: make_xxh3_hashset(),
        trees: make_xxh3_hashset(),
        commits: make_xxh3_hashset(),
        meshes: make_xxh3_hashset(),
    };

    let mut commit_stack = roots;
    while let Some(hash) = commit_stack.pop() {
        if r.commits.contains(&hash) {
            continue;
        }
        r.commits.insert(hash.clone());
        let Ok(commit) = repo.storage.load_commit(&hash) else { continue };
        if let Some(parent) = commit.parent_hash.clone() {
            commit_stack.push(parent);
        }
        for mesh in &commit.mesh_hashes {
            r.meshes.insert(mesh.clone());
        }
        mark_tree(repo, &commit.tree_hash, &mut r);
    }

    r
}

fn mark_tree(repo: &Repository, tree_hash: &Hash, r: &mut Reachable) {
    let mut stack = vec![tree_hash.clone()];
    while let Some(hash) = stack.pop() {
        if r.trees.contains(&hash) {
            continue;
        }
        r.trees.insert(hash.clone());
        let Ok(tree) = repo.storage.load_tree(&hash) else { continue };
        for entry in tree.entries {
            r.blobs.insert(entry.hash);
        }
    }
}

/// Marks reachability from every branch ref, HEAD, and every stash's tree.
fn collect_roots(repo: &Repository) -> Result<(Vec<Hash>, Xxh3HashSet<Hash>, Xxh3HashSet<Hash>)> {
    let mut commit_roots = Vec::new();
    for name in refs::list_branches(&repo.dfm_dir)? {
        if let Some(h) = refs::read_branch(&repo.dfm_dir, &name)? {
            commit_roots.push(h);
        }
    }
    if let Some(h) = repo.db.get_head()? {
        commit_roots.push(h);
    }

    let mut stash_trees = make_xxh3_hashset();
    let mut stash_blobs = make_xxh3_hashset();
    for s in repo.db.list_stashes()? {
        stash_trees.insert(s.tree_hash.clone());
        if let Ok(tree) = repo.storage.load_tree(&s.tree_hash) {
            for entry in tree.entries {
                stash_blobs.insert(entry.hash);
            }
        }
    }

    Ok((commit_roots, stash_trees, stash_blobs))
}

pub fn gc(repo: &Repository, dry_run: bool) -> Result<GcStats> {
    let (commit_roots, stash_trees, stash_blobs) = collect_roots(repo)?;
    let mut reachable = mark(repo, commit_roots);
    reachable.trees.extend(stash_trees);
    reachable.blobs.extend(stash_blobs);

    let mut stats = GcStats::default();
    sweep_files(
        &repo.storage.root().join("objects").join(hash::KIND_BLOBS),
        &reachable.blobs,
        dry_run,
        &mut stats.blobs_removed,
        &mut stats.bytes_freed,
    )?;
    sweep_files(
        &repo.storage.root().join("objects").join(hash::KIND_TREES),
        &reachable.trees,
        dry_run,
        &mut stats.trees_removed,
        &mut stats.bytes_freed,
    )?;
    sweep_files(
        &repo.storage.root().join("objects").join(hash::KIND_COMMITS),
        &reachable.commits,
        dry_run,
        &mut stats.commits_removed,
        &mut stats.bytes_freed,
    )?;
    sweep_dirs(
        &repo.storage.root().join("objects").join(hash::KIND_MESHES),
        &reachable.meshes,
        dry_run,
        &mut stats.meshes_removed,
        &mut stats.bytes_freed,
    )?;

    if !dry_run {
        clean_scratch_dir(&repo.dfm_dir.join("preview_temp"));
        clean_scratch_dir(&repo.dfm_dir.join("compare_temp"));
    }

    tracing::info!(?stats, dry_run, "gc complete");
    Ok(stats)
}

fn reconstruct_hash(path: &Path, kind_dir: &Path) -> Option<Hash> {
    let rel = path.strip_prefix(kind_dir).ok()?;
    let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect();
    (parts.len() == 3).then(|| parts.concat())
}

fn sweep_files(
    dir: &Path,
    reachable: &Xxh3HashSet<Hash>,
    dry_run: bool,
    removed: &mut usize,
    bytes_freed: &mut u64,
) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(dir).min_depth(3).max_depth(3) {
        let entry = entry.map_err(|e| crate::error::ForesterError::Corrupt {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(hash) = reconstruct_hash(entry.path(), dir) else { continue };
        if reachable.contains(&hash) {
            continue;
        }
        let size = fs::metadata(entry.path()).with_path(entry.path())?.len();
        *bytes_freed += size;
        *removed += 1;
        if !dry_run {
            fs::remove_file(entry.path()).with_path(entry.path())?;
        }
    }
    if !dry_run {
        prune_empty_dirs(dir);
    }
    Ok(())
}

fn sweep_dirs(
    dir: &Path,
    reachable: &Xxh3HashSet<Hash>,
    dry_run: bool,
    removed: &mut usize,
    bytes_freed: &mut u64,
) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(dir).min_depth(3).max_depth(3) {
        let entry = entry.map_err(|e| crate::error::ForesterError::Corrupt {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(hash) = reconstruct_hash(entry.path(), dir) else { continue };
        if reachable.contains(&hash) {
            continue;
        }
        let size = dir_size(entry.path());
        *bytes_freed += size;
        *removed += 1;
        if !dry_run {
            fs::remove_dir_all(entry.path()).with_path(entry.path())?;
        }
    }
    if !dry_run {
        prune_empty_dirs(dir);
    }
    Ok(())
}

fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn prune_empty_dirs(dir: &Path) {
    for entry in WalkDir::new(dir).min_depth(1).max_depth(2).contents_first(true).into_iter().flatten() {
        if entry.file_type().is_dir() {
            let _ = fs::remove_dir(entry.path());
        }
    }
}

fn clean_scratch_dir(dir: &Path) {
    if dir.exists() {
        let _ = fs::remove_dir_all(dir);
    }
}
