// Workspace scanner & diff (C5): walk, hash, assemble a Tree, detect "no changes".

use std::fs;
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::{IoResultExt, Result};
use crate::hash::compute_file_hash;
use crate::ignore::Ignore;
use crate::object::{Tree, TreeEntry};
use crate::repository::Repository;

/// Walks the workspace (skipping ignored paths) using `repo.ignore` as-is,
/// hashing and saving a Blob for every file, and returns the assembled,
/// path-sorted Tree.
pub fn scan_and_build_tree(repo: &Repository) -> Result<Tree> {
    scan_and_build_tree_with(repo, &repo.ignore)
}

/// Project-variant scan: additionally excludes `meshes/`, per the extended
/// ignore rule applied to project commits (meshes are committed through the
/// mesh-only pipeline instead).
pub fn scan_and_build_tree_for_project_commit(repo: &Repository) -> Result<Tree> {
    let ignore = repo.ignore.clone().with_meshes_excluded();
    scan_and_build_tree_with(repo, &ignore)
}

fn scan_and_build_tree_with(repo: &Repository, ignore: &Ignore) -> Result<Tree> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(&repo.root)
        .into_iter()
        .filter_entry(|e| !ignore.is_ignored_abs(e.path()))
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(&repo.root) else { continue };
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if rel_str.is_empty() || ignore.is_ignored_rel(&rel_str) {
            continue;
        }

        let hash = compute_file_hash(path)?;
        let size = fs::metadata(path).with_path(path)?.len();

        if !repo.storage.blob_exists(&hash) {
            let data = fs::read(path).with_path(path)?;
            repo.storage.save_blob(&data, &hash)?;
            repo.db.add_blob(&hash, &rel_str, size, now())?;
        }

        entries.push(TreeEntry { path: rel_str, kind: "blob".to_string(), hash, size });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(Tree { entries })
}

#[must_use] 
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// "No changes" detection: the sole mechanism per spec — equal tree hashes.
#[must_use]
pub fn trees_equal(new_hash: &str, parent_tree_hash: Option<&str>) -> bool {
    parent_tree_hash == Some(new_hash)
}
