// Stash (C9): snapshot the workspace tree and restore HEAD, without the
// staged/dirty split the teacher's Index-based stash used (this core has no
// staging area — a commit-or-stash snapshot is always the full tree).

use crate::error::{ForesterError, Result};
use crate::hash::{compute_hash, Hash};
use crate::repository::Repository;
use crate::workspace::{now, scan_and_build_tree, trees_equal};

fn stash_hash(tree_hash: &Hash, timestamp: i64, message: &str, branch: &str) -> Hash {
    let mut buf = Vec::new();
    buf.extend_from_slice(tree_hash.as_bytes());
    buf.extend_from_slice(timestamp.to_string().as_bytes());
    buf.extend_from_slice(message.as_bytes());
    buf.extend_from_slice(branch.as_bytes());
    compute_hash(&buf)
}

/// Snapshots the workspace tree and resets it to HEAD's tree. Returns `None`
/// when there is nothing to stash (workspace matches HEAD already).
pub fn create(repo: &Repository, message: &str) -> Result<Option<Hash>> {
    let branch = repo.db.get_current_branch()?;
    let head = repo.head()?;

    let tree = scan_and_build_tree(repo)?;
    let tree_hash = tree.hash();

    let head_tree_hash = match head.commit() {
        Some(h) => Some(repo.storage.load_commit(h)?.tree_hash),
        None => None,
    };
    if trees_equal(&tree_hash, head_tree_hash.as_deref()) {
        return Ok(None);
    }

    repo.storage.save_tree(&tree, &tree_hash)?;
    repo.db.add_tree(&tree_hash, &serde_json::to_string(&tree.entries)?)?;

    let timestamp = now();
    let hash = stash_hash(&tree_hash, timestamp, message, &branch);
    repo.db.add_stash(&hash, timestamp, message, &tree_hash, Some(&branch))?;

    // Reset the workspace to HEAD's tree by materializing it back in place.
    match &head_tree_hash {
        Some(h) => {
            let head_tree = repo.storage.load_tree(h)?;
            restore_tree(repo, &tree, &head_tree)?;
        }
        None => {
            for entry in &tree.entries {
                let path = repo.root.join(&entry.path);
                let _ = std::fs::remove_file(path);
            }
        }
    }

    tracing::info!(stash = %hash, "created stash");
    Ok(Some(hash))
}

fn restore_tree(repo: &Repository, current: &crate::object::Tree, target: &crate::object::Tree) -> Result<()> {
    use std::collections::HashSet;
    let target_paths: HashSet<&str> = target.entries.iter().map(|e| e.path.as_str()).collect();

    for entry in &current.entries {
        if !target_paths.contains(entry.path.as_str()) {
            let _ = std::fs::remove_file(repo.root.join(&entry.path));
        }
    }
    for entry in &target.entries {
        let path = repo.root.join(&entry.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ForesterError::Io { path: parent.to_path_buf(), source })?;
        }
        let data = repo.storage.load_blob(&entry.hash)?;
        std::fs::write(&path, data).map_err(|source| ForesterError::Io { path, source })?;
    }
    Ok(())
}

/// Applies a stash's tree onto the workspace. Auto-stashes the current
/// workspace state first unless `force` (matching the spec's "don't silently
/// clobber uncommitted work" contract).
pub fn apply(repo: &Repository, hash: &Hash, force: bool) -> Result<()> {
    let Some(row) = repo.db.get_stash(hash)? else {
        return Err(ForesterError::NoSuchStash(hash.clone()));
    };

    if !force {
        let current = scan_and_build_tree(repo)?;
        if !trees_equal(&current.hash(), Some(&row.tree_hash)) && !current.entries.is_empty() {
            create(repo, &format!("auto-stash before applying {hash}"))?;
        }
    }

    let target = repo.storage.load_tree(&row.tree_hash)?;
    let current = scan_and_build_tree(repo)?;
    restore_tree(repo, &current, &target)?;

    tracing::info!(stash = %hash, "applied stash");
    Ok(())
}

pub fn delete(repo: &Repository, hash: &Hash) -> Result<()> {
    if repo.db.get_stash(hash)?.is_none() {
        return Err(ForesterError::NoSuchStash(hash.clone()));
    }
    repo.db.delete_stash(hash)
}

pub fn list(repo: &Repository) -> Result<()> {
    let stashes = repo.db.list_stashes()?;
    if stashes.is_empty() {
        println!("no stash entries");
        return Ok(());
    }
    for s in stashes {
        let branch = s.branch.as_deref().unwrap_or("?");
        println!("{} ({branch}): {}", &s.hash[..8], s.message);
    }
    Ok(())
}
