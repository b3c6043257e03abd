// Checkout (C7): resolve a target, guard against losing uncommitted work,
// materialize its tree, and update HEAD — attached to a branch or detached.

use std::fs;

use crate::error::{ForesterError, IoResultExt, Result};
use crate::hash::Hash;
use crate::hooks::{self, HookEnv};
use crate::ignore::Glob;
use crate::object::{Commit, CommitType, Tree};
use crate::refs;
use crate::repository::Repository;
use crate::workspace::{scan_and_build_tree, scan_and_build_tree_for_project_commit, trees_equal};

enum Target {
    Branch(String),
    Commit(Hash),
}

fn resolve_target(repo: &Repository, target: &str) -> Result<Target> {
    if refs::branch_exists(&repo.dfm_dir, target) {
        Ok(Target::Branch(target.to_string()))
    } else if repo.storage.commit_exists(&target.to_string()) {
        Ok(Target::Commit(target.to_string()))
    } else {
        Err(ForesterError::NoSuchBranch(target.to_string()))
    }
}

fn hook_env(repo: &Repository, branch: &str, target: &str) -> HookEnv {
    HookEnv {
        branch: branch.to_string(),
        author: String::new(),
        message: String::new(),
        commit_hash: String::new(),
        target: target.to_string(),
        repo_path: repo.root.to_string_lossy().to_string(),
    }
}

/// Removes every file the current HEAD's tree tracks, so switching to a tree
/// that no longer contains a path doesn't leave it behind.
fn remove_tracked_files(repo: &Repository, tree: &Tree) -> Result<()> {
    for entry in &tree.entries {
        let path = repo.root.join(&entry.path);
        if path.exists() {
            fs::remove_file(&path).with_path(&path)?;
        }
    }
    Ok(())
}

fn path_selected(path: &str, patterns: Option<&[String]>) -> bool {
    match patterns {
        None => true,
        Some(pats) => pats.is_empty() || pats.iter().any(|p| Glob::new(p).is_match(path)),
    }
}

/// Mesh prefix a tree entry's path belongs to, e.g. `meshes/ab12cd34`.
fn mesh_prefix_of(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("meshes/")?;
    let prefix_len = rest.find('/')?;
    Some(&path[..7 + prefix_len])
}

/// For each selected mesh, copies its stored textures into the workspace
/// and regenerates `mesh_metadata.json` with `commit_path` rewritten to the
/// workspace-relative texture location, per §4.6 step 5.
fn materialize_mesh_textures(repo: &Repository, commit: &Commit, mesh_names: Option<&[String]>) -> Result<()> {
    for (mesh_hash, name) in commit.mesh_hashes.iter().zip(&commit.selected_mesh_names) {
        if let Some(names) = mesh_names {
            if !names.is_empty() && !names.iter().any(|n| n == name) {
                continue;
            }
        }
        let Ok(mut metadata) = repo.storage.load_mesh_metadata(mesh_hash) else { continue };
        let prefix = format!("meshes/{}", &mesh_hash[..8]);
        let textures_dir = repo.root.join(&prefix).join("textures");
        fs::create_dir_all(&textures_dir).with_path(&textures_dir)?;

        let mesh_dir = repo.storage.mesh_dir(mesh_hash)?;
        for tex in &mut metadata.material_json.textures {
            let basename = tex.commit_path.trim_start_matches("textures/");
            let src = mesh_dir.join("textures").join(basename);
            if let Ok(bytes) = fs::read(&src) {
                let dst = textures_dir.join(basename);
                let _ = fs::write(dst, bytes);
            }
            tex.commit_path = format!("{prefix}/textures/{basename}");
        }

        let metadata_path = repo.root.join(&prefix).join("mesh_metadata.json");
        if let Ok(bytes) = serde_json::to_vec_pretty(&metadata) {
            let _ = fs::write(metadata_path, bytes);
        }
    }
    Ok(())
}

fn materialize_tree(repo: &Repository, tree: &Tree, file_patterns: Option<&[String]>) -> Result<()> {
    for entry in &tree.entries {
        if !path_selected(&entry.path, file_patterns) {
            continue;
        }
        let path = repo.root.join(&entry.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let data = repo.storage.load_blob(&entry.hash)?;
        fs::write(&path, data).with_path(&path)?;
    }
    Ok(())
}

/// `target` is tried as a branch name first, then as a commit hash. Refuses
/// when the workspace has uncommitted changes unless `force`. Returns `None`
/// when switching onto a branch with no commits yet.
pub fn checkout(repo: &Repository, target: &str, force: bool) -> Result<Option<Hash>> {
    checkout_with_options(repo, target, force, None, None)
}

/// Full form of [`checkout`]: `file_patterns` restricts which tracked paths
/// are materialized for a project commit (all paths when `None`);
/// `mesh_names` restricts which selected meshes are touched for a mesh-only
/// commit, including their texture copy-out (all meshes when `None`).
pub fn checkout_with_options(
    repo: &Repository,
    target: &str,
    force: bool,
    file_patterns: Option<&[String]>,
    mesh_names: Option<&[String]>,
) -> Result<Option<Hash>> {
    let current_branch = repo.db.get_current_branch()?;
    let head = repo.head()?;

    if !force {
        if let Some(head_hash) = head.commit() {
            let head_commit = repo.storage.load_commit(head_hash)?;
            // Mirror the scan a commit of this type would have performed, so
            // the comparison against its tree hash is apples-to-apples.
            let tree = match head_commit.commit_type {
                CommitType::Project => scan_and_build_tree_for_project_commit(repo)?,
                CommitType::MeshOnly => scan_and_build_tree(repo)?,
            };
            if !trees_equal(&tree.hash(), Some(&head_commit.tree_hash)) {
                return Err(ForesterError::UncommittedChanges);
            }
        }
    }

    let resolved = resolve_target(repo, target)?;
    let new_branch_name = match &resolved {
        Target::Branch(b) => b.clone(),
        Target::Commit(_) => current_branch.clone(),
    };
    let new_commit_hash = match &resolved {
        Target::Branch(b) => refs::read_branch(&repo.dfm_dir, b)?,
        Target::Commit(h) => Some(h.clone()),
    };

    hooks::run_pre_checkout_hook(&repo.dfm_dir, &hook_env(repo, &current_branch, target))?;

    if let Some(head_hash) = head.commit() {
        let head_commit = repo.storage.load_commit(head_hash)?;
        let head_tree = repo.storage.load_tree(&head_commit.tree_hash)?;
        remove_tracked_files(repo, &head_tree)?;
    }

    if let Some(new_hash) = &new_commit_hash {
        let commit = repo.storage.load_commit(new_hash)?;
        let tree = repo.storage.load_tree(&commit.tree_hash)?;
        if commit.commit_type == CommitType::MeshOnly {
            // Only the selected meshes' directories are touched; tracked
            // non-mesh paths (there are none in practice for this variant)
            // still go through the generic materializer.
            let allowed_prefixes: Vec<String> = commit
                .mesh_hashes
                .iter()
                .zip(&commit.selected_mesh_names)
                .filter(|(_, name)| mesh_names.is_none_or(|names| names.is_empty() || names.iter().any(|n| n == *name)))
                .map(|(hash, _)| format!("meshes/{}", &hash[..8]))
                .collect();
            let mesh_paths: Vec<String> = tree
                .entries
                .iter()
                .filter(|e| mesh_prefix_of(&e.path).is_some_and(|prefix| allowed_prefixes.iter().any(|p| p == prefix)))
                .map(|e| e.path.clone())
                .collect();
            materialize_tree(repo, &tree, Some(&mesh_paths))?;
            materialize_mesh_textures(repo, &commit, mesh_names)?;
        } else {
            materialize_tree(repo, &tree, file_patterns)?;
        }
    }

    match resolved {
        Target::Branch(branch) => {
            repo.db.set_branch_and_head(&branch, new_commit_hash.as_ref())?;
        }
        Target::Commit(hash) => {
            // Detached: the state row's head no longer matches the branch ref.
            repo.db.set_branch_and_head(&current_branch, Some(&hash))?;
        }
    }

    hooks::run_post_checkout_hook(&repo.dfm_dir, &hook_env(repo, &new_branch_name, target));

    tracing::info!(target, "checked out");
    Ok(new_commit_hash)
}
