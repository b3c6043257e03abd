// Branch management (C6), grounded on the teacher's branch.rs structure:
// list/create/delete/switch, each with the same println feedback idiom,
// rebuilt against `.DFM/refs/branches/<name>` and the typed `Head`.

use crate::error::{ForesterError, Result};
use crate::refs;
use crate::repository::Repository;

/// Print all local branches, marking the current one with `*`.
pub fn list(repo: &Repository) -> Result<()> {
    let current = repo.db.get_current_branch()?;
    let mut names = refs::list_branches(&repo.dfm_dir)?;
    if names.is_empty() {
        println!("no branches yet");
        return Ok(());
    }
    names.sort_unstable();

    for name in names {
        let marker = if current == name { "* " } else { "  " };
        let hash = refs::read_branch(&repo.dfm_dir, &name)?.map_or_else(|| "(no commits)".to_string(), |h| h[..8].to_string());
        println!("{marker}{name}  {hash}");
    }
    Ok(())
}

/// Creates a new branch pointing at `from` (an existing branch name), or at
/// the current HEAD if `from` is `None`.
pub fn create(repo: &Repository, name: &str, from: Option<&str>) -> Result<()> {
    validate_branch_name(name)?;
    if refs::branch_exists(&repo.dfm_dir, name) {
        return Err(ForesterError::BranchExists(name.to_string()));
    }

    let hash = match from {
        Some(source) if refs::branch_exists(&repo.dfm_dir, source) => refs::read_branch(&repo.dfm_dir, source)?,
        Some(source) => return Err(ForesterError::NoSuchBranch(source.to_string())),
        None => repo.head()?.commit().cloned(),
    };

    refs::write_branch(&repo.dfm_dir, name, hash.as_ref())?;
    match &hash {
        Some(h) => println!("created branch '{name}' at {}", &h[..8]),
        None => println!("created branch '{name}' (no commits yet)"),
    }
    Ok(())
}

/// Safe delete: refuses if the branch's commits are not reachable from any
/// other branch, unless `force`.
pub fn delete(repo: &Repository, name: &str, force: bool) -> Result<()> {
    if !refs::branch_exists(&repo.dfm_dir, name) {
        return Err(ForesterError::NoSuchBranch(name.to_string()));
    }
    if repo.db.get_current_branch()? == name {
        return Err(ForesterError::InvalidName(name.to_string(), "cannot delete the currently checked out branch"));
    }

    let Some(branch_hash) = refs::read_branch(&repo.dfm_dir, name)? else {
        std::fs::remove_file(refs::branch_path(&repo.dfm_dir, name))
            .map_err(|source| ForesterError::Io { path: refs::branch_path(&repo.dfm_dir, name), source })?;
        println!("deleted branch '{name}'");
        return Ok(());
    };

    if !force {
        let mut other_reachable = crate::util::make_xxh3_hashset();
        for other in refs::list_branches(&repo.dfm_dir)? {
            if other == name {
                continue;
            }
            if let Some(h) = refs::read_branch(&repo.dfm_dir, &other)? {
                other_reachable.extend(repo.reachable_commits(&h));
            }
        }
        if !other_reachable.contains(&branch_hash) {
            return Err(ForesterError::InvalidName(
                name.to_string(),
                "branch has commits not reachable from any other branch; use force to delete anyway",
            ));
        }
    }

    std::fs::remove_file(refs::branch_path(&repo.dfm_dir, name))
        .map_err(|source| ForesterError::Io { path: refs::branch_path(&repo.dfm_dir, name), source })?;
    println!("deleted branch '{name}'");
    Ok(())
}

/// Switches the current branch (and HEAD) without touching the workspace;
/// callers that also want files materialized should use `checkout::checkout`.
pub fn switch(repo: &Repository, name: &str) -> Result<()> {
    if !refs::branch_exists(&repo.dfm_dir, name) {
        return Err(ForesterError::NoSuchBranch(name.to_string()));
    }
    let hash = refs::read_branch(&repo.dfm_dir, name)?;
    repo.db.set_branch_and_head(name, hash.as_ref())?;
    println!("switched to branch '{name}'");
    Ok(())
}

fn validate_branch_name(name: &str) -> Result<()> {
    let invalid = |reason| ForesterError::InvalidName(name.to_string(), reason);

    if name.is_empty() {
        return Err(invalid("branch name cannot be empty"));
    }
    if name.len() > 255 {
        return Err(invalid("branch name too long"));
    }
    if name == "HEAD" {
        return Err(invalid("'HEAD' is not a valid branch name"));
    }
    if name.contains("..") {
        return Err(invalid("branch name cannot contain '..'"));
    }
    if name.starts_with('.') || name.ends_with('.') || name.starts_with(' ') || name.ends_with(' ') {
        return Err(invalid("branch name cannot start or end with '.' or whitespace"));
    }
    for c in ['/', '\\', '~', '^', ':', '?', '*', '[', ']'] {
        if name.contains(c) {
            return Err(invalid("branch name contains a reserved character"));
        }
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("branch name cannot contain control characters"));
    }
    Ok(())
}
