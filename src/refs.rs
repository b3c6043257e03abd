// Branch ref files plus the typed HEAD sum type that replaces the
// branch-unchanged-means-detached convention.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};
use crate::hash::Hash;

#[must_use]
pub fn branches_dir(dfm_dir: &Path) -> PathBuf {
    dfm_dir.join("refs").join("branches")
}

#[must_use]
pub fn branch_path(dfm_dir: &Path, name: &str) -> PathBuf {
    branches_dir(dfm_dir).join(name)
}

#[must_use]
pub fn branch_exists(dfm_dir: &Path, name: &str) -> bool {
    branch_path(dfm_dir, name).exists()
}

/// `None` means the branch exists with no commits yet (empty ref file).
pub fn read_branch(dfm_dir: &Path, name: &str) -> Result<Option<Hash>> {
    let path = branch_path(dfm_dir, name);
    let content = fs::read_to_string(&path).with_path(&path)?;
    let trimmed = content.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

pub fn write_branch(dfm_dir: &Path, name: &str, hash: Option<&Hash>) -> Result<()> {
    let path = branch_path(dfm_dir, name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    fs::write(&path, hash.map_or("", String::as_str)).with_path(&path)?;
    Ok(())
}

pub fn list_branches(dfm_dir: &Path) -> Result<Vec<String>> {
    let dir = branches_dir(dfm_dir);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = fs::read_dir(&dir)
        .with_path(&dir)?
        .filter_map(std::result::Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .collect::<Vec<_>>();
    names.sort_unstable();
    Ok(names)
}

/// Explicit sum type for the §9 REDESIGN FLAG: a detached checkout is a
/// distinct variant, not an ambiguous "branch happens to not match head".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    Attached { branch: String, commit: Option<Hash> },
    Detached { branch: String, commit: Hash },
}

impl Head {
    #[must_use]
    pub fn commit(&self) -> Option<&Hash> {
        match self {
            Head::Attached { commit, .. } => commit.as_ref(),
            Head::Detached { commit, .. } => Some(commit),
        }
    }

    #[must_use]
    pub fn attached_branch(&self) -> Option<&str> {
        match self {
            Head::Attached { branch, .. } => Some(branch),
            Head::Detached { .. } => None,
        }
    }
}

/// Derives `Head` by comparing the state row against the branch ref file, per
/// the spec's "Detached (branch=B, head=H, H≠ref(B))" rule.
pub fn resolve_head(dfm_dir: &Path, current_branch: &str, head_hash: Option<&Hash>) -> Result<Head> {
    let branch_hash = if branch_exists(dfm_dir, current_branch) {
        read_branch(dfm_dir, current_branch)?
    } else {
        None
    };

    Ok(match head_hash {
        Some(h) if branch_hash.as_ref() != Some(h) => {
            Head::Detached { branch: current_branch.to_string(), commit: h.clone() }
        }
        _ => Head::Attached { branch: current_branch.to_string(), commit: head_hash.cloned() },
    })
}
