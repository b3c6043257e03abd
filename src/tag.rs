// Tags (C9): a named, unique pointer to a single commit.

use crate::error::{ForesterError, Result};
use crate::hash::Hash;
use crate::repository::Repository;

pub fn create(repo: &Repository, name: &str, commit: Option<&str>) -> Result<Hash> {
    if repo.db.find_by_tag(name)?.is_some() {
        return Err(ForesterError::TagExists(name.to_string()));
    }

    let hash = match commit {
        Some(h) => h.to_string(),
        None => repo.head()?.commit().cloned().ok_or_else(|| ForesterError::NoSuchBranch("HEAD".to_string()))?,
    };
    if !repo.storage.commit_exists(&hash) {
        return Err(ForesterError::NoSuchObject(hash));
    }

    repo.db.set_tag(&hash, Some(name))?;
    Ok(hash)
}

pub fn delete(repo: &Repository, name: &str) -> Result<()> {
    let Some(hash) = repo.db.find_by_tag(name)? else {
        return Err(ForesterError::NoSuchTag(name.to_string()));
    };
    repo.db.set_tag(&hash, None)
}

pub fn show(repo: &Repository, name: &str) -> Result<Hash> {
    repo.db.find_by_tag(name)?.ok_or_else(|| ForesterError::NoSuchTag(name.to_string()))
}

pub fn list(repo: &Repository) -> Result<()> {
    let tags = repo.db.list_tags()?;
    if tags.is_empty() {
        println!("no tags");
        return Ok(());
    }
    for (tag, hash) in tags {
        println!("{tag}  {}", &hash[..8]);
    }
    Ok(())
}
