// Cooperative, advisory file locks (C8).

use crate::error::{ForesterError, Result};
use crate::repository::Repository;
use crate::workspace::now;

pub fn lock_file(
    repo: &Repository,
    path: &str,
    locked_by: &str,
    lock_type: &str,
    branch: Option<&str>,
    expires_after_seconds: Option<i64>,
) -> Result<bool> {
    repo.db.sweep_expired_locks(now())?;
    let expires_at = expires_after_seconds.map(|s| now() + s);
    repo.db.lock_file(path, lock_type, locked_by, branch, expires_at)
}

pub fn unlock_file(repo: &Repository, path: &str, locked_by: &str, branch: Option<&str>) -> Result<bool> {
    repo.db.unlock_file(path, locked_by, branch)
}

pub fn list_locks(repo: &Repository) -> Result<Vec<crate::db::LockRow>> {
    repo.db.sweep_expired_locks(now())?;
    repo.db.list_locks()
}

/// Returns the locks among `paths` not owned by `author`; used by commit to
/// refuse writes that would overwrite someone else's locked work.
pub fn check_commit_conflicts(repo: &Repository, paths: &[String], author: &str) -> Result<Vec<crate::db::LockRow>> {
    repo.db.sweep_expired_locks(now())?;
    Ok(repo
        .db
        .locks_for_paths(paths)?
        .into_iter()
        .filter(|l| l.locked_by != author)
        .collect())
}

/// Convenience used by commit: errors out with `LockedByOther` naming the
/// first conflicting path, if any locks are held by someone else.
pub fn ensure_no_conflicts(repo: &Repository, paths: &[String], author: &str) -> Result<()> {
    let conflicts = check_commit_conflicts(repo, paths, author)?;
    if let Some(first) = conflicts.first() {
        return Err(ForesterError::LockedByOther {
            path: first.file_path.clone(),
            locked_by: first.locked_by.clone(),
        });
    }
    Ok(())
}
