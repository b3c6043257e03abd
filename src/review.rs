// Review (C12): thin wrappers over the comments/approvals tables, matching
// the upstream call contract (comment/approve against a commit).

use crate::db::{ApprovalRow, CommentRow};
use crate::error::Result;
use crate::hash::Hash;
use crate::repository::Repository;
use crate::workspace::now;

pub fn add_comment(repo: &Repository, commit_hash: &Hash, author: &str, file_path: Option<&str>, body: &str) -> Result<i64> {
    repo.db.add_comment(commit_hash, author, file_path, body, now())
}

pub fn list_comments(repo: &Repository, commit_hash: &Hash, include_resolved: bool) -> Result<Vec<CommentRow>> {
    repo.db.list_comments(commit_hash, include_resolved)
}

pub fn resolve_comment(repo: &Repository, id: i64) -> Result<bool> {
    repo.db.resolve_comment(id)
}

pub fn delete_comment(repo: &Repository, id: i64) -> Result<bool> {
    repo.db.delete_comment(id)
}

pub fn set_approval(repo: &Repository, commit_hash: &Hash, author: &str, verdict: &str, note: Option<&str>) -> Result<()> {
    repo.db.set_approval(commit_hash, author, verdict, note, now())
}

pub fn list_approvals(repo: &Repository, commit_hash: &Hash) -> Result<Vec<ApprovalRow>> {
    repo.db.list_approvals(commit_hash)
}
