use std::path::PathBuf;

use crate::hash::Hash;

/// Error taxonomy surfaced by every core operation.
///
/// `NoChanges` is listed for completeness but is never constructed as an `Err` —
/// commit operations return `Ok(None)` instead, matching the "null result, not
/// an error" contract.
#[derive(Debug, thiserror::Error)]
pub enum ForesterError {
    #[error("not a forester repository (no .DFM found at or above {0})")]
    NotARepository(PathBuf),

    #[error("repository already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("object not found: {0}")]
    NoSuchObject(Hash),

    #[error("no such branch: {0}")]
    NoSuchBranch(String),

    #[error("no such tag: {0}")]
    NoSuchTag(String),

    #[error("no such stash: {0}")]
    NoSuchStash(Hash),

    #[error("branch already exists: {0}")]
    BranchExists(String),

    #[error("tag already exists: {0}")]
    TagExists(String),

    #[error("invalid name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("uncommitted changes in the workspace")]
    UncommittedChanges,

    #[error("{path} is locked by {locked_by}")]
    LockedByOther { path: String, locked_by: String },

    #[error("commit {hash} is the HEAD of branch '{branch}'; use force to delete anyway")]
    CommitIsBranchHead { hash: Hash, branch: String },

    #[error("hook '{hook}' failed (exit {code}): {stderr}")]
    HookFailed {
        hook: String,
        code: i32,
        stderr: String,
    },

    #[error("commit attempted with no changes")]
    NoChanges,

    #[error("corrupt object at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForesterError>;

/// Wraps a bare `io::Result` with the path it failed on, as `ForesterError::Io`.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| ForesterError::Io {
            path: path.into(),
            source,
        })
    }
}
