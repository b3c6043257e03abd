// Embedded index database: secondary cache over the object store, plus the
// state row, lock table, and review records that have no other home.
//
// Connection handling follows the scoped-connection pattern: open, configure
// WAL + NORMAL synchronous, run the operation, close. `commits`/`trees`/
// `blobs`/`meshes`/`stash`/`repository_state` mirror the upstream schema
// column-for-column; `locks`/`comments`/`approvals` are not given a concrete
// schema there (locking.py and review.py only show the call contract), so
// their column sets are designed here from that contract and recorded as an
// open-question decision.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::hash::Hash;

pub struct Db {
    conn: Connection,
}

pub struct CommitRow {
    pub hash: Hash,
    pub branch: String,
    pub parent_hash: Option<Hash>,
    pub timestamp: i64,
    pub message: String,
    pub tree_hash: Hash,
    pub author: String,
    pub commit_type: String,
    pub tag: Option<String>,
}

pub struct StashRow {
    pub hash: Hash,
    pub timestamp: i64,
    pub message: String,
    pub tree_hash: Hash,
    pub branch: Option<String>,
}

pub struct LockRow {
    pub file_path: String,
    pub locked_by: String,
    pub lock_type: String,
    pub branch: Option<String>,
    pub expires_at: Option<i64>,
}

pub struct CommentRow {
    pub id: i64,
    pub commit_hash: Hash,
    pub author: String,
    pub file_path: Option<String>,
    pub body: String,
    pub timestamp: i64,
    pub resolved: bool,
}

pub struct ApprovalRow {
    pub id: i64,
    pub commit_hash: Hash,
    pub author: String,
    pub verdict: String,
    pub note: Option<String>,
    pub timestamp: i64,
}

impl Db {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS commits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT UNIQUE NOT NULL,
                branch TEXT NOT NULL,
                parent_hash TEXT,
                timestamp INTEGER NOT NULL,
                message TEXT,
                tree_hash TEXT NOT NULL,
                author TEXT,
                commit_type TEXT NOT NULL DEFAULT 'project',
                selected_mesh_names TEXT,
                export_options TEXT,
                tag TEXT UNIQUE
            );
            CREATE INDEX IF NOT EXISTS idx_commits_branch ON commits(branch);
            CREATE INDEX IF NOT EXISTS idx_commits_parent ON commits(parent_hash);

            CREATE TABLE IF NOT EXISTS trees (
                hash TEXT PRIMARY KEY,
                entries TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS blobs (
                hash TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                size INTEGER NOT NULL,
                created_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS meshes (
                hash TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                created_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS stash (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT UNIQUE NOT NULL,
                timestamp INTEGER NOT NULL,
                message TEXT,
                tree_hash TEXT NOT NULL,
                branch TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_stash_timestamp ON stash(timestamp);

            CREATE TABLE IF NOT EXISTS repository_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                current_branch TEXT NOT NULL DEFAULT 'main',
                head TEXT
            );
            INSERT OR IGNORE INTO repository_state (id, current_branch, head) VALUES (1, 'main', NULL);

            CREATE TABLE IF NOT EXISTS locks (
                file_path TEXT NOT NULL,
                branch TEXT NOT NULL DEFAULT '',
                locked_by TEXT NOT NULL,
                lock_type TEXT NOT NULL DEFAULT 'exclusive',
                expires_at INTEGER,
                PRIMARY KEY (file_path, branch)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                commit_hash TEXT NOT NULL,
                author TEXT NOT NULL,
                file_path TEXT,
                body TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                resolved INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_comments_commit ON comments(commit_hash);

            CREATE TABLE IF NOT EXISTS approvals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                commit_hash TEXT NOT NULL,
                author TEXT NOT NULL,
                verdict TEXT NOT NULL,
                note TEXT,
                timestamp INTEGER NOT NULL,
                UNIQUE(commit_hash, author)
            );
            ",
        )?;
        Ok(())
    }

    /// Forces the write-ahead log to checkpoint so a subsequent fresh
    /// connection observes the just-written state row immediately.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    /// Clears every row derived from the object store (commits/trees/blobs/
    /// meshes) so a rebuild starts from an empty schema rather than merging
    /// into stale rows via `INSERT OR IGNORE`. Locks, comments, approvals,
    /// and stash entries aren't derivable from the object store alone and are
    /// left untouched.
    pub fn reset_object_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM commits; DELETE FROM trees; DELETE FROM blobs; DELETE FROM meshes;",
        )?;
        Ok(())
    }

    // ---- commits ----

    #[allow(clippy::too_many_arguments)]
    pub fn add_commit(
        &self,
        hash: &Hash,
        branch: &str,
        parent_hash: Option<&Hash>,
        timestamp: i64,
        message: &str,
        tree_hash: &Hash,
        author: &str,
        commit_type: &str,
        selected_mesh_names: &[String],
        export_options: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let names_json = (!selected_mesh_names.is_empty())
            .then(|| serde_json::to_string(selected_mesh_names)).transpose()?;
        let options_json = (!export_options.is_empty())
            .then(|| serde_json::to_string(export_options)).transpose()?;
        self.conn.execute(
            "INSERT INTO commits (hash, branch, parent_hash, timestamp, message, tree_hash, author,
                                   commit_type, selected_mesh_names, export_options)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![hash, branch, parent_hash, timestamp, message, tree_hash, author, commit_type, names_json, options_json],
        )?;
        Ok(())
    }

    pub fn get_commit(&self, hash: &Hash) -> Result<Option<CommitRow>> {
        self.conn
            .query_row(
                "SELECT hash, branch, parent_hash, timestamp, message, tree_hash, author, commit_type, tag
                 FROM commits WHERE hash = ?1",
                params![hash],
                |row| {
                    Ok(CommitRow {
                        hash: row.get(0)?,
                        branch: row.get(1)?,
                        parent_hash: row.get(2)?,
                        timestamp: row.get(3)?,
                        message: row.get(4)?,
                        tree_hash: row.get(5)?,
                        author: row.get(6)?,
                        commit_type: row.get(7)?,
                        tag: row.get(8)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_commits_by_branch(&self, branch: &str) -> Result<Vec<CommitRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT hash, branch, parent_hash, timestamp, message, tree_hash, author, commit_type, tag
             FROM commits WHERE branch = ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(params![branch], |row| {
                Ok(CommitRow {
                    hash: row.get(0)?,
                    branch: row.get(1)?,
                    parent_hash: row.get(2)?,
                    timestamp: row.get(3)?,
                    message: row.get(4)?,
                    tree_hash: row.get(5)?,
                    author: row.get(6)?,
                    commit_type: row.get(7)?,
                    tag: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_commit(&self, hash: &Hash) -> Result<()> {
        self.conn.execute("DELETE FROM commits WHERE hash = ?1", params![hash])?;
        Ok(())
    }

    pub fn set_tag(&self, hash: &Hash, tag: Option<&str>) -> Result<()> {
        self.conn.execute("UPDATE commits SET tag = ?1 WHERE hash = ?2", params![tag, hash])?;
        Ok(())
    }

    pub fn find_by_tag(&self, tag: &str) -> Result<Option<Hash>> {
        self.conn
            .query_row("SELECT hash FROM commits WHERE tag = ?1", params![tag], |r| r.get(0))
            .optional()
            .map_err(Into::into)
    }

    pub fn list_tags(&self) -> Result<Vec<(String, Hash)>> {
        let mut stmt = self.conn.prepare("SELECT tag, hash FROM commits WHERE tag IS NOT NULL ORDER BY tag")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- trees ----

    pub fn add_tree(&self, hash: &Hash, entries_json: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO trees (hash, entries) VALUES (?1, ?2)",
            params![hash, entries_json],
        )?;
        Ok(())
    }

    pub fn tree_exists(&self, hash: &Hash) -> Result<bool> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM trees WHERE hash = ?1", params![hash], |_| Ok(()))
            .optional()?
            .is_some())
    }

    pub fn delete_tree(&self, hash: &Hash) -> Result<()> {
        self.conn.execute("DELETE FROM trees WHERE hash = ?1", params![hash])?;
        Ok(())
    }

    // ---- blobs ----

    pub fn add_blob(&self, hash: &Hash, path: &str, size: u64, created_at: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO blobs (hash, path, size, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![hash, path, size as i64, created_at],
        )?;
        Ok(())
    }

    pub fn blob_exists(&self, hash: &Hash) -> Result<bool> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM blobs WHERE hash = ?1", params![hash], |_| Ok(()))
            .optional()?
            .is_some())
    }

    /// Diagnostic only: records a representative path recovered by scanning
    /// trees, not load-bearing for any invariant.
    pub fn set_blob_path(&self, hash: &Hash, path: &str) -> Result<()> {
        self.conn.execute("UPDATE blobs SET path = ?2 WHERE hash = ?1", params![hash, path])?;
        Ok(())
    }

    pub fn delete_blob(&self, hash: &Hash) -> Result<()> {
        self.conn.execute("DELETE FROM blobs WHERE hash = ?1", params![hash])?;
        Ok(())
    }

    // ---- meshes ----

    pub fn add_mesh(&self, hash: &Hash, path: &str, created_at: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO meshes (hash, path, created_at) VALUES (?1, ?2, ?3)",
            params![hash, path, created_at],
        )?;
        Ok(())
    }

    pub fn mesh_exists(&self, hash: &Hash) -> Result<bool> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM meshes WHERE hash = ?1", params![hash], |_| Ok(()))
            .optional()?
            .is_some())
    }

    pub fn delete_mesh(&self, hash: &Hash) -> Result<()> {
        self.conn.execute("DELETE FROM meshes WHERE hash = ?1", params![hash])?;
        Ok(())
    }

    // ---- stash ----

    pub fn add_stash(&self, hash: &Hash, timestamp: i64, message: &str, tree_hash: &Hash, branch: Option<&str>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO stash (hash, timestamp, message, tree_hash, branch) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![hash, timestamp, message, tree_hash, branch],
        )?;
        Ok(())
    }

    pub fn get_stash(&self, hash: &Hash) -> Result<Option<StashRow>> {
        self.conn
            .query_row(
                "SELECT hash, timestamp, message, tree_hash, branch FROM stash WHERE hash = ?1",
                params![hash],
                |row| {
                    Ok(StashRow {
                        hash: row.get(0)?,
                        timestamp: row.get(1)?,
                        message: row.get(2)?,
                        tree_hash: row.get(3)?,
                        branch: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_stashes(&self) -> Result<Vec<StashRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT hash, timestamp, message, tree_hash, branch FROM stash ORDER BY timestamp DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StashRow {
                    hash: row.get(0)?,
                    timestamp: row.get(1)?,
                    message: row.get(2)?,
                    tree_hash: row.get(3)?,
                    branch: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_stash(&self, hash: &Hash) -> Result<()> {
        self.conn.execute("DELETE FROM stash WHERE hash = ?1", params![hash])?;
        Ok(())
    }

    // ---- repository state ----

    pub fn get_current_branch(&self) -> Result<String> {
        Ok(self.conn.query_row(
            "SELECT current_branch FROM repository_state WHERE id = 1",
            [],
            |r| r.get(0),
        )?)
    }

    pub fn get_head(&self) -> Result<Option<Hash>> {
        self.conn
            .query_row("SELECT head FROM repository_state WHERE id = 1", [], |r| r.get(0))
            .optional()
            .map(Option::flatten)
            .map_err(Into::into)
    }

    /// Sets `(current_branch, head)` and forces a checkpoint, per the
    /// concurrency contract: a subsequent fresh connection must see this write.
    pub fn set_branch_and_head(&self, branch: &str, head: Option<&Hash>) -> Result<()> {
        self.conn.execute(
            "UPDATE repository_state SET current_branch = ?1, head = ?2 WHERE id = 1",
            params![branch, head],
        )?;
        self.checkpoint()
    }

    // ---- locks ----

    pub fn lock_file(&self, path: &str, lock_type: &str, locked_by: &str, branch: Option<&str>, expires_at: Option<i64>) -> Result<bool> {
        let branch = branch.unwrap_or("");
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO locks (file_path, branch, locked_by, lock_type, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![path, branch, locked_by, lock_type, expires_at],
        )?;
        Ok(inserted > 0)
    }

    pub fn unlock_file(&self, path: &str, locked_by: &str, branch: Option<&str>) -> Result<bool> {
        let branch = branch.unwrap_or("");
        let deleted = self.conn.execute(
            "DELETE FROM locks WHERE file_path = ?1 AND branch = ?2 AND locked_by = ?3",
            params![path, branch, locked_by],
        )?;
        Ok(deleted > 0)
    }

    pub fn sweep_expired_locks(&self, now: i64) -> Result<()> {
        self.conn.execute("DELETE FROM locks WHERE expires_at IS NOT NULL AND expires_at <= ?1", params![now])?;
        Ok(())
    }

    pub fn list_locks(&self) -> Result<Vec<LockRow>> {
        let mut stmt = self.conn.prepare("SELECT file_path, locked_by, lock_type, branch, expires_at FROM locks")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LockRow {
                    file_path: row.get(0)?,
                    locked_by: row.get(1)?,
                    lock_type: row.get(2)?,
                    branch: row.get(3)?,
                    expires_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn locks_for_paths(&self, paths: &[String]) -> Result<Vec<LockRow>> {
        Ok(self
            .list_locks()?
            .into_iter()
            .filter(|l| paths.iter().any(|p| p == &l.file_path))
            .collect())
    }

    // ---- review ----

    pub fn add_comment(&self, commit_hash: &Hash, author: &str, file_path: Option<&str>, body: &str, timestamp: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO comments (commit_hash, author, file_path, body, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![commit_hash, author, file_path, body, timestamp],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_comments(&self, commit_hash: &Hash, include_resolved: bool) -> Result<Vec<CommentRow>> {
        let sql = if include_resolved {
            "SELECT id, commit_hash, author, file_path, body, timestamp, resolved FROM comments WHERE commit_hash = ?1 ORDER BY timestamp"
        } else {
            "SELECT id, commit_hash, author, file_path, body, timestamp, resolved FROM comments WHERE commit_hash = ?1 AND resolved = 0 ORDER BY timestamp"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![commit_hash], |row| {
                Ok(CommentRow {
                    id: row.get(0)?,
                    commit_hash: row.get(1)?,
                    author: row.get(2)?,
                    file_path: row.get(3)?,
                    body: row.get(4)?,
                    timestamp: row.get(5)?,
                    resolved: row.get::<_, i64>(6)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn resolve_comment(&self, id: i64) -> Result<bool> {
        Ok(self.conn.execute("UPDATE comments SET resolved = 1 WHERE id = ?1", params![id])? > 0)
    }

    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        Ok(self.conn.execute("DELETE FROM comments WHERE id = ?1", params![id])? > 0)
    }

    pub fn set_approval(&self, commit_hash: &Hash, author: &str, verdict: &str, note: Option<&str>, timestamp: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO approvals (commit_hash, author, verdict, note, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(commit_hash, author) DO UPDATE SET verdict = excluded.verdict, note = excluded.note, timestamp = excluded.timestamp",
            params![commit_hash, author, verdict, note, timestamp],
        )?;
        Ok(())
    }

    pub fn list_approvals(&self, commit_hash: &Hash) -> Result<Vec<ApprovalRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, commit_hash, author, verdict, note, timestamp FROM approvals WHERE commit_hash = ?1 ORDER BY timestamp",
        )?;
        let rows = stmt
            .query_map(params![commit_hash], |row| {
                Ok(ApprovalRow {
                    id: row.get(0)?,
                    commit_hash: row.get(1)?,
                    author: row.get(2)?,
                    verdict: row.get(3)?,
                    note: row.get(4)?,
                    timestamp: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
