// Repository: ties the object store, index DB, and ignore rules together, and
// owns the iterative reachability walk shared by branch-delete, GC, and log.

use std::path::{Path, PathBuf};

use crate::db::Db;
use crate::error::{ForesterError, IoResultExt, Result};
use crate::hash::Hash;
use crate::ignore::Ignore;
use crate::refs::{self, Head};
use crate::storage::Storage;
use crate::util::{make_xxh3_hashset, Xxh3HashSet};

pub struct Repository {
    pub root: PathBuf,
    pub dfm_dir: PathBuf,
    pub storage: Storage,
    pub db: Db,
    pub ignore: Ignore,
}

impl Repository {
    pub fn init(path: &Path) -> Result<Self> {
        let dfm_dir = path.join(".DFM");
        if dfm_dir.exists() {
            return Err(ForesterError::AlreadyInitialized(path.to_path_buf()));
        }

        std::fs::create_dir_all(refs::branches_dir(&dfm_dir)).with_path(&dfm_dir)?;
        std::fs::create_dir_all(dfm_dir.join("hooks")).with_path(&dfm_dir)?;
        std::fs::create_dir_all(dfm_dir.join("stash")).with_path(&dfm_dir)?;
        refs::write_branch(&dfm_dir, "main", None)?;

        let dfmignore = dfm_dir.join(".dfmignore");
        std::fs::write(
            &dfmignore,
            "# .dfmignore: glob rules, one per line, '#' comments\n\
             # Lines ending with / ignore a directory.\n\
             # * ** ? [abc] are supported.\n",
        )
        .with_path(&dfmignore)?;

        let storage = Storage::new(&dfm_dir)?;
        let db = Db::open(&dfm_dir.join("forester.db"))?;
        let root = path.to_path_buf();
        let ignore = Ignore::load(&root, &dfm_dir)?;

        tracing::info!(path = %root.display(), "initialized repository");

        Ok(Self { root, dfm_dir, storage, db, ignore })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let dfm_dir = path.join(".DFM");
        if !dfm_dir.exists() {
            return Err(ForesterError::NotARepository(path.to_path_buf()));
        }

        let storage = Storage::new(&dfm_dir)?;
        let db = Db::open(&dfm_dir.join("forester.db"))?;
        let root = path.to_path_buf();
        let ignore = Ignore::load(&root, &dfm_dir)?;

        Ok(Self { root, dfm_dir, storage, db, ignore })
    }

    /// Finds the nearest ancestor of `start` containing `.DFM`.
    pub fn discover(start: &Path) -> Result<Self> {
        let mut dir = start.to_path_buf();
        loop {
            if dir.join(".DFM").exists() {
                return Self::open(&dir);
            }
            if !dir.pop() {
                return Err(ForesterError::NotARepository(start.to_path_buf()));
            }
        }
    }

    pub fn head(&self) -> Result<Head> {
        let branch = self.db.get_current_branch()?;
        let head = self.db.get_head()?;
        refs::resolve_head(&self.dfm_dir, &branch, head.as_ref())
    }

    /// Iterative stack walk of the parent chain, starting from `start`.
    /// No recursion regardless of history depth.
    pub fn reachable_commits(&self, start: &Hash) -> Xxh3HashSet<Hash> {
        let mut visited = make_xxh3_hashset();
        let mut stack = vec![start.clone()];

        while let Some(hash) = stack.pop() {
            if visited.contains(&hash) {
                continue;
            }
            if let Ok(commit) = self.storage.load_commit(&hash) {
                if let Some(parent) = commit.parent_hash.clone() {
                    stack.push(parent);
                }
                visited.insert(hash);
            } else {
                visited.insert(hash);
            }
        }

        visited
    }

    /// Union of reachable commits from every branch ref plus the current HEAD.
    pub fn reachable_from_all_branches(&self) -> Result<Xxh3HashSet<Hash>> {
        let mut visited = make_xxh3_hashset();
        for name in refs::list_branches(&self.dfm_dir)? {
            if let Some(hash) = refs::read_branch(&self.dfm_dir, &name)? {
                visited.extend(self.reachable_commits(&hash));
            }
        }
        if let Some(hash) = self.db.get_head()? {
            visited.extend(self.reachable_commits(&hash));
        }
        Ok(visited)
    }
}
