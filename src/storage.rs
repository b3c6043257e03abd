// Content-addressed object store: four kinds, one fanout layout, atomic writes.
//
// Grounded on the write-temp-then-rename pattern used for blob storage in the
// wider object-store corpus: content is hashed, written to a scratch file,
// fsynced, then renamed into place so a reader never observes a partial file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ForesterError, IoResultExt, Result};
use crate::hash::{self, Hash};
use crate::object::{Commit, MeshMetadata, Tree};

pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(dfm_dir: &Path) -> Result<Self> {
        for kind in [hash::KIND_BLOBS, hash::KIND_TREES, hash::KIND_COMMITS, hash::KIND_MESHES] {
            fs::create_dir_all(dfm_dir.join("objects").join(kind))
                .with_path(dfm_dir.join("objects").join(kind))?;
        }
        Ok(Self { root: dfm_dir.to_path_buf() })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, hash: &str, kind: &str) -> Result<PathBuf> {
        hash::hash_to_path(hash, &self.root, kind)
    }

    fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        let parent = path.parent().expect("fanout path always has a parent");
        fs::create_dir_all(parent).with_path(parent)?;

        let tmp = parent.join(format!(".tmp-{}", std::process::id()));
        {
            let mut f = fs::File::create(&tmp).with_path(&tmp)?;
            f.write_all(data).with_path(&tmp)?;
            f.sync_all().with_path(&tmp)?;
        }
        fs::rename(&tmp, path).with_path(path)?;
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    // ---- Blob ----

    pub fn save_blob(&self, data: &[u8], blob_hash: &Hash) -> Result<PathBuf> {
        let path = self.path(blob_hash, hash::KIND_BLOBS)?;
        if !path.exists() {
            Self::write_atomic(&path, data)?;
        }
        Ok(path)
    }

    pub fn load_blob(&self, blob_hash: &Hash) -> Result<Vec<u8>> {
        let path = self.path(blob_hash, hash::KIND_BLOBS)?;
        fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ForesterError::NoSuchObject(blob_hash.clone())
            } else {
                ForesterError::Io { path, source }
            }
        })
    }

    #[must_use]
    pub fn blob_exists(&self, blob_hash: &Hash) -> bool {
        self.path(blob_hash, hash::KIND_BLOBS).is_ok_and(|p| p.exists())
    }

    pub fn delete_blob(&self, blob_hash: &Hash) -> Result<()> {
        let path = self.path(blob_hash, hash::KIND_BLOBS)?;
        delete_and_prune(&path)
    }

    // ---- Tree ----

    pub fn save_tree(&self, tree: &Tree, tree_hash: &Hash) -> Result<PathBuf> {
        let path = self.path(tree_hash, hash::KIND_TREES)?;
        if !path.exists() {
            let json = serde_json::to_vec_pretty(&TreeDisk { hash: tree_hash.clone(), entries: tree.entries.clone() })?;
            Self::write_atomic(&path, &json)?;
        }
        Ok(path)
    }

    pub fn load_tree(&self, tree_hash: &Hash) -> Result<Tree> {
        let path = self.path(tree_hash, hash::KIND_TREES)?;
        let data = fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ForesterError::NoSuchObject(tree_hash.clone())
            } else {
                ForesterError::Io { path: path.clone(), source }
            }
        })?;
        let disk: TreeDisk = serde_json::from_slice(&data)
            .map_err(|e| ForesterError::Corrupt { path, reason: e.to_string() })?;
        Ok(Tree { entries: disk.entries })
    }

    #[must_use]
    pub fn tree_exists(&self, tree_hash: &Hash) -> bool {
        self.path(tree_hash, hash::KIND_TREES).is_ok_and(|p| p.exists())
    }

    pub fn delete_tree(&self, tree_hash: &Hash) -> Result<()> {
        let path = self.path(tree_hash, hash::KIND_TREES)?;
        delete_and_prune(&path)
    }

    // ---- Commit ----

    pub fn save_commit(&self, commit: &Commit, commit_hash: &Hash) -> Result<PathBuf> {
        let path = self.path(commit_hash, hash::KIND_COMMITS)?;
        let json = serde_json::to_vec_pretty(&CommitDisk::from_commit(commit_hash.clone(), commit))?;
        Self::write_atomic(&path, &json)?;
        Ok(path)
    }

    pub fn load_commit(&self, commit_hash: &Hash) -> Result<Commit> {
        let path = self.path(commit_hash, hash::KIND_COMMITS)?;
        let data = fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ForesterError::NoSuchObject(commit_hash.clone())
            } else {
                ForesterError::Io { path: path.clone(), source }
            }
        })?;
        let disk: CommitDisk = serde_json::from_slice(&data)
            .map_err(|e| ForesterError::Corrupt { path, reason: e.to_string() })?;
        Ok(disk.into_commit())
    }

    #[must_use]
    pub fn commit_exists(&self, commit_hash: &Hash) -> bool {
        self.path(commit_hash, hash::KIND_COMMITS).is_ok_and(|p| p.exists())
    }

    pub fn delete_commit(&self, commit_hash: &Hash) -> Result<()> {
        let path = self.path(commit_hash, hash::KIND_COMMITS)?;
        delete_and_prune(&path)
    }

    // ---- Mesh ----

    pub fn mesh_dir(&self, mesh_hash: &Hash) -> Result<PathBuf> {
        self.path(mesh_hash, hash::KIND_MESHES)
    }

    /// Creates the mesh directory (fragment + metadata + empty `textures/`) if absent.
    pub fn save_mesh(&self, mesh_hash: &Hash, fragment: &[u8], metadata: &MeshMetadata) -> Result<PathBuf> {
        let dir = self.mesh_dir(mesh_hash)?;
        fs::create_dir_all(dir.join("textures")).with_path(dir.join("textures"))?;
        if !dir.join("mesh.blend").exists() {
            Self::write_atomic(&dir.join("mesh.blend"), fragment)?;
        }
        let json = serde_json::to_vec_pretty(metadata)?;
        Self::write_atomic(&dir.join("mesh_metadata.json"), &json)?;
        Ok(dir)
    }

    pub fn load_mesh_metadata(&self, mesh_hash: &Hash) -> Result<MeshMetadata> {
        let dir = self.mesh_dir(mesh_hash)?;
        let path = dir.join("mesh_metadata.json");
        let data = fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ForesterError::NoSuchObject(mesh_hash.clone())
            } else {
                ForesterError::Io { path: path.clone(), source }
            }
        })?;
        serde_json::from_slice(&data).map_err(|e| ForesterError::Corrupt { path, reason: e.to_string() })
    }

    #[must_use]
    pub fn mesh_exists(&self, mesh_hash: &Hash) -> bool {
        self.mesh_dir(mesh_hash).is_ok_and(|d| d.join("mesh_metadata.json").exists())
    }

    pub fn delete_mesh(&self, mesh_hash: &Hash) -> Result<()> {
        let dir = self.mesh_dir(mesh_hash)?;
        if dir.exists() {
            fs::remove_dir_all(&dir).with_path(&dir)?;
        }
        prune_empty_parents(&dir);
        Ok(())
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct TreeDisk {
    hash: Hash,
    entries: Vec<crate::object::TreeEntry>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CommitDisk {
    hash: Hash,
    parent_hash: Option<Hash>,
    tree_hash: Hash,
    branch: String,
    timestamp: i64,
    message: String,
    author: String,
    #[serde(default)]
    mesh_hashes: Vec<Hash>,
    commit_type: crate::object::CommitType,
    #[serde(default)]
    selected_mesh_names: Vec<String>,
    #[serde(default)]
    export_options: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    screenshot_hash: Option<Hash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
}

impl CommitDisk {
    fn from_commit(hash: Hash, c: &Commit) -> Self {
        Self {
            hash,
            parent_hash: c.parent_hash.clone(),
            tree_hash: c.tree_hash.clone(),
            branch: c.branch.clone(),
            timestamp: c.timestamp,
            message: c.message.clone(),
            author: c.author.clone(),
            mesh_hashes: c.mesh_hashes.clone(),
            commit_type: c.commit_type,
            selected_mesh_names: c.selected_mesh_names.clone(),
            export_options: c.export_options.clone(),
            screenshot_hash: c.screenshot_hash.clone(),
            tag: c.tag.clone(),
        }
    }

    fn into_commit(self) -> Commit {
        Commit {
            parent_hash: self.parent_hash,
            tree_hash: self.tree_hash,
            branch: self.branch,
            timestamp: self.timestamp,
            message: self.message,
            author: self.author,
            mesh_hashes: self.mesh_hashes,
            commit_type: self.commit_type,
            selected_mesh_names: self.selected_mesh_names,
            export_options: self.export_options,
            screenshot_hash: self.screenshot_hash,
            tag: self.tag,
        }
    }
}

fn delete_and_prune(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_path(path)?;
    }
    prune_empty_parents(path);
    Ok(())
}

/// Best-effort `rmdir` of the two fanout parent directories; failures (non-empty,
/// already gone) are ignored per the spec's "ignore failures" contract.
fn prune_empty_parents(leaf: &Path) {
    if let Some(bb) = leaf.parent() {
        let _ = fs::remove_dir(bb);
        if let Some(aa) = bb.parent() {
            let _ = fs::remove_dir(aa);
        }
    }
}
