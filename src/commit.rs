// Ref & State Machine (C6): commit operations, both variants.

use crate::error::{ForesterError, Result};
use crate::hash::Hash;
use crate::hooks::{self, HookEnv};
use crate::lock;
use crate::mesh::{self, HookRegistry};
use crate::object::{Commit, CommitType, MeshMetadata, TextureEntry, TreeEntry};
use crate::refs;
use crate::repository::Repository;
use crate::workspace::{self, scan_and_build_tree_for_project_commit};

/// Input for one mesh in a mesh-only commit. The fragment bytes, geometry
/// JSON, and raw texture list are produced by the DCC bridge (external
/// collaborator); this core only dedups, hashes, and persists them.
pub struct MeshInput {
    pub object_name: String,
    pub fragment: Vec<u8>,
    pub mesh_json: serde_json::Value,
    pub node_tree: serde_json::Value,
    pub textures: Vec<TextureEntry>,
}

/// Recognized `export_options` keys for mesh-only commits (§4.6); a key
/// absent from the map defaults to included.
const RECOGNIZED_EXPORT_KEYS: [&str; 5] = ["vertices", "faces", "uv", "normals", "materials"];

/// Drops any recognized geometry key whose `export_options` entry is `false`,
/// leaving unrecognized keys and missing (default-true) keys untouched.
fn filter_mesh_json(mesh_json: serde_json::Value, export_options: &serde_json::Map<String, serde_json::Value>) -> serde_json::Value {
    let serde_json::Value::Object(mut map) = mesh_json else { return mesh_json };
    for key in RECOGNIZED_EXPORT_KEYS {
        let keep = export_options.get(key).and_then(serde_json::Value::as_bool).unwrap_or(true);
        if !keep {
            map.remove(key);
        }
    }
    serde_json::Value::Object(map)
}

fn parent_of_branch(repo: &Repository, branch: &str) -> Result<Option<Hash>> {
    if refs::branch_exists(&repo.dfm_dir, branch) {
        refs::read_branch(&repo.dfm_dir, branch)
    } else {
        Ok(None)
    }
}

fn advance_branch(repo: &Repository, branch: &str, commit_hash: &Hash) -> Result<()> {
    refs::write_branch(&repo.dfm_dir, branch, Some(commit_hash))?;
    repo.db.set_branch_and_head(branch, Some(commit_hash))
}

fn hook_env(repo: &Repository, branch: &str, author: &str, message: &str, commit_hash: &str) -> HookEnv {
    HookEnv {
        branch: branch.to_string(),
        author: author.to_string(),
        message: message.to_string(),
        commit_hash: commit_hash.to_string(),
        target: branch.to_string(),
        repo_path: repo.root.to_string_lossy().to_string(),
    }
}

/// Project-variant commit. Returns `Ok(None)` when the workspace is unchanged
/// (the spec's "no changes" null result, never an error).
pub fn commit_project(repo: &Repository, message: &str, author: &str, check_locks: bool) -> Result<Option<Hash>> {
    let branch = repo.db.get_current_branch()?;
    let parent_hash = parent_of_branch(repo, &branch)?;
    let parent_tree_hash = match &parent_hash {
        Some(h) => Some(repo.storage.load_commit(h)?.tree_hash),
        None => None,
    };

    let tree = scan_and_build_tree_for_project_commit(repo)?;
    let tree_hash = tree.hash();

    if workspace::trees_equal(&tree_hash, parent_tree_hash.as_deref()) {
        return Ok(None);
    }

    if check_locks {
        let paths: Vec<String> = tree.entries.iter().map(|e| e.path.clone()).collect();
        lock::ensure_no_conflicts(repo, &paths, author)?;
    }

    hooks::run_pre_commit_hook(&repo.dfm_dir, &hook_env(repo, &branch, author, message, ""))?;

    repo.storage.save_tree(&tree, &tree_hash)?;
    repo.db.add_tree(&tree_hash, &serde_json::to_string(&tree.entries)?)?;

    let commit = Commit {
        parent_hash: parent_hash.clone(),
        tree_hash: tree_hash.clone(),
        branch: branch.clone(),
        timestamp: workspace::now(),
        message: message.to_string(),
        author: author.to_string(),
        commit_type: CommitType::Project,
        ..Commit::default()
    };
    let commit_hash = commit.hash();
    repo.storage.save_commit(&commit, &commit_hash)?;
    repo.db.add_commit(
        &commit_hash,
        &branch,
        parent_hash.as_ref(),
        commit.timestamp,
        message,
        &tree_hash,
        author,
        "project",
        &[],
        &commit.export_options,
    )?;

    advance_branch(repo, &branch, &commit_hash)?;

    hooks::run_post_commit_hook(&repo.dfm_dir, &hook_env(repo, &branch, author, message, &commit_hash));

    tracing::info!(commit = %commit_hash, branch = %branch, "created project commit");
    Ok(Some(commit_hash))
}

/// Mesh-only variant. `meshes` are produced by the external DCC bridge.
/// `export_options` recognizes `vertices`/`faces`/`uv`/`normals`/`materials`
/// (§4.6); each selected mesh's geometry JSON is filtered by it before
/// hashing/storage, and the map is recorded on the resulting `Commit` (it is
/// part of the commit's canonical hash, §3).
pub fn commit_mesh_only(
    repo: &Repository,
    message: &str,
    author: &str,
    meshes: Vec<MeshInput>,
    export_options: serde_json::Map<String, serde_json::Value>,
    registry: &HookRegistry,
) -> Result<Option<Hash>> {
    let branch = repo.db.get_current_branch()?;
    let parent_hash = parent_of_branch(repo, &branch)?;
    let parent_texture_map = mesh::parent_texture_map(repo, parent_hash.as_ref())?;

    let mut tree_entries = Vec::new();
    let mut mesh_hashes = Vec::new();
    let mut selected_mesh_names = Vec::new();

    for input in meshes {
        let textures = mesh::reconcile_textures(input.textures, &parent_texture_map);
        let material_json = crate::object::MaterialJson { textures: textures.clone(), node_tree: input.node_tree };
        let material_json = registry.apply(&material_json, &textures);
        let mesh_json = filter_mesh_json(input.mesh_json, &export_options);

        let metadata = MeshMetadata {
            mesh_json,
            material_json,
            object_name: input.object_name.clone(),
        };
        let mesh_hash = crate::object::mesh_hash(&input.fragment, &metadata);

        repo.storage.save_mesh(&mesh_hash, &input.fragment, &metadata)?;
        // Reconcile textures against stored state regardless of whether the
        // mesh hash already existed, per the spec's mesh-only commit step.
        mesh::copy_new_textures(repo, &mesh_hash, &textures)?;

        if !repo.db.mesh_exists(&mesh_hash)? {
            repo.db.add_mesh(&mesh_hash, &format!("meshes/{}", &mesh_hash[..8]), workspace::now())?;
        }

        let prefix = format!("meshes/{}", &mesh_hash[..8]);
        let fragment_hash = crate::hash::compute_hash(&input.fragment);
        repo.storage.save_blob(&input.fragment, &fragment_hash)?;
        tree_entries.push(TreeEntry {
            path: format!("{prefix}/mesh.blend"),
            kind: "blob".to_string(),
            hash: fragment_hash,
            size: input.fragment.len() as u64,
        });

        let metadata_bytes = serde_json::to_vec(&metadata)?;
        let metadata_hash = crate::hash::compute_hash(&metadata_bytes);
        repo.storage.save_blob(&metadata_bytes, &metadata_hash)?;
        tree_entries.push(TreeEntry {
            path: format!("{prefix}/mesh_metadata.json"),
            kind: "blob".to_string(),
            hash: metadata_hash,
            size: metadata_bytes.len() as u64,
        });

        mesh_hashes.push(mesh_hash);
        selected_mesh_names.push(input.object_name);
    }

    tree_entries.sort_by(|a, b| a.path.cmp(&b.path));
    let tree = crate::object::Tree { entries: tree_entries };
    let tree_hash = tree.hash();

    let parent_tree_hash = match &parent_hash {
        Some(h) => Some(repo.storage.load_commit(h)?.tree_hash),
        None => None,
    };
    if workspace::trees_equal(&tree_hash, parent_tree_hash.as_deref()) {
        return Ok(None);
    }

    hooks::run_pre_commit_hook(&repo.dfm_dir, &hook_env(repo, &branch, author, message, ""))?;

    repo.storage.save_tree(&tree, &tree_hash)?;
    repo.db.add_tree(&tree_hash, &serde_json::to_string(&tree.entries)?)?;

    let commit = Commit {
        parent_hash: parent_hash.clone(),
        tree_hash: tree_hash.clone(),
        branch: branch.clone(),
        timestamp: workspace::now(),
        message: message.to_string(),
        author: author.to_string(),
        mesh_hashes,
        commit_type: CommitType::MeshOnly,
        selected_mesh_names,
        export_options,
        ..Commit::default()
    };
    let commit_hash = commit.hash();
    repo.storage.save_commit(&commit, &commit_hash)?;
    repo.db.add_commit(
        &commit_hash,
        &branch,
        parent_hash.as_ref(),
        commit.timestamp,
        message,
        &tree_hash,
        author,
        "mesh_only",
        &commit.selected_mesh_names,
        &commit.export_options,
    )?;

    advance_branch(repo, &branch, &commit_hash)?;
    hooks::run_post_commit_hook(&repo.dfm_dir, &hook_env(repo, &branch, author, message, &commit_hash));

    tracing::info!(commit = %commit_hash, branch = %branch, "created mesh-only commit");
    Ok(Some(commit_hash))
}

/// Explicit delete, distinct from GC: refuses a commit that is any branch's
/// HEAD unless `force`; never cascades to the commit's tree/blobs/meshes.
pub fn delete_commit(repo: &Repository, hash: &Hash, force: bool) -> Result<()> {
    if !repo.storage.commit_exists(hash) {
        return Err(ForesterError::NoSuchObject(hash.clone()));
    }

    if !force {
        for name in refs::list_branches(&repo.dfm_dir)? {
            if refs::read_branch(&repo.dfm_dir, &name)?.as_deref() == Some(hash.as_str()) {
                return Err(ForesterError::CommitIsBranchHead {
                    hash: hash.clone(),
                    branch: name,
                });
            }
        }
    }

    repo.storage.delete_commit(hash)?;
    repo.db.delete_commit(hash)?;
    Ok(())
}
