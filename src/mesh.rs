// Mesh-only commit support: texture deduplication against the parent commit,
// mesh metadata diffing, and the material-update callback registry.
//
// The REDESIGN FLAG in the source material replaces a module-level mutable
// callback list with an explicit registry value threaded through the
// mesh-only commit call, so there is no process-wide mutable state.

use std::collections::HashMap;

use crate::error::Result;
use crate::hash::Hash;
use crate::object::{MaterialJson, MeshMetadata, TextureEntry};
use crate::repository::Repository;

/// `(material_json, textures) -> material_json`, invoked after texture
/// reconciliation so a DCC-specific material graph can embed texture paths.
pub type MaterialHook = Box<dyn Fn(&MaterialJson, &[TextureEntry]) -> MaterialJson>;

#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<MaterialHook>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: MaterialHook) {
        self.hooks.push(hook);
    }

    #[must_use]
    pub fn apply(&self, material: &MaterialJson, textures: &[TextureEntry]) -> MaterialJson {
        self.hooks.iter().fold(material.clone(), |m, hook| hook(&m, textures))
    }
}

/// Builds `image_name -> TextureEntry` from every mesh of the parent commit.
pub fn parent_texture_map(repo: &Repository, parent_hash: Option<&Hash>) -> Result<HashMap<String, TextureEntry>> {
    let mut map = HashMap::new();
    let Some(parent_hash) = parent_hash else { return Ok(map) };
    let Ok(parent) = repo.storage.load_commit(parent_hash) else { return Ok(map) };

    for mesh_hash in &parent.mesh_hashes {
        if let Ok(metadata) = repo.storage.load_mesh_metadata(mesh_hash) {
            for tex in metadata.material_json.textures {
                map.entry(tex.image_name.clone()).or_insert(tex);
            }
        }
    }
    Ok(map)
}

/// Reconciles one mesh's textures against the parent-commit texture map:
/// unchanged-by-hash textures are marked `copied=false` and inherit the
/// previous `commit_path`; new/changed textures are marked `copied=true` with
/// a fresh `commit_path = "textures/<basename>"`.
#[must_use]
pub fn reconcile_textures(mut textures: Vec<TextureEntry>, parent_map: &HashMap<String, TextureEntry>) -> Vec<TextureEntry> {
    for tex in &mut textures {
        if let Some(prev) = parent_map.get(&tex.image_name) {
            if prev.file_hash == tex.file_hash {
                tex.copied = false;
                tex.commit_path = prev.commit_path.clone();
                continue;
            }
        }
        tex.copied = true;
        let basename = tex
            .original_path
            .rsplit('/')
            .next()
            .unwrap_or(tex.original_path.as_str())
            .to_string();
        tex.commit_path = format!("textures/{basename}");
    }
    textures
}

/// Copies every `copied=true` texture's bytes into the mesh's `textures/`
/// directory, reading from the workspace path recorded in `original_path`.
pub fn copy_new_textures(repo: &Repository, mesh_hash: &Hash, textures: &[TextureEntry]) -> Result<()> {
    let dir = repo.storage.mesh_dir(mesh_hash)?.join("textures");
    std::fs::create_dir_all(&dir).map_err(|source| crate::error::ForesterError::Io { path: dir.clone(), source })?;
    for tex in textures.iter().filter(|t| t.copied) {
        let src = repo.root.join(&tex.original_path);
        if let Ok(bytes) = std::fs::read(&src) {
            let basename = tex.commit_path.trim_start_matches("textures/");
            let dst = dir.join(basename);
            let _ = std::fs::write(dst, bytes);
        }
    }
    Ok(())
}

/// Structural diff between two mesh metadata documents: vertex/face/material
/// count deltas and added/removed/changed textures by `image_name`.
#[derive(Debug, Default, serde::Serialize)]
pub struct MeshDiff {
    pub vertex_delta: i64,
    pub face_delta: i64,
    pub material_delta: i64,
    pub added_textures: Vec<String>,
    pub removed_textures: Vec<String>,
    pub changed_textures: Vec<String>,
}

#[must_use]
pub fn diff(old: &MeshMetadata, new: &MeshMetadata) -> MeshDiff {
    let count = |json: &serde_json::Value, key: &str| -> i64 {
        json.get(key).and_then(serde_json::Value::as_array).map_or(0, Vec::len) as i64
    };

    let old_by_name: HashMap<&str, &TextureEntry> =
        old.material_json.textures.iter().map(|t| (t.image_name.as_str(), t)).collect();
    let new_by_name: HashMap<&str, &TextureEntry> =
        new.material_json.textures.iter().map(|t| (t.image_name.as_str(), t)).collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for (name, tex) in &new_by_name {
        match old_by_name.get(name) {
            None => added.push((*name).to_string()),
            Some(old_tex) if old_tex.file_hash != tex.file_hash => changed.push((*name).to_string()),
            Some(_) => {}
        }
    }
    let removed = old_by_name
        .keys()
        .filter(|n| !new_by_name.contains_key(*n))
        .map(|n| (*n).to_string())
        .collect();

    MeshDiff {
        vertex_delta: count(&new.mesh_json, "vertices") - count(&old.mesh_json, "vertices"),
        face_delta: count(&new.mesh_json, "faces") - count(&old.mesh_json, "faces"),
        material_delta: new.material_json.textures.len() as i64 - old.material_json.textures.len() as i64,
        added_textures: added,
        removed_textures: removed,
        changed_textures: changed,
    }
}
