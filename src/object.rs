// The four content-addressed object kinds and their canonical-bytes-for-hashing rules.
//
// Every hash in this module is computed in exactly one place (the `*_hash` free
// functions below) so that formatter or field-order changes elsewhere can never
// make a stored hash drift from what a fresh rehash would produce.

use serde::{Deserialize, Serialize};

use crate::hash::{compute_hash, Hash};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub hash: Hash,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Entries must already be sorted by path; this only assembles canonical bytes.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.entries).expect("tree entries always serialize")
    }

    #[must_use]
    pub fn hash(&self) -> Hash {
        compute_hash(&self.canonical_bytes())
    }

    /// True if `path` appears more than once.
    #[must_use]
    pub fn has_duplicate_paths(&self) -> bool {
        let mut paths: Vec<&str> = self.entries.iter().map(|e| e.path.as_str()).collect();
        let before = paths.len();
        paths.sort_unstable();
        paths.dedup();
        paths.len() != before
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum CommitType {
    #[default]
    Project,
    MeshOnly,
}


#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Commit {
    pub parent_hash: Option<Hash>,
    pub tree_hash: Hash,
    pub branch: String,
    pub timestamp: i64,
    pub message: String,
    pub author: String,
    #[serde(default)]
    pub mesh_hashes: Vec<Hash>,
    #[serde(default)]
    pub commit_type: CommitType,
    #[serde(default)]
    pub selected_mesh_names: Vec<String>,
    #[serde(default)]
    pub export_options: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_hash: Option<Hash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Commit {
    /// `commit_type ‖ parent_hash ‖ tree_hash ‖ timestamp ‖ message ‖
    ///  sorted(mesh_hashes) ‖ sorted(selected_mesh_names) ‖ export_options(JSON sort_keys)`
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let kind = match self.commit_type {
            CommitType::Project => "project",
            CommitType::MeshOnly => "mesh_only",
        };
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(self.parent_hash.as_deref().unwrap_or("").as_bytes());
        buf.extend_from_slice(self.tree_hash.as_bytes());
        buf.extend_from_slice(self.timestamp.to_string().as_bytes());
        buf.extend_from_slice(self.message.as_bytes());

        let mut meshes = self.mesh_hashes.clone();
        meshes.sort_unstable();
        for h in &meshes {
            buf.extend_from_slice(h.as_bytes());
        }

        let mut names = self.selected_mesh_names.clone();
        names.sort_unstable();
        for n in &names {
            buf.extend_from_slice(n.as_bytes());
        }

        // BTreeMap gives us sort_keys-equivalent JSON without reaching for a
        // separate canonical-json crate: keys are ordered on insertion here.
        let sorted_options: std::collections::BTreeMap<&String, &serde_json::Value> =
            self.export_options.iter().collect();
        buf.extend_from_slice(
            serde_json::to_vec(&sorted_options).expect("export_options always serialize").as_slice(),
        );

        buf
    }

    #[must_use]
    pub fn hash(&self) -> Hash {
        compute_hash(&self.canonical_bytes())
    }
}

/// A single texture entry inside a mesh's material description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureEntry {
    pub node_name: String,
    pub image_name: String,
    pub original_path: String,
    pub file_hash: Hash,
    pub copied: bool,
    pub commit_path: String,
    #[serde(default)]
    pub is_packed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialJson {
    #[serde(default)]
    pub textures: Vec<TextureEntry>,
    #[serde(default)]
    pub node_tree: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshMetadata {
    #[serde(default)]
    pub mesh_json: serde_json::Value,
    #[serde(default)]
    pub material_json: MaterialJson,
    pub object_name: String,
}

impl MeshMetadata {
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("mesh metadata always serializes")
    }
}

/// `SHA256(fragment_bytes) ‖ JSON(metadata, sort_keys)`, then SHA-256 of that.
#[must_use]
pub fn mesh_hash(fragment_bytes: &[u8], metadata: &MeshMetadata) -> Hash {
    let fragment_hash = compute_hash(fragment_bytes);
    let mut buf = Vec::new();
    buf.extend_from_slice(fragment_hash.as_bytes());
    buf.extend_from_slice(&metadata.canonical_bytes());
    compute_hash(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, hash: &str) -> TreeEntry {
        TreeEntry { path: path.to_string(), kind: "blob".to_string(), hash: hash.to_string(), size: 0 }
    }

    #[test]
    fn tree_hash_is_order_sensitive() {
        let a = Tree { entries: vec![entry("a.rs", "1"), entry("b.rs", "2")] };
        let b = Tree { entries: vec![entry("b.rs", "2"), entry("a.rs", "1")] };
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn tree_hash_is_deterministic() {
        let a = Tree { entries: vec![entry("a.rs", "1")] };
        let b = Tree { entries: vec![entry("a.rs", "1")] };
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn tree_detects_duplicate_paths() {
        let clean = Tree { entries: vec![entry("a.rs", "1"), entry("b.rs", "2")] };
        assert!(!clean.has_duplicate_paths());
        let dup = Tree { entries: vec![entry("a.rs", "1"), entry("a.rs", "2")] };
        assert!(dup.has_duplicate_paths());
    }

    #[test]
    fn commit_hash_ignores_mesh_hash_order() {
        let mut c1 = Commit { tree_hash: "t".to_string(), ..Default::default() };
        c1.mesh_hashes = vec!["b".to_string(), "a".to_string()];
        let mut c2 = Commit { tree_hash: "t".to_string(), ..Default::default() };
        c2.mesh_hashes = vec!["a".to_string(), "b".to_string()];
        assert_eq!(c1.hash(), c2.hash());
    }

    #[test]
    fn commit_hash_changes_with_parent() {
        let c1 = Commit { tree_hash: "t".to_string(), parent_hash: None, ..Default::default() };
        let c2 = Commit { tree_hash: "t".to_string(), parent_hash: Some("p".to_string()), ..Default::default() };
        assert_ne!(c1.hash(), c2.hash());
    }

    #[test]
    fn mesh_hash_is_deterministic_and_content_sensitive() {
        let meta = MeshMetadata { object_name: "Cube".to_string(), ..Default::default() };
        let h1 = mesh_hash(b"blend-bytes", &meta);
        let h2 = mesh_hash(b"blend-bytes", &meta);
        assert_eq!(h1, h2);

        let h3 = mesh_hash(b"different-bytes", &meta);
        assert_ne!(h1, h3);
    }
}
