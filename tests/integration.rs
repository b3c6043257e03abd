use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use forester::object::TextureEntry;
use forester::repository::Repository;
use forester::{branch, checkout, commit, gc, mesh, rebuild, stash, tag, workspace};

fn setup() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    Repository::init(&root).unwrap();
    (dir, root)
}

fn open(root: &Path) -> Repository {
    Repository::open(root).unwrap()
}

fn write_file(root: &Path, rel: &str, content: &[u8]) {
    let abs = root.join(rel);
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&abs, content).unwrap();
}

fn read_file(root: &Path, rel: &str) -> Vec<u8> {
    fs::read(root.join(rel)).unwrap()
}

fn file_exists(root: &Path, rel: &str) -> bool {
    root.join(rel).exists()
}

fn commit_all(root: &Path, message: &str) -> forester::hash::Hash {
    let repo = open(root);
    commit::commit_project(&repo, message, "test", false).unwrap().expect("expected a commit")
}

//
// Init
//

#[test]
fn init_creates_layout() {
    let (_dir, root) = setup();
    assert!(root.join(".DFM").exists());
    assert!(root.join(".DFM/refs/branches/main").exists());
    assert!(root.join(".DFM/.dfmignore").exists());
    assert!(root.join(".DFM/forester.db").exists());
}

#[test]
fn init_twice_fails() {
    let (_dir, root) = setup();
    assert!(Repository::init(&root).is_err());
}

//
// Commit
//

#[test]
fn commit_advances_branch_head() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"v1");
    let h1 = commit_all(&root, "first");

    write_file(&root, "file.rs", b"v2");
    let h2 = commit_all(&root, "second");

    assert_ne!(h1, h2);
    let repo = open(&root);
    assert_eq!(repo.head().unwrap().commit(), Some(&h2));
}

#[test]
fn commit_with_no_changes_is_noop() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"content");
    commit_all(&root, "first");

    let repo = open(&root);
    let result = commit::commit_project(&repo, "nothing changed", "test", false).unwrap();
    assert!(result.is_none());
}

#[test]
fn commit_project_excludes_meshes_directory() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"content");
    write_file(&root, "meshes/abcd1234/mesh.blend", b"not a real blob, just workspace clutter");
    let hash = commit_all(&root, "project commit alongside a meshes/ directory");

    let repo = open(&root);
    let commit = repo.storage.load_commit(&hash).unwrap();
    let tree = repo.storage.load_tree(&commit.tree_hash).unwrap();
    assert!(tree.entries.iter().all(|e| !e.path.starts_with("meshes/")), "meshes/ must not be scanned into a project commit's tree");
    assert_eq!(tree.entries.len(), 1);
    assert_eq!(tree.entries[0].path, "file.rs");
}

#[test]
fn commit_stores_reachable_tree() {
    let (_dir, root) = setup();
    write_file(&root, "src/main.rs", b"fn main() {}");
    write_file(&root, "README.md", b"# Readme");
    let hash = commit_all(&root, "init");

    let repo = open(&root);
    let commit = repo.storage.load_commit(&hash).unwrap();
    let tree = repo.storage.load_tree(&commit.tree_hash).unwrap();
    assert!(tree.entries.iter().any(|e| e.path == "src/main.rs"));
    assert!(tree.entries.iter().any(|e| e.path == "README.md"));
}

#[test]
fn delete_commit_refuses_branch_head_without_force() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"content");
    let hash = commit_all(&root, "init");

    let repo = open(&root);
    let err = commit::delete_commit(&repo, &hash, false).unwrap_err();
    assert!(
        matches!(err, forester::error::ForesterError::CommitIsBranchHead { .. }),
        "refusing to delete a branch's HEAD must not be reported as an invalid-name error"
    );

    commit::delete_commit(&repo, &hash, true).unwrap();
    assert!(!repo.storage.commit_exists(&hash));
}

//
// Branch
//

#[test]
fn branch_create_and_list() {
    let (_dir, root) = setup();
    write_file(&root, "f.rs", b"x");
    commit_all(&root, "init");

    let repo = open(&root);
    branch::create(&repo, "feature", None).unwrap();
    assert!(root.join(".DFM/refs/branches/feature").exists());
}

#[test]
fn branch_delete_refuses_current_head() {
    let (_dir, root) = setup();
    write_file(&root, "f.rs", b"x");
    commit_all(&root, "init");

    let repo = open(&root);
    assert!(branch::delete(&repo, "main", false).is_err());
}

#[test]
fn branch_delete_unreachable_commit_requires_force() {
    let (_dir, root) = setup();
    write_file(&root, "f.rs", b"x");
    commit_all(&root, "init");

    let repo = open(&root);
    branch::create(&repo, "feature", None).unwrap();
    checkout::checkout(&repo, "feature", false).unwrap();

    write_file(&root, "f.rs", b"y");
    commit_all(&root, "on feature");

    let repo = open(&root);
    checkout::checkout(&repo, "main", false).unwrap();

    let repo = open(&root);
    assert!(branch::delete(&repo, "feature", false).is_err());

    let repo = open(&root);
    branch::delete(&repo, "feature", true).unwrap();
    assert!(!root.join(".DFM/refs/branches/feature").exists());
}

//
// Checkout
//

#[test]
fn checkout_restores_previous_branch_contents() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"v1");
    commit_all(&root, "v1");

    let repo = open(&root);
    branch::create(&repo, "feature", None).unwrap();
    checkout::checkout(&repo, "feature", false).unwrap();

    write_file(&root, "file.rs", b"v2");
    commit_all(&root, "v2 on feature");

    let repo = open(&root);
    checkout::checkout(&repo, "main", false).unwrap();
    assert_eq!(read_file(&root, "file.rs"), b"v1");
}

#[test]
fn checkout_empty_branch_returns_none() {
    let (_dir, root) = setup();
    let repo = open(&root);
    let result = checkout::checkout(&repo, "main", false).unwrap();
    assert!(result.is_none());
}

#[test]
fn checkout_refuses_with_uncommitted_changes_unless_forced() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"v1");
    commit_all(&root, "v1");

    let repo = open(&root);
    branch::create(&repo, "feature", None).unwrap();

    write_file(&root, "file.rs", b"dirty");
    let repo = open(&root);
    assert!(checkout::checkout(&repo, "feature", false).is_err());

    let repo = open(&root);
    assert!(checkout::checkout(&repo, "feature", true).is_ok());
}

//
// Stash
//

#[test]
fn stash_create_and_apply_round_trip() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"original");
    commit_all(&root, "base");

    write_file(&root, "file.rs", b"modified");
    let repo = open(&root);
    let hash = stash::create(&repo, "wip").unwrap().expect("expected a stash");
    assert_eq!(read_file(&root, "file.rs"), b"original");

    let repo = open(&root);
    stash::apply(&repo, &hash, false).unwrap();
    assert_eq!(read_file(&root, "file.rs"), b"modified");
}

#[test]
fn stash_with_no_changes_is_noop() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"content");
    commit_all(&root, "base");

    let repo = open(&root);
    let result = stash::create(&repo, "nothing").unwrap();
    assert!(result.is_none());
}

//
// Tag
//

#[test]
fn tag_create_show_delete() {
    let (_dir, root) = setup();
    write_file(&root, "f.rs", b"x");
    let hash = commit_all(&root, "init");

    let repo = open(&root);
    tag::create(&repo, "v1.0", None).unwrap();
    assert_eq!(tag::show(&repo, "v1.0").unwrap(), hash);

    tag::delete(&repo, "v1.0").unwrap();
    assert!(tag::show(&repo, "v1.0").is_err());
}

//
// Status / workspace
//

#[test]
fn status_detects_clean_workspace() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"content");
    let hash = commit_all(&root, "init");

    let repo = open(&root);
    let tree = workspace::scan_and_build_tree(&repo).unwrap();
    let head_tree = repo.storage.load_commit(&hash).unwrap().tree_hash;
    assert!(workspace::trees_equal(&tree.hash(), Some(&head_tree)));
}

#[test]
fn status_detects_dirty_workspace() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"content");
    let hash = commit_all(&root, "init");

    write_file(&root, "file.rs", b"changed");
    let repo = open(&root);
    let tree = workspace::scan_and_build_tree(&repo).unwrap();
    let head_tree = repo.storage.load_commit(&hash).unwrap().tree_hash;
    assert!(!workspace::trees_equal(&tree.hash(), Some(&head_tree)));
}

//
// Garbage collection
//

#[test]
fn gc_keeps_reachable_objects() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"content");
    let hash = commit_all(&root, "init");

    let repo = open(&root);
    let stats = gc::gc(&repo, false).unwrap();
    assert_eq!(stats.commits_removed, 0);
    assert!(repo.storage.commit_exists(&hash));
}

#[test]
fn gc_removes_unreachable_commit_after_branch_delete() {
    let (_dir, root) = setup();
    write_file(&root, "f.rs", b"x");
    commit_all(&root, "init");

    let repo = open(&root);
    branch::create(&repo, "feature", None).unwrap();
    checkout::checkout(&repo, "feature", false).unwrap();
    write_file(&root, "f.rs", b"y");
    let orphan = commit_all(&root, "on feature");

    let repo = open(&root);
    checkout::checkout(&repo, "main", false).unwrap();
    let repo = open(&root);
    branch::delete(&repo, "feature", true).unwrap();

    let repo = open(&root);
    let stats = gc::gc(&repo, false).unwrap();
    assert_eq!(stats.commits_removed, 1);
    assert!(!repo.storage.commit_exists(&orphan));
}

//
// Rebuild
//

#[test]
fn rebuild_restores_commits_from_object_store() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"content");
    let hash = commit_all(&root, "init");

    let repo = open(&root);
    fs::remove_file(repo.dfm_dir.join("forester.db")).unwrap();
    // Db::open recreates an empty schema on missing file.
    let repo = open(&root);
    let report = rebuild::rebuild(&repo, true).unwrap();
    assert!(report.commits_restored >= 1);

    let repo = open(&root);
    let commit = repo.db.get_commit(&hash).unwrap();
    assert!(commit.is_some());
}

#[test]
fn rebuild_discards_stale_rows_with_no_object_on_disk() {
    let (_dir, root) = setup();
    write_file(&root, "file.rs", b"content");
    commit_all(&root, "init");

    let repo = open(&root);
    let stale_hash = forester::hash::compute_hash(b"an object that was never actually stored");
    repo.db
        .add_commit(&stale_hash, "main", None, 0, "stale", &stale_hash, "nobody", "project", &[], &serde_json::Map::new())
        .unwrap();
    assert!(repo.db.get_commit(&stale_hash).unwrap().is_some());

    rebuild::rebuild(&repo, true).unwrap();

    let repo = open(&root);
    assert!(repo.db.get_commit(&stale_hash).unwrap().is_none(), "rebuild must reinitialize the schema, not merge into stale rows");
}

//
// Full workflow
//

#[test]
fn full_branch_and_stash_workflow() {
    let (_dir, root) = setup();

    write_file(&root, "src/main.rs", b"fn main() {}");
    write_file(&root, "README.md", b"# Project");
    commit_all(&root, "initial commit");

    let repo = open(&root);
    branch::create(&repo, "feature", None).unwrap();
    checkout::checkout(&repo, "feature", false).unwrap();

    write_file(&root, "src/feature.rs", b"pub fn feature() {}");
    commit_all(&root, "add feature");

    write_file(&root, "src/wip.rs", b"// work in progress");
    let repo = open(&root);
    let stash_hash = stash::create(&repo, "mid-work").unwrap().expect("expected a stash");
    assert!(!file_exists(&root, "src/wip.rs"));

    let repo = open(&root);
    checkout::checkout(&repo, "main", false).unwrap();
    assert!(!file_exists(&root, "src/feature.rs"));
    assert_eq!(read_file(&root, "src/main.rs"), b"fn main() {}");

    let repo = open(&root);
    checkout::checkout(&repo, "feature", false).unwrap();
    let repo = open(&root);
    stash::apply(&repo, &stash_hash, false).unwrap();
    assert!(file_exists(&root, "src/wip.rs"));
}

//
// Mesh-only commits
//

fn texture(image_name: &str, path: &str, bytes: &[u8]) -> TextureEntry {
    TextureEntry {
        node_name: format!("{image_name}_node"),
        image_name: image_name.to_string(),
        original_path: path.to_string(),
        file_hash: forester::hash::compute_hash(bytes),
        copied: false,
        commit_path: String::new(),
        is_packed: false,
    }
}

fn mesh_input(root: &Path, name: &str, texture_bytes: &[u8]) -> commit::MeshInput {
    write_file(root, "textures/rock.png", texture_bytes);
    commit::MeshInput {
        object_name: name.to_string(),
        fragment: format!("fragment-bytes-for-{name}").into_bytes(),
        mesh_json: serde_json::json!({"vertices": [1, 2, 3], "faces": [1]}),
        node_tree: serde_json::json!({}),
        textures: vec![texture("rock_albedo", "textures/rock.png", texture_bytes)],
    }
}

#[test]
fn mesh_only_commit_dedups_unchanged_texture_across_commits() {
    let (_dir, root) = setup();
    let registry = mesh::HookRegistry::new();

    let repo = open(&root);
    let input = mesh_input(&root, "Rock", b"shared-texture-bytes");
    let first_hash = commit::commit_mesh_only(&repo, "first mesh commit", "test", vec![input], serde_json::Map::new(), &registry)
        .unwrap()
        .expect("expected a commit");
    let first_commit = repo.storage.load_commit(&first_hash).unwrap();
    let first_mesh_hash = first_commit.mesh_hashes[0].clone();
    let first_metadata = repo.storage.load_mesh_metadata(&first_mesh_hash).unwrap();
    assert!(first_metadata.material_json.textures[0].copied);
    let stored_path = first_metadata.material_json.textures[0].commit_path.clone();
    assert!(repo.storage.mesh_dir(&first_mesh_hash).unwrap().join(&stored_path).exists());

    // Second mesh-only commit selects the same object with the same texture bytes;
    // dedup is decided against the PARENT commit's meshes (§4.6).
    let repo = open(&root);
    let input2 = mesh_input(&root, "Rock", b"shared-texture-bytes");
    let second_hash = commit::commit_mesh_only(&repo, "second mesh commit", "test", vec![input2], serde_json::Map::new(), &registry)
        .unwrap()
        .expect("expected a second commit");
    assert_ne!(first_hash, second_hash);
    let second_commit = repo.storage.load_commit(&second_hash).unwrap();
    let second_mesh_hash = second_commit.mesh_hashes[0].clone();
    let second_metadata = repo.storage.load_mesh_metadata(&second_mesh_hash).unwrap();
    let tex = &second_metadata.material_json.textures[0];
    assert!(!tex.copied, "unchanged texture is not re-copied once a parent commit already has it");
    assert_eq!(tex.commit_path, stored_path, "inherited commit_path is identical by hash, not re-derived");

    // A third commit against that same settled state is now a true no-op: the
    // texture's dedup bookkeeping no longer changes between calls.
    let repo = open(&root);
    let input3 = mesh_input(&root, "Rock", b"shared-texture-bytes");
    let third = commit::commit_mesh_only(&repo, "third mesh commit", "test", vec![input3], serde_json::Map::new(), &registry).unwrap();
    assert!(third.is_none(), "once dedup state has settled, re-committing identical input is a no-op");
}

#[test]
fn checkout_materializes_mesh_fragment_and_textures() {
    let (_dir, root) = setup();
    let registry = mesh::HookRegistry::new();
    let repo = open(&root);
    let input = mesh_input(&root, "Rock", b"fragment-texture-bytes");
    let commit_hash = commit::commit_mesh_only(&repo, "mesh commit", "test", vec![input], serde_json::Map::new(), &registry)
        .unwrap()
        .expect("expected a commit");

    // Simulate a clean checkout onto the same commit from an empty workspace.
    fs::remove_dir_all(root.join("textures")).unwrap();
    let repo = open(&root);
    checkout::checkout(&repo, &commit_hash, true).unwrap();

    let commit = repo.storage.load_commit(&commit_hash).unwrap();
    let mesh_hash = &commit.mesh_hashes[0];
    let prefix = format!("meshes/{}", &mesh_hash[..8]);
    assert!(file_exists(&root, &format!("{prefix}/mesh.blend")));
    assert!(file_exists(&root, &format!("{prefix}/mesh_metadata.json")));
    assert!(file_exists(&root, &format!("{prefix}/textures/rock.png")));
}

#[test]
fn mesh_only_commit_applies_export_options_to_geometry_and_hash() {
    let (_dir, root) = setup();
    let registry = mesh::HookRegistry::new();

    let mut drop_uv = serde_json::Map::new();
    drop_uv.insert("uv".to_string(), serde_json::Value::Bool(false));

    let repo = open(&root);
    let mut input = mesh_input(&root, "Rock", b"export-options-texture");
    input.mesh_json = serde_json::json!({"vertices": [1, 2, 3], "faces": [1], "uv": [0.0, 1.0]});
    let hash_with_uv_dropped =
        commit::commit_mesh_only(&repo, "geometry subset", "test", vec![input], drop_uv.clone(), &registry)
            .unwrap()
            .expect("expected a commit");
    let commit_a = repo.storage.load_commit(&hash_with_uv_dropped).unwrap();
    assert_eq!(commit_a.export_options, drop_uv);
    let metadata_a = repo.storage.load_mesh_metadata(&commit_a.mesh_hashes[0]).unwrap();
    assert!(!metadata_a.mesh_json.as_object().unwrap().contains_key("uv"));
    assert!(metadata_a.mesh_json.as_object().unwrap().contains_key("vertices"));

    // Identical geometry, but with the unrecognized/default options (nothing
    // filtered) produces a different mesh_json and therefore a different hash.
    let (_dir2, root2) = setup();
    let registry2 = mesh::HookRegistry::new();
    let repo2 = open(&root2);
    let mut input2 = mesh_input(&root2, "Rock", b"export-options-texture");
    input2.mesh_json = serde_json::json!({"vertices": [1, 2, 3], "faces": [1], "uv": [0.0, 1.0]});
    let hash_with_everything = commit::commit_mesh_only(&repo2, "full geometry", "test", vec![input2], serde_json::Map::new(), &registry2)
        .unwrap()
        .expect("expected a commit");
    let commit_b = repo2.storage.load_commit(&hash_with_everything).unwrap();
    let metadata_b = repo2.storage.load_mesh_metadata(&commit_b.mesh_hashes[0]).unwrap();
    assert!(metadata_b.mesh_json.as_object().unwrap().contains_key("uv"));
    assert_ne!(commit_a.mesh_hashes[0], commit_b.mesh_hashes[0]);
    assert_ne!(hash_with_uv_dropped, hash_with_everything);
}
