// SHA-256 content addressing and the 2+2 fanout path mapper.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{ForesterError, Result};

/// Hex-encoded SHA-256 digest. Kept as a string (not `[u8; 32]`) since every
/// on-disk and DB representation is hex text and conversions would otherwise
/// happen at every boundary.
pub type Hash = String;

#[must_use]
pub fn compute_hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Streams a file through SHA-256 in fixed chunks rather than reading it whole.
pub fn compute_file_hash(path: &Path) -> Result<Hash> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)
        .map_err(|source| ForesterError::Io { path: path.to_path_buf(), source })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|source| ForesterError::Io { path: path.to_path_buf(), source })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub const KIND_BLOBS: &str = "blobs";
pub const KIND_TREES: &str = "trees";
pub const KIND_COMMITS: &str = "commits";
pub const KIND_MESHES: &str = "meshes";

/// `base/objects/<kind>/aa/bb/<rest>`. For meshes the returned path is a
/// directory; for blobs/trees/commits it is a file.
pub fn hash_to_path(hash: &str, base: &Path, kind: &str) -> Result<PathBuf> {
    if hash.len() < 4 {
        return Err(ForesterError::Corrupt {
            path: base.to_path_buf(),
            reason: format!("hash string too short: '{hash}'"),
        });
    }
    let (first, rest) = hash.split_at(2);
    let (second, rest) = rest.split_at(2);
    Ok(base.join("objects").join(kind).join(first).join(second).join(rest))
}

/// Recovers a hash from the three trailing path components of a fanout path,
/// as produced by walking `objects/<kind>/aa/bb/rest`.
#[must_use]
pub fn hash_from_path_components(aa: &str, bb: &str, rest: &str) -> Hash {
    format!("{aa}{bb}{rest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_hash_is_deterministic_and_content_sensitive() {
        let h1 = compute_hash(b"hello");
        let h2 = compute_hash(b"hello");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, compute_hash(b"world"));
    }

    #[test]
    fn hash_to_path_uses_2_plus_2_fanout() {
        let hash = compute_hash(b"content");
        let path = hash_to_path(&hash, Path::new("/root"), KIND_BLOBS).unwrap();
        let rel = path.strip_prefix("/root/objects/blobs").unwrap();
        let parts: Vec<_> = rel.components().collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].as_os_str().len(), 2);
        assert_eq!(parts[1].as_os_str().len(), 2);
        assert_eq!(parts[2].as_os_str().len(), 60);
    }

    #[test]
    fn hash_to_path_rejects_short_hash() {
        assert!(hash_to_path("abc", Path::new("/root"), KIND_BLOBS).is_err());
    }

    #[test]
    fn hash_from_path_components_reassembles_hash() {
        let hash = compute_hash(b"content");
        let path = hash_to_path(&hash, Path::new("/root"), KIND_BLOBS).unwrap();
        let rel = path.strip_prefix("/root/objects/blobs").unwrap();
        let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_str().unwrap()).collect();
        assert_eq!(hash_from_path_components(parts[0], parts[1], parts[2]), hash);
    }
}
