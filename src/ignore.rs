// Ignore rule parser: `.dfmignore` glob rules filtering the workspace scan.
//
// The matcher keeps the teacher's exact/prefix/glob bucket split and
// backtracking `*`/`?` matcher, extended here with `**` (cross-separator
// match) and `[abc]` character classes since the spec requires richer globs
// than the teacher's own ignore file format used.

use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Clone)]
pub struct Ignore {
    root: PathBuf,
    exact: Vec<Vec<u8>>,
    prefixes: Vec<Vec<u8>>,
    globs: Vec<Glob>,
    /// Extended rules additionally exclude `meshes/` during project-commit scans.
    exclude_meshes_dir: bool,
}

impl Ignore {
    pub fn load(repo_root: &Path, dfm_dir: &Path) -> Result<Self> {
        let root = repo_root.to_path_buf();

        let mut exact = Vec::new();
        let mut prefixes = Vec::new();
        let mut globs = Vec::new();

        // Default rule set, applied even with no `.dfmignore` present.
        prefixes.push(b".DFM/".to_vec());
        exact.push(b".DFM".to_vec());
        for default_pat in [
            "*.blend1", "*.blend2", "*.blend@", // DCC backup suffixes
            ".DS_Store", "Thumbs.db",           // OS clutter
            "__pycache__/", ".cache/",          // cache directories
            "*.fbx~", "*.obj~",                 // sibling DCC formats' own backups
        ] {
            classify(default_pat, &mut exact, &mut prefixes, &mut globs);
        }

        if let Ok(content) = std::fs::read_to_string(dfm_dir.join(".dfmignore")) {
            for raw in content.lines() {
                let line = raw.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let mut p = line.replace('\\', "/");
                let anchored = p.starts_with('/');
                while p.starts_with('/') {
                    p.remove(0);
                }
                if p.is_empty() {
                    continue;
                }
                if anchored {
                    // Anchored patterns only match from repo root; our buckets
                    // are already root-relative, so no further change needed.
                }
                classify(&p, &mut exact, &mut prefixes, &mut globs);
            }
        }

        exact.sort_unstable();
        exact.dedup();
        prefixes.sort_unstable();
        prefixes.dedup();

        Ok(Self { root, exact, prefixes, globs, exclude_meshes_dir: false })
    }

    #[must_use]
    pub fn with_meshes_excluded(mut self) -> Self {
        self.exclude_meshes_dir = true;
        self
    }

    #[must_use]
    pub fn is_ignored_abs(&self, abs: &Path) -> bool {
        let Ok(rel) = abs.strip_prefix(&self.root) else { return false };
        if rel.as_os_str().is_empty() {
            return false;
        }
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        self.is_ignored_rel(&rel_str)
    }

    #[must_use]
    pub fn is_ignored_rel(&self, rel: &str) -> bool {
        let rel = rel.trim_start_matches('/');
        if rel.is_empty() {
            return false;
        }

        if self.exclude_meshes_dir && (rel == "meshes" || rel.starts_with("meshes/")) {
            return true;
        }

        let bytes = rel.as_bytes();
        if self.exact.binary_search_by(|e| e.as_slice().cmp(bytes)).is_ok() {
            return true;
        }
        for p in &self.prefixes {
            if bytes.starts_with(p.as_slice()) {
                return true;
            }
        }
        for g in &self.globs {
            if g.is_match(rel) {
                return true;
            }
        }
        false
    }
}

fn classify(pattern: &str, exact: &mut Vec<Vec<u8>>, prefixes: &mut Vec<Vec<u8>>, globs: &mut Vec<Glob>) {
    if pattern.ends_with('/') {
        prefixes.push(pattern.as_bytes().to_vec());
        return;
    }
    if pattern.bytes().any(|b| matches!(b, b'*' | b'?' | b'[')) {
        globs.push(Glob::new(pattern));
        return;
    }
    exact.push(pattern.as_bytes().to_vec());
    let mut dir = pattern.as_bytes().to_vec();
    dir.push(b'/');
    prefixes.push(dir);
}

/// Glob matcher supporting `*` (any run, not crossing `/`), `**` (any run,
/// crossing `/`), `?` (one byte), and `[abc]`/`[a-z]` character classes.
#[derive(Clone)]
pub struct Glob {
    tokens: Vec<Token>,
}

#[derive(Clone)]
enum Token {
    Literal(u8),
    AnyOne,
    Star,
    StarStar,
    Class(Vec<(u8, u8)>, bool),
}

impl Glob {
    #[must_use]
    pub fn new(pat: &str) -> Self {
        let mut tokens = Vec::new();
        let bytes = pat.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'*' if bytes.get(i + 1) == Some(&b'*') => {
                    tokens.push(Token::StarStar);
                    i += 2;
                }
                b'*' => {
                    tokens.push(Token::Star);
                    i += 1;
                }
                b'?' => {
                    tokens.push(Token::AnyOne);
                    i += 1;
                }
                b'[' => {
                    let mut j = i + 1;
                    let negate = bytes.get(j) == Some(&b'!') || bytes.get(j) == Some(&b'^');
                    if negate {
                        j += 1;
                    }
                    let start = j;
                    while j < bytes.len() && bytes[j] != b']' {
                        j += 1;
                    }
                    let mut ranges = Vec::new();
                    let class = &bytes[start..j.min(bytes.len())];
                    let mut k = 0;
                    while k < class.len() {
                        if k + 2 < class.len() && class[k + 1] == b'-' {
                            ranges.push((class[k], class[k + 2]));
                            k += 3;
                        } else {
                            ranges.push((class[k], class[k]));
                            k += 1;
                        }
                    }
                    tokens.push(Token::Class(ranges, negate));
                    i = j + 1;
                }
                b => {
                    tokens.push(Token::Literal(b));
                    i += 1;
                }
            }
        }
        Self { tokens }
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        match_tokens(&self.tokens, text.as_bytes())
    }
}

fn token_matches(tok: &Token, b: u8) -> bool {
    match tok {
        Token::Literal(l) => *l == b,
        Token::AnyOne => b != b'/',
        Token::Class(ranges, negate) => {
            let hit = ranges.iter().any(|&(lo, hi)| b >= lo && b <= hi);
            hit != *negate
        }
        Token::Star | Token::StarStar => unreachable!(),
    }
}

fn match_tokens(tokens: &[Token], text: &[u8]) -> bool {
    match tokens.split_first() {
        None => text.is_empty(),
        Some((Token::Star, rest)) => {
            for split in 0..=text.len() {
                if !text[..split].contains(&b'/') && match_tokens(rest, &text[split..]) {
                    return true;
                }
            }
            false
        }
        Some((Token::StarStar, rest)) => {
            for split in 0..=text.len() {
                if match_tokens(rest, &text[split..]) {
                    return true;
                }
            }
            false
        }
        Some((tok, rest)) => {
            !text.is_empty() && token_matches(tok, text[0]) && match_tokens(rest, &text[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_does_not_cross_separators() {
        let g = Glob::new("*.blend1");
        assert!(g.is_match("scene.blend1"));
        assert!(!g.is_match("dir/scene.blend1"));
    }

    #[test]
    fn star_star_crosses_separators() {
        let g = Glob::new("assets/**/*.png");
        assert!(g.is_match("assets/model/textures/diffuse.png"));
        assert!(!g.is_match("assets/model/textures/diffuse.jpg"));
    }

    #[test]
    fn any_one_matches_single_byte_not_separator() {
        let g = Glob::new("file?.rs");
        assert!(g.is_match("file1.rs"));
        assert!(!g.is_match("file12.rs"));
        assert!(!g.is_match("file/.rs"));
    }

    #[test]
    fn character_class_and_negation() {
        let g = Glob::new("file[0-2].rs");
        assert!(g.is_match("file0.rs"));
        assert!(g.is_match("file2.rs"));
        assert!(!g.is_match("file3.rs"));

        let negated = Glob::new("file[!0-2].rs");
        assert!(negated.is_match("file5.rs"));
        assert!(!negated.is_match("file1.rs"));
    }

    fn ignore_with_rules(rules: &[&str]) -> Ignore {
        let dir = tempfile::TempDir::new().unwrap();
        let dfm = dir.path().join(".DFM");
        std::fs::create_dir_all(&dfm).unwrap();
        std::fs::write(dfm.join(".dfmignore"), rules.join("\n")).unwrap();
        Ignore::load(dir.path(), &dfm).unwrap()
    }

    #[test]
    fn dfm_dir_is_always_ignored() {
        let ignore = ignore_with_rules(&[]);
        assert!(ignore.is_ignored_rel(".DFM"));
        assert!(ignore.is_ignored_rel(".DFM/forester.db"));
    }

    #[test]
    fn custom_rules_classify_into_correct_buckets() {
        let ignore = ignore_with_rules(&["build/", "*.tmp", "secret.txt"]);
        assert!(ignore.is_ignored_rel("build/output.o"));
        assert!(ignore.is_ignored_rel("scratch.tmp"));
        assert!(ignore.is_ignored_rel("secret.txt"));
        assert!(!ignore.is_ignored_rel("keep.rs"));
    }

    #[test]
    fn with_meshes_excluded_ignores_meshes_dir() {
        let ignore = ignore_with_rules(&[]).with_meshes_excluded();
        assert!(ignore.is_ignored_rel("meshes/cube.blend"));
        assert!(!ignore.is_ignored_rel("meshes_backup/cube.blend"));
    }
}
