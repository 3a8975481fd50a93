use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::path::Path;

use super::StateEntry;

/// Blake3 hash of a file's raw bytes, hex encoded.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read(path)?;
    Ok(hash_bytes(&content))
}

pub fn hash_bytes(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// SHA-256 over `path \0 hash \0` for each pair, in the order given.
///
/// Callers pass pairs sorted by path so the result is independent of
/// traversal order.
pub fn aggregate_hash<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut hasher = Sha256::new();
    for (rel_path, content_hash) in pairs {
        hasher.update(rel_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(content_hash.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of one analysis unit.
///
/// Empty when the unit has no files or any member lacks a content hash,
/// which means the cached analysis for it must not be trusted.
pub fn package_fingerprint(
    file_rel_paths: &[String],
    entries_by_path: &FxHashMap<&str, &StateEntry>,
) -> String {
    if file_rel_paths.is_empty() {
        return String::new();
    }

    let mut pairs = Vec::with_capacity(file_rel_paths.len());
    for rel_path in file_rel_paths {
        match entries_by_path.get(rel_path.as_str()) {
            Some(entry) if !entry.content_hash.is_empty() => {
                pairs.push((rel_path.as_str(), entry.content_hash.as_str()));
            }
            _ => return String::new(),
        }
    }
    aggregate_hash(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn entry(rel_path: &str, content_hash: &str) -> StateEntry {
        StateEntry {
            rel_path: rel_path.to_string(),
            content_hash: content_hash.to_string(),
            ..StateEntry::default()
        }
    }

    #[test]
    fn test_hash_file_consistency() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();
        file.flush().unwrap();

        let hash1 = hash_file(file.path()).unwrap();
        let hash2 = hash_file(file.path()).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1, hash_bytes(b"test content"));
    }

    #[test]
    fn test_aggregate_hash_known_value() {
        // sha256 of the empty input
        assert_eq!(
            aggregate_hash(std::iter::empty()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_aggregate_hash_separates_fields() {
        let a = aggregate_hash([("ab", "c")]);
        let b = aggregate_hash([("a", "bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_empty_when_hash_missing() {
        let a = entry("pkg/a.go", "h1");
        let b = entry("pkg/b.go", "");
        let mut by_path = FxHashMap::default();
        by_path.insert("pkg/a.go", &a);
        by_path.insert("pkg/b.go", &b);

        let files = vec!["pkg/a.go".to_string(), "pkg/b.go".to_string()];
        assert_eq!(package_fingerprint(&files, &by_path), "");

        let files = vec!["pkg/a.go".to_string(), "pkg/missing.go".to_string()];
        assert_eq!(package_fingerprint(&files, &by_path), "");

        assert_eq!(package_fingerprint(&[], &by_path), "");

        let files = vec!["pkg/a.go".to_string()];
        assert_eq!(
            package_fingerprint(&files, &by_path),
            aggregate_hash([("pkg/a.go", "h1")])
        );
    }

    proptest! {
        #[test]
        fn prop_aggregate_hash_is_deterministic(
            pairs in proptest::collection::btree_map("[a-z/]{1,12}", "[0-9a-f]{8}", 0..16)
        ) {
            let first = aggregate_hash(pairs.iter().map(|(p, h)| (p.as_str(), h.as_str())));
            let second = aggregate_hash(pairs.iter().map(|(p, h)| (p.as_str(), h.as_str())));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_changed_content_hash_changes_aggregate(
            pairs in proptest::collection::btree_map("[a-z]{1,8}", "[0-9a-f]{8}", 1..16),
            pick in any::<prop::sample::Index>(),
        ) {
            let base: Vec<(String, String)> = pairs.into_iter().collect();
            let mut changed = base.clone();
            let i = pick.index(changed.len());
            changed[i].1.push('x');

            let before = aggregate_hash(base.iter().map(|(p, h)| (p.as_str(), h.as_str())));
            let after = aggregate_hash(changed.iter().map(|(p, h)| (p.as_str(), h.as_str())));
            prop_assert_ne!(before, after);
        }
    }
}
