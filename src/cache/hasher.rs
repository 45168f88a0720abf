//! Hashing for recipe identity and repository-cache keys.
//!
//! Recipe identity uses a fast, seedless FxHash so the same entry-procedure
//! file name always maps to the same work directory across runs. FxHash
//! folds input at the width of `usize`, so the identity is stable per target
//! pointer width: 32-bit and 64-bit hosts derive different suffixes for the
//! same recipe and do not share a data cache. Mirror keys use BLAKE3 over the
//! source path and are the same on every host.

use std::hash::Hasher;
use std::path::Path;

/// Derive a recipe identity from the entry-procedure file name.
///
/// Sixteen hex digits; see the module docs for the pointer-width caveat.
pub fn identity(object_loader: &str) -> String {
    let mut hasher = rustc_hash::FxHasher::default();
    hasher.write(object_loader.as_bytes());
    format!("{:016x}", hasher.finish())
}

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Directory name under the repository-cache root that mirrors `path`.
pub fn mirror_key(path: &Path) -> String {
    let digest = hash_string(&path.to_string_lossy());
    digest
        .strip_prefix("blake3:")
        .unwrap_or(&digest)
        .chars()
        .take(32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hasher_identity_deterministic() {
        assert_eq!(identity("__flexsrc__.sh"), identity("__flexsrc__.sh"));
        assert_eq!(identity("__flexsrc__.sh").len(), 16);
    }

    #[test]
    fn test_hasher_identity_distinguishes_loaders() {
        assert_ne!(identity("__flexsrc__.sh"), identity("loader_v2.sh"));
        assert_ne!(identity(""), identity(" "));
    }

    #[test]
    fn test_hasher_hash_string() {
        let h1 = hash_string("hello");
        let h2 = hash_string("hello");
        let h3 = hash_string("world");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert!(h1.starts_with("blake3:"));
        assert_eq!(h1.len(), 7 + 64);
    }

    #[test]
    fn test_hasher_mirror_key() {
        let a = mirror_key(Path::new("/srv/recipes/mnist/__flexsrc__.yaml"));
        let b = mirror_key(Path::new("/srv/recipes/cifar/__flexsrc__.yaml"));
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(a, mirror_key(Path::new("/srv/recipes/mnist/__flexsrc__.yaml")));
    }
}
