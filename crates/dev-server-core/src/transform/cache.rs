//! Content-addressed transform cache (spec §3 `TransformCacheEntry`, invariant 1).

use dashmap::DashMap;

use crate::vfs::VirtualPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Esm,
    Cjs,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub source_hash: u32,
    pub output: String,
}

/// Keyed on `(path, format)`; a read sees either the previous or the new
/// entry for a key, never a torn write -- `DashMap` shards give us that for
/// free, matching the atomic-per-file requirement in spec §5.
#[derive(Default)]
pub struct TransformCache {
    entries: DashMap<(VirtualPath, TargetFormat), CacheEntry>,
}

impl TransformCache {
    pub fn new() -> Self {
        TransformCache::default()
    }

    /// Returns the cached output iff its stored hash matches `source_hash`.
    /// A stale entry (hash mismatch) is treated as a miss, not removed here
    /// -- the caller overwrites it via [`TransformCache::insert`] once the
    /// fresh transform completes.
    pub fn get(&self, path: &VirtualPath, format: TargetFormat, source_hash: u32) -> Option<String> {
        self.entries
            .get(&(path.clone(), format))
            .filter(|entry| entry.source_hash == source_hash)
            .map(|entry| entry.output.clone())
    }

    pub fn insert(&self, path: VirtualPath, format: TargetFormat, source_hash: u32, output: String) {
        self.entries
            .insert((path, format), CacheEntry { source_hash, output });
    }
}

/// A 32-bit FNV-1a fingerprint of `bytes`. Not cryptographic; only used to
/// detect content changes between requests for the transform cache.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x01000193;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_changes_with_content() {
        let a = fnv1a_32(b"export default 1;");
        let b = fnv1a_32(b"export default 2;");
        assert_ne!(a, b);
    }

    #[test]
    fn cache_hit_requires_matching_hash() {
        let cache = TransformCache::new();
        let path = VirtualPath::new("/pages/index.jsx");
        cache.insert(path.clone(), TargetFormat::Esm, 42, "compiled".to_string());

        assert_eq!(cache.get(&path, TargetFormat::Esm, 42), Some("compiled".to_string()));
        assert_eq!(cache.get(&path, TargetFormat::Esm, 7), None);
        assert_eq!(cache.get(&path, TargetFormat::Cjs, 42), None);
    }
}
