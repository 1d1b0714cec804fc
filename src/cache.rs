//! Content-addressed cache of loaded sources.
//!
//! Owned by the calling layer. Entries are keyed by the ordered list of
//! (path, SHA-256 of file contents) for the selected files, so editing or
//! replacing a file invalidates every entry that included it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};

/// Identity of one source file at the time it was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub path: PathBuf,
    pub sha256: String,
}

/// Hash a file's contents.
pub fn fingerprint(path: &Path) -> anyhow::Result<SourceKey> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(SourceKey {
        path: path.to_path_buf(),
        sha256: hex::encode(hasher.finalize()),
    })
}

/// Memoises a load result per selected file set.
#[derive(Debug)]
pub struct SourceCache<T> {
    entries: HashMap<Vec<SourceKey>, T>,
    hits: usize,
    misses: usize,
}

impl<T> Default for SourceCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<T: Clone> SourceCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `paths`, or run `load` and remember a
    /// successful result. Failed loads are not cached.
    pub fn get_or_load<E, F>(&mut self, paths: &[PathBuf], load: F) -> Result<T, E>
    where
        E: From<anyhow::Error>,
        F: FnOnce(&[PathBuf]) -> Result<T, E>,
    {
        let key = paths
            .iter()
            .map(|p| fingerprint(p))
            .collect::<anyhow::Result<Vec<_>>>()?;

        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            log::debug!("source cache hit for {} files", paths.len());
            return Ok(hit.clone());
        }

        self.misses += 1;
        let value = load(paths)?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.csv", "State,County,Year\n");
        let before = fingerprint(&path).unwrap();
        write(dir.path(), "a.csv", "State,County,Year\nOH,Lake,2015\n");
        let after = fingerprint(&path).unwrap();
        assert_ne!(before.sha256, after.sha256);
        assert_eq!(before.sha256.len(), 64);
    }

    #[test]
    fn test_second_load_of_same_files_is_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![write(dir.path(), "a.csv", "x\n1\n")];
        let mut cache: SourceCache<usize> = SourceCache::new();
        let mut calls = 0;
        for _ in 0..2 {
            let v: Result<usize, anyhow::Error> = cache.get_or_load(&paths, |p| {
                calls += 1;
                Ok(p.len())
            });
            assert_eq!(v.unwrap(), 1);
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_edited_file_misses() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![write(dir.path(), "a.csv", "x\n1\n")];
        let mut cache: SourceCache<String> = SourceCache::new();
        let first: anyhow::Result<String> = cache.get_or_load(&paths, |_| Ok("v1".into()));
        assert_eq!(first.unwrap(), "v1");
        write(dir.path(), "a.csv", "x\n2\n");
        let second: anyhow::Result<String> = cache.get_or_load(&paths, |_| Ok("v2".into()));
        assert_eq!(second.unwrap(), "v2");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let mut cache: SourceCache<()> = SourceCache::new();
        let out: anyhow::Result<()> =
            cache.get_or_load(&[PathBuf::from("/definitely/not/here.csv")], |_| Ok(()));
        assert!(out.is_err());
        assert!(cache.is_empty());
    }
}
