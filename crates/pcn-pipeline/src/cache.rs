//! Memoisation of parsed sources.
//!
//! Loads are pure functions of the source content, so results can be reused
//! while the file is unchanged. The cache key is the canonical path together
//! with the file length and modification time; editing the file invalidates
//! the entry on the next lookup. Nothing depends on a hit for correctness.

use crate::error::{PipelineError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

/// Identity of a source file at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub path: PathBuf,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl SourceKey {
    pub fn for_path(path: &Path) -> Result<Self> {
        let canonical = path
            .canonicalize()
            .map_err(|e| PipelineError::unreadable(path, e))?;
        let metadata = std::fs::metadata(&canonical).map_err(|e| PipelineError::unreadable(path, e))?;
        Ok(Self {
            path: canonical,
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Thread-safe cache of values derived from files.
#[derive(Debug)]
pub struct SourceCache<T> {
    entries: RwLock<HashMap<PathBuf, (SourceKey, Arc<T>)>>,
}

impl<T> Default for SourceCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> SourceCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `path`, or build it with `load`.
    ///
    /// A stale entry (same path, different length or mtime) is replaced.
    /// Errors from `load` are not cached.
    pub fn get_or_load<F>(&self, path: &Path, load: F) -> Result<Arc<T>>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        let key = SourceKey::for_path(path)?;

        if let Some((cached_key, value)) = self.entries.read().get(&key.path) {
            if *cached_key == key {
                debug!("Cache hit for {}", path.display());
                return Ok(Arc::clone(value));
            }
        }

        debug!("Cache miss for {}", path.display());
        let value = Arc::new(load(path)?);
        self.entries
            .write()
            .insert(key.path.clone(), (key, Arc::clone(&value)));
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_hit_returns_same_value() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("county.csv");
        std::fs::write(&path, "County,Score\nA,1\n").unwrap();

        let cache: SourceCache<String> = SourceCache::new();
        let calls = Cell::new(0);
        let load = |p: &Path| -> Result<String> {
            calls.set(calls.get() + 1);
            Ok(std::fs::read_to_string(p)?)
        };

        let first = cache.get_or_load(&path, load).unwrap();
        let second = cache.get_or_load(&path, load).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_changed_file_is_reloaded() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("county.csv");
        std::fs::write(&path, "County,Score\nA,1\n").unwrap();

        let cache: SourceCache<String> = SourceCache::new();
        let load = |p: &Path| -> Result<String> { Ok(std::fs::read_to_string(p)?) };

        let before = cache.get_or_load(&path, load).unwrap();
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"B,2\n").unwrap();
        drop(file);

        let after = cache.get_or_load(&path, load).unwrap();
        assert_ne!(before, after);
        assert!(after.contains("B,2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("bad.geojson");
        std::fs::write(&path, "{}").unwrap();

        let cache: SourceCache<String> = SourceCache::new();
        let result = cache.get_or_load(&path, |_| {
            Err(PipelineError::InvalidConfig("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let cache: SourceCache<String> = SourceCache::new();
        let err = cache
            .get_or_load(Path::new("/definitely/not/here.csv"), |_| Ok(String::new()))
            .unwrap_err();
        assert!(err.is_source_error());
    }
}
