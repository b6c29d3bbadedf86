//! File contents kept between queries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// A file version: the same path with a different size or modification time
/// is a different entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Version {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

/// Text of files already read, keyed by path, size and modification time.
///
/// The loop often ranks the same file first for several queries; this keeps
/// it from being read again unless it changed on disk.
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: Mutex<HashMap<Version, Arc<str>>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path, modified: SystemTime, size: u64) -> Option<Arc<str>> {
        let key = Version {
            path: path.to_path_buf(),
            modified,
            size,
        };
        self.lock().get(&key).cloned()
    }

    pub fn insert(&self, path: &Path, modified: SystemTime, size: u64, text: Arc<str>) {
        let key = Version {
            path: path.to_path_buf(),
            modified,
            size,
        };
        self.lock().insert(key, text);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Version, Arc<str>>> {
        // Entries are inserted whole, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn changed_files_miss() {
        let cache = ContentCache::new();
        let path = Path::new("/d/notes.md");
        let then = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        cache.insert(path, then, 5, Arc::from("hello"));

        assert_eq!(cache.get(path, then, 5).as_deref(), Some("hello"));
        assert!(cache.get(path, then, 6).is_none());
        assert!(cache.get(path, then + Duration::from_secs(1), 5).is_none());
        assert!(cache.get(Path::new("/d/other.md"), then, 5).is_none());
        assert_eq!(cache.len(), 1);
    }
}
