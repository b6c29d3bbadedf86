//! Directory-backed search.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{SearchError, SearchGateway, SearchResult};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::cache::ContentCache;
use crate::selection::{select_files, FileCandidate};

/// Snippets longer than this keep only their head and tail.
const SNIPPET_LIMIT: usize = 5_000;
const SNIPPET_HEAD: usize = 2_000;
const SNIPPET_TAIL: usize = 1_000;

/// Configuration for [`DirectorySearch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub root: PathBuf,
    /// Upper bound on files returned for one query.
    pub max_files_to_read: usize,
    /// Larger files are never read.
    pub max_file_bytes: u64,
}

impl DirectoryConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_files_to_read: 10,
            max_file_bytes: 50 * 1024 * 1024,
        }
    }

    #[must_use]
    pub fn with_max_files_to_read(mut self, max: usize) -> Self {
        self.max_files_to_read = max;
        self
    }

    #[must_use]
    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<DirectoryError> for SearchError {
    fn from(err: DirectoryError) -> Self {
        SearchError::Transport(err.to_string())
    }
}

/// [`SearchGateway`] over the text files under one directory.
///
/// Every query walks the tree again, so files added during a run are found.
/// Hidden files and directories are skipped.
#[derive(Debug, Clone)]
pub struct DirectorySearch {
    config: DirectoryConfig,
    cache: Arc<ContentCache>,
}

impl DirectorySearch {
    /// Fails unless `config.root` is an existing directory. The root is
    /// canonicalized so that result URLs are absolute.
    pub fn new(config: DirectoryConfig) -> Result<Self, DirectoryError> {
        let root = canonical_dir(&config.root)?;
        Ok(Self {
            config: DirectoryConfig { root, ..config },
            cache: Arc::new(ContentCache::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Every regular file under the root, readable or not.
    pub fn discover(&self) -> Result<Vec<FileCandidate>, DirectoryError> {
        discover(&self.config.root)
    }

    #[instrument(name = "directory_search", skip(self), fields(root = %self.config.root.display()))]
    pub async fn search_files(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, DirectoryError> {
        let config = self.config.clone();
        let cache = Arc::clone(&self.cache);
        let query = query.to_string();

        tokio::task::spawn_blocking(move || read_best(&config, &cache, &query, max_results))
            .await
            .map_err(|err| DirectoryError::Io {
                path: self.config.root.clone(),
                source: io::Error::other(err),
            })?
    }
}

#[async_trait]
impl SearchGateway for DirectorySearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        Ok(self.search_files(query, max_results).await?)
    }
}

fn canonical_dir(path: &Path) -> Result<PathBuf, DirectoryError> {
    let canonical = path.canonicalize().map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => DirectoryError::NotFound(path.to_path_buf()),
        _ => DirectoryError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    if !canonical.is_dir() {
        return Err(DirectoryError::NotADirectory(path.to_path_buf()));
    }
    Ok(canonical)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn discover(root: &Path) -> Result<Vec<FileCandidate>, DirectoryError> {
    if !root.is_dir() {
        return Err(DirectoryError::NotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_hidden(e)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => files.push(FileCandidate::new(entry.into_path(), meta.len())),
            Err(err) => debug!(error = %err, "skipping file without metadata"),
        }
    }
    Ok(files)
}

fn read_best(
    config: &DirectoryConfig,
    cache: &ContentCache,
    query: &str,
    max_results: usize,
) -> Result<Vec<SearchResult>, DirectoryError> {
    let discovered = discover(&config.root)?;
    let found = discovered.len();
    let limit = max_results.min(config.max_files_to_read);
    let picked = select_files(discovered, query, limit, config.max_file_bytes);

    let mut results = Vec::with_capacity(picked.len());
    for file in picked {
        match read_text(cache, &file.path) {
            Ok(text) if text.trim().is_empty() => {
                debug!(path = %file.path.display(), "skipping blank file");
            }
            Ok(text) => results.push(SearchResult {
                url: file_url(&file.path),
                title: file.name,
                content: snippet(&text),
                raw_content: Some(text.to_string()),
            }),
            Err(err) => warn!(path = %file.path.display(), error = %err, "could not read file"),
        }
    }
    debug!(found, returned = results.len(), "directory search completed");
    Ok(results)
}

/// The file's text, from the cache when it has not changed on disk.
fn read_text(cache: &ContentCache, path: &Path) -> io::Result<Arc<str>> {
    let meta = fs::metadata(path)?;
    let modified = meta.modified().ok();
    if let Some(text) = modified.and_then(|at| cache.get(path, at, meta.len())) {
        debug!(path = %path.display(), "using cached file text");
        return Ok(text);
    }

    let bytes = fs::read(path)?;
    let text: Arc<str> = Arc::from(String::from_utf8_lossy(&bytes).as_ref());
    if let Some(at) = modified {
        cache.insert(path, at, meta.len(), Arc::clone(&text));
    }
    Ok(text)
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// `text` itself when short, otherwise its head and tail around a marker
/// giving the full length in characters.
fn snippet(text: &str) -> String {
    let length = text.chars().count();
    if length <= SNIPPET_LIMIT {
        return text.to_string();
    }
    let head: String = text.chars().take(SNIPPET_HEAD).collect();
    let tail: String = text.chars().skip(length - SNIPPET_TAIL).collect();
    format!("{head}\n\n[TRUNCATED - original length: {length} chars]\n\n{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_its_own_snippet() {
        assert_eq!(snippet("hello"), "hello");
    }

    #[test]
    fn long_text_keeps_head_and_tail() {
        let text = format!("{}{}{}", "a".repeat(2_000), "b".repeat(3_000), "c".repeat(1_000));
        let cut = snippet(&text);
        assert!(cut.starts_with(&"a".repeat(2_000)));
        assert!(cut.ends_with(&"c".repeat(1_000)));
        assert!(cut.contains("[TRUNCATED - original length: 6000 chars]"));
        assert!(!cut.contains('b'));
    }

    #[test]
    fn missing_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectorySearch::new(DirectoryConfig::new(dir.path().join("gone"))).unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound(_)));

        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();
        let err = DirectorySearch::new(DirectoryConfig::new(&file)).unwrap_err();
        assert!(matches!(err, DirectoryError::NotADirectory(_)));
    }
}
