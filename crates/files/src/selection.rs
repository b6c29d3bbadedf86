//! Ranking files against a query.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Extensions (lowercase, without the dot) whose files are read as text.
pub const READABLE_EXTENSIONS: &[&str] = &[
    "txt", "md", "json", "csv", "xml", "yml", "yaml", "log", "py", "js", "html", "css",
];

const KEYWORD_WEIGHT: f64 = 2.0;
const MEDIUM_SIZE_BONUS: f64 = 0.5;
const LARGE_SIZE_PENALTY: f64 = 0.5;

/// A discovered file, before it is read.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCandidate {
    pub path: PathBuf,
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Lowercase extension without the dot; empty when there is none.
    pub extension: String,
}

impl FileCandidate {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = extension_of(&path);
        Self {
            path,
            name,
            size,
            extension,
        }
    }

    /// Non-empty, no larger than `max_bytes`, and of a text type.
    pub fn is_readable(&self, max_bytes: u64) -> bool {
        self.size > 0
            && self.size <= max_bytes
            && READABLE_EXTENSIONS.contains(&self.extension.as_str())
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// How promising `file` looks for `query`; higher is better.
///
/// Every query word that also appears in the file name (split on `.`, `_`
/// and `-`) adds 2.0. Prose and data formats get a small bonus, as do files
/// between 1 KB and 100 KB; files over 1 MB lose 0.5.
pub fn relevance_score(file: &FileCandidate, query: &str) -> f64 {
    let query = query.to_lowercase();
    let query_words = words(&query);
    let name = file.name.to_lowercase();
    let name_words: HashSet<&str> = name
        .split(|c: char| c == '.' || c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .collect();

    let matches = query_words
        .iter()
        .filter(|word| name_words.contains(*word))
        .count();
    let mut score = matches as f64 * KEYWORD_WEIGHT;

    score += match file.extension.as_str() {
        "txt" | "md" => 1.0,
        "json" | "csv" => 0.8,
        "log" => 0.6,
        _ => 0.0,
    };

    if file.size > 1_000 && file.size < 100_000 {
        score += MEDIUM_SIZE_BONUS;
    } else if file.size > 1_000_000 {
        score -= LARGE_SIZE_PENALTY;
    }
    score
}

/// Distinct query words with surrounding punctuation removed.
fn words(text: &str) -> HashSet<&str> {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .collect()
}

/// The `max_files` readable candidates that score highest for `query`.
/// Ties go to the lexically smaller path so the order is stable.
pub fn select_files(
    candidates: Vec<FileCandidate>,
    query: &str,
    max_files: usize,
    max_bytes: u64,
) -> Vec<FileCandidate> {
    let mut scored: Vec<(f64, FileCandidate)> = candidates
        .into_iter()
        .filter(|file| file.is_readable(max_bytes))
        .map(|file| (relevance_score(&file, query), file))
        .collect();
    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score.total_cmp(a_score).then_with(|| a.path.cmp(&b.path))
    });
    scored
        .into_iter()
        .take(max_files)
        .map(|(_, file)| file)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn extension_is_lowercased_without_dot() {
        let file = FileCandidate::new("/data/Report.MD", 10);
        assert_eq!(file.name, "Report.MD");
        assert_eq!(file.extension, "md");
        assert_eq!(FileCandidate::new("/data/Makefile", 10).extension, "");
    }

    #[test]
    fn only_non_empty_text_files_within_the_limit_are_readable() {
        assert!(FileCandidate::new("a.txt", 1).is_readable(MB));
        assert!(!FileCandidate::new("a.txt", 0).is_readable(MB));
        assert!(!FileCandidate::new("a.txt", MB + 1).is_readable(MB));
        assert!(!FileCandidate::new("a.pdf", 10).is_readable(MB));
        assert!(!FileCandidate::new("README", 10).is_readable(MB));
    }

    #[test]
    fn filename_keywords_dominate_the_score() {
        let file = FileCandidate::new("/d/global_warming-trends.csv", 500);
        // two keyword hits plus the csv bonus
        assert_eq!(relevance_score(&file, "Global warming trends?"), 3.0 * 2.0 + 0.8);
        assert_eq!(relevance_score(&file, "ocean acidity"), 0.8);
    }

    #[test]
    fn size_adjusts_the_score() {
        let medium = FileCandidate::new("notes.md", 5_000);
        let huge = FileCandidate::new("notes.md", 2_000_000);
        let tiny = FileCandidate::new("notes.md", 200);
        assert_eq!(relevance_score(&medium, "x"), 1.5);
        assert_eq!(relevance_score(&huge, "x"), 0.5);
        assert_eq!(relevance_score(&tiny, "x"), 1.0);
    }

    #[test]
    fn selection_ranks_and_caps() {
        let files = vec![
            FileCandidate::new("/d/b.py", 500),
            FileCandidate::new("/d/climate.txt", 500),
            FileCandidate::new("/d/a.py", 500),
            FileCandidate::new("/d/climate.pdf", 500),
            FileCandidate::new("/d/empty.txt", 0),
        ];

        let picked = select_files(files, "climate data", 2, MB);

        let names: Vec<&str> = picked.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["climate.txt", "a.py"]);
    }
}
