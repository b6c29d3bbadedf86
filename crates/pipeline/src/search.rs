//! Search results, their deduplication, and the text-length guards applied
//! before anything is sent to a provider.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::SourceUrl;

/// Query length used when a [`crate::SearchGateway`] does not state its own
/// limit. Sits just under the 400-character cap common among search APIs.
pub const DEFAULT_MAX_QUERY_CHARS: usize = 380;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One raw result as returned by the search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page URL; the deduplication key.
    pub url: String,
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Provider snippet.
    #[serde(default)]
    pub content: String,
    /// Full page text, when the provider supplied it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
}

impl SearchResult {
    /// The richest text available: raw page content if non-blank, otherwise
    /// the snippet.
    pub fn best_content(&self) -> &str {
        match self.raw_content.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => &self.content,
        }
    }

    /// Title to display, falling back to the URL for untitled pages.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

/// A search result condensed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizedSource {
    /// Page URL.
    pub url: SourceUrl,
    /// Page title.
    pub title: String,
    /// Model-written summary (or a note that summarization failed).
    pub summary: String,
    /// Verbatim excerpts worth quoting, if any were extracted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_excerpts: Option<String>,
}

/// Search results keyed by URL, in first-seen order.
pub type UniqueResults = IndexMap<SourceUrl, SearchResult>;

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

/// Merges several result lists into one mapping with exactly one entry per URL.
///
/// The first occurrence of a URL wins; later duplicates are dropped. Results
/// with a blank URL are skipped since they cannot be cited.
pub fn dedupe_by_url<I>(responses: I) -> UniqueResults
where
    I: IntoIterator<Item = Vec<SearchResult>>,
{
    let mut unique = UniqueResults::new();
    for result in responses.into_iter().flatten() {
        let Some(url) = SourceUrl::new(result.url.trim()) else {
            continue;
        };
        unique.entry(url).or_insert(result);
    }
    unique
}

// ---------------------------------------------------------------------------
// Length guards
// ---------------------------------------------------------------------------

/// Returns the first `budget` characters of `text` (never splitting a char).
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Shortens a query to at most `limit` characters.
///
/// Queries within the limit are returned trimmed. Longer ones are cut after
/// the last sentence terminator (`.`, `!`, `?`) inside the limit so the
/// semantic head survives; if there is none, the query is hard-cut at the limit.
pub fn truncate_query(query: &str, limit: usize) -> String {
    let query = query.trim();
    if query.chars().count() <= limit {
        return query.to_string();
    }

    let head = truncate_chars(query, limit);
    let at_boundary = head
        .rfind(&['.', '!', '?'][..])
        .map(|i| head[..=i].trim())
        .filter(|s| !s.is_empty());

    match at_boundary {
        Some(cut) => cut.to_string(),
        None => head.trim_end().to_string(),
    }
}
