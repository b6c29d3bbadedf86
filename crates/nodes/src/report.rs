//! Plain-text assembly of the compressed research report.

use std::fmt::Write as _;

use indexmap::IndexMap;
use pipeline::{SourceUrl, SummarizedSource};

const RULE_WIDTH: usize = 80;

/// Shown in place of findings when no source survived the loop.
pub const NO_SOURCES_NOTICE: &str =
    "No usable search results were found. Try other queries or check API keys.";

/// What the final synthesis step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthesis<'a> {
    /// The model's written findings.
    Written(&'a str),
    /// The compression call failed; the reason is shown instead.
    Unavailable(&'a str),
    /// No compression call was made.
    Skipped,
}

/// Builds the report text.
///
/// Sections, in order: the queries issued, the model's synthesis, one block
/// per summarized source, and the numbered source list. Source numbering
/// follows first-seen order in `summaries`, so the same inputs always render
/// the same text.
pub fn render_report(
    queries: &[String],
    synthesis: Synthesis<'_>,
    summaries: &IndexMap<SourceUrl, SummarizedSource>,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "List of Queries and Tool Calls Made");
    let _ = writeln!(out);
    if queries.is_empty() {
        let _ = writeln!(out, " • no search queries were issued");
    }
    for query in queries {
        let _ = writeln!(out, " • {query}");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Fully Comprehensive Findings");
    let _ = writeln!(out);
    match synthesis {
        Synthesis::Written(text) if !text.trim().is_empty() => {
            let _ = writeln!(out, "{}", text.trim());
            let _ = writeln!(out);
        }
        Synthesis::Unavailable(reason) => {
            let _ = writeln!(out, "(final synthesis unavailable: {reason})");
            let _ = writeln!(out);
        }
        _ => {}
    }

    if summaries.is_empty() {
        let _ = write!(out, "{NO_SOURCES_NOTICE}");
        return out;
    }

    for (index, (url, source)) in summaries.iter().enumerate() {
        let _ = writeln!(out, "--- SOURCE {}: {} ---", index + 1, title_or_url(source));
        let _ = writeln!(out, "URL: {url}");
        let _ = writeln!(out);
        let _ = writeln!(out, "SUMMARY:");
        let _ = writeln!(out, "{}", source.summary.trim());
        if let Some(excerpts) = source.key_excerpts.as_deref() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Key excerpts:");
            let _ = writeln!(out, "{}", excerpts.trim());
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "List of All Relevant Sources (with brief titles):");
    let _ = writeln!(out);
    for (index, (url, source)) in summaries.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}: {url}", index + 1, title_or_url(source));
    }

    out.truncate(out.trim_end().len());
    out
}

fn title_or_url(source: &SummarizedSource) -> &str {
    if source.title.trim().is_empty() {
        source.url.as_str()
    } else {
        source.title.trim()
    }
}
