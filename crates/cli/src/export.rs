//! Numbered `sampleN.json` / `sampleN.md` exports of a brief.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use pipeline::ResearchBrief;

use crate::render::brief_markdown;

/// Paths written by [`export_brief`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Writes the brief to `dir` under the next free sample number, creating the
/// directory if needed.
pub fn export_brief(dir: &Path, brief: &ResearchBrief) -> io::Result<ExportedFiles> {
    fs::create_dir_all(dir)?;
    let number = next_sample_number(dir)?;

    let json = dir.join(format!("sample{number}.json"));
    let body = serde_json::to_string_pretty(brief).map_err(io::Error::other)?;
    fs::write(&json, body)?;

    let markdown = dir.join(format!("sample{number}.md"));
    fs::write(&markdown, brief_markdown(brief))?;

    Ok(ExportedFiles { json, markdown })
}

/// One more than the highest `sampleN.json` / `sampleN.md` already in `dir`.
pub fn next_sample_number(dir: &Path) -> io::Result<u32> {
    let mut highest = 0;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        if let Some(number) = name.to_str().and_then(sample_number) {
            highest = highest.max(number);
        }
    }
    Ok(highest + 1)
}

fn sample_number(file_name: &str) -> Option<u32> {
    let stem = file_name
        .strip_suffix(".json")
        .or_else(|| file_name.strip_suffix(".md"))?;
    stem.strip_prefix("sample")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use pipeline::{validate_brief, RawOutput};
    use pretty_assertions::assert_eq;

    use super::*;

    fn brief() -> ResearchBrief {
        let raw = r#"{
            "title": "Soil carbon",
            "date": "2026-10-18",
            "problem_statement": "How much carbon do farm soils hold?",
            "key_questions": ["How is it measured?", "What changes it?"],
            "method_brief": ["Literature review", "Dataset comparison"],
            "deliverables": ["Summary table", "Open questions"]
        }"#;
        validate_brief(&RawOutput::Text(raw.to_string())).unwrap()
    }

    #[test]
    fn only_sample_files_are_counted() {
        assert_eq!(sample_number("sample3.json"), Some(3));
        assert_eq!(sample_number("sample12.md"), Some(12));
        assert_eq!(sample_number("sample.md"), None);
        assert_eq!(sample_number("sample4.txt"), None);
        assert_eq!(sample_number("notes7.md"), None);
    }

    #[test]
    fn first_export_is_sample_one() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("samples");

        let files = export_brief(&out, &brief()).unwrap();

        assert_eq!(files.json, out.join("sample1.json"));
        assert_eq!(files.markdown, out.join("sample1.md"));
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&files.json).unwrap()).unwrap();
        assert_eq!(json["title"], "Soil carbon");
        assert_eq!(json["deliverables"][1], "Open questions");
        let md = fs::read_to_string(&files.markdown).unwrap();
        assert!(md.starts_with("# Soil carbon\n"));
    }

    #[test]
    fn numbering_continues_after_the_highest_existing_sample() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sample2.json"), "{}").unwrap();
        fs::write(dir.path().join("sample7.md"), "").unwrap();
        fs::write(dir.path().join("readme.txt"), "").unwrap();

        let files = export_brief(dir.path(), &brief()).unwrap();

        assert_eq!(files.json, dir.path().join("sample8.json"));
        assert_eq!(next_sample_number(dir.path()).unwrap(), 9);
    }
}
