//! Briefsmith local-directory search adapter.
//!
//! Implements [`pipeline::SearchGateway`] over a directory of text files, so
//! the research loop can work from local material instead of the web. Each
//! query ranks the readable files by how well their names match it and
//! returns the best ones with their text.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File discovery, ranking and reading live here. The
//! loop treats every returned file like a web page: its `file://` URL is the
//! deduplication key and its text is what gets summarized.

mod cache;
mod directory;
mod selection;

pub use directory::{DirectoryConfig, DirectoryError, DirectorySearch};
pub use selection::{relevance_score, select_files, FileCandidate, READABLE_EXTENSIONS};
