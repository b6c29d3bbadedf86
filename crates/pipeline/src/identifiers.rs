//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example, a
//! [`SourceUrl`] with a [`ToolCallId`] even though both are strings under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Non-blank string newtypes: `new` trims nothing and rejects blank input.
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or whitespace-only.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Run identity
// ---------------------------------------------------------------------------

/// Identifies a single pipeline execution run.
///
/// Generated fresh for every run; recorded on the root tracing span so all
/// model and search activity from one run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRunId(Uuid);

impl PipelineRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for PipelineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers — String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// The URL of a web page returned by the search provider.
    ///
    /// This is the deduplication key for search results: two results with the
    /// same URL are the same source, whatever their titles say.
    SourceUrl
}

string_id! {
    /// Provider-assigned identifier of one tool call inside a model reply.
    ///
    /// Tool-result messages echo it back so the provider can pair each result
    /// with the call that requested it.
    ToolCallId
}

string_id! {
    /// Identifies a hosted model (e.g. `"gemini-2.5-flash"`, `"gpt-4o-mini"`).
    ModelName
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identifiers_are_rejected() {
        assert!(SourceUrl::new("").is_none());
        assert!(SourceUrl::new("   ").is_none());
        assert_eq!(
            SourceUrl::new("https://a.example/x").unwrap().as_str(),
            "https://a.example/x"
        );
    }

    #[test]
    fn string_ids_serialise_transparently() {
        let id = ToolCallId::new("call_1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"call_1\"");
    }
}
