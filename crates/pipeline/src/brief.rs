//! The research brief record and the clarification decision.
//!
//! A [`ResearchBrief`] can only be obtained through
//! [`crate::schema::validate_brief`], so every instance satisfies the list
//! bounds declared here. Once validated it is immutable; the only derived
//! change is stamping the run date via [`ResearchBrief::with_date`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::BriefDate;

// ---------------------------------------------------------------------------
// List bounds
// ---------------------------------------------------------------------------

/// Inclusive bounds on the number of items in a brief list field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListBounds {
    /// Fewest items accepted.
    pub min: usize,
    /// Most items accepted.
    pub max: usize,
}

impl ListBounds {
    /// Returns `true` if `len` lies within the bounds.
    pub fn contains(self, len: usize) -> bool {
        (self.min..=self.max).contains(&len)
    }
}

impl std::fmt::Display for ListBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {} items", self.min, self.max)
    }
}

/// Bounds on [`ResearchBrief::key_questions`].
pub const KEY_QUESTIONS_BOUNDS: ListBounds = ListBounds { min: 1, max: 3 };
/// Bounds on [`ResearchBrief::method_brief`].
pub const METHOD_BRIEF_BOUNDS: ListBounds = ListBounds { min: 2, max: 4 };
/// Bounds on [`ResearchBrief::deliverables`].
pub const DELIVERABLES_BOUNDS: ListBounds = ListBounds { min: 2, max: 3 };

// ---------------------------------------------------------------------------
// Research brief
// ---------------------------------------------------------------------------

/// A concise, validated research plan for one topic.
///
/// The doc comments on the fields double as the field descriptions in the
/// JSON Schema embedded into the brief prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ResearchBrief {
    /// Short descriptive title of the research.
    pub(crate) title: String,
    /// Today's date in YYYY-MM-DD format.
    pub(crate) date: String,
    /// The problem being researched, in at most two sentences.
    pub(crate) problem_statement: String,
    /// The questions the research must answer.
    #[schemars(length(min = 1, max = 3))]
    pub(crate) key_questions: Vec<String>,
    /// How the research will be carried out.
    #[schemars(length(min = 2, max = 4))]
    pub(crate) method_brief: Vec<String>,
    /// What the research will produce.
    #[schemars(length(min = 2, max = 3))]
    pub(crate) deliverables: Vec<String>,
}

impl ResearchBrief {
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The date string as validated; after [`Self::with_date`] this is the
    /// run date in `YYYY-MM-DD` form.
    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn problem_statement(&self) -> &str {
        &self.problem_statement
    }

    pub fn key_questions(&self) -> &[String] {
        &self.key_questions
    }

    pub fn method_brief(&self) -> &[String] {
        &self.method_brief
    }

    pub fn deliverables(&self) -> &[String] {
        &self.deliverables
    }

    /// Returns the brief with its date replaced by `date`.
    ///
    /// Models frequently invent or mis-format the date, so the pipeline always
    /// overwrites it with the date the run was anchored to.
    #[must_use]
    pub fn with_date(self, date: BriefDate) -> Self {
        Self {
            date: date.to_string(),
            ..self
        }
    }

    /// Renders the brief as a natural-language scope statement used to seed
    /// the research loop.
    ///
    /// Deterministic: identical briefs always produce identical statements.
    pub fn scope_statement(&self) -> String {
        let mut scope = format!(
            "I want to research {}, focusing on the key questions identified.",
            self.title
        );
        if !self.problem_statement.is_empty() {
            scope.push_str(" Problem: ");
            scope.push_str(&self.problem_statement);
        }
        if !self.key_questions.is_empty() {
            scope.push_str(" Key questions: ");
            scope.push_str(&self.key_questions.join("; "));
            scope.push('.');
        }
        if !self.method_brief.is_empty() {
            scope.push_str(" Methods to consider: ");
            scope.push_str(&self.method_brief.join("; "));
            scope.push('.');
        }
        scope
    }
}

// ---------------------------------------------------------------------------
// Clarification decision
// ---------------------------------------------------------------------------

/// The model's verdict on whether the topic needs clarifying before planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClarifyDecision {
    /// Whether the user needs to be asked a clarifying question.
    pub need_clarification: bool,
    /// A question to ask the user to clarify the report scope.
    #[serde(default)]
    pub question: String,
    /// Verification message that research will start.
    #[serde(default)]
    pub verification: String,
}
