//! Structured-output contract: JSON extraction, brief validation, and the
//! JSON Schemas handed to providers.
//!
//! Model output reaches the core in one of two shapes ([`RawOutput`]): a field
//! mapping decoded by a provider with native structured output, or free text
//! that should contain a single JSON object. Both go through the same
//! validator, so there is exactly one place where brief rules are enforced.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::brief::{
    ClarifyDecision, ListBounds, ResearchBrief, DELIVERABLES_BOUNDS, KEY_QUESTIONS_BOUNDS,
    METHOD_BRIEF_BOUNDS,
};
use crate::ports::ModelError;

/// Pseudo field name used when the payload as a whole is unusable.
pub const DOCUMENT_FIELD: &str = "(document)";

// ---------------------------------------------------------------------------
// Raw model output
// ---------------------------------------------------------------------------

/// Model output before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawOutput {
    /// A JSON object already decoded by the provider.
    Object(Map<String, Value>),
    /// Free text expected to contain one JSON object.
    Text(String),
}

impl RawOutput {
    /// Renders the payload as text for diagnostics.
    pub fn to_diagnostic_text(&self) -> String {
        match self {
            Self::Object(map) => {
                serde_json::to_string_pretty(map).unwrap_or_else(|_| format!("{map:?}"))
            }
            Self::Text(text) => text.clone(),
        }
    }

    /// Resolves the payload to a JSON object, extracting it from text if needed.
    pub fn into_object(self) -> Result<Map<String, Value>, FieldIssue> {
        match self {
            Self::Object(map) => Ok(map),
            Self::Text(text) => {
                let span = extract_json_object(&text).ok_or_else(|| {
                    FieldIssue::new(DOCUMENT_FIELD, "no JSON object found in model output")
                })?;
                match serde_json::from_str::<Value>(span) {
                    Ok(Value::Object(map)) => Ok(map),
                    Ok(_) => Err(FieldIssue::new(DOCUMENT_FIELD, "expected a JSON object")),
                    Err(e) => Err(FieldIssue::new(DOCUMENT_FIELD, format!("invalid JSON: {e}"))),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Locates the outermost JSON object in `text`.
///
/// Starts at the first `{` and returns the span up to its matching `}`,
/// tracking string literals and escapes so braces inside strings do not
/// count. Surrounding commentary and code-fence markers fall outside the span.
/// If the braces never balance (truncated output), the span runs to the last
/// `}` instead. Returns `None` when no candidate span exists.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

// ---------------------------------------------------------------------------
// Validation failures
// ---------------------------------------------------------------------------

/// One problem with one field of a candidate brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Offending field, or [`DOCUMENT_FIELD`] for whole-payload problems.
    pub field: String,
    /// What is wrong with it.
    pub problem: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// The model produced something that is not a valid [`ResearchBrief`].
///
/// Carries every offending field (not just the first) and the raw payload so
/// the caller can show exactly what came back.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("invalid field(s): {}", describe_issues(.issues))]
pub struct ValidationFailure {
    /// Problems found, in field order.
    pub issues: Vec<FieldIssue>,
    /// The payload that was validated.
    pub raw: String,
}

impl ValidationFailure {
    /// Names of the offending fields, deduplicated, in the order found.
    pub fn fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for issue in &self.issues {
            if !names.contains(&issue.field.as_str()) {
                names.push(&issue.field);
            }
        }
        names
    }

    /// Returns `true` if `field` is among the offending fields.
    pub fn names(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }
}

fn describe_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Brief validation
// ---------------------------------------------------------------------------

/// Validates raw model output into a [`ResearchBrief`].
///
/// Enforces presence and type of `title`, `problem_statement`,
/// `key_questions`, `method_brief` and `deliverables`, non-empty text, and the
/// list bounds. Oversized or undersized lists are rejected, never truncated.
/// `date` is optional here; when present it must be a string and is kept as
/// given. Accepted strings are stored verbatim, surrounding whitespace
/// included; blankness is judged on the trimmed text only.
pub fn validate_brief(raw: &RawOutput) -> Result<ResearchBrief, ValidationFailure> {
    let diagnostic = raw.to_diagnostic_text();
    let map = raw.clone().into_object().map_err(|issue| ValidationFailure {
        issues: vec![issue],
        raw: diagnostic.clone(),
    })?;

    let mut issues = Vec::new();
    let title = required_text(&map, "title", &mut issues);
    let date = optional_text(&map, "date", &mut issues);
    let problem_statement = required_text(&map, "problem_statement", &mut issues);
    let key_questions = bounded_list(&map, "key_questions", KEY_QUESTIONS_BOUNDS, &mut issues);
    let method_brief = bounded_list(&map, "method_brief", METHOD_BRIEF_BOUNDS, &mut issues);
    let deliverables = bounded_list(&map, "deliverables", DELIVERABLES_BOUNDS, &mut issues);

    match (title, problem_statement, key_questions, method_brief, deliverables) {
        (Some(title), Some(problem_statement), Some(key_questions), Some(method_brief), Some(deliverables))
            if issues.is_empty() =>
        {
            Ok(ResearchBrief {
                title,
                date: date.unwrap_or_default(),
                problem_statement,
                key_questions,
                method_brief,
                deliverables,
            })
        }
        _ => Err(ValidationFailure {
            issues,
            raw: diagnostic,
        }),
    }
}

fn required_text(map: &Map<String, Value>, field: &str, issues: &mut Vec<FieldIssue>) -> Option<String> {
    match map.get(field) {
        None | Some(Value::Null) => {
            issues.push(FieldIssue::new(field, "missing"));
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            issues.push(FieldIssue::new(field, "must not be empty"));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(FieldIssue::new(field, format!("expected a string, got {}", kind_of(other))));
            None
        }
    }
}

fn optional_text(map: &Map<String, Value>, field: &str, issues: &mut Vec<FieldIssue>) -> Option<String> {
    match map.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(FieldIssue::new(field, format!("expected a string, got {}", kind_of(other))));
            None
        }
    }
}

fn bounded_list(
    map: &Map<String, Value>,
    field: &str,
    bounds: ListBounds,
    issues: &mut Vec<FieldIssue>,
) -> Option<Vec<String>> {
    let items = match map.get(field) {
        None | Some(Value::Null) => {
            issues.push(FieldIssue::new(field, "missing"));
            return None;
        }
        Some(Value::Array(items)) => items,
        Some(other) => {
            issues.push(FieldIssue::new(field, format!("expected an array, got {}", kind_of(other))));
            return None;
        }
    };

    if !bounds.contains(items.len()) {
        issues.push(FieldIssue::new(
            field,
            format!("expected {bounds}, got {}", items.len()),
        ));
        return None;
    }

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match item {
            Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
            Value::String(_) => {
                issues.push(FieldIssue::new(field, format!("item {index} is empty")));
                return None;
            }
            other => {
                issues.push(FieldIssue::new(
                    field,
                    format!("item {index} should be a string, got {}", kind_of(other)),
                ));
                return None;
            }
        }
    }
    Some(out)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Clarification decoding
// ---------------------------------------------------------------------------

/// Decodes a [`ClarifyDecision`] from raw model output.
///
/// A shape error is a [`ModelError::SchemaMismatch`]; it is surfaced as-is
/// rather than retried.
pub fn decode_clarify_decision(raw: RawOutput) -> Result<ClarifyDecision, ModelError> {
    let diagnostic = raw.to_diagnostic_text();
    let map = raw
        .into_object()
        .map_err(|issue| ModelError::SchemaMismatch {
            message: issue.to_string(),
            raw: diagnostic.clone(),
        })?;
    serde_json::from_value(Value::Object(map)).map_err(|e| ModelError::SchemaMismatch {
        message: format!("clarify decision: {e}"),
        raw: diagnostic,
    })
}

// ---------------------------------------------------------------------------
// Output schemas
// ---------------------------------------------------------------------------

/// A named JSON Schema describing the object a structured call must return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Schema name; some providers require one (`[a-zA-Z0-9_-]+`).
    pub name: String,
    /// The JSON Schema document.
    pub schema: Value,
}

impl OutputSchema {
    /// Generates the schema for `T`.
    pub fn for_type<T: JsonSchema>(name: impl Into<String>) -> Self {
        let root = schemars::schema_for!(T);
        Self {
            name: name.into(),
            schema: serde_json::to_value(&root).unwrap_or_default(),
        }
    }

    /// Schema of [`ResearchBrief`].
    pub fn research_brief() -> Self {
        Self::for_type::<ResearchBrief>("research_brief")
    }

    /// Schema of [`ClarifyDecision`].
    pub fn clarify_decision() -> Self {
        Self::for_type::<ClarifyDecision>("clarify_decision")
    }

    /// Pretty-printed schema text for embedding in prompts.
    ///
    /// Key order is stable, so this is deterministic for a given schema.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.schema).unwrap_or_default()
    }
}
