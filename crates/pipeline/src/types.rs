//! Shared value types for the research domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values that participate in domain computations (token accounting,
//! run timing).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Token accounting
// ---------------------------------------------------------------------------

/// Number of tokens consumed in an LLM API call.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenCount(u64);

impl TokenCount {
    /// Creates a [`TokenCount`] from a raw integer.
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TokenCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for TokenCount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for TokenCount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

// ---------------------------------------------------------------------------

/// Prompt and completion token counts reported by a provider.
///
/// Providers that do not report usage produce [`TokenUsage::default`], which
/// adds nothing when accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens sent to the model.
    pub prompt: TokenCount,
    /// Tokens generated by the model.
    pub completion: TokenCount,
}

impl TokenUsage {
    /// Creates a usage record from raw counts.
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self {
            prompt: TokenCount::new(prompt),
            completion: TokenCount::new(completion),
        }
    }

    /// Total tokens across prompt and completion.
    pub fn total(self) -> TokenCount {
        self.prompt + self.completion
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt += rhs.prompt;
        self.completion += rhs.completion;
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// When a run started, in UTC. Rendered as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------

/// The calendar date a run is anchored to, rendered as `YYYY-MM-DD`.
///
/// Passed explicitly into every prompt builder so that prompt text is a pure
/// function of its inputs. Only the composition root calls
/// [`BriefDate::today`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BriefDate(NaiveDate);

impl BriefDate {
    /// Today's date in UTC.
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }

    /// Parses a `YYYY-MM-DD` string, returning `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .ok()
            .map(Self)
    }
}

impl std::fmt::Display for BriefDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates_without_overflow() {
        let mut usage = TokenUsage::new(10, 5);
        usage += TokenUsage::new(u64::MAX, 1);
        assert_eq!(usage.prompt.as_u64(), u64::MAX);
        assert_eq!(usage.completion.as_u64(), 6);
    }

    #[test]
    fn brief_date_round_trips_through_display() {
        let date = BriefDate::parse("2025-03-09").unwrap();
        assert_eq!(date.to_string(), "2025-03-09");
        assert!(BriefDate::parse("09 Mar 2025").is_none());
    }
}
