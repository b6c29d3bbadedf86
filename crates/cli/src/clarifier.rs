//! [`Clarifier`] implementations for the terminal.

use async_trait::async_trait;
use dialoguer::Input;
use pipeline::{Clarifier, ClarifyError};

/// Asks on the controlling terminal.
///
/// The prompt blocks a worker thread; the pipeline's timeout bounds the wait
/// but cannot interrupt the read itself.
#[derive(Debug, Default)]
pub struct TerminalClarifier;

#[async_trait]
impl Clarifier for TerminalClarifier {
    async fn ask(&self, question: &str) -> Result<String, ClarifyError> {
        prompt_line(question.to_string()).await
    }
}

/// Refuses every question. Used with `--no-clarify` so that a clarification
/// request fails the run instead of waiting for input.
#[derive(Debug, Default)]
pub struct NonInteractive;

#[async_trait]
impl Clarifier for NonInteractive {
    async fn ask(&self, _question: &str) -> Result<String, ClarifyError> {
        Err(ClarifyError::Unavailable(
            "clarification is disabled (--no-clarify)".to_string(),
        ))
    }
}

/// Reads one line from the terminal. An empty line is returned as-is.
pub async fn prompt_line(prompt: String) -> Result<String, ClarifyError> {
    tokio::task::spawn_blocking(move || {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
    })
    .await
    .map_err(|err| ClarifyError::Unavailable(err.to_string()))?
    .map_err(|err| ClarifyError::Unavailable(err.to_string()))
}

/// The topic to run on, or `None` when `raw` is blank or looks like a file
/// path rather than a research topic.
pub fn usable_topic(raw: &str) -> Option<&str> {
    let topic = raw.trim();
    let looks_like_path = topic.ends_with(".py") || topic.contains('/') || topic.contains('\\');
    (!topic.is_empty() && !looks_like_path).then_some(topic)
}
