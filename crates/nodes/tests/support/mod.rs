//! Scripted stand-ins for the model, search and clarifier ports.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    Clarifier, ClarifyError, CompletionRequest, Message, ModelError, ModelGateway, ModelName,
    ModelReply, OutputSchema, PromptBuilder, RawOutput, RetryPolicy, Role, SearchError,
    SearchGateway, SearchResult, StructuredReply, TokenUsage, ToolCall, ToolCallId,
};
use serde_json::{json, Value};

pub fn valid_brief() -> Value {
    json!({
        "title": "Quantum computing basics",
        "date": "2025-02-01",
        "problem_statement": "Newcomers lack a compact map of the field.",
        "key_questions": ["What is a qubit?", "Which hardware approaches lead?"],
        "method_brief": ["Literature review", "Vendor roadmap comparison"],
        "deliverables": ["Summary report", "Glossary"]
    })
}

pub fn search_call(id: usize, query: &str) -> ToolCall {
    ToolCall {
        id: ToolCallId::new(format!("call_{id}")).unwrap(),
        name: "search".to_string(),
        arguments: json!({ "query": query }),
    }
}

/// A decide reply requesting one search per query.
pub fn searches(queries: &[&str]) -> ModelReply {
    ModelReply {
        content: String::new(),
        tool_calls: queries
            .iter()
            .enumerate()
            .map(|(i, q)| search_call(i, q))
            .collect(),
        usage: TokenUsage::new(10, 5),
    }
}

pub fn transport_error() -> ModelError {
    ModelError::Transport {
        message: "connection reset".into(),
        retry: RetryPolicy::NonRetryable,
    }
}

type Script<T> = Box<dyn Fn(usize) -> Result<T, ModelError> + Send + Sync>;

#[derive(Default)]
pub struct Calls {
    pub clarify: AtomicUsize,
    pub brief: AtomicUsize,
    pub decide: AtomicUsize,
    pub summarize: AtomicUsize,
    pub compress: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        [
            &self.clarify,
            &self.brief,
            &self.decide,
            &self.summarize,
            &self.compress,
        ]
        .into_iter()
        .map(Self::get)
        .sum()
    }
}

/// Routes each call by its shape: structured calls by schema name, tool calls
/// to the decide script, the compression instruction to `compress`, and
/// anything else to the summarizer.
pub struct StubModel {
    clarify: Script<Value>,
    brief: Script<RawOutput>,
    decide: Script<ModelReply>,
    summary: Script<String>,
    compress: Script<String>,
    compress_instruction: String,
    pub calls: Calls,
    pub summarized_prompts: Mutex<Vec<String>>,
}

impl Default for StubModel {
    fn default() -> Self {
        Self {
            clarify: Box::new(|_| {
                Ok(json!({
                    "need_clarification": false,
                    "question": "",
                    "verification": "Starting research now."
                }))
            }),
            brief: Box::new(|_| Ok(RawOutput::Object(object(valid_brief())))),
            decide: Box::new(|_| Ok(ModelReply::text("done"))),
            summary: Box::new(|_| Ok("Summary: canned summary.\nKey excerpts: none".to_string())),
            compress: Box::new(|_| Ok("Final synthesis.".to_string())),
            compress_instruction: PromptBuilder::new().compress_instruction().into_string(),
            calls: Calls::default(),
            summarized_prompts: Mutex::new(Vec::new()),
        }
    }
}

fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

impl StubModel {
    pub fn clarify(
        mut self,
        f: impl Fn(usize) -> Result<Value, ModelError> + Send + Sync + 'static,
    ) -> Self {
        self.clarify = Box::new(f);
        self
    }

    pub fn brief(
        mut self,
        f: impl Fn(usize) -> Result<RawOutput, ModelError> + Send + Sync + 'static,
    ) -> Self {
        self.brief = Box::new(f);
        self
    }

    pub fn decide(
        mut self,
        f: impl Fn(usize) -> Result<ModelReply, ModelError> + Send + Sync + 'static,
    ) -> Self {
        self.decide = Box::new(f);
        self
    }

    pub fn summary(
        mut self,
        f: impl Fn(usize) -> Result<String, ModelError> + Send + Sync + 'static,
    ) -> Self {
        self.summary = Box::new(f);
        self
    }

    pub fn compress(
        mut self,
        f: impl Fn(usize) -> Result<String, ModelError> + Send + Sync + 'static,
    ) -> Self {
        self.compress = Box::new(f);
        self
    }

    fn is_compress(&self, request: &CompletionRequest) -> bool {
        request
            .messages
            .last()
            .is_some_and(|m| m.role == Role::User && m.content == self.compress_instruction)
    }
}

fn bump(counter: &AtomicUsize) -> usize {
    counter.fetch_add(1, Ordering::SeqCst)
}

#[async_trait]
impl ModelGateway for StubModel {
    fn model_name(&self) -> ModelName {
        ModelName::new("stub-model").unwrap()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, ModelError> {
        if self.is_compress(request) {
            let n = bump(&self.calls.compress);
            return (self.compress)(n).map(ModelReply::text);
        }
        if !request.tools.is_empty() {
            let n = bump(&self.calls.decide);
            return (self.decide)(n);
        }
        let n = bump(&self.calls.summarize);
        if let Some(first) = request.messages.first() {
            self.summarized_prompts
                .lock()
                .unwrap()
                .push(first.content.clone());
        }
        (self.summary)(n).map(|text| ModelReply {
            content: text,
            tool_calls: Vec::new(),
            usage: TokenUsage::new(3, 2),
        })
    }

    async fn complete_structured(
        &self,
        _messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<StructuredReply, ModelError> {
        let output = match schema.name.as_str() {
            "clarify_decision" => {
                let n = bump(&self.calls.clarify);
                RawOutput::Object(object((self.clarify)(n)?))
            }
            _ => {
                let n = bump(&self.calls.brief);
                (self.brief)(n)?
            }
        };
        Ok(StructuredReply {
            output,
            usage: TokenUsage::new(20, 10),
        })
    }
}

/// Search stand-in keyed by query; unknown queries return no results.
#[derive(Default)]
pub struct StubSearch {
    results: HashMap<String, Result<Vec<SearchResult>, SearchError>>,
    fallback: Option<Vec<SearchResult>>,
    pub queries: Mutex<Vec<String>>,
}

impl StubSearch {
    pub fn with(mut self, query: &str, results: Result<Vec<SearchResult>, SearchError>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    /// Results returned for every query without an explicit entry.
    pub fn always(mut self, results: Vec<SearchResult>) -> Self {
        self.fallback = Some(results);
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchGateway for StubSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.queries.lock().unwrap().push(query.to_string());
        match self.results.get(query) {
            Some(Ok(results)) => Ok(results.iter().take(max_results).cloned().collect()),
            Some(Err(err)) => Err(err.clone()),
            None => Ok(self.fallback.clone().unwrap_or_default()),
        }
    }
}

pub fn page(url: &str, title: &str) -> SearchResult {
    SearchResult {
        url: url.to_string(),
        title: title.to_string(),
        content: format!("Snippet about {title}."),
        raw_content: Some(format!("Full text of {title}.")),
    }
}

/// Answers every question with a fixed reply.
pub struct StubClarifier {
    answer: String,
    delay: Option<Duration>,
    pub asked: AtomicUsize,
}

impl StubClarifier {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            delay: None,
            asked: AtomicUsize::new(0),
        })
    }

    pub fn silent_for(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer: "too late".to_string(),
            delay: Some(delay),
            asked: AtomicUsize::new(0),
        })
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clarifier for StubClarifier {
    async fn ask(&self, _question: &str) -> Result<String, ClarifyError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.answer.clone())
    }
}

/// Refuses every question, like a non-interactive session.
pub struct NoClarifier;

#[async_trait]
impl Clarifier for NoClarifier {
    async fn ask(&self, _question: &str) -> Result<String, ClarifyError> {
        Err(ClarifyError::Unavailable("no terminal".into()))
    }
}
