//! The clarify-then-brief state machine.
//!
//! `Clarify → GenerateBrief → ParseBrief → BuildScope → ResearchLoop → Done`,
//! with `Failed` reachable from every non-terminal stage. Each transition is
//! recorded in [`PipelineRunState::history`] and logged.

use std::sync::Arc;

use pipeline::{
    decode_clarify_decision, validate_brief, BriefDate, Clarifier, ClarifyError, InputError,
    Message, ModelError, ModelGateway, OutputSchema, PipelineRunState, PipelineStage,
    PromptBuilder, RawOutput, ResearchBrief, ResearchReport, RunFailure, RunLimits, RunOutcome,
    SearchGateway,
};
use tracing::{info, info_span, warn, Instrument};

use crate::gateway::{LlmGateway, RateLimiter, RetryConfig};
use crate::research_loop::ResearchLoop;

const FALLBACK_QUESTION: &str =
    "Could you describe the scope of the research you need in a little more detail?";

/// Drives one run from a topic to a terminal [`RunOutcome`].
///
/// Collaborators are injected as trait objects; the pipeline owns no clients
/// and reads no configuration of its own.
pub struct ResearchPipeline {
    model: LlmGateway,
    search: Arc<dyn SearchGateway>,
    clarifier: Arc<dyn Clarifier>,
    prompts: PromptBuilder,
    limits: RunLimits,
}

impl ResearchPipeline {
    pub fn new(
        model: Arc<dyn ModelGateway>,
        search: Arc<dyn SearchGateway>,
        clarifier: Arc<dyn Clarifier>,
    ) -> Self {
        Self {
            model: LlmGateway::new(model),
            search,
            clarifier,
            prompts: PromptBuilder::new(),
            limits: RunLimits::default(),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.model = self.model.with_retry(retry);
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, limiter: RateLimiter) -> Self {
        self.model = self.model.with_rate_limit(limiter);
        self
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }

    /// Runs the pipeline on `topic`, anchored to `date`.
    ///
    /// Never returns an error: model, search, validation and input failures
    /// all end in [`RunOutcome::Failed`] with the state reached so far.
    pub async fn run(&self, topic: &str, date: BriefDate) -> RunOutcome {
        let mut state = PipelineRunState::new(topic.trim(), date);
        let span = info_span!(
            "research_run",
            run_id = %state.run_id,
            model = %self.model.model_name(),
            %date
        );

        async move {
            info!(topic = %state.topic, "run started");
            match self.drive(&mut state).await {
                Ok(report) => {
                    transition(&mut state, PipelineStage::Done);
                    info!(
                        sources = report.sources.len(),
                        prompt_tokens = state.usage.prompt.as_u64(),
                        completion_tokens = state.usage.completion.as_u64(),
                        "run finished"
                    );
                    RunOutcome::Done {
                        report,
                        state: Box::new(state),
                    }
                }
                Err(failure) => {
                    warn!(at = %state.stage, error = %failure, "run failed");
                    transition(&mut state, PipelineStage::Failed);
                    RunOutcome::Failed {
                        failure,
                        state: Box::new(state),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, state: &mut PipelineRunState) -> Result<ResearchReport, RunFailure> {
        if state.topic.is_empty() {
            return Err(InputError::EmptyTopic.into());
        }

        self.clarify(state).await?;

        transition(state, PipelineStage::GenerateBrief);
        let raw = self.generate_brief(state).await?;

        transition(state, PipelineStage::ParseBrief);
        let brief = self.parse_brief(state, &raw)?;

        transition(state, PipelineStage::BuildScope);
        let scope = brief.scope_statement();
        state.scope_statement = Some(scope.clone());

        if self.limits.research_enabled {
            transition(state, PipelineStage::ResearchLoop);
            ResearchLoop::new(
                &self.model,
                self.search.as_ref(),
                &self.prompts,
                &self.limits,
            )
            .run(state, &scope)
            .await;
        } else {
            info!("research disabled; finishing after scope");
        }

        Ok(ResearchReport {
            brief,
            scope_statement: scope,
            compressed_report: state.compressed_report.clone().unwrap_or_default(),
            sources: state.sources.iter().map(|url| url.to_string()).collect(),
        })
    }

    async fn clarify(&self, state: &mut PipelineRunState) -> Result<(), RunFailure> {
        state.conversation.push(Message::user(state.topic.clone()));

        loop {
            let prompt =
                self.prompts
                    .build_clarify_prompt(&state.topic, state.date, &state.conversation);
            let reply = self
                .model
                .complete_structured(&[Message::user(prompt)], &OutputSchema::clarify_decision())
                .await
                .map_err(clarify_failure)?;
            state.usage += reply.usage;

            let decision = decode_clarify_decision(reply.output).map_err(clarify_failure)?;
            state.clarify_decision = Some(decision.clone());

            if !decision.need_clarification {
                let verification = match decision.verification.trim() {
                    "" => format!("Thanks. Starting research on: {}", state.topic),
                    text => text.to_string(),
                };
                info!(rounds = state.clarify_rounds, "no clarification needed");
                state.conversation.push(Message::assistant(verification));
                return Ok(());
            }

            if state.clarify_rounds >= self.limits.max_clarify_rounds {
                return Err(InputError::ClarificationLimit {
                    rounds: state.clarify_rounds,
                }
                .into());
            }

            let question = match decision.question.trim() {
                "" => FALLBACK_QUESTION.to_string(),
                text => text.to_string(),
            };
            info!(round = state.clarify_rounds + 1, question = %question, "asking for clarification");
            state.conversation.push(Message::assistant(question.clone()));

            let answer = self.ask(&question).await?;
            state.conversation.push(Message::user(answer.clone()));
            state.topic = answer;
            state.clarify_rounds += 1;
            transition(state, PipelineStage::Clarify);
        }
    }

    async fn ask(&self, question: &str) -> Result<String, InputError> {
        let timeout = self.limits.clarify_timeout;
        match tokio::time::timeout(timeout, self.clarifier.ask(question)).await {
            Err(_) => Err(InputError::ClarificationTimeout { after: timeout }),
            Ok(Err(ClarifyError::Unavailable(message))) => {
                Err(InputError::ClarifierUnavailable { message })
            }
            Ok(Ok(answer)) => match answer.trim() {
                "" => Err(InputError::EmptyAnswer),
                text => Ok(text.to_string()),
            },
        }
    }

    async fn generate_brief(&self, state: &mut PipelineRunState) -> Result<RawOutput, RunFailure> {
        let prompt = self.prompts.build_brief_prompt(&state.topic, state.date);
        let mut messages = state.conversation.clone();
        messages.push(Message::user(prompt));

        let raw = match self
            .model
            .complete_structured(&messages, &OutputSchema::research_brief())
            .await
        {
            Ok(reply) => {
                state.usage += reply.usage;
                reply.output
            }
            // Unparseable output goes to the validator so the failure names fields.
            Err(ModelError::SchemaMismatch { message, raw }) => {
                warn!(error = %message, "brief output did not decode");
                RawOutput::Text(raw)
            }
            Err(error) => {
                return Err(RunFailure::Model {
                    stage: PipelineStage::GenerateBrief,
                    error,
                })
            }
        };

        state.raw_brief = Some(raw.clone());
        Ok(raw)
    }

    fn parse_brief(
        &self,
        state: &mut PipelineRunState,
        raw: &RawOutput,
    ) -> Result<ResearchBrief, RunFailure> {
        match validate_brief(raw) {
            Ok(brief) => {
                let brief = brief.with_date(state.date);
                info!(title = %brief.title(), "brief validated");
                state.brief = Some(brief.clone());
                Ok(brief)
            }
            Err(failure) => {
                warn!(fields = ?failure.fields(), "brief failed validation");
                Err(failure.into())
            }
        }
    }
}

fn clarify_failure(error: ModelError) -> RunFailure {
    RunFailure::Model {
        stage: PipelineStage::Clarify,
        error,
    }
}

fn transition(state: &mut PipelineRunState, to: PipelineStage) {
    info!(from = %state.stage, %to, "pipeline transition");
    state.stage = to;
    state.history.push(to);
}
