mod support;

use std::sync::Arc;
use std::time::Duration;

use nodes::ResearchPipeline;
use pipeline::{
    BriefDate, InputError, ModelError, PipelineStage, RawOutput, Role, RunFailure, RunLimits,
    RunOutcome,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{
    page, searches, transport_error, valid_brief, Calls, NoClarifier, StubClarifier, StubModel,
    StubSearch,
};

fn run_date() -> BriefDate {
    BriefDate::parse("2026-10-18").unwrap()
}

fn pipeline_with(
    model: &Arc<StubModel>,
    search: &Arc<StubSearch>,
    clarifier: Arc<dyn pipeline::Clarifier>,
) -> ResearchPipeline {
    ResearchPipeline::new(model.clone(), search.clone(), clarifier)
}

#[tokio::test]
async fn blank_topic_fails_before_any_model_call() {
    let model = Arc::new(StubModel::default());
    let search = Arc::new(StubSearch::default());
    let pipeline = pipeline_with(&model, &search, StubClarifier::answering("x"));

    let outcome = pipeline.run("   \n", run_date()).await;

    assert_eq!(outcome.stage(), PipelineStage::Failed);
    assert!(matches!(
        outcome.failure(),
        Some(RunFailure::Input(InputError::EmptyTopic))
    ));
    assert_eq!(model.calls.total(), 0);
    assert_eq!(
        outcome.state().history,
        vec![PipelineStage::Clarify, PipelineStage::Failed]
    );
}

#[tokio::test]
async fn clear_topic_moves_straight_to_brief_generation() {
    let model = Arc::new(StubModel::default());
    let search = Arc::new(StubSearch::default());
    let clarifier = StubClarifier::answering("unused");
    let pipeline = pipeline_with(&model, &search, clarifier.clone());

    let outcome = pipeline.run("quantum computing basics", run_date()).await;

    let state = outcome.state();
    assert_eq!(&state.history[..2], &[PipelineStage::Clarify, PipelineStage::GenerateBrief]);
    assert_eq!(Calls::get(&model.calls.clarify), 1);
    assert_eq!(clarifier.asked(), 0);
    assert_eq!(state.clarify_rounds, 0);

    let last = state.conversation.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, "Starting research now.");
}

#[tokio::test]
async fn clarification_answer_replaces_topic() {
    let model = Arc::new(StubModel::default().clarify(|n| {
        Ok(if n == 0 {
            json!({"need_clarification": true, "question": "Which region?", "verification": ""})
        } else {
            json!({"need_clarification": false, "question": "", "verification": "Got it."})
        })
    }));
    let search = Arc::new(StubSearch::default());
    let clarifier = StubClarifier::answering("  rice yields in Southeast Asia ");
    let pipeline = pipeline_with(&model, &search, clarifier.clone());

    let outcome = pipeline.run("rice", run_date()).await;

    assert_eq!(outcome.stage(), PipelineStage::Done);
    let state = outcome.state();
    assert_eq!(state.topic, "rice yields in Southeast Asia");
    assert_eq!(state.clarify_rounds, 1);
    assert_eq!(clarifier.asked(), 1);
    let transcript: Vec<(Role, &str)> = state
        .conversation
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        transcript,
        vec![
            (Role::User, "rice"),
            (Role::Assistant, "Which region?"),
            (Role::User, "rice yields in Southeast Asia"),
            (Role::Assistant, "Got it."),
        ]
    );
    assert_eq!(
        &state.history[..3],
        &[PipelineStage::Clarify, PipelineStage::Clarify, PipelineStage::GenerateBrief]
    );
}

#[tokio::test]
async fn endless_clarification_stops_at_round_cap() {
    let model = Arc::new(StubModel::default().clarify(|_| {
        Ok(json!({"need_clarification": true, "question": "More detail?", "verification": ""}))
    }));
    let search = Arc::new(StubSearch::default());
    let clarifier = StubClarifier::answering("some detail");
    let limits = RunLimits {
        max_clarify_rounds: 2,
        ..RunLimits::default()
    };
    let pipeline = pipeline_with(&model, &search, clarifier.clone()).with_limits(limits);

    let outcome = pipeline.run("ai", run_date()).await;

    assert_eq!(outcome.stage(), PipelineStage::Failed);
    assert!(matches!(
        outcome.failure(),
        Some(RunFailure::Input(InputError::ClarificationLimit { rounds: 2 }))
    ));
    assert_eq!(clarifier.asked(), 2);
    assert_eq!(Calls::get(&model.calls.brief), 0);
}

#[tokio::test(start_paused = true)]
async fn unanswered_question_times_out() {
    let model = Arc::new(StubModel::default().clarify(|_| {
        Ok(json!({"need_clarification": true, "question": "Which years?"}))
    }));
    let search = Arc::new(StubSearch::default());
    let limits = RunLimits {
        clarify_timeout: Duration::from_secs(5),
        ..RunLimits::default()
    };
    let pipeline = pipeline_with(
        &model,
        &search,
        StubClarifier::silent_for(Duration::from_secs(3600)),
    )
    .with_limits(limits);

    let outcome = pipeline.run("inflation", run_date()).await;

    assert!(matches!(
        outcome.failure(),
        Some(RunFailure::Input(InputError::ClarificationTimeout { .. }))
    ));
}

#[tokio::test]
async fn unavailable_clarifier_fails_the_run() {
    let model = Arc::new(StubModel::default().clarify(|_| {
        Ok(json!({"need_clarification": true, "question": "Which years?"}))
    }));
    let search = Arc::new(StubSearch::default());
    let pipeline = pipeline_with(&model, &search, Arc::new(NoClarifier));

    let outcome = pipeline.run("inflation", run_date()).await;

    assert!(matches!(
        outcome.failure(),
        Some(RunFailure::Input(InputError::ClarifierUnavailable { .. }))
    ));
}

#[tokio::test]
async fn blank_answer_is_an_input_error() {
    let model = Arc::new(StubModel::default().clarify(|_| {
        Ok(json!({"need_clarification": true, "question": "Which years?"}))
    }));
    let search = Arc::new(StubSearch::default());
    let pipeline = pipeline_with(&model, &search, StubClarifier::answering("   "));

    let outcome = pipeline.run("inflation", run_date()).await;

    assert!(matches!(
        outcome.failure(),
        Some(RunFailure::Input(InputError::EmptyAnswer))
    ));
}

#[tokio::test]
async fn invalid_brief_fails_at_parse_with_field_names() {
    let model = Arc::new(StubModel::default().brief(|_| {
        let mut brief = valid_brief();
        brief.as_object_mut().unwrap().remove("deliverables");
        brief["key_questions"] = json!(["a", "b", "c", "d"]);
        Ok(RawOutput::Text(brief.to_string()))
    }));
    let search = Arc::new(StubSearch::default());
    let pipeline = pipeline_with(&model, &search, StubClarifier::answering("x"));

    let outcome = pipeline.run("quantum computing basics", run_date()).await;

    let Some(RunFailure::Validation(failure)) = outcome.failure() else {
        panic!("expected a validation failure, got {outcome:?}");
    };
    assert!(failure.names("deliverables"));
    assert!(failure.names("key_questions"));
    assert!(failure.raw.contains("\"title\""));
    assert_eq!(
        outcome.state().history,
        vec![
            PipelineStage::Clarify,
            PipelineStage::GenerateBrief,
            PipelineStage::ParseBrief,
            PipelineStage::Failed,
        ]
    );
    assert!(outcome.state().raw_brief.is_some());
    assert_eq!(Calls::get(&model.calls.decide), 0);
}

#[tokio::test]
async fn fenced_brief_text_is_accepted() {
    let model = Arc::new(StubModel::default().brief(|_| {
        Ok(RawOutput::Text(format!(
            "Here is the brief:\n```json\n{}\n```",
            valid_brief()
        )))
    }));
    let search = Arc::new(StubSearch::default());
    let pipeline = pipeline_with(&model, &search, StubClarifier::answering("x"));

    let outcome = pipeline.run("quantum computing basics", run_date()).await;

    assert_eq!(outcome.stage(), PipelineStage::Done);
}

#[tokio::test]
async fn undecodable_brief_reply_fails_at_parse() {
    let model = Arc::new(StubModel::default().brief(|_| {
        Err(ModelError::SchemaMismatch {
            message: "expected JSON".into(),
            raw: "I cannot help with that.".into(),
        })
    }));
    let search = Arc::new(StubSearch::default());
    let pipeline = pipeline_with(&model, &search, StubClarifier::answering("x"));

    let outcome = pipeline.run("quantum computing basics", run_date()).await;

    let Some(RunFailure::Validation(failure)) = outcome.failure() else {
        panic!("expected a validation failure, got {outcome:?}");
    };
    assert_eq!(failure.raw, "I cannot help with that.");
    assert_eq!(Calls::get(&model.calls.brief), 1);
}

#[tokio::test]
async fn brief_transport_failure_fails_at_generation() {
    let model = Arc::new(StubModel::default().brief(|_| Err(transport_error())));
    let search = Arc::new(StubSearch::default());
    let pipeline = pipeline_with(&model, &search, StubClarifier::answering("x"));

    let outcome = pipeline.run("quantum computing basics", run_date()).await;

    assert!(matches!(
        outcome.failure(),
        Some(RunFailure::Model {
            stage: PipelineStage::GenerateBrief,
            ..
        })
    ));
}

#[tokio::test]
async fn disabled_research_finishes_after_scope() {
    let model = Arc::new(StubModel::default());
    let search = Arc::new(StubSearch::default());
    let limits = RunLimits {
        research_enabled: false,
        ..RunLimits::default()
    };
    let pipeline =
        pipeline_with(&model, &search, StubClarifier::answering("x")).with_limits(limits);

    let outcome = pipeline.run("quantum computing basics", run_date()).await;

    let report = outcome.report().unwrap();
    assert_eq!(report.compressed_report, "");
    assert!(report.sources.is_empty());
    assert_eq!(Calls::get(&model.calls.decide), 0);
    assert_eq!(
        &outcome.state().history[3..],
        &[PipelineStage::BuildScope, PipelineStage::Done]
    );
}

#[tokio::test]
async fn quantum_computing_run_reports_two_sources() {
    let model = Arc::new(StubModel::default().decide(|n| {
        Ok(if n == 0 {
            searches(&["quantum computing basics overview"])
        } else {
            pipeline::ModelReply::text("I have enough.")
        })
    }));
    let search = Arc::new(StubSearch::default().always(vec![
        page("https://qc.example/intro", "Intro to qubits"),
        page("https://qc.example/hardware", "Quantum hardware"),
    ]));
    let pipeline = pipeline_with(&model, &search, StubClarifier::answering("x"));

    let outcome = pipeline.run("quantum computing basics", run_date()).await;

    let RunOutcome::Done { report, state } = &outcome else {
        panic!("expected Done, got {outcome:?}");
    };
    assert_eq!(
        state.history,
        vec![
            PipelineStage::Clarify,
            PipelineStage::GenerateBrief,
            PipelineStage::ParseBrief,
            PipelineStage::BuildScope,
            PipelineStage::ResearchLoop,
            PipelineStage::Done,
        ]
    );

    assert_eq!(report.brief.date(), "2026-10-18");
    assert!(report
        .scope_statement
        .starts_with("I want to research Quantum computing basics"));
    assert_eq!(
        report.sources,
        vec!["https://qc.example/intro", "https://qc.example/hardware"]
    );
    assert_eq!(report.compressed_report.matches("--- SOURCE").count(), 2);
    assert!(report.compressed_report.contains("[2] Quantum hardware: https://qc.example/hardware"));
    assert!(!report.compressed_report.contains("[3]"));
    assert!(report.compressed_report.contains("Final synthesis."));
    assert!(report.compressed_report.contains(" • quantum computing basics overview"));

    assert_eq!(search.sent(), vec!["quantum computing basics overview"]);
    assert_eq!(Calls::get(&model.calls.summarize), 2);
    assert_eq!(Calls::get(&model.calls.compress), 1);
    assert!(state.usage.total().as_u64() > 0);
}
