//! Briefsmith CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Load configuration**: `briefsmith.toml`, `.env`, API key variables and
//!    flags, validated before anything else runs.
//! 2. **Wire observability**: `tracing-subscriber` to stderr, plus an
//!    OpenTelemetry OTLP exporter when an endpoint is configured.
//! 3. **Construct infrastructure**: the chat-completions provider, the Tavily
//!    client (or a local directory search) and a terminal clarifier, injected
//!    into [`ResearchPipeline`].
//! 4. **Run and report**: print the outcome, export the brief when an output
//!    directory is set, and exit non-zero on a failed run.

mod clarifier;
mod config;
mod export;
mod observability;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use files::DirectorySearch;
use llm::OpenAiCompatibleProvider;
use nodes::{RateLimiter, ResearchPipeline};
use pipeline::{BriefDate, Clarifier, SearchGateway};
use search::TavilyClient;
use tracing::{info, warn};

use crate::clarifier::{prompt_line, usable_topic, NonInteractive, TerminalClarifier};
use crate::config::{FileConfig, Overrides, SearchBackend, Settings};

const EXIT_FAILED_RUN: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "briefsmith", version)]
#[command(about = "Turn a research topic into a validated brief and a sourced report")]
struct Cli {
    /// Topic to research. Prompted for when missing.
    #[arg(value_name = "TOPIC")]
    topic: Option<String>,

    /// Configuration file [default: ./briefsmith.toml if present]
    #[arg(short, long, value_name = "FILE", env = "BRIEFSMITH_CONFIG")]
    config: Option<PathBuf>,

    /// Write sampleN.json and sampleN.md here
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Stop after the brief and scope statement; skip web research
    #[arg(long)]
    brief_only: bool,

    /// Fail instead of asking clarifying questions
    #[arg(long)]
    no_clarify: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Date to stamp the brief with (YYYY-MM-DD) [default: today]
    #[arg(long, value_parser = parse_date)]
    date: Option<BriefDate>,

    /// Model name, overriding the config file
    #[arg(long)]
    model: Option<String>,

    /// Chat-completions base URL, overriding the config file
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Research loop iterations, overriding the config file
    #[arg(long, value_name = "N")]
    max_iterations: Option<u32>,

    /// Research the files under this directory instead of the web
    #[arg(long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Export spans to this OTLP/gRPC collector
    #[arg(long, value_name = "URL", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            output_dir: self.output_dir.clone(),
            json: self.json,
            brief_only: self.brief_only,
            max_iterations: self.max_iterations,
            directory: self.directory.clone(),
            otlp_endpoint: self.otlp_endpoint.clone(),
            json_logs: self.log_json,
        }
    }
}

fn parse_date(value: &str) -> Result<BriefDate, String> {
    BriefDate::parse(value).ok_or_else(|| format!("expected YYYY-MM-DD, got {value:?}"))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_USAGE
        }
    };

    // Exit explicitly: a timed-out clarification prompt can still be blocked
    // on stdin, and dropping the runtime would wait for it.
    std::process::exit(code);
}

async fn run(cli: &Cli) -> anyhow::Result<i32> {
    let file = FileConfig::load(cli.config.as_deref())?;
    let settings = Settings::resolve(file, cli.overrides(), |name| std::env::var(name).ok())?;

    let telemetry = observability::init(
        cli.verbose,
        settings.telemetry.json_logs,
        settings.telemetry.otlp_endpoint.as_deref(),
    )?;
    let result = research(cli, &settings).await;
    telemetry.shutdown();
    result
}

async fn research(cli: &Cli, settings: &Settings) -> anyhow::Result<i32> {
    let provider = OpenAiCompatibleProvider::new(settings.provider.clone())
        .context("failed to build the model client")?;
    let search: Arc<dyn SearchGateway> = match &settings.search {
        SearchBackend::Web(config) => Arc::new(
            TavilyClient::new(config.clone()).context("failed to build the search client")?,
        ),
        SearchBackend::Directory(config) => {
            let search = DirectorySearch::new(config.clone())
                .context("cannot research the given directory")?;
            let found = search.discover()?.len();
            info!(root = %search.root().display(), files = found, "researching local files");
            Arc::new(search)
        }
    };
    let clarifier: Arc<dyn Clarifier> = if cli.no_clarify {
        Arc::new(NonInteractive)
    } else {
        Arc::new(TerminalClarifier)
    };

    let mut pipeline = ResearchPipeline::new(Arc::new(provider), search, clarifier)
        .with_limits(settings.limits.clone())
        .with_retry(settings.retry.clone());
    if let Some(limiter) = settings
        .requests_per_second
        .and_then(|rate| RateLimiter::new(rate, RateLimiter::DEFAULT_BURST))
    {
        pipeline = pipeline.with_rate_limit(limiter);
    }

    let topic = resolve_topic(cli.topic.as_deref(), !cli.no_clarify).await;
    let date = cli.date.unwrap_or_else(BriefDate::today);
    let outcome = pipeline.run(&topic, date).await;

    let usage = outcome.state().usage;
    info!(
        prompt_tokens = usage.prompt.as_u64(),
        completion_tokens = usage.completion.as_u64(),
        total_tokens = usage.total().as_u64(),
        "token usage"
    );

    if settings.json {
        println!("{}", render::outcome_json(&outcome)?);
    } else {
        println!("{}", render::outcome_markdown(&outcome));
    }

    if let (Some(dir), Some(report)) = (&settings.output_dir, outcome.report()) {
        let files = export::export_brief(dir, &report.brief)
            .with_context(|| format!("failed to export the brief to {}", dir.display()))?;
        info!(
            json = %files.json.display(),
            markdown = %files.markdown.display(),
            "brief exported"
        );
    }

    Ok(if outcome.failure().is_some() {
        EXIT_FAILED_RUN
    } else {
        0
    })
}

/// The topic argument when usable, otherwise one read from the terminal.
/// Returns an empty topic (which fails the run) when neither is available.
async fn resolve_topic(arg: Option<&str>, interactive: bool) -> String {
    if let Some(topic) = arg.and_then(usable_topic) {
        return topic.to_string();
    }
    if let Some(raw) = arg.filter(|raw| !raw.trim().is_empty()) {
        warn!(topic = raw, "ignoring topic that looks like a file path");
    }
    if !interactive {
        return String::new();
    }

    match prompt_line("What would you like to research?".to_string()).await {
        Ok(answer) => usable_topic(&answer).unwrap_or_default().to_string(),
        Err(err) => {
            warn!(error = %err, "could not prompt for a topic");
            String::new()
        }
    }
}
