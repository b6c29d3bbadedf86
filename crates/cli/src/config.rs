//! `briefsmith.toml` loading and resolution against the environment and
//! command-line flags.
//!
//! Precedence, lowest first: built-in defaults, the config file, environment
//! variables (API keys only), flags. Everything is validated here so that a
//! bad configuration fails before the first model call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use files::DirectoryConfig;
use llm::{ProviderConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use nodes::{RateLimiter, RetryConfig};
use pipeline::{ModelName, RunLimits};
use search::{TavilyConfig, TavilyTopic, TAVILY_ENDPOINT};
use serde::Deserialize;
use thiserror::Error;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "briefsmith.toml";

/// Model API key variables, in lookup order.
pub const MODEL_KEY_VARS: &[&str] = &["BRIEFSMITH_MODEL_API_KEY", "GOOGLE_API_KEY", "OPENAI_API_KEY"];

/// Search API key variables, in lookup order.
pub const SEARCH_KEY_VARS: &[&str] = &["TAVILY_API_KEY"];

/// Failed decide steps do not use up iterations, so this also bounds how
/// many model calls a run can waste on them.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing API key: set {}", .vars.join(" or "))]
    MissingKey { vars: &'static [&'static str] },

    #[error("invalid {field}: {problem}")]
    Invalid { field: &'static str, problem: String },
}

// ---------------------------------------------------------------------------
// File model
// ---------------------------------------------------------------------------

/// The on-disk configuration. Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub model: ModelSection,
    pub search: SearchSection,
    pub limits: RunLimits,
    pub output: OutputSection,
    pub telemetry: TelemetrySection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSection {
    pub name: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    pub timeout_secs: u64,
    /// Ask the provider for `json_schema` output on structured calls.
    pub structured_output: bool,
    pub transport_retries: u32,
    pub max_backoff_secs: u64,
    /// Paces model calls; unlimited when unset.
    pub requests_per_second: Option<f64>,
}

impl Default for ModelSection {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            name: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.0,
            max_output_tokens: None,
            timeout_secs: 120,
            structured_output: true,
            transport_retries: retry.transport_retries,
            max_backoff_secs: retry.max_backoff.as_secs(),
            requests_per_second: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSection {
    pub endpoint: String,
    pub topic: TavilyTopic,
    pub include_raw_content: bool,
    pub timeout_secs: u64,
    /// Research the files under this directory instead of the web.
    pub directory: Option<PathBuf>,
    pub max_files_to_read: usize,
    pub max_file_size_mb: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: TAVILY_ENDPOINT.to_string(),
            topic: TavilyTopic::default(),
            include_raw_content: true,
            timeout_secs: 30,
            directory: None,
            max_files_to_read: 10,
            max_file_size_mb: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    /// Where `sampleN.json` / `sampleN.md` are written. No export when unset.
    pub directory: Option<PathBuf>,
    /// Print the result as JSON instead of text.
    pub json: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySection {
    /// OTLP/gRPC collector endpoint. Spans are only exported when set.
    pub otlp_endpoint: Option<String>,
    /// Emit logs as JSON lines.
    pub json_logs: bool,
}

impl FileConfig {
    /// Loads `explicit` (which must exist) or, failing that, the default
    /// file if present. A missing default file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::read(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::read(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Flag values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub json: bool,
    pub brief_only: bool,
    pub max_iterations: Option<u32>,
    pub directory: Option<PathBuf>,
    pub otlp_endpoint: Option<String>,
    pub json_logs: bool,
}

/// Where the research loop looks things up.
#[derive(Debug, Clone)]
pub enum SearchBackend {
    Web(TavilyConfig),
    Directory(DirectoryConfig),
}

/// Fully resolved, validated settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderConfig,
    pub search: SearchBackend,
    pub limits: RunLimits,
    pub retry: RetryConfig,
    /// Model calls per second, when paced.
    pub requests_per_second: Option<f64>,
    pub output_dir: Option<PathBuf>,
    pub json: bool,
    pub telemetry: TelemetrySection,
}

impl Settings {
    /// Merges `file`, `overrides` and the variables visible through `env`.
    pub fn resolve<E>(file: FileConfig, overrides: Overrides, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let FileConfig {
            model,
            search,
            mut limits,
            output,
            mut telemetry,
        } = file;

        if overrides.brief_only {
            limits.research_enabled = false;
        }
        if let Some(max_iterations) = overrides.max_iterations {
            limits.max_iterations = max_iterations;
        }
        validate_limits(&limits)?;

        let name = overrides.model.unwrap_or(model.name);
        let model_name = ModelName::new(name.trim()).ok_or(ConfigError::Invalid {
            field: "model.name",
            problem: "must not be blank".to_string(),
        })?;
        if !(0.0..=2.0).contains(&model.temperature) {
            return Err(ConfigError::Invalid {
                field: "model.temperature",
                problem: format!("{} is outside 0.0..=2.0", model.temperature),
            });
        }
        let model_timeout = positive_secs("model.timeout_secs", model.timeout_secs)?;
        if let Some(rate) = model.requests_per_second {
            if RateLimiter::new(rate, RateLimiter::DEFAULT_BURST).is_none() {
                return Err(ConfigError::Invalid {
                    field: "model.requests_per_second",
                    problem: format!("{rate} is not a positive number"),
                });
            }
        }
        let model_key = first_set(&env, MODEL_KEY_VARS).ok_or(ConfigError::MissingKey {
            vars: MODEL_KEY_VARS,
        })?;
        let provider = ProviderConfig::new(model_key, model_name)
            .with_base_url(overrides.base_url.unwrap_or(model.base_url))
            .with_temperature(model.temperature)
            .with_max_output_tokens(model.max_output_tokens)
            .with_timeout(model_timeout)
            .with_structured_output(model.structured_output);

        let search = match overrides.directory.or(search.directory.clone()) {
            Some(root) => SearchBackend::Directory(directory_config(root, &search)?),
            None => SearchBackend::Web(web_config(search, limits.research_enabled, &env)?),
        };

        if overrides.otlp_endpoint.is_some() {
            telemetry.otlp_endpoint = overrides.otlp_endpoint;
        }
        telemetry.json_logs |= overrides.json_logs;

        Ok(Self {
            provider,
            search,
            limits,
            retry: RetryConfig {
                transport_retries: model.transport_retries,
                max_backoff: Duration::from_secs(model.max_backoff_secs),
            },
            requests_per_second: model.requests_per_second,
            output_dir: overrides.output_dir.or(output.directory),
            json: overrides.json || output.json,
            telemetry,
        })
    }
}

fn web_config<E>(
    search: SearchSection,
    research_enabled: bool,
    env: &E,
) -> Result<TavilyConfig, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    // The search key is only needed when the research loop will run.
    let key = match first_set(env, SEARCH_KEY_VARS) {
        Some(key) => key,
        None if research_enabled => {
            return Err(ConfigError::MissingKey {
                vars: SEARCH_KEY_VARS,
            })
        }
        None => String::new(),
    };
    Ok(TavilyConfig::new(key)
        .with_endpoint(search.endpoint)
        .with_topic(search.topic)
        .with_raw_content(search.include_raw_content)
        .with_timeout(positive_secs("search.timeout_secs", search.timeout_secs)?))
}

fn directory_config(root: PathBuf, search: &SearchSection) -> Result<DirectoryConfig, ConfigError> {
    if search.max_files_to_read == 0 {
        return Err(ConfigError::Invalid {
            field: "search.max_files_to_read",
            problem: "must be at least 1".to_string(),
        });
    }
    if search.max_file_size_mb == 0 {
        return Err(ConfigError::Invalid {
            field: "search.max_file_size_mb",
            problem: "must be at least 1".to_string(),
        });
    }
    Ok(DirectoryConfig::new(root)
        .with_max_files_to_read(search.max_files_to_read)
        .with_max_file_bytes(search.max_file_size_mb.saturating_mul(1024 * 1024)))
}

fn validate_limits(limits: &RunLimits) -> Result<(), ConfigError> {
    if limits.max_results_per_query == 0 {
        return Err(ConfigError::Invalid {
            field: "limits.max_results_per_query",
            problem: "must be at least 1".to_string(),
        });
    }
    if limits.summary_char_budget == 0 {
        return Err(ConfigError::Invalid {
            field: "limits.summary_char_budget",
            problem: "must be at least 1".to_string(),
        });
    }
    if !(1..=MAX_CONSECUTIVE_FAILURES).contains(&limits.max_consecutive_failures) {
        return Err(ConfigError::Invalid {
            field: "limits.max_consecutive_failures",
            problem: format!("must be between 1 and {MAX_CONSECUTIVE_FAILURES}"),
        });
    }
    positive_secs("limits.clarify_timeout", limits.clarify_timeout.as_secs())?;
    Ok(())
}

fn positive_secs(field: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            field,
            problem: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// First variable in `names` with a non-blank value.
fn first_set<E>(env: &E, names: &[&str]) -> Option<String>
where
    E: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|name| env(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}
