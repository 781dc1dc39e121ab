//! Service configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Every layer may set any subset of fields.

use crate::context::SessionMode;
use crate::pipeline::{PipelineOptions, PromptPaths};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "insightflow.toml";

/// Fully resolved configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Listener settings.
    pub server: ServerConfig,
    /// Model and transport settings.
    pub agent: AgentConfig,
    /// Template locations.
    pub prompts: PromptsConfig,
    /// Artifact output.
    pub output: OutputConfig,
    /// Run behaviour.
    pub pipeline: PipelineConfig,
    /// Default database credentials for requests that omit them.
    pub supabase: SupabaseConfig,
    /// Subscriber settings.
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct AgentConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
    pub max_tool_rounds: u32,
    pub web_search: bool,
}

#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct PromptsConfig {
    pub dir: PathBuf,
    pub business_expert_file: String,
    pub market_analysis_file: String,
    pub customer_analysis_file: String,
}

#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct OutputConfig {
    pub base_dir: PathBuf,
    pub save_files: bool,
}

#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct PipelineConfig {
    pub session_mode: SessionMode,
    pub default_user_name: String,
}

#[derive(Clone, Debug, Default)]
#[allow(missing_docs)]
pub struct SupabaseConfig {
    pub project_id: Option<String>,
    pub access_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Where to look for a config file.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Explicit file. When unset, `insightflow.toml` and
    /// `config/insightflow.toml` are tried.
    pub config_path: Option<PathBuf>,
    /// Fail when no file is found.
    pub require_file: bool,
}

/// Configuration failures.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
            },
            agent: AgentConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4.1-mini".to_string(),
                temperature: 0.7,
                top_p: 0.9,
                timeout_secs: 300,
                max_tool_rounds: 8,
                web_search: true,
            },
            prompts: PromptsConfig {
                dir: PathBuf::from("prompts"),
                business_expert_file: crate::pipeline::BUSINESS_EXPERT_FILE.to_string(),
                market_analysis_file: crate::pipeline::MARKET_ANALYSIS_FILE.to_string(),
                customer_analysis_file: crate::pipeline::CUSTOMER_ANALYSIS_FILE.to_string(),
            },
            output: OutputConfig {
                base_dir: PathBuf::from("."),
                save_files: true,
            },
            pipeline: PipelineConfig {
                session_mode: SessionMode::Shared,
                default_user_name: "huimin".to_string(),
            },
            supabase: SupabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Compact,
            },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

fn parse_session_mode(key: &str, value: &str) -> Result<SessionMode, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "shared" => Ok(SessionMode::Shared),
        "detached" => Ok(SessionMode::Detached),
        _ => Err(invalid(key, value)),
    }
}

impl AppConfig {
    /// Loads defaults, the config file, then the process environment.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        Self::load_with_env(options, |key| std::env::var(key).ok())
    }

    /// Like [`AppConfig::load`] with an injectable environment.
    pub fn load_with_env<F>(options: LoadOptions, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = resolve_config_path(options.config_path.as_deref()) {
            config.apply_patch(read_patch(&path)?);
        } else if options.require_file {
            let expected = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env(|key| lookup(key).filter(|v| !v.trim().is_empty()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document over the defaults, without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let patch = toml::from_str::<ConfigPatch>(raw).map_err(|source| ConfigError::ParseFile {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        let mut config = Self::default();
        config.apply_patch(patch);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(api_key) = agent.api_key {
                self.agent.api_key = Some(api_key.into());
            }
            if let Some(base_url) = agent.base_url {
                self.agent.base_url = base_url;
            }
            if let Some(model) = agent.model {
                self.agent.model = model;
            }
            if let Some(temperature) = agent.temperature {
                self.agent.temperature = temperature;
            }
            if let Some(top_p) = agent.top_p {
                self.agent.top_p = top_p;
            }
            if let Some(timeout_secs) = agent.timeout_secs {
                self.agent.timeout_secs = timeout_secs;
            }
            if let Some(max_tool_rounds) = agent.max_tool_rounds {
                self.agent.max_tool_rounds = max_tool_rounds;
            }
            if let Some(web_search) = agent.web_search {
                self.agent.web_search = web_search;
            }
        }

        if let Some(prompts) = patch.prompts {
            if let Some(dir) = prompts.dir {
                self.prompts.dir = dir;
            }
            if let Some(file) = prompts.business_expert_file {
                self.prompts.business_expert_file = file;
            }
            if let Some(file) = prompts.market_analysis_file {
                self.prompts.market_analysis_file = file;
            }
            if let Some(file) = prompts.customer_analysis_file {
                self.prompts.customer_analysis_file = file;
            }
        }

        if let Some(output) = patch.output {
            if let Some(base_dir) = output.base_dir {
                self.output.base_dir = base_dir;
            }
            if let Some(save_files) = output.save_files {
                self.output.save_files = save_files;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(session_mode) = pipeline.session_mode {
                self.pipeline.session_mode = session_mode;
            }
            if let Some(default_user_name) = pipeline.default_user_name {
                self.pipeline.default_user_name = default_user_name;
            }
        }

        if let Some(supabase) = patch.supabase {
            if let Some(project_id) = supabase.project_id {
                self.supabase.project_id = Some(project_id);
            }
            if let Some(access_token) = supabase.access_token {
                self.supabase.access_token = Some(access_token.into());
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env<F>(&mut self, read_env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = read_env("INSIGHTFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port_key = ["INSIGHTFLOW_SERVER_PORT", "PORT"]
            .into_iter()
            .find_map(|key| read_env(key).map(|value| (key, value)));
        if let Some((key, value)) = port_key {
            self.server.port = value.trim().parse().map_err(|_| invalid(key, &value))?;
        }

        let api_key = read_env("INSIGHTFLOW_AGENT_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.agent.api_key = Some(value.into());
        }
        let base_url =
            read_env("INSIGHTFLOW_AGENT_BASE_URL").or_else(|| read_env("OPENAI_BASE_URL"));
        if let Some(value) = base_url {
            self.agent.base_url = value;
        }
        if let Some(value) = read_env("INSIGHTFLOW_AGENT_MODEL") {
            self.agent.model = value;
        }
        if let Some(value) = read_env("INSIGHTFLOW_AGENT_TEMPERATURE") {
            self.agent.temperature = parse_value("INSIGHTFLOW_AGENT_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("INSIGHTFLOW_AGENT_TOP_P") {
            self.agent.top_p = parse_value("INSIGHTFLOW_AGENT_TOP_P", &value)?;
        }
        if let Some(value) = read_env("INSIGHTFLOW_AGENT_TIMEOUT_SECS") {
            self.agent.timeout_secs = parse_value("INSIGHTFLOW_AGENT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("INSIGHTFLOW_AGENT_MAX_TOOL_ROUNDS") {
            self.agent.max_tool_rounds = parse_value("INSIGHTFLOW_AGENT_MAX_TOOL_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("INSIGHTFLOW_AGENT_WEB_SEARCH") {
            self.agent.web_search = parse_bool("INSIGHTFLOW_AGENT_WEB_SEARCH", &value)?;
        }

        if let Some(value) = read_env("INSIGHTFLOW_PROMPTS_DIR") {
            self.prompts.dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("INSIGHTFLOW_OUTPUT_BASE_DIR") {
            self.output.base_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("INSIGHTFLOW_OUTPUT_SAVE_FILES") {
            self.output.save_files = parse_bool("INSIGHTFLOW_OUTPUT_SAVE_FILES", &value)?;
        }

        if let Some(value) = read_env("INSIGHTFLOW_PIPELINE_SESSION_MODE") {
            self.pipeline.session_mode =
                parse_session_mode("INSIGHTFLOW_PIPELINE_SESSION_MODE", &value)?;
        }
        if let Some(value) = read_env("INSIGHTFLOW_PIPELINE_DEFAULT_USER_NAME") {
            self.pipeline.default_user_name = value;
        }

        if let Some(value) = read_env("SUPABASE_PROJECT_ID") {
            self.supabase.project_id = Some(value);
        }
        if let Some(value) = read_env("SUPABASE_ACCESS_TOKEN") {
            self.supabase.access_token = Some(value.into());
        }

        let log_level =
            read_env("INSIGHTFLOW_LOGGING_LEVEL").or_else(|| read_env("INSIGHTFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INSIGHTFLOW_LOGGING_FORMAT").or_else(|| read_env("INSIGHTFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    /// Checks value ranges. The API key is checked separately by
    /// [`AppConfig::require_api_key`] so tooling can load a partial config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind_address must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::Validation(
                "agent.temperature must be in range 0.0..=2.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.agent.top_p) {
            return Err(ConfigError::Validation(
                "agent.top_p must be in range 0.0..=1.0".to_string(),
            ));
        }
        if self.agent.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "agent.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(ConfigError::Validation(
                "agent.max_tool_rounds must be greater than zero".to_string(),
            ));
        }
        let base_url = &self.agent.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(
                "agent.base_url must start with http:// or https://".to_string(),
            ));
        }
        if self.pipeline.default_user_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pipeline.default_user_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the API key, or an error naming how to provide it.
    pub fn require_api_key(&self) -> Result<&SecretString, ConfigError> {
        self.agent
            .api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| {
                ConfigError::Validation(
                    "agent.api_key is required; set OPENAI_API_KEY or agent.api_key".to_string(),
                )
            })
    }

    /// Template paths with the configured file names.
    #[must_use]
    pub fn prompt_paths(&self) -> PromptPaths {
        let dir = &self.prompts.dir;
        PromptPaths {
            business_expert: dir.join(&self.prompts.business_expert_file),
            market_analysis: dir.join(&self.prompts.market_analysis_file),
            customer_analysis: dir.join(&self.prompts.customer_analysis_file),
        }
    }

    /// Orchestrator options.
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            session_mode: self.pipeline.session_mode,
            output_base_dir: self.output.base_dir.clone(),
        }
    }

    /// Agent settings. Requires the API key.
    #[cfg(feature = "responses-agent")]
    pub fn agent_settings(&self) -> Result<crate::agent::ResponsesAgentSettings, ConfigError> {
        Ok(crate::agent::ResponsesAgentSettings {
            api_key: self.require_api_key()?.clone(),
            base_url: self.agent.base_url.clone(),
            model: self.agent.model.clone(),
            temperature: self.agent.temperature,
            top_p: self.agent.top_p,
            timeout: std::time::Duration::from_secs(self.agent.timeout_secs),
            max_tool_rounds: self.agent.max_tool_rounds,
            web_search: self.agent.web_search,
        })
    }

    /// The socket address string the server binds.
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    [
        PathBuf::from(DEFAULT_CONFIG_FILE),
        PathBuf::from("config").join(DEFAULT_CONFIG_FILE),
    ]
    .into_iter()
    .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<ConfigPatch>(&raw).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    agent: Option<AgentPatch>,
    prompts: Option<PromptsPatch>,
    output: Option<OutputPatch>,
    pipeline: Option<PipelinePatch>,
    supabase: Option<SupabasePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AgentPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    timeout_secs: Option<u64>,
    max_tool_rounds: Option<u32>,
    web_search: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PromptsPatch {
    dir: Option<PathBuf>,
    business_expert_file: Option<String>,
    market_analysis_file: Option<String>,
    customer_analysis_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputPatch {
    base_dir: Option<PathBuf>,
    save_files: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelinePatch {
    session_mode: Option<SessionMode>,
    default_user_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SupabasePatch {
    project_id: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
