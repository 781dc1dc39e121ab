//! Error types for the analysis pipeline.
//!
//! The taxonomy separates failures of the external agent call from failures to
//! read its output, because the pipeline treats them differently per stage:
//! both are fatal for the schema and market stages, and both are folded into
//! per-segment error records during the customer fan-out.

use crate::config::ConfigError;
use crate::core::StageKind;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of characters of raw model output kept on a parse error.
const EXCERPT_LIMIT: usize = 200;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum InsightflowError {
    /// The external agent runtime call failed.
    #[error("{0}")]
    AgentInvocation(#[from] AgentInvocationError),

    /// A response did not parse as the expected JSON shape.
    #[error("{0}")]
    SchemaParse(#[from] SchemaParseError),

    /// Required external-service credentials were not supplied.
    #[error("{0}")]
    MissingCredentials(#[from] MissingCredentialsError),

    /// A prompt template could not be loaded.
    #[error("{0}")]
    PromptLoad(#[from] PromptLoadError),

    /// Cancellation was observed between steps.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// Configuration could not be loaded or validated.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InsightflowError {
    /// Returns a stable machine-readable code for the error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentInvocation(_) => "agent_invocation_error",
            Self::SchemaParse(_) => "schema_parse_error",
            Self::MissingCredentials(_) => "missing_credentials_error",
            Self::PromptLoad(_) => "prompt_load_error",
            Self::Cancelled(_) => "cancelled",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Returns the stage the error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::AgentInvocation(err) => err.stage,
            Self::SchemaParse(err) => err.stage,
            _ => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), serde_json::json!(stage.to_string()));
        }
        match self {
            Self::MissingCredentials(err) => {
                map.insert("missing".to_string(), serde_json::json!(err.missing));
            }
            Self::SchemaParse(err) if !err.excerpt.is_empty() => {
                map.insert("excerpt".to_string(), serde_json::json!(err.excerpt));
            }
            Self::AgentInvocation(AgentInvocationError {
                status_code: Some(code),
                ..
            }) => {
                map.insert("status_code".to_string(), serde_json::json!(code));
            }
            _ => {}
        }
        map
    }
}

/// Error raised when the external agent runtime call itself fails.
#[derive(Debug, Clone, Error)]
#[error("{}", render_invocation(self))]
pub struct AgentInvocationError {
    /// The stage during which the call was made.
    pub stage: Option<StageKind>,
    /// Human-readable failure description.
    pub message: String,
    /// HTTP status returned by the runtime, when there was one.
    pub status_code: Option<u16>,
}

fn render_invocation(err: &AgentInvocationError) -> String {
    match err.stage {
        Some(stage) => format!("Agent invocation failed during {stage} stage: {}", err.message),
        None => format!("Agent invocation failed: {}", err.message),
    }
}

impl AgentInvocationError {
    /// Creates a new invocation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            stage: None,
            message: message.into(),
            status_code: None,
        }
    }

    /// Attributes the error to a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageKind) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Records the HTTP status returned by the runtime.
    #[must_use]
    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }
}

/// Error raised when a response is not the expected JSON shape.
#[derive(Debug, Clone, Error)]
#[error("{}", render_parse(self))]
pub struct SchemaParseError {
    /// The stage whose output failed to parse.
    pub stage: Option<StageKind>,
    /// What was wrong with the output.
    pub message: String,
    /// Leading excerpt of the offending output.
    pub excerpt: String,
}

fn render_parse(err: &SchemaParseError) -> String {
    match err.stage {
        Some(stage) => format!("Could not parse {stage} stage output: {}", err.message),
        None => format!("Could not parse agent output: {}", err.message),
    }
}

impl SchemaParseError {
    /// Creates a new parse error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            stage: None,
            message: message.into(),
            excerpt: String::new(),
        }
    }

    /// Attributes the error to a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageKind) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Keeps a bounded excerpt of the raw output for diagnostics.
    #[must_use]
    pub fn with_excerpt(mut self, raw: &str) -> Self {
        self.excerpt = raw.chars().take(EXCERPT_LIMIT).collect();
        self
    }
}

/// Error raised when external-service credentials are absent.
#[derive(Debug, Clone, Error)]
#[error("Missing required credentials: {}", missing.join(", "))]
pub struct MissingCredentialsError {
    /// Names of the missing credential fields.
    pub missing: Vec<String>,
}

impl MissingCredentialsError {
    /// Creates a new missing-credentials error.
    #[must_use]
    pub fn new(missing: Vec<String>) -> Self {
        Self { missing }
    }
}

/// Error raised when a prompt template cannot be read.
#[derive(Debug, Error)]
#[error("Prompt file could not be read: {}: {source}", path.display())]
pub struct PromptLoadError {
    /// The path that was attempted.
    pub path: PathBuf,
    /// The underlying IO failure.
    #[source]
    pub source: std::io::Error,
}
