//! Prompt templates and per-stage prompt composition.

use crate::errors::PromptLoadError;
use std::path::{Path, PathBuf};

/// Fixed instruction for the schema stage.
pub const SCHEMA_INSTRUCTION: &str =
    "Use supabase mcp tools, give me a description in Supabase public schema.";

/// Guard line prepended to every structured-output prompt.
pub const SCHEMA_LOCK: &str = "YOU CAN NOT CHANGE THE OUTPUT SCHEMA.";

/// Placeholder substituted in the customer template, when present.
pub const MARKET_NAME_PLACEHOLDER: &str = "{market_name}";

const FEEDBACK_MARKER: &str = "<user's feedback>";

/// Default system instructions file.
pub const BUSINESS_EXPERT_FILE: &str = "business_expert_sys_prompt.md";
/// Default market template file.
pub const MARKET_ANALYSIS_FILE: &str = "market_analysis_prompt.md";
/// Default customer template file.
pub const CUSTOMER_ANALYSIS_FILE: &str = "customer_analysis_prompt.md";

/// Where the three templates live.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct PromptPaths {
    pub business_expert: PathBuf,
    pub market_analysis: PathBuf,
    pub customer_analysis: PathBuf,
}

impl PromptPaths {
    /// Default file names inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            business_expert: dir.join(BUSINESS_EXPERT_FILE),
            market_analysis: dir.join(MARKET_ANALYSIS_FILE),
            customer_analysis: dir.join(CUSTOMER_ANALYSIS_FILE),
        }
    }

    /// Replaces any path that has an override.
    #[must_use]
    pub fn with_overrides(
        mut self,
        business_expert: Option<PathBuf>,
        market_analysis: Option<PathBuf>,
        customer_analysis: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = business_expert {
            self.business_expert = path;
        }
        if let Some(path) = market_analysis {
            self.market_analysis = path;
        }
        if let Some(path) = customer_analysis {
            self.customer_analysis = path;
        }
        self
    }
}

/// The three templates, consumed verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// System instructions for the agent.
    pub business_expert: String,
    /// Market stage instructions.
    pub market_analysis: String,
    /// Customer stage instructions, parameterised by market name.
    pub customer_analysis: String,
}

impl PromptSet {
    /// Creates a set from literal templates.
    #[must_use]
    pub fn new(
        business_expert: impl Into<String>,
        market_analysis: impl Into<String>,
        customer_analysis: impl Into<String>,
    ) -> Self {
        Self {
            business_expert: business_expert.into(),
            market_analysis: market_analysis.into(),
            customer_analysis: customer_analysis.into(),
        }
    }

    /// Reads all three templates as UTF-8.
    pub async fn load(paths: &PromptPaths) -> Result<Self, PromptLoadError> {
        Ok(Self {
            business_expert: read_template(&paths.business_expert).await?,
            market_analysis: read_template(&paths.market_analysis).await?,
            customer_analysis: read_template(&paths.customer_analysis).await?,
        })
    }
}

async fn read_template(path: &Path) -> Result<String, PromptLoadError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PromptLoadError {
            path: path.to_path_buf(),
            source,
        })
}

/// Builds each stage's prompt, injecting the caller's feedback.
#[derive(Debug, Clone, Copy)]
pub struct PromptComposer<'a> {
    prompts: &'a PromptSet,
    feedback: Option<&'a str>,
}

impl<'a> PromptComposer<'a> {
    /// Creates a composer. Blank feedback is treated as none.
    #[must_use]
    pub fn new(prompts: &'a PromptSet, feedback: Option<&'a str>) -> Self {
        Self {
            prompts,
            feedback: feedback.map(str::trim).filter(|f| !f.is_empty()),
        }
    }

    fn feedback_block(&self) -> String {
        self.feedback
            .map(|f| format!("{FEEDBACK_MARKER}\n{f}\n{FEEDBACK_MARKER}\n\n"))
            .unwrap_or_default()
    }

    /// Prompt for the schema stage.
    #[must_use]
    pub fn schema_prompt(&self) -> String {
        format!("{}{SCHEMA_INSTRUCTION}", self.feedback_block())
    }

    /// Prompt for the market stage.
    #[must_use]
    pub fn market_prompt(&self) -> String {
        format!(
            "{}{SCHEMA_LOCK}\n{}",
            self.feedback_block(),
            self.prompts.market_analysis
        )
    }

    /// Prompt for one segment of the customer stage.
    #[must_use]
    pub fn customer_prompt(&self, market_name: &str) -> String {
        let template = self
            .prompts
            .customer_analysis
            .replace(MARKET_NAME_PLACEHOLDER, market_name);
        format!(
            "{}{SCHEMA_LOCK}\nBased on our previous market analysis conversation, \
             please focus on the market: **{market_name}**\n\n{template}\n",
            self.feedback_block()
        )
    }
}
