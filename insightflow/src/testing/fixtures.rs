//! Fixtures for pipeline tests.

use crate::pipeline::PromptSet;
use serde_json::{json, Value};

/// A small prompt set whose customer template names the market.
#[must_use]
pub fn sample_prompts() -> PromptSet {
    PromptSet::new(
        "You are a business expert with read access to the company database.",
        "List the addressable markets as JSON with a market_segments array.",
        "Describe the target customers of {market_name} as a JSON object.",
    )
}

/// A market document with one segment per name, as agent output text.
#[must_use]
pub fn market_json(names: &[&str]) -> String {
    let segments: Vec<Value> = names
        .iter()
        .map(|name| json!({"market_name": name, "market_size": "unknown"}))
        .collect();
    json!({ "market_segments": segments }).to_string()
}
