//! Testing utilities for insightflow pipelines.
//!
//! This module provides:
//! - A scripted agent runtime that replies by prompt content
//! - A matching agent factory for the service layer
//! - Prompt and document fixtures

mod fixtures;
mod mocks;

pub use fixtures::{market_json, sample_prompts};
pub use mocks::{RecordedCall, ScriptedAgentFactory, ScriptedAgentRuntime, ScriptedReply};
