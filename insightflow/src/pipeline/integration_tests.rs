//! End-to-end tests of the orchestrator against a scripted agent.

use super::*;
use crate::agent::{AgentResponse, MockAgentRuntime};
use crate::cancellation::CancellationToken;
use crate::context::SessionMode;
use crate::core::{AnalysisType, SegmentAnalysis, StageKind};
use crate::testing::{market_json, sample_prompts, ScriptedAgentRuntime, ScriptedReply};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

const SCHEMA_NEEDLE: &str = "public schema";
const MARKET_NEEDLE: &str = "addressable markets";

fn orchestrator(runtime: &Arc<ScriptedAgentRuntime>, mode: SessionMode) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        runtime.clone(),
        sample_prompts(),
        PipelineOptions {
            session_mode: mode,
            ..PipelineOptions::default()
        },
    )
}

fn no_files() -> RunRequest {
    RunRequest {
        save_files: false,
        ..RunRequest::default()
    }
}

fn segment_marker(name: &str) -> String {
    format!("**{name}**")
}

fn file_names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_end_to_end_edtech_fintech() {
    let runtime = Arc::new(
        ScriptedAgentRuntime::new()
            .on(SCHEMA_NEEDLE, "The public schema has a `courses` table.")
            .on(
                MARKET_NEEDLE,
                r#"{"market_segments":[{"market_name":"EdTech"},{"market_name":"FinTech"}]}"#,
            )
            .on(segment_marker("EdTech"), r#"{"size":"1B"}"#)
            .fail_on(segment_marker("FinTech"), "upstream timeout"),
    );

    let run = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap();

    let segments = serde_json::to_value(&run.integrated.markets).unwrap();
    assert_eq!(
        segments["market_segments"][0],
        json!({"market_name": "EdTech", "customer_analysis": {"size": "1B"}})
    );
    assert_eq!(segments["market_segments"][1]["market_name"], json!("FinTech"));
    assert_eq!(segments["market_segments"][1]["customer_analysis"]["status"], json!("failed"));
    assert!(segments["market_segments"][1]["customer_analysis"]["error"]
        .as_str()
        .unwrap()
        .contains("upstream timeout"));
    assert_eq!(segments["market_segments"].as_array().unwrap().len(), 2);

    assert_eq!(
        serde_json::to_value(&run.pure.markets).unwrap(),
        json!({"market_segments": [{"market_name": "EdTech"}, {"market_name": "FinTech"}]})
    );
    assert_eq!(run.summary, FanoutSummary { total: 2, succeeded: 1, failed: 1 });
    assert_eq!(run.turns, 3);
    assert!(run.artifacts.is_empty());
}

#[tokio::test]
async fn test_shared_session_grows_history() {
    let runtime = Arc::new(
        ScriptedAgentRuntime::new()
            .on(MARKET_NEEDLE, market_json(&["EdTech", "FinTech"]))
            .fail_on(segment_marker("FinTech"), "boom"),
    );

    orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap();

    let history: Vec<_> = runtime.calls().iter().map(|c| c.history_len).collect();
    assert_eq!(history, vec![Some(0), Some(2), Some(4), Some(6)]);
}

#[tokio::test]
async fn test_detached_session_sends_no_history() {
    let runtime = Arc::new(ScriptedAgentRuntime::new().on(MARKET_NEEDLE, market_json(&["A"])));

    let run = orchestrator(&runtime, SessionMode::Detached)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.turns, 3);
    assert!(runtime.calls().iter().all(|c| c.history_len.is_none()));
}

#[tokio::test]
async fn test_invalid_market_json_is_fatal_and_skips_fanout() {
    let runtime = Arc::new(
        ScriptedAgentRuntime::new().on(MARKET_NEEDLE, "Here are the markets: EdTech, FinTech."),
    );
    let dir = tempfile::tempdir().unwrap();
    let request = RunRequest {
        output_dir: Some(dir.path().to_path_buf()),
        ..RunRequest::default()
    };

    let err = orchestrator(&runtime, SessionMode::Shared)
        .run(&request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "schema_parse_error");
    assert_eq!(err.stage(), Some(StageKind::Market));
    assert_eq!(runtime.call_count(), 2);
    assert!(!runtime.prompts().iter().any(|p| p.contains("focus on the market")));

    let mut written: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect();
    written.sort();
    assert_eq!(written.len(), 2);
    assert!(written[0].starts_with("market_analysis_"));
    assert!(written[1].starts_with("schema_description_"));
}

#[tokio::test]
async fn test_missing_market_segments_is_fatal() {
    let runtime = Arc::new(ScriptedAgentRuntime::new().on(MARKET_NEEDLE, r#"{"markets": []}"#));

    let err = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "schema_parse_error");
    assert_eq!(runtime.call_count(), 2);
}

#[tokio::test]
async fn test_schema_failure_is_fatal() {
    let runtime = Arc::new(ScriptedAgentRuntime::new().fail_on(SCHEMA_NEEDLE, "401 unauthorized"));

    let err = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "agent_invocation_error");
    assert_eq!(err.stage(), Some(StageKind::Schema));
    assert_eq!(runtime.call_count(), 1);
}

#[tokio::test]
async fn test_market_invocation_failure_is_fatal() {
    let runtime = Arc::new(ScriptedAgentRuntime::new().fail_on(MARKET_NEEDLE, "rate limited"));

    let err = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(StageKind::Market));
    assert_eq!(runtime.call_count(), 2);
}

#[tokio::test]
async fn test_middle_segment_failure_is_isolated() {
    let runtime = Arc::new(
        ScriptedAgentRuntime::new()
            .on(MARKET_NEEDLE, market_json(&["A", "B", "C"]))
            .fail_on(segment_marker("B"), "quota exceeded")
            .with_fallback(ScriptedReply::Text(r#"{"persona": "builder"}"#.to_string())),
    );

    let run = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap();

    let analyses: Vec<_> = run
        .integrated
        .markets
        .market_segments
        .iter()
        .map(|s| s.customer_analysis.as_ref().map(SegmentAnalysis::is_failed))
        .collect();
    assert_eq!(analyses, vec![Some(false), Some(true), Some(false)]);
    assert_eq!(run.integrated.markets.segment_names(), vec!["A", "B", "C"]);
    assert_eq!(runtime.call_count(), 5);
}

#[tokio::test]
async fn test_unparsable_customer_output_becomes_error_record() {
    let runtime = Arc::new(
        ScriptedAgentRuntime::new()
            .on(MARKET_NEEDLE, market_json(&["EdTech"]))
            .on(segment_marker("EdTech"), "I could not find any customers."),
    );

    let run = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap();

    match &run.integrated.markets.market_segments[0].customer_analysis {
        Some(SegmentAnalysis::Failed(record)) => assert!(record.error.contains("not valid JSON")),
        other => panic!("expected an error record, got {other:?}"),
    }
    assert_eq!(run.summary.failed, 1);
}

#[tokio::test]
async fn test_empty_market_makes_no_customer_calls() {
    let runtime =
        Arc::new(ScriptedAgentRuntime::new().on(MARKET_NEEDLE, r#"{"market_segments": []}"#));

    let run = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runtime.call_count(), 2);
    assert!(run.integrated.markets.is_empty());
    assert_eq!(run.summary.total, 0);
}

#[tokio::test]
async fn test_metadata_and_extra_fields_survive() {
    let runtime = Arc::new(ScriptedAgentRuntime::new().on(
        MARKET_NEEDLE,
        r#"{"summary": "two markets",
            "market_segments": [{"market_name": "EdTech", "cagr": 0.12}]}"#,
    ));

    let run = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.pure.metadata.analysis_type, AnalysisType::MarketAnalysisOnly);
    assert_eq!(
        run.integrated.metadata.analysis_type,
        AnalysisType::IntegratedMarketAndCustomer
    );
    assert_eq!(run.pure.metadata.analysis_timestamp, run.integrated.metadata.analysis_timestamp);

    let integrated = serde_json::to_value(&run.integrated).unwrap();
    assert_eq!(integrated["markets"]["summary"], json!("two markets"));
    assert_eq!(integrated["markets"]["market_segments"][0]["cagr"], json!(0.12));
    assert_eq!(integrated["metadata"]["analysis_type"], json!("integrated_market_and_customer"));
}

#[tokio::test]
async fn test_feedback_reaches_every_prompt() {
    let runtime = Arc::new(ScriptedAgentRuntime::new().on(MARKET_NEEDLE, market_json(&["A", "B"])));
    let request = RunRequest {
        user_feedback: Some("Only consider the European market.".to_string()),
        ..no_files()
    };

    orchestrator(&runtime, SessionMode::Shared)
        .run(&request, &CancellationToken::new())
        .await
        .unwrap();

    let prompts = runtime.prompts();
    assert_eq!(prompts.len(), 4);
    assert!(prompts.iter().all(|p| p.contains("Only consider the European market.")));
    assert!(prompts[2].contains("Describe the target customers of A"));
}

#[tokio::test]
async fn test_artifacts_written_in_order() {
    let runtime = Arc::new(
        ScriptedAgentRuntime::new()
            .on(MARKET_NEEDLE, market_json(&["Online Education", "FinTech"]))
            .fail_on(segment_marker("FinTech"), "boom"),
    );
    let dir = tempfile::tempdir().unwrap();
    let request = RunRequest {
        output_dir: Some(dir.path().join("run")),
        ..RunRequest::default()
    };

    let run = orchestrator(&runtime, SessionMode::Shared)
        .run(&request, &CancellationToken::new())
        .await
        .unwrap();

    let ts = &run.integrated.metadata.analysis_timestamp;
    assert_eq!(
        file_names(&run.artifacts),
        vec![
            format!("schema_description_{ts}.md"),
            format!("market_analysis_{ts}.md"),
            format!("customer_analysis_Online_Education_{ts}.md"),
            format!("market_analysis_pure_{ts}.json"),
            format!("integrated_analysis_{ts}.json"),
        ]
    );

    let on_disk = read_json(&run.artifacts[4]);
    assert_eq!(on_disk, serde_json::to_value(&run.integrated).unwrap());
    let pure_on_disk = read_json(&run.artifacts[3]);
    assert_eq!(pure_on_disk, serde_json::to_value(&run.pure).unwrap());
}

#[tokio::test]
async fn test_default_output_dir_uses_base_and_timestamp() {
    let runtime = Arc::new(ScriptedAgentRuntime::new().on(MARKET_NEEDLE, market_json(&[])));
    let base = tempfile::tempdir().unwrap();
    let orchestrator = PipelineOrchestrator::new(
        runtime.clone(),
        sample_prompts(),
        PipelineOptions {
            session_mode: SessionMode::Shared,
            output_base_dir: base.path().to_path_buf(),
        },
    );

    let run = orchestrator
        .run(&RunRequest::default(), &CancellationToken::new())
        .await
        .unwrap();

    let expected = base
        .path()
        .join(format!("outputs_{}", run.integrated.metadata.analysis_timestamp));
    assert!(run.artifacts.iter().all(|p| p.parent() == Some(expected.as_path())));
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_calls() {
    let runtime = Arc::new(ScriptedAgentRuntime::new());
    let cancel = CancellationToken::new();
    cancel.cancel("client disconnected");

    let err = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "cancelled");
    assert_eq!(runtime.call_count(), 0);
}

#[tokio::test]
async fn test_stale_customer_analysis_key_is_overwritten() {
    let runtime = Arc::new(
        ScriptedAgentRuntime::new()
            .on(
                MARKET_NEEDLE,
                r#"{"market_segments":[
                    {"market_name":"EdTech","customer_analysis":"pending"},
                    {"market_name":"FinTech"}]}"#,
            )
            .on(segment_marker("EdTech"), r#"{"size":"1B"}"#)
            .on(segment_marker("FinTech"), r#"{"size":"2B"}"#),
    );

    let run = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runtime.call_count(), 4);
    assert_eq!(run.summary, FanoutSummary { total: 2, succeeded: 2, failed: 0 });
    assert_eq!(
        serde_json::to_string(&run.integrated.markets.market_segments[0]).unwrap(),
        r#"{"market_name":"EdTech","customer_analysis":{"size":"1B"}}"#
    );
    assert_eq!(
        serde_json::to_value(&run.pure.markets).unwrap()["market_segments"][0],
        json!({"market_name": "EdTech", "customer_analysis": "pending"})
    );
}

#[tokio::test]
async fn test_unnamed_segment_gets_positional_name() {
    let runtime = Arc::new(ScriptedAgentRuntime::new().on(
        MARKET_NEEDLE,
        r#"{"market_segments":[{"market_name":"EdTech"},{"segment":"Unnamed"}]}"#,
    ));

    let run = orchestrator(&runtime, SessionMode::Shared)
        .run(&no_files(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runtime.call_count(), 4);
    assert!(runtime.prompts()[3].contains(&segment_marker("market_2")));
    assert_eq!(run.integrated.markets.segment_names(), vec!["EdTech", "market_2"]);

    let second = &run.integrated.markets.market_segments[1];
    assert_eq!(second.attributes.get("segment"), Some(&json!("Unnamed")));
    assert!(second.customer_analysis.as_ref().is_some_and(|a| !a.is_failed()));
    assert_eq!(run.summary.succeeded, 2);
}

#[tokio::test]
async fn test_cancel_mid_fanout_keeps_finished_segment_artifacts() {
    let cancel = Arc::new(CancellationToken::new());
    let cancel_in_runtime = cancel.clone();

    let mut runtime = MockAgentRuntime::new();
    runtime.expect_invoke().times(3).returning(move |_, prompt| {
        if prompt.contains(SCHEMA_NEEDLE) {
            Ok(AgentResponse::text("The public schema has a `courses` table."))
        } else if prompt.contains(MARKET_NEEDLE) {
            Ok(AgentResponse::text(market_json(&["EdTech", "FinTech"])))
        } else {
            cancel_in_runtime.cancel("client disconnected");
            Ok(AgentResponse::text(r#"{"size":"1B"}"#))
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let request = RunRequest {
        output_dir: Some(dir.path().to_path_buf()),
        ..RunRequest::default()
    };
    let err = PipelineOrchestrator::new(
        Arc::new(runtime),
        sample_prompts(),
        PipelineOptions::default(),
    )
    .run(&request, &cancel)
    .await
    .unwrap_err();

    assert_eq!(err.kind(), "cancelled");

    let written: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect();
    assert_eq!(written.len(), 3);
    let edtech = written
        .iter()
        .find(|name| name.starts_with("customer_analysis_EdTech_"))
        .expect("finished segment must be persisted");
    assert_eq!(
        std::fs::read_to_string(dir.path().join(edtech)).unwrap(),
        r#"{"size":"1B"}"#
    );
    assert!(!written.iter().any(|name| name.starts_with("customer_analysis_FinTech_")));
}
