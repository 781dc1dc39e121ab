use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use insightflow::agent::{AgentCredentials, AgentFactory};
use insightflow::cancellation::{CancelOnDrop, CancellationToken};
use insightflow::config::AppConfig;
use insightflow::core::PipelineOutput;
use insightflow::errors::InsightflowError;
use insightflow::pipeline::{PipelineOrchestrator, PromptSet, RunRequest};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

const SERVICE_NAME: &str = "business-insighter";
const MISSING_CREDENTIALS_DETAIL: &str = "Supabase credentials are required.";

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    factory: Arc<dyn AgentFactory>,
}

impl AppState {
    pub fn new(config: AppConfig, factory: Arc<dyn AgentFactory>) -> Self {
        Self { config: Arc::new(config), factory }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/v1/run-analysis", post(run_analysis))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Request body for a pipeline run. Every field is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RunAnalysisRequest {
    pub supabase_project_id: Option<String>,
    pub supabase_access_token: Option<String>,
    pub user_name: Option<String>,
    pub business_prompt_path: Option<PathBuf>,
    pub market_prompt_path: Option<PathBuf>,
    pub customer_prompt_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub save_files: Option<bool>,
    pub user_feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunAnalysisResponse {
    pub integrated_analysis: PipelineOutput,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    kind: &'static str,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

impl ApiError {
    fn missing_credentials() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: MISSING_CREDENTIALS_DETAIL.to_string(),
            kind: "missing_credentials_error",
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
            kind: "internal_error",
        }
    }
}

impl From<InsightflowError> for ApiError {
    fn from(err: InsightflowError) -> Self {
        match err {
            InsightflowError::MissingCredentials(_) => Self::missing_credentials(),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: other.to_string(),
                kind: other.kind(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { detail: &self.detail, kind: self.kind };
        (self.status, Json(body)).into_response()
    }
}

pub async fn run_analysis(
    State(state): State<AppState>,
    Json(request): Json<RunAnalysisRequest>,
) -> Result<Json<RunAnalysisResponse>, ApiError> {
    let config = &state.config;

    let credentials =
        resolve_credentials(config, &request).ok_or_else(ApiError::missing_credentials)?;
    credentials.validate().map_err(InsightflowError::from)?;

    let paths = config.prompt_paths().with_overrides(
        request.business_prompt_path.clone(),
        request.market_prompt_path.clone(),
        request.customer_prompt_path.clone(),
    );
    let prompts = PromptSet::load(&paths).await.map_err(InsightflowError::from)?;
    let runtime = state.factory.build(&credentials, &prompts.business_expert)?;

    let orchestrator = PipelineOrchestrator::new(runtime, prompts, config.pipeline_options());
    let run_request = RunRequest {
        session_label: request
            .user_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| config.pipeline.default_user_name.clone()),
        user_feedback: request.user_feedback.clone(),
        save_files: request.save_files.unwrap_or(config.output.save_files),
        output_dir: request.output_dir.clone(),
    };

    info!(
        event_name = "api.run_analysis.start",
        session = %run_request.session_label,
        save_files = run_request.save_files,
        "pipeline run requested"
    );

    // The pipeline runs on its own task so an in-flight agent call finishes
    // even if this handler is dropped. The guard stops any further calls.
    let cancel = Arc::new(CancellationToken::new());
    let guard = CancelOnDrop::new(cancel.clone(), "client disconnected");
    let task = tokio::spawn(async move { orchestrator.run(&run_request, &cancel).await });
    let joined = task.await;
    guard.disarm();

    let run = match joined {
        Ok(result) => result?,
        Err(join_error) => {
            error!(
                event_name = "api.run_analysis.task_failed",
                error = %join_error,
                "pipeline task did not complete"
            );
            return Err(ApiError::internal(format!("pipeline task failed: {join_error}")));
        }
    };

    info!(
        event_name = "api.run_analysis.complete",
        run_id = %run.run_id,
        segments = run.summary.total,
        failed_segments = run.summary.failed,
        "pipeline run finished"
    );

    Ok(Json(RunAnalysisResponse { integrated_analysis: run.integrated }))
}

/// Request values win over configured defaults; blanks count as missing.
fn resolve_credentials(
    config: &AppConfig,
    request: &RunAnalysisRequest,
) -> Option<AgentCredentials> {
    let project_id = non_blank(request.supabase_project_id.clone())
        .or_else(|| non_blank(config.supabase.project_id.clone()))?;
    let access_token = non_blank(request.supabase_access_token.clone()).or_else(|| {
        let configured = config.supabase.access_token.as_ref();
        non_blank(configured.map(|token| token.expose_secret().to_string()))
    })?;
    Some(AgentCredentials::new(project_id, access_token))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
