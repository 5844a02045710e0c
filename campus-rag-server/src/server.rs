use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use campus_rag::{
    AnswerResponse, DropoutAnalysis, HealthStatus, KnowledgeService, RagError, RiskAnalyzer,
    StudentOutcome,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub knowledge: Arc<KnowledgeService>,
    pub risk: Arc<RiskAnalyzer>,
}

impl AppState {
    pub fn new(knowledge: KnowledgeService, risk: RiskAnalyzer) -> Self {
        Self { knowledge: Arc::new(knowledge), risk: Arc::new(risk) }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8099 }
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/rag", post(rag))
        .route("/dropout/analyze", post(analyze_student))
        .route("/dropout/analyze-batch", post(analyze_students))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for campus-rag server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("campus-rag listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// A [`RagError`] rendered as `{"detail": ...}` with a status code.
pub struct ApiError(RagError);

impl From<RagError> for ApiError {
    fn from(error: RagError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            RagError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RagError::NoDocumentsFound { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            warn!(error = %self.0, "request rejected");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RagRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    form_response: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeBatchRequest {
    form_responses: Vec<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(flatten)]
    index: HealthStatus,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", index: state.knowledge.health() })
}

async fn rag(
    State(state): State<AppState>,
    Json(request): Json<RagRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let response = state.knowledge.answer(&request.query, request.k).await?;
    Ok(Json(response))
}

async fn analyze_student(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<DropoutAnalysis>, ApiError> {
    let analysis = state.risk.analyze(&request.form_response).await?;
    Ok(Json(analysis))
}

async fn analyze_students(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeBatchRequest>,
) -> Json<Vec<StudentOutcome>> {
    Json(state.risk.analyze_batch(&request.form_responses).await)
}
