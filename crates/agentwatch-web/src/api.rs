//! REST API endpoints for the monitoring dashboard

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use agentwatch_core::{
    AgentEvent, AgentMetrics, AgentView, CostOptimizer, CostPolicy, Database,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::stream::StreamConfig;

/// Number of events returned with an agent's detail view
const AGENT_EVENT_LIMIT: i64 = 50;

/// Number of events returned by the metrics overview
const RECENT_EVENT_LIMIT: i64 = 100;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" => StatusCode::BAD_REQUEST,
            "unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl ApiError {
    pub(crate) fn not_found(entity: &str) -> Self {
        Self {
            error: format!("{} not found", entity),
            code: "not_found".to_string(),
        }
    }

    pub(crate) fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            code: "bad_request".to_string(),
        }
    }

    fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            code: "unavailable".to_string(),
        }
    }

    fn internal(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            code: "internal_error".to_string(),
        }
    }
}

impl From<agentwatch_core::Error> for ApiError {
    fn from(err: agentwatch_core::Error) -> Self {
        use agentwatch_core::Error;

        match &err {
            Error::InvalidArgument(msg) => Self::bad_request(msg.clone()),
            Error::AgentNotFound(_) => Self::not_found("Agent"),
            Error::TaskNotFound(_) => Self::not_found("Task"),
            e if e.is_upstream() => {
                tracing::error!(error = %e, "Data store unavailable");
                Self::unavailable(format!("Data store unavailable: {}", e))
            }
            e => {
                tracing::error!(error = %e, "Request failed");
                Self::internal(e.to_string())
            }
        }
    }
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub policy: Arc<CostPolicy>,
    pub stream: StreamConfig,
}

impl AppState {
    pub fn new(db: Database, policy: CostPolicy) -> Self {
        Self {
            db,
            policy: Arc::new(policy),
            stream: StreamConfig::default(),
        }
    }

    pub fn with_stream_config(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Cost optimizer bound to this state's store and policy
    pub fn optimizer(&self) -> CostOptimizer<Database> {
        CostOptimizer::new(self.db.clone(), self.policy.clone())
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/agents", get(list_agents))
        // Static segment wins over the `:id` capture
        .route("/api/agents/stream", get(crate::stream::agent_stream))
        .route("/api/agents/:id", get(get_agent))
        .route("/api/metrics", get(metrics_overview))
        .route(
            "/api/cost-optimization",
            get(crate::cost_api::cost_optimization),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ==================== Handlers ====================

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AgentView>>, ApiError> {
    let now = Utc::now();
    let agents = state.db.list_agents().await?;

    Ok(Json(
        agents
            .iter()
            .map(|a| AgentView::from_agent(a, now))
            .collect(),
    ))
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AgentDetailResponse>, ApiError> {
    let now = Utc::now();
    let agent = state
        .db
        .get_agent(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Agent"))?;

    let metrics = state.db.get_agent_metrics(&id, now).await?;
    let events = state.db.get_agent_events(&id, AGENT_EVENT_LIMIT).await?;

    Ok(Json(AgentDetailResponse {
        agent: AgentView::from_agent(&agent, now),
        metrics,
        events,
    }))
}

async fn metrics_overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MetricsResponse>, ApiError> {
    let metrics = state.db.all_agent_metrics(Utc::now()).await?;
    let events = state.db.list_events(RECENT_EVENT_LIMIT).await?;

    Ok(Json(MetricsResponse { metrics, events }))
}

// ==================== Response Types ====================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Agent fields at the top level, plus its metrics and recent events
#[derive(Debug, Serialize)]
pub struct AgentDetailResponse {
    #[serde(flatten)]
    pub agent: AgentView,
    pub metrics: Option<AgentMetrics>,
    pub events: Vec<AgentEvent>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    /// Keyed by agent id
    pub metrics: BTreeMap<String, AgentMetrics>,
    pub events: Vec<AgentEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        use agentwatch_core::Error;

        let cases = [
            (Error::invalid("bad tier"), StatusCode::BAD_REQUEST),
            (Error::AgentNotFound("a".into()), StatusCode::NOT_FOUND),
            (Error::TaskNotFound(3), StatusCode::NOT_FOUND),
            (
                Error::UpstreamUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (Error::Other("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                Error::Parse("column agents.status: unknown".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
