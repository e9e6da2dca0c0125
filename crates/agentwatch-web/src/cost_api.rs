//! Cost optimization endpoint
//!
//! `GET /api/cost-optimization?action=...` dispatches to one of the
//! analytical views. Missing parameters take their defaults; malformed ones
//! are rejected with 400.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use agentwatch_core::{ComplexityTier, CostPeriod};
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

use crate::api::{ApiError, AppState};

const DEFAULT_ESTIMATED_TOKENS: i64 = 1000;
const DEFAULT_AGENT_TYPE: &str = "openai";

/// Query parameters; numbers arrive as text so malformed values map to 400
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostQuery {
    pub action: Option<String>,
    pub agent_id: Option<String>,
    pub days: Option<String>,
    pub period: Option<String>,
    pub threshold: Option<String>,
    pub tokens: Option<String>,
    pub complexity: Option<String>,
    pub agent_type: Option<String>,
}

impl CostQuery {
    /// Agent filter; an empty value means all agents
    fn agent_filter(&self) -> Option<&str> {
        self.agent_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Supported `action` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostAction {
    Analysis,
    Anomalies,
    Recommendations,
    Breakdown,
    PredictRoi,
}

impl FromStr for CostAction {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analysis" => Ok(CostAction::Analysis),
            "anomalies" => Ok(CostAction::Anomalies),
            "recommendations" => Ok(CostAction::Recommendations),
            "breakdown" => Ok(CostAction::Breakdown),
            "predict-roi" => Ok(CostAction::PredictRoi),
            _ => Err(ApiError::bad_request("Invalid action")),
        }
    }
}

fn parse_param<T: FromStr>(name: &str, raw: Option<&str>, default: T) -> Result<T, ApiError> {
    match raw {
        None | Some("") => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ApiError::bad_request(format!("Invalid {}: {}", name, value))),
    }
}

pub async fn cost_optimization(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CostQuery>,
) -> Result<Response, ApiError> {
    let action: CostAction = query.action.as_deref().unwrap_or("analysis").parse()?;
    let agent_id = query.agent_filter();
    let optimizer = state.optimizer();
    let policy = optimizer.policy();

    tracing::debug!(?action, ?agent_id, "Cost optimization request");

    let response = match action {
        CostAction::Analysis => {
            let days = parse_param(
                "days",
                query.days.as_deref(),
                policy.analysis.default_window_days,
            )?;
            Json(optimizer.analyze(agent_id, days).await?).into_response()
        }
        CostAction::Anomalies => {
            let threshold = parse_param(
                "threshold",
                query.threshold.as_deref(),
                policy.anomaly.default_threshold,
            )?;
            let anomalies = optimizer.detect_anomalies(agent_id, threshold).await?;
            Json(json!({ "anomalies": anomalies })).into_response()
        }
        CostAction::Recommendations => {
            let recommendations = optimizer.recommend(agent_id).await?;
            Json(json!({ "recommendations": recommendations })).into_response()
        }
        CostAction::Breakdown => {
            let period = match query.period.as_deref() {
                None | Some("") => CostPeriod::default(),
                Some(p) => p.parse::<CostPeriod>()?,
            };
            let breakdown = optimizer.breakdown(agent_id, period).await?;
            Json(json!({ "breakdown": breakdown })).into_response()
        }
        CostAction::PredictRoi => {
            let tokens = parse_param("tokens", query.tokens.as_deref(), DEFAULT_ESTIMATED_TOKENS)?;
            let complexity = match query.complexity.as_deref() {
                None | Some("") => ComplexityTier::default(),
                Some(c) => c.parse::<ComplexityTier>()?,
            };
            let agent_type = query
                .agent_type
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_AGENT_TYPE);
            Json(optimizer.predict_roi(agent_type, tokens, complexity)?).into_response()
        }
    };

    Ok(response)
}
