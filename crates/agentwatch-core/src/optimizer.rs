//! Cost optimization service
//!
//! Reads observations through a [`CostStore`] and hands them to the pure
//! engines in [`crate::cost_analytics`], [`crate::anomaly`],
//! [`crate::recommendation`] and [`crate::model_selection`]. Store errors
//! propagate unchanged and no partial result is ever returned.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::anomaly::{validate_threshold, Anomaly, AnomalyDetector};
use crate::cost_analytics::{validate_window, CostAnalysis, CostAnalytics, CostPeriod, DailyCost};
use crate::model_selection::{ComplexityTier, RoiPrediction, RoiPredictor};
use crate::policy::CostPolicy;
use crate::recommendation::{
    AgentSample, OptimizationRecommendation, RecommendationEngine, RECOMMENDATION_SAMPLE_SIZE,
};
use crate::store::{CostStore, ObservationQuery};
use crate::Result;

/// Entry point for the four analytical views
pub struct CostOptimizer<S> {
    store: S,
    policy: Arc<CostPolicy>,
    clock: Option<DateTime<Utc>>,
}

impl<S: CostStore> CostOptimizer<S> {
    pub fn new(store: S, policy: Arc<CostPolicy>) -> Self {
        Self {
            store,
            policy,
            clock: None,
        }
    }

    /// Pin "now" instead of reading the system clock
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn policy(&self) -> &CostPolicy {
        &self.policy
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    fn trailing(&self, days: i64, agent_id: Option<&str>) -> ObservationQuery {
        let now = self.now();
        ObservationQuery::since(now - Duration::days(days))
            .until(now)
            .for_agent(agent_id)
    }

    /// Id to name map for the agents in scope
    async fn agent_names(&self, agent_id: Option<&str>) -> Result<HashMap<String, String>> {
        if let Some(id) = agent_id {
            return Ok(self
                .store
                .agent_name(id)
                .await?
                .map(|name| (id.to_string(), name))
                .into_iter()
                .collect());
        }

        Ok(self
            .store
            .agent_refs(None)
            .await?
            .into_iter()
            .map(|a| (a.id, a.name))
            .collect())
    }

    /// Aggregate spend over the trailing `window_days`
    pub async fn analyze(&self, agent_id: Option<&str>, window_days: i64) -> Result<CostAnalysis> {
        validate_window(window_days)?;
        tracing::debug!(?agent_id, window_days, "Analyzing costs");

        let observations = self
            .store
            .cost_observations(&self.trailing(window_days, agent_id))
            .await?;
        let names = self.agent_names(agent_id).await?;

        CostAnalytics::analyze(&observations, &names, window_days, &self.policy.analysis)
    }

    /// Flag agents whose latest cost is an outlier within the anomaly window
    pub async fn detect_anomalies(
        &self,
        agent_id: Option<&str>,
        threshold: f64,
    ) -> Result<Vec<Anomaly>> {
        validate_threshold(threshold)?;
        tracing::debug!(?agent_id, threshold, "Detecting cost anomalies");

        let observations = self
            .store
            .cost_observations(&self.trailing(self.policy.anomaly.window_days, agent_id))
            .await?;
        let names = self.agent_names(agent_id).await?;

        AnomalyDetector::detect(&observations, &names, threshold, self.now())
    }

    /// Prioritized recommendations for every agent, or only `agent_id`
    pub async fn recommend(
        &self,
        agent_id: Option<&str>,
    ) -> Result<Vec<OptimizationRecommendation>> {
        tracing::debug!(?agent_id, "Generating recommendations");

        let mut samples = Vec::new();
        for agent in self.store.agent_refs(agent_id).await? {
            let costs = self
                .store
                .recent_cost_observations(&agent.id, RECOMMENDATION_SAMPLE_SIZE)
                .await?
                .into_iter()
                .map(|o| o.value)
                .collect();
            let task_count = self.store.task_count(&agent.id).await?;
            samples.push(AgentSample {
                agent_id: agent.id,
                agent_name: agent.name,
                costs,
                task_count,
            });
        }

        let anomalies = self
            .detect_anomalies(agent_id, self.policy.anomaly.default_threshold)
            .await?;

        Ok(RecommendationEngine::generate(
            &samples,
            &anomalies,
            &self.policy.recommendation,
        ))
    }

    /// Spend per UTC day over the trailing period, ascending by date
    pub async fn breakdown(
        &self,
        agent_id: Option<&str>,
        period: CostPeriod,
    ) -> Result<Vec<DailyCost>> {
        tracing::debug!(?agent_id, period = %period, "Building daily breakdown");

        let observations = self
            .store
            .cost_observations(&self.trailing(period.days(), agent_id))
            .await?;

        Ok(CostAnalytics::daily_breakdown(&observations))
    }

    /// Predict task cost and pick the cheapest model for its complexity
    pub fn predict_roi(
        &self,
        model_family_hint: &str,
        estimated_tokens: i64,
        complexity: ComplexityTier,
    ) -> Result<RoiPrediction> {
        RoiPredictor::predict(
            model_family_hint,
            estimated_tokens,
            complexity,
            &self.policy.roi,
            &self.policy.pricing,
        )
    }
}
