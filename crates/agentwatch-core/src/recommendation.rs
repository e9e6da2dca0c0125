//! Cost optimization recommendations

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::anomaly::Anomaly;
use crate::policy::RecommendationPolicy;
use crate::{Error, Result};

/// Number of most recent observations sampled per agent
pub const RECOMMENDATION_SAMPLE_SIZE: usize = 30;

/// Agents with fewer sampled observations than this get no spend-based advice
pub const MIN_RECOMMENDATION_SAMPLES: usize = 5;

/// Cost optimization recommendation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    ModelSwitch,
    Caching,
    AnomalyFix,
}

impl RecommendationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::ModelSwitch => "model_switch",
            RecommendationType::Caching => "caching",
            RecommendationType::AnomalyFix => "anomaly_fix",
        }
    }
}

impl std::fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecommendationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "model_switch" => Ok(RecommendationType::ModelSwitch),
            "caching" => Ok(RecommendationType::Caching),
            "anomaly_fix" => Ok(RecommendationType::AnomalyFix),
            _ => Err(Error::invalid(format!("Invalid recommendation type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort key: high sorts first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cost optimization recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRecommendation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub potential_savings: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Recent spend and workload of one agent
#[derive(Debug, Clone)]
pub struct AgentSample {
    pub agent_id: String,
    pub agent_name: String,
    /// Up to [`RECOMMENDATION_SAMPLE_SIZE`] most recent cost values
    pub costs: Vec<f64>,
    pub task_count: i64,
}

pub struct RecommendationEngine;

impl RecommendationEngine {
    /// Build recommendations from per-agent samples plus anomalies found
    /// over the same scope, ordered by priority.
    pub fn generate(
        samples: &[AgentSample],
        anomalies: &[Anomaly],
        policy: &RecommendationPolicy,
    ) -> Vec<OptimizationRecommendation> {
        let mut recommendations = Vec::new();

        for sample in samples {
            if sample.costs.len() < MIN_RECOMMENDATION_SAMPLES {
                tracing::debug!(
                    agent_id = %sample.agent_id,
                    samples = sample.costs.len(),
                    "Skipping agent with too few cost samples"
                );
                continue;
            }

            let total_cost: f64 = sample.costs.iter().sum();
            let avg_cost = total_cost / sample.costs.len() as f64;

            if avg_cost > policy.high_cost_threshold {
                recommendations.push(OptimizationRecommendation {
                    id: format!("rec-model-{}", sample.agent_id),
                    kind: RecommendationType::ModelSwitch,
                    priority: Priority::High,
                    title: format!("Switch {} to cheaper model", sample.agent_name),
                    description: format!(
                        "Current average cost ${:.4} per request. Consider Claude 3.5 Haiku or GPT-3.5 for non-complex tasks.",
                        avg_cost
                    ),
                    potential_savings: total_cost * policy.model_switch_savings,
                    agent_id: Some(sample.agent_id.clone()),
                });
            }

            if sample.task_count > policy.caching_min_tasks
                && avg_cost > policy.caching_min_avg_cost
            {
                recommendations.push(OptimizationRecommendation {
                    id: format!("rec-cache-{}", sample.agent_id),
                    kind: RecommendationType::Caching,
                    priority: Priority::Medium,
                    title: format!("Implement response caching for {}", sample.agent_name),
                    description:
                        "Based on request patterns, implementing caching could reduce costs significantly."
                            .to_string(),
                    potential_savings: total_cost * policy.caching_savings,
                    agent_id: Some(sample.agent_id.clone()),
                });
            }
        }

        for anomaly in anomalies {
            recommendations.push(OptimizationRecommendation {
                id: format!("rec-anomaly-{}", anomaly.id),
                kind: RecommendationType::AnomalyFix,
                priority: Priority::High,
                title: format!("Investigate cost spike in {}", anomaly.agent_name),
                description: format!(
                    "Cost deviated {:.1}% from expected. Review recent changes.",
                    anomaly.deviation_percent
                ),
                potential_savings: anomaly.actual_value - anomaly.expected_value,
                agent_id: Some(anomaly.agent_id.clone()),
            });
        }

        Self::rank(recommendations)
    }

    /// Stable sort by priority rank; equal priorities keep generation order
    pub fn rank(
        mut recommendations: Vec<OptimizationRecommendation>,
    ) -> Vec<OptimizationRecommendation> {
        recommendations.sort_by_key(|r| r.priority.rank());
        recommendations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyType;
    use chrono::Utc;

    fn sample(agent_id: &str, costs: &[f64], task_count: i64) -> AgentSample {
        AgentSample {
            agent_id: agent_id.to_string(),
            agent_name: format!("{} name", agent_id),
            costs: costs.to_vec(),
            task_count,
        }
    }

    fn anomaly(agent_id: &str, expected: f64, actual: f64) -> Anomaly {
        Anomaly {
            id: format!("anomaly-{}-0", agent_id),
            agent_id: agent_id.to_string(),
            agent_name: format!("{} name", agent_id),
            anomaly_type: AnomalyType::CostSpike,
            expected_value: expected,
            actual_value: actual,
            deviation_percent: (actual - expected) / expected * 100.0,
            detected_at: Utc::now(),
            possible_causes: vec![],
        }
    }

    fn recommendation(id: &str, priority: Priority) -> OptimizationRecommendation {
        OptimizationRecommendation {
            id: id.to_string(),
            kind: RecommendationType::Caching,
            priority,
            title: String::new(),
            description: String::new(),
            potential_savings: 0.0,
            agent_id: None,
        }
    }

    #[test]
    fn test_rank_orders_by_priority() {
        let ranked = RecommendationEngine::rank(vec![
            recommendation("low", Priority::Low),
            recommendation("high", Priority::High),
            recommendation("medium", Priority::Medium),
        ]);
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "medium", "low"]);
    }

    #[test]
    fn test_rank_is_stable_within_priority() {
        let ranked = RecommendationEngine::rank(vec![
            recommendation("m1", Priority::Medium),
            recommendation("h1", Priority::High),
            recommendation("m2", Priority::Medium),
            recommendation("h2", Priority::High),
        ]);
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["h1", "h2", "m1", "m2"]);
    }

    #[test]
    fn test_model_switch_for_expensive_agent() {
        let recs = RecommendationEngine::generate(
            &[sample("agent-1", &[0.2; 5], 0)],
            &[],
            &RecommendationPolicy::default(),
        );
        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        assert_eq!(rec.kind, RecommendationType::ModelSwitch);
        assert_eq!(rec.priority, Priority::High);
        assert_eq!(rec.id, "rec-model-agent-1");
        assert_eq!(rec.title, "Switch agent-1 name to cheaper model");
        assert!(rec.description.contains("$0.2000"));
        assert!((rec.potential_savings - 0.6).abs() < 1e-9);
        assert_eq!(rec.agent_id.as_deref(), Some("agent-1"));
    }

    #[test]
    fn test_caching_requires_tasks_and_spend() {
        let policy = RecommendationPolicy::default();

        let recs = RecommendationEngine::generate(&[sample("a", &[0.05; 10], 11)], &[], &policy);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationType::Caching);
        assert_eq!(recs[0].priority, Priority::Medium);
        assert!((recs[0].potential_savings - 0.15).abs() < 1e-9);

        // exactly 10 tasks is not enough
        assert!(RecommendationEngine::generate(&[sample("a", &[0.05; 10], 10)], &[], &policy)
            .is_empty());
        // too cheap to bother
        assert!(RecommendationEngine::generate(&[sample("a", &[0.005; 10], 50)], &[], &policy)
            .is_empty());
    }

    #[test]
    fn test_agent_below_sample_floor_is_skipped() {
        let recs = RecommendationEngine::generate(
            &[sample("agent-1", &[5.0, 5.0, 5.0, 5.0], 100)],
            &[],
            &RecommendationPolicy::default(),
        );
        assert!(recs.is_empty());
    }

    #[test]
    fn test_anomaly_fix_from_anomalies() {
        let recs = RecommendationEngine::generate(
            &[],
            &[anomaly("agent-9", 25.0, 100.0)],
            &RecommendationPolicy::default(),
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationType::AnomalyFix);
        assert_eq!(recs[0].id, "rec-anomaly-anomaly-agent-9-0");
        assert_eq!(recs[0].title, "Investigate cost spike in agent-9 name");
        assert!(recs[0].description.contains("300.0%"));
        assert!((recs[0].potential_savings - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_categories_interleave_only_by_priority() {
        let recs = RecommendationEngine::generate(
            &[sample("agent-1", &[0.2; 5], 20)],
            &[anomaly("agent-1", 0.1, 0.5)],
            &RecommendationPolicy::default(),
        );
        let kinds: Vec<RecommendationType> = recs.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RecommendationType::ModelSwitch,
                RecommendationType::AnomalyFix,
                RecommendationType::Caching,
            ]
        );
    }

    #[test]
    fn test_policy_override() {
        let policy = RecommendationPolicy {
            high_cost_threshold: 1.0,
            ..Default::default()
        };
        let recs = RecommendationEngine::generate(&[sample("a", &[0.2; 5], 0)], &[], &policy);
        assert!(recs.is_empty());
    }

    #[test]
    fn test_recommendation_type_round_trip() {
        assert_eq!(
            "model_switch".parse::<RecommendationType>().unwrap(),
            RecommendationType::ModelSwitch
        );
        assert_eq!(RecommendationType::AnomalyFix.to_string(), "anomaly_fix");
        assert!("batching".parse::<RecommendationType>().is_err());
    }
}
