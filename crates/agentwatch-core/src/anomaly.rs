//! Cost anomaly detection
//!
//! Flags an agent when its most recent cost observation sits more than
//! `threshold` population standard deviations above the mean of its
//! observations in the window. Earlier points are not re-scanned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cost_analytics::{CostObservation, UNKNOWN_AGENT};
use crate::{Error, Result};

/// Agents with fewer observations than this are skipped
pub const MIN_ANOMALY_SAMPLES: usize = 3;

/// Illustrative causes attached to every cost spike
pub const POSSIBLE_CAUSES: [&str; 4] = [
    "Unexpected spike in request volume",
    "Model upgrade without optimization",
    "Inefficient prompt engineering",
    "Missing response caching",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    CostSpike,
}

/// A detected cost anomaly. Recomputed on every detection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    /// Mean of the agent's observations
    pub expected_value: f64,
    /// The latest observation
    pub actual_value: f64,
    pub deviation_percent: f64,
    pub detected_at: DateTime<Utc>,
    pub possible_causes: Vec<String>,
}

/// Mean and population standard deviation of a sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl SampleStats {
    /// Returns `None` for an empty sample
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            std_dev: variance.sqrt(),
        })
    }

    /// Upper bound above which a value counts as anomalous
    pub fn upper_bound(&self, threshold: f64) -> f64 {
        self.mean + self.std_dev * threshold
    }
}

pub struct AnomalyDetector;

impl AnomalyDetector {
    /// Run detection over time-ordered observations.
    ///
    /// Groups are reported in order of each agent's first appearance.
    pub fn detect(
        observations: &[CostObservation],
        names: &HashMap<String, String>,
        threshold: f64,
        detected_at: DateTime<Utc>,
    ) -> Result<Vec<Anomaly>> {
        validate_threshold(threshold)?;

        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<f64>> = HashMap::new();
        for obs in observations {
            let values = groups.entry(obs.agent_id.as_str()).or_insert_with(|| {
                order.push(obs.agent_id.as_str());
                Vec::new()
            });
            values.push(obs.value);
        }

        let mut anomalies = Vec::new();
        for agent_id in order {
            let values = &groups[agent_id];
            if values.len() < MIN_ANOMALY_SAMPLES {
                continue;
            }

            let Some(stats) = SampleStats::from_values(values) else {
                continue;
            };
            let Some(&latest) = values.last() else {
                continue;
            };

            if latest > stats.upper_bound(threshold) {
                let agent_name = names
                    .get(agent_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_AGENT.to_string());
                tracing::debug!(
                    agent_id,
                    latest,
                    mean = stats.mean,
                    std_dev = stats.std_dev,
                    "Cost spike detected"
                );
                anomalies.push(Anomaly {
                    id: format!("anomaly-{}-{}", agent_id, detected_at.timestamp_millis()),
                    agent_id: agent_id.to_string(),
                    agent_name,
                    anomaly_type: AnomalyType::CostSpike,
                    expected_value: stats.mean,
                    actual_value: latest,
                    deviation_percent: deviation_percent(latest, stats.mean),
                    detected_at,
                    possible_causes: POSSIBLE_CAUSES.iter().map(|s| s.to_string()).collect(),
                });
            }
        }

        Ok(anomalies)
    }
}

fn deviation_percent(actual: f64, expected: f64) -> f64 {
    if expected == 0.0 {
        0.0
    } else {
        (actual - expected) / expected * 100.0
    }
}

pub(crate) fn validate_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(Error::invalid(format!(
            "anomaly threshold must be a non-negative number, got {}",
            threshold
        )));
    }
    Ok(())
}
