//! Model Selection and ROI Prediction
//!
//! Estimates the cost of a task before it runs by pricing a small pool of
//! candidate models chosen from the task's complexity tier.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::policy::RoiPolicy;
use crate::pricing::PricingTable;
use crate::{Error, Result};

/// Task complexity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    /// Routine tasks that cheap models handle well
    Low,
    /// Feature work and bug fixes
    Medium,
    /// Deep reasoning, large refactors
    High,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl Default for ComplexityTier {
    fn default() -> Self {
        Self::Medium
    }
}

impl FromStr for ComplexityTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(Error::invalid(format!("Invalid complexity tier: {}", s))),
        }
    }
}

impl std::fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One priced candidate model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAlternative {
    pub model: String,
    pub cost: f64,
    /// Saving relative to the most expensive candidate
    pub savings: f64,
}

/// Predicted cost of a task and the cheapest suitable model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoiPrediction {
    pub estimated_cost: f64,
    pub estimated_tokens: i64,
    pub recommended_model: String,
    /// Ascending by cost
    pub alternatives: Vec<ModelAlternative>,
    pub confidence: f64,
}

pub struct RoiPredictor;

impl RoiPredictor {
    /// Predict cost for `estimated_tokens` at the given complexity.
    ///
    /// `model_family_hint` is informational and does not restrict the
    /// candidate pool.
    pub fn predict(
        model_family_hint: &str,
        estimated_tokens: i64,
        complexity: ComplexityTier,
        policy: &RoiPolicy,
        pricing: &PricingTable,
    ) -> Result<RoiPrediction> {
        if estimated_tokens < 0 {
            return Err(Error::invalid(format!(
                "estimated tokens must not be negative, got {}",
                estimated_tokens
            )));
        }

        let (input_tokens, output_tokens) = split_tokens(estimated_tokens, policy.input_ratio);
        tracing::debug!(
            model_family_hint,
            estimated_tokens,
            input_tokens,
            output_tokens,
            complexity = %complexity,
            "Predicting ROI"
        );

        let mut alternatives: Vec<ModelAlternative> = policy
            .tier(complexity)
            .candidates
            .iter()
            .filter_map(|model| match pricing.get(model) {
                Some(price) => Some(ModelAlternative {
                    model: model.clone(),
                    cost: price.calculate_cost(input_tokens, output_tokens),
                    savings: 0.0,
                }),
                None => {
                    tracing::warn!(model = %model, "No pricing for candidate model, skipping");
                    None
                }
            })
            .collect();

        alternatives.sort_by(|a, b| a.cost.total_cmp(&b.cost));

        let max_cost = alternatives
            .iter()
            .map(|a| a.cost)
            .fold(f64::NEG_INFINITY, f64::max);
        for alt in &mut alternatives {
            alt.savings = max_cost - alt.cost;
        }

        let (recommended_model, estimated_cost) = match alternatives.first() {
            Some(best) => (best.model.clone(), best.cost),
            None => (policy.fallback_model.clone(), 0.0),
        };

        Ok(RoiPrediction {
            estimated_cost,
            estimated_tokens,
            recommended_model,
            alternatives,
            confidence: policy.confidence_for(complexity),
        })
    }
}

/// Split a token estimate into (input, output), flooring both parts
fn split_tokens(total: i64, input_ratio: f64) -> (i64, i64) {
    let input = (total as f64 * input_ratio).floor() as i64;
    let output = (total as f64 * (1.0 - input_ratio)).floor() as i64;
    (input, output)
}
