//! Model pricing table
//!
//! Prices are USD per 1M tokens, split into input and output rates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Model pricing information (USD per 1M tokens)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_price: f64,
    pub output_price: f64,
}

impl ModelPricing {
    pub const fn new(input_price: f64, output_price: f64) -> Self {
        Self {
            input_price,
            output_price,
        }
    }

    /// Calculate cost for given token counts
    pub fn calculate_cost(&self, input_tokens: i64, output_tokens: i64) -> f64 {
        let input_cost = (input_tokens.max(0) as f64 / 1_000_000.0) * self.input_price;
        let output_cost = (output_tokens.max(0) as f64 / 1_000_000.0) * self.output_price;
        input_cost + output_cost
    }
}

/// Lookup table from model identifier to pricing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    models: BTreeMap<String, ModelPricing>,
}

impl PricingTable {
    /// An empty table
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.models.insert(model.into(), pricing);
        self
    }

    /// Exact-match lookup; unknown models yield `None`
    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.models.get(model)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelPricing)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for PricingTable {
    /// Published list prices (as of 2024)
    fn default() -> Self {
        Self::empty()
            .with_model("gpt-4", ModelPricing::new(30.0, 60.0))
            .with_model("gpt-4-turbo", ModelPricing::new(10.0, 30.0))
            .with_model("gpt-3.5-turbo", ModelPricing::new(0.5, 1.5))
            .with_model("claude-3-opus", ModelPricing::new(15.0, 75.0))
            .with_model("claude-3-sonnet", ModelPricing::new(3.0, 15.0))
            .with_model("claude-3-haiku", ModelPricing::new(0.25, 1.25))
            .with_model("claude-3.5-haiku", ModelPricing::new(0.2, 1.0))
            .with_model("claude-3.5-sonnet", ModelPricing::new(3.0, 15.0))
    }
}
