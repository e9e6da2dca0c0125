//! Cost policy configuration
//!
//! Every heuristic constant used by the analytics engine lives here so that
//! it can be overridden from a TOML file or in tests. Missing sections and
//! fields fall back to their defaults.
//!
//! ```toml
//! [recommendation]
//! high_cost_threshold = 0.25
//!
//! [roi.low]
//! candidates = ["claude-3.5-haiku"]
//! confidence_bonus = 0.15
//!
//! # Model ids contain dots, so pricing keys must be quoted
//! [pricing."claude-3.5-haiku"]
//! input_price = 0.8
//! output_price = 4.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::model_selection::ComplexityTier;
use crate::pricing::PricingTable;
use crate::{Error, Result};

/// Top-level policy for the cost analytics engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostPolicy {
    pub analysis: AnalysisPolicy,
    pub anomaly: AnomalyPolicy,
    pub recommendation: RecommendationPolicy,
    pub roi: RoiPolicy,
    pub pricing: PricingTable,
}

impl CostPolicy {
    /// Parse a policy from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let policy: CostPolicy = toml::from_str(text)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load a policy from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let policy = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "Loaded cost policy");
        Ok(policy)
    }

    /// Reject values that would make the engine produce nonsense
    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if !(a.trend_increase_factor >= 1.0) {
            return Err(Error::Config(format!(
                "analysis.trend_increase_factor must be >= 1.0, got {}",
                a.trend_increase_factor
            )));
        }
        if !(a.trend_decrease_factor > 0.0 && a.trend_decrease_factor <= 1.0) {
            return Err(Error::Config(format!(
                "analysis.trend_decrease_factor must be in (0, 1], got {}",
                a.trend_decrease_factor
            )));
        }
        if self.anomaly.window_days < 1 {
            return Err(Error::Config("anomaly.window_days must be >= 1".to_string()));
        }
        if !(self.anomaly.default_threshold.is_finite() && self.anomaly.default_threshold >= 0.0) {
            return Err(Error::Config(
                "anomaly.default_threshold must be a non-negative number".to_string(),
            ));
        }

        let r = &self.recommendation;
        for (name, value) in [
            ("model_switch_savings", r.model_switch_savings),
            ("caching_savings", r.caching_savings),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "recommendation.{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }

        let roi = &self.roi;
        if !(0.0..=1.0).contains(&roi.input_ratio) {
            return Err(Error::Config(format!(
                "roi.input_ratio must be in [0, 1], got {}",
                roi.input_ratio
            )));
        }
        for tier in [ComplexityTier::Low, ComplexityTier::Medium, ComplexityTier::High] {
            let confidence = roi.confidence_for(tier);
            if !(0.0..=1.0).contains(&confidence) {
                return Err(Error::Config(format!(
                    "roi confidence for {} tier must be in [0, 1], got {}",
                    tier, confidence
                )));
            }
        }

        Ok(())
    }
}

/// Knobs for aggregation and trend classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisPolicy {
    /// Second half must exceed first half by this factor to count as increasing
    pub trend_increase_factor: f64,
    /// Second half must fall below first half times this factor to count as decreasing
    pub trend_decrease_factor: f64,
    pub default_window_days: i64,
}

impl Default for AnalysisPolicy {
    fn default() -> Self {
        Self {
            trend_increase_factor: 1.1,
            trend_decrease_factor: 0.9,
            default_window_days: 7,
        }
    }
}

/// Knobs for anomaly detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyPolicy {
    /// Trailing window examined by each detection run
    pub window_days: i64,
    /// Standard deviations above the mean before the latest point is flagged
    pub default_threshold: f64,
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self {
            window_days: 7,
            default_threshold: 2.0,
        }
    }
}

/// Knobs for recommendation generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationPolicy {
    /// Average cost per request above which a cheaper model is suggested
    pub high_cost_threshold: f64,
    /// Fraction of sampled spend assumed recoverable by switching model
    pub model_switch_savings: f64,
    /// Task count an agent must exceed before caching is suggested
    pub caching_min_tasks: i64,
    pub caching_min_avg_cost: f64,
    /// Fraction of sampled spend assumed recoverable by caching
    pub caching_savings: f64,
}

impl Default for RecommendationPolicy {
    fn default() -> Self {
        Self {
            high_cost_threshold: 0.10,
            model_switch_savings: 0.6,
            caching_min_tasks: 10,
            caching_min_avg_cost: 0.01,
            caching_savings: 0.3,
        }
    }
}

/// Candidate pool and confidence bonus for one complexity tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub candidates: Vec<String>,
    pub confidence_bonus: f64,
}

impl TierPolicy {
    fn new(candidates: &[&str], confidence_bonus: f64) -> Self {
        Self {
            candidates: candidates.iter().map(|s| s.to_string()).collect(),
            confidence_bonus,
        }
    }

    /// Built-in candidates and bonus for `tier`
    pub fn default_for(tier: ComplexityTier) -> Self {
        match tier {
            ComplexityTier::Low => Self::new(&["claude-3.5-haiku", "gpt-3.5-turbo"], 0.2),
            ComplexityTier::Medium => Self::new(&["claude-3.5-sonnet", "gpt-4-turbo"], 0.1),
            ComplexityTier::High => Self::new(&["claude-3-opus", "gpt-4"], 0.0),
        }
    }
}

/// A `[roi.<tier>]` table; omitted fields keep that tier's defaults
#[derive(Deserialize)]
struct TierOverride {
    candidates: Option<Vec<String>>,
    confidence_bonus: Option<f64>,
}

fn deserialize_tier<'de, D>(
    deserializer: D,
    tier: ComplexityTier,
) -> std::result::Result<TierPolicy, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let base = TierPolicy::default_for(tier);
    let over = TierOverride::deserialize(deserializer)?;
    Ok(TierPolicy {
        candidates: over.candidates.unwrap_or(base.candidates),
        confidence_bonus: over.confidence_bonus.unwrap_or(base.confidence_bonus),
    })
}

fn low_tier<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<TierPolicy, D::Error> {
    deserialize_tier(d, ComplexityTier::Low)
}

fn medium_tier<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> std::result::Result<TierPolicy, D::Error> {
    deserialize_tier(d, ComplexityTier::Medium)
}

fn high_tier<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<TierPolicy, D::Error> {
    deserialize_tier(d, ComplexityTier::High)
}

/// Knobs for ROI prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiPolicy {
    /// Share of the token estimate attributed to input; the rest is output
    pub input_ratio: f64,
    pub base_confidence: f64,
    #[serde(deserialize_with = "low_tier")]
    pub low: TierPolicy,
    #[serde(deserialize_with = "medium_tier")]
    pub medium: TierPolicy,
    #[serde(deserialize_with = "high_tier")]
    pub high: TierPolicy,
    /// Reported when no candidate has a known price
    pub fallback_model: String,
}

impl RoiPolicy {
    pub fn tier(&self, tier: ComplexityTier) -> &TierPolicy {
        match tier {
            ComplexityTier::Low => &self.low,
            ComplexityTier::Medium => &self.medium,
            ComplexityTier::High => &self.high,
        }
    }

    pub fn confidence_for(&self, tier: ComplexityTier) -> f64 {
        self.base_confidence + self.tier(tier).confidence_bonus
    }
}

impl Default for RoiPolicy {
    fn default() -> Self {
        Self {
            input_ratio: 0.3,
            base_confidence: 0.7,
            low: TierPolicy::default_for(ComplexityTier::Low),
            medium: TierPolicy::default_for(ComplexityTier::Medium),
            high: TierPolicy::default_for(ComplexityTier::High),
            fallback_model: "gpt-3.5-turbo".to_string(),
        }
    }
}
