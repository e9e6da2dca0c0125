//! AgentWatch Core - Domain types, cost analytics engine and SQLite store
//!
//! This crate provides:
//! - Agent, task, event and metric records for the monitoring dashboard
//! - Pure cost analytics: aggregation, trend, anomaly detection,
//!   recommendations and ROI prediction
//! - `CostPolicy`, the TOML-overridable configuration for every heuristic
//! - The `CostStore` data-access trait and its SQLite implementation

pub mod agent;
pub mod anomaly;
pub mod cost_analytics;
pub mod database;
pub mod error;
pub mod model_selection;
pub mod optimizer;
pub mod policy;
pub mod pricing;
pub mod recommendation;
pub mod store;

pub use agent::{
    Agent, AgentEvent, AgentEventType, AgentMetrics, AgentStatus, AgentView, Metric, MetricType,
    ResourceSnapshot, Task, TaskStatus,
};
pub use database::{Database, DatabaseConfig};
pub use error::{Error, Result};
pub use optimizer::CostOptimizer;
pub use policy::CostPolicy;
pub use store::{CostStore, ObservationQuery};

// Re-export analytics types
pub use anomaly::{Anomaly, AnomalyDetector, AnomalyType};
pub use cost_analytics::{
    AgentRef, CostAnalysis, CostAnalytics, CostObservation, CostPeriod, DailyCost, TrendDirection,
};
pub use model_selection::{ComplexityTier, ModelAlternative, RoiPrediction, RoiPredictor};
pub use pricing::{ModelPricing, PricingTable};
pub use recommendation::{
    OptimizationRecommendation, Priority, RecommendationEngine, RecommendationType,
};
