//! Read-only data access used by the cost analytics engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cost_analytics::{AgentRef, CostObservation};
use crate::Result;

/// Filter for cost observation reads
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationQuery {
    pub agent_id: Option<String>,
    /// Inclusive lower bound
    pub since: DateTime<Utc>,
    /// Inclusive upper bound; open-ended when `None`
    pub until: Option<DateTime<Utc>>,
}

impl ObservationQuery {
    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            agent_id: None,
            since,
            until: None,
        }
    }

    pub fn for_agent(mut self, agent_id: Option<&str>) -> Self {
        self.agent_id = agent_id.map(str::to_string);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }
}

/// Source of cost observations, agent names and task counts.
///
/// Implementations must return observations ascending by timestamp.
#[async_trait]
pub trait CostStore: Send + Sync {
    /// Observations matching `query`, oldest first
    async fn cost_observations(&self, query: &ObservationQuery) -> Result<Vec<CostObservation>>;

    /// The `limit` most recent observations for one agent, oldest first
    async fn recent_cost_observations(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<CostObservation>>;

    /// All known agents, or only `agent_id` when given
    async fn agent_refs(&self, agent_id: Option<&str>) -> Result<Vec<AgentRef>>;

    async fn agent_name(&self, agent_id: &str) -> Result<Option<String>>;

    async fn task_count(&self, agent_id: &str) -> Result<i64>;
}
