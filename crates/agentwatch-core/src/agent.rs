//! Monitored agents and the records attached to them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Reported status of a monitored agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Idle,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Running => "running",
            AgentStatus::Idle => "idle",
            AgentStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(AgentStatus::Running),
            "idle" => Ok(AgentStatus::Idle),
            "error" => Ok(AgentStatus::Error),
            _ => Err(Error::invalid(format!("Unknown agent status: {}", s))),
        }
    }
}

/// A monitored agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    /// Set when the agent last came up; cleared on error
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            status: AgentStatus::Idle,
            started_at: Some(now),
            last_activity: now,
            created_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        if status == AgentStatus::Error {
            self.started_at = None;
        }
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Seconds the agent has been up as of `now`; zero when in error
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> i64 {
        match (self.status, self.started_at) {
            (AgentStatus::Error, _) | (_, None) => 0,
            (_, Some(started)) => (now - started).num_seconds().max(0),
        }
    }
}

/// Agent as shown on the dashboard, with uptime resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentView {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    pub uptime: i64,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AgentView {
    pub fn from_agent(agent: &Agent, now: DateTime<Utc>) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            status: agent.status,
            uptime: agent.uptime_secs(now),
            last_activity: agent.last_activity,
            created_at: agent.created_at,
        }
    }
}

/// Point-in-time resource usage reported by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub agent_id: String,
    /// Percent
    pub cpu: f64,
    /// Percent
    pub memory: f64,
    pub messages_processed: i64,
    pub average_response_time_ms: f64,
    pub updated_at: DateTime<Utc>,
}

/// Per-agent operational metrics for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub agent_id: String,
    pub cpu: f64,
    pub memory: f64,
    pub tasks_completed: i64,
    pub tasks_failed: i64,
    pub messages_processed: i64,
    pub average_response_time_ms: f64,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventType {
    Started,
    Stopped,
    Error,
    TaskCompleted,
    MessageReceived,
}

impl AgentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentEventType::Started => "started",
            AgentEventType::Stopped => "stopped",
            AgentEventType::Error => "error",
            AgentEventType::TaskCompleted => "task_completed",
            AgentEventType::MessageReceived => "message_received",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "started" => Ok(AgentEventType::Started),
            "stopped" => Ok(AgentEventType::Stopped),
            "error" => Ok(AgentEventType::Error),
            "task_completed" => Ok(AgentEventType::TaskCompleted),
            "message_received" => Ok(AgentEventType::MessageReceived),
            _ => Err(Error::invalid(format!("Unknown event type: {}", s))),
        }
    }
}

/// Something that happened to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    pub id: i64,
    pub agent_id: String,
    #[serde(rename = "type")]
    pub event_type: AgentEventType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(Error::invalid(format!("Unknown task status: {}", s))),
        }
    }
}

/// A unit of work handled by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub agent_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Cost,
    Tokens,
    Latency,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Cost => "cost",
            MetricType::Tokens => "tokens",
            MetricType::Latency => "latency",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "cost" => Ok(MetricType::Cost),
            "tokens" => Ok(MetricType::Tokens),
            "latency" => Ok(MetricType::Latency),
            _ => Err(Error::invalid(format!("Unknown metric type: {}", s))),
        }
    }
}

/// A single numeric sample recorded for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: i64,
    pub agent_id: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_agent_defaults() {
        let agent = Agent::new("Builder Agent");
        assert_eq!(agent.name, "Builder Agent");
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.started_at.is_some());
        assert!(Uuid::parse_str(&agent.id).is_ok());
    }

    #[test]
    fn test_uptime() {
        let now = Utc::now();
        let agent = Agent::new("a")
            .with_status(AgentStatus::Running)
            .with_started_at(now - Duration::seconds(3600));
        assert_eq!(agent.uptime_secs(now), 3600);
    }

    #[test]
    fn test_uptime_zero_on_error() {
        let now = Utc::now();
        let agent = Agent::new("a")
            .with_started_at(now - Duration::seconds(60))
            .with_status(AgentStatus::Error);
        assert_eq!(agent.uptime_secs(now), 0);
        assert!(agent.started_at.is_none());
    }

    #[test]
    fn test_uptime_never_negative() {
        let now = Utc::now();
        let agent = Agent::new("a").with_started_at(now + Duration::seconds(30));
        assert_eq!(agent.uptime_secs(now), 0);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [AgentStatus::Running, AgentStatus::Idle, AgentStatus::Error] {
            assert_eq!(AgentStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(AgentStatus::from_str("paused").is_err());
    }

    #[test]
    fn test_event_type_parse() {
        assert_eq!(
            AgentEventType::from_str("task_completed").unwrap(),
            AgentEventType::TaskCompleted
        );
        assert!(matches!(
            AgentEventType::from_str("exploded"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_agent_view_serializes_camel_case() {
        let now = Utc::now();
        let agent = Agent::new("a").with_status(AgentStatus::Running);
        let json = serde_json::to_value(AgentView::from_agent(&agent, now)).unwrap();
        assert!(json.get("lastActivity").is_some());
        assert_eq!(json["status"], "running");
    }
}
