//! Database layer for SQLite

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::agent::{
    Agent, AgentEvent, AgentEventType, AgentMetrics, AgentStatus, Metric, MetricType,
    ResourceSnapshot, Task, TaskStatus,
};
use crate::cost_analytics::{AgentRef, CostObservation};
use crate::store::{CostStore, ObservationQuery};
use crate::{Error, Result};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Maximum number of connections
    pub max_connections: u32,
    /// Connection acquire timeout
    pub acquire_timeout: Duration,
    /// Idle connection timeout
    pub idle_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Database connection and operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection with default config
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(path, DatabaseConfig::default()).await
    }

    /// Create a new database connection with custom config
    pub async fn with_config(path: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout=5000")
            .execute(&pool)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        tracing::debug!(path = %path.display(), "Opened database");
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Close the pool, waiting for open connections to finish
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(include_str!("../../../migrations/001_initial.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Agent Operations ====================

    /// Insert a new agent
    pub async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, name, status, started_at, last_activity, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(agent.status.as_str())
        .bind(agent.started_at.as_ref().map(format_timestamp))
        .bind(format_timestamp(&agent.last_activity))
        .bind(format_timestamp(&agent.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get an agent by ID
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_into()).transpose()
    }

    /// List all agents, oldest first
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        let rows =
            sqlx::query_as::<_, AgentRow>("SELECT * FROM agents ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Change an agent's status.
    ///
    /// Moving to `error` clears the start time; leaving `error` restarts the
    /// uptime clock at `at`.
    pub async fn update_agent_status(
        &self,
        id: &str,
        status: AgentStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let at = format_timestamp(&at);
        let result = sqlx::query(
            r#"
            UPDATE agents SET
                status = ?,
                started_at = CASE
                    WHEN ? = 'error' THEN NULL
                    WHEN started_at IS NULL THEN ?
                    ELSE started_at
                END,
                last_activity = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(status.as_str())
        .bind(&at)
        .bind(&at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::AgentNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Record activity for an agent
    pub async fn touch_agent(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE agents SET last_activity = ? WHERE id = ?")
            .bind(format_timestamp(&at))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::AgentNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn require_agent(&self, id: &str) -> Result<()> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM agents WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if exists == 0 {
            return Err(Error::AgentNotFound(id.to_string()));
        }
        Ok(())
    }

    // ==================== Metric Operations ====================

    /// Record a metric sample. Values must be finite and non-negative.
    pub async fn record_metric(
        &self,
        agent_id: &str,
        metric_type: MetricType,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Metric> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::invalid(format!(
                "{} metric value must be a non-negative number, got {}",
                metric_type.as_str(),
                value
            )));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO metrics (agent_id, metric_type, value, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(agent_id)
        .bind(metric_type.as_str())
        .bind(value)
        .bind(format_timestamp(&timestamp))
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();

        tracing::debug!(agent_id, metric_type = metric_type.as_str(), value, "Recorded metric");

        Ok(Metric {
            id,
            agent_id: agent_id.to_string(),
            metric_type,
            value,
            timestamp,
        })
    }

    /// Record a cost observation
    pub async fn record_cost(
        &self,
        agent_id: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Metric> {
        self.record_metric(agent_id, MetricType::Cost, value, timestamp)
            .await
    }

    // ==================== Task Operations ====================

    /// Insert a task for a registered agent
    pub async fn insert_task(
        &self,
        agent_id: &str,
        title: &str,
        status: TaskStatus,
        created_at: DateTime<Utc>,
    ) -> Result<Task> {
        self.require_agent(agent_id).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (agent_id, title, status, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(agent_id)
        .bind(title)
        .bind(status.as_str())
        .bind(format_timestamp(&created_at))
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();

        Ok(Task {
            id,
            agent_id: agent_id.to_string(),
            title: title.to_string(),
            status,
            created_at,
        })
    }

    pub async fn update_task_status(&self, task_id: i64, status: TaskStatus) -> Result<()> {
        let result = sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::TaskNotFound(task_id));
        }
        Ok(())
    }

    /// List an agent's tasks, oldest first
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_tasks(&self, agent_id: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE agent_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // ==================== Event Operations ====================

    /// Append an event to an agent's history
    pub async fn insert_event(
        &self,
        agent_id: &str,
        event_type: AgentEventType,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AgentEvent> {
        self.require_agent(agent_id).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO agent_events (agent_id, event_type, message, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(agent_id)
        .bind(event_type.as_str())
        .bind(message)
        .bind(format_timestamp(&timestamp))
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();

        Ok(AgentEvent {
            id,
            agent_id: agent_id.to_string(),
            event_type,
            message: message.to_string(),
            timestamp,
        })
    }

    /// Most recent events for one agent, newest first
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn get_agent_events(&self, agent_id: &str, limit: i64) -> Result<Vec<AgentEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT * FROM agent_events
            WHERE agent_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Most recent events across all agents, newest first
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn list_events(&self, limit: i64) -> Result<Vec<AgentEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM agent_events ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // ==================== Resource Snapshot Operations ====================

    /// Replace the latest resource snapshot for an agent
    pub async fn upsert_resource_snapshot(&self, snapshot: &ResourceSnapshot) -> Result<()> {
        self.require_agent(&snapshot.agent_id).await?;

        for (name, value) in [
            ("cpu", snapshot.cpu),
            ("memory", snapshot.memory),
            ("average_response_time_ms", snapshot.average_response_time_ms),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if snapshot.messages_processed < 0 {
            return Err(Error::invalid("messages_processed must not be negative"));
        }

        sqlx::query(
            r#"
            INSERT INTO agent_snapshots (agent_id, cpu, memory, messages_processed, average_response_time_ms, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(agent_id) DO UPDATE SET
                cpu = excluded.cpu,
                memory = excluded.memory,
                messages_processed = excluded.messages_processed,
                average_response_time_ms = excluded.average_response_time_ms,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&snapshot.agent_id)
        .bind(snapshot.cpu)
        .bind(snapshot.memory)
        .bind(snapshot.messages_processed)
        .bind(snapshot.average_response_time_ms)
        .bind(format_timestamp(&snapshot.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Dashboard metrics for one agent, `None` if the agent is unknown.
    ///
    /// Resource figures come from the latest snapshot (zero when none was
    /// reported); task counts come from the task table.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn get_agent_metrics(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AgentMetrics>> {
        let Some(agent) = self.get_agent(agent_id).await? else {
            return Ok(None);
        };
        self.metrics_for(&agent, now).await.map(Some)
    }

    /// Dashboard metrics for every agent, keyed by agent id
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn all_agent_metrics(
        &self,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, AgentMetrics>> {
        let mut metrics = BTreeMap::new();
        for agent in self.list_agents().await? {
            let m = self.metrics_for(&agent, now).await?;
            metrics.insert(agent.id.clone(), m);
        }
        Ok(metrics)
    }

    async fn metrics_for(&self, agent: &Agent, now: DateTime<Utc>) -> Result<AgentMetrics> {
        let snapshot = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM agent_snapshots WHERE agent_id = ?",
        )
        .bind(&agent.id)
        .fetch_optional(&self.pool)
        .await?;

        let (tasks_completed, tasks_failed) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0)
            FROM tasks WHERE agent_id = ?
            "#,
        )
        .bind(&agent.id)
        .fetch_one(&self.pool)
        .await?;

        let (cpu, memory, messages_processed, average_response_time_ms) = match snapshot {
            Some(s) => (s.cpu, s.memory, s.messages_processed, s.average_response_time_ms),
            None => (0.0, 0.0, 0, 0.0),
        };

        Ok(AgentMetrics {
            agent_id: agent.id.clone(),
            cpu,
            memory,
            tasks_completed,
            tasks_failed,
            messages_processed,
            average_response_time_ms,
            uptime_secs: agent.uptime_secs(now),
        })
    }
}

#[async_trait]
impl CostStore for Database {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn cost_observations(&self, query: &ObservationQuery) -> Result<Vec<CostObservation>> {
        let mut sql = String::from(
            "SELECT agent_id, value, timestamp FROM metrics WHERE metric_type = 'cost' AND timestamp >= ?",
        );
        if query.until.is_some() {
            sql.push_str(" AND timestamp <= ?");
        }
        if query.agent_id.is_some() {
            sql.push_str(" AND agent_id = ?");
        }
        sql.push_str(" ORDER BY timestamp ASC, id ASC");

        let mut q = sqlx::query_as::<_, ObservationRow>(&sql).bind(format_timestamp(&query.since));
        if let Some(until) = &query.until {
            q = q.bind(format_timestamp(until));
        }
        if let Some(agent_id) = &query.agent_id {
            q = q.bind(agent_id);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| r.try_into()).collect()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn recent_cost_observations(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<CostObservation>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, ObservationRow>(
            r#"
            SELECT agent_id, value, timestamp FROM metrics
            WHERE metric_type = 'cost' AND agent_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut observations = rows
            .into_iter()
            .map(|r| r.try_into())
            .collect::<Result<Vec<CostObservation>>>()?;
        observations.reverse();
        Ok(observations)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn agent_refs(&self, agent_id: Option<&str>) -> Result<Vec<AgentRef>> {
        let mut sql = String::from("SELECT id, name FROM agents");
        if agent_id.is_some() {
            sql.push_str(" WHERE id = ?");
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut q = sqlx::query_as::<_, (String, String)>(&sql);
        if let Some(id) = agent_id {
            q = q.bind(id);
        }

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| AgentRef { id, name })
            .collect())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn agent_name(&self, agent_id: &str) -> Result<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM agents WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn task_count(&self, agent_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks WHERE agent_id = ?")
            .bind(agent_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Fixed-width RFC 3339 form used for every stored timestamp
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// A stored column that fails to decode is corrupt data, not caller input
fn decode_column<T>(column: &str, decoded: Result<T>) -> Result<T> {
    decoded.map_err(|e| match e {
        Error::InvalidArgument(msg) => Error::Parse(format!("column {}: {}", column, msg)),
        other => other,
    })
}

// ==================== Row Types ====================

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    name: String,
    status: String,
    started_at: Option<String>,
    last_activity: String,
    created_at: String,
}

impl TryFrom<AgentRow> for Agent {
    type Error = crate::Error;

    fn try_from(row: AgentRow) -> Result<Self> {
        Ok(Agent {
            id: row.id,
            name: row.name,
            status: decode_column("agents.status", AgentStatus::from_str(&row.status))?,
            started_at: row.started_at.as_deref().map(parse_timestamp).transpose()?,
            last_activity: parse_timestamp(&row.last_activity)?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ObservationRow {
    agent_id: String,
    value: f64,
    timestamp: String,
}

impl TryFrom<ObservationRow> for CostObservation {
    type Error = crate::Error;

    fn try_from(row: ObservationRow) -> Result<Self> {
        Ok(CostObservation::new(
            row.agent_id,
            row.value,
            parse_timestamp(&row.timestamp)?,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    agent_id: String,
    title: String,
    status: String,
    created_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = crate::Error;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: row.id,
            agent_id: row.agent_id,
            title: row.title,
            status: decode_column("tasks.status", TaskStatus::from_str(&row.status))?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    agent_id: String,
    event_type: String,
    message: String,
    timestamp: String,
}

impl TryFrom<EventRow> for AgentEvent {
    type Error = crate::Error;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(AgentEvent {
            id: row.id,
            agent_id: row.agent_id,
            event_type: decode_column(
                "agent_events.event_type",
                AgentEventType::from_str(&row.event_type),
            )?,
            message: row.message,
            timestamp: parse_timestamp(&row.timestamp)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    cpu: f64,
    memory: f64,
    messages_processed: i64,
    average_response_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2025, 1, 9, 8, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1500);
        assert_eq!(format_timestamp(&a), "2025-01-09T08:00:00.000000Z");
        assert_eq!(format_timestamp(&b), "2025-01-09T08:00:00.001500Z");
        assert!(format_timestamp(&a) < format_timestamp(&b));
        assert_eq!(parse_timestamp(&format_timestamp(&b)).unwrap(), b);
    }

    #[test]
    fn test_unknown_stored_enum_is_parse_error() {
        let row = AgentRow {
            id: "agent-1".to_string(),
            name: "Builder".to_string(),
            status: "sleeping".to_string(),
            started_at: None,
            last_activity: "2025-01-09T08:00:00.000000Z".to_string(),
            created_at: "2025-01-09T08:00:00.000000Z".to_string(),
        };
        let err = Agent::try_from(row).unwrap_err();
        assert!(matches!(err, Error::Parse(ref msg) if msg.contains("agents.status")));

        let row = EventRow {
            id: 1,
            agent_id: "agent-1".to_string(),
            event_type: "exploded".to_string(),
            message: String::new(),
            timestamp: "2025-01-09T08:00:00.000000Z".to_string(),
        };
        assert!(matches!(AgentEvent::try_from(row), Err(Error::Parse(_))));

        let row = TaskRow {
            id: 1,
            agent_id: "agent-1".to_string(),
            title: "Build".to_string(),
            status: "paused".to_string(),
            created_at: "2025-01-09T08:00:00.000000Z".to_string(),
        };
        assert!(matches!(Task::try_from(row), Err(Error::Parse(_))));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(parse_timestamp("yesterday"), Err(Error::Parse(_))));
    }
}
