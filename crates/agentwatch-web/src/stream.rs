//! Server-sent dashboard updates
//!
//! A client receives an `init` snapshot on connect, an `update` snapshot
//! every update interval and a `heartbeat` every heartbeat interval until it
//! disconnects. Snapshots are read from the store each time.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use agentwatch_core::{AgentMetrics, AgentView, Database, Result};
use chrono::{DateTime, Utc};
use futures::{stream, Stream, StreamExt};
use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

use crate::api::AppState;

/// Timing for the dashboard stream
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub update_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

/// Agents and their metrics at one instant
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub timestamp: DateTime<Utc>,
    pub agents: Vec<AgentView>,
    /// Keyed by agent id
    pub metrics: BTreeMap<String, AgentMetrics>,
}

impl DashboardSnapshot {
    pub async fn load(db: &Database, now: DateTime<Utc>) -> Result<Self> {
        let agents = db
            .list_agents()
            .await?
            .iter()
            .map(|a| AgentView::from_agent(a, now))
            .collect();
        let metrics = db.all_agent_metrics(now).await?;
        Ok(Self {
            timestamp: now,
            agents,
            metrics,
        })
    }
}

/// One message on the dashboard stream
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardEvent {
    Init(DashboardSnapshot),
    Update(DashboardSnapshot),
    Heartbeat { timestamp: DateTime<Utc> },
}

impl DashboardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DashboardEvent::Init(_) => "init",
            DashboardEvent::Update(_) => "update",
            DashboardEvent::Heartbeat { .. } => "heartbeat",
        }
    }

    fn to_sse(&self) -> Event {
        let event = Event::default().event(self.name());
        match serde_json::to_string(self) {
            Ok(data) => event.data(data),
            Err(e) => {
                tracing::warn!(error = %e, event = self.name(), "Failed to serialize dashboard event");
                event.comment("serialization failed")
            }
        }
    }
}

/// Infinite stream of dashboard events for one client.
///
/// A snapshot that fails to load is logged and skipped.
pub fn dashboard_stream(
    db: Database,
    config: StreamConfig,
) -> impl Stream<Item = DashboardEvent> + Send + 'static {
    let start = Instant::now();

    let init = {
        let db = db.clone();
        stream::once(async move {
            DashboardSnapshot::load(&db, Utc::now())
                .await
                .map(DashboardEvent::Init)
        })
    };

    let mut updates = interval_at(start + config.update_interval, config.update_interval);
    updates.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let updates = IntervalStream::new(updates).then(move |_| {
        let db = db.clone();
        async move {
            DashboardSnapshot::load(&db, Utc::now())
                .await
                .map(DashboardEvent::Update)
        }
    });

    let mut heartbeats = interval_at(start + config.heartbeat_interval, config.heartbeat_interval);
    heartbeats.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let heartbeats = IntervalStream::new(heartbeats).map(|_| -> Result<DashboardEvent> {
        Ok(DashboardEvent::Heartbeat {
            timestamp: Utc::now(),
        })
    });

    init.chain(stream::select(updates, heartbeats))
        .filter_map(|result| async move {
            match result {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping dashboard snapshot");
                    None
                }
            }
        })
}

pub(crate) async fn agent_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    tracing::debug!("Dashboard stream client connected");
    let events = dashboard_stream(state.db.clone(), state.stream.clone())
        .map(|event| Ok(event.to_sse()));

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwatch_core::{Agent, AgentStatus};

    fn fast() -> StreamConfig {
        StreamConfig {
            update_interval: Duration::from_millis(10),
            heartbeat_interval: Duration::from_millis(60),
        }
    }

    #[test]
    fn test_event_serialization() {
        let now = Utc::now();
        let heartbeat = serde_json::to_value(DashboardEvent::Heartbeat { timestamp: now }).unwrap();
        assert_eq!(heartbeat["type"], "heartbeat");

        let snapshot = DashboardSnapshot {
            timestamp: now,
            agents: vec![],
            metrics: BTreeMap::new(),
        };
        let init = serde_json::to_value(DashboardEvent::Init(snapshot)).unwrap();
        assert_eq!(init["type"], "init");
        assert!(init["agents"].as_array().unwrap().is_empty());
        assert!(init.get("metrics").is_some());
    }

    #[tokio::test]
    async fn test_stream_starts_with_init_then_updates_and_heartbeats() {
        let db = Database::in_memory().await.unwrap();
        db.insert_agent(&Agent::new("Builder").with_status(AgentStatus::Running))
            .await
            .unwrap();

        let mut events = Box::pin(dashboard_stream(db, fast()));

        let first = events.next().await.unwrap();
        match &first {
            DashboardEvent::Init(snapshot) => assert_eq!(snapshot.agents.len(), 1),
            other => panic!("expected init, got {}", other.name()),
        }

        let mut names = Vec::new();
        let collect = async {
            while let Some(event) = events.next().await {
                names.push(event.name());
                if event.name() == "heartbeat" {
                    break;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), collect)
            .await
            .expect("heartbeat within timeout");

        assert!(names.contains(&"update"));
        assert_eq!(names.last(), Some(&"heartbeat"));
        assert!(!names.contains(&"init"));
    }
}
