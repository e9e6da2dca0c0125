//! AgentWatch Web - HTTP interface
//!
//! This crate provides:
//! - REST API for agents, metrics and events
//! - Cost optimization endpoint
//! - Server-sent event stream for live dashboard updates

pub mod api;
pub mod cost_api;
pub mod stream;

pub use api::{create_router, ApiError, AppState};
pub use stream::{dashboard_stream, DashboardEvent, DashboardSnapshot, StreamConfig};
