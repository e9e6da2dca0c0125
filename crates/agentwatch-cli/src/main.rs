//! AgentWatch CLI

use agentwatch_core::{
    Agent, AgentEventType, AgentStatus, AgentView, ComplexityTier, CostOptimizer, CostPeriod,
    CostPolicy, Database, ResourceSnapshot, TaskStatus,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Initialize logging with the specified verbosity level
fn init_logging(verbose: u8, quiet: bool, json: bool) -> Result<()> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter =
        EnvFilter::from_default_env().add_directive(format!("agentwatch={}", level).parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2) // Show module path at debug+
        .with_file(verbose >= 3) // Show file:line at trace
        .with_line_number(verbose >= 3);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "agentwatch")]
#[command(about = "Monitoring and cost analytics for AI agents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database path
    #[arg(
        long,
        env = "AGENTWATCH_DB_PATH",
        default_value = "~/.agentwatch/agentwatch.db",
        global = true
    )]
    db_path: String,

    /// Cost policy file (TOML); built-in defaults when omitted
    #[arg(long, env = "AGENTWATCH_POLICY", global = true)]
    policy: Option<String>,

    /// Increase verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output logs as JSON (for machine parsing)
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start web interface
    Web {
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Agent management
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Record metrics, tasks and events
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },
    /// Cost analytics
    Cost {
        #[command(subcommand)]
        action: CostAction,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// Register a new agent
    Add {
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Agent ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Initial status (running, idle, error)
        #[arg(short, long, default_value = "idle")]
        status: String,
    },
    /// List agents
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show agent details, metrics and recent events
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Change an agent's status
    Status {
        id: String,
        /// New status (running, idle, error)
        status: String,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Record a cost observation
    Cost {
        #[arg(short, long)]
        agent: String,
        /// Cost in USD
        #[arg(long)]
        value: f64,
        /// RFC 3339 timestamp (now when omitted)
        #[arg(long)]
        at: Option<String>,
    },
    /// Record a task
    Task {
        #[arg(short, long)]
        agent: String,
        #[arg(short, long)]
        title: String,
        /// pending, completed or failed
        #[arg(short, long, default_value = "completed")]
        status: String,
    },
    /// Record an agent event
    Event {
        #[arg(short, long)]
        agent: String,
        /// started, stopped, error, task_completed or message_received
        #[arg(short = 't', long = "type")]
        event_type: String,
        #[arg(short, long)]
        message: String,
    },
    /// Record a resource usage snapshot
    Snapshot {
        #[arg(short, long)]
        agent: String,
        /// CPU usage percent
        #[arg(long)]
        cpu: f64,
        /// Memory usage percent
        #[arg(long)]
        memory: f64,
        #[arg(long, default_value = "0")]
        messages: i64,
        /// Average response time in milliseconds
        #[arg(long, default_value = "0")]
        response_time: f64,
    },
}

#[derive(Subcommand)]
enum CostAction {
    /// Aggregate spend over a trailing window
    Analysis {
        #[arg(short, long)]
        agent: Option<String>,
        /// Window length in days (policy default when omitted)
        #[arg(short, long)]
        days: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    /// Detect cost spikes
    Anomalies {
        #[arg(short, long)]
        agent: Option<String>,
        /// Standard deviations above the mean (policy default when omitted)
        #[arg(short, long)]
        threshold: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Prioritized optimization recommendations
    Recommend {
        #[arg(short, long)]
        agent: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Daily spend breakdown
    Breakdown {
        #[arg(short, long)]
        agent: Option<String>,
        /// day, week or month
        #[arg(short, long, default_value = "week")]
        period: String,
        #[arg(long)]
        json: bool,
    },
    /// Predict task cost and the cheapest suitable model
    PredictRoi {
        #[arg(short, long, default_value = "1000")]
        tokens: i64,
        /// low, medium or high
        #[arg(short, long, default_value = "medium")]
        complexity: String,
        /// Model family hint
        #[arg(long, default_value = "openai")]
        agent_type: String,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet, cli.log_json)?;

    let db_path = PathBuf::from(shellexpand::tilde(&cli.db_path).to_string());
    let db = Database::new(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let policy = match &cli.policy {
        Some(path) => CostPolicy::load(shellexpand::tilde(path).to_string())?,
        None => CostPolicy::default(),
    };

    let result = match cli.command {
        Commands::Web { port } => run_web(db.clone(), policy, port).await,
        Commands::Agent { action } => handle_agent(&db, action).await,
        Commands::Record { action } => handle_record(&db, action).await,
        Commands::Cost { action } => {
            let optimizer = CostOptimizer::new(db.clone(), Arc::new(policy));
            handle_cost(&optimizer, action).await
        }
    };

    db.close().await;
    result
}

async fn run_web(db: Database, policy: CostPolicy, port: u16) -> Result<()> {
    use agentwatch_web::{create_router, AppState};

    let state = Arc::new(AppState::new(db, policy));
    let app = create_router(state);

    println!("Starting web server on http://localhost:{}", port);
    info!(port, "Web server starting");

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ==================== Agent Commands ====================

async fn handle_agent(db: &Database, action: AgentAction) -> Result<()> {
    match action {
        AgentAction::Add { name, id, status } => {
            let status = AgentStatus::from_str(&status)?;
            let mut agent = Agent::new(name).with_status(status);
            if let Some(id) = id {
                agent = agent.with_id(id);
            }
            db.insert_agent(&agent).await?;
            println!("Agent '{}' added with ID {}", agent.name, agent.id);
        }
        AgentAction::List { json } => {
            let now = Utc::now();
            let agents: Vec<AgentView> = db
                .list_agents()
                .await?
                .iter()
                .map(|a| AgentView::from_agent(a, now))
                .collect();

            if json {
                print_json(&agents)?;
            } else if agents.is_empty() {
                println!("No agents registered");
            } else {
                println!("{:<36} {:<24} {:<8} {:>10}", "ID", "NAME", "STATUS", "UPTIME");
                println!("{}", "-".repeat(81));
                for agent in agents {
                    println!(
                        "{:<36} {:<24} {:<8} {:>10}",
                        agent.id,
                        truncate(&agent.name, 24),
                        agent.status.as_str(),
                        format_uptime(agent.uptime)
                    );
                }
            }
        }
        AgentAction::Show { id, json } => {
            let now = Utc::now();
            let agent = db
                .get_agent(&id)
                .await?
                .ok_or_else(|| agentwatch_core::Error::AgentNotFound(id.clone()))?;
            let metrics = db.get_agent_metrics(&id, now).await?;
            let events = db.get_agent_events(&id, 10).await?;

            if json {
                print_json(&serde_json::json!({
                    "agent": AgentView::from_agent(&agent, now),
                    "metrics": metrics,
                    "events": events,
                }))?;
                return Ok(());
            }

            println!("Agent: {}", agent.id);
            println!("Name: {}", agent.name);
            println!("Status: {}", agent.status.as_str());
            println!("Uptime: {}", format_uptime(agent.uptime_secs(now)));
            println!("Last activity: {}", agent.last_activity.to_rfc3339());
            if let Some(m) = metrics {
                println!("CPU: {:.1}%", m.cpu);
                println!("Memory: {:.1}%", m.memory);
                println!(
                    "Tasks: {} completed, {} failed",
                    m.tasks_completed, m.tasks_failed
                );
                println!("Messages processed: {}", m.messages_processed);
                println!("Average response time: {:.0} ms", m.average_response_time_ms);
            }
            if !events.is_empty() {
                println!("\nRecent events:");
                for event in events {
                    println!(
                        "  {} {:<16} {}",
                        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        event.event_type.as_str(),
                        event.message
                    );
                }
            }
        }
        AgentAction::Status { id, status } => {
            let status = AgentStatus::from_str(&status)?;
            db.update_agent_status(&id, status, Utc::now()).await?;
            println!("Agent {} is now {}", id, status.as_str());
        }
    }
    Ok(())
}

// ==================== Record Commands ====================

async fn handle_record(db: &Database, action: RecordAction) -> Result<()> {
    match action {
        RecordAction::Cost { agent, value, at } => {
            let timestamp = match at {
                Some(at) => parse_timestamp(&at)?,
                None => Utc::now(),
            };
            let metric = db.record_cost(&agent, value, timestamp).await?;
            println!("Recorded cost ${:.4} for {} (#{})", value, agent, metric.id);
        }
        RecordAction::Task {
            agent,
            title,
            status,
        } => {
            let status = TaskStatus::from_str(&status)?;
            let task = db.insert_task(&agent, &title, status, Utc::now()).await?;
            db.touch_agent(&agent, task.created_at).await?;
            println!("Recorded task #{} for {}", task.id, agent);
        }
        RecordAction::Event {
            agent,
            event_type,
            message,
        } => {
            let event_type = AgentEventType::from_str(&event_type)?;
            let event = db
                .insert_event(&agent, event_type, &message, Utc::now())
                .await?;
            db.touch_agent(&agent, event.timestamp).await?;
            println!("Recorded {} event for {}", event_type.as_str(), agent);
        }
        RecordAction::Snapshot {
            agent,
            cpu,
            memory,
            messages,
            response_time,
        } => {
            let snapshot = ResourceSnapshot {
                agent_id: agent.clone(),
                cpu,
                memory,
                messages_processed: messages,
                average_response_time_ms: response_time,
                updated_at: Utc::now(),
            };
            db.upsert_resource_snapshot(&snapshot).await?;
            println!("Recorded resource snapshot for {}", agent);
        }
    }
    Ok(())
}

// ==================== Cost Commands ====================

async fn handle_cost(optimizer: &CostOptimizer<Database>, action: CostAction) -> Result<()> {
    match action {
        CostAction::Analysis { agent, days, json } => {
            let days = days.unwrap_or(optimizer.policy().analysis.default_window_days);
            let analysis = optimizer.analyze(agent.as_deref(), days).await?;

            if json {
                return print_json(&analysis);
            }

            println!("Cost analysis (last {} days)", analysis.window_days);
            println!("{}", "-".repeat(40));
            println!("Total cost:       ${:.4}", analysis.total_cost);
            println!("Avg daily cost:   ${:.4}", analysis.avg_daily_cost);
            println!("Trend:            {}", analysis.trend);
            println!("Observations:     {}", analysis.observation_count);
            if !analysis.cost_by_agent.is_empty() {
                println!("\n{:<30} {:>12}", "AGENT", "COST");
                for (name, cost) in &analysis.cost_by_agent {
                    println!("{:<30} {:>12.4}", truncate(name, 30), cost);
                }
            }
        }
        CostAction::Anomalies {
            agent,
            threshold,
            json,
        } => {
            let threshold =
                threshold.unwrap_or(optimizer.policy().anomaly.default_threshold);
            let anomalies = optimizer
                .detect_anomalies(agent.as_deref(), threshold)
                .await?;

            if json {
                return print_json(&serde_json::json!({ "anomalies": anomalies }));
            }
            if anomalies.is_empty() {
                println!("No cost anomalies detected");
                return Ok(());
            }

            println!(
                "{:<24} {:>12} {:>12} {:>10}",
                "AGENT", "EXPECTED", "ACTUAL", "DEVIATION"
            );
            println!("{}", "-".repeat(61));
            for a in anomalies {
                println!(
                    "{:<24} {:>12.4} {:>12.4} {:>9.1}%",
                    truncate(&a.agent_name, 24),
                    a.expected_value,
                    a.actual_value,
                    a.deviation_percent
                );
            }
        }
        CostAction::Recommend { agent, json } => {
            let recommendations = optimizer.recommend(agent.as_deref()).await?;

            if json {
                return print_json(&serde_json::json!({ "recommendations": recommendations }));
            }
            if recommendations.is_empty() {
                println!("No recommendations");
                return Ok(());
            }

            println!("{:<8} {:<14} {:>10}  {}", "PRIORITY", "TYPE", "SAVINGS", "TITLE");
            println!("{}", "-".repeat(80));
            for r in recommendations {
                println!(
                    "{:<8} {:<14} {:>10.4}  {}",
                    r.priority.as_str(),
                    r.kind.as_str(),
                    r.potential_savings,
                    r.title
                );
            }
        }
        CostAction::Breakdown {
            agent,
            period,
            json,
        } => {
            let period: CostPeriod = period.parse()?;
            let breakdown = optimizer.breakdown(agent.as_deref(), period).await?;

            if json {
                return print_json(&serde_json::json!({ "breakdown": breakdown }));
            }
            if breakdown.is_empty() {
                println!("No costs recorded in the last {}", period);
                return Ok(());
            }

            println!("{:<12} {:>12}", "DATE", "COST");
            println!("{}", "-".repeat(25));
            for day in breakdown {
                println!("{:<12} {:>12.4}", day.date, day.cost);
            }
        }
        CostAction::PredictRoi {
            tokens,
            complexity,
            agent_type,
            json,
        } => {
            let complexity: ComplexityTier = complexity.parse()?;
            let prediction = optimizer.predict_roi(&agent_type, tokens, complexity)?;

            if json {
                return print_json(&prediction);
            }

            println!("Recommended model: {}", prediction.recommended_model);
            println!("Estimated cost:    ${:.6}", prediction.estimated_cost);
            println!("Estimated tokens:  {}", prediction.estimated_tokens);
            println!("Confidence:        {:.0}%", prediction.confidence * 100.0);
            if !prediction.alternatives.is_empty() {
                println!("\n{:<20} {:>12} {:>12}", "MODEL", "COST", "SAVINGS");
                for alt in &prediction.alternatives {
                    println!("{:<20} {:>12.6} {:>12.6}", alt.model, alt.cost, alt.savings);
                }
            }
        }
    }
    Ok(())
}

// ==================== Helpers ====================

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp '{}', expected RFC 3339", s))?;
    Ok(parsed.with_timezone(&Utc))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn format_uptime(secs: i64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
