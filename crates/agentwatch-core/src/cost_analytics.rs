//! Cost Analytics Module
//!
//! Aggregation, trend classification and daily breakdown over recorded
//! cost observations. All functions here are pure; fetching the
//! observations is the caller's job.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::policy::AnalysisPolicy;
use crate::{Error, Result};

/// Name reported for observations whose agent cannot be resolved
pub const UNKNOWN_AGENT: &str = "Unknown";

/// A single recorded cost, one per completed agent request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostObservation {
    pub agent_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl CostObservation {
    pub fn new(agent_id: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            agent_id: agent_id.into(),
            value,
            timestamp,
        }
    }

    /// Calendar date of the observation in UTC
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Minimal agent reference used for id to name resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub id: String,
    pub name: String,
}

/// Direction of spend over the analysed window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate spend over a window of days
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostAnalysis {
    pub total_cost: f64,
    /// Spend keyed by resolved agent name
    pub cost_by_agent: BTreeMap<String, f64>,
    pub cost_by_type: BTreeMap<String, f64>,
    pub trend: TrendDirection,
    pub avg_daily_cost: f64,
    pub window_days: i64,
    pub observation_count: usize,
}

/// Breakdown period for daily cost series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostPeriod {
    Day,
    Week,
    Month,
}

impl CostPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostPeriod::Day => "day",
            CostPeriod::Week => "week",
            CostPeriod::Month => "month",
        }
    }

    /// Length of the trailing window covered by this period
    pub fn days(&self) -> i64 {
        match self {
            CostPeriod::Day => 1,
            CostPeriod::Week => 7,
            CostPeriod::Month => 30,
        }
    }
}

impl Default for CostPeriod {
    fn default() -> Self {
        CostPeriod::Week
    }
}

impl std::fmt::Display for CostPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CostPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "day" => Ok(CostPeriod::Day),
            "week" => Ok(CostPeriod::Week),
            "month" => Ok(CostPeriod::Month),
            _ => Err(Error::invalid(format!("Invalid cost period: {}", s))),
        }
    }
}

/// Total spend on one UTC calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCost {
    /// YYYY-MM-DD
    pub date: String,
    pub cost: f64,
}

/// Cost analytics engine for generating insights
pub struct CostAnalytics;

impl CostAnalytics {
    /// Aggregate observations that already fall inside a `window_days` window.
    ///
    /// `names` maps agent id to display name; unresolved ids are reported
    /// as [`UNKNOWN_AGENT`].
    pub fn analyze(
        observations: &[CostObservation],
        names: &HashMap<String, String>,
        window_days: i64,
        policy: &AnalysisPolicy,
    ) -> Result<CostAnalysis> {
        validate_window(window_days)?;

        let total_cost = Self::total(observations);

        let mut cost_by_agent = BTreeMap::new();
        for obs in observations {
            let name = names
                .get(&obs.agent_id)
                .map(String::as_str)
                .unwrap_or(UNKNOWN_AGENT);
            *cost_by_agent.entry(name.to_string()).or_insert(0.0) += obs.value;
        }

        let mut cost_by_type = BTreeMap::new();
        cost_by_type.insert("cost".to_string(), total_cost);

        Ok(CostAnalysis {
            total_cost,
            cost_by_agent,
            cost_by_type,
            trend: Self::calculate_trend(observations, policy),
            avg_daily_cost: total_cost / window_days as f64,
            window_days,
            observation_count: observations.len(),
        })
    }

    pub fn total(observations: &[CostObservation]) -> f64 {
        observations.iter().map(|o| o.value).sum()
    }

    /// Classify the trend of a time-ordered observation sequence.
    ///
    /// The sequence is split in half by count, not by time.
    pub fn calculate_trend(
        observations: &[CostObservation],
        policy: &AnalysisPolicy,
    ) -> TrendDirection {
        if observations.len() < 2 {
            return TrendDirection::Stable;
        }

        let mid = observations.len() / 2;
        let first_half = Self::total(&observations[..mid]);
        let second_half = Self::total(&observations[mid..]);

        if second_half > first_half * policy.trend_increase_factor {
            TrendDirection::Increasing
        } else if second_half < first_half * policy.trend_decrease_factor {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }

    /// Sum observations per UTC calendar day, ascending by date
    pub fn daily_breakdown(observations: &[CostObservation]) -> Vec<DailyCost> {
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for obs in observations {
            *by_date.entry(obs.date()).or_insert(0.0) += obs.value;
        }

        by_date
            .into_iter()
            .map(|(date, cost)| DailyCost {
                date: date.format("%Y-%m-%d").to_string(),
                cost,
            })
            .collect()
    }
}

pub(crate) fn validate_window(days: i64) -> Result<()> {
    if days < 1 {
        return Err(Error::invalid(format!(
            "window must be at least 1 day, got {}",
            days
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    fn series(agent: &str, values: &[f64]) -> Vec<CostObservation> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| CostObservation::new(agent, *v, at(1 + i as u32, 12)))
            .collect()
    }

    fn names() -> HashMap<String, String> {
        HashMap::from([
            ("agent-1".to_string(), "Builder Agent".to_string()),
            ("agent-2".to_string(), "QA Agent".to_string()),
        ])
    }

    #[test]
    fn test_analyze_totals() {
        let mut observations = series("agent-1", &[0.1, 0.2, 0.3]);
        observations.push(CostObservation::new("agent-2", 0.4, at(5, 9)));

        let analysis =
            CostAnalytics::analyze(&observations, &names(), 7, &AnalysisPolicy::default())
                .unwrap();

        assert!((analysis.total_cost - 1.0).abs() < 1e-9);
        assert!((analysis.cost_by_agent["Builder Agent"] - 0.6).abs() < 1e-9);
        assert!((analysis.cost_by_agent["QA Agent"] - 0.4).abs() < 1e-9);
        assert!((analysis.avg_daily_cost - 1.0 / 7.0).abs() < 1e-9);
        assert_eq!(analysis.observation_count, 4);
        assert_eq!(analysis.cost_by_type["cost"], analysis.total_cost);
    }

    #[test]
    fn test_total_matches_sum_of_values() {
        let values: Vec<f64> = (1..=50).map(|i| i as f64 * 0.0137).collect();
        let observations = series("agent-1", &values[..28]);
        let analysis =
            CostAnalytics::analyze(&observations, &names(), 30, &AnalysisPolicy::default())
                .unwrap();
        let expected: f64 = values[..28].iter().sum();
        assert!((analysis.total_cost - expected).abs() < 1e-9);
    }

    #[test]
    fn test_unresolved_agent_is_unknown() {
        let observations = series("ghost", &[1.0]);
        let analysis =
            CostAnalytics::analyze(&observations, &names(), 1, &AnalysisPolicy::default())
                .unwrap();
        assert_eq!(analysis.cost_by_agent.get(UNKNOWN_AGENT), Some(&1.0));
    }

    #[test]
    fn test_analyze_rejects_zero_window() {
        let err = CostAnalytics::analyze(&[], &names(), 0, &AnalysisPolicy::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_analyze_empty() {
        let analysis =
            CostAnalytics::analyze(&[], &names(), 7, &AnalysisPolicy::default()).unwrap();
        assert_eq!(analysis.total_cost, 0.0);
        assert_eq!(analysis.trend, TrendDirection::Stable);
        assert!(analysis.cost_by_agent.is_empty());
    }

    #[test]
    fn test_trend_stable_for_short_sequences() {
        let policy = AnalysisPolicy::default();
        assert_eq!(CostAnalytics::calculate_trend(&[], &policy), TrendDirection::Stable);
        assert_eq!(
            CostAnalytics::calculate_trend(&series("agent-1", &[5.0]), &policy),
            TrendDirection::Stable
        );
    }

    #[test]
    fn test_trend_increasing() {
        let trend = CostAnalytics::calculate_trend(
            &series("agent-1", &[1.0, 1.0, 2.0, 2.0]),
            &AnalysisPolicy::default(),
        );
        assert_eq!(trend, TrendDirection::Increasing);
    }

    #[test]
    fn test_trend_decreasing() {
        let trend = CostAnalytics::calculate_trend(
            &series("agent-1", &[2.0, 2.0, 1.0, 1.0]),
            &AnalysisPolicy::default(),
        );
        assert_eq!(trend, TrendDirection::Decreasing);
    }

    #[test]
    fn test_trend_within_band_is_stable() {
        // 10.5 vs 10.0 is inside the +/-10% band
        let trend = CostAnalytics::calculate_trend(
            &series("agent-1", &[10.0, 10.5]),
            &AnalysisPolicy::default(),
        );
        assert_eq!(trend, TrendDirection::Stable);
    }

    #[test]
    fn test_trend_odd_count_puts_extra_point_in_second_half() {
        // mid = 1: first = [1.0], second = [0.6, 0.6] = 1.2 > 1.1
        let trend = CostAnalytics::calculate_trend(
            &series("agent-1", &[1.0, 0.6, 0.6]),
            &AnalysisPolicy::default(),
        );
        assert_eq!(trend, TrendDirection::Increasing);
    }

    #[test]
    fn test_daily_breakdown_groups_by_utc_date() {
        let observations = vec![
            CostObservation::new("agent-1", 1.0, at(3, 23)),
            CostObservation::new("agent-2", 2.0, at(1, 0)),
            CostObservation::new("agent-1", 0.5, at(3, 1)),
        ];

        let breakdown = CostAnalytics::daily_breakdown(&observations);
        assert_eq!(
            breakdown,
            vec![
                DailyCost {
                    date: "2025-01-01".to_string(),
                    cost: 2.0
                },
                DailyCost {
                    date: "2025-01-03".to_string(),
                    cost: 1.5
                },
            ]
        );
    }

    #[test]
    fn test_cost_period_from_str() {
        assert_eq!("day".parse::<CostPeriod>().unwrap(), CostPeriod::Day);
        assert_eq!("WEEK".parse::<CostPeriod>().unwrap(), CostPeriod::Week);
        assert_eq!("month".parse::<CostPeriod>().unwrap(), CostPeriod::Month);
        assert!(matches!(
            "year".parse::<CostPeriod>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_cost_period_days() {
        assert_eq!(CostPeriod::Day.days(), 1);
        assert_eq!(CostPeriod::Week.days(), 7);
        assert_eq!(CostPeriod::Month.days(), 30);
        assert_eq!(CostPeriod::default(), CostPeriod::Week);
    }
}
