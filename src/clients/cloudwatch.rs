/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/clients/cloudwatch.rs
*
* This module is the metrics-source adapter. The engine asks two questions
* about a function: "how is its latency" and "how much traffic did it serve,
* and how much of that failed". `CloudWatchClient` answers both against a
* CloudWatch-compatible metrics gateway speaking the GetMetricStatistics
* query parameters with JSON responses.
*
* Architecture:
* - `MetricsProvider` is the injection seam; the engine never sees reqwest.
* - A window with no datapoints is a valid "no signal" answer (`None` for
*   latency, zero counts), never an error. The policy layer decides what
*   silence means.
* - Latency reports the newest datapoint in the window, matching how the
*   platform aggregates the Duration metric; counts sum over the window.
*
* SPDX-License-Identifier: Apache-2.0
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const METRIC_NAMESPACE: &str = "AWS/Lambda";
const METRIC_PERIOD_SECONDS: u32 = 60;

// --- Data model ---

/// Invocation latency aggregates for one evaluation window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub average: f64,
    pub maximum: f64,
}

/// Traffic counts for one evaluation window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationCounts {
    pub requests: u64,
    pub errors: u64,
}

/// Everything the engine observes about a canary in one tick.
#[derive(Debug, Clone, Copy)]
pub struct MetricSample {
    pub latency: Option<LatencyStats>,
    pub counts: InvocationCounts,
}

// --- Trait ---

#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Latency aggregates of the newest datapoint in the window, or `None`
    /// when the window is empty.
    async fn get_statistics(
        &self,
        function_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<LatencyStats>>;

    /// Total invocations and errors over the window. Empty windows are zero
    /// counts.
    async fn get_invocation_counts(
        &self,
        function_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<InvocationCounts>;
}

// --- Wire types ---

#[derive(Deserialize, Debug)]
struct StatisticsResponse {
    #[serde(rename = "Datapoints", default)]
    datapoints: Vec<Datapoint>,
}

#[derive(Deserialize, Debug, Clone)]
struct Datapoint {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Average")]
    average: Option<f64>,
    #[serde(rename = "Maximum")]
    maximum: Option<f64>,
    #[serde(rename = "Sum")]
    sum: Option<f64>,
}

impl Datapoint {
    fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

// --- Pure helpers ---

/// UTC timestamp in the format the metrics gateway expects.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn latest_datapoint(datapoints: &[Datapoint]) -> Option<&Datapoint> {
    datapoints.iter().max_by_key(|dp| dp.parsed_timestamp())
}

fn total_sum(datapoints: &[Datapoint]) -> u64 {
    let total: f64 = datapoints.iter().filter_map(|dp| dp.sum).sum();
    total.round() as u64
}

// --- HTTP adapter ---

/// A client for a CloudWatch-compatible metrics gateway.
pub struct CloudWatchClient {
    client: reqwest::Client,
    endpoint: String,
}

impl CloudWatchClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    async fn get_metric_statistics(
        &self,
        function_name: &str,
        metric_name: &str,
        statistics: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Datapoint>> {
        debug!(
            function = function_name,
            metric = metric_name,
            start = %format_timestamp(start),
            end = %format_timestamp(end),
            "Querying metrics gateway"
        );
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("Action", "GetMetricStatistics"),
                ("Version", "2010-08-01"),
                ("Namespace", METRIC_NAMESPACE),
                ("MetricName", metric_name),
                ("FunctionName", function_name),
                ("StartTime", &format_timestamp(start)),
                ("EndTime", &format_timestamp(end)),
                ("Period", &METRIC_PERIOD_SECONDS.to_string()),
                ("Statistics", statistics),
            ])
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Platform {
                status: status.as_u16(),
                message,
            });
        }

        let body: StatisticsResponse = response.json().await?;
        Ok(body.datapoints)
    }
}

#[async_trait]
impl MetricsProvider for CloudWatchClient {
    async fn get_statistics(
        &self,
        function_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<LatencyStats>> {
        let datapoints = self
            .get_metric_statistics(function_name, "Duration", "Average,Maximum", start, end)
            .await?;
        let Some(latest) = latest_datapoint(&datapoints) else {
            warn!(function = function_name, "No metric statistics found");
            return Ok(None);
        };
        Ok(Some(LatencyStats {
            average: latest.average.unwrap_or(0.0),
            maximum: latest.maximum.unwrap_or(0.0),
        }))
    }

    async fn get_invocation_counts(
        &self,
        function_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<InvocationCounts> {
        let invocations = self
            .get_metric_statistics(function_name, "Invocations", "Sum", start, end)
            .await?;
        let errors = self
            .get_metric_statistics(function_name, "Errors", "Sum", start, end)
            .await?;
        Ok(InvocationCounts {
            requests: total_sum(&invocations),
            errors: total_sum(&errors),
        })
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dp(timestamp: &str, average: f64, maximum: f64) -> Datapoint {
        Datapoint {
            timestamp: timestamp.to_string(),
            average: Some(average),
            maximum: Some(maximum),
            sum: None,
        }
    }

    #[test]
    fn statistics_response_parses_gateway_json() {
        let json = r#"
        {
            "Label": "Duration",
            "Datapoints": [
                { "Timestamp": "2025-01-01T10:00:00Z", "Average": 120.5, "Maximum": 340.0 },
                { "Timestamp": "2025-01-01T10:01:00Z", "Average": 110.0, "Maximum": 290.0 }
            ]
        }
        "#;
        let parsed: StatisticsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.datapoints.len(), 2);
        assert_eq!(parsed.datapoints[0].average, Some(120.5));
    }

    #[test]
    fn newest_datapoint_wins_regardless_of_order() {
        let datapoints = vec![
            dp("2025-01-01T10:05:00Z", 300.0, 500.0),
            dp("2025-01-01T10:09:00Z", 100.0, 200.0),
            dp("2025-01-01T10:02:00Z", 250.0, 400.0),
        ];
        let latest = latest_datapoint(&datapoints).unwrap();
        assert_eq!(latest.average, Some(100.0));
    }

    #[test]
    fn empty_window_has_no_latest_datapoint() {
        assert!(latest_datapoint(&[]).is_none());
    }

    #[test]
    fn sums_accumulate_across_the_window() {
        let datapoints = vec![
            Datapoint {
                timestamp: "2025-01-01T10:00:00Z".to_string(),
                average: None,
                maximum: None,
                sum: Some(40.0),
            },
            Datapoint {
                timestamp: "2025-01-01T10:01:00Z".to_string(),
                average: None,
                maximum: None,
                sum: Some(60.0),
            },
        ];
        assert_eq!(total_sum(&datapoints), 100);
        assert_eq!(total_sum(&[]), 0);
    }

    #[test]
    fn timestamps_format_as_utc_iso8601() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 10, 30, 0).unwrap();
        assert_eq!(format_timestamp(at), "2025-01-01T10:30:00Z");
    }
}
