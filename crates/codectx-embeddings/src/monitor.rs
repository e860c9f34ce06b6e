//! Performance monitoring for embedding providers
//!
//! One [`PerformanceMonitor`] tracks one provider instance. Providers record
//! every backend call through [`PerformanceMonitor::record_success`] or
//! [`PerformanceMonitor::record_failure`]; [`PerformanceMonitor::generate_report`]
//! turns the accumulated metrics into a health assessment.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// Response-time samples kept for min/max/average
pub const RESPONSE_WINDOW: usize = 1000;

/// Sliding window for the requests-per-minute figure
const RATE_WINDOW_SECS: i64 = 60;

/// Errors this recent are reported even when the overall rate is fine
const RECENT_ERROR_WINDOW_SECS: i64 = 5 * 60;

/// Point-in-time metrics for one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetrics {
    /// Requests recorded
    pub total_requests: u64,
    /// Requests that succeeded
    pub successful_requests: u64,
    /// Requests that failed
    pub failed_requests: u64,
    /// Mean response time over the rolling window
    pub avg_response_time_ms: f64,
    /// Fastest response in the rolling window
    pub min_response_time_ms: f64,
    /// Slowest response in the rolling window
    pub max_response_time_ms: f64,
    /// Tokens reported by the backend
    pub total_tokens: u64,
    /// Mean tokens over requests that reported a count
    pub avg_tokens_per_request: f64,
    /// Requests recorded in the last 60 seconds
    pub requests_per_minute: u64,
    /// `failed_requests / total_requests`
    pub error_rate: f64,
    /// Message of the most recent failure
    pub last_error: Option<String>,
    /// When the most recent failure happened
    pub last_error_at: Option<DateTime<Utc>>,
}

/// How serious an issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What an issue is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Performance,
    Reliability,
    Cost,
    Configuration,
}

/// A single finding in a [`PerformanceReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceIssue {
    pub severity: Severity,
    pub category: IssueCategory,
    pub message: String,
    /// Measured values behind the finding
    pub details: Value,
}

/// Overall verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health assessment produced by [`PerformanceMonitor::generate_report`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Provider identity, `kind:model`
    pub provider: String,
    pub generated_at: DateTime<Utc>,
    pub health: HealthStatus,
    pub metrics: EmbeddingMetrics,
    pub issues: Vec<PerformanceIssue>,
    /// One line per distinct remedy, in issue order
    pub recommendations: Vec<String>,
}

impl PerformanceReport {
    /// True unless some issue is high or critical
    pub fn is_healthy(&self) -> bool {
        self.health == HealthStatus::Healthy
    }

    /// Issues in `category`
    pub fn issues_in(&self, category: IssueCategory) -> impl Iterator<Item = &PerformanceIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }
}

/// Limits the report checks metrics against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorThresholds {
    /// Slowest acceptable mean response time
    pub max_avg_response_time_ms: f64,
    /// Highest acceptable failure fraction
    pub max_error_rate: f64,
    /// Expected throughput once traffic is non-trivial
    pub min_requests_per_minute: u64,
    /// Request count after which throughput is checked
    pub min_requests_for_throughput_check: u64,
    /// Largest acceptable mean tokens per request
    pub max_tokens_per_request: f64,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            max_avg_response_time_ms: 5000.0,
            max_error_rate: 0.1,
            min_requests_per_minute: 1,
            min_requests_for_throughput_check: 10,
            max_tokens_per_request: 8000.0,
        }
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    metrics: EmbeddingMetrics,
    response_times: VecDeque<f64>,
    request_times: VecDeque<DateTime<Utc>>,
    token_samples: u64,
}

impl MonitorState {
    fn record(&mut self, now: DateTime<Utc>, response_time: Duration) {
        let ms = response_time.as_nanos() as f64 / 1_000_000.0;

        self.response_times.push_back(ms);
        while self.response_times.len() > RESPONSE_WINDOW {
            self.response_times.pop_front();
        }

        self.request_times.push_back(now);
        prune_before(&mut self.request_times, now);

        let m = &mut self.metrics;
        m.total_requests += 1;

        let count = self.response_times.len() as f64;
        m.avg_response_time_ms = self.response_times.iter().sum::<f64>() / count;
        m.min_response_time_ms = self.response_times.iter().copied().fold(f64::INFINITY, f64::min);
        m.max_response_time_ms = self.response_times.iter().copied().fold(0.0, f64::max);
        m.requests_per_minute = self.request_times.len() as u64;
    }

    fn refresh_error_rate(&mut self) {
        let m = &mut self.metrics;
        m.error_rate = if m.total_requests == 0 {
            0.0
        } else {
            m.failed_requests as f64 / m.total_requests as f64
        };
    }
}

fn prune_before(times: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - ChronoDuration::seconds(RATE_WINDOW_SECS);
    while times.front().is_some_and(|t| *t <= cutoff) {
        times.pop_front();
    }
}

/// Tracks request outcomes for a single provider instance
#[derive(Debug)]
pub struct PerformanceMonitor {
    provider: String,
    thresholds: MonitorThresholds,
    state: Mutex<MonitorState>,
}

impl PerformanceMonitor {
    /// Monitor with default thresholds
    pub fn new(provider: impl Into<String>) -> Self {
        Self::with_thresholds(provider, MonitorThresholds::default())
    }

    /// Monitor with custom thresholds
    pub fn with_thresholds(provider: impl Into<String>, thresholds: MonitorThresholds) -> Self {
        Self {
            provider: provider.into(),
            thresholds,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Identity of the monitored provider
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn thresholds(&self) -> &MonitorThresholds {
        &self.thresholds
    }

    /// Record a successful request
    pub fn record_success(&self, response_time: Duration, tokens: Option<u64>) {
        self.record_success_at(Utc::now(), response_time, tokens);
    }

    /// Record a successful request observed at `now`
    pub fn record_success_at(&self, now: DateTime<Utc>, response_time: Duration, tokens: Option<u64>) {
        let mut state = self.state.lock();
        state.record(now, response_time);
        state.metrics.successful_requests += 1;

        if let Some(tokens) = tokens {
            state.token_samples += 1;
            state.metrics.total_tokens += tokens;
            state.metrics.avg_tokens_per_request =
                state.metrics.total_tokens as f64 / state.token_samples as f64;
        }

        state.refresh_error_rate();
    }

    /// Record a failed request
    pub fn record_failure(&self, response_time: Duration, error: &str) {
        self.record_failure_at(Utc::now(), response_time, error);
    }

    /// Record a failed request observed at `now`
    pub fn record_failure_at(&self, now: DateTime<Utc>, response_time: Duration, error: &str) {
        let mut state = self.state.lock();
        state.record(now, response_time);
        state.metrics.failed_requests += 1;
        state.metrics.last_error = Some(error.to_string());
        state.metrics.last_error_at = Some(now);
        state.refresh_error_rate();

        debug!(provider = %self.provider, error, "Recorded embedding failure");
    }

    /// Snapshot of the current metrics
    pub fn metrics(&self) -> EmbeddingMetrics {
        self.metrics_at(Utc::now())
    }

    /// Snapshot with the per-minute window evaluated at `now`
    pub fn metrics_at(&self, now: DateTime<Utc>) -> EmbeddingMetrics {
        let state = self.state.lock();
        let cutoff = now - ChronoDuration::seconds(RATE_WINDOW_SECS);

        let mut metrics = state.metrics.clone();
        metrics.requests_per_minute = state.request_times.iter().filter(|t| **t > cutoff).count() as u64;
        metrics
    }

    /// Clear every counter back to its initial state
    pub fn reset(&self) {
        *self.state.lock() = MonitorState::default();
        debug!(provider = %self.provider, "Performance metrics reset");
    }

    /// Assess current health
    pub fn generate_report(&self) -> PerformanceReport {
        self.generate_report_at(Utc::now())
    }

    /// Assess health as of `now`
    pub fn generate_report_at(&self, now: DateTime<Utc>) -> PerformanceReport {
        let metrics = self.metrics_at(now);
        let issues = self.classify(&metrics, now);

        let health = if issues.iter().any(|i| i.severity >= Severity::High) {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };

        let recommendations = recommendations_for(&issues);

        if health == HealthStatus::Unhealthy {
            warn!(
                provider = %self.provider,
                issues = issues.len(),
                error_rate = metrics.error_rate,
                avg_response_time_ms = metrics.avg_response_time_ms,
                "Embedding provider is unhealthy"
            );
        }

        PerformanceReport {
            provider: self.provider.clone(),
            generated_at: now,
            health,
            metrics,
            issues,
            recommendations,
        }
    }

    fn classify(&self, m: &EmbeddingMetrics, now: DateTime<Utc>) -> Vec<PerformanceIssue> {
        let t = &self.thresholds;
        let mut issues = Vec::new();

        if m.total_requests > 0 && m.successful_requests == 0 {
            issues.push(PerformanceIssue {
                severity: Severity::High,
                category: IssueCategory::Configuration,
                message: "No request has succeeded yet".to_string(),
                details: json!({
                    "failed_requests": m.failed_requests,
                    "last_error": m.last_error,
                }),
            });
        }

        if m.total_requests > 0 && m.error_rate > t.max_error_rate {
            let severity = if m.error_rate > 0.5 {
                Severity::Critical
            } else {
                Severity::High
            };
            issues.push(PerformanceIssue {
                severity,
                category: IssueCategory::Reliability,
                message: format!(
                    "Error rate {:.1}% exceeds {:.1}%",
                    m.error_rate * 100.0,
                    t.max_error_rate * 100.0
                ),
                details: json!({
                    "error_rate": m.error_rate,
                    "threshold": t.max_error_rate,
                    "failed_requests": m.failed_requests,
                    "total_requests": m.total_requests,
                }),
            });
        }

        if let (Some(at), Some(error)) = (m.last_error_at, m.last_error.as_ref()) {
            let age = now - at;
            if age <= ChronoDuration::seconds(RECENT_ERROR_WINDOW_SECS) {
                issues.push(PerformanceIssue {
                    severity: Severity::Medium,
                    category: IssueCategory::Reliability,
                    message: format!("Recent error: {}", error),
                    details: json!({
                        "last_error_at": at.to_rfc3339(),
                        "seconds_ago": age.num_seconds(),
                    }),
                });
            }
        }

        if m.total_requests > 0 && m.avg_response_time_ms > t.max_avg_response_time_ms {
            let severity = if m.avg_response_time_ms >= t.max_avg_response_time_ms * 2.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            issues.push(PerformanceIssue {
                severity,
                category: IssueCategory::Performance,
                message: format!(
                    "Average response time {:.0}ms exceeds {:.0}ms",
                    m.avg_response_time_ms, t.max_avg_response_time_ms
                ),
                details: json!({
                    "avg_response_time_ms": m.avg_response_time_ms,
                    "max_response_time_ms": m.max_response_time_ms,
                    "threshold_ms": t.max_avg_response_time_ms,
                }),
            });
        }

        if m.total_requests >= t.min_requests_for_throughput_check
            && m.requests_per_minute < t.min_requests_per_minute
        {
            issues.push(PerformanceIssue {
                severity: Severity::Low,
                category: IssueCategory::Performance,
                message: format!(
                    "Throughput {} requests/min is below {}",
                    m.requests_per_minute, t.min_requests_per_minute
                ),
                details: json!({
                    "requests_per_minute": m.requests_per_minute,
                    "threshold": t.min_requests_per_minute,
                }),
            });
        }

        if m.avg_tokens_per_request > t.max_tokens_per_request {
            issues.push(PerformanceIssue {
                severity: Severity::Medium,
                category: IssueCategory::Cost,
                message: format!(
                    "Average of {:.0} tokens per request exceeds {:.0}",
                    m.avg_tokens_per_request, t.max_tokens_per_request
                ),
                details: json!({
                    "avg_tokens_per_request": m.avg_tokens_per_request,
                    "total_tokens": m.total_tokens,
                    "threshold": t.max_tokens_per_request,
                }),
            });
        }

        issues
    }
}

/// One recommendation per distinct advice, in first-seen order
fn recommendations_for(issues: &[PerformanceIssue]) -> Vec<String> {
    let mut recommendations: Vec<String> = Vec::new();
    for issue in issues {
        let rec = recommendation_for(issue);
        if !recommendations.iter().any(|r| r == rec) {
            recommendations.push(rec.to_string());
        }
    }
    recommendations
}

fn recommendation_for(issue: &PerformanceIssue) -> &'static str {
    match (issue.category, issue.severity) {
        (IssueCategory::Configuration, _) => {
            "Verify the provider endpoint, model name and credentials"
        }
        (IssueCategory::Reliability, Severity::High | Severity::Critical) => {
            "Investigate error patterns; check API credentials and rate limits"
        }
        (IssueCategory::Reliability, _) => "Review recent errors in the provider logs",
        (IssueCategory::Performance, Severity::Low) => {
            "Throughput is low; increase the batch size or check that the caller is not stalled"
        }
        (IssueCategory::Performance, _) => {
            "Reduce the batch size or switch to a faster model or backend"
        }
        (IssueCategory::Cost, _) => "Split large chunks to reduce tokens per request",
    }
}
