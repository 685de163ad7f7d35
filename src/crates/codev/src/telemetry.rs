//! Per-phase metrics and schema-drift policy
//!
//! Every phase of a session records a [`PhaseMetrics`] entry into the
//! append-only `phase_metrics` channel: wall-clock timing plus token, tool
//! and repair counters. Drift checking compares the schema-snapshot
//! fingerprint recorded at the previous compile with the current one and
//! applies the configured policy.

use crate::config::DriftPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Timing and counters for one phase execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub phase: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_call_count: u32,
    pub cache_hits: u32,
    pub repair_events: u32,
}

/// Accumulates counters while a phase runs, then stamps the entry.
#[derive(Debug)]
pub struct PhaseTimer {
    phase: String,
    start: DateTime<Utc>,
    input_tokens: u64,
    output_tokens: u64,
    tool_call_count: u32,
    cache_hits: u32,
    repair_events: u32,
}

impl PhaseTimer {
    pub fn start(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            start: Utc::now(),
            input_tokens: 0,
            output_tokens: 0,
            tool_call_count: 0,
            cache_hits: 0,
            repair_events: 0,
        }
    }

    pub fn add_tokens(&mut self, input: u64, output: u64) {
        self.input_tokens += input;
        self.output_tokens += output;
    }

    pub fn add_tool_calls(&mut self, calls: u32, cache_hits: u32) {
        self.tool_call_count += calls;
        self.cache_hits += cache_hits;
    }

    pub fn add_repair_event(&mut self) {
        self.repair_events += 1;
    }

    pub fn finish(self) -> PhaseMetrics {
        let end = Utc::now();
        let duration_ms = (end - self.start).num_milliseconds().max(0) as u64;
        PhaseMetrics {
            phase: self.phase,
            start_ts: self.start,
            end_ts: end,
            duration_ms,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            tool_call_count: self.tool_call_count,
            cache_hits: self.cache_hits,
            repair_events: self.repair_events,
        }
    }
}

/// Outcome of a drift check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftAction {
    /// Fingerprint unchanged (or first compile)
    Proceed,
    /// Changed, policy=warn: logged, compile continues
    ProceedWithWarning,
    /// Changed, policy=refresh: caller re-indexes and continues
    Refresh,
    /// Changed, policy=fail: terminal error with the new fingerprint
    Fail { fingerprint: String },
}

/// Compare the fingerprint recorded at the previous compile against the
/// current one and apply the policy.
pub fn check_drift(
    previous: Option<&str>,
    current: &str,
    policy: DriftPolicy,
) -> DriftAction {
    match previous {
        None => DriftAction::Proceed,
        Some(prev) if prev == current => DriftAction::Proceed,
        Some(prev) => {
            warn!(
                previous = %prev,
                current = %current,
                ?policy,
                "Node-schema snapshot fingerprint changed mid-session"
            );
            match policy {
                DriftPolicy::Warn => DriftAction::ProceedWithWarning,
                DriftPolicy::Refresh => DriftAction::Refresh,
                DriftPolicy::Fail => DriftAction::Fail {
                    fingerprint: current.to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_accumulates_counters() {
        let mut timer = PhaseTimer::start("discover");
        timer.add_tokens(100, 20);
        timer.add_tokens(50, 5);
        timer.add_tool_calls(3, 1);
        timer.add_repair_event();

        let metrics = timer.finish();
        assert_eq!(metrics.phase, "discover");
        assert_eq!(metrics.input_tokens, 150);
        assert_eq!(metrics.output_tokens, 25);
        assert_eq!(metrics.tool_call_count, 3);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.repair_events, 1);
        assert!(metrics.end_ts >= metrics.start_ts);
    }

    #[test]
    fn drift_actions_follow_policy() {
        assert_eq!(
            check_drift(None, "abc", DriftPolicy::Fail),
            DriftAction::Proceed
        );
        assert_eq!(
            check_drift(Some("abc"), "abc", DriftPolicy::Fail),
            DriftAction::Proceed
        );
        assert_eq!(
            check_drift(Some("abc"), "def", DriftPolicy::Warn),
            DriftAction::ProceedWithWarning
        );
        assert_eq!(
            check_drift(Some("abc"), "def", DriftPolicy::Refresh),
            DriftAction::Refresh
        );
        assert_eq!(
            check_drift(Some("abc"), "def", DriftPolicy::Fail),
            DriftAction::Fail {
                fingerprint: "def".to_string()
            }
        );
    }
}
