//! Loop detector combining the pattern scans into verdicts.

use super::config::LoopDetectionConfig;
use super::history::{CallHistory, HistoryEntry};
use super::keys::{CallKey, OutcomeKey};
use super::tool_detector::{no_progress_streak, ping_pong_streak, repeat_count};
use super::types::{
    LoopDetection, LoopDetectionStats, LoopPattern, LoopVerdict, Severity, ToolOutcome,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Detects agents stuck repeating tool calls.
///
/// `check` is read-only; only `record`, `record_blocked` and the warning
/// dedup methods mutate state. Counts in verdicts include the call being
/// checked.
pub struct LoopDetector {
    config: Arc<LoopDetectionConfig>,
    history: CallHistory,
    warning_buckets: HashMap<(LoopPattern, CallKey), usize>,
    warning_bucket_cap: usize,
}

impl LoopDetector {
    /// Create a detector with the given configuration.
    #[must_use]
    pub fn new(config: Arc<LoopDetectionConfig>) -> Self {
        let history = CallHistory::new(config.history_size);
        Self {
            warning_bucket_cap: config
                .max_warning_buckets
                .max(min_warning_buckets(history.capacity())),
            history,
            warning_buckets: HashMap::new(),
            config,
        }
    }

    /// Classify a call before it runs.
    #[must_use]
    pub fn check(&self, tool_name: &str, args: &Value) -> LoopVerdict {
        if !self.config.enabled {
            return LoopVerdict::NotStuck;
        }

        let key = CallKey::new(tool_name, args);
        let verdict = self.evaluate(tool_name, &key);
        if let LoopVerdict::Stuck(detection) = &verdict {
            debug!(
                tool_name,
                pattern = %detection.pattern,
                severity = ?detection.severity,
                count = detection.count,
                "loop_detector: pattern matched"
            );
        }
        verdict
    }

    fn evaluate(&self, tool_name: &str, key: &CallKey) -> LoopVerdict {
        let config = &self.config;

        if config.no_progress_enabled {
            let streak = no_progress_streak(&self.history, key);
            let occurrences = streak.count + 1;
            if occurrences >= config.global_circuit_breaker_threshold {
                return stuck(
                    Severity::Critical,
                    LoopPattern::GlobalCircuitBreaker,
                    tool_name,
                    occurrences,
                    None,
                    streak.outcome,
                    format!(
                        "Circuit breaker triggered: '{tool_name}' produced the same outcome \
                         {occurrences} times in a row. Execution is blocked to stop a runaway loop."
                    ),
                );
            }
            if occurrences >= config.critical_threshold {
                return stuck(
                    Severity::Critical,
                    LoopPattern::NoProgress,
                    tool_name,
                    occurrences,
                    None,
                    streak.outcome,
                    format!(
                        "No progress: '{tool_name}' returned the same outcome {occurrences} times \
                         with identical arguments. Stop retrying and try a different approach."
                    ),
                );
            }
        }

        if config.ping_pong_enabled {
            let ping_pong = ping_pong_streak(&self.history, key);
            let other = ping_pong.paired_tool.clone().unwrap_or_default();
            if ping_pong.count >= config.critical_threshold {
                let count = ping_pong.count;
                return stuck(
                    Severity::Critical,
                    LoopPattern::PingPong,
                    tool_name,
                    count,
                    ping_pong.paired_tool,
                    ping_pong.outcome,
                    format!(
                        "Ping-pong loop: '{tool_name}' and '{other}' alternated {count} times \
                         without progress. Execution is blocked; change strategy."
                    ),
                );
            }
            if ping_pong.count >= config.warning_threshold {
                let count = ping_pong.count;
                return stuck(
                    Severity::Warning,
                    LoopPattern::PingPong,
                    tool_name,
                    count,
                    ping_pong.paired_tool,
                    ping_pong.outcome,
                    format!(
                        "Ping-pong warning: '{tool_name}' and '{other}' alternated {count} times \
                         without progress. Consider a different approach."
                    ),
                );
            }
        }

        if config.generic_repeat_enabled {
            let occurrences = repeat_count(&self.history, key) + 1;
            if occurrences >= config.warning_threshold {
                return stuck(
                    Severity::Warning,
                    LoopPattern::GenericRepeat,
                    tool_name,
                    occurrences,
                    None,
                    None,
                    format!(
                        "Repeat warning: '{tool_name}' called {occurrences} times with identical \
                         arguments. If this is not making progress, try something else."
                    ),
                );
            }
        }

        LoopVerdict::NotStuck
    }

    /// Record a call and its outcome.
    pub fn record(&mut self, tool_name: &str, args: &Value, outcome: &ToolOutcome) {
        if !self.config.enabled {
            return;
        }
        let key = CallKey::new(tool_name, args);
        self.push(key, tool_name, OutcomeKey::from_outcome(outcome));
    }

    /// Record a call that was refused after a critical verdict.
    ///
    /// The entry repeats the stalled outcome so further attempts keep
    /// escalating toward the circuit breaker.
    pub fn record_blocked(&mut self, tool_name: &str, args: &Value, detection: &LoopDetection) {
        if !self.config.enabled {
            return;
        }
        let key = CallKey::new(tool_name, args);
        self.push(key, tool_name, detection.repeated_outcome.clone());
    }

    fn push(&mut self, key: CallKey, tool_name: &str, outcome: Option<OutcomeKey>) {
        debug!(
            tool_name,
            pending = outcome.is_none(),
            history_len = self.history.len(),
            "loop_detector: recording call"
        );
        self.history.push(HistoryEntry::new(key, tool_name, outcome));
    }

    /// Whether a repeat warning for this call should be surfaced now.
    ///
    /// Surfaces once per `warning_threshold` additional occurrences.
    pub fn should_warn(&mut self, tool_name: &str, args: &Value) -> bool {
        let key = CallKey::new(tool_name, args);
        let count = repeat_count(&self.history, &key) + 1;
        self.advance_bucket(LoopPattern::GenericRepeat, key, count)
    }

    /// Whether a warning detection should be surfaced, deduplicated per pattern.
    ///
    /// Critical detections are always surfaced and never take a bucket.
    pub fn should_surface(
        &mut self,
        tool_name: &str,
        args: &Value,
        detection: &LoopDetection,
    ) -> bool {
        if detection.is_critical() {
            return true;
        }
        let key = CallKey::new(tool_name, args);
        self.advance_bucket(detection.pattern, key, detection.count)
    }

    fn advance_bucket(&mut self, pattern: LoopPattern, key: CallKey, count: usize) -> bool {
        let bucket = count / self.config.warning_threshold.max(1);
        let slot = (pattern, key);
        let last = self.warning_buckets.get(&slot).copied().unwrap_or(0);
        if bucket <= last {
            return false;
        }

        if !self.warning_buckets.contains_key(&slot)
            && self.warning_buckets.len() >= self.warning_bucket_cap
        {
            self.prune_warning_buckets();
        }
        self.warning_buckets.insert(slot, bucket);
        true
    }

    /// Drop buckets for keys that left the window.
    ///
    /// The cap is at least two warning patterns per window slot plus one,
    /// so this always frees room without touching keys still in the window.
    fn prune_warning_buckets(&mut self) {
        let before = self.warning_buckets.len();
        let history = &self.history;
        self.warning_buckets
            .retain(|(_, key), _| history.contains_key(key));
        debug!(
            before,
            after = self.warning_buckets.len(),
            "loop_detector: pruned warning buckets"
        );
    }

    /// Clear history and warning state for a new session.
    pub fn reset(&mut self) {
        info!(
            history_len = self.history.len(),
            warning_buckets = self.warning_buckets.len(),
            "loop_detector: reset"
        );
        self.history.clear();
        self.warning_buckets.clear();
    }

    /// Recorded calls in the current window.
    #[must_use]
    pub fn history(&self) -> &CallHistory {
        &self.history
    }

    /// Raw no-progress streak for a call, excluding the pending call.
    #[must_use]
    pub fn no_progress_streak(&self, tool_name: &str, args: &Value) -> usize {
        no_progress_streak(&self.history, &CallKey::new(tool_name, args)).count
    }

    /// Raw repeat count for a call, excluding the pending call.
    #[must_use]
    pub fn repeat_count(&self, tool_name: &str, args: &Value) -> usize {
        repeat_count(&self.history, &CallKey::new(tool_name, args))
    }

    /// Ping-pong count for a call, including the pending call.
    #[must_use]
    pub fn ping_pong_count(&self, tool_name: &str, args: &Value) -> usize {
        ping_pong_streak(&self.history, &CallKey::new(tool_name, args)).count
    }

    /// Whether detection is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Snapshot of the current window.
    #[must_use]
    pub fn stats(&self) -> LoopDetectionStats {
        let mut counts: HashMap<&CallKey, (usize, &str)> = HashMap::new();
        for entry in self.history.iter() {
            counts
                .entry(entry.key())
                .or_insert((0, entry.tool_name()))
                .0 += 1;
        }

        let most_frequent = counts
            .values()
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .copied();

        LoopDetectionStats {
            total_calls: self.history.len(),
            unique_calls: counts.len(),
            most_frequent_tool: most_frequent.map(|(_, tool)| tool.to_string()),
            most_frequent_count: most_frequent.map_or(0, |(count, _)| count),
        }
    }
}

/// Smallest warning table that holds every warning pattern for a full window.
pub(crate) fn min_warning_buckets(history_size: usize) -> usize {
    2 * history_size.max(1) + 1
}

fn stuck(
    severity: Severity,
    pattern: LoopPattern,
    tool_name: &str,
    count: usize,
    paired_tool: Option<String>,
    repeated_outcome: Option<OutcomeKey>,
    message: String,
) -> LoopVerdict {
    LoopVerdict::Stuck(LoopDetection {
        severity,
        pattern,
        tool_name: tool_name.to_string(),
        count,
        paired_tool,
        repeated_outcome,
        message,
    })
}
