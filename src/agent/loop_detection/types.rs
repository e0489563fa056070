//! Types for loop detection.

use super::keys::OutcomeKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Patterns the detector recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPattern {
    /// Identical call with identical outcome, past the hard limit.
    GlobalCircuitBreaker,
    /// Identical call with identical outcome, retried without progress.
    NoProgress,
    /// Two calls alternating with stable outcomes.
    PingPong,
    /// Identical call repeated anywhere in the window.
    GenericRepeat,
}

impl fmt::Display for LoopPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GlobalCircuitBreaker => "global_circuit_breaker",
            Self::NoProgress => "no_progress",
            Self::PingPong => "ping_pong",
            Self::GenericRepeat => "generic_repeat",
        };
        f.write_str(name)
    }
}

/// How serious a detection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Execution may proceed; surface a diagnostic.
    Warning,
    /// Execution must not proceed.
    Critical,
}

/// What the host should do with a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No pattern matched.
    Normal,
    /// Warning: proceed, optionally report.
    Degraded,
    /// Critical: refuse the call.
    Blocked,
}

/// A matched loop pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDetection {
    /// Severity of the match.
    pub severity: Severity,
    /// Pattern that fired.
    pub pattern: LoopPattern,
    /// Tool the verdict applies to.
    pub tool_name: String,
    /// Observed occurrences, including the call being checked.
    pub count: usize,
    /// Other side of a ping-pong.
    pub paired_tool: Option<String>,
    /// Outcome the stalled call keeps producing, if known.
    pub repeated_outcome: Option<OutcomeKey>,
    /// Human-readable explanation.
    pub message: String,
}

impl LoopDetection {
    /// Whether the call must be refused.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Result of checking a candidate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopVerdict {
    /// No loop detected.
    NotStuck,
    /// A loop pattern matched.
    Stuck(LoopDetection),
}

impl LoopVerdict {
    /// Map the verdict onto the host-facing taxonomy.
    #[must_use]
    pub fn classification(&self) -> Classification {
        match self {
            Self::NotStuck => Classification::Normal,
            Self::Stuck(detection) if detection.is_critical() => Classification::Blocked,
            Self::Stuck(_) => Classification::Degraded,
        }
    }

    /// Severity, if stuck.
    #[must_use]
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Self::NotStuck => None,
            Self::Stuck(detection) => Some(detection.severity),
        }
    }

    /// The detection, if stuck.
    #[must_use]
    pub fn detection(&self) -> Option<&LoopDetection> {
        match self {
            Self::NotStuck => None,
            Self::Stuck(detection) => Some(detection),
        }
    }

    /// Whether any pattern matched.
    #[must_use]
    pub fn is_stuck(&self) -> bool {
        matches!(self, Self::Stuck(_))
    }
}

/// Observed outcome of a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Not finished yet; excluded from streaks.
    Pending,
    /// Successful result payload.
    Success(Value),
    /// Failure with its message.
    Failure(String),
}

impl ToolOutcome {
    /// Build an outcome from optional parts; the error wins when both are set.
    #[must_use]
    pub fn from_parts(result: Option<Value>, error: Option<String>) -> Self {
        match (result, error) {
            (_, Some(message)) => Self::Failure(message),
            (Some(value), None) => Self::Success(value),
            (None, None) => Self::Pending,
        }
    }

    /// Build an outcome from a tool execution result.
    #[must_use]
    pub fn from_result<E: fmt::Display>(result: &Result<Value, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value.clone()),
            Err(err) => Self::Failure(format!("{err:#}")),
        }
    }
}

/// Loop detection event metadata.
#[derive(Debug, Clone, Serialize)]
pub struct LoopDetectedEvent {
    /// Pattern that fired.
    pub pattern: LoopPattern,
    /// Severity of the detection.
    pub severity: Severity,
    /// Tool involved.
    pub tool_name: String,
    /// Observed occurrences.
    pub count: usize,
    /// Call identifier supplied by the host.
    pub call_id: String,
    /// Human-readable explanation.
    pub message: String,
    /// Event timestamp.
    pub timestamp: DateTime<Utc>,
}

impl LoopDetectedEvent {
    /// Create an event for a detection on a given call.
    #[must_use]
    pub fn new(detection: &LoopDetection, call_id: &str) -> Self {
        Self {
            pattern: detection.pattern,
            severity: detection.severity,
            tool_name: detection.tool_name.clone(),
            count: detection.count,
            call_id: call_id.to_string(),
            message: detection.message.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Snapshot of the detector window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopDetectionStats {
    /// Calls currently in the window.
    pub total_calls: usize,
    /// Distinct call keys in the window.
    pub unique_calls: usize,
    /// Tool behind the most repeated call key.
    pub most_frequent_tool: Option<String>,
    /// How often that call key appears.
    pub most_frequent_count: usize,
}

/// Errors produced by loop detection components.
#[derive(Debug, Error)]
pub enum LoopDetectionError {
    /// The call was refused because a critical loop was detected.
    #[error("{}", .0.message)]
    Blocked(LoopDetection),
}

impl LoopDetectionError {
    /// The detection behind a blocked call.
    #[must_use]
    pub fn detection(&self) -> &LoopDetection {
        match self {
            Self::Blocked(detection) => detection,
        }
    }
}
