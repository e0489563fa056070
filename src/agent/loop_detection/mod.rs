//! Loop detection for agent tool calls.

mod config;
mod detector;
mod guard;
mod history;
mod keys;
mod tool_detector;
mod types;

pub use config::LoopDetectionConfig;
pub use detector::LoopDetector;
pub use guard::{GuardedTool, LoopGuard};
pub use history::{CallHistory, HistoryEntry};
pub use keys::{canonical_json, CallKey, OutcomeKey};
pub use tool_detector::{
    no_progress_streak, ping_pong_streak, repeat_count, NoProgressStreak, PingPongStreak,
};
pub use types::{
    Classification, LoopDetectedEvent, LoopDetection, LoopDetectionError, LoopDetectionStats,
    LoopPattern, LoopVerdict, Severity, ToolOutcome,
};
