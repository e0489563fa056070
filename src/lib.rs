#![deny(missing_docs)]
//! Oxide loop guard.
//!
//! Detects agents stuck calling the same tools over and over, and blocks
//! them before a runaway loop burns through a session.

/// Agent-side tool abstractions and loop detection.
pub mod agent;

#[cfg(test)]
pub mod testing;

pub use agent::loop_detection::{
    LoopDetectedEvent, LoopDetection, LoopDetectionConfig, LoopDetectionError, LoopDetector,
    LoopGuard, LoopPattern, LoopVerdict, Severity, ToolOutcome,
};
pub use agent::{AgentTool, ToolDefinition, ToolRegistry};
