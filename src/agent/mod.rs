//! Agent tool layer
//!
//! This module provides:
//! - The `AgentTool` trait every executable tool implements
//! - A registry that routes calls by tool name
//! - Loop detection that guards every tool execution

/// Loop detection subsystem
pub mod loop_detection;
/// Tool trait and definitions
pub mod provider;
/// Registry for managing available tools
pub mod registry;

pub use loop_detection::{LoopDetector, LoopGuard};
pub use provider::{AgentTool, ToolDefinition};
pub use registry::ToolRegistry;
