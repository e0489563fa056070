//! Tool Registry - manages all agent tools
//!
//! Routes tool calls by name. When a loop guard is attached every tool is
//! wrapped on registration, so no tool can bypass loop detection.

use super::loop_detection::LoopGuard;
use super::provider::{AgentTool, ToolDefinition};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry that manages agent tools
pub struct ToolRegistry {
    tools: Vec<Arc<dyn AgentTool>>,
    guard: Option<LoopGuard>,
}

impl ToolRegistry {
    /// Create a new empty registry without loop detection
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tools: Vec::new(),
            guard: None,
        }
    }

    /// Create a registry whose tools are all loop-guarded
    #[must_use]
    pub fn with_guard(guard: LoopGuard) -> Self {
        Self {
            tools: Vec::new(),
            guard: Some(guard),
        }
    }

    /// Register a new tool
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        let name = tool.definition().name;
        let tool = match &self.guard {
            Some(guard) => guard.wrap(tool),
            None => tool,
        };
        info!(tool = %name, guarded = self.guard.is_some(), "Registered tool");
        self.tools.push(tool);
    }

    /// Get all tool definitions
    #[must_use]
    pub fn all_tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Find a tool by name and execute it
    ///
    /// # Errors
    ///
    /// Returns an error if no tool has this name, if loop detection blocks
    /// the call, or if execution fails.
    pub async fn execute(
        &self,
        tool_name: &str,
        call_id: &str,
        arguments: Value,
    ) -> Result<Value> {
        debug!(tool = tool_name, call_id, "Looking for tool");

        for tool in &self.tools {
            if tool.definition().name == tool_name {
                return tool.execute(call_id, arguments).await;
            }
        }

        warn!(tool = tool_name, "No tool found");
        Err(anyhow!("Unknown tool: {tool_name}"))
    }

    /// Check if a tool with this name is registered
    #[must_use]
    pub fn can_handle(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t.definition().name == tool_name)
    }

    /// Loop guard shared by the registered tools
    #[must_use]
    pub fn guard(&self) -> Option<&LoopGuard> {
        self.guard.as_ref()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
