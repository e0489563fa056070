//! Tool trait for agent tools
//!
//! Every tool the agent can call implements `AgentTool`. Decorators such as
//! the loop guard wrap one `AgentTool` in another with the same definition.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition exposed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool
    pub name: String,
    /// Description of what the tool does
    pub description: String,
    /// JSON schema for tool parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a definition with an empty object schema.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }
}

/// Unified interface for executable tools
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Definition (name, description, parameter schema) of this tool
    fn definition(&self) -> ToolDefinition;

    /// Tool name, used for routing and logging
    fn name(&self) -> String {
        self.definition().name
    }

    /// Execute the tool and return its structured result
    async fn execute(&self, call_id: &str, arguments: Value) -> Result<Value>;
}
