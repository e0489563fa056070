//! Testing helpers and mock utilities.
//!
//! Provides convenient constructors for mocked tools.

use crate::agent::provider::{MockAgentTool, ToolDefinition};
use serde_json::Value;
use std::ops::RangeInclusive;

/// Create a mock tool that succeeds with `response`.
///
/// `times` bounds how often `execute` may be called.
#[must_use]
pub fn mock_tool_ok(
    name: &'static str,
    response: Value,
    times: RangeInclusive<usize>,
) -> MockAgentTool {
    let mut mock = MockAgentTool::new();
    mock.expect_definition()
        .returning(move || ToolDefinition::new(name, "Mock tool"));
    mock.expect_execute()
        .times(times)
        .returning(move |_, _| Ok(response.clone()));
    mock
}

/// Create a mock tool that fails with `message` exactly `times` times.
#[must_use]
pub fn mock_tool_failing(name: &'static str, message: &'static str, times: usize) -> MockAgentTool {
    let mut mock = MockAgentTool::new();
    mock.expect_definition()
        .returning(move || ToolDefinition::new(name, "Mock tool"));
    mock.expect_execute()
        .times(times)
        .returning(move |_, _| Err(anyhow::anyhow!(message)));
    mock
}
