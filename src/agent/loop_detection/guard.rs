//! Loop guard: wraps tools so every execution passes through the detector.

use super::config::LoopDetectionConfig;
use super::detector::LoopDetector;
use super::types::{
    LoopDetectedEvent, LoopDetection, LoopDetectionError, LoopDetectionStats, LoopVerdict,
    ToolOutcome,
};
use crate::agent::provider::{AgentTool, ToolDefinition};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Shared handle to a session's loop detector.
///
/// Cloning is cheap; all clones observe the same history. Appends happen
/// under one lock, which is never held while a tool runs.
#[derive(Clone)]
pub struct LoopGuard {
    detector: Arc<Mutex<LoopDetector>>,
    events_tx: Option<mpsc::Sender<LoopDetectedEvent>>,
}

impl LoopGuard {
    /// Create a guard with its own detector.
    #[must_use]
    pub fn new(config: Arc<LoopDetectionConfig>) -> Self {
        Self {
            detector: Arc::new(Mutex::new(LoopDetector::new(config))),
            events_tx: None,
        }
    }

    /// Send detection events to a channel in addition to the log.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::Sender<LoopDetectedEvent>) -> Self {
        self.events_tx = Some(tx);
        self
    }

    /// Wrap a tool so its executions are loop-checked.
    #[must_use]
    pub fn wrap(&self, tool: Arc<dyn AgentTool>) -> Arc<dyn AgentTool> {
        Arc::new(GuardedTool {
            inner: tool,
            guard: self.clone(),
        })
    }

    /// Classify a call before it runs.
    pub async fn check(&self, tool_name: &str, args: &Value) -> LoopVerdict {
        self.detector.lock().await.check(tool_name, args)
    }

    /// Record a finished call.
    pub async fn record(&self, tool_name: &str, args: &Value, outcome: &ToolOutcome) {
        self.detector.lock().await.record(tool_name, args, outcome);
    }

    /// Clear all loop state for a new session.
    pub async fn reset(&self) {
        self.detector.lock().await.reset();
    }

    /// Snapshot of the detector window.
    pub async fn stats(&self) -> LoopDetectionStats {
        self.detector.lock().await.stats()
    }

    async fn block(
        &self,
        tool_name: &str,
        call_id: &str,
        args: &Value,
        detection: LoopDetection,
    ) -> anyhow::Error {
        self.detector
            .lock()
            .await
            .record_blocked(tool_name, args, &detection);

        warn!(
            tool_name,
            call_id,
            pattern = %detection.pattern,
            count = detection.count,
            "loop_guard: blocking tool call"
        );
        self.emit(&detection, call_id).await;

        LoopDetectionError::Blocked(detection).into()
    }

    async fn surface_warning(
        &self,
        tool_name: &str,
        call_id: &str,
        args: &Value,
        detection: &LoopDetection,
    ) {
        let surface = self
            .detector
            .lock()
            .await
            .should_surface(tool_name, args, detection);
        if !surface {
            debug!(
                tool_name,
                pattern = %detection.pattern,
                count = detection.count,
                "loop_guard: warning already surfaced for this bucket"
            );
            return;
        }

        warn!(
            tool_name,
            call_id,
            pattern = %detection.pattern,
            count = detection.count,
            message = %detection.message,
            "loop_guard: possible loop"
        );
        self.emit(detection, call_id).await;
    }

    async fn emit(&self, detection: &LoopDetection, call_id: &str) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(LoopDetectedEvent::new(detection, call_id)).await;
        }
    }
}

/// Tool decorated with loop detection.
pub struct GuardedTool {
    inner: Arc<dyn AgentTool>,
    guard: LoopGuard,
}

#[async_trait]
impl AgentTool for GuardedTool {
    fn definition(&self) -> ToolDefinition {
        self.inner.definition()
    }

    async fn execute(&self, call_id: &str, arguments: Value) -> Result<Value> {
        let tool_name = self.inner.definition().name;

        match self.guard.check(&tool_name, &arguments).await {
            LoopVerdict::Stuck(detection) if detection.is_critical() => {
                return Err(self
                    .guard
                    .block(&tool_name, call_id, &arguments, detection)
                    .await);
            }
            LoopVerdict::Stuck(detection) => {
                self.guard
                    .surface_warning(&tool_name, call_id, &arguments, &detection)
                    .await;
            }
            LoopVerdict::NotStuck => {}
        }

        let result = self.inner.execute(call_id, arguments.clone()).await;
        self.guard
            .record(&tool_name, &arguments, &ToolOutcome::from_result(&result))
            .await;
        result
    }
}
