use async_trait::async_trait;
use oxide_loop_guard::agent::loop_detection::Classification;
use oxide_loop_guard::{
    AgentTool, LoopDetectionConfig, LoopDetectionError, LoopDetector, LoopGuard, LoopPattern,
    LoopVerdict, Severity, ToolDefinition, ToolOutcome, ToolRegistry,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn detector() -> LoopDetector {
    LoopDetector::new(Arc::new(LoopDetectionConfig::default()))
}

#[test]
fn repeated_enoent_read_warns_then_blocks() {
    let mut detector = detector();
    let args = json!({"path": "a.txt"});
    let enoent = ToolOutcome::Failure("ENOENT".to_string());

    for call in 1..=20 {
        let verdict = detector.check("read", &args);
        match call {
            1..=9 => assert_eq!(verdict, LoopVerdict::NotStuck, "call {call}"),
            10..=19 => assert_eq!(verdict.severity(), Some(Severity::Warning), "call {call}"),
            _ => {
                let detection = verdict.detection().cloned();
                assert_eq!(detection.as_ref().map(|d| d.severity), Some(Severity::Critical));
                assert_eq!(detection.as_ref().map(|d| d.pattern), Some(LoopPattern::NoProgress));
                let message = detection.map(|d| d.message).unwrap_or_default();
                assert!(message.contains("20 times"), "unexpected message: {message}");
            }
        }
        detector.record("read", &args, &enoent);
    }
}

#[test]
fn window_keeps_the_most_recent_thirty_calls() {
    let mut detector = detector();
    for n in 0..45 {
        detector.record("fetch", &json!({ "page": n }), &ToolOutcome::Success(json!(n)));
    }

    let history = detector.history();
    assert_eq!(history.len(), 30);
    assert_eq!(detector.repeat_count("fetch", &json!({"page": 14})), 0);
    assert_eq!(detector.repeat_count("fetch", &json!({"page": 15})), 1);
    assert_eq!(detector.repeat_count("fetch", &json!({"page": 44})), 1);
}

#[test]
fn argument_construction_order_does_not_matter() {
    let mut detector = detector();
    let mut first = serde_json::Map::new();
    first.insert("path".to_string(), json!("a.txt"));
    first.insert("encoding".to_string(), json!("utf-8"));
    let mut second = serde_json::Map::new();
    second.insert("encoding".to_string(), json!("utf-8"));
    second.insert("path".to_string(), json!("a.txt"));

    for _ in 0..9 {
        detector.record("read", &Value::Object(first.clone()), &ToolOutcome::Pending);
    }
    assert_eq!(
        detector.check("read", &Value::Object(second)).classification(),
        Classification::Degraded
    );
}

#[test]
fn alternating_calls_warn_then_block_until_progress() {
    let mut detector = detector();
    let a = json!({"cmd": "build"});
    let b = json!({"cmd": "test"});

    // b a b a ... b: nine alternating entries, so the next `a` is the tenth.
    detector.record("shell", &b, &ToolOutcome::Failure("fail".to_string()));
    for _ in 0..4 {
        detector.record("shell", &a, &ToolOutcome::Failure("err".to_string()));
        detector.record("shell", &b, &ToolOutcome::Failure("fail".to_string()));
    }
    let verdict = detector.check("shell", &a);
    assert_eq!(verdict.detection().map(|d| d.pattern), Some(LoopPattern::PingPong));
    assert_eq!(verdict.classification(), Classification::Degraded);

    for _ in 0..5 {
        detector.record("shell", &a, &ToolOutcome::Failure("err".to_string()));
        detector.record("shell", &b, &ToolOutcome::Failure("fail".to_string()));
    }
    let verdict = detector.check("shell", &a);
    assert_eq!(verdict.detection().map(|d| d.count), Some(20));
    assert_eq!(verdict.classification(), Classification::Blocked);

    detector.record("shell", &a, &ToolOutcome::Failure("new error".to_string()));
    detector.record("shell", &b, &ToolOutcome::Failure("fail".to_string()));
    assert_eq!(detector.ping_pong_count("shell", &a), 0);
}

#[test]
fn reset_forgets_previous_session() {
    let mut detector = detector();
    let args = json!({"q": "same"});
    for _ in 0..29 {
        detector.record("search", &args, &ToolOutcome::Success(json!("nothing")));
    }
    assert_eq!(
        detector.check("search", &args).detection().map(|d| d.pattern),
        Some(LoopPattern::GlobalCircuitBreaker)
    );

    detector.reset();
    assert_eq!(detector.check("search", &args), LoopVerdict::NotStuck);
    assert_eq!(detector.stats().total_calls, 0);
}

struct FlakyFetch {
    calls: AtomicUsize,
}

#[async_trait]
impl AgentTool for FlakyFetch {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("fetch", "Fetch a URL")
    }

    async fn execute(&self, _call_id: &str, _arguments: Value) -> anyhow::Result<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n % 2 == 0 {
            Ok(json!({"content": [{"type": "text", "text": "same page"}], "details": {"n": n}}))
        } else {
            Err(anyhow::anyhow!("timeout"))
        }
    }
}

#[tokio::test]
async fn guarded_tool_propagates_outcomes_unchanged() {
    let guard = LoopGuard::new(Arc::new(LoopDetectionConfig::default()));
    let tool = guard.wrap(Arc::new(FlakyFetch {
        calls: AtomicUsize::new(0),
    }));
    let args = json!({"url": "https://example.com"});

    let ok = tool.execute("c0", args.clone()).await.ok();
    assert_eq!(ok.and_then(|v| v["details"]["n"].as_u64()), Some(0));
    let err = tool.execute("c1", args.clone()).await.err();
    assert_eq!(err.map(|e| e.to_string()), Some("timeout".to_string()));
    assert_eq!(tool.definition().name, "fetch");
}

#[tokio::test]
async fn parallel_calls_are_all_recorded() {
    let guard = LoopGuard::new(Arc::new(LoopDetectionConfig::default()));
    let mut registry = ToolRegistry::with_guard(guard.clone());
    registry.register(Arc::new(FlakyFetch {
        calls: AtomicUsize::new(0),
    }));
    let registry = Arc::new(registry);

    let mut handles = Vec::new();
    for n in 0..8 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            let _ = registry
                .execute("fetch", &format!("c{n}"), json!({ "url": n }))
                .await;
        }));
    }
    for handle in handles {
        assert!(handle.await.is_ok());
    }

    let stats = guard.stats().await;
    assert_eq!(stats.total_calls, 8);
    assert_eq!(stats.unique_calls, 8);
}

#[tokio::test]
async fn blocked_calls_surface_as_loop_errors() {
    let config = LoopDetectionConfig {
        warning_threshold: 2,
        critical_threshold: 3,
        global_circuit_breaker_threshold: 4,
        ..LoopDetectionConfig::default()
    };
    let guard = LoopGuard::new(Arc::new(config));
    let counter = Arc::new(FlakyFetch {
        calls: AtomicUsize::new(0),
    });
    let tool = guard.wrap(counter.clone());
    let args = json!({"url": "https://example.com/missing"});

    // Alternating success/failure never forms a no-progress streak.
    for n in 0..4 {
        let _ = tool.execute(&format!("c{n}"), args.clone()).await;
    }
    assert_eq!(counter.calls.load(Ordering::SeqCst), 4);

    guard.reset().await;
    guard
        .record("fetch", &args, &ToolOutcome::Failure("timeout".to_string()))
        .await;
    guard
        .record("fetch", &args, &ToolOutcome::Failure("timeout".to_string()))
        .await;

    let Err(err) = tool.execute("blocked", args.clone()).await else {
        panic!("expected a blocked call");
    };
    assert!(err.downcast_ref::<LoopDetectionError>().is_some());
    assert_eq!(counter.calls.load(Ordering::SeqCst), 4);

    let Err(err) = tool.execute("breaker", args).await else {
        panic!("expected the circuit breaker");
    };
    let pattern = err
        .downcast_ref::<LoopDetectionError>()
        .map(|e| e.detection().pattern);
    assert_eq!(pattern, Some(LoopPattern::GlobalCircuitBreaker));
}
