//! Replays a JSON-lines trace of tool calls through the loop detector.
//!
//! Each line is `{"tool": "...", "args": {...}, "result": ...}` or carries an
//! `"error"` message instead of a result. Lines without either are recorded
//! as pending calls.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use oxide_loop_guard::{LoopDetectionConfig, LoopDetector, LoopVerdict, ToolOutcome};
use serde::Deserialize;
use serde_json::Value;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Deserialize)]
struct TraceRecord {
    tool: String,
    #[serde(default)]
    args: Value,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

fn main() -> Result<()> {
    let _ = dotenv();
    init_logging();

    let config = Arc::new(LoopDetectionConfig::from_env());
    info!(
        history_size = config.history_size,
        warning_threshold = config.warning_threshold,
        critical_threshold = config.critical_threshold,
        "Loop detection configured"
    );

    let input: Box<dyn BufRead> = match std::env::args().nth(1) {
        Some(path) => {
            let file = std::fs::File::open(&path)
                .with_context(|| format!("failed to open trace file {path}"))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut detector = LoopDetector::new(config);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    replay(&mut detector, input, &mut out)?;

    let stats = detector.stats();
    writeln!(out, "{}", serde_json::to_string(&stats)?)?;
    Ok(())
}

fn replay(
    detector: &mut LoopDetector,
    input: Box<dyn BufRead>,
    out: &mut impl Write,
) -> Result<()> {
    for (idx, line) in input.lines().enumerate() {
        let line = line.context("failed to read trace line")?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TraceRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(err) => {
                warn!(line = idx + 1, error = %err, "Skipping malformed trace record");
                continue;
            }
        };

        let verdict = detector.check(&record.tool, &record.args);
        match &verdict {
            LoopVerdict::NotStuck => writeln!(out, "{:>4} ok       {}", idx + 1, record.tool)?,
            LoopVerdict::Stuck(detection) => {
                let label = if detection.is_critical() { "BLOCK" } else { "warn" };
                writeln!(out, "{:>4} {label:<8} {}", idx + 1, detection.message)?;
            }
        }

        match verdict.detection() {
            Some(detection) if detection.is_critical() => {
                detector.record_blocked(&record.tool, &record.args, detection);
            }
            _ => {
                let outcome = ToolOutcome::from_parts(record.result, record.error);
                detector.record(&record.tool, &record.args, &outcome);
            }
        }
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::replay;
    use oxide_loop_guard::agent::loop_detection::OutcomeKey;
    use oxide_loop_guard::{LoopDetectionConfig, LoopDetector};
    use std::io::{BufRead, Cursor};
    use std::sync::Arc;

    fn run(trace: &str) -> (LoopDetector, Vec<String>) {
        let mut detector = LoopDetector::new(Arc::new(LoopDetectionConfig::default()));
        let input: Box<dyn BufRead> = Box::new(Cursor::new(trace.to_string()));
        let mut out = Vec::new();
        assert!(replay(&mut detector, input, &mut out).is_ok());
        let lines = String::from_utf8_lossy(&out)
            .lines()
            .map(str::to_string)
            .collect();
        (detector, lines)
    }

    #[test]
    fn replay_warns_blocks_and_skips_malformed_lines() {
        let read = r#"{"tool":"read","args":{"path":"a.txt"},"error":"ENOENT"}"#;
        let mut trace = vec![read; 19];
        trace.push("not json");
        trace.push(read);
        trace.push(read);
        trace.push(r#"{"tool":"write","args":{},"result":"ok","error":"EACCES"}"#);
        trace.push("");

        let (detector, lines) = run(&trace.join("\n"));

        assert_eq!(lines.len(), 22);
        assert!(lines[8].starts_with("   9 ok       read"), "{}", lines[8]);
        assert!(lines[9].starts_with("  10 warn"), "{}", lines[9]);
        assert!(lines[19].starts_with("  21 BLOCK"), "{}", lines[19]);
        assert!(lines[19].contains("20 times"), "{}", lines[19]);
        assert!(lines[20].starts_with("  22 BLOCK"), "{}", lines[20]);
        assert!(lines[20].contains("21 times"), "{}", lines[20]);
        assert_eq!(lines[21], "  23 ok       write");

        assert_eq!(detector.stats().total_calls, 22);
    }

    #[test]
    fn replay_records_error_when_result_is_also_present() {
        let (detector, lines) =
            run(r#"{"tool":"write","args":{"path":"b.txt"},"result":{"ok":true},"error":"EACCES"}"#);

        assert_eq!(lines, vec!["   1 ok       write".to_string()]);
        let outcome = detector.history().latest().and_then(|e| e.outcome()).cloned();
        assert_eq!(outcome, Some(OutcomeKey::from_error("EACCES")));
    }
}
