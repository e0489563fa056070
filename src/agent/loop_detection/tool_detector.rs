//! Tool call pattern scans over the call history.
//!
//! Every scan reads the window from the most recent entry backward and
//! reports raw history counts; the detector adds the pending call on top.

use super::history::CallHistory;
use super::keys::{CallKey, OutcomeKey};
use std::collections::HashSet;

/// Run of identical outcomes for one call key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoProgressStreak {
    /// Matching entries in the run.
    pub count: usize,
    /// Outcome shared by the run.
    pub outcome: Option<OutcomeKey>,
}

/// Alternation between the checked call and the most recent one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingPongStreak {
    /// Alternating entries plus the pending call, 0 when no stable alternation.
    pub count: usize,
    /// Tool on the other side of the alternation.
    pub paired_tool: Option<String>,
    /// Outcome the checked call keeps producing.
    pub outcome: Option<OutcomeKey>,
}

/// Length of the most recent run of identical outcomes for `key`.
///
/// Entries with other keys and pending entries are skipped without breaking
/// the run; the first differing outcome ends it.
#[must_use]
pub fn no_progress_streak(history: &CallHistory, key: &CallKey) -> NoProgressStreak {
    let mut streak = NoProgressStreak::default();

    for entry in history.iter_recent().filter(|entry| entry.key() == key) {
        let Some(outcome) = entry.outcome() else {
            continue;
        };
        match &streak.outcome {
            None => {
                streak.outcome = Some(outcome.clone());
                streak.count = 1;
            }
            Some(reference) if reference == outcome => streak.count += 1,
            Some(_) => break,
        }
    }

    streak
}

/// Strict alternation between `key` and the most recent history entry.
///
/// The scan stops at the first entry that breaks the alternation. Either
/// side producing more than one distinct outcome means the calls are making
/// progress, and the streak is reported as 0.
#[must_use]
pub fn ping_pong_streak(history: &CallHistory, key: &CallKey) -> PingPongStreak {
    let Some(latest) = history.latest() else {
        return PingPongStreak::default();
    };
    if latest.key() == key {
        return PingPongStreak::default();
    }
    let other = latest.key();

    let mut alternating = 0usize;
    let mut other_outcomes: HashSet<&OutcomeKey> = HashSet::new();
    let mut current_outcomes: HashSet<&OutcomeKey> = HashSet::new();

    for entry in history.iter_recent() {
        let (expected, outcomes) = if alternating % 2 == 0 {
            (other, &mut other_outcomes)
        } else {
            (key, &mut current_outcomes)
        };
        if entry.key() != expected {
            break;
        }
        if let Some(outcome) = entry.outcome() {
            outcomes.insert(outcome);
        }
        alternating += 1;
    }

    if other_outcomes.len() > 1 || current_outcomes.len() > 1 {
        return PingPongStreak::default();
    }

    PingPongStreak {
        count: alternating + 1,
        paired_tool: Some(latest.tool_name().to_string()),
        outcome: current_outcomes.into_iter().next().cloned(),
    }
}

/// Entries anywhere in the window with the same key.
#[must_use]
pub fn repeat_count(history: &CallHistory, key: &CallKey) -> usize {
    history.iter().filter(|entry| entry.key() == key).count()
}
