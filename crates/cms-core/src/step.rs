//! Guarded step scopes.
//!
//! A [`Step`] logs `"<event>..."` when it opens and `"<event>."` with its
//! elapsed time and context when it is dropped, on every exit path. Steps
//! opened while another is alive nest under it; each carries the ids of its
//! ancestors and itself as its path, e.g. `[1, 4, 5]`.

use std::cell::RefCell;
use std::fmt::{self, Display};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::span::EnteredSpan;
use tracing::{info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Completed,
    Failed,
}

impl StepOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A finished step, kept by a recording [`EventLog`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub event: String,
    pub message: String,
    pub path: Vec<u32>,
    pub elapsed: Duration,
    pub context: Vec<(String, String)>,
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct LogState {
    next_id: u32,
    open: Vec<u32>,
    records: Option<Vec<StepRecord>>,
}

/// Source of step ids and nesting for one thread of control.
#[derive(Debug, Default)]
pub struct EventLog {
    state: RefCell<LogState>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// An event log that also keeps every finished step.
    pub fn recording() -> Self {
        Self {
            state: RefCell::new(LogState {
                records: Some(Vec::new()),
                ..LogState::default()
            }),
        }
    }

    /// Opens a step nested under every step still open.
    pub fn step(&self, event: impl Into<String>, context: &[(&str, String)]) -> Step<'_> {
        let event = event.into();
        let path = {
            let mut state = self.state.borrow_mut();
            state.next_id += 1;
            let id = state.next_id;
            state.open.push(id);
            state.open.clone()
        };
        let span = info_span!("step", path = ?path).entered();
        info!(path = ?path, "{event}...");
        Step {
            log: self,
            event,
            message_parts: Vec::new(),
            path,
            started: Instant::now(),
            context: context
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            finished: false,
            _span: span,
        }
    }

    /// Steps finished so far, oldest first; empty unless recording.
    pub fn records(&self) -> Vec<StepRecord> {
        self.state.borrow().records.clone().unwrap_or_default()
    }

    fn close(&self, record: StepRecord) {
        let mut state = self.state.borrow_mut();
        if let Some(id) = record.path.last()
            && let Some(pos) = state.open.iter().rposition(|open| open == id)
        {
            state.open.remove(pos);
        }
        if let Some(records) = state.records.as_mut() {
            records.push(record);
        }
    }
}

/// An open step; see the module docs.
pub struct Step<'a> {
    log: &'a EventLog,
    event: String,
    message_parts: Vec<String>,
    path: Vec<u32>,
    started: Instant,
    context: Vec<(String, String)>,
    finished: bool,
    _span: EnteredSpan,
}

impl Step<'_> {
    /// Adds a key/value pair reported when the step closes.
    pub fn record(&mut self, key: &str, value: impl Display) {
        let value = value.to_string();
        match self.context.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.context.push((key.to_string(), value)),
        }
    }

    /// Appends text to the closing message.
    pub fn append_message(&mut self, part: impl Into<String>) {
        self.message_parts.push(part.into());
    }

    /// The event followed by every appended part.
    pub fn message(&self) -> String {
        let mut message = self.event.clone();
        for part in &self.message_parts {
            message.push_str(part);
        }
        message
    }

    pub fn path(&self) -> &[u32] {
        &self.path
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Marks the step successful and closes it.
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for Step<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let outcome = if self.finished {
            StepOutcome::Completed
        } else {
            StepOutcome::Failed
        };
        let message = self.message();
        let context = ContextDisplay(&self.context);
        match outcome {
            StepOutcome::Completed => info!(
                path = ?self.path,
                elapsed_ms = elapsed.as_millis() as u64,
                context = %context,
                "{message}."
            ),
            StepOutcome::Failed => warn!(
                path = ?self.path,
                elapsed_ms = elapsed.as_millis() as u64,
                context = %context,
                outcome = outcome.as_str(),
                "{message}."
            ),
        }
        self.log.close(StepRecord {
            event: self.event.clone(),
            message,
            path: self.path.clone(),
            elapsed,
            context: std::mem::take(&mut self.context),
            outcome,
        });
    }
}

struct ContextDisplay<'a>(&'a [(String, String)]);

impl Display for ContextDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_paths() {
        let log = EventLog::recording();
        {
            let outer = log.step("upload", &[]);
            assert_eq!(outer.path(), [1]);
            {
                let inner = log.step("chunk", &[]);
                assert_eq!(inner.path(), [1, 2]);
                inner.finish();
            }
            let sibling = log.step("chunk", &[]);
            assert_eq!(sibling.path(), [1, 3]);
            sibling.finish();
            outer.finish();
        }
        let after = log.step("next", &[]);
        assert_eq!(after.path(), [4]);
        after.finish();

        let paths: Vec<Vec<u32>> = log.records().into_iter().map(|r| r.path).collect();
        let expected: Vec<Vec<u32>> = vec![vec![1, 2], vec![1, 3], vec![1], vec![4]];
        assert_eq!(paths, expected);
    }

    #[test]
    fn test_dropped_step_is_failed() {
        let log = EventLog::recording();
        let result: Result<(), &str> = (|| {
            let _step = log.step("select", &[("upload_id", "3".to_string())]);
            Err("boom")
        })();
        assert!(result.is_err());
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, StepOutcome::Failed);
        assert_eq!(records[0].context_value("upload_id"), Some("3"));
    }

    #[test]
    fn test_message_and_context() {
        let log = EventLog::recording();
        let mut step = log.step("UP#3: select from main.claims", &[]);
        step.append_message(" + 2 rows = 2");
        step.record("rows_in", 2);
        step.record("rows_in", 3);
        step.finish();

        let record = &log.records()[0];
        assert_eq!(record.message, "UP#3: select from main.claims + 2 rows = 2");
        assert_eq!(record.context, vec![("rows_in".to_string(), "3".to_string())]);
        assert_eq!(record.outcome, StepOutcome::Completed);
    }

    #[test]
    fn test_plain_log_keeps_no_records() {
        let log = EventLog::new();
        log.step("x", &[]).finish();
        assert!(log.records().is_empty());
    }
}
