//! Work records and their results.
//!
//! A work item names a behavior, carries an opaque input, and records what
//! happened when the behavior ran. Parent/child linkage is by id only; the
//! parent never owns its children.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Work
// ---------------------------------------------------------------------------

/// One schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    /// Assigned by the state store on first save. Never changes afterwards.
    pub id: Option<WorkId>,

    /// Href of the behavior that executes this work (e.g. `"calculator"`).
    pub behavior_ref: String,

    /// Arbitrary input for the behavior. The engine doesn't interpret it.
    pub input: serde_json::Value,

    /// Outcome of the primary run.
    #[serde(default)]
    pub result: WorkResult,

    /// Outcome of the finalizer, once one has started.
    #[serde(default)]
    pub finalizer_result: Option<WorkResult>,

    /// The work that spawned this one.
    pub parent_id: Option<WorkId>,

    /// Children spawned by the primary run, in spawn order.
    #[serde(default)]
    pub children_ids: Vec<WorkId>,

    /// Children that have reported completion.
    #[serde(default)]
    pub finished_children_ids: Vec<WorkId>,

    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl Work {
    pub fn new(behavior_ref: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: None,
            behavior_ref: behavior_ref.into(),
            input,
            result: WorkResult::default(),
            finalizer_result: None,
            parent_id: None,
            children_ids: Vec::new(),
            finished_children_ids: Vec::new(),
            created: None,
            updated: None,
        }
    }

    /// Id, or an error if the work was never saved.
    pub fn require_id(&self) -> Result<WorkId> {
        self.id
            .ok_or_else(|| Error::Other(format!("work {} has not been saved", self.behavior_ref)))
    }

    pub fn has_children(&self) -> bool {
        !self.children_ids.is_empty()
    }

    /// True once every spawned child has reported completion.
    pub fn children_done(&self) -> bool {
        self.has_children() && self.finished_children_ids.len() == self.children_ids.len()
    }

    /// `behavior:id` label used in log lines.
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => format!("{}:{id}", self.behavior_ref),
            None => format!("{}:unsaved", self.behavior_ref),
        }
    }
}

/// Newtype for work ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 chars of the UUID, for tables.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Status container for a run: not started, running, or ended.
///
/// Moves strictly forward. An ended result is never reopened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkResult {
    #[default]
    NotStarted,
    Running {
        started: DateTime<Utc>,
    },
    Ended {
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
        outcome: Outcome,
    },
}

/// How an ended run finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(serde_json::Value),
    /// Rendered error chain of the failure.
    Failure(String),
}

/// Value-less view of [`WorkResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    NotStarted,
    Running,
    Ended,
}

impl ResultStatus {
    pub fn can_transition_to(self, to: ResultStatus) -> bool {
        use ResultStatus::*;
        matches!((self, to), (NotStarted, Running) | (Running, Ended))
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResultStatus::NotStarted => "not_started",
            ResultStatus::Running => "running",
            ResultStatus::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

impl WorkResult {
    pub fn status(&self) -> ResultStatus {
        match self {
            WorkResult::NotStarted => ResultStatus::NotStarted,
            WorkResult::Running { .. } => ResultStatus::Running,
            WorkResult::Ended { .. } => ResultStatus::Ended,
        }
    }

    /// Record the start time.
    pub fn start(&mut self) -> Result<()> {
        self.check(ResultStatus::Running)?;
        *self = WorkResult::Running {
            started: Utc::now(),
        };
        Ok(())
    }

    /// Record the end time and outcome.
    pub fn end(&mut self, outcome: Outcome) -> Result<()> {
        match *self {
            WorkResult::Running { started } => {
                *self = WorkResult::Ended {
                    started,
                    ended: Utc::now(),
                    outcome,
                };
                Ok(())
            }
            _ => self.check(ResultStatus::Ended),
        }
    }

    fn check(&self, to: ResultStatus) -> Result<()> {
        let from = self.status();
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(Error::InvalidTransition { from, to })
        }
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            WorkResult::Ended { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    /// Success value, if the run ended successfully.
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self.outcome() {
            Some(Outcome::Success(value)) => Some(value),
            _ => None,
        }
    }

    /// Failure message, if the run ended in failure.
    pub fn error(&self) -> Option<&str> {
        match self.outcome() {
            Some(Outcome::Failure(err)) => Some(err),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.value().is_some()
    }

    /// Run duration, once ended.
    pub fn duration_ms(&self) -> Option<u64> {
        match self {
            WorkResult::Ended { started, ended, .. } => {
                Some((*ended - *started).num_milliseconds().max(0) as u64)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// Address handed to a router. No payload: the receiver loads the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub work_id: WorkId,
    #[serde(default)]
    pub is_finalizer: bool,
}

impl Route {
    pub fn work(work_id: WorkId) -> Self {
        Self {
            work_id,
            is_finalizer: false,
        }
    }

    pub fn finalizer(work_id: WorkId) -> Self {
        Self {
            work_id,
            is_finalizer: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// What a behavior's primary run hands back.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
    pub result: serde_json::Value,
    /// Child work to spawn. Only the behavior ref and input matter; ids and
    /// linkage are filled in by the engine.
    pub child_work: Option<Vec<Work>>,
}

impl Response {
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            result,
            child_work: None,
        }
    }

    pub fn with_children(mut self, children: Vec<Work>) -> Self {
        self.child_work = Some(children);
        self
    }
}

// ---------------------------------------------------------------------------
// Log Entry
// ---------------------------------------------------------------------------

/// A log line, optionally scoped to a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub work_id: Option<WorkId>,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_moves_forward_only() {
        let mut result = WorkResult::default();
        assert_eq!(result.status(), ResultStatus::NotStarted);

        result.start().unwrap();
        assert_eq!(result.status(), ResultStatus::Running);
        assert!(result.start().is_err());

        result.end(Outcome::Success(json!(5))).unwrap();
        assert_eq!(result.value(), Some(&json!(5)));
        assert!(result.duration_ms().is_some());

        match result.start() {
            Err(Error::InvalidTransition { from, to }) => {
                assert_eq!(from, ResultStatus::Ended);
                assert_eq!(to, ResultStatus::Running);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn cannot_end_without_starting() {
        let mut result = WorkResult::default();
        assert!(result.end(Outcome::Failure("boom".into())).is_err());
        assert_eq!(result, WorkResult::NotStarted);
    }

    #[test]
    fn failure_exposes_error_not_value() {
        let mut result = WorkResult::default();
        result.start().unwrap();
        result.end(Outcome::Failure("Inputs must be numbers".into())).unwrap();
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Inputs must be numbers"));
        assert_eq!(result.value(), None);
    }

    #[test]
    fn children_done_requires_children() {
        let mut work = Work::new("calculator", json!({}));
        assert!(!work.children_done());

        let child = WorkId::new();
        work.children_ids.push(child);
        assert!(!work.children_done());
        work.finished_children_ids.push(child);
        assert!(work.children_done());
    }

    #[test]
    fn work_serializes_through_json() {
        let mut work = Work::new("calculator", json!({"x": 2, "y": 3}));
        work.id = Some(WorkId::new());
        work.result.start().unwrap();

        let text = serde_json::to_string(&work).unwrap();
        let back: Work = serde_json::from_str(&text).unwrap();
        assert_eq!(back, work);
    }
}
