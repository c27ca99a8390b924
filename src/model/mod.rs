//! Core data model.

pub mod work;

pub use work::{LogEntry, LogLevel, Outcome, ResultStatus, Response, Route, Work, WorkId, WorkResult};
