//! Work loggers.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::WorkLogger;
use crate::error::Result;
use crate::model::work::{LogEntry, LogLevel, Work, WorkId};

/// Writes through `tracing`, tagging lines with the work's id and behavior.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLogger;

#[async_trait]
impl WorkLogger for ConsoleLogger {
    fn log(&self, message: &str) {
        info!("{message}");
    }

    fn log_outside_work(&self, work: &Work, message: &str, error: Option<&str>) {
        let id = work.id.map(|id| id.to_string()).unwrap_or_default();
        match error {
            Some(error) => warn!(
                "work.id" = %id,
                "work.behavior" = %work.behavior_ref,
                error,
                "{message}"
            ),
            None => info!(
                "work.id" = %id,
                "work.behavior" = %work.behavior_ref,
                "{message}"
            ),
        }
    }

    async fn work_ended(&self, work: &Work) -> Result<()> {
        info!(
            "work.id" = %work.id.map(|id| id.to_string()).unwrap_or_default(),
            "work.behavior" = %work.behavior_ref,
            "work.status" = %work.result.status(),
            "work ended"
        );
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every line in memory. Useful for tests and the CLI summary.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
    ended: Mutex<Vec<WorkId>>,
    flushes: Mutex<usize>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, work_id: Option<WorkId>, level: LogLevel, message: String) {
        let entry = LogEntry {
            work_id,
            timestamp: Utc::now(),
            level,
            message,
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Lines logged against one work item.
    pub fn entries_for(&self, work_id: WorkId) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.work_id == Some(work_id))
            .collect()
    }

    /// Works reported as ended, in order.
    pub fn ended(&self) -> Vec<WorkId> {
        self.ended.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn flush_count(&self) -> usize {
        *self.flushes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WorkLogger for MemoryLogger {
    fn log(&self, message: &str) {
        self.push(None, LogLevel::Info, message.to_string());
    }

    fn log_outside_work(&self, work: &Work, message: &str, error: Option<&str>) {
        match error {
            Some(error) => self.push(work.id, LogLevel::Error, format!("{message}: {error}")),
            None => self.push(work.id, LogLevel::Info, message.to_string()),
        }
    }

    async fn work_ended(&self, work: &Work) -> Result<()> {
        if let Some(id) = work.id {
            self.ended.lock().unwrap_or_else(|e| e.into_inner()).push(id);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        *self.flushes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
