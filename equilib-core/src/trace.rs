//! Diagnostic trace records emitted by the analysis pipeline.
//!
//! The orchestrator never logs directly; it writes into an injected
//! [`TraceSink`]. [`LogSink`] forwards records to the `log` facade and is the
//! default. [`MemorySink`] keeps them in memory so tests can inspect them.

use std::fmt;
use std::sync::Mutex;

/// Severity of a trace record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TraceLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TraceLevel::Debug => "debug",
            TraceLevel::Info => "info",
            TraceLevel::Warning => "warning",
            TraceLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// One diagnostic message.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub level: TraceLevel,
    /// Pipeline stage that produced the record, e.g. `"reduction"`.
    pub stage: &'static str,
    pub message: String,
}

impl TraceRecord {
    pub fn new(level: TraceLevel, stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            stage,
            message: message.into(),
        }
    }
}

/// Destination for trace records. Shared across load-case threads.
pub trait TraceSink: Send + Sync {
    fn record(&self, record: TraceRecord);

    fn debug(&self, stage: &'static str, message: String) {
        self.record(TraceRecord::new(TraceLevel::Debug, stage, message));
    }

    fn info(&self, stage: &'static str, message: String) {
        self.record(TraceRecord::new(TraceLevel::Info, stage, message));
    }

    fn warning(&self, stage: &'static str, message: String) {
        self.record(TraceRecord::new(TraceLevel::Warning, stage, message));
    }
}

/// Forwards every record to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, record: TraceRecord) {
        let level = match record.level {
            TraceLevel::Debug => log::Level::Debug,
            TraceLevel::Info => log::Level::Info,
            TraceLevel::Warning => log::Level::Warn,
            TraceLevel::Error => log::Level::Error,
        };
        log::log!(target: "equilib", level, "[{}] {}", record.stage, record.message);
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<TraceRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<TraceRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Records at or above `level`.
    pub fn at_least(&self, level: TraceLevel) -> Vec<TraceRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level >= level)
            .collect()
    }
}

impl TraceSink for MemorySink {
    fn record(&self, record: TraceRecord) {
        match self.records.lock() {
            Ok(mut guard) => guard.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
