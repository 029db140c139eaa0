//! Diagnostic sink passed explicitly through the pipeline.
//!
//! Informational branch events (percentile fallback, erosion revert, buffer
//! shrink) are observable by the caller without a global logger.

use log::Level;

/// Receives diagnostic events from a pipeline run.
pub trait DiagnosticSink {
    fn record(&mut self, level: Level, message: &str);
}

/// Forwards every record to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&mut self, level: Level, message: &str) {
        log::log!(target: "aclive", level, "{message}");
    }
}

/// Collects records in memory and also forwards them to `log`.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticLog {
    pub records: Vec<(Level, String)>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if any record at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn record(&mut self, level: Level, message: &str) {
        log::log!(target: "aclive", level, "{message}");
        self.records.push((level, message.to_string()));
    }
}
