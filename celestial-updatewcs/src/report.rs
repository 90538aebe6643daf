//! Per-run record of what the pipeline did.
//!
//! Every entry is emitted as a `tracing` event when it is recorded and kept
//! for the caller, who collects them with [`RunReport::finish`].

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub severity: Severity,
    pub file: Option<PathBuf>,
    pub message: String,
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
        };
        match &self.file {
            Some(file) => write!(f, "[{level}] {}: {}", file.display(), self.message),
            None => write!(f, "[{level}] {}", self.message),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    entries: Vec<ReportEntry>,
    dropped: Vec<PathBuf>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, file: Option<&Path>, message: impl Into<String>) {
        let message = message.into();
        match file {
            Some(file) => tracing::info!(file = %file.display(), "{message}"),
            None => tracing::info!("{message}"),
        }
        self.push(Severity::Info, file, message);
    }

    pub fn warn(&mut self, file: Option<&Path>, message: impl Into<String>) {
        let message = message.into();
        match file {
            Some(file) => tracing::warn!(file = %file.display(), "{message}"),
            None => tracing::warn!("{message}"),
        }
        self.push(Severity::Warning, file, message);
    }

    /// Records an input removed from the batch before processing.
    pub fn dropped(&mut self, file: &Path, reason: impl fmt::Display) {
        self.warn(Some(file), format!("removed from the input list: {reason}"));
        self.dropped.push(file.to_path_buf());
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.severity == Severity::Warning)
    }

    pub fn dropped_files(&self) -> &[PathBuf] {
        &self.dropped
    }

    /// Ends the run and hands back everything recorded.
    pub fn finish(self) -> Vec<ReportEntry> {
        tracing::debug!(
            entries = self.entries.len(),
            dropped = self.dropped.len(),
            "update run finished"
        );
        self.entries
    }

    fn push(&mut self, severity: Severity, file: Option<&Path>, message: String) {
        self.entries.push(ReportEntry {
            severity,
            file: file.map(Path::to_path_buf),
            message,
        });
    }
}
