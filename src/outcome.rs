//! Two-axis result of running one experiment
//!
//! Whether the launcher succeeded and whether metrics could be extracted are
//! tracked separately; overall success requires both.

use crate::metrics::ExperimentSummary;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened to the external launcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Execution {
    /// Process finished within the bound; `code` is `None` when killed by a signal
    Exited { code: Option<i32> },
    /// Process exceeded the bound and was killed
    TimedOut { after_secs: u64 },
    /// Process could not be started (or the scratch space was unavailable)
    LaunchFailed { reason: String },
}

impl Execution {
    pub fn succeeded(&self) -> bool {
        matches!(self, Execution::Exited { code: Some(0) })
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, Execution::TimedOut { .. })
    }
}

/// What the metrics extractor made of the relocated logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Extraction {
    Extracted { summary: ExperimentSummary },
    /// Logs exist but no process reported a marker line
    NoMetrics,
    /// The launcher left no per-process log directory
    NoLogs,
    /// Logs exist but could not be read
    Failed { reason: String },
}

impl Extraction {
    pub fn summary(&self) -> Option<&ExperimentSummary> {
        match self {
            Extraction::Extracted { summary } => Some(summary),
            _ => None,
        }
    }
}

/// Result of executing one experiment
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub execution: Execution,
    pub extraction: Extraction,
    /// Wall-clock time; exactly the bound for timed-out runs
    pub elapsed: Duration,
    /// Captured stdout followed by stderr, or a diagnostic placeholder
    pub output: String,
}

impl RunOutcome {
    /// The launcher never started; nothing was produced to extract
    pub fn launch_failed(reason: String) -> Self {
        Self {
            execution: Execution::LaunchFailed {
                reason: reason.clone(),
            },
            extraction: Extraction::NoLogs,
            elapsed: Duration::ZERO,
            output: reason,
        }
    }

    /// Launcher exited with 0 and metrics were extracted
    pub fn success(&self) -> bool {
        self.execution.succeeded() && self.extraction.summary().is_some()
    }

    pub fn timed_out(&self) -> bool {
        self.execution.timed_out()
    }

    pub fn summary(&self) -> Option<&ExperimentSummary> {
        self.extraction.summary()
    }

    /// Short failure attribution for logs and reports
    pub fn failure_reason(&self) -> Option<String> {
        if self.success() {
            return None;
        }
        Some(match (&self.execution, &self.extraction) {
            (Execution::TimedOut { after_secs }, _) => format!("timed out after {}s", after_secs),
            (Execution::LaunchFailed { reason }, _) => format!("launch failed: {}", reason),
            (Execution::Exited { code: Some(code) }, _) if *code != 0 => {
                format!("launcher exited with code {}", code)
            }
            (Execution::Exited { code: None }, _) => "launcher killed by signal".to_string(),
            (_, Extraction::NoMetrics) => "no metric marker in any process log".to_string(),
            (_, Extraction::NoLogs) => "no per-process logs produced".to_string(),
            (_, Extraction::Failed { reason }) => format!("metric extraction failed: {}", reason),
            (_, Extraction::Extracted { .. }) => "unknown".to_string(),
        })
    }
}
