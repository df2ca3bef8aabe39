//! Run records: what happened when one experiment was executed
//!
//! Every run leaves two records in its experiment directory. `experiment.log`
//! is meant for humans and is line-oriented; `outcome.json` is a tagged,
//! versioned document that readers prefer when it is present and well formed.

use crate::metrics::ExperimentSummary;
use crate::outcome::{Execution, Extraction, RunOutcome};
use crate::params::ExperimentParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format tag of the current run record schema
pub const RUN_RECORD_FORMAT: &str = "mvbench-run-v1";

/// Timestamp layout of the `Start time:` line (ctime style)
pub const START_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Line separating the `experiment.log` header from the captured output
pub const OUTPUT_SECTION: &str = "--- Command output ---";

/// Problems reading a structured run record
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("run record format mismatch: expected {expected}, found {found}")]
    FormatMismatch { expected: &'static str, found: String },

    #[error("malformed run record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structured record of one run, stored as `outcome.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub format: String,
    pub params: ExperimentParams,
    pub command: String,
    pub start_time: String,
    pub elapsed_secs: f64,
    pub execution: Execution,
    pub extraction: Extraction,
    pub success: bool,
    pub timed_out: bool,
}

impl RunRecord {
    pub fn new(
        params: &ExperimentParams,
        command: impl Into<String>,
        start_time: impl Into<String>,
        outcome: &RunOutcome,
    ) -> Self {
        Self {
            format: RUN_RECORD_FORMAT.to_string(),
            params: params.clone(),
            command: command.into(),
            start_time: start_time.into(),
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            execution: outcome.execution.clone(),
            extraction: outcome.extraction.clone(),
            success: outcome.success(),
            timed_out: outcome.timed_out(),
        }
    }

    pub fn summary(&self) -> Option<&ExperimentSummary> {
        self.extraction.summary()
    }

    pub fn to_json(&self) -> Result<String, RecordError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Parse `outcome.json`, checking the format tag before the body
    pub fn from_json(content: &str) -> Result<Self, RecordError> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        match value.get("format").and_then(|f| f.as_str()) {
            Some(RUN_RECORD_FORMAT) => Ok(serde_json::from_value(value)?),
            Some(other) => Err(RecordError::FormatMismatch {
                expected: RUN_RECORD_FORMAT,
                found: other.to_string(),
            }),
            None => Err(RecordError::FormatMismatch {
                expected: RUN_RECORD_FORMAT,
                found: "<none>".to_string(),
            }),
        }
    }

    /// Render `experiment.log`
    pub fn to_log_text(&self, output: &str) -> anyhow::Result<String> {
        let p = &self.params;
        let mut text = String::new();
        text.push_str(&format!("Protocol: {}\n", p.protocol));
        text.push_str(&format!(
            "N: {}, f: {}, B: {}, K: {}, C: {}\n",
            p.n, p.f, p.b, p.k, p.c
        ));
        text.push_str(&format!("Command: {}\n", self.command));
        text.push_str(&format!("Start time: {}\n", self.start_time));
        text.push_str(&format!("Elapsed: {:.1}s\n", self.elapsed_secs));
        text.push_str(&format!("Success: {}\n", self.success));
        text.push('\n');
        text.push_str(OUTPUT_SECTION);
        text.push('\n');
        text.push_str(output);
        if let Some(summary) = self.summary() {
            text.push_str("\n--- Metrics ---\n");
            text.push_str(&summary.to_text()?);
        }
        Ok(text)
    }
}

/// The fields the aggregator needs from a run record
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunFlags {
    pub success: bool,
    pub timed_out: bool,
    pub runtime_seconds: Option<f64>,
}

impl RunFlags {
    pub fn from_record(record: &RunRecord) -> Self {
        Self {
            success: record.success,
            timed_out: record.timed_out,
            runtime_seconds: Some(record.elapsed_secs),
        }
    }

    /// Line scan of `experiment.log`
    ///
    /// Success and elapsed time come from the header only. Output of a timed
    /// out run is the single placeholder line, so below the header only that
    /// line marks a timeout.
    pub fn scan_log_text(content: &str) -> Self {
        let mut flags = Self::default();
        let mut lines = content.lines();
        for line in lines.by_ref() {
            if line == OUTPUT_SECTION {
                break;
            }
            if let Some(value) = line.strip_prefix("Success:") {
                flags.success = value.trim().eq_ignore_ascii_case("true");
            } else if let Some(value) = line.strip_prefix("Elapsed:") {
                let value = value.trim();
                let value = value.strip_suffix('s').unwrap_or(value);
                if let Ok(secs) = value.trim().parse::<f64>() {
                    flags.runtime_seconds = Some(secs);
                }
            }
            if line.contains("Timeout") {
                flags.timed_out = true;
            }
        }
        if lines.next().is_some_and(|first| first.starts_with("Timeout after ")) {
            flags.timed_out = true;
        }
        flags
    }
}
