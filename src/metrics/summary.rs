//! Cross-node aggregation of per-process metrics

use super::extract::NodeMetricRecord;
use crate::csv_output::rows_to_csv;
use crate::stats::{mean, sample_std_dev};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Columns of the per-node metrics table
pub const NODE_COLUMNS: [&str; 8] = [
    "node",
    "latency",
    "tps",
    "total_tx",
    "avg_latency",
    "std_latency",
    "avg_tps",
    "std_tps",
];

/// Failure to recover a summary from its text form
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("no embedded JSON object")]
    NoObject,

    #[error("malformed JSON summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Aggregate metrics of one experiment across its contributing nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub num_nodes: usize,
    pub total_tx: u64,
    pub latency_mean: f64,
    pub latency_std: f64,
    pub tps_mean: f64,
    pub tps_std: f64,
}

impl ExperimentSummary {
    /// Summarize node records; `None` when no node reported metrics
    ///
    /// All nodes are expected to deliver the same transactions, so the total
    /// is taken from the first record (0 if it is a partial record).
    pub fn from_records(records: &[NodeMetricRecord]) -> Option<Self> {
        let first = records.first()?;
        let latencies: Vec<f64> = records.iter().map(|r| r.latency).collect();
        let tps: Vec<f64> = records.iter().map(|r| r.tps).collect();

        Some(Self {
            num_nodes: records.len(),
            total_tx: first.total_tx.unwrap_or(0),
            latency_mean: mean(&latencies)?,
            latency_std: sample_std_dev(&latencies),
            tps_mean: mean(&tps)?,
            tps_std: sample_std_dev(&tps),
        })
    }

    /// Human-readable preamble followed by the embedded JSON object
    pub fn to_text(&self) -> Result<String> {
        let mut text = String::new();
        text.push_str(&format!("Nodes: {}\n", self.num_nodes));
        text.push_str(&format!("Total transactions: {}\n", self.total_tx));
        text.push_str(&format!(
            "Average latency: {:.6} ± {:.6}\n",
            self.latency_mean, self.latency_std
        ));
        text.push_str(&format!(
            "Average TPS: {:.6} ± {:.6}\n",
            self.tps_mean, self.tps_std
        ));
        text.push_str("\nJSON summary:\n");
        text.push_str(&serde_json::to_string_pretty(self)?);
        text.push('\n');
        Ok(text)
    }

    /// Recover a summary from [`ExperimentSummary::to_text`] output
    ///
    /// Everything before the first `{` is ignored.
    pub fn from_text(content: &str) -> Result<Self, SummaryError> {
        let start = content.find('{').ok_or(SummaryError::NoObject)?;
        Ok(serde_json::from_str(&content[start..])?)
    }
}

/// Per-node metrics as CSV; fields missing from partial records are empty
pub fn node_records_csv(records: &[NodeMetricRecord]) -> Result<String> {
    let rows: Vec<_> = records
        .iter()
        .map(|r| {
            (
                r.node,
                r.latency,
                r.tps,
                r.total_tx,
                r.avg_latency,
                r.std_latency,
                r.avg_tps,
                r.std_tps,
            )
        })
        .collect();
    rows_to_csv(&NODE_COLUMNS, &rows)
}
