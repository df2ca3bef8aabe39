//! Metric extraction from per-process protocol logs
//!
//! Each protocol process writes a `*.stdout.log` file. One line in it (the
//! marker line) carries the process's aggregate latency and throughput. This
//! module turns those lines into [`NodeMetricRecord`]s and folds them into an
//! [`ExperimentSummary`].

mod extract;
mod summary;

pub use extract::{parse_marker_line, MarkerPolicy, MetricExtractor, NodeMetricRecord, VERBOSE_LOG_DIR};
pub use summary::{node_records_csv, ExperimentSummary, SummaryError, NODE_COLUMNS};

use anyhow::Result;
use std::path::Path;

/// Everything extracted from one log directory
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryMetrics {
    pub records: Vec<NodeMetricRecord>,
    pub summary: Option<ExperimentSummary>,
}

impl DirectoryMetrics {
    pub fn has_metrics(&self) -> bool {
        self.summary.is_some()
    }
}

/// Extract and summarize every per-process log reachable from `dir`
pub fn extract_directory(extractor: &MetricExtractor, dir: &Path) -> Result<DirectoryMetrics> {
    let records = extractor.extract_records(dir)?;
    let summary = ExperimentSummary::from_records(&records);
    Ok(DirectoryMetrics { records, summary })
}
