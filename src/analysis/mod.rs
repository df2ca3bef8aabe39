//! Comparative analysis of aggregated results
//!
//! Everything here works on [`MetricRow`]s: experiments that succeeded and
//! carry a complete summary. Failed or metric-less rows never reach the plot
//! data, speedups or tables.

mod plot_data;
mod speedup;
mod tables;

pub use plot_data::{
    augment, complete_throughput_file, latency_vs_batch, latency_vs_n_file, scaling_at_batch,
    throughput_vs_network, write_plot_data, AugmentReport, LatencyPoint, ScalingPoint,
    ThroughputPoint, COMPLETE_LATENCY_FILE, LATENCY_PLOT_FILE, THROUGHPUT_PLOT_FILE,
};
pub use speedup::{
    BaselineComparison, BaselineMaxima, BestConfig, SpeedupAnalysis, SpeedupRow, SPEEDUP_REPORT_FILE,
};
pub use tables::{comparison_tables, format_tps};

use crate::aggregate::{load_csv, FlatResultRow};
use anyhow::Result;
use std::path::Path;
use tracing::info;

/// A successful experiment with complete metrics
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub protocol: String,
    pub n: u32,
    pub f: u32,
    pub b: u32,
    pub k: u32,
    pub c: u32,
    pub input_bytes: u64,
    pub num_nodes: usize,
    pub total_tx: u64,
    pub latency_mean: f64,
    pub latency_std: f64,
    pub tps_mean: f64,
    pub tps_std: f64,
}

impl MetricRow {
    /// `None` unless the row succeeded and every metric field is present
    pub fn from_flat(row: &FlatResultRow) -> Option<Self> {
        if !row.is_successful() || !row.has_summary {
            return None;
        }
        Some(Self {
            protocol: row.protocol.clone(),
            n: row.n,
            f: row.f,
            b: row.b,
            k: row.k,
            c: row.c,
            input_bytes: row.input_bytes,
            num_nodes: row.num_nodes?,
            total_tx: row.total_tx?,
            latency_mean: row.latency_mean?,
            latency_std: row.latency_std?,
            tps_mean: row.tps_mean?,
            tps_std: row.tps_std?,
        })
    }
}

pub fn successful_rows(rows: &[FlatResultRow]) -> Vec<MetricRow> {
    rows.iter().filter_map(MetricRow::from_flat).collect()
}

/// Load `aggregated_results.csv` and keep the successful rows
pub fn load_successful<P: AsRef<Path>>(path: P) -> Result<Vec<MetricRow>> {
    let rows = successful_rows(&load_csv(path)?);
    info!("Loaded {} successful experiments", rows.len());
    Ok(rows)
}
