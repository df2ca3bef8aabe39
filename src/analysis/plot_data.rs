//! Plot-ready CSV tables

use super::MetricRow;
use crate::config::AnalysisConfig;
use crate::csv_output::{read_rows, write_rows};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

pub const LATENCY_PLOT_FILE: &str = "plot_latency_vs_b.csv";
pub const THROUGHPUT_PLOT_FILE: &str = "plot_throughput_vs_n.csv";
pub const COMPLETE_LATENCY_FILE: &str = "complete_latency_vs_b.csv";

const LATENCY_COLUMNS: [&str; 5] = ["protocol", "N", "B", "latency_mean", "latency_std"];
const THROUGHPUT_COLUMNS: [&str; 5] = ["protocol", "N", "f", "tps_mean", "tps_std"];
const SCALING_COLUMNS: [&str; 7] = [
    "protocol",
    "N",
    "f",
    "latency_mean",
    "latency_std",
    "tps_mean",
    "tps_std",
];

pub fn latency_vs_n_file(b: u32) -> String {
    format!("latency_vs_n_B{}.csv", b)
}

pub fn complete_throughput_file(b: u32) -> String {
    format!("complete_throughput_vs_n_B{}.csv", b)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyPoint {
    pub protocol: String,
    #[serde(rename = "N")]
    pub n: u32,
    #[serde(rename = "B")]
    pub b: u32,
    pub latency_mean: f64,
    pub latency_std: f64,
}

impl From<&MetricRow> for LatencyPoint {
    fn from(row: &MetricRow) -> Self {
        Self {
            protocol: row.protocol.clone(),
            n: row.n,
            b: row.b,
            latency_mean: row.latency_mean,
            latency_std: row.latency_std,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputPoint {
    pub protocol: String,
    #[serde(rename = "N")]
    pub n: u32,
    pub f: u32,
    pub tps_mean: f64,
    pub tps_std: f64,
}

/// Latency and throughput of one protocol at one network size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPoint {
    pub protocol: String,
    #[serde(rename = "N")]
    pub n: u32,
    pub f: u32,
    pub latency_mean: f64,
    pub latency_std: f64,
    pub tps_mean: f64,
    pub tps_std: f64,
}

fn sort_latency(points: &mut [LatencyPoint]) {
    points.sort_by(|a, b| (&a.protocol, a.n, a.b).cmp(&(&b.protocol, b.n, b.b)));
}

/// Latency against batch size for the given network sizes,
/// grouped by (protocol, N) and ordered by B within each group
pub fn latency_vs_batch(rows: &[MetricRow], network_sizes: &[u32]) -> Vec<LatencyPoint> {
    let mut points: Vec<LatencyPoint> = rows
        .iter()
        .filter(|r| network_sizes.contains(&r.n))
        .map(LatencyPoint::from)
        .collect();
    sort_latency(&mut points);
    points
}

/// Throughput against network size at one batch size, ordered by (protocol, N)
pub fn throughput_vs_network(rows: &[MetricRow], batch_size: u32) -> Vec<ThroughputPoint> {
    let mut points: Vec<ThroughputPoint> = rows
        .iter()
        .filter(|r| r.b == batch_size)
        .map(|r| ThroughputPoint {
            protocol: r.protocol.clone(),
            n: r.n,
            f: r.f,
            tps_mean: r.tps_mean,
            tps_std: r.tps_std,
        })
        .collect();
    points.sort_by(|a, b| (&a.protocol, a.n).cmp(&(&b.protocol, b.n)));
    points
}

/// Latency and throughput against network size at one batch size
pub fn scaling_at_batch(rows: &[MetricRow], batch_size: u32) -> Vec<ScalingPoint> {
    let mut points: Vec<ScalingPoint> = rows
        .iter()
        .filter(|r| r.b == batch_size)
        .map(|r| ScalingPoint {
            protocol: r.protocol.clone(),
            n: r.n,
            f: r.f,
            latency_mean: r.latency_mean,
            latency_std: r.latency_std,
            tps_mean: r.tps_mean,
            tps_std: r.tps_std,
        })
        .collect();
    points.sort_by(|a, b| (&a.protocol, a.n).cmp(&(&b.protocol, b.n)));
    points
}

/// Write the two primary plot tables into `out_dir`
pub fn write_plot_data(rows: &[MetricRow], analysis: &AnalysisConfig, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let latency_path = out_dir.join(LATENCY_PLOT_FILE);
    write_rows(
        &latency_path,
        &LATENCY_COLUMNS,
        &latency_vs_batch(rows, &analysis.latency_plot_network_sizes),
    )?;
    info!("Latency vs B data written to {}", latency_path.display());

    let throughput_path = out_dir.join(THROUGHPUT_PLOT_FILE);
    write_rows(
        &throughput_path,
        &THROUGHPUT_COLUMNS,
        &throughput_vs_network(rows, analysis.throughput_plot_batch_size),
    )?;
    info!("Throughput vs N data written to {}", throughput_path.display());

    Ok(vec![latency_path, throughput_path])
}

/// Files touched by [`augment`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AugmentReport {
    /// Subject rows appended to the latency plot table
    pub added: usize,
    pub written: Vec<PathBuf>,
}

/// Extend the latency plot table with the subject's extended network sizes
/// and write the complete tables
///
/// The latency plot table is rewritten only when rows were added. The
/// per-batch tables are skipped when no row has the configured batch size.
pub fn augment(rows: &[MetricRow], analysis: &AnalysisConfig, out_dir: &Path) -> Result<AugmentReport> {
    let mut report = AugmentReport::default();
    let batch = analysis.throughput_plot_batch_size;

    let latency_path = out_dir.join(LATENCY_PLOT_FILE);
    let mut points: Vec<LatencyPoint> = if latency_path.is_file() {
        read_rows(&latency_path)
            .with_context(|| format!("Failed to read {}", latency_path.display()))?
    } else {
        Vec::new()
    };
    let mut present: HashSet<(String, u32, u32)> = points
        .iter()
        .map(|p| (p.protocol.clone(), p.n, p.b))
        .collect();

    for row in rows
        .iter()
        .filter(|r| r.protocol == analysis.subject && analysis.extended_network_sizes.contains(&r.n))
    {
        if present.insert((row.protocol.clone(), row.n, row.b)) {
            points.push(LatencyPoint::from(row));
            report.added += 1;
        }
    }
    if report.added > 0 {
        sort_latency(&mut points);
        write_rows(&latency_path, &LATENCY_COLUMNS, &points)?;
        info!("Added {} rows to {}", report.added, latency_path.display());
        report.written.push(latency_path);
    } else {
        info!("No new latency rows to add");
    }

    let scaling = scaling_at_batch(rows, batch);
    if !scaling.is_empty() {
        let path = out_dir.join(latency_vs_n_file(batch));
        write_rows(&path, &SCALING_COLUMNS, &scaling)?;
        report.written.push(path);
    }

    let mut complete: Vec<LatencyPoint> = rows.iter().map(LatencyPoint::from).collect();
    sort_latency(&mut complete);
    let complete_path = out_dir.join(COMPLETE_LATENCY_FILE);
    write_rows(&complete_path, &LATENCY_COLUMNS, &complete)?;
    report.written.push(complete_path);

    let throughput = throughput_vs_network(rows, batch);
    if !throughput.is_empty() {
        let path = out_dir.join(complete_throughput_file(batch));
        write_rows(&path, &THROUGHPUT_COLUMNS, &throughput)?;
        report.written.push(path);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_rows::metric_row;
    use crate::config::HarnessConfig;

    fn analysis() -> AnalysisConfig {
        let mut analysis = HarnessConfig::embedded_default().unwrap().analysis;
        analysis.extended_network_sizes = vec![61, 101];
        analysis
    }

    fn rows() -> Vec<MetricRow> {
        vec![
            metric_row("hmvba", 16, 1000, 0.3, 900.0),
            metric_row("hmvba", 6, 1000, 0.02, 5000.0),
            metric_row("hmvba", 6, 10, 0.01, 100.0),
            metric_row("finmvba", 6, 1000, 0.1, 1000.0),
            metric_row("hmvba", 61, 1000, 1.5, 300.0),
            metric_row("hmvba", 61, 10, 1.2, 10.0),
            metric_row("finmvba", 61, 1000, 9.0, 30.0),
        ]
    }

    #[test]
    fn test_latency_vs_batch_groups_and_orders() {
        let points = latency_vs_batch(&rows(), &[6, 16, 31]);
        let keys: Vec<_> = points.iter().map(|p| (p.protocol.as_str(), p.n, p.b)).collect();
        assert_eq!(
            keys,
            vec![
                ("finmvba", 6, 1000),
                ("hmvba", 6, 10),
                ("hmvba", 6, 1000),
                ("hmvba", 16, 1000)
            ]
        );
    }

    #[test]
    fn test_throughput_vs_network_at_batch() {
        let points = throughput_vs_network(&rows(), 1000);
        let keys: Vec<_> = points.iter().map(|p| (p.protocol.as_str(), p.n)).collect();
        assert_eq!(
            keys,
            vec![("finmvba", 6), ("finmvba", 61), ("hmvba", 6), ("hmvba", 16), ("hmvba", 61)]
        );
        assert_eq!(points[2].tps_mean, 5000.0);
    }

    #[test]
    fn test_write_plot_data_layout() {
        let dir = tempfile::tempdir().unwrap();
        write_plot_data(&rows(), &analysis(), dir.path()).unwrap();

        let latency = std::fs::read_to_string(dir.path().join(LATENCY_PLOT_FILE)).unwrap();
        let mut lines = latency.lines();
        assert_eq!(lines.next(), Some("protocol,N,B,latency_mean,latency_std"));
        assert_eq!(lines.next(), Some("finmvba,6,1000,0.1,0.01"));

        let throughput = std::fs::read_to_string(dir.path().join(THROUGHPUT_PLOT_FILE)).unwrap();
        assert!(throughput.starts_with("protocol,N,f,tps_mean,tps_std\nfinmvba,6,1,1000.0,10.0\n"));
    }

    #[test]
    fn test_augment_adds_subject_rows_once() {
        let dir = tempfile::tempdir().unwrap();
        let rows = rows();
        write_plot_data(&rows, &analysis(), dir.path()).unwrap();

        let report = augment(&rows, &analysis(), dir.path()).unwrap();
        assert_eq!(report.added, 2);
        let latency: Vec<LatencyPoint> = read_rows(dir.path().join(LATENCY_PLOT_FILE)).unwrap();
        assert_eq!(latency.len(), 6);
        assert!(latency.iter().all(|p| p.protocol != "finmvba" || p.n != 61));
        assert_eq!((latency[5].n, latency[5].b), (61, 1000));

        let again = augment(&rows, &analysis(), dir.path()).unwrap();
        assert_eq!(again.added, 0);
        assert!(!again.written.contains(&dir.path().join(LATENCY_PLOT_FILE)));
    }

    #[test]
    fn test_augment_writes_complete_tables() {
        let dir = tempfile::tempdir().unwrap();
        let report = augment(&rows(), &analysis(), dir.path()).unwrap();
        assert_eq!(report.added, 2);

        let scaling = std::fs::read_to_string(dir.path().join("latency_vs_n_B1000.csv")).unwrap();
        assert_eq!(
            scaling.lines().next(),
            Some("protocol,N,f,latency_mean,latency_std,tps_mean,tps_std")
        );
        assert_eq!(scaling.lines().count(), 1 + 5);

        let complete: Vec<LatencyPoint> = read_rows(dir.path().join(COMPLETE_LATENCY_FILE)).unwrap();
        assert_eq!(complete.len(), 7);
        assert!(dir.path().join("complete_throughput_vs_n_B1000.csv").is_file());
    }

    #[test]
    fn test_augment_without_batch_rows_skips_per_batch_tables() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![metric_row("hmvba", 6, 10, 0.01, 100.0)];
        let report = augment(&rows, &analysis(), dir.path()).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.written, vec![dir.path().join(COMPLETE_LATENCY_FILE)]);
    }
}
