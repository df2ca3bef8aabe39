//! Results aggregation
//!
//! Walks the result store, merges each experiment's parameters, run record
//! and summary into one flat row, and renders the status report.

use crate::csv_output::{read_rows, write_rows};
use crate::params::ExperimentParams;
use crate::store::{ResultStore, StoreEntry};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

/// Column layout of `aggregated_results.csv`
pub const AGGREGATE_COLUMNS: [&str; 18] = [
    "protocol",
    "N",
    "f",
    "B",
    "K",
    "C",
    "input_bytes",
    "success",
    "timeout",
    "runtime_seconds",
    "has_summary",
    "has_log",
    "num_nodes",
    "total_tx",
    "latency_mean",
    "latency_std",
    "tps_mean",
    "tps_std",
];

/// One experiment, flattened for tabular output
///
/// `success`, `timeout` and `runtime_seconds` are `None` when the experiment
/// has no run record; the metric fields are `None` without a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatResultRow {
    pub protocol: String,
    #[serde(rename = "N")]
    pub n: u32,
    pub f: u32,
    #[serde(rename = "B")]
    pub b: u32,
    #[serde(rename = "K")]
    pub k: u32,
    #[serde(rename = "C")]
    pub c: u32,
    pub input_bytes: u64,
    #[serde(deserialize_with = "lenient_opt_bool")]
    pub success: Option<bool>,
    #[serde(deserialize_with = "lenient_opt_bool")]
    pub timeout: Option<bool>,
    pub runtime_seconds: Option<f64>,
    #[serde(deserialize_with = "lenient_bool")]
    pub has_summary: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub has_log: bool,
    pub num_nodes: Option<usize>,
    pub total_tx: Option<u64>,
    pub latency_mean: Option<f64>,
    pub latency_std: Option<f64>,
    pub tps_mean: Option<f64>,
    pub tps_std: Option<f64>,
}

/// Accepts `true`/`True`/`TRUE`; anything else non-empty is false
fn lenient_opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().eq_ignore_ascii_case("true")))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(lenient_opt_bool(deserializer)?.unwrap_or(false))
}

impl FlatResultRow {
    pub fn params(&self) -> ExperimentParams {
        ExperimentParams::new(&self.protocol, self.n, self.f, self.b, self.k, self.c)
    }

    pub fn is_successful(&self) -> bool {
        self.success == Some(true)
    }

    pub fn is_timed_out(&self) -> bool {
        self.timeout == Some(true)
    }
}

/// Merge every recognized experiment in `store` into a flat row
pub fn aggregate(store: &dyn ResultStore) -> Result<Vec<FlatResultRow>> {
    let mut rows = Vec::new();
    for entry in store.entries()? {
        let params = match entry {
            StoreEntry::Experiment(params) => params,
            StoreEntry::Unrecognized { name, reason } => {
                warn!("Could not parse directory name {}: {}", name, reason);
                continue;
            }
        };

        let flags = store.run_flags(&params);
        let summary = store.summary(&params);
        let has_log = store.has_run_log(&params);
        rows.push(FlatResultRow {
            protocol: params.protocol,
            n: params.n,
            f: params.f,
            b: params.b,
            k: params.k,
            c: params.c,
            input_bytes: params.input_bytes,
            success: flags.map(|f| f.success),
            timeout: flags.map(|f| f.timed_out),
            runtime_seconds: flags.and_then(|f| f.runtime_seconds),
            has_summary: summary.is_some(),
            has_log,
            num_nodes: summary.as_ref().map(|s| s.num_nodes),
            total_tx: summary.as_ref().map(|s| s.total_tx),
            latency_mean: summary.as_ref().map(|s| s.latency_mean),
            latency_std: summary.as_ref().map(|s| s.latency_std),
            tps_mean: summary.as_ref().map(|s| s.tps_mean),
            tps_std: summary.as_ref().map(|s| s.tps_std),
        });
    }
    info!("Aggregated {} experiments", rows.len());
    Ok(rows)
}

pub fn write_csv<P: AsRef<Path>>(rows: &[FlatResultRow], path: P) -> Result<()> {
    write_rows(path, &AGGREGATE_COLUMNS, rows)
}

pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<FlatResultRow>> {
    let path = path.as_ref();
    read_rows(path).with_context(|| format!("Failed to load aggregated results: {}", path.display()))
}

#[derive(Default)]
struct Counts {
    total: usize,
    successful: usize,
    timeouts: usize,
}

impl Counts {
    fn add(&mut self, row: &FlatResultRow) {
        self.total += 1;
        if row.is_successful() {
            self.successful += 1;
        }
        if row.is_timed_out() {
            self.timeouts += 1;
        }
    }

    fn rate(&self) -> f64 {
        if self.total > 0 {
            self.successful as f64 / self.total as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// Render `experiment_summary.md`
pub fn status_report(rows: &[FlatResultRow]) -> String {
    let mut by_protocol: BTreeMap<&str, Counts> = BTreeMap::new();
    let mut by_n: BTreeMap<u32, Counts> = BTreeMap::new();
    for row in rows {
        by_protocol.entry(row.protocol.as_str()).or_default().add(row);
        by_n.entry(row.n).or_default().add(row);
    }

    let mut md = String::new();
    md.push_str("# Experiment Results Summary\n\n");
    md.push_str(&format!("Total experiments: {}\n\n", rows.len()));

    md.push_str("## By Protocol\n");
    md.push_str("| Protocol | Total | Successful | Timeouts | Success Rate |\n");
    md.push_str("|----------|-------|------------|----------|--------------|\n");
    for (protocol, counts) in &by_protocol {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {:.1}% |\n",
            protocol,
            counts.total,
            counts.successful,
            counts.timeouts,
            counts.rate()
        ));
    }

    md.push_str("\n## By Network Size (N)\n");
    md.push_str("| N | Total | Successful | Success Rate |\n");
    md.push_str("|---|-------|------------|--------------|\n");
    for (n, counts) in &by_n {
        md.push_str(&format!(
            "| {} | {} | {} | {:.1}% |\n",
            n,
            counts.total,
            counts.successful,
            counts.rate()
        ));
    }

    let failed: Vec<_> = rows.iter().filter(|r| !r.is_successful()).collect();
    if !failed.is_empty() {
        md.push_str("\n## Failed Experiments\n");
        md.push_str("| Protocol | N | f | B | K | C | Reason |\n");
        md.push_str("|----------|---|---|---|---|---|--------|\n");
        for row in failed {
            let reason = if row.is_timed_out() { "Timeout" } else { "Unknown" };
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                row.protocol, row.n, row.f, row.b, row.k, row.c, reason
            ));
        }
    }

    let mut with_metrics: Vec<_> = rows
        .iter()
        .filter(|r| r.is_successful() && r.has_summary)
        .collect();
    if !with_metrics.is_empty() {
        with_metrics.sort_by(|a, b| (&a.protocol, a.n, a.b).cmp(&(&b.protocol, b.n, b.b)));
        md.push_str("\n## Successful Experiments Metrics Overview\n");
        md.push_str("| Protocol | N | B | Latency (mean±std) | TPS (mean±std) |\n");
        md.push_str("|----------|---|---|-------------------|----------------|\n");
        let mut shown = BTreeSet::new();
        for row in with_metrics {
            if !shown.insert((row.protocol.as_str(), row.n, row.b)) {
                continue;
            }
            md.push_str(&format!(
                "| {} | {} | {} | {:.4}±{:.4} | {:.1}±{:.1} |\n",
                row.protocol,
                row.n,
                row.b,
                row.latency_mean.unwrap_or(0.0),
                row.latency_std.unwrap_or(0.0),
                row.tps_mean.unwrap_or(0.0),
                row.tps_std.unwrap_or(0.0)
            ));
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ExperimentSummary;
    use crate::record::RunFlags;
    use std::collections::{HashMap, HashSet};

    /// In-memory store for exercising the merge logic
    #[derive(Default)]
    struct MemoryStore {
        entries: Vec<StoreEntry>,
        summaries: HashMap<String, ExperimentSummary>,
        flags: HashMap<String, RunFlags>,
        logs: HashSet<String>,
    }

    impl ResultStore for MemoryStore {
        fn entries(&self) -> Result<Vec<StoreEntry>> {
            Ok(self.entries.clone())
        }

        fn summary(&self, params: &ExperimentParams) -> Option<ExperimentSummary> {
            self.summaries.get(&params.canonical_name()).cloned()
        }

        fn run_flags(&self, params: &ExperimentParams) -> Option<RunFlags> {
            self.flags.get(&params.canonical_name()).copied()
        }

        fn has_run_log(&self, params: &ExperimentParams) -> bool {
            self.logs.contains(&params.canonical_name())
        }
    }

    fn summary(latency: f64, tps: f64) -> ExperimentSummary {
        ExperimentSummary {
            num_nodes: 6,
            total_tx: 1000,
            latency_mean: latency,
            latency_std: 0.001,
            tps_mean: tps,
            tps_std: 1.5,
        }
    }

    fn row(protocol: &str, n: u32, b: u32, success: Option<bool>, latency: Option<f64>) -> FlatResultRow {
        let params = ExperimentParams::new(protocol, n, 1, b, 10, 0);
        FlatResultRow {
            protocol: params.protocol,
            n,
            f: 1,
            b,
            k: 10,
            c: 0,
            input_bytes: params.input_bytes,
            success,
            timeout: success.map(|_| false),
            runtime_seconds: success.map(|_| 10.0),
            has_summary: latency.is_some(),
            has_log: success.is_some(),
            num_nodes: latency.map(|_| 6),
            total_tx: latency.map(|_| 1000),
            latency_mean: latency,
            latency_std: latency.map(|_| 0.001),
            tps_mean: latency.map(|_| 100.0),
            tps_std: latency.map(|_| 1.0),
        }
    }

    #[test]
    fn test_aggregate_merges_sources() {
        let ok = ExperimentParams::new("hmvba", 6, 1, 1000, 10, 0);
        let bare = ExperimentParams::new("finmvba", 6, 1, 10, 10, 0);
        let mut store = MemoryStore::default();
        store.entries = vec![
            StoreEntry::Experiment(ok.clone()),
            StoreEntry::Unrecognized {
                name: "notes".to_string(),
                reason: "grammar".to_string(),
            },
            StoreEntry::Experiment(bare),
        ];
        store.summaries.insert(ok.canonical_name(), summary(0.02, 5000.0));
        store.flags.insert(
            ok.canonical_name(),
            RunFlags {
                success: true,
                timed_out: false,
                runtime_seconds: Some(12.5),
            },
        );
        store.logs.insert(ok.canonical_name());

        let rows = aggregate(&store).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].success, Some(true));
        assert!(rows[0].has_summary && rows[0].has_log);
        assert_eq!(rows[0].latency_mean, Some(0.02));
        assert_eq!(rows[0].input_bytes, 250_000);

        assert_eq!(rows[1].success, None);
        assert_eq!(rows[1].runtime_seconds, None);
        assert!(!rows[1].has_summary && !rows[1].has_log);
        assert_eq!(rows[1].latency_mean, None);
    }

    #[test]
    fn test_has_log_tracks_log_file_not_record() {
        let params = ExperimentParams::new("hmvba", 6, 1, 10, 10, 0);
        let mut store = MemoryStore::default();
        store.entries = vec![StoreEntry::Experiment(params.clone())];
        store.flags.insert(
            params.canonical_name(),
            RunFlags {
                success: false,
                timed_out: false,
                runtime_seconds: Some(1.0),
            },
        );

        let rows = aggregate(&store).unwrap();
        assert_eq!(rows[0].success, Some(false));
        assert!(!rows[0].has_log);
    }

    #[test]
    fn test_csv_empty_fields_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aggregated_results.csv");
        let rows = vec![row("hmvba", 6, 10, None, None)];
        write_csv(&rows, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), AGGREGATE_COLUMNS.join(","));
        assert_eq!(lines.next().unwrap(), "hmvba,6,1,10,10,0,2500,,,,false,false,,,,,,");
        assert_eq!(load_csv(&path).unwrap(), rows);
    }

    #[test]
    fn test_load_accepts_capitalized_booleans() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agg.csv");
        std::fs::write(
            &path,
            format!(
                "{}\nhmvba,6,1,10,10,0,2500,True,False,159.5,True,True,6,10,0.05,0.01,200.0,10.0\n",
                AGGREGATE_COLUMNS.join(",")
            ),
        )
        .unwrap();
        let rows = load_csv(&path).unwrap();
        assert_eq!(rows[0].success, Some(true));
        assert_eq!(rows[0].timeout, Some(false));
        assert!(rows[0].has_summary);
        assert_eq!(rows[0].runtime_seconds, Some(159.5));
    }

    #[test]
    fn test_status_report_sections() {
        let mut timed_out = row("finmvba", 16, 100, Some(false), None);
        timed_out.timeout = Some(true);
        let rows = vec![
            row("hmvba", 6, 1000, Some(true), Some(0.02)),
            row("hmvba", 6, 1000, Some(true), Some(0.03)),
            row("hmvba", 16, 10, Some(false), None),
            timed_out,
            row("finmvba", 6, 10, None, None),
        ];
        let md = status_report(&rows);

        assert!(md.starts_with("# Experiment Results Summary\n\nTotal experiments: 5\n\n"));
        assert!(md.contains("| finmvba | 2 | 0 | 1 | 0.0% |\n"));
        assert!(md.contains("| hmvba | 3 | 2 | 0 | 66.7% |\n"));
        assert!(md.contains("| 6 | 3 | 2 | 66.7% |\n"));
        assert!(md.contains("| 16 | 2 | 0 | 0.0% |\n"));
        assert!(md.contains("| finmvba | 16 | 1 | 100 | 10 | 0 | Timeout |\n"));
        assert!(md.contains("| hmvba | 16 | 1 | 10 | 10 | 0 | Unknown |\n"));
        assert!(md.contains("| finmvba | 6 | 1 | 10 | 10 | 0 | Unknown |\n"));
        // duplicate (protocol, N, B) shown once, first after sorting
        assert_eq!(md.matches("| hmvba | 6 | 1000 |").count(), 1);
        assert!(md.contains("| hmvba | 6 | 1000 | 0.0200±0.0010 | 100.0±1.0 |\n"));
    }

    #[test]
    fn test_status_report_omits_empty_sections() {
        let md = status_report(&[row("hmvba", 6, 10, Some(true), None)]);
        assert!(!md.contains("## Failed Experiments"));
        assert!(!md.contains("## Successful Experiments Metrics Overview"));
    }

    #[test]
    fn test_summary_without_success_excluded_from_overview() {
        let md = status_report(&[row("hmvba", 6, 10, None, Some(0.5))]);
        assert!(!md.contains("## Successful Experiments Metrics Overview"));
    }
}
