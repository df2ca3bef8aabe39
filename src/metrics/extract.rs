//! Marker-line grammar for per-process protocol logs
//!
//! A protocol process reports its aggregate metrics on a single line such as:
//!
//! ```text
//! node: 0 epoch: 1 run: 0.059161, total delivered Txs after warm-up: 10, latency after warm-up: 0.059161, tps after warm-up: 169.031104, average latency by rounds + stddev: 0.059161 0.000000, average tps by rounds + stddev: 169.031104 0.000000,
//! ```
//!
//! The full ten-field pattern is tried first; when it does not match, a
//! three-field fallback (node, latency, tps) yields a partial record.

use crate::config::MetricsConfig;
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Directory name the launcher writes per-process logs to
pub const VERBOSE_LOG_DIR: &str = "verbose_log";

/// Which marker line to use when a log contains several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MarkerPolicy {
    /// First marker line in the file
    #[default]
    First,
    /// Last marker line in the file (latest snapshot)
    Last,
}

/// Metrics reported by one protocol process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetricRecord {
    pub node: u64,
    pub epoch: Option<u64>,
    pub run_time: Option<f64>,
    pub total_tx: Option<u64>,
    pub latency: f64,
    pub tps: f64,
    pub avg_latency: Option<f64>,
    pub std_latency: Option<f64>,
    pub avg_tps: Option<f64>,
    pub std_tps: Option<f64>,
}

impl NodeMetricRecord {
    /// Record built from the three-field fallback pattern
    pub fn partial(node: u64, latency: f64, tps: f64) -> Self {
        Self {
            node,
            epoch: None,
            run_time: None,
            total_tx: None,
            latency,
            tps,
            avg_latency: None,
            std_latency: None,
            avg_tps: None,
            std_tps: None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.epoch.is_none()
    }
}

/// Extracts [`NodeMetricRecord`]s from per-process log files
#[derive(Debug, Clone)]
pub struct MetricExtractor {
    marker: String,
    log_suffix: String,
    policy: MarkerPolicy,
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self::new(&MetricsConfig::default())
    }
}

impl MetricExtractor {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            marker: config.marker.clone(),
            log_suffix: config.log_suffix.clone(),
            policy: config.policy,
        }
    }

    pub fn with_policy(mut self, policy: MarkerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MarkerPolicy {
        self.policy
    }

    /// Select the marker line according to the configured policy
    pub fn find_marker_line<'a>(&self, content: &'a str) -> Option<&'a str> {
        let mut lines = content.lines().filter(|line| line.contains(&self.marker));
        let line = match self.policy {
            MarkerPolicy::First => lines.next(),
            MarkerPolicy::Last => lines.last(),
        };
        line.map(str::trim)
    }

    /// Parse log text; `None` when there is no usable marker line
    pub fn parse_log_text(&self, content: &str) -> Option<NodeMetricRecord> {
        self.find_marker_line(content).and_then(parse_marker_line)
    }

    pub fn parse_log_file(&self, path: &Path) -> Result<Option<NodeMetricRecord>> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let record = self.parse_log_text(&String::from_utf8_lossy(&bytes));
        if record.is_none() {
            debug!(path = %path.display(), "No metric marker line");
        }
        Ok(record)
    }

    /// Per-process log files for `dir`, in sorted order
    ///
    /// Logs are looked up directly in `dir`, then in `dir/verbose_log`, then in
    /// a `verbose_log` sibling of `dir`.
    pub fn locate_logs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let direct = self.list_logs(dir)?;
        if !direct.is_empty() {
            return Ok(direct);
        }

        let nested = dir.join(VERBOSE_LOG_DIR);
        if nested.is_dir() {
            return self.list_logs(&nested);
        }

        if let Some(parent) = dir.parent() {
            let sibling = parent.join(VERBOSE_LOG_DIR);
            if sibling.is_dir() {
                return self.list_logs(&sibling);
            }
        }

        Ok(Vec::new())
    }

    /// Records of every log under `dir` that carries a marker line
    pub fn extract_records(&self, dir: &Path) -> Result<Vec<NodeMetricRecord>> {
        let mut records = Vec::new();
        for path in self.locate_logs(dir)? {
            if let Some(record) = self.parse_log_file(&path)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn list_logs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut logs = Vec::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(&self.log_suffix));
            if matches && path.is_file() {
                logs.push(path);
            }
        }
        logs.sort();
        Ok(logs)
    }
}

/// Apply the full pattern, then the fallback, to a single marker line
pub fn parse_marker_line(line: &str) -> Option<NodeMetricRecord> {
    if let Some(caps) = full_pattern().captures(line) {
        if let Some(record) = full_record(&caps) {
            return Some(record);
        }
    }

    let caps = fallback_pattern().captures(line)?;
    Some(NodeMetricRecord::partial(
        caps[1].parse().ok()?,
        number(&caps[2])?,
        number(&caps[3])?,
    ))
}

fn full_record(caps: &Captures<'_>) -> Option<NodeMetricRecord> {
    Some(NodeMetricRecord {
        node: caps[1].parse().ok()?,
        epoch: Some(caps[2].parse().ok()?),
        run_time: Some(number(&caps[3])?),
        total_tx: Some(caps[4].parse().ok()?),
        latency: number(&caps[5])?,
        tps: number(&caps[6])?,
        avg_latency: Some(number(&caps[7])?),
        std_latency: Some(number(&caps[8])?),
        avg_tps: Some(number(&caps[9])?),
        std_tps: Some(number(&caps[10])?),
    })
}

/// `[\d.]+` also admits strings like `1.2.3`; those count as a non-match
fn number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn full_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"(?s)node:\s*([0-9]+).*?epoch:\s*([0-9]+).*?run:\s*([0-9.]+)",
            r".*?total delivered Txs after warm-up:\s*([0-9]+)",
            r".*?latency after warm-up:\s*([0-9.]+)",
            r".*?tps after warm-up:\s*([0-9.]+)",
            r".*?average latency by rounds \+ stddev:\s*([0-9.]+)\s+([0-9.]+)",
            r".*?average tps by rounds \+ stddev:\s*([0-9.]+)\s+([0-9.]+)",
        ))
        .expect("full metric pattern is valid")
    })
}

fn fallback_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"node:\s*([0-9]+).*?latency after warm-up:\s*([0-9.]+).*?tps after warm-up:\s*([0-9.]+)")
            .expect("fallback metric pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_LINE: &str = "node: 0 epoch: 1 run: 0.059161, total delivered Txs after warm-up: 10, latency after warm-up: 0.059161, tps after warm-up: 169.031104, average latency by rounds + stddev: 0.059161 0.000000, average tps by rounds + stddev: 169.031104 0.000000,";

    fn snapshot(node: u32, latency: f64) -> String {
        format!(
            "node: {} epoch: 1 run: 1.0, total delivered Txs after warm-up: 10, latency after warm-up: {}, tps after warm-up: 100.0, average latency by rounds + stddev: {} 0.0, average tps by rounds + stddev: 100.0 0.0,",
            node, latency, latency
        )
    }

    #[test]
    fn test_full_line_yields_ten_fields() {
        let record = parse_marker_line(FULL_LINE).unwrap();
        assert_eq!(record.node, 0);
        assert_eq!(record.epoch, Some(1));
        assert_eq!(record.run_time, Some(0.059161));
        assert_eq!(record.total_tx, Some(10));
        assert_eq!(record.latency, 0.059161);
        assert_eq!(record.tps, 169.031104);
        assert_eq!(record.avg_latency, Some(0.059161));
        assert_eq!(record.std_latency, Some(0.0));
        assert_eq!(record.avg_tps, Some(169.031104));
        assert_eq!(record.std_tps, Some(0.0));
        assert!(!record.is_partial());
    }

    #[test]
    fn test_fallback_yields_partial_record() {
        let line = "node: 7 latency after warm-up: 0.25, tps after warm-up: 40.5";
        let record = parse_marker_line(line).unwrap();
        assert_eq!(record, NodeMetricRecord::partial(7, 0.25, 40.5));
        assert!(record.is_partial());
        assert_eq!(record.total_tx, None);
    }

    #[test]
    fn test_malformed_number_falls_back() {
        // run time "0.1.2" breaks the full pattern's conversion, not the fallback
        let line = FULL_LINE.replace("run: 0.059161", "run: 0.1.2");
        let record = parse_marker_line(&line).unwrap();
        assert!(record.is_partial());
        assert_eq!(record.latency, 0.059161);
    }

    #[test]
    fn test_marker_without_numbers_yields_nothing() {
        assert_eq!(parse_marker_line("latency after warm-up: n/a"), None);
    }

    #[test]
    fn test_no_marker_line() {
        let extractor = MetricExtractor::default();
        assert_eq!(extractor.parse_log_text("starting node 0\nepoch 1 done\n"), None);
    }

    #[test]
    fn test_first_policy_takes_earliest_snapshot() {
        let content = format!("boot\n{}\n{}\n", snapshot(3, 0.5), snapshot(3, 0.2));
        let extractor = MetricExtractor::default();
        assert_eq!(extractor.policy(), MarkerPolicy::First);
        assert_eq!(extractor.parse_log_text(&content).unwrap().latency, 0.5);
    }

    #[test]
    fn test_last_policy_takes_latest_snapshot() {
        let content = format!("boot\n{}\n{}\n", snapshot(3, 0.5), snapshot(3, 0.2));
        let extractor = MetricExtractor::default().with_policy(MarkerPolicy::Last);
        assert_eq!(extractor.parse_log_text(&content).unwrap().latency, 0.2);
    }

    #[test]
    fn test_marker_line_is_trimmed() {
        let extractor = MetricExtractor::default();
        let content = format!("   {}   \n", FULL_LINE);
        assert_eq!(extractor.find_marker_line(&content), Some(FULL_LINE));
    }

    #[test]
    fn test_locate_logs_direct() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.stdout.log"), FULL_LINE).unwrap();
        std::fs::write(dir.path().join("0.stdout.log"), FULL_LINE).unwrap();
        std::fs::write(dir.path().join("0.stderr.log"), "noise").unwrap();

        let logs = MetricExtractor::default().locate_logs(dir.path()).unwrap();
        let names: Vec<_> = logs
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["0.stdout.log", "1.stdout.log"]);
    }

    #[test]
    fn test_locate_logs_nested_verbose_log() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join(VERBOSE_LOG_DIR);
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("0.stdout.log"), FULL_LINE).unwrap();

        let logs = MetricExtractor::default().locate_logs(dir.path()).unwrap();
        assert_eq!(logs, vec![nested.join("0.stdout.log")]);
    }

    #[test]
    fn test_locate_logs_sibling_verbose_log() {
        let dir = tempfile::tempdir().unwrap();
        let sibling = dir.path().join(VERBOSE_LOG_DIR);
        let other = dir.path().join("log");
        std::fs::create_dir(&sibling).unwrap();
        std::fs::create_dir(&other).unwrap();
        std::fs::write(sibling.join("2.stdout.log"), FULL_LINE).unwrap();

        let logs = MetricExtractor::default().locate_logs(&other).unwrap();
        assert_eq!(logs, vec![sibling.join("2.stdout.log")]);
    }

    #[test]
    fn test_locate_logs_missing_directory() {
        let logs = MetricExtractor::default()
            .locate_logs(Path::new("/nonexistent/verbose_log"))
            .unwrap();
        assert!(logs.is_empty());
    }

    #[test]
    fn test_extract_records_skips_logs_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0.stdout.log"), FULL_LINE).unwrap();
        std::fs::write(dir.path().join("1.stdout.log"), "crashed before metrics\n").unwrap();

        let records = MetricExtractor::default()
            .extract_records(dir.path())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].node, 0);
    }

    #[test]
    fn test_non_utf8_log_is_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0xff, 0xfe, b'\n'];
        bytes.extend_from_slice(FULL_LINE.as_bytes());
        std::fs::write(dir.path().join("0.stdout.log"), bytes).unwrap();

        let records = MetricExtractor::default()
            .extract_records(dir.path())
            .unwrap();
        assert_eq!(records.len(), 1);
    }
}
