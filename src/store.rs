//! Result store: the per-experiment directory tree under the results root
//!
//! Layout of one experiment directory:
//!
//! ```text
//! <root>/<canonical name>/
//!     summary.txt      aggregate metrics with an embedded JSON object
//!     metrics.csv      per-node metrics
//!     experiment.log   human-readable run record
//!     outcome.json     tagged run record
//!     verbose_log/     relocated per-process logs
//!     log/             relocated launcher logs
//! ```

use crate::metrics::{node_records_csv, ExperimentSummary, NodeMetricRecord};
use crate::params::ExperimentParams;
use crate::record::{RunFlags, RunRecord};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SUMMARY_FILE: &str = "summary.txt";
pub const NODE_METRICS_FILE: &str = "metrics.csv";
pub const RUN_LOG_FILE: &str = "experiment.log";
pub const RUN_RECORD_FILE: &str = "outcome.json";

/// Arena for isolated per-run working directories
pub const WORK_DIR: &str = ".work";

/// One immediate subdirectory of the results root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEntry {
    Experiment(ExperimentParams),
    Unrecognized { name: String, reason: String },
}

/// Read access to stored experiment results
pub trait ResultStore {
    /// All entries, sorted by directory name
    fn entries(&self) -> Result<Vec<StoreEntry>>;

    /// Stored summary, if one exists and parses
    fn summary(&self, params: &ExperimentParams) -> Option<ExperimentSummary>;

    /// Run flags from the best available run record
    fn run_flags(&self, params: &ExperimentParams) -> Option<RunFlags>;

    /// Whether the human-readable `experiment.log` exists
    fn has_run_log(&self, params: &ExperimentParams) -> bool;

    fn has_run_record(&self, params: &ExperimentParams) -> bool {
        self.run_flags(params).is_some()
    }
}

/// Filesystem-backed store rooted at one results directory
#[derive(Debug, Clone)]
pub struct FsResultStore {
    root: PathBuf,
}

impl FsResultStore {
    /// Open an existing results root
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            bail!("Results directory not found: {}", root.display());
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Open a results root, creating it if needed
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create results directory: {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn experiment_dir(&self, params: &ExperimentParams) -> PathBuf {
        self.root.join(params.canonical_name())
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root.join(WORK_DIR)
    }

    /// Allocate (or reuse) the experiment directory
    pub fn prepare(&self, params: &ExperimentParams) -> Result<PathBuf> {
        let dir = self.experiment_dir(params);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create experiment directory: {}", dir.display()))?;
        Ok(dir)
    }

    /// An experiment counts as completed once its summary exists
    pub fn is_completed(&self, params: &ExperimentParams) -> bool {
        self.experiment_dir(params).join(SUMMARY_FILE).is_file()
    }

    pub fn write_summary(&self, params: &ExperimentParams, summary: &ExperimentSummary) -> Result<()> {
        let path = self.experiment_dir(params).join(SUMMARY_FILE);
        std::fs::write(&path, summary.to_text()?)
            .with_context(|| format!("Failed to write summary: {}", path.display()))
    }

    pub fn write_node_metrics(&self, params: &ExperimentParams, records: &[NodeMetricRecord]) -> Result<()> {
        let path = self.experiment_dir(params).join(NODE_METRICS_FILE);
        std::fs::write(&path, node_records_csv(records)?)
            .with_context(|| format!("Failed to write node metrics: {}", path.display()))
    }

    /// Write both run records for `record.params`
    pub fn write_run_record(&self, record: &RunRecord, output: &str) -> Result<()> {
        let dir = self.experiment_dir(&record.params);
        let log_path = dir.join(RUN_LOG_FILE);
        std::fs::write(&log_path, record.to_log_text(output)?)
            .with_context(|| format!("Failed to write run log: {}", log_path.display()))?;

        let json_path = dir.join(RUN_RECORD_FILE);
        std::fs::write(&json_path, record.to_json()?)
            .with_context(|| format!("Failed to write run record: {}", json_path.display()))
    }

    /// Structured run record, if present and readable under the current schema
    pub fn run_record(&self, params: &ExperimentParams) -> Option<RunRecord> {
        let path = self.experiment_dir(params).join(RUN_RECORD_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        match RunRecord::from_json(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    "Run record schema problem in {}: {}; falling back to {}",
                    path.display(),
                    e,
                    RUN_LOG_FILE
                );
                None
            }
        }
    }
}

impl ResultStore for FsResultStore {
    fn entries(&self) -> Result<Vec<StoreEntry>> {
        let mut names = Vec::new();
        let dir = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list results directory: {}", self.root.display()))?;
        for entry in dir {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        Ok(names
            .into_iter()
            .filter(|name| {
                if name == WORK_DIR {
                    debug!("Skipping isolated run arena {}", name);
                    return false;
                }
                true
            })
            .map(|name| match ExperimentParams::from_canonical_name(&name) {
                Ok(params) => StoreEntry::Experiment(params),
                Err(e) => StoreEntry::Unrecognized {
                    name,
                    reason: e.to_string(),
                },
            })
            .collect())
    }

    fn summary(&self, params: &ExperimentParams) -> Option<ExperimentSummary> {
        let path = self.experiment_dir(params).join(SUMMARY_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        match ExperimentSummary::from_text(&content) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Could not read summary {}: {}", path.display(), e);
                None
            }
        }
    }

    fn run_flags(&self, params: &ExperimentParams) -> Option<RunFlags> {
        if let Some(record) = self.run_record(params) {
            return Some(RunFlags::from_record(&record));
        }
        let path = self.experiment_dir(params).join(RUN_LOG_FILE);
        let bytes = std::fs::read(&path).ok()?;
        Some(RunFlags::scan_log_text(&String::from_utf8_lossy(&bytes)))
    }

    fn has_run_log(&self, params: &ExperimentParams) -> bool {
        self.experiment_dir(params).join(RUN_LOG_FILE).is_file()
    }
}
