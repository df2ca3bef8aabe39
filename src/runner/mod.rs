//! Experiment runner
//!
//! Executes matrix rows one at a time: acquire the scratch space, invoke the
//! launcher under a wall-clock bound, relocate its logs into the experiment
//! directory, extract metrics and persist the run record. Failures of a single
//! experiment are recorded in its directory and never abort a batch.

mod launcher;
mod scratch;

pub use launcher::{LaunchStatus, Launcher};
pub use scratch::{ScratchLease, ScratchSpace, LOCK_FILE};

use crate::config::HarnessConfig;
use crate::matrix::ExperimentMatrix;
use crate::metrics::{extract_directory, MetricExtractor, VERBOSE_LOG_DIR};
use crate::outcome::{Execution, Extraction, RunOutcome};
use crate::params::ExperimentParams;
use crate::record::{RunRecord, START_TIME_FORMAT};
use crate::store::{FsResultStore, ResultStore};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Which slice of the matrix a batch covers
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// 0-based index of the first row
    pub start: usize,
    /// Maximum number of rows to consider, skipped rows included
    pub limit: Option<usize>,
    pub skip_completed: bool,
}

/// Counters accumulated over a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct Runner {
    launcher: Launcher,
    workdir: PathBuf,
    scratch_dirs: Vec<String>,
    isolate_runs: bool,
    timeout: Duration,
    pause: Duration,
    extractor: MetricExtractor,
    store: FsResultStore,
}

impl Runner {
    pub fn new(config: &HarnessConfig, store: FsResultStore) -> Self {
        let launcher_config = &config.launcher;
        Self {
            launcher: Launcher::new(&launcher_config.command),
            workdir: launcher_config.workdir.clone(),
            scratch_dirs: launcher_config.scratch_dirs.clone(),
            isolate_runs: launcher_config.isolate_runs,
            timeout: launcher_config.timeout(),
            pause: launcher_config.pause(),
            extractor: MetricExtractor::new(&config.metrics),
            store,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn store(&self) -> &FsResultStore {
        &self.store
    }

    /// Execute one experiment and persist its results
    pub fn run_experiment(&self, params: &ExperimentParams) -> RunOutcome {
        let name = params.canonical_name();
        info!("=== Starting experiment: {} ===", name);

        let start_time = chrono::Local::now();
        let (space, launcher) = if self.isolate_runs {
            (
                ScratchSpace::isolated(
                    &self.store.work_dir(),
                    &name,
                    start_time.timestamp_millis(),
                    &self.scratch_dirs,
                ),
                self.launcher.resolved_against(&self.workdir),
            )
        } else {
            (
                ScratchSpace::shared(&self.workdir, &self.scratch_dirs),
                self.launcher.clone(),
            )
        };
        let args = params.launcher_args();
        let command_line = launcher.command_line(&args);

        let exp_dir = match self.store.prepare(params) {
            Ok(exp_dir) => exp_dir,
            Err(e) => {
                error!("{:#}", e);
                return RunOutcome::launch_failed(format!("{:#}", e));
            }
        };

        let lease = match space.acquire() {
            Ok(lease) => lease,
            Err(e) => {
                // The holder may be writing this very experiment directory
                let outcome = RunOutcome::launch_failed(format!("{:#}", e));
                if !self.store.has_run_record(params) {
                    self.persist(params, command_line, &start_time, &outcome);
                }
                warn!("=== Experiment {} not started: {} ===", name, outcome.output);
                return outcome;
            }
        };

        let (execution, output, elapsed) = self.execute(lease, &launcher, &args, &exp_dir);
        let outcome = RunOutcome {
            execution,
            extraction: self.extract(params, &exp_dir),
            elapsed,
            output,
        };
        self.persist(params, command_line, &start_time, &outcome);

        match outcome.failure_reason() {
            None => info!(
                "=== Experiment {} succeeded in {:.1}s ===",
                name,
                outcome.elapsed.as_secs_f64()
            ),
            Some(reason) => warn!(
                "=== Experiment {} failed after {:.1}s: {} ===",
                name,
                outcome.elapsed.as_secs_f64(),
                reason
            ),
        }
        outcome
    }

    fn persist(
        &self,
        params: &ExperimentParams,
        command_line: String,
        start_time: &chrono::DateTime<chrono::Local>,
        outcome: &RunOutcome,
    ) {
        let record = RunRecord::new(
            params,
            command_line,
            start_time.format(START_TIME_FORMAT).to_string(),
            outcome,
        );
        if let Err(e) = self.store.write_run_record(&record, &outcome.output) {
            error!(
                "Failed to persist run record for {}: {:#}",
                params.canonical_name(),
                e
            );
        }
    }

    /// Launch under the scratch lease and relocate the logs it produced
    fn execute(
        &self,
        lease: ScratchLease,
        launcher: &Launcher,
        args: &[String],
        exp_dir: &std::path::Path,
    ) -> (Execution, String, Duration) {
        let started = Instant::now();
        let result = match launcher.run(lease.workdir(), args, self.timeout) {
            LaunchStatus::Exited { code, output } => {
                (Execution::Exited { code }, output, started.elapsed())
            }
            LaunchStatus::TimedOut => (
                Execution::TimedOut {
                    after_secs: self.timeout.as_secs(),
                },
                format!("Timeout after {} seconds", self.timeout.as_secs()),
                self.timeout,
            ),
            LaunchStatus::Failed(e) => {
                let reason = e.to_string();
                (
                    Execution::LaunchFailed {
                        reason: reason.clone(),
                    },
                    reason,
                    started.elapsed(),
                )
            }
        };

        if let Err(e) = lease.relocate_into(exp_dir) {
            warn!("Failed to relocate scratch logs: {:#}", e);
        }
        result
    }

    /// Extract metrics from the relocated per-process logs
    fn extract(&self, params: &ExperimentParams, exp_dir: &std::path::Path) -> Extraction {
        let log_dir = exp_dir.join(VERBOSE_LOG_DIR);
        if !log_dir.is_dir() {
            return Extraction::NoLogs;
        }

        let metrics = match extract_directory(&self.extractor, &log_dir) {
            Ok(metrics) => metrics,
            Err(e) => {
                return Extraction::Failed {
                    reason: format!("{:#}", e),
                }
            }
        };
        let Some(summary) = metrics.summary else {
            return Extraction::NoMetrics;
        };

        if let Err(e) = self.store.write_summary(params, &summary) {
            error!("{:#}", e);
        }
        if let Err(e) = self.store.write_node_metrics(params, &metrics.records) {
            error!("{:#}", e);
        }
        Extraction::Extracted { summary }
    }

    /// Run a slice of the matrix sequentially
    pub fn run_batch(&self, matrix: &ExperimentMatrix, options: BatchOptions) -> BatchTally {
        let total = matrix.len();
        let rows = matrix
            .rows()
            .iter()
            .enumerate()
            .skip(options.start)
            .take(options.limit.unwrap_or(usize::MAX));

        let mut tally = BatchTally::default();
        for (index, params) in rows {
            if options.skip_completed && self.store.is_completed(params) {
                info!("[{}/{}] Skipping completed experiment {}", index + 1, total, params);
                tally.skipped += 1;
                continue;
            }

            if tally.attempted > 0 && !self.pause.is_zero() {
                std::thread::sleep(self.pause);
            }

            info!("[{}/{}] Running {}", index + 1, total, params);
            tally.attempted += 1;
            if self.run_experiment(params).success() {
                tally.succeeded += 1;
            } else {
                tally.failed += 1;
            }
        }

        info!(
            "Batch finished: {} attempted, {} succeeded, {} failed, {} skipped",
            tally.attempted, tally.succeeded, tally.failed, tally.skipped
        );
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ResultStore, RUN_LOG_FILE, RUN_RECORD_FILE, SUMMARY_FILE};
    use tempfile::TempDir;

    const MARKER_SCRIPT: &str = r#"#!/bin/sh
# args: N f B K C protocol
i=0
while [ "$i" -lt "$1" ]; do
  echo "node: $i epoch: 10 run: 1.0 total delivered Txs after warm-up: 100 latency after warm-up: 0.0$((i + 5)) tps after warm-up: 100.0 average latency by rounds + stddev: 0.05 0.001 average tps by rounds + stddev: 100.0 1.0" > "verbose_log/$i.stdout.log"
  i=$((i + 1))
done
echo launched "$6"
"#;

    fn setup(script: &str) -> (TempDir, TempDir, Runner) {
        let work = TempDir::new().unwrap();
        let results = TempDir::new().unwrap();
        std::fs::write(work.path().join("launch.sh"), script).unwrap();

        let mut config = HarnessConfig::embedded_default().unwrap();
        config.launcher.command = "sh launch.sh".to_string();
        config.launcher.workdir = work.path().to_path_buf();
        let store = FsResultStore::open(results.path()).unwrap();
        let runner = Runner::new(&config, store)
            .with_timeout(Duration::from_secs(20))
            .with_pause(Duration::ZERO);
        (work, results, runner)
    }

    #[test]
    fn test_successful_run_persists_everything() {
        let (_work, results, runner) = setup(MARKER_SCRIPT);
        let params = ExperimentParams::new("hmvba", 3, 1, 10, 10, 0);

        let outcome = runner.run_experiment(&params);
        assert!(outcome.success(), "{:?}", outcome.failure_reason());
        assert!(outcome.output.contains("launched hmvba"));
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.num_nodes, 3);
        assert_eq!(summary.latency_mean, 0.060000000000000005);

        let exp = results.path().join("hmvba_N3_f1_B10_K10_C0");
        for file in [SUMMARY_FILE, RUN_LOG_FILE, RUN_RECORD_FILE, "metrics.csv"] {
            assert!(exp.join(file).is_file(), "missing {}", file);
        }
        assert!(exp.join("verbose_log/0.stdout.log").is_file());
        assert!(exp.join("log").is_dir());
        assert_eq!(runner.store().summary(&params).as_ref(), Some(summary));
    }

    #[test]
    fn test_launcher_without_logs() {
        let (_work, _results, runner) = setup("rmdir verbose_log; exit 0\n");
        let params = ExperimentParams::new("hmvba", 6, 1, 0, 10, 0);

        let outcome = runner.run_experiment(&params);
        assert!(!outcome.success());
        assert_eq!(outcome.extraction, Extraction::NoLogs);
        assert!(!runner.store().is_completed(&params));
        assert!(runner.store().has_run_record(&params));
    }

    #[test]
    fn test_logs_without_marker() {
        let (_work, _results, runner) = setup("echo booting > verbose_log/0.stdout.log\n");
        let outcome = runner.run_experiment(&ExperimentParams::new("hmvba", 6, 1, 0, 10, 0));
        assert_eq!(outcome.execution, Execution::Exited { code: Some(0) });
        assert_eq!(outcome.extraction, Extraction::NoMetrics);
        assert!(!outcome.success());
    }

    #[test]
    fn test_busy_scratch_space_is_launch_failure() {
        let (work, _results, runner) = setup(MARKER_SCRIPT);
        let params = ExperimentParams::new("hmvba", 3, 1, 10, 10, 0);
        std::fs::write(work.path().join(LOCK_FILE), format!("{}\n", std::process::id())).unwrap();

        let outcome = runner.run_experiment(&params);
        assert!(matches!(outcome.execution, Execution::LaunchFailed { .. }));
        assert_eq!(outcome.extraction, Extraction::NoLogs);
        assert!(outcome.output.contains("is busy"));
        assert!(!outcome.success());
        // first attempt at this row still leaves a record behind
        assert!(!runner.store().run_flags(&params).unwrap().success);
    }

    #[test]
    fn test_busy_scratch_space_keeps_previous_results() {
        let (work, results, runner) = setup(MARKER_SCRIPT);
        let params = ExperimentParams::new("hmvba", 3, 1, 10, 10, 0);
        assert!(runner.run_experiment(&params).success());
        let exp = results.path().join(params.canonical_name());
        let record_before = std::fs::read_to_string(exp.join(RUN_RECORD_FILE)).unwrap();

        std::fs::write(work.path().join(LOCK_FILE), format!("{}\n", std::process::id())).unwrap();
        let outcome = runner.run_experiment(&params);
        assert!(matches!(outcome.execution, Execution::LaunchFailed { .. }));
        assert_eq!(outcome.extraction, Extraction::NoLogs);

        assert_eq!(
            std::fs::read_to_string(exp.join(RUN_RECORD_FILE)).unwrap(),
            record_before
        );
        assert!(runner.store().is_completed(&params));
        assert!(runner.store().run_flags(&params).unwrap().success);
    }

    #[test]
    fn test_stale_lock_does_not_block_run() {
        let (work, _results, runner) = setup(MARKER_SCRIPT);
        let mut exited = std::process::Command::new("true").spawn().unwrap();
        let pid = exited.id();
        exited.wait().unwrap();
        std::fs::write(work.path().join(LOCK_FILE), format!("{}\n", pid)).unwrap();

        let outcome = runner.run_experiment(&ExperimentParams::new("hmvba", 3, 1, 10, 10, 0));
        assert!(outcome.success(), "{:?}", outcome.failure_reason());
        assert!(!work.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_isolated_runs_leave_shared_workdir_untouched() {
        let (work, results, _) = setup(MARKER_SCRIPT);
        let mut config = HarnessConfig::embedded_default().unwrap();
        config.launcher.command = "sh launch.sh".to_string();
        config.launcher.workdir = work.path().to_path_buf();
        config.launcher.isolate_runs = true;
        let runner = Runner::new(&config, FsResultStore::open(results.path()).unwrap());

        let outcome = runner.run_experiment(&ExperimentParams::new("hmvba", 3, 1, 10, 10, 0));
        assert!(outcome.success(), "{:?}", outcome.failure_reason());
        assert!(!work.path().join("verbose_log").exists());
        let arena: Vec<_> = std::fs::read_dir(results.path().join(".work"))
            .unwrap()
            .collect();
        assert!(arena.is_empty());
    }

    #[test]
    fn test_batch_skip_completed_and_limit() {
        let (_work, _results, runner) = setup(MARKER_SCRIPT);
        let matrix = ExperimentMatrix::from_rows(vec![
            ExperimentParams::new("hmvba", 3, 1, 10, 10, 0),
            ExperimentParams::new("hmvba", 4, 1, 10, 10, 0),
            ExperimentParams::new("hmvba", 5, 1, 10, 10, 0),
        ]);

        let first = runner.run_batch(
            &matrix,
            BatchOptions {
                start: 0,
                limit: Some(2),
                skip_completed: true,
            },
        );
        assert_eq!(
            first,
            BatchTally {
                attempted: 2,
                succeeded: 2,
                failed: 0,
                skipped: 0
            }
        );

        let second = runner.run_batch(
            &matrix,
            BatchOptions {
                skip_completed: true,
                ..Default::default()
            },
        );
        assert_eq!(second.skipped, 2);
        assert_eq!(second.attempted, 1);
        assert_eq!(second.succeeded, 1);
    }

    #[test]
    fn test_batch_start_offset() {
        let (_work, _results, runner) = setup("exit 1\n");
        let matrix = ExperimentMatrix::from_rows(vec![
            ExperimentParams::new("hmvba", 6, 1, 0, 10, 0),
            ExperimentParams::new("hmvba", 6, 1, 10, 10, 0),
        ]);
        let tally = runner.run_batch(
            &matrix,
            BatchOptions {
                start: 1,
                ..Default::default()
            },
        );
        assert_eq!(tally.attempted, 1);
        assert_eq!(tally.failed, 1);
        assert!(!runner
            .store()
            .has_run_record(&ExperimentParams::new("hmvba", 6, 1, 0, 10, 0)));
    }
}
