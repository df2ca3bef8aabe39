//! CLI argument parsing for mvbench

use crate::metrics::MarkerPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mvbench")]
#[command(version)]
#[command(about = "Benchmark harness for MVBA protocol implementations", long_about = None)]
pub struct Cli {
    /// Harness configuration file (TOML); the built-in defaults are used when omitted
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the experiment matrix (CSV plus a Markdown mirror)
    Matrix {
        #[arg(short, long, default_value = "experiment_matrix.csv")]
        output: PathBuf,

        #[arg(long, default_value = "experiment_matrix.md")]
        markdown: PathBuf,
    },

    /// Run experiments from a matrix file
    Run {
        #[arg(long, default_value = "experiment_matrix.csv")]
        matrix: PathBuf,

        /// Results root; one directory per experiment is created inside it
        #[arg(long, default_value = "results")]
        results: PathBuf,

        /// Per-experiment timeout in seconds (overrides the configuration)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Skip experiments whose directory already holds a summary
        #[arg(long)]
        skip_completed: bool,

        /// 0-based index of the first matrix row to run
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Maximum number of matrix rows to process
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Extract metrics from a directory of per-process logs
    Parse {
        log_dir: PathBuf,

        /// Also write the per-node metrics table here
        csv_out: Option<PathBuf>,

        /// Which marker line to use when a log contains several
        #[arg(long, value_enum)]
        policy: Option<MarkerPolicy>,
    },

    /// Collect all experiment directories into one table and a status report
    Aggregate {
        #[arg(long, default_value = "results")]
        results: PathBuf,

        #[arg(short, long, default_value = "aggregated_results.csv")]
        output: PathBuf,

        #[arg(long, default_value = "experiment_summary.md")]
        report: PathBuf,
    },

    /// Write plot data and the speedup analysis
    Analyze {
        #[arg(short, long, default_value = "aggregated_results.csv")]
        input: PathBuf,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Write the Markdown comparison tables
    Tables {
        #[arg(short, long, default_value = "aggregated_results.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "comparison_tables.md")]
        output: PathBuf,
    },

    /// Extend plot data with extended network sizes and write the complete tables
    Augment {
        #[arg(short, long, default_value = "aggregated_results.csv")]
        input: PathBuf,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}
