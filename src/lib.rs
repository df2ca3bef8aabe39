//! mvbench - benchmark harness for MVBA consensus protocol implementations
//!
//! The harness enumerates an experiment matrix, drives an external launcher
//! under a wall-clock bound, extracts per-process metrics from its logs, and
//! turns the collected results into aggregate tables, plot data and
//! subject-versus-baseline speedup reports.

pub mod aggregate;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod csv_output;
pub mod matrix;
pub mod metrics;
pub mod outcome;
pub mod params;
pub mod record;
pub mod runner;
pub mod stats;
pub mod store;
