//! Experiment matrix generation
//!
//! The matrix is the cartesian product of protocols, network sizes and batch
//! sizes, in that nesting order. Rows whose fault threshold would be zero are
//! dropped since the protocols need at least one tolerated fault.

use crate::config::HarnessConfig;
use crate::csv_output::{read_rows, rows_to_csv};
use crate::params::{input_bytes_for, is_valid_protocol_name, ExperimentParams};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Column layout of the matrix file
pub const MATRIX_COLUMNS: [&str; 7] = ["protocol", "N", "f", "B", "K", "C", "input_bytes"];

/// Counts describing a generated matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixSummary {
    pub protocols: usize,
    pub network_sizes: usize,
    pub batch_sizes: usize,
    pub rows: usize,
    /// Combinations dropped because f < 1
    pub dropped: usize,
    /// Total protocol instances executed across all rows (rows x K)
    pub instances: u64,
}

/// Ordered experiment matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentMatrix {
    rows: Vec<ExperimentParams>,
    dropped: usize,
}

impl ExperimentMatrix {
    /// Enumerate the matrix described by `config` (protocol-major, then N, then B)
    pub fn generate(config: &HarnessConfig) -> Self {
        let matrix = &config.matrix;
        let mut rows = Vec::new();
        let mut dropped = 0;

        for protocol in &config.protocols {
            for &n in &matrix.network_sizes {
                let f = protocol.fault_model.max_faults(n);
                if f < 1 {
                    debug!(protocol = %protocol.name, n, "Skipping network size with f < 1");
                    dropped += matrix.batch_sizes.len();
                    continue;
                }
                for &b in &matrix.batch_sizes {
                    rows.push(ExperimentParams::new(
                        &protocol.name,
                        n,
                        f,
                        b,
                        matrix.repetitions,
                        matrix.warmup,
                    ));
                }
            }
        }

        Self { rows, dropped }
    }

    pub fn from_rows(rows: Vec<ExperimentParams>) -> Self {
        Self { rows, dropped: 0 }
    }

    pub fn rows(&self) -> &[ExperimentParams] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self, config: &HarnessConfig) -> MatrixSummary {
        MatrixSummary {
            protocols: config.protocols.len(),
            network_sizes: config.matrix.network_sizes.len(),
            batch_sizes: config.matrix.batch_sizes.len(),
            rows: self.rows.len(),
            dropped: self.dropped,
            instances: self.rows.iter().map(|r| u64::from(r.k)).sum(),
        }
    }

    /// Serialize as CSV with header `protocol,N,f,B,K,C,input_bytes`
    pub fn to_csv(&self) -> Result<String> {
        rows_to_csv(&MATRIX_COLUMNS, &self.rows)
    }

    /// Human-readable Markdown mirror of the CSV
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str("# Experiment Matrix\n\n");
        md.push_str("| Protocol | N | f | B | K | C | Input (bytes) |\n");
        md.push_str("|----------|---|----|---|----|---|---------------|\n");
        for row in &self.rows {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                row.protocol, row.n, row.f, row.b, row.k, row.c, row.input_bytes
            ));
        }
        md
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_csv()?)
            .with_context(|| format!("Failed to write matrix CSV: {}", path.display()))
    }

    pub fn write_markdown<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_markdown())
            .with_context(|| format!("Failed to write matrix Markdown: {}", path.display()))
    }

    /// Load a matrix CSV written by [`ExperimentMatrix::write_csv`]
    ///
    /// Rows whose protocol could not form a canonical name are skipped; the
    /// protocol is handed to the launcher shell as a bare word.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let read: Vec<ExperimentParams> = read_rows(path)
            .with_context(|| format!("Failed to load matrix file: {}", path.display()))?;
        let mut rows = Vec::with_capacity(read.len());
        for (index, mut row) in read.into_iter().enumerate() {
            if !is_valid_protocol_name(&row.protocol) {
                warn!(row = index, protocol = %row.protocol, "Skipping row with invalid protocol name");
                continue;
            }
            let expected = input_bytes_for(row.b);
            if row.input_bytes != expected {
                warn!(
                    row = index,
                    found = row.input_bytes,
                    expected,
                    "input_bytes disagrees with batch size, correcting"
                );
                row.input_bytes = expected;
            }
            rows.push(row);
        }

        Ok(Self::from_rows(rows))
    }
}
