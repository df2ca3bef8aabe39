//! Experiment parameters and their canonical directory names
//!
//! Every experiment is identified on disk by a name of the form
//! `{protocol}_N{N}_f{f}_B{B}_K{K}_C{C}`. Formatting and parsing live here and
//! nowhere else, so the runner and the aggregator cannot drift apart.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Size of one transaction in bytes; a batch of B transactions carries `250 * B` bytes
pub const TX_BYTES: u64 = 250;

/// Fault tolerance family of a protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultModel {
    /// Tolerates f < n/5 corrupted parties
    OneFifth,
    /// Tolerates f < n/3 corrupted parties (classic byzantine bound)
    OneThird,
}

impl FaultModel {
    /// Maximum number of tolerated faults for a network of `n` nodes
    pub fn max_faults(self, n: u32) -> u32 {
        let n = n.saturating_sub(1);
        match self {
            FaultModel::OneFifth => n / 5,
            FaultModel::OneThird => n / 3,
        }
    }
}

/// Errors produced when a directory name falls outside the canonical grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("'{0}' does not match {{protocol}}_N{{N}}_f{{f}}_B{{B}}_K{{K}}_C{{C}}")]
    Grammar(String),

    #[error("'{name}': field {field} has a leading zero")]
    LeadingZero { name: String, field: char },

    #[error("'{name}': field {field} is out of range")]
    OutOfRange { name: String, field: char },
}

/// One point in the parameter matrix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentParams {
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
}

impl ExperimentParams {
    /// Build parameters; `input_bytes` is derived from the batch size
    pub fn new(protocol: impl Into<String>, n: u32, f: u32, b: u32, k: u32, c: u32) -> Self {
        Self {
            protocol: protocol.into(),
            n,
            f,
            b,
            k,
            c,
            input_bytes: input_bytes_for(b),
        }
    }

    /// Canonical directory name for this experiment
    pub fn canonical_name(&self) -> String {
        format!(
            "{}_N{}_f{}_B{}_K{}_C{}",
            self.protocol, self.n, self.f, self.b, self.k, self.c
        )
    }

    /// Parse a canonical directory name back into parameters
    ///
    /// The grammar is strict: numbers must be plain decimal without leading
    /// zeros and fit in `u32`, and the protocol must be non-empty ASCII
    /// alphanumeric. Anything else is rejected rather than guessed at.
    pub fn from_canonical_name(name: &str) -> Result<Self, NameError> {
        let caps = name_pattern()
            .captures(name)
            .ok_or_else(|| NameError::Grammar(name.to_string()))?;

        let mut fields = [0u32; 5];
        for (slot, (group, field)) in fields
            .iter_mut()
            .zip([(2, 'N'), (3, 'f'), (4, 'B'), (5, 'K'), (6, 'C')])
        {
            let digits = &caps[group];
            if digits.len() > 1 && digits.starts_with('0') {
                return Err(NameError::LeadingZero {
                    name: name.to_string(),
                    field,
                });
            }
            *slot = digits.parse().map_err(|_| NameError::OutOfRange {
                name: name.to_string(),
                field,
            })?;
        }

        let [n, f, b, k, c] = fields;
        Ok(Self::new(&caps[1], n, f, b, k, c))
    }

    /// Positional launcher arguments: `N f B K C protocol`
    pub fn launcher_args(&self) -> [String; 6] {
        [
            self.n.to_string(),
            self.f.to_string(),
            self.b.to_string(),
            self.k.to_string(),
            self.c.to_string(),
            self.protocol.clone(),
        ]
    }
}

impl fmt::Display for ExperimentParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

impl FromStr for ExperimentParams {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_canonical_name(s)
    }
}

/// Input size in bytes for a batch of `b` transactions
pub fn input_bytes_for(b: u32) -> u64 {
    TX_BYTES * u64::from(b)
}

/// Whether `name` can appear as the protocol part of a canonical name
pub fn is_valid_protocol_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([a-zA-Z0-9]+)_N([0-9]+)_f([0-9]+)_B([0-9]+)_K([0-9]+)_C([0-9]+)$")
            .expect("canonical name pattern is valid")
    })
}
