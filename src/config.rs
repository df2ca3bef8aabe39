//! Harness configuration loaded from TOML
//!
//! A default configuration is compiled into the binary
//! (`harness-default.toml`) so every subcommand works with zero setup.
//!
//! # Example TOML
//! ```toml
//! [matrix]
//! network_sizes = [6, 16]
//! batch_sizes = [10, 1000]
//! repetitions = 10
//! warmup = 0
//!
//! [[protocol]]
//! name = "hmvba"
//! fault_model = "one-fifth"
//!
//! [[protocol]]
//! name = "finmvba"
//! fault_model = "one-third"
//! reference = { latency_speedup = 11.7, throughput_speedup = 14.3 }
//!
//! [analysis]
//! subject = "hmvba"
//! baselines = ["finmvba"]
//! ```

use crate::metrics::MarkerPolicy;
use crate::params::{is_valid_protocol_name, FaultModel};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TOML: &str = include_str!("../harness-default.toml");

/// Validation failures for a loaded configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("matrix.{0} must not be empty")]
    EmptyEnumeration(&'static str),

    #[error("at least one [[protocol]] entry is required")]
    NoProtocols,

    #[error("protocol name '{0}' must be non-empty ASCII alphanumeric")]
    InvalidProtocolName(String),

    #[error("protocol '{0}' is defined more than once")]
    DuplicateProtocol(String),

    #[error("analysis.{role} names unknown protocol '{name}'")]
    UnknownProtocol { role: &'static str, name: String },

    #[error("protocol '{0}' cannot be both subject and baseline")]
    SubjectIsBaseline(String),

    #[error("launcher.scratch_dirs entry '{0}' must be a plain directory name")]
    InvalidScratchDir(String),

    #[error("launcher.timeout_secs must be positive")]
    ZeroTimeout,
}

/// Complete harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    pub matrix: MatrixConfig,

    #[serde(rename = "protocol")]
    pub protocols: Vec<ProtocolConfig>,

    #[serde(default)]
    pub launcher: LauncherConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    pub analysis: AnalysisConfig,
}

/// Enumerations spanning the parameter matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixConfig {
    pub network_sizes: Vec<u32>,
    pub batch_sizes: Vec<u32>,
    /// Protocol instances per experiment (K)
    pub repetitions: u32,
    /// Warm-up instances excluded from metrics (C)
    pub warmup: u32,
}

/// One protocol under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Name passed to the launcher and used in directory names
    pub name: String,

    /// Display name for reports
    #[serde(default)]
    pub label: Option<String>,

    pub fault_model: FaultModel,

    /// Published speedups of the subject over this protocol
    #[serde(default)]
    pub reference: Option<ReferenceClaim>,
}

/// Externally reported maximum speedups, used for narrative comparison only
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceClaim {
    pub latency_speedup: f64,
    pub throughput_speedup: f64,
}

/// External launcher and scratch space
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    /// Shell command; `N f B K C protocol` are appended
    pub command: String,
    /// Working directory the launcher runs in and writes scratch logs to
    pub workdir: PathBuf,
    /// Directories the launcher populates, relative to the working directory
    pub scratch_dirs: Vec<String>,
    pub timeout_secs: u64,
    pub pause_secs: u64,
    /// Give every run its own working directory under the results root
    pub isolate_runs: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            command: "bash run_local_network_mvba_test.sh".to_string(),
            workdir: PathBuf::from("."),
            scratch_dirs: vec!["verbose_log".to_string(), "log".to_string()],
            timeout_secs: 600,
            pause_secs: 2,
            isolate_runs: false,
        }
    }
}

impl LauncherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }
}

/// Metric marker grammar settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Substring identifying the per-process metric line
    pub marker: String,
    /// File name suffix of per-process logs
    pub log_suffix: String,
    pub policy: MarkerPolicy,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            marker: "latency after warm-up".to_string(),
            log_suffix: ".stdout.log".to_string(),
            policy: MarkerPolicy::First,
        }
    }
}

/// Comparative analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    pub subject: String,
    pub baselines: Vec<String>,
    #[serde(default = "default_latency_plot_sizes")]
    pub latency_plot_network_sizes: Vec<u32>,
    #[serde(default = "default_throughput_batch")]
    pub throughput_plot_batch_size: u32,
    #[serde(default)]
    pub extended_network_sizes: Vec<u32>,
}

fn default_latency_plot_sizes() -> Vec<u32> {
    vec![6, 16, 31]
}

fn default_throughput_batch() -> u32 {
    1000
}

impl HarnessConfig {
    /// Configuration compiled into the binary
    pub fn embedded_default() -> Result<Self> {
        Self::from_toml_str(DEFAULT_TOML).context("Failed to parse embedded harness-default.toml")
    }

    /// Load and validate a configuration file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// `--config` file when given, embedded default otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_toml_file(path),
            None => Self::embedded_default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.matrix.network_sizes.is_empty() {
            return Err(ConfigError::EmptyEnumeration("network_sizes"));
        }
        if self.matrix.batch_sizes.is_empty() {
            return Err(ConfigError::EmptyEnumeration("batch_sizes"));
        }
        if self.protocols.is_empty() {
            return Err(ConfigError::NoProtocols);
        }

        let mut seen = HashSet::new();
        for protocol in &self.protocols {
            if !is_valid_protocol_name(&protocol.name) {
                return Err(ConfigError::InvalidProtocolName(protocol.name.clone()));
            }
            if !seen.insert(protocol.name.as_str()) {
                return Err(ConfigError::DuplicateProtocol(protocol.name.clone()));
            }
        }

        if !seen.contains(self.analysis.subject.as_str()) {
            return Err(ConfigError::UnknownProtocol {
                role: "subject",
                name: self.analysis.subject.clone(),
            });
        }
        for baseline in &self.analysis.baselines {
            if !seen.contains(baseline.as_str()) {
                return Err(ConfigError::UnknownProtocol {
                    role: "baselines",
                    name: baseline.clone(),
                });
            }
            if *baseline == self.analysis.subject {
                return Err(ConfigError::SubjectIsBaseline(baseline.clone()));
            }
        }

        for dir in &self.launcher.scratch_dirs {
            let plain = !dir.is_empty()
                && dir != "."
                && dir != ".."
                && !dir.contains(['/', '\\']);
            if !plain {
                return Err(ConfigError::InvalidScratchDir(dir.clone()));
            }
        }
        if self.launcher.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }

    pub fn protocol(&self, name: &str) -> Option<&ProtocolConfig> {
        self.protocols.iter().find(|p| p.name == name)
    }

    /// Display label for a protocol, falling back to its name
    pub fn label<'a>(&'a self, name: &'a str) -> &'a str {
        self.protocol(name)
            .and_then(|p| p.label.as_deref())
            .unwrap_or(name)
    }
}
