//! Shared fixtures for integration tests: fake launchers and configs

#![allow(dead_code)]

use mvbench::config::HarnessConfig;
use std::path::Path;

/// Writes one marker line per node; node i reports latency 0.0{i+5}
pub const MARKER_LAUNCHER: &str = r#"#!/bin/sh
# args: N f B K C protocol
i=0
while [ "$i" -lt "$1" ]; do
  echo "node: $i epoch: 10 run: 1.0 total delivered Txs after warm-up: 100 latency after warm-up: 0.0$((i + 5)) tps after warm-up: 100.0 average latency by rounds + stddev: 0.05 0.001 average tps by rounds + stddev: 100.0 1.0" > "verbose_log/$i.stdout.log"
  i=$((i + 1))
done
echo "started $6 with N=$1 B=$3"
"#;

/// Never finishes on its own; the background child must die with the group
pub const HANGING_LAUNCHER: &str = "sleep 30 &\nsleep 30\nwait\n";

/// Exits cleanly without producing any per-process log
pub const SILENT_LAUNCHER: &str = "rmdir verbose_log\nexit 0\n";

/// Embedded default config pointed at `launch.sh` inside `workdir`
pub fn launcher_config(workdir: &Path, script: &str) -> HarnessConfig {
    std::fs::write(workdir.join("launch.sh"), script).unwrap();
    let mut config = HarnessConfig::embedded_default().unwrap();
    config.launcher.command = "sh launch.sh".to_string();
    config.launcher.workdir = workdir.to_path_buf();
    config.launcher.pause_secs = 0;
    config
}

/// Minimal TOML config for the CLI: one protocol, one network size, one batch
pub fn cli_config_toml(workdir: &Path) -> String {
    format!(
        r#"
[matrix]
network_sizes = [4]
batch_sizes = [10]
repetitions = 10
warmup = 0

[[protocol]]
name = "hmvba"
label = "H-MVBA"
fault_model = "one-third"

[launcher]
command = "sh launch.sh"
workdir = "{}"
timeout_secs = 20
pause_secs = 0

[analysis]
subject = "hmvba"
baselines = []
"#,
        workdir.display()
    )
}
