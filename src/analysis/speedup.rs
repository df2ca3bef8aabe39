//! Subject-versus-baseline speedups

use super::MetricRow;
use crate::config::HarnessConfig;
use crate::stats::ratio_or_zero;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const SPEEDUP_REPORT_FILE: &str = "speedup_analysis.md";

/// The subject measured against one baseline at one configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineComparison {
    pub protocol: String,
    pub latency: f64,
    pub tps: f64,
    /// baseline latency / subject latency
    pub latency_speedup: f64,
    /// subject tps / baseline tps
    pub throughput_speedup: f64,
}

/// One (N, B) configuration where the subject and every baseline have results
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedupRow {
    pub n: u32,
    pub b: u32,
    pub subject_latency: f64,
    pub subject_tps: f64,
    /// In configured baseline order
    pub baselines: Vec<BaselineComparison>,
}

/// Where a maximum speedup was observed
#[derive(Debug, Clone, PartialEq)]
pub struct BestConfig {
    pub n: u32,
    pub b: u32,
    pub subject_value: f64,
    pub baseline_value: f64,
}

/// Largest speedups over one baseline
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineMaxima {
    pub protocol: String,
    pub max_latency_speedup: f64,
    pub max_throughput_speedup: f64,
    pub best_latency: Option<BestConfig>,
    pub best_throughput: Option<BestConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedupAnalysis {
    pub subject: String,
    pub baselines: Vec<String>,
    pub rows: Vec<SpeedupRow>,
    pub maxima: Vec<BaselineMaxima>,
    /// Network sizes where the subject has results but some baseline has none
    pub subject_only_sizes: Vec<u32>,
}

impl SpeedupAnalysis {
    pub fn compute(rows: &[MetricRow], subject: &str, baselines: &[String]) -> Self {
        let mut groups: BTreeMap<(u32, u32), HashMap<&str, &MetricRow>> = BTreeMap::new();
        for row in rows {
            groups
                .entry((row.n, row.b))
                .or_default()
                .insert(row.protocol.as_str(), row);
        }

        let speedups: Vec<SpeedupRow> = groups
            .iter()
            .filter_map(|(&(n, b), group)| {
                let subj = group.get(subject)?;
                let comparisons = baselines
                    .iter()
                    .map(|name| {
                        let base = group.get(name.as_str())?;
                        Some(BaselineComparison {
                            protocol: name.clone(),
                            latency: base.latency_mean,
                            tps: base.tps_mean,
                            latency_speedup: ratio_or_zero(base.latency_mean, subj.latency_mean),
                            throughput_speedup: ratio_or_zero(subj.tps_mean, base.tps_mean),
                        })
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(SpeedupRow {
                    n,
                    b,
                    subject_latency: subj.latency_mean,
                    subject_tps: subj.tps_mean,
                    baselines: comparisons,
                })
            })
            .collect();

        let maxima = baselines
            .iter()
            .enumerate()
            .map(|(i, name)| maxima_for(&speedups, i, name))
            .collect();

        let sizes_with = |protocol: &str| -> BTreeSet<u32> {
            rows.iter()
                .filter(|r| r.protocol == protocol)
                .map(|r| r.n)
                .collect()
        };
        let baseline_sizes: Vec<BTreeSet<u32>> = baselines.iter().map(|b| sizes_with(b.as_str())).collect();
        let subject_only_sizes = sizes_with(subject)
            .into_iter()
            .filter(|n| baseline_sizes.iter().any(|sizes| !sizes.contains(n)))
            .collect();

        Self {
            subject: subject.to_string(),
            baselines: baselines.to_vec(),
            rows: speedups,
            maxima,
            subject_only_sizes,
        }
    }

    /// Render `speedup_analysis.md`
    pub fn to_markdown(&self, config: &HarnessConfig) -> String {
        let subject = config.label(&self.subject);
        let labels: Vec<&str> = self.baselines.iter().map(|b| config.label(b)).collect();

        let mut md = String::new();
        md.push_str(&format!("# Speedup Analysis: {} vs Baselines\n\n", subject));

        md.push_str("## Speedup Table\n");
        let mut header = String::from("| N | B |");
        let mut rule = String::from("|---|---|");
        for kind in ["Latency", "Throughput"] {
            for label in &labels {
                header.push_str(&format!(" {} Speedup vs {} |", kind, label));
                rule.push_str("---|");
            }
        }
        md.push_str(&header);
        md.push('\n');
        md.push_str(&rule);
        md.push('\n');
        for row in &self.rows {
            md.push_str(&format!("| {} | {} |", row.n, row.b));
            for cmp in &row.baselines {
                md.push_str(&format!(" {:.2}x |", cmp.latency_speedup));
            }
            for cmp in &row.baselines {
                md.push_str(&format!(" {:.2}x |", cmp.throughput_speedup));
            }
            md.push('\n');
        }

        let claims: Vec<_> = self
            .baselines
            .iter()
            .zip(&labels)
            .filter_map(|(name, label)| {
                let claim = config.protocol(name)?.reference.as_ref()?;
                Some((label, claim))
            })
            .collect();
        md.push('\n');
        if !claims.is_empty() {
            md.push_str("## Comparison with Reference Claims\n\n");
            md.push_str("Reference claims:\n");
            for (label, claim) in claims {
                md.push_str(&format!(
                    "- {} achieves up to {}× lower latency and {}× higher throughput than {}\n",
                    subject, claim.latency_speedup, claim.throughput_speedup, label
                ));
            }
            md.push('\n');
        }

        md.push_str("Measured maximums:\n");
        for (max, label) in self.maxima.iter().zip(&labels) {
            md.push_str(&format!(
                "- **vs {}**: {:.2}x lower latency, {:.2}x higher throughput\n",
                label, max.max_latency_speedup, max.max_throughput_speedup
            ));
        }
        md.push('\n');

        for (max, label) in self.maxima.iter().zip(&labels) {
            if let Some(best) = &max.best_latency {
                md.push_str(&format!(
                    "Best latency speedup vs {}: N={}, B={} ({}: {:.3}s, {}: {:.3}s)\n",
                    label, best.n, best.b, subject, best.subject_value, label, best.baseline_value
                ));
            }
        }
        for (max, label) in self.maxima.iter().zip(&labels) {
            if let Some(best) = &max.best_throughput {
                md.push_str(&format!(
                    "Best throughput speedup vs {}: N={}, B={} ({}: {:.0} tx/s, {}: {:.0} tx/s)\n",
                    label, best.n, best.b, subject, best.subject_value, label, best.baseline_value
                ));
            }
        }

        md.push_str("\n## Coverage\n\n");
        md.push_str(&format!(
            "- {} (N, B) configurations have results for {} and every baseline\n",
            self.rows.len(),
            subject
        ));
        if !self.subject_only_sizes.is_empty() {
            let sizes: Vec<String> = self.subject_only_sizes.iter().map(|n| n.to_string()).collect();
            md.push_str(&format!(
                "- N = {}: {} results without complete baseline coverage\n",
                sizes.join(", "),
                subject
            ));
        }

        md
    }
}

/// Maximum speedups over baseline `index`; ties go to the first configuration
fn maxima_for(rows: &[SpeedupRow], index: usize, protocol: &str) -> BaselineMaxima {
    let mut best_latency: Option<(f64, BestConfig)> = None;
    let mut best_throughput: Option<(f64, BestConfig)> = None;

    for row in rows {
        let cmp = &row.baselines[index];
        if best_latency
            .as_ref()
            .map_or(true, |(v, _)| cmp.latency_speedup > *v)
        {
            best_latency = Some((
                cmp.latency_speedup,
                BestConfig {
                    n: row.n,
                    b: row.b,
                    subject_value: row.subject_latency,
                    baseline_value: cmp.latency,
                },
            ));
        }
        if best_throughput
            .as_ref()
            .map_or(true, |(v, _)| cmp.throughput_speedup > *v)
        {
            best_throughput = Some((
                cmp.throughput_speedup,
                BestConfig {
                    n: row.n,
                    b: row.b,
                    subject_value: row.subject_tps,
                    baseline_value: cmp.tps,
                },
            ));
        }
    }

    BaselineMaxima {
        protocol: protocol.to_string(),
        max_latency_speedup: best_latency.as_ref().map_or(0.0, |(v, _)| *v),
        max_throughput_speedup: best_throughput.as_ref().map_or(0.0, |(v, _)| *v),
        best_latency: best_latency.map(|(_, c)| c),
        best_throughput: best_throughput.map(|(_, c)| c),
    }
}
