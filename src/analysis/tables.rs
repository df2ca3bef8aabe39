//! Markdown comparison tables

use super::MetricRow;
use crate::config::HarnessConfig;
use crate::stats::ratio_or_zero;
use std::collections::{BTreeMap, HashMap};

const COMPARISON_RULE: &str = "|---|---|----------|-------------|-------------------|";

/// Throughput as `mean±std`, with precision shrinking as magnitude grows
///
/// Values of 100 and above are truncated to integers.
pub fn format_tps(mean: f64, std: f64) -> String {
    if mean < 1.0 {
        format!("{:.3}±{:.3}", mean, std)
    } else if mean < 10.0 {
        format!("{:.2}±{:.2}", mean, std)
    } else if mean < 100.0 {
        format!("{:.1}±{:.1}", mean, std)
    } else {
        format!("{}±{}", mean.trunc() as i64, std.trunc() as i64)
    }
}

fn format_latency(row: &MetricRow) -> String {
    format!("{:.3}±{:.3}", row.latency_mean, row.latency_std)
}

fn sorted_by_protocol_n_b(rows: &[MetricRow]) -> Vec<&MetricRow> {
    let mut sorted: Vec<&MetricRow> = rows.iter().collect();
    sorted.sort_by(|a, b| (&a.protocol, a.n, a.b).cmp(&(&b.protocol, b.n, b.b)));
    sorted
}

/// Every row with a non-empty input, by (protocol, N, B)
pub fn performance_table(rows: &[MetricRow]) -> String {
    let mut lines = vec![
        "# Performance Comparison\n".to_string(),
        "| Protocol | N | f | B | Input (KB) | Latency (s) | Throughput (tx/s) |".to_string(),
        "|----------|---|---|---|------------|-------------|-------------------|".to_string(),
    ];
    for row in sorted_by_protocol_n_b(rows).into_iter().filter(|r| r.b > 0) {
        lines.push(format!(
            "| {} | {} | {} | {} | {:.1} | {} | {} |",
            row.protocol,
            row.n,
            row.f,
            row.b,
            row.input_bytes as f64 / 1024.0,
            format_latency(row),
            format_tps(row.tps_mean, row.tps_std)
        ));
    }
    lines.join("\n")
}

/// Protocols side by side per (N, B), in `order`, for the given network sizes
pub fn protocol_comparison(rows: &[MetricRow], order: &[&str], network_sizes: &[u32]) -> String {
    let mut groups: BTreeMap<(u32, u32), HashMap<&str, &MetricRow>> = BTreeMap::new();
    for row in rows.iter().filter(|r| network_sizes.contains(&r.n) && r.b > 0) {
        groups
            .entry((row.n, row.b))
            .or_default()
            .insert(row.protocol.as_str(), row);
    }

    let sizes: Vec<String> = network_sizes.iter().map(|n| n.to_string()).collect();
    let mut lines = vec![
        format!("# Protocol Comparison (N={})\n", sizes.join(",")),
        "| N | B | Protocol | Latency (s) | Throughput (tx/s) |".to_string(),
        COMPARISON_RULE.to_string(),
    ];
    for ((n, b), group) in &groups {
        for protocol in order {
            if let Some(row) = group.get(protocol) {
                lines.push(format!(
                    "| {} | {} | {} | {} | {} |",
                    n,
                    b,
                    protocol,
                    format_latency(row),
                    format_tps(row.tps_mean, row.tps_std)
                ));
            }
        }
        lines.push(COMPARISON_RULE.to_string());
    }
    if !groups.is_empty() {
        lines.pop();
    }
    lines.join("\n")
}

/// Every protocol across network sizes at one batch size
pub fn scalability_table(rows: &[MetricRow], batch_size: u32) -> String {
    let mut lines = vec![
        format!("# Scalability with Network Size (B={})\n", batch_size),
        "| Protocol | N | f | Latency (s) | Throughput (tx/s) |".to_string(),
        "|----------|---|---|-------------|-------------------|".to_string(),
    ];
    for row in sorted_by_protocol_n_b(rows).into_iter().filter(|r| r.b == batch_size) {
        lines.push(format!(
            "| {} | {} | {} | {} | {} |",
            row.protocol,
            row.n,
            row.f,
            format_latency(row),
            format_tps(row.tps_mean, row.tps_std)
        ));
    }
    lines.join("\n")
}

/// Latency speedups of the subject at one batch size, for every N where the
/// subject and all baselines have results
pub fn speedup_by_network_table(rows: &[MetricRow], config: &HarnessConfig) -> String {
    let analysis = &config.analysis;
    let batch = analysis.throughput_plot_batch_size;

    let mut by_n: BTreeMap<u32, HashMap<&str, &MetricRow>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.b == batch) {
        by_n.entry(row.n).or_default().insert(row.protocol.as_str(), row);
    }

    let mut header = String::from("| N | B |");
    let mut rule = String::from("|---|---|");
    for baseline in &analysis.baselines {
        header.push_str(&format!(" Speedup vs {} |", config.label(baseline)));
        rule.push_str("---|");
    }
    let mut lines = vec![
        format!(
            "# Speedup of {} over Baselines\n",
            config.label(&analysis.subject)
        ),
        header,
        rule,
    ];

    for (n, group) in &by_n {
        let Some(subject) = group.get(analysis.subject.as_str()) else {
            continue;
        };
        let speedups: Option<Vec<f64>> = analysis
            .baselines
            .iter()
            .map(|b| {
                group
                    .get(b.as_str())
                    .map(|base| ratio_or_zero(base.latency_mean, subject.latency_mean))
            })
            .collect();
        let Some(speedups) = speedups else {
            continue;
        };
        let mut line = format!("| {} | {} |", n, batch);
        for speedup in speedups {
            line.push_str(&format!(" {:.2}x |", speedup));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Render `comparison_tables.md`
pub fn comparison_tables(rows: &[MetricRow], config: &HarnessConfig) -> String {
    let analysis = &config.analysis;
    let order: Vec<&str> = std::iter::once(analysis.subject.as_str())
        .chain(analysis.baselines.iter().map(String::as_str))
        .collect();

    let tables = [
        performance_table(rows),
        protocol_comparison(rows, &order, &analysis.latency_plot_network_sizes),
        scalability_table(rows, analysis.throughput_plot_batch_size),
        speedup_by_network_table(rows, config),
    ];
    let mut md = tables.join("\n\n\n");
    md.push('\n');
    md
}
