use anyhow::{bail, Context, Result};
use clap::Parser;
use mvbench::aggregate;
use mvbench::analysis::{self, SpeedupAnalysis, SPEEDUP_REPORT_FILE};
use mvbench::cli::{Cli, Commands};
use mvbench::config::HarnessConfig;
use mvbench::matrix::ExperimentMatrix;
use mvbench::metrics::{extract_directory, node_records_csv, MarkerPolicy, MetricExtractor};
use mvbench::runner::{BatchOptions, Runner};
use mvbench::store::FsResultStore;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `RUST_LOG` overrides the default level
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn generate_matrix(config: &HarnessConfig, output: &Path, markdown: &Path) -> Result<()> {
    let matrix = ExperimentMatrix::generate(config);
    matrix.write_csv(output)?;
    matrix.write_markdown(markdown)?;

    let summary = matrix.summary(config);
    println!(
        "Generated {} experiments ({} protocols x {} network sizes x {} batch sizes, {} dropped for f < 1)",
        summary.rows, summary.protocols, summary.network_sizes, summary.batch_sizes, summary.dropped
    );
    println!("Total protocol instances: {}", summary.instances);
    println!("Matrix written to {} and {}", output.display(), markdown.display());
    Ok(())
}

fn run_experiments(
    config: &HarnessConfig,
    matrix_path: &Path,
    results: &Path,
    timeout: Option<u64>,
    options: BatchOptions,
) -> Result<()> {
    if !matrix_path.is_file() {
        bail!("Matrix file not found: {}", matrix_path.display());
    }
    let matrix = ExperimentMatrix::load(matrix_path)?;
    info!("Loaded {} experiments from {}", matrix.len(), matrix_path.display());

    let store = FsResultStore::create(results)?;
    let mut runner = Runner::new(config, store);
    if let Some(secs) = timeout {
        if secs == 0 {
            bail!("--timeout must be positive");
        }
        runner = runner.with_timeout(Duration::from_secs(secs));
    }

    let tally = runner.run_batch(&matrix, options);
    println!("=== Summary ===");
    println!("Experiments run: {}", tally.attempted);
    println!("Successful: {}", tally.succeeded);
    println!("Failed: {}", tally.failed);
    println!("Skipped: {}", tally.skipped);
    println!("Results saved in {}/", results.display());
    Ok(())
}

fn parse_logs(
    config: &HarnessConfig,
    log_dir: &Path,
    csv_out: Option<&Path>,
    policy: Option<MarkerPolicy>,
) -> Result<()> {
    let mut extractor = MetricExtractor::new(&config.metrics);
    if let Some(policy) = policy {
        extractor = extractor.with_policy(policy);
    }

    let metrics = extract_directory(&extractor, log_dir)?;
    let Some(summary) = metrics.summary else {
        bail!("No metrics found in {}", log_dir.display());
    };

    if let Some(path) = csv_out {
        std::fs::write(path, node_records_csv(&metrics.records)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("CSV written to {}", path.display());
    }
    print!("{}", summary.to_text()?);
    Ok(())
}

fn aggregate_results(results: &Path, output: &Path, report: &Path) -> Result<()> {
    let store = FsResultStore::open(results)?;
    let rows = aggregate::aggregate(&store)?;
    aggregate::write_csv(&rows, output)?;
    std::fs::write(report, aggregate::status_report(&rows))
        .with_context(|| format!("Failed to write {}", report.display()))?;

    println!("Aggregated {} experiments into {}", rows.len(), output.display());
    println!("Summary written to {}", report.display());
    Ok(())
}

fn analyze_results(config: &HarnessConfig, input: &Path, out_dir: &Path) -> Result<()> {
    let rows = analysis::load_successful(input)?;
    for path in analysis::write_plot_data(&rows, &config.analysis, out_dir)? {
        println!("Plot data written to {}", path.display());
    }

    let speedups = SpeedupAnalysis::compute(&rows, &config.analysis.subject, &config.analysis.baselines);
    println!(
        "Computed speedups for {} configurations (subject and all baselines present)",
        speedups.rows.len()
    );
    let report = out_dir.join(SPEEDUP_REPORT_FILE);
    std::fs::write(&report, speedups.to_markdown(config))
        .with_context(|| format!("Failed to write {}", report.display()))?;
    println!("Speedup analysis written to {}", report.display());

    for max in &speedups.maxima {
        println!(
            "vs {}: max latency speedup {:.2}x, max throughput speedup {:.2}x",
            config.label(&max.protocol),
            max.max_latency_speedup,
            max.max_throughput_speedup
        );
    }
    Ok(())
}

fn write_tables(config: &HarnessConfig, input: &Path, output: &Path) -> Result<()> {
    let rows = analysis::load_successful(input)?;
    std::fs::write(output, analysis::comparison_tables(&rows, config))
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Tables written to {}", output.display());
    Ok(())
}

fn augment_plot_data(config: &HarnessConfig, input: &Path, out_dir: &Path) -> Result<()> {
    let rows = analysis::load_successful(input)?;
    let report = analysis::augment(&rows, &config.analysis, out_dir)?;
    println!("Added {} rows to {}", report.added, analysis::LATENCY_PLOT_FILE);
    for path in &report.written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = HarnessConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Matrix { output, markdown } => generate_matrix(&config, &output, &markdown),
        Commands::Run {
            matrix,
            results,
            timeout,
            skip_completed,
            start,
            limit,
        } => run_experiments(
            &config,
            &matrix,
            &results,
            timeout,
            BatchOptions {
                start,
                limit,
                skip_completed,
            },
        ),
        Commands::Parse {
            log_dir,
            csv_out,
            policy,
        } => parse_logs(&config, &log_dir, csv_out.as_deref(), policy),
        Commands::Aggregate {
            results,
            output,
            report,
        } => aggregate_results(&results, &output, &report),
        Commands::Analyze { input, out_dir } => analyze_results(&config, &input, &out_dir),
        Commands::Tables { input, output } => write_tables(&config, &input, &output),
        Commands::Augment { input, out_dir } => augment_plot_data(&config, &input, &out_dir),
    }
}
