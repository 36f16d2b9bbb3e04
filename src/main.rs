//! FraudLens entrypoint: runs the HTTP server, or a single batch analysis
//! when `--data-dir` is given.

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use fraudlens::{run_analysis, server, Args, DatasetFiles};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter())),
        )
        .init();

    if let Some(data_dir) = &args.data_dir {
        run_batch(&args, data_dir)
    } else {
        run_server(&args)
    }
}

/// Analyze the CSVs in `data_dir` once and print a summary
fn run_batch(args: &Args, data_dir: &Path) -> Result<()> {
    println!("=== Batch Fraud Analysis ===\n");

    let params = args.forest_params()?;
    let files = DatasetFiles::from_dir(data_dir);
    let results_dir = args.static_dir.join("results");

    let report = run_analysis(&files, &results_dir, &params)?;

    let flagged = report
        .predictions
        .iter()
        .filter(|p| p.potential_fraud == "Yes")
        .count();
    println!("✓ Providers scored: {}", report.predictions.len());
    println!("  Flagged as potential fraud: {}", flagged);

    println!("\nTop fraud indicators:");
    for (feature, importance) in report.top_features.iter().rev() {
        println!("  {:<28} {:.4}", feature, importance);
    }

    println!("\nPredictions saved to: {}", report.artifacts.predictions_csv.display());
    println!(
        "Feature importance chart saved to: {}",
        report.artifacts.feature_importance_png.display()
    );
    println!(
        "Fraud distribution chart saved to: {}",
        report.artifacts.fraud_distribution_png.display()
    );

    Ok(())
}

fn run_server(args: &Args) -> Result<()> {
    let config = args.server_config()?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::serve(&args.bind, config))
}
