//! End-to-end analysis: load the eight datasets, engineer provider features,
//! fit the ensemble, predict test providers and write the report artifacts.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use polars::prelude::*;

use crate::data::{
    align_test_set, build_training_set, engineer_features, fraud_label_text, DatasetFiles,
    DatasetKind, LABEL_COLUMN, PROVIDER_COLUMN,
};
use crate::model::{fit_forest, ForestParams};
use crate::viz::{
    create_feature_importance_chart, create_fraud_distribution_chart, top_importances,
    TOP_FEATURES,
};

pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const FEATURE_IMPORTANCE_FILE: &str = "feature_importance.png";
pub const FRAUD_DISTRIBUTION_FILE: &str = "fraud_distribution.png";

/// Predicted label of one test provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPrediction {
    pub provider: String,
    /// "Yes" or "No"
    pub potential_fraud: &'static str,
}

/// Files written by one analysis run
#[derive(Debug, Clone)]
pub struct ReportArtifacts {
    pub predictions_csv: PathBuf,
    pub feature_importance_png: PathBuf,
    pub fraud_distribution_png: PathBuf,
}

impl ReportArtifacts {
    pub fn in_dir(results_dir: &Path) -> Self {
        Self {
            predictions_csv: results_dir.join(PREDICTIONS_FILE),
            feature_importance_png: results_dir.join(FEATURE_IMPORTANCE_FILE),
            fraud_distribution_png: results_dir.join(FRAUD_DISTRIBUTION_FILE),
        }
    }
}

/// Outcome of a successful analysis run
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// One entry per test provider, in test-providers order
    pub predictions: Vec<ProviderPrediction>,
    /// Up to ten (feature, importance) pairs, ascending
    pub top_features: Vec<(String, f64)>,
    /// (label, count) pairs, most frequent first
    pub distribution: Vec<(String, usize)>,
    pub artifacts: ReportArtifacts,
}

/// Run the full analysis and write its artifacts beneath `results_dir`
///
/// # Arguments
/// * `files` - CSV locations of all eight datasets
/// * `results_dir` - Output directory, created when missing
/// * `params` - Ensemble configuration
pub fn run_analysis(
    files: &DatasetFiles,
    results_dir: &Path,
    params: &ForestParams,
) -> crate::Result<AnalysisReport> {
    let start_time = Instant::now();

    tracing::info!("loading data");
    let train_beneficiary = files.load(DatasetKind::TrainBeneficiary)?;
    let train_inpatient = files.load(DatasetKind::TrainInpatient)?;
    let train_outpatient = files.load(DatasetKind::TrainOutpatient)?;
    let train_labels = files.load(DatasetKind::TrainLabels)?;
    let test_beneficiary = files.load(DatasetKind::TestBeneficiary)?;
    let test_inpatient = files.load(DatasetKind::TestInpatient)?;
    let test_outpatient = files.load(DatasetKind::TestOutpatient)?;
    let test_providers = files.load(DatasetKind::TestProviders)?;

    tracing::info!("engineering features");
    let train_features = engineer_features(train_inpatient, train_outpatient, train_beneficiary)
        .context("training feature engineering failed")?;
    let test_features = engineer_features(test_inpatient, test_outpatient, test_beneficiary)
        .context("test feature engineering failed")?;
    let training = build_training_set(&train_features, train_labels)?;
    tracing::info!(
        train_providers = training.provider_ids.len(),
        test_providers_with_claims = test_features.provider_count(),
        "features ready"
    );

    tracing::info!(n_trees = params.n_trees, seed = params.seed, "training ensemble");
    let forest = fit_forest(&training, params)?;

    tracing::info!("making predictions");
    let test_set = align_test_set(test_providers, &test_features, &training.feature_names)?;
    let classes = forest.predict(&test_set.features)?;
    let predictions: Vec<ProviderPrediction> = test_set
        .provider_ids
        .into_iter()
        .zip(classes.iter())
        .map(|(provider, &class)| ProviderPrediction {
            provider,
            potential_fraud: fraud_label_text(class),
        })
        .collect();

    fs::create_dir_all(results_dir)
        .with_context(|| format!("failed to create {}", results_dir.display()))?;
    let artifacts = ReportArtifacts::in_dir(results_dir);
    write_predictions(&artifacts.predictions_csv, &predictions)?;

    tracing::info!("creating visualizations");
    let top_features = top_importances(
        &forest.feature_names,
        &forest.feature_importances(),
        TOP_FEATURES,
    );
    create_feature_importance_chart(&top_features, &artifacts.feature_importance_png)?;

    let distribution = fraud_distribution(&predictions);
    create_fraud_distribution_chart(&distribution, &artifacts.fraud_distribution_png)?;

    tracing::info!(
        providers = predictions.len(),
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "analysis complete"
    );

    Ok(AnalysisReport {
        predictions,
        top_features,
        distribution,
        artifacts,
    })
}

/// Write `Provider,PotentialFraud` rows to a CSV file
pub fn write_predictions(path: &Path, predictions: &[ProviderPrediction]) -> crate::Result<()> {
    let providers: Vec<&str> = predictions.iter().map(|p| p.provider.as_str()).collect();
    let labels: Vec<&str> = predictions.iter().map(|p| p.potential_fraud).collect();
    let mut frame = df!(PROVIDER_COLUMN => providers, LABEL_COLUMN => labels)?;

    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut frame)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Count predictions per label, most frequent first; absent labels are omitted
pub fn fraud_distribution(predictions: &[ProviderPrediction]) -> Vec<(String, usize)> {
    let fraud = predictions
        .iter()
        .filter(|p| p.potential_fraud == fraud_label_text(1))
        .count();
    let clean = predictions.len() - fraud;

    let mut counts = vec![
        (fraud_label_text(0).to_string(), clean),
        (fraud_label_text(1).to_string(), fraud),
    ];
    counts.retain(|(_, count)| *count > 0);
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
