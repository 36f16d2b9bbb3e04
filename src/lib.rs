//! FraudLens: provider-level healthcare fraud detection
//!
//! Merges inpatient and outpatient claims with beneficiary chronic conditions,
//! aggregates them into per-provider features, fits a bagged decision-tree
//! ensemble on labeled providers and reports predictions for test providers
//! as a CSV file plus two charts, either over HTTP or from the command line.

pub mod cli;
pub mod data;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{
    align_test_set, build_training_set, engineer_features, load_csv, DatasetFiles, DatasetKind,
    ProviderFeatures, TestSet, TrainingSet,
};
pub use model::{fit_forest, ForestParams, FraudForest};
pub use pipeline::{run_analysis, AnalysisReport, ProviderPrediction};
pub use server::{router, serve, ServerConfig};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
