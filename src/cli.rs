//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::model::ForestParams;
use crate::server::ServerConfig;

/// Provider fraud detection: serve the upload UI, or analyze a directory of CSVs once
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address the HTTP server listens on
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    pub bind: String,

    /// Directory holding index.html; results are written to <STATIC_DIR>/results
    #[arg(long, default_value = "static")]
    pub static_dir: PathBuf,

    /// Directory where uploaded CSV files are stored
    #[arg(long, default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Batch mode: analyze <DATA_DIR>/<name>.csv for the eight dataset names and exit
    /// (trainBeneficiary, trainInpatient, trainOutpatient, trainLabels,
    /// testBeneficiary, testInpatient, testOutpatient, testProviders)
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Number of trees in the ensemble
    #[arg(short = 'n', long, default_value = "100")]
    pub trees: usize,

    /// Seed for bootstrap sampling
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum depth of each tree (unlimited when omitted)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Maximum request body size for uploads, in MiB
    #[arg(long, default_value = "256")]
    pub max_upload_mb: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Ensemble configuration from the tree, seed and depth options
    pub fn forest_params(&self) -> crate::Result<ForestParams> {
        if self.trees == 0 {
            anyhow::bail!("--trees must be at least 1");
        }
        if self.max_depth == Some(0) {
            anyhow::bail!("--max-depth must be at least 1");
        }

        Ok(ForestParams {
            n_trees: self.trees,
            seed: self.seed,
            max_depth: self.max_depth,
        })
    }

    pub fn server_config(&self) -> crate::Result<ServerConfig> {
        if self.max_upload_mb == 0 {
            anyhow::bail!("--max-upload-mb must be at least 1");
        }

        Ok(ServerConfig {
            static_dir: self.static_dir.clone(),
            upload_dir: self.upload_dir.clone(),
            forest: self.forest_params()?,
            max_upload_bytes: self.max_upload_mb * 1024 * 1024,
        })
    }

    /// Default tracing filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "fraudlens=debug,tower_http=debug"
        } else {
            "fraudlens=info,tower_http=info"
        }
    }
}
