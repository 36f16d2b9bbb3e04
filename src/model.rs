//! Bagged decision-tree ensemble for provider fraud classification

use std::fmt;

use anyhow::bail;
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::TrainingSet;

/// Number of trees in the ensemble unless configured otherwise
pub const DEFAULT_TREES: usize = 100;
/// Seed of the bootstrap sampler unless configured otherwise
pub const DEFAULT_SEED: u64 = 42;

/// Fixed ensemble configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForestParams {
    /// Number of bootstrap-sampled trees
    pub n_trees: usize,
    /// Seed for bootstrap sampling; equal seeds give equal models
    pub seed: u64,
    /// Depth limit per tree, unlimited when `None`
    pub max_depth: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: DEFAULT_TREES,
            seed: DEFAULT_SEED,
            max_depth: None,
        }
    }
}

/// Fitted ensemble of Gini decision trees
pub struct FraudForest {
    trees: Vec<DecisionTree<f64, usize>>,
    /// Feature names in the column order the trees were fitted on
    pub feature_names: Vec<String>,
}

impl fmt::Debug for FraudForest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FraudForest")
            .field("n_trees", &self.trees.len())
            .field("feature_names", &self.feature_names)
            .finish()
    }
}

impl FraudForest {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Majority vote over all trees: 1 only when more than half vote fraud
    pub fn predict(&self, records: &Array2<f64>) -> crate::Result<Array1<usize>> {
        if records.ncols() != self.feature_names.len() {
            bail!(
                "feature count mismatch: model expects {} columns, got {}",
                self.feature_names.len(),
                records.ncols()
            );
        }
        if records.nrows() == 0 {
            return Ok(Array1::zeros(0));
        }

        let mut votes = Array1::<usize>::zeros(records.nrows());
        for tree in &self.trees {
            let predicted: Array1<usize> = tree.predict(records);
            votes += &predicted;
        }

        let n_trees = self.trees.len();
        Ok(votes.mapv(|fraud_votes| usize::from(fraud_votes * 2 > n_trees)))
    }

    /// Mean impurity-based importance per feature, normalized to sum to 1
    ///
    /// All zeros when no tree found a useful split.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.feature_names.len()];
        for tree in &self.trees {
            for (total, importance) in totals.iter_mut().zip(tree.feature_importance()) {
                if importance.is_finite() {
                    *total += importance;
                }
            }
        }

        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|total| *total /= sum);
        }
        totals
    }
}

/// Fit the ensemble on a labeled training set
///
/// Each tree sees a bootstrap sample of the rows and every feature at every
/// split, since `linfa-trees` has no per-split feature sampling. Predictions
/// are a hard vote over the trees, not an average of class probabilities, so
/// results can differ from a random forest that does both.
///
/// # Arguments
/// * `training` - Provider feature matrix with 0/1 fraud labels
/// * `params` - Tree count, bootstrap seed and depth limit
///
/// # Returns
/// * Fitted `FraudForest`
pub fn fit_forest(training: &TrainingSet, params: &ForestParams) -> crate::Result<FraudForest> {
    if params.n_trees == 0 {
        bail!("the ensemble needs at least one tree");
    }

    let n_samples = training.features.nrows();
    if n_samples == 0 {
        bail!("training set is empty: no provider has both claims and a label");
    }
    if training.labels.len() != n_samples {
        bail!(
            "label count ({}) does not match training rows ({})",
            training.labels.len(),
            n_samples
        );
    }
    if training.features.ncols() != training.feature_names.len() {
        bail!(
            "feature matrix has {} columns but {} names",
            training.features.ncols(),
            training.feature_names.len()
        );
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut trees = Vec::with_capacity(params.n_trees);

    for _ in 0..params.n_trees {
        let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
        let dataset = Dataset::new(
            training.features.select(Axis(0), &sample),
            training.labels.select(Axis(0), &sample),
        );

        let tree = DecisionTree::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(params.max_depth)
            .fit(&dataset)
            .map_err(|e| anyhow::anyhow!("decision tree fit failed: {}", e))?;
        trees.push(tree);
    }

    Ok(FraudForest {
        trees,
        feature_names: training.feature_names.clone(),
    })
}
