//! Claim and beneficiary loading plus provider-level feature engineering using Polars

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Provider identifier column shared by claims, labels and test providers
pub const PROVIDER_COLUMN: &str = "Provider";
/// Fraud label column in the training labels table and in the predictions output
pub const LABEL_COLUMN: &str = "PotentialFraud";

const BENEFICIARY_COLUMN: &str = "BeneID";
const CLAIM_COLUMN: &str = "ClaimID";
const AMOUNT_COLUMN: &str = "InscClaimAmtReimbursed";
const INPATIENT_COLUMN: &str = "is_inpatient";
const CHRONIC_COUNT_COLUMN: &str = "NumChronicConditions";
const CHRONIC_MARKER: &str = "ChronicCond";

/// Claim columns kept from both claim files, with the type they are read as
const CLAIM_COLUMNS: [(&str, DataType); 4] = [
    (BENEFICIARY_COLUMN, DataType::String),
    (PROVIDER_COLUMN, DataType::String),
    (CLAIM_COLUMN, DataType::String),
    (AMOUNT_COLUMN, DataType::Float64),
];

/// Engineered provider features, in the order they are emitted
pub const FEATURE_COLUMNS: [&str; 6] = [
    "num_claims",
    "num_patients",
    "total_claim_amount",
    "avg_claim_amount",
    "inpatient_ratio",
    "avg_num_chronic_conditions",
];

/// The eight input tables of an analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatasetKind {
    TrainBeneficiary,
    TrainInpatient,
    TrainOutpatient,
    TrainLabels,
    TestBeneficiary,
    TestInpatient,
    TestOutpatient,
    TestProviders,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 8] = [
        DatasetKind::TrainBeneficiary,
        DatasetKind::TrainInpatient,
        DatasetKind::TrainOutpatient,
        DatasetKind::TrainLabels,
        DatasetKind::TestBeneficiary,
        DatasetKind::TestInpatient,
        DatasetKind::TestOutpatient,
        DatasetKind::TestProviders,
    ];

    /// Upload form field name, also used as the on-disk file stem
    pub fn field_name(self) -> &'static str {
        match self {
            DatasetKind::TrainBeneficiary => "trainBeneficiary",
            DatasetKind::TrainInpatient => "trainInpatient",
            DatasetKind::TrainOutpatient => "trainOutpatient",
            DatasetKind::TrainLabels => "trainLabels",
            DatasetKind::TestBeneficiary => "testBeneficiary",
            DatasetKind::TestInpatient => "testInpatient",
            DatasetKind::TestOutpatient => "testOutpatient",
            DatasetKind::TestProviders => "testProviders",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.field_name() == name)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Locations of the CSV files backing each dataset
#[derive(Debug, Clone, Default)]
pub struct DatasetFiles {
    paths: BTreeMap<DatasetKind, PathBuf>,
}

impl DatasetFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect every dataset as `<dir>/<fieldName>.csv`
    pub fn from_dir(dir: &Path) -> Self {
        let mut files = Self::new();
        for kind in DatasetKind::ALL {
            files.insert(kind, dir.join(format!("{}.csv", kind.field_name())));
        }
        files
    }

    pub fn insert(&mut self, kind: DatasetKind, path: PathBuf) {
        self.paths.insert(kind, path);
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn path(&self, kind: DatasetKind) -> crate::Result<&Path> {
        self.paths
            .get(&kind)
            .map(PathBuf::as_path)
            .ok_or_else(|| anyhow::anyhow!("missing dataset '{}'", kind))
    }

    /// Read the CSV registered for `kind`
    pub fn load(&self, kind: DatasetKind) -> crate::Result<DataFrame> {
        let path = self.path(kind)?;
        load_csv(path).with_context(|| format!("failed to load dataset '{}'", kind))
    }
}

/// Provider-level feature table: one row per provider, `Provider` followed by
/// the [`FEATURE_COLUMNS`]
#[derive(Debug, Clone)]
pub struct ProviderFeatures {
    pub frame: DataFrame,
}

impl ProviderFeatures {
    pub fn provider_count(&self) -> usize {
        self.frame.height()
    }

    pub fn provider_ids(&self) -> crate::Result<Vec<String>> {
        required_strings(&self.frame, PROVIDER_COLUMN)
    }
}

/// Labeled provider features ready for model fitting
#[derive(Debug, Clone)]
pub struct TrainingSet {
    /// Provider IDs, sorted, one per row
    pub provider_ids: Vec<String>,
    /// Feature column names in matrix column order
    pub feature_names: Vec<String>,
    /// Feature matrix (n_providers, n_features)
    pub features: Array2<f64>,
    /// 1 = potential fraud, 0 = not
    pub labels: Array1<usize>,
}

/// Test providers aligned to the training feature layout
#[derive(Debug, Clone)]
pub struct TestSet {
    /// Provider IDs in test-providers table order
    pub provider_ids: Vec<String>,
    /// Feature matrix (n_providers, n_features), zero-filled for providers without claims
    pub features: Array2<f64>,
}

/// Load a CSV file with a header row
pub fn load_csv(path: &Path) -> crate::Result<DataFrame> {
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(None)
        .finish()
        .and_then(|frame| frame.collect())
        .with_context(|| format!("failed to read CSV {}", path.display()))?;
    Ok(df)
}

/// Map a textual fraud label to its class index
pub fn parse_fraud_label(label: &str) -> crate::Result<usize> {
    match label.trim() {
        "Yes" => Ok(1),
        "No" => Ok(0),
        other => bail!("unrecognized {} value '{}', expected Yes or No", LABEL_COLUMN, other),
    }
}

/// Map a class index back to its textual fraud label
pub fn fraud_label_text(class: usize) -> &'static str {
    if class == 1 {
        "Yes"
    } else {
        "No"
    }
}

/// Names of every chronic-condition indicator column in `df`
pub fn chronic_condition_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| name.contains(CHRONIC_MARKER))
        .collect()
}

/// Rewrite chronic-condition code 2 (absent) to 0; every other value is kept
pub fn binarize_chronic_conditions(frame: LazyFrame, columns: &[String]) -> LazyFrame {
    let remapped: Vec<Expr> = columns
        .iter()
        .map(|name| {
            when(col(name).eq(lit(2)))
                .then(lit(0))
                .otherwise(col(name))
                .alias(name)
        })
        .collect();
    frame.with_columns(remapped)
}

/// Aggregate inpatient and outpatient claims, enriched with beneficiary
/// chronic conditions, into one feature row per provider
pub fn engineer_features(
    inpatient: DataFrame,
    outpatient: DataFrame,
    beneficiary: DataFrame,
) -> crate::Result<ProviderFeatures> {
    let chronic_columns = chronic_condition_columns(&beneficiary);
    tracing::debug!(
        chronic_columns = chronic_columns.len(),
        inpatient_claims = inpatient.height(),
        outpatient_claims = outpatient.height(),
        "engineering provider features"
    );

    for (name, _) in CLAIM_COLUMNS {
        if !has_column(&inpatient, name) && !has_column(&outpatient, name) {
            bail!("claim column '{}' is missing from both claim files", name);
        }
    }

    let claims = concat(
        [tag_claims(&inpatient, true), tag_claims(&outpatient, false)],
        UnionArgs::default(),
    )?;

    let mut beneficiary_columns = vec![col(BENEFICIARY_COLUMN).cast(DataType::String)];
    beneficiary_columns.extend(
        chronic_columns
            .iter()
            .map(|name| col(name).cast(DataType::Float64)),
    );
    let beneficiaries =
        binarize_chronic_conditions(beneficiary.lazy().select(beneficiary_columns), &chronic_columns);

    let filled_features: Vec<Expr> = FEATURE_COLUMNS
        .iter()
        .map(|name| col(name).cast(DataType::Float64).fill_null(lit(0.0)))
        .collect();

    let frame = claims
        .left_join(beneficiaries, col(BENEFICIARY_COLUMN), col(BENEFICIARY_COLUMN))
        .with_column(chronic_count(&chronic_columns).alias(CHRONIC_COUNT_COLUMN))
        .filter(col(PROVIDER_COLUMN).is_not_null())
        .group_by_stable([col(PROVIDER_COLUMN)])
        .agg([
            col(CLAIM_COLUMN).drop_nulls().n_unique().alias(FEATURE_COLUMNS[0]),
            col(BENEFICIARY_COLUMN).drop_nulls().n_unique().alias(FEATURE_COLUMNS[1]),
            col(AMOUNT_COLUMN).sum().alias(FEATURE_COLUMNS[2]),
            col(AMOUNT_COLUMN).mean().alias(FEATURE_COLUMNS[3]),
            col(INPATIENT_COLUMN).mean().alias(FEATURE_COLUMNS[4]),
            col(CHRONIC_COUNT_COLUMN).mean().alias(FEATURE_COLUMNS[5]),
        ])
        .with_columns(filled_features)
        .collect()
        .context("failed to aggregate claims per provider")?;

    Ok(ProviderFeatures { frame })
}

/// Keep the claim columns the features need, tagged with their origin
///
/// A column absent from this file is filled with nulls so the other file's
/// values still aggregate.
fn tag_claims(claims: &DataFrame, inpatient: bool) -> LazyFrame {
    let origin = if inpatient { 1.0 } else { 0.0 };
    let columns: Vec<Expr> = CLAIM_COLUMNS
        .iter()
        .map(|(name, dtype)| {
            let name = *name;
            if has_column(claims, name) {
                col(name).cast(dtype.clone())
            } else {
                lit(NULL).cast(dtype.clone()).alias(name)
            }
        })
        .collect();
    claims
        .clone()
        .lazy()
        .select(columns)
        .with_column(lit(origin).alias(INPATIENT_COLUMN))
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

/// Per-claim count of present chronic conditions; unmatched beneficiaries count as none
fn chronic_count(columns: &[String]) -> Expr {
    columns.iter().fold(lit(0.0), |total, name| {
        total + col(name).fill_null(lit(0.0))
    })
}

/// Join provider features with their labels and extract the feature matrix
///
/// Every joined column other than `Provider` and `PotentialFraud` is a feature,
/// in table order. Rows are sorted by provider ID so that fitting does not
/// depend on join output order.
pub fn build_training_set(
    features: &ProviderFeatures,
    labels: DataFrame,
) -> crate::Result<TrainingSet> {
    let labels = labels
        .lazy()
        .with_column(col(PROVIDER_COLUMN).cast(DataType::String));
    let joined = features
        .frame
        .clone()
        .lazy()
        .inner_join(labels, col(PROVIDER_COLUMN), col(PROVIDER_COLUMN))
        .collect()
        .context("failed to join provider features with training labels")?;

    let feature_names: Vec<String> = joined
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| name != PROVIDER_COLUMN && name != LABEL_COLUMN)
        .collect();

    let provider_ids = required_strings(&joined, PROVIDER_COLUMN)?;
    let labels = required_strings(&joined, LABEL_COLUMN)?
        .iter()
        .map(|label| parse_fraud_label(label))
        .collect::<crate::Result<Vec<usize>>>()?;
    let columns = feature_names
        .iter()
        .map(|name| numeric_column(&joined, name))
        .collect::<crate::Result<Vec<Vec<f64>>>>()?;

    let mut order: Vec<usize> = (0..provider_ids.len()).collect();
    order.sort_by(|&a, &b| provider_ids[a].cmp(&provider_ids[b]));

    let features = to_matrix(&columns, &order)?;
    let sorted_ids = order.iter().map(|&row| provider_ids[row].clone()).collect();
    let sorted_labels = order.iter().map(|&row| labels[row]).collect::<Array1<usize>>();

    Ok(TrainingSet {
        provider_ids: sorted_ids,
        feature_names,
        features,
        labels: sorted_labels,
    })
}

/// Left-join every test provider onto the engineered test features, zero-fill,
/// and select exactly the training feature columns in training order
pub fn align_test_set(
    test_providers: DataFrame,
    features: &ProviderFeatures,
    feature_names: &[String],
) -> crate::Result<TestSet> {
    let aligned = test_providers
        .lazy()
        .with_column(col(PROVIDER_COLUMN).cast(DataType::String))
        .left_join(
            features.frame.clone().lazy(),
            col(PROVIDER_COLUMN),
            col(PROVIDER_COLUMN),
        )
        .collect()
        .context("failed to align test providers with engineered features")?;

    let provider_ids = required_strings(&aligned, PROVIDER_COLUMN)?;
    let columns = feature_names
        .iter()
        .map(|name| numeric_column(&aligned, name))
        .collect::<crate::Result<Vec<Vec<f64>>>>()?;
    let order: Vec<usize> = (0..provider_ids.len()).collect();

    Ok(TestSet {
        provider_ids,
        features: to_matrix(&columns, &order)?,
    })
}

/// Float values of a numeric column, nulls read as 0
fn numeric_column(df: &DataFrame, name: &str) -> crate::Result<Vec<f64>> {
    let column = df
        .column(name)
        .with_context(|| format!("feature column '{}' not found", name))?;
    if matches!(column.dtype(), DataType::String) {
        bail!("feature column '{}' is not numeric", name);
    }
    let values = column.cast(&DataType::Float64)?;
    Ok(values
        .f64()?
        .into_iter()
        .map(|value| value.unwrap_or(0.0))
        .collect())
}

/// String values of a column that must not contain nulls
fn required_strings(df: &DataFrame, name: &str) -> crate::Result<Vec<String>> {
    let column = df
        .column(name)
        .with_context(|| format!("column '{}' not found", name))?
        .cast(&DataType::String)?;
    column
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("column '{}' is empty at row {}", name, row))
        })
        .collect()
}

/// Assemble column vectors into a row-major matrix following `order`
fn to_matrix(columns: &[Vec<f64>], order: &[usize]) -> crate::Result<Array2<f64>> {
    let mut data = Vec::with_capacity(order.len() * columns.len());
    for &row in order {
        data.extend(columns.iter().map(|column| column[row]));
    }
    Ok(Array2::from_shape_vec((order.len(), columns.len()), data)?)
}
