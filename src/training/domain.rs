//! Domain types for model training: the estimator seam, reports and storage contracts.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::common::error::CoreResult;
use crate::evaluation::service::accuracy;
use crate::transform::domain::FeatureMatrix;

/// Pluggable classifier. Implementations must be serializable so the active
/// model can be written into the pipeline snapshot.
pub trait Estimator: Clone + Debug + Serialize + DeserializeOwned {
    /// Hyperparameters, searched over by `GridSearch`.
    type Params: Clone + Debug + PartialEq + Serialize + DeserializeOwned;

    /// Fresh, unfitted estimator with the given hyperparameters.
    fn with_params(params: Self::Params) -> Self;

    fn params(&self) -> &Self::Params;

    fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> CoreResult<()>;

    fn predict(&self, x: &FeatureMatrix) -> CoreResult<Vec<f64>>;

    /// Accuracy of `predict(x)` against `y`.
    fn score(&self, x: &FeatureMatrix, y: &[f64]) -> CoreResult<f64> {
        accuracy(&self.predict(x)?, y)
    }
}

/// Model output aligned with the rows that survived transformation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    /// Stream position of each predicted row.
    pub index: Vec<usize>,
    pub values: Vec<f64>,
}

impl Predictions {
    /// Number of predicted rows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Summary of one full fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitReport<P> {
    /// Rows accumulated so far, including the new batch.
    pub history_rows: usize,
    /// Rows left after imputation and encoding.
    pub train_rows: usize,
    pub n_features: usize,
    /// Accuracy of the active model on its own training matrix.
    pub train_score: f64,
    /// Hyperparameters of the active model.
    pub params: P,
    /// Best mean cross-validation score when a search ran.
    pub search_score: Option<f64>,
}

/// Repository contract for the pipeline snapshot blob.
pub trait SnapshotRepo {
    fn put_snapshot(&self, bytes: &[u8]) -> CoreResult<()>;
    fn get_snapshot(&self) -> CoreResult<Option<Vec<u8>>>;
}
