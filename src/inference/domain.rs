//! Domain definitions for file-based prediction.

use serde::{Deserialize, Serialize};

/// Name of the column appended to prediction output.
pub const PREDICTION_COLUMN: &str = "prediction";

/// Row accounting of one `predict_file` call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictFileReport {
    pub written: usize,
    /// Rows that could not be encoded (missing or unseen values).
    pub dropped: usize,
    pub latency_ms: u64,
}
