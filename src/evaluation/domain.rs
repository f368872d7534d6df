//! Domain primitives for evaluation and drift tracking.

use serde::{Deserialize, Serialize};

/// Scores reported for one streaming cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalSuite {
    /// Accuracy of the previous model on the incoming batch, before it is learned.
    pub batch: Option<f64>,
    /// Accuracy of the refreshed model on the full history.
    pub history: Option<f64>,
}

/// Outcome of comparing one batch against the drift reference.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftStats {
    /// Cosine distance to the reference, `None` for the first batch.
    pub distance: Option<f64>,
    pub drifted: bool,
}
