//! Logging setup and the structured events emitted once per cycle.

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::common::error::{CoreError, CoreResult};
use crate::data::quality::QualityStats;

/// Install the global fmt subscriber. `filter` follows `RUST_LOG` syntax.
pub fn init(filter: &str) -> CoreResult<()> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| CoreError::invalid(format!("log filter: {e}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| CoreError::invalid(format!("logger already installed: {e}")))
}

/// Emit the missing-value summary of a batch.
pub fn log_quality(stats: &QualityStats) {
    let na_by_col: Vec<f64> = stats.na_by_col.iter().map(|c| c.fraction).collect();
    info!(rows = stats.n_rows, ?na_by_col, "missing values by column");
    info!(rows_with_na_pct = 100.0 * stats.rows_with_na, "rows with missing values");
    if let Ok(json) = serde_json::to_string(stats) {
        tracing::debug!(stats = %json, "quality statistics");
    }
}
