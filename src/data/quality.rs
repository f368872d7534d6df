//! Per-batch data quality statistics: missingness and column summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::error::{CoreError, CoreResult};

use super::domain::{ColumnKind, Frame, Value};

/// Missing fraction for one column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnMissing {
    pub column: String,
    pub fraction: f64,
}

/// Most frequent value of a categorical column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoricalSummary {
    pub column: String,
    pub mode: Option<String>,
}

/// Location and spread of a numeric column, over present cells only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub column: String,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// Sample variance (`n - 1` denominator).
    pub variance: Option<f64>,
}

/// Per column summaries of one batch, split by kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub ctg_modes: Vec<CategoricalSummary>,
    pub numeric: Vec<NumericSummary>,
}

/// Quality report for one batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityStats {
    pub n_rows: usize,
    pub na_by_col: Vec<ColumnMissing>,
    /// Fraction of rows with at least one missing cell.
    pub rows_with_na: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<ColumnStats>,
}

/// Analyse a non-empty batch. Pure and deterministic.
pub fn analyze(frame: &Frame, with_column_stats: bool) -> CoreResult<QualityStats> {
    if frame.is_empty() {
        return Err(CoreError::EmptyBatch);
    }
    let n_rows = frame.n_rows();
    let denom = n_rows as f64;

    let na_by_col = frame
        .schema()
        .fields()
        .iter()
        .zip(frame.columns())
        .map(|(field, values)| ColumnMissing {
            column: field.name.clone(),
            fraction: values.iter().filter(|v| v.is_missing()).count() as f64 / denom,
        })
        .collect();

    let incomplete = (0..n_rows)
        .filter(|&row| frame.row(row).any(Value::is_missing))
        .count();

    let columns = with_column_stats.then(|| column_stats(frame));

    Ok(QualityStats {
        n_rows,
        na_by_col,
        rows_with_na: incomplete as f64 / denom,
        columns,
    })
}

fn column_stats(frame: &Frame) -> ColumnStats {
    let mut ctg_modes = Vec::new();
    let mut numeric = Vec::new();
    for (field, values) in frame.schema().fields().iter().zip(frame.columns()) {
        match field.kind {
            ColumnKind::Categorical => ctg_modes.push(CategoricalSummary {
                column: field.name.clone(),
                mode: mode(values.iter().filter_map(Value::as_cat)).map(str::to_string),
            }),
            ColumnKind::Numeric => {
                let present: Vec<f64> = values.iter().filter_map(Value::as_num).collect();
                numeric.push(NumericSummary {
                    column: field.name.clone(),
                    mean: mean(&present),
                    median: median(&present),
                    variance: sample_variance(&present),
                });
            }
        }
    }
    ColumnStats { ctg_modes, numeric }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median; averages the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Variance with Bessel's correction, `None` below two values.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

/// Most frequent value; ties go to the lexicographically smallest.
pub fn mode<'a, I>(values: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}
