//! Exhaustive hyperparameter search scored by k-fold cross-validation.

use std::fmt::Debug;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::error::{CoreError, CoreResult};
use crate::transform::domain::FeatureMatrix;

use super::domain::Estimator;

/// Mean validation score of one candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore<P> {
    pub params: P,
    pub mean_score: f64,
}

/// Result of a full search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome<P> {
    pub best: P,
    pub best_score: f64,
    /// Every candidate in evaluation order.
    pub results: Vec<CandidateScore<P>>,
}

/// Grid search over a fixed candidate list.
#[derive(Clone, Debug, PartialEq)]
pub struct GridSearch<P> {
    candidates: Vec<P>,
    folds: usize,
}

impl<P: Clone + Debug> GridSearch<P> {
    /// Search over `candidates` scored by `folds`-fold cross-validation.
    ///
    /// An empty grid or fewer than two folds is invalid input.
    pub fn new(candidates: Vec<P>, folds: usize) -> CoreResult<Self> {
        if candidates.is_empty() {
            return Err(CoreError::invalid("grid search needs at least one candidate"));
        }
        if folds < 2 {
            return Err(CoreError::invalid("grid search needs at least two folds"));
        }
        Ok(Self { candidates, folds })
    }

    /// Parameter sets tried, in order.
    pub fn candidates(&self) -> &[P] {
        &self.candidates
    }

    /// Number of cross-validation folds.
    pub fn folds(&self) -> usize {
        self.folds
    }

    /// Score every candidate and refit the best one on all rows.
    ///
    /// Folds are contiguous and unshuffled so repeated runs agree. With fewer
    /// rows than folds, candidates are scored on their own training data.
    pub fn run<E>(&self, x: &FeatureMatrix, y: &[f64]) -> CoreResult<(E, SearchOutcome<P>)>
    where
        E: Estimator<Params = P>,
    {
        if x.n_rows() != y.len() {
            return Err(CoreError::invalid(format!(
                "{} rows but {} labels",
                x.n_rows(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(CoreError::NoUsableRows);
        }

        let folds = fold_ranges(x.n_rows(), self.folds);
        let mut results = Vec::with_capacity(self.candidates.len());
        let mut best: Option<(usize, f64)> = None;

        for (i, params) in self.candidates.iter().enumerate() {
            let mean_score = match &folds {
                Some(folds) => cross_validate::<E>(params, x, y, folds)?,
                None => {
                    let mut model = E::with_params(params.clone());
                    model.fit(x, y)?;
                    model.score(x, y)?
                }
            };
            debug!(candidate = i, ?params, mean_score, "scored candidate");
            if best.map_or(true, |(_, score)| mean_score > score) {
                best = Some((i, mean_score));
            }
            results.push(CandidateScore {
                params: params.clone(),
                mean_score,
            });
        }

        let (best_idx, best_score) = best.ok_or(CoreError::NoUsableRows)?;
        let best = self.candidates[best_idx].clone();
        let mut model = E::with_params(best.clone());
        model.fit(x, y)?;

        Ok((
            model,
            SearchOutcome {
                best,
                best_score,
                results,
            },
        ))
    }
}

fn cross_validate<E: Estimator>(
    params: &E::Params,
    x: &FeatureMatrix,
    y: &[f64],
    folds: &[Range<usize>],
) -> CoreResult<f64> {
    let mut total = 0.0;
    for fold in folds {
        let train: Vec<usize> = (0..x.n_rows()).filter(|i| !fold.contains(i)).collect();
        let valid: Vec<usize> = fold.clone().collect();

        let train_y: Vec<f64> = train.iter().map(|&i| y[i]).collect();
        let valid_y: Vec<f64> = valid.iter().map(|&i| y[i]).collect();

        let mut model = E::with_params(params.clone());
        model.fit(&x.take_rows(&train), &train_y)?;
        total += model.score(&x.take_rows(&valid), &valid_y)?;
    }
    Ok(total / folds.len() as f64)
}

/// Contiguous fold boundaries; the first `n % k` folds get one extra row.
fn fold_ranges(n: usize, k: usize) -> Option<Vec<Range<usize>>> {
    if n < k {
        return None;
    }
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    let ranges = (0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect();
    Some(ranges)
}
