//! Metric computation and mean-vector drift detection.

use tracing::{debug, warn};

use crate::common::error::{CoreError, CoreResult};
use crate::data::domain::{ColumnKind, Frame};
use crate::data::quality;

use super::domain::DriftStats;

/// Fraction of exact label matches.
pub fn accuracy(pred: &[f64], y: &[f64]) -> CoreResult<f64> {
    if pred.len() != y.len() {
        return Err(CoreError::invalid(format!(
            "{} predictions for {} labels",
            pred.len(),
            y.len()
        )));
    }
    if y.is_empty() {
        return Err(CoreError::NoUsableRows);
    }
    let hits = pred.iter().zip(y).filter(|(p, t)| p == t).count();
    Ok(hits as f64 / y.len() as f64)
}

/// Mean of every numeric column in schema order; all-missing columns give `0.0`.
pub fn numeric_means(frame: &Frame) -> Vec<f64> {
    frame
        .schema()
        .fields()
        .iter()
        .zip(frame.columns())
        .filter(|(field, _)| field.kind == ColumnKind::Numeric)
        .map(|(_, column)| {
            let present: Vec<f64> = column.iter().filter_map(|v| v.as_num()).collect();
            quality::mean(&present).unwrap_or(0.0)
        })
        .collect()
}

/// `1 - a·b / (|a| |b|)`. Two zero vectors are identical, one zero vector is
/// maximally distant.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> CoreResult<f64> {
    if a.len() != b.len() {
        return Err(CoreError::schema(format!(
            "mean vectors differ in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    Ok(match (norm_a == 0.0, norm_b == 0.0) {
        (true, true) => 0.0,
        (true, false) | (false, true) => 1.0,
        _ => 1.0 - dot / (norm_a * norm_b),
    })
}

/// Pairwise drift check against the mean vector of the last reference batch.
#[derive(Clone, Debug)]
pub struct DriftDetector {
    reference: Option<Vec<f64>>,
    threshold: f64,
}

impl DriftDetector {
    /// Detector without a reference; the first observed batch becomes it.
    pub fn new(threshold: f64) -> Self {
        Self {
            reference: None,
            threshold,
        }
    }

    /// Cosine distance above which a batch counts as drifted.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Mean vector of the reference batch, once one was observed.
    pub fn reference(&self) -> Option<&[f64]> {
        self.reference.as_deref()
    }

    /// Compare `batch` with the reference. The first batch becomes the
    /// reference; a drifted batch replaces it.
    pub fn observe(&mut self, batch: &Frame) -> CoreResult<DriftStats> {
        let current = numeric_means(batch);
        let Some(reference) = &self.reference else {
            debug!(columns = current.len(), "drift reference initialised");
            self.reference = Some(current);
            return Ok(DriftStats::default());
        };

        let distance = cosine_distance(reference, &current)?;
        let drifted = distance > self.threshold;
        if drifted {
            warn!(distance, threshold = self.threshold, "data drift detected");
            self.reference = Some(current);
        } else {
            debug!(distance, "no drift");
        }
        Ok(DriftStats {
            distance: Some(distance),
            drifted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::fixtures::*;
    use crate::data::domain::Value;

    fn two_numeric(rows: &[(f64, f64)]) -> Frame {
        let rows = rows
            .iter()
            .map(|&(x, label)| (num(x), cat("a"), num(label)))
            .collect();
        frame(rows)
    }

    #[test]
    fn accuracy_counts_matches() {
        assert_eq!(accuracy(&[1.0, 0.0, 1.0, 1.0], &[1.0, 1.0, 1.0, 0.0]).unwrap(), 0.5);
        assert!(matches!(accuracy(&[], &[]), Err(CoreError::NoUsableRows)));
        assert!(accuracy(&[1.0], &[1.0, 0.0]).is_err());
    }

    #[test]
    fn means_skip_missing_and_categoricals() {
        let f = frame(vec![
            (num(1.0), cat("a"), Value::Missing),
            (Value::Missing, cat("b"), Value::Missing),
            (num(3.0), cat("a"), Value::Missing),
        ]);
        assert_eq!(numeric_means(&f), vec![2.0, 0.0]);
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[0.0, 0.0]).unwrap(), 0.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 1.0);
        assert!(cosine_distance(&[2.0, 4.0], &[1.0, 2.0]).unwrap().abs() < 1e-12);
        assert!(matches!(
            cosine_distance(&[1.0], &[1.0, 2.0]),
            Err(CoreError::Schema(_))
        ));
    }

    #[test]
    fn identical_batches_never_drift() {
        let batch = two_numeric(&[(1.0, 3.0), (2.0, 5.0)]);
        let mut detector = DriftDetector::new(0.2);
        assert_eq!(detector.observe(&batch).unwrap(), DriftStats::default());
        for _ in 0..3 {
            let stats = detector.observe(&batch).unwrap();
            assert!(!stats.drifted);
            assert!(stats.distance.unwrap().abs() < 1e-12);
        }
    }

    #[test]
    fn orthogonal_batches_drift_and_replace_reference() {
        let mut detector = DriftDetector::new(0.2);
        detector.observe(&two_numeric(&[(1.0, 0.0)])).unwrap();

        let stats = detector.observe(&two_numeric(&[(0.0, 1.0)])).unwrap();
        assert!(stats.drifted);
        assert!((stats.distance.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(detector.reference().unwrap(), &[0.0, 1.0]);

        let stats = detector.observe(&two_numeric(&[(0.0, 2.0)])).unwrap();
        assert!(!stats.drifted);
    }
}
