//! Batch prediction over CSV files.

use std::path::Path;

use tracing::info;

use crate::common::error::{CoreError, CoreResult};
use crate::common::time;
use crate::data::domain::{ColumnKind, Field, Frame, Schema, Value};
use crate::data::repo_fs;
use crate::training::domain::Estimator;
use crate::training::service::ModelPipeline;

use super::domain::{PredictFileReport, PREDICTION_COLUMN};

/// Predict `input` and return its surviving rows, every input column kept,
/// with a prediction column appended. Rows are matched by position, so
/// duplicate index values in `input` are fine.
pub fn predict_frame<E: Estimator>(
    pipeline: &ModelPipeline<E>,
    input: &Frame,
) -> CoreResult<Frame> {
    let schema = pipeline.feature_schema().ok_or(CoreError::NotFitted)?;
    let names: Vec<&str> = schema.names().collect();
    let features = input.select(&names)?.reindexed();
    let preds = pipeline.predict(&features)?;

    let mut keep = vec![false; input.n_rows()];
    for &pos in &preds.index {
        if let Some(flag) = keep.get_mut(pos) {
            *flag = true;
        }
    }
    let kept = input.without_column(PREDICTION_COLUMN).filter_rows(&keep);

    let column = Frame::new(
        Schema::new(vec![Field::new(PREDICTION_COLUMN, ColumnKind::Numeric)])?,
        vec![preds.values.into_iter().map(Value::Num).collect()],
        kept.index().to_vec(),
    )?;
    kept.hstack(&column)
}

/// Read `input`, predict with the trained feature columns, and write the rows
/// that survived transformation to `output` with all of their input columns.
pub fn predict_file<E: Estimator>(
    pipeline: &ModelPipeline<E>,
    input: &Path,
    output: &Path,
) -> CoreResult<PredictFileReport> {
    let start = time::now_ms();
    let schema = pipeline.feature_schema().ok_or(CoreError::NotFitted)?;
    let features = repo_fs::read_csv_keeping(input, schema)?;
    let result = predict_frame(pipeline, &features)?;
    repo_fs::write_csv(output, &result)?;

    let report = PredictFileReport {
        written: result.n_rows(),
        dropped: features.n_rows() - result.n_rows(),
        latency_ms: time::elapsed_ms(start) as u64,
    };
    info!(
        input = %input.display(),
        output = %output.display(),
        written = report.written,
        dropped = report.dropped,
        "predictions written"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::fixtures::*;
    use crate::training::tree::DecisionTreeClassifier;
    use crate::transform::domain::{CtgMethod, NaMethod};
    use crate::transform::service::DataTransformer;

    fn fitted() -> ModelPipeline<DecisionTreeClassifier> {
        let mut p = ModelPipeline::new(
            DataTransformer::new(NaMethod::Drop, CtgMethod::Ohe),
            DecisionTreeClassifier::default(),
        );
        let (x, y) = frame(vec![
            (num(1.0), cat("A"), num(0.0)),
            (num(2.0), cat("B"), num(1.0)),
            (num(3.0), cat("A"), num(0.0)),
            (num(4.0), cat("B"), num(1.0)),
        ])
        .split_xy("label")
        .unwrap();
        p.fit(&x, &y).unwrap();
        p
    }

    #[test]
    fn appends_predictions_to_surviving_rows() {
        let p = fitted();
        let (x, _) = frame(vec![
            (num(1.0), cat("A"), num(0.0)),
            (num(9.0), cat("C"), num(0.0)),
            (num(2.0), cat("B"), num(0.0)),
        ])
        .split_xy("label")
        .unwrap();
        let out = predict_frame(&p, &x).unwrap();
        assert_eq!(out.index(), &[0, 2]);
        assert_eq!(
            out.column(PREDICTION_COLUMN).unwrap(),
            &[Value::Num(0.0), Value::Num(1.0)]
        );
    }

    #[test]
    fn duplicate_index_values_match_by_position() {
        let p = fitted();
        let (mut x, _) = frame(vec![
            (num(1.0), cat("A"), num(0.0)),
            (num(9.0), cat("C"), num(0.0)),
        ])
        .split_xy("label")
        .unwrap();
        let (more, _) = frame(vec![
            (num(2.0), cat("B"), num(0.0)),
            (num(3.0), cat("A"), num(0.0)),
        ])
        .split_xy("label")
        .unwrap();
        x.append(&more).unwrap();
        assert_eq!(x.index(), &[0, 1, 0, 1]);

        let out = predict_frame(&p, &x).unwrap();
        assert_eq!(out.index(), &[0, 0, 1]);
        assert_eq!(out.column("x").unwrap(), &[num(1.0), num(2.0), num(3.0)]);
        assert_eq!(
            out.column(PREDICTION_COLUMN).unwrap(),
            &[Value::Num(0.0), Value::Num(1.0), Value::Num(0.0)]
        );
    }

    #[test]
    fn extra_columns_are_carried_to_the_output() {
        let p = fitted();
        let schema = Schema::new(vec![
            Field::new("id", ColumnKind::Categorical),
            Field::new("color", ColumnKind::Categorical),
            Field::new("x", ColumnKind::Numeric),
        ])
        .unwrap();
        let input = Frame::from_rows(
            schema,
            vec![
                vec![cat("r1"), cat("B"), num(2.0)],
                vec![cat("r2"), cat("C"), num(5.0)],
            ],
        )
        .unwrap();
        let out = predict_frame(&p, &input).unwrap();
        assert_eq!(
            out.schema().names().collect::<Vec<_>>(),
            vec!["id", "color", "x", PREDICTION_COLUMN]
        );
        assert_eq!(out.column("id").unwrap(), &[cat("r1")]);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        std::fs::write(&input, "id,x,color\nr1,1,A\nr2,2,B\nr3,5,C\nr4,,A\n").unwrap();

        let report = predict_file(&fitted(), &input, &output).unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(report.dropped, 2);

        let written = std::fs::read_to_string(&output).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("id,x,color,prediction"));
        assert_eq!(lines.collect::<Vec<_>>(), vec!["r1,1,A,0", "r2,2,B,1"]);
    }

    #[test]
    fn unfitted_pipeline_is_rejected() {
        let p: ModelPipeline<DecisionTreeClassifier> = ModelPipeline::new(
            DataTransformer::new(NaMethod::Drop, CtgMethod::Ohe),
            DecisionTreeClassifier::default(),
        );
        let dir = tempfile::tempdir().unwrap();
        let err = predict_file(&p, &dir.path().join("a.csv"), &dir.path().join("b.csv"));
        assert!(matches!(err, Err(CoreError::NotFitted)));
    }
}
