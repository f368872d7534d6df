//! Stateful data transformer turning record batches into a numeric matrix.
//!
//! Training-time preparation learns the imputation placeholders and the
//! one-hot vocabulary; prediction-time preparation only applies them. Rows
//! that cannot be encoded against the learned vocabulary are dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::error::{CoreError, CoreResult};
use crate::data::domain::{ColumnKind, Frame, Schema, Value};
use crate::data::quality;

use super::domain::{
    encoded_name, CategoryVocabulary, CtgMethod, FeatureMatrix, FittedEncoding, NaMethod,
};

/// Missing value imputation and categorical encoding, learned on training
/// data and replayed on prediction data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataTransformer {
    na_method: NaMethod,
    ctg_method: CtgMethod,
    fitted: Option<FittedEncoding>,
}

impl DataTransformer {
    /// Unfitted transformer using the given methods.
    pub fn new(na_method: NaMethod, ctg_method: CtgMethod) -> Self {
        Self {
            na_method,
            ctg_method,
            fitted: None,
        }
    }

    /// Missing value handling.
    pub fn na_method(&self) -> NaMethod {
        self.na_method
    }

    /// Categorical handling.
    pub fn ctg_method(&self) -> CtgMethod {
        self.ctg_method
    }

    /// Encoding learned by the last `prepare_train`.
    pub fn fitted(&self) -> Option<&FittedEncoding> {
        self.fitted.as_ref()
    }

    /// True after a successful `prepare_train`.
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Impute, learn a fresh vocabulary and encode. The learned state replaces
    /// any previous one; nothing is kept when no row survives.
    pub fn prepare_train(
        &mut self,
        features: &Frame,
        target: &Frame,
    ) -> CoreResult<(FeatureMatrix, Vec<f64>)> {
        let target_name = single_numeric_target(target)?;
        if target.n_rows() != features.n_rows() {
            return Err(CoreError::schema("features and target row counts differ"));
        }
        let input_schema = features.schema().clone();
        let features = self.usable_features(features);
        let labels = target.columns()[0].as_slice();

        let mut keep: Vec<bool> = labels.iter().map(|v| !v.is_missing()).collect();
        let mut features = features.filter_rows(&keep);
        let labels: Vec<Value> = filter_values(labels, &keep);

        let mut placeholders = BTreeMap::new();
        match self.na_method {
            NaMethod::Drop => {
                keep = (0..features.n_rows())
                    .map(|row| !features.row(row).any(Value::is_missing))
                    .collect();
            }
            NaMethod::MedianMode => {
                placeholders = learn_placeholders(&features);
                fill_missing(&mut features, &placeholders);
                keep = vec![true; features.n_rows()];
            }
        }
        let features = features.filter_rows(&keep);
        let labels = filter_values(&labels, &keep);

        let encoding = self.learn_encoding(&features, input_schema, target_name, placeholders);
        let (matrix, labels) = encode(&features, Some(labels.as_slice()), &encoding);
        let labels = labels.unwrap_or_default();
        if matrix.is_empty() {
            return Err(CoreError::NoUsableRows);
        }

        debug!(
            rows = matrix.n_rows(),
            features = matrix.n_features(),
            "prepared training matrix"
        );
        self.fitted = Some(encoding);
        Ok((matrix, labels))
    }

    /// Encode with the learned state. Rows carrying an unseen category are
    /// dropped rather than imputed.
    pub fn prepare_pred(
        &self,
        features: &Frame,
        target: Option<&Frame>,
    ) -> CoreResult<(FeatureMatrix, Option<Vec<f64>>)> {
        let encoding = self.fitted.as_ref().ok_or(CoreError::NotFitted)?;
        if features.schema() != &encoding.feature_schema {
            return Err(CoreError::schema(
                "features do not match the layout the transformer was trained on",
            ));
        }
        let labels = match target {
            Some(target) => {
                let name = single_numeric_target(target)?;
                if name != encoding.target {
                    return Err(CoreError::schema(format!(
                        "target {name:?} differs from trained target {:?}",
                        encoding.target
                    )));
                }
                if target.n_rows() != features.n_rows() {
                    return Err(CoreError::schema("features and target row counts differ"));
                }
                Some(target.columns()[0].clone())
            }
            None => None,
        };

        let mut features = self.usable_features(features);
        if self.na_method == NaMethod::MedianMode {
            fill_missing_numeric(&mut features, &encoding.placeholders);
        }

        let (matrix, labels) = encode(&features, labels.as_deref(), encoding);
        let dropped = features.n_rows() - matrix.n_rows();
        if dropped > 0 {
            debug!(dropped, "dropped rows that cannot be encoded");
        }
        Ok((matrix, labels))
    }

    fn usable_features(&self, features: &Frame) -> Frame {
        match self.ctg_method {
            CtgMethod::Ohe => features.clone(),
            CtgMethod::Drop => features
                .schema()
                .names_of(ColumnKind::Categorical)
                .iter()
                .fold(features.clone(), |frame, name| frame.without_column(name)),
        }
    }

    fn learn_encoding(
        &self,
        features: &Frame,
        input_schema: Schema,
        target: &str,
        placeholders: BTreeMap<String, Value>,
    ) -> FittedEncoding {
        let schema = features.schema();
        let numeric = schema.names_of(ColumnKind::Numeric);
        let vocabulary: Vec<CategoryVocabulary> = schema
            .fields()
            .iter()
            .zip(features.columns())
            .filter(|(field, _)| field.kind == ColumnKind::Categorical)
            .map(|(field, values)| {
                let mut categories: Vec<String> = values
                    .iter()
                    .filter_map(Value::as_cat)
                    .map(str::to_string)
                    .collect();
                categories.sort();
                categories.dedup();
                CategoryVocabulary {
                    column: field.name.clone(),
                    categories,
                }
            })
            .collect();

        let mut output_columns = numeric.clone();
        for vocab in &vocabulary {
            output_columns.extend(
                vocab
                    .categories
                    .iter()
                    .map(|category| encoded_name(&vocab.column, category)),
            );
        }

        FittedEncoding {
            feature_schema: input_schema,
            target: target.to_string(),
            placeholders,
            numeric,
            vocabulary,
            output_columns,
        }
    }
}

fn single_numeric_target(target: &Frame) -> CoreResult<&str> {
    match target.schema().fields() {
        [field] if field.kind == ColumnKind::Numeric => Ok(field.name.as_str()),
        [field] => Err(CoreError::schema(format!(
            "target column {:?} must be numeric",
            field.name
        ))),
        fields => Err(CoreError::schema(format!(
            "expected one target column, got {}",
            fields.len()
        ))),
    }
}

fn filter_values(values: &[Value], keep: &[bool]) -> Vec<Value> {
    values
        .iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(v, _)| v.clone())
        .collect()
}

/// Mode per categorical column and median per numeric column, from this input only.
fn learn_placeholders(features: &Frame) -> BTreeMap<String, Value> {
    let mut placeholders = BTreeMap::new();
    for (field, values) in features.schema().fields().iter().zip(features.columns()) {
        let placeholder = match field.kind {
            ColumnKind::Categorical => quality::mode(values.iter().filter_map(Value::as_cat))
                .map(|m| Value::Cat(m.to_string())),
            ColumnKind::Numeric => {
                let present: Vec<f64> = values.iter().filter_map(Value::as_num).collect();
                quality::median(&present).map(Value::Num)
            }
        };
        if let Some(placeholder) = placeholder {
            placeholders.insert(field.name.clone(), placeholder);
        }
    }
    placeholders
}

fn fill_missing(features: &mut Frame, placeholders: &BTreeMap<String, Value>) {
    fill_where(features, placeholders, |_| true);
}

fn fill_missing_numeric(features: &mut Frame, placeholders: &BTreeMap<String, Value>) {
    fill_where(features, placeholders, |kind| kind == ColumnKind::Numeric);
}

fn fill_where<F>(features: &mut Frame, placeholders: &BTreeMap<String, Value>, applies: F)
where
    F: Fn(ColumnKind) -> bool,
{
    let targets: Vec<(usize, Value)> = features
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| applies(field.kind))
        .filter_map(|(pos, field)| placeholders.get(&field.name).map(|p| (pos, p.clone())))
        .collect();

    for (pos, placeholder) in targets {
        let filled: Vec<Value> = features.columns()[pos]
            .iter()
            .map(|v| if v.is_missing() { placeholder.clone() } else { v.clone() })
            .collect();
        features.set_column(pos, filled);
    }
}

/// Encode every row that is fully present and inside the vocabulary; rows
/// with a missing label are skipped as well.
fn encode(
    features: &Frame,
    labels: Option<&[Value]>,
    encoding: &FittedEncoding,
) -> (FeatureMatrix, Option<Vec<f64>>) {
    let schema = features.schema();
    let numeric: Vec<usize> = encoding
        .numeric
        .iter()
        .filter_map(|name| schema.position(name))
        .collect();
    let categorical: Vec<(usize, &[String])> = encoding
        .vocabulary
        .iter()
        .filter_map(|v| schema.position(&v.column).map(|p| (p, v.categories.as_slice())))
        .collect();

    let columns = features.columns();
    let encode_row = |row: usize| -> Option<Vec<f64>> {
        let mut out = Vec::with_capacity(encoding.output_columns.len());
        for &pos in &numeric {
            out.push(columns[pos][row].as_num()?);
        }
        for &(pos, categories) in &categorical {
            let value = columns[pos][row].as_cat()?;
            let hit = categories.binary_search_by(|c| c.as_str().cmp(value)).ok()?;
            out.extend((0..categories.len()).map(|i| if i == hit { 1.0 } else { 0.0 }));
        }
        Some(out)
    };

    let mut rows = Vec::new();
    let mut index = Vec::new();
    let mut ys = labels.map(|_| Vec::new());
    for row in 0..features.n_rows() {
        let label = match labels {
            Some(labels) => match labels[row].as_num() {
                Some(y) => Some(y),
                None => continue,
            },
            None => None,
        };
        let Some(encoded) = encode_row(row) else {
            continue;
        };
        rows.push(encoded);
        index.push(features.index()[row]);
        if let (Some(ys), Some(y)) = (ys.as_mut(), label) {
            ys.push(y);
        }
    }

    (
        FeatureMatrix::new(encoding.output_columns.clone(), rows, index),
        ys,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::fixtures::*;

    fn xy(frame: &Frame) -> (Frame, Frame) {
        frame.split_xy("label").unwrap()
    }

    #[test]
    fn median_mode_imputes_from_current_batch() {
        let f = frame(vec![
            (num(1.0), cat("A"), num(0.0)),
            (Value::Missing, cat("A"), num(1.0)),
            (num(3.0), Value::Missing, num(1.0)),
        ]);
        let (x, y) = xy(&f);
        let mut t = DataTransformer::new(NaMethod::MedianMode, CtgMethod::Ohe);
        let (m, labels) = t.prepare_train(&x, &y).unwrap();

        assert_eq!(m.n_rows(), 3);
        assert_eq!(m.column("x").unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(m.column("color_A").unwrap(), vec![1.0, 1.0, 1.0]);
        assert_eq!(labels, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn drop_removes_incomplete_rows() {
        let f = frame(vec![
            (num(1.0), cat("A"), num(0.0)),
            (Value::Missing, cat("A"), num(1.0)),
            (num(3.0), cat("B"), num(1.0)),
        ]);
        let (x, y) = xy(&f);
        let mut t = DataTransformer::new(NaMethod::Drop, CtgMethod::Ohe);
        let (m, labels) = t.prepare_train(&x, &y).unwrap();
        assert_eq!(m.n_rows(), 2);
        assert_eq!(m.index(), &[0, 2]);
        assert_eq!(labels, vec![0.0, 1.0]);
    }

    #[test]
    fn one_hot_columns_are_deterministic() {
        let f = frame(vec![
            (num(1.0), cat("B"), num(0.0)),
            (num(2.0), cat("A"), num(1.0)),
        ]);
        let (x, y) = xy(&f);
        let mut t = DataTransformer::new(NaMethod::Drop, CtgMethod::Ohe);
        let (m, _) = t.prepare_train(&x, &y).unwrap();
        assert_eq!(m.columns(), &["x", "color_A", "color_B"]);
        assert_eq!(m.rows(), &[vec![1.0, 0.0, 1.0], vec![2.0, 1.0, 0.0]]);
        assert_eq!(
            t.fitted().unwrap().categories_of("color").unwrap(),
            &["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn train_then_pred_on_same_data_matches() {
        let f = frame(vec![
            (num(1.0), cat("A"), num(0.0)),
            (Value::Missing, cat("B"), num(1.0)),
            (num(5.0), cat("A"), num(1.0)),
        ]);
        let (x, y) = xy(&f);
        let mut t = DataTransformer::new(NaMethod::MedianMode, CtgMethod::Ohe);
        let (train, train_y) = t.prepare_train(&x, &y).unwrap();
        let (pred, pred_y) = t.prepare_pred(&x, Some(&y)).unwrap();
        assert_eq!(train, pred);
        assert_eq!(Some(train_y), pred_y);
    }

    #[test]
    fn unseen_category_row_is_dropped_not_zeroed() {
        let train = frame(vec![
            (num(1.0), cat("A"), num(0.0)),
            (num(2.0), cat("B"), num(1.0)),
        ]);
        let (x, y) = xy(&train);
        let mut t = DataTransformer::new(NaMethod::Drop, CtgMethod::Ohe);
        t.prepare_train(&x, &y).unwrap();

        let incoming = frame(vec![
            (num(1.5), cat("C"), num(0.0)),
            (num(2.5), cat("A"), num(1.0)),
        ]);
        let (x, _) = xy(&incoming);
        let (m, labels) = t.prepare_pred(&x, None).unwrap();
        assert_eq!(m.n_rows(), 1);
        assert_eq!(m.index(), &[1]);
        assert_eq!(m.rows()[0], vec![2.5, 1.0, 0.0]);
        assert!(labels.is_none());
    }

    #[test]
    fn vocabulary_is_replaced_on_each_train() {
        let mut t = DataTransformer::new(NaMethod::Drop, CtgMethod::Ohe);
        let first = frame(vec![(num(1.0), cat("A"), num(0.0))]);
        let (x, y) = xy(&first);
        t.prepare_train(&x, &y).unwrap();

        let second = frame(vec![(num(1.0), cat("B"), num(0.0))]);
        let (x, y) = xy(&second);
        t.prepare_train(&x, &y).unwrap();
        assert_eq!(
            t.fitted().unwrap().categories_of("color").unwrap(),
            &["B".to_string()]
        );
    }

    #[test]
    fn pred_before_train_is_not_fitted() {
        let f = frame(vec![(num(1.0), cat("A"), num(0.0))]);
        let (x, _) = xy(&f);
        let t = DataTransformer::new(NaMethod::Drop, CtgMethod::Ohe);
        assert!(matches!(t.prepare_pred(&x, None), Err(CoreError::NotFitted)));
    }

    #[test]
    fn ctg_drop_removes_categorical_columns() {
        let f = frame(vec![
            (num(1.0), Value::Missing, num(0.0)),
            (num(2.0), cat("A"), num(1.0)),
        ]);
        let (x, y) = xy(&f);
        let mut t = DataTransformer::new(NaMethod::Drop, CtgMethod::Drop);
        let (m, _) = t.prepare_train(&x, &y).unwrap();
        assert_eq!(m.columns(), &["x"]);
        assert_eq!(m.n_rows(), 2);

        let (p, _) = t.prepare_pred(&x, None).unwrap();
        assert_eq!(p, m);
    }

    #[test]
    fn missing_labels_are_never_imputed() {
        let f = frame(vec![
            (num(1.0), cat("A"), Value::Missing),
            (num(2.0), cat("A"), num(1.0)),
        ]);
        let (x, y) = xy(&f);
        let mut t = DataTransformer::new(NaMethod::MedianMode, CtgMethod::Ohe);
        let (m, labels) = t.prepare_train(&x, &y).unwrap();
        assert_eq!(m.index(), &[1]);
        assert_eq!(labels, vec![1.0]);
    }

    #[test]
    fn nothing_left_keeps_previous_state() {
        let mut t = DataTransformer::new(NaMethod::Drop, CtgMethod::Ohe);
        let good = frame(vec![(num(1.0), cat("A"), num(0.0))]);
        let (x, y) = xy(&good);
        t.prepare_train(&x, &y).unwrap();
        let before = t.fitted().cloned();

        let bad = frame(vec![(Value::Missing, cat("B"), num(0.0))]);
        let (x, y) = xy(&bad);
        assert!(matches!(t.prepare_train(&x, &y), Err(CoreError::NoUsableRows)));
        assert_eq!(t.fitted().cloned(), before);
    }

    #[test]
    fn categorical_target_is_a_schema_error() {
        let f = frame(vec![(num(1.0), cat("A"), num(0.0))]);
        let (x, y) = f.split_xy("color").unwrap();
        let mut t = DataTransformer::new(NaMethod::Drop, CtgMethod::Ohe);
        assert!(matches!(t.prepare_train(&x, &y), Err(CoreError::Schema(_))));
    }
}
