//! Transformer settings, learned encoding state and the numeric feature matrix.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::domain::{Schema, Value};

/// Missing value strategy.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NaMethod {
    /// Remove every row holding a missing cell.
    #[default]
    Drop,
    /// Fill categorical cells with the column mode and numeric cells with the median.
    MedianMode,
}

/// Categorical feature strategy.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CtgMethod {
    /// Remove categorical columns.
    Drop,
    /// One binary column per known category.
    #[default]
    Ohe,
}

impl FromStr for NaMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(NaMethod::Drop),
            "median-mode" | "median_mode" => Ok(NaMethod::MedianMode),
            other => Err(format!("unknown na method {other:?}")),
        }
    }
}

impl FromStr for CtgMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(CtgMethod::Drop),
            "ohe" => Ok(CtgMethod::Ohe),
            other => Err(format!("unknown categorical method {other:?}")),
        }
    }
}

impl fmt::Display for NaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NaMethod::Drop => "drop",
            NaMethod::MedianMode => "median-mode",
        })
    }
}

impl fmt::Display for CtgMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CtgMethod::Drop => "drop",
            CtgMethod::Ohe => "ohe",
        })
    }
}

/// Known categories of one column, sorted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    pub column: String,
    pub categories: Vec<String>,
}

/// Everything learned by the last `prepare_train`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedEncoding {
    /// Feature layout the encoding was learned on.
    pub feature_schema: Schema,
    pub target: String,
    /// Imputation values per feature column (median-mode only).
    pub placeholders: BTreeMap<String, Value>,
    /// Numeric feature columns copied through, in schema order.
    pub numeric: Vec<String>,
    /// Encoded categorical columns, in schema order.
    pub vocabulary: Vec<CategoryVocabulary>,
    /// Names of the produced matrix columns.
    pub output_columns: Vec<String>,
}

impl FittedEncoding {
    /// Vocabulary learned for a categorical column.
    pub fn categories_of(&self, column: &str) -> Option<&[String]> {
        self.vocabulary
            .iter()
            .find(|v| v.column == column)
            .map(|v| v.categories.as_slice())
    }
}

/// Name of the indicator column for one category.
pub fn encoded_name(column: &str, category: &str) -> String {
    format!("{column}_{category}")
}

/// Numeric, row-major model input with named columns and the surviving row index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    index: Vec<usize>,
}

impl FeatureMatrix {
    /// Dense row-major matrix with its column names and row index.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>, index: Vec<usize>) -> Self {
        debug_assert_eq!(rows.len(), index.len());
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self {
            columns,
            rows,
            index,
        }
    }

    /// Encoded column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Encoded rows.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Stream position of each encoded row.
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// Number of encoded rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of encoded columns.
    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one named column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let pos = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[pos]).collect())
    }

    /// Sub-matrix holding the given row positions, in that order.
    pub fn take_rows(&self, positions: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            columns: self.columns.clone(),
            rows: positions.iter().map(|&p| self.rows[p].clone()).collect(),
            index: positions.iter().map(|&p| self.index[p]).collect(),
        }
    }
}
